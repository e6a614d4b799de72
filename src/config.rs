use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::display::accel::{Rotation, MAX_SCALE};
use crate::display::chunking::DEFAULT_MAX_TRANSFER_BYTES;
use crate::display::colors::{ColorOrder, PixelFormat, Rgb565Encoder};
use crate::display::convert::ConversionStrategy;
use crate::error::FramebufferError;
use crate::memory::MemoryPool;

pub const DEFAULT_CHUNK_HEIGHT: u32 = 16;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FramebufferConfig {
    // Surface
    pub surface_format: PixelFormat,

    // Chunking
    pub chunk_height: u32,
    pub max_transfer_bytes: usize,
    pub memory_pools: heapless::Vec<MemoryPool, 3>,

    // Panel wire format
    pub color_order: ColorOrder,
    pub swap_bytes: bool,
    pub panel_offset: (i32, i32),

    // Conversion
    pub strategy: ConversionStrategy,
    pub scale: u32,
    pub rotation: Rotation,

    // Synchronization
    pub transfer_timeout_ms: Option<u32>,

    // Diagnostics
    pub stats_report_secs: u32,
}

impl Default for FramebufferConfig {
    fn default() -> Self {
        Self {
            surface_format: PixelFormat::Rgb565,
            chunk_height: DEFAULT_CHUNK_HEIGHT,
            max_transfer_bytes: DEFAULT_MAX_TRANSFER_BYTES,
            memory_pools: heapless::Vec::from_slice(&MemoryPool::ALL).unwrap_or_default(),
            color_order: ColorOrder::Rgb,
            swap_bytes: false,
            panel_offset: (0, 0),
            strategy: ConversionStrategy::Auto,
            scale: 1,
            rotation: Rotation::Deg0,
            transfer_timeout_ms: None,
            stats_report_secs: 10,
        }
    }
}

impl FramebufferConfig {
    pub fn validate(&self) -> Result<(), FramebufferError> {
        if self.chunk_height == 0 {
            return Err(FramebufferError::Config("chunk_height must be at least 1".into()));
        }
        if self.max_transfer_bytes == 0 {
            return Err(FramebufferError::Config("max_transfer_bytes must be non-zero".into()));
        }
        if self.scale == 0 || self.scale > MAX_SCALE {
            return Err(FramebufferError::Config(format!(
                "scale must be 1..={}, got {}",
                MAX_SCALE, self.scale
            )));
        }
        if self.memory_pools.is_empty() {
            return Err(FramebufferError::Config("no memory pools configured".into()));
        }
        for (i, pool) in self.memory_pools.iter().enumerate() {
            if self.memory_pools[..i].contains(pool) {
                return Err(FramebufferError::Config(format!(
                    "memory pool {} listed twice",
                    pool.name()
                )));
            }
        }
        if self.strategy == ConversionStrategy::Passthrough && self.surface_format != PixelFormat::Rgb565 {
            return Err(FramebufferError::Config(format!(
                "passthrough needs an RGB565 surface, got {}",
                self.surface_format.name()
            )));
        }
        Ok(())
    }

    pub fn encoder(&self) -> Rgb565Encoder {
        Rgb565Encoder::new(self.color_order, self.swap_bytes)
    }

    pub fn transfer_timeout(&self) -> Option<Duration> {
        self.transfer_timeout_ms.map(|ms| Duration::from_millis(ms as u64))
    }

    pub fn stats_report_interval(&self) -> Option<Duration> {
        match self.stats_report_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs as u64)),
        }
    }

    pub fn from_json(data: &[u8]) -> Result<Self> {
        let config: Self = serde_json::from_slice(data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}
