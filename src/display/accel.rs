/// 2D scale/rotate engine abstraction
///
/// Hardware engines (the ESP32-P4 PPA) and the software reference engine
/// share this interface. Rotation is counter-clockwise, matching the PPA.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use log::debug;
use serde::{Deserialize, Serialize};

use super::colors::{PixelFormat, Rgb565Encoder};
use super::Rect;
use crate::error::{FramebufferError, Result};

pub const MAX_SCALE: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn degrees(&self) -> u32 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    pub fn swaps_axes(&self) -> bool {
        matches!(self, Rotation::Deg90 | Rotation::Deg270)
    }

    /// Size of a `width` x `height` block after scaling and rotating.
    pub fn out_size(&self, width: u32, height: u32, scale: u32) -> (u32, u32) {
        if self.swaps_axes() {
            (height * scale, width * scale)
        } else {
            (width * scale, height * scale)
        }
    }

    /// Panel rectangle covered by source rows `[y, y + rows)` of a
    /// `width` x `height` frame once scaled and rotated.
    pub fn map_rows(&self, width: u32, height: u32, y: u32, rows: u32, scale: u32) -> Rect {
        let end = y + rows;
        match self {
            Rotation::Deg0 => Rect::new(0, y * scale, width * scale, rows * scale),
            Rotation::Deg90 => Rect::new(y * scale, 0, rows * scale, width * scale),
            Rotation::Deg180 => Rect::new(0, (height - end) * scale, width * scale, rows * scale),
            Rotation::Deg270 => Rect::new((height - end) * scale, 0, rows * scale, width * scale),
        }
    }

    /// Source pixel (in a `width` x `height` block) that lands on the
    /// unscaled output position `(rx, ry)`.
    #[inline]
    fn source_of(&self, rx: u32, ry: u32, width: u32, height: u32) -> (u32, u32) {
        match self {
            Rotation::Deg0 => (rx, ry),
            Rotation::Deg90 => (width - 1 - ry, rx),
            Rotation::Deg180 => (width - 1 - rx, height - 1 - ry),
            Rotation::Deg270 => (ry, height - 1 - rx),
        }
    }
}

/// One synchronous scale/rotate request covering a band of surface rows.
pub struct ScaleRotateOp<'a> {
    /// First input row, rows separated by `in_pitch` bytes
    pub input: &'a [u8],
    pub in_format: PixelFormat,
    pub in_pitch: usize,
    pub in_width: u32,
    pub in_height: u32,
    pub scale: u32,
    pub rotation: Rotation,
    pub encoder: Rgb565Encoder,
    /// Receives `out_size()` RGB565 pixels, tightly packed
    pub output: &'a mut [u8],
}

impl ScaleRotateOp<'_> {
    pub fn out_size(&self) -> (u32, u32) {
        self.rotation.out_size(self.in_width, self.in_height, self.scale)
    }

    pub fn out_bytes(&self) -> usize {
        let (w, h) = self.out_size();
        w as usize * h as usize * 2
    }

    fn check(&self) -> Result<()> {
        if self.scale == 0 || self.scale > MAX_SCALE {
            return Err(FramebufferError::Unsupported(format!("scale factor {}", self.scale)));
        }
        let needed = self.out_bytes();
        if needed > self.output.len() {
            return Err(FramebufferError::ScratchOverflow { needed, capacity: self.output.len() });
        }
        Ok(())
    }
}

pub trait Accelerator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Register a client. The client unregisters itself when dropped.
    fn register_client(&self) -> Result<Box<dyn AcceleratorClient>>;

    fn supports_input(&self, _format: PixelFormat) -> bool {
        true
    }

    /// Byte alignment required for the output buffer
    fn output_align(&self) -> usize {
        4
    }
}

pub trait AcceleratorClient: Send {
    /// Run the operation to completion before returning.
    fn scale_rotate(&mut self, op: ScaleRotateOp<'_>) -> Result<()>;
}

/// Nearest-neighbour scale/rotate on the CPU.
#[derive(Debug, Clone, Default)]
pub struct SoftwareAccelerator {
    clients: Arc<AtomicUsize>,
}

impl SoftwareAccelerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clients registered and not yet dropped
    pub fn active_clients(&self) -> usize {
        self.clients.load(Ordering::SeqCst)
    }
}

impl Accelerator for SoftwareAccelerator {
    fn name(&self) -> &'static str {
        "software"
    }

    fn register_client(&self) -> Result<Box<dyn AcceleratorClient>> {
        self.clients.fetch_add(1, Ordering::SeqCst);
        debug!("Software scaler client registered");
        Ok(Box::new(SoftwareClient { clients: Arc::clone(&self.clients) }))
    }
}

struct SoftwareClient {
    clients: Arc<AtomicUsize>,
}

impl AcceleratorClient for SoftwareClient {
    fn scale_rotate(&mut self, op: ScaleRotateOp<'_>) -> Result<()> {
        op.check()?;

        let (out_w, out_h) = op.out_size();
        let bpp = op.in_format.bytes_per_pixel();
        let s = op.scale;

        for oy in 0..out_h {
            for ox in 0..out_w {
                let (sx, sy) = op.rotation.source_of(ox / s, oy / s, op.in_width, op.in_height);
                let src = sy as usize * op.in_pitch + sx as usize * bpp;
                let (r, g, b) = op.in_format.read_rgb888(&op.input[src..src + bpp]);
                let dst = (oy as usize * out_w as usize + ox as usize) * 2;
                op.encoder.store(&mut op.output[dst..dst + 2], op.encoder.encode(r, g, b));
            }
        }
        Ok(())
    }
}

impl Drop for SoftwareClient {
    fn drop(&mut self) {
        self.clients.fetch_sub(1, Ordering::SeqCst);
        debug!("Software scaler client unregistered");
    }
}
