// Capability-tagged memory pools for transfer buffers
// DMA-capable internal RAM is preferred, PSRAM is the last resort

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use log::*;
use serde::{Deserialize, Serialize};

use crate::error::{FramebufferError, Result};

/// Memory region a buffer can be carved from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryPool {
    /// Internal RAM the LCD DMA engine can address directly
    Dma,
    /// Internal RAM without the DMA guarantee
    Internal,
    /// External SPI RAM
    Psram,
}

impl MemoryPool {
    pub const ALL: [MemoryPool; 3] = [MemoryPool::Dma, MemoryPool::Internal, MemoryPool::Psram];

    pub fn name(&self) -> &'static str {
        match self {
            MemoryPool::Dma => "dma",
            MemoryPool::Internal => "internal",
            MemoryPool::Psram => "psram",
        }
    }
}

/// Raw storage handed out by a [`MemoryAllocator`]; released when dropped.
pub trait PoolMemory: Send {
    fn as_bytes(&self) -> &[u8];
    fn as_bytes_mut(&mut self) -> &mut [u8];
}

/// Allocator that understands memory capabilities.
pub trait MemoryAllocator: Send + Sync {
    /// Allocate `size` zeroed bytes aligned to `align` from `pool`, or `None` when the pool is exhausted.
    fn allocate(&self, pool: MemoryPool, size: usize, align: usize) -> Option<Box<dyn PoolMemory>>;

    /// Free bytes left in `pool`, for diagnostics.
    fn free_size(&self, pool: MemoryPool) -> usize;
}

/// Fixed-capacity buffer that holds one converted chunk at a time.
pub struct ScratchBuffer {
    memory: Box<dyn PoolMemory>,
    pool: MemoryPool,
}

impl ScratchBuffer {
    pub fn pool(&self) -> MemoryPool {
        self.pool
    }

    pub fn capacity(&self) -> usize {
        self.memory.as_bytes().len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.memory.as_bytes()
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        self.memory.as_bytes_mut()
    }
}

impl std::fmt::Debug for ScratchBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScratchBuffer")
            .field("pool", &self.pool)
            .field("capacity", &self.capacity())
            .finish()
    }
}

/// Try each pool in order until one can hold `size` bytes.
pub fn allocate_with_fallback(
    allocator: &dyn MemoryAllocator,
    pools: &[MemoryPool],
    size: usize,
    align: usize,
) -> Result<ScratchBuffer> {
    let mut tried = heapless::Vec::new();

    for &pool in pools {
        if let Some(memory) = allocator.allocate(pool, size, align) {
            if !tried.is_empty() {
                warn!("Transfer buffer fell back to {} memory after {:?} failed", pool.name(), tried);
            }
            info!("Allocated {} byte transfer buffer in {} memory", size, pool.name());
            return Ok(ScratchBuffer { memory, pool });
        }
        warn!(
            "{} memory exhausted for {} byte transfer buffer ({} bytes free)",
            pool.name(),
            size,
            allocator.free_size(pool)
        );
        let _ = tried.push(pool);
    }

    error!("No memory pool could hold a {} byte transfer buffer", size);
    Err(FramebufferError::ScratchAllocation { bytes: size, tried })
}

/// Host allocator backed by the global heap.
///
/// Pools can be given byte limits so exhaustion and fallback can be exercised
/// without hardware. Live bytes are tracked per pool.
#[derive(Clone, Default)]
pub struct SystemAllocator {
    limits: HashMap<MemoryPool, usize>,
    usage: Arc<PoolUsage>,
}

#[derive(Default)]
struct PoolUsage {
    live: [AtomicUsize; 3],
}

impl PoolUsage {
    fn slot(&self, pool: MemoryPool) -> &AtomicUsize {
        match pool {
            MemoryPool::Dma => &self.live[0],
            MemoryPool::Internal => &self.live[1],
            MemoryPool::Psram => &self.live[2],
        }
    }
}

impl SystemAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap how many bytes `pool` may hand out at once. A limit of zero disables the pool.
    pub fn with_pool_limit(mut self, pool: MemoryPool, bytes: usize) -> Self {
        self.limits.insert(pool, bytes);
        self
    }

    /// Bytes currently handed out from `pool` and not yet dropped.
    pub fn live_bytes(&self, pool: MemoryPool) -> usize {
        self.usage.slot(pool).load(Ordering::SeqCst)
    }

    pub fn total_live_bytes(&self) -> usize {
        MemoryPool::ALL.iter().map(|&pool| self.live_bytes(pool)).sum()
    }
}

impl MemoryAllocator for SystemAllocator {
    fn allocate(&self, pool: MemoryPool, size: usize, _align: usize) -> Option<Box<dyn PoolMemory>> {
        if size > self.free_size(pool) {
            return None;
        }

        let mut data = Vec::new();
        data.try_reserve_exact(size).ok()?;
        data.resize(size, 0u8);

        self.usage.slot(pool).fetch_add(size, Ordering::SeqCst);
        debug!("Allocated {} bytes from host {} pool", size, pool.name());

        Some(Box::new(HeapMemory {
            data,
            pool,
            usage: Arc::clone(&self.usage),
        }))
    }

    fn free_size(&self, pool: MemoryPool) -> usize {
        match self.limits.get(&pool) {
            Some(&limit) => limit.saturating_sub(self.live_bytes(pool)),
            None => usize::MAX,
        }
    }
}

struct HeapMemory {
    data: Vec<u8>,
    pool: MemoryPool,
    usage: Arc<PoolUsage>,
}

impl PoolMemory for HeapMemory {
    fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl Drop for HeapMemory {
    fn drop(&mut self) {
        self.usage.slot(self.pool).fetch_sub(self.data.len(), Ordering::SeqCst);
        debug!("Freed {} bytes from host {} pool", self.data.len(), self.pool.name());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_pool_wins_when_it_has_room() {
        let alloc = SystemAllocator::new();
        let buf = allocate_with_fallback(&alloc, &MemoryPool::ALL, 1024, 4).unwrap();
        assert_eq!(buf.pool(), MemoryPool::Dma);
        assert_eq!(buf.capacity(), 1024);
        assert_eq!(alloc.live_bytes(MemoryPool::Dma), 1024);
    }

    #[test]
    fn falls_back_in_preference_order() {
        let alloc = SystemAllocator::new()
            .with_pool_limit(MemoryPool::Dma, 512)
            .with_pool_limit(MemoryPool::Internal, 0);
        let buf = allocate_with_fallback(&alloc, &MemoryPool::ALL, 1024, 4).unwrap();
        assert_eq!(buf.pool(), MemoryPool::Psram);
        assert_eq!(alloc.live_bytes(MemoryPool::Psram), 1024);
        assert_eq!(alloc.live_bytes(MemoryPool::Dma), 0);
    }

    #[test]
    fn reports_every_pool_when_all_are_exhausted() {
        let alloc = SystemAllocator::new()
            .with_pool_limit(MemoryPool::Dma, 0)
            .with_pool_limit(MemoryPool::Psram, 100);
        let pools = [MemoryPool::Dma, MemoryPool::Psram];
        let err = allocate_with_fallback(&alloc, &pools, 1024, 4).unwrap_err();
        match err {
            FramebufferError::ScratchAllocation { bytes, tried } => {
                assert_eq!(bytes, 1024);
                assert_eq!(tried.as_slice(), &pools);
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(alloc.total_live_bytes(), 0);
    }

    #[test]
    fn dropping_buffer_returns_bytes_to_pool() {
        let alloc = SystemAllocator::new().with_pool_limit(MemoryPool::Dma, 2048);
        let buf = allocate_with_fallback(&alloc, &[MemoryPool::Dma], 2048, 4).unwrap();
        assert_eq!(alloc.free_size(MemoryPool::Dma), 0);
        drop(buf);
        assert_eq!(alloc.free_size(MemoryPool::Dma), 2048);
        assert_eq!(alloc.live_bytes(MemoryPool::Dma), 0);
    }
}
