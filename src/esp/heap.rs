// Capability-based heap allocations for transfer buffers

use core::ffi::c_void;
use core::ptr::NonNull;

use esp_idf_sys::*;
use log::*;

use crate::memory::{MemoryAllocator, MemoryPool, PoolMemory};

pub(crate) fn caps_for(pool: MemoryPool) -> u32 {
    match pool {
        MemoryPool::Dma => MALLOC_CAP_DMA | MALLOC_CAP_INTERNAL,
        MemoryPool::Internal => MALLOC_CAP_INTERNAL | MALLOC_CAP_8BIT,
        MemoryPool::Psram => MALLOC_CAP_SPIRAM | MALLOC_CAP_8BIT,
    }
}

/// Allocator over `heap_caps_aligned_alloc`.
///
/// Lengths are rounded up to the requested alignment so engines that need
/// whole cache lines can use the full buffer.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeapCapsAllocator;

impl HeapCapsAllocator {
    pub fn new() -> Self {
        Self
    }
}

impl MemoryAllocator for HeapCapsAllocator {
    fn allocate(&self, pool: MemoryPool, size: usize, align: usize) -> Option<Box<dyn PoolMemory>> {
        let align = align.max(4).next_power_of_two();
        let len = size.checked_add(align - 1)? & !(align - 1);

        let ptr = unsafe { heap_caps_aligned_alloc(align, len, caps_for(pool)) } as *mut u8;
        let ptr = NonNull::new(ptr)?;
        unsafe { core::ptr::write_bytes(ptr.as_ptr(), 0, len) };

        debug!("heap_caps: {} bytes ({} aligned) in {}", len, align, pool.name());
        Some(Box::new(CapsBuffer { ptr, len, pool }))
    }

    fn free_size(&self, pool: MemoryPool) -> usize {
        unsafe { heap_caps_get_largest_free_block(caps_for(pool)) }
    }
}

struct CapsBuffer {
    ptr: NonNull<u8>,
    len: usize,
    pool: MemoryPool,
}

// Exclusively owned heap block
unsafe impl Send for CapsBuffer {}

impl PoolMemory for CapsBuffer {
    fn as_bytes(&self) -> &[u8] {
        unsafe { core::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    fn as_bytes_mut(&mut self) -> &mut [u8] {
        unsafe { core::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for CapsBuffer {
    fn drop(&mut self) {
        unsafe { heap_caps_free(self.ptr.as_ptr() as *mut c_void) };
        debug!("heap_caps: freed {} bytes from {}", self.len, self.pool.name());
    }
}
