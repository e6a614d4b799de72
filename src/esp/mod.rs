//! ESP-IDF implementations of the framebuffer collaborators

pub mod heap;
pub mod nvs;
pub mod panel;
pub mod signal;

#[cfg(feature = "mipidsi")]
pub mod mipidsi;
#[cfg(feature = "ppa")]
pub mod ppa;

use esp_idf_svc::log::EspLogger;
use esp_idf_sys::*;
use log::*;

use crate::error::FramebufferError;
use crate::memory::MemoryPool;

pub use heap::HeapCapsAllocator;
pub use panel::EspLcdPanel;
pub use signal::SemaphoreSignal;

/// Apply the ESP-IDF runtime patches and route `log` through the IDF logger.
pub fn init_logging() {
    esp_idf_sys::link_patches();
    EspLogger::initialize_default();
    info!("esp-lcd-framebuffer {}", env!("CARGO_PKG_VERSION"));
}

/// Dump free and largest-block sizes for every pool a transfer buffer can use.
pub fn log_memory_pools() {
    info!("Memory pools:");
    for pool in MemoryPool::ALL {
        let caps = heap::caps_for(pool);
        let (free, largest) = unsafe {
            (heap_caps_get_free_size(caps), heap_caps_get_largest_free_block(caps))
        };
        info!("  {:<8} free {} KB, largest block {} KB", pool.name(), free / 1024, largest / 1024);
    }
}

pub(crate) fn hardware_error(op: &'static str, err: EspError) -> FramebufferError {
    error!("{} failed: {}", op, err);
    FramebufferError::Hardware { op, code: err.code() }
}
