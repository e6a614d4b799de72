//! esp-lcd-framebuffer - window framebuffers pushed to an `esp_lcd` panel
//!
//! A window gets an off-screen surface. On update the surface is converted to
//! the panel's RGB565 wire format in bounded row chunks and each chunk is handed
//! to the panel driver, waiting for its transfer-done interrupt before the
//! scratch buffer is reused.
//!
//! The core builds and tests on the host. ESP-IDF bindings are behind the
//! `espidf`, `ppa` and `mipidsi` features.

pub mod config;
pub mod display;
pub mod error;
pub mod framebuffer;
pub mod memory;
pub mod sync;
pub mod window;

#[cfg(feature = "espidf")]
pub mod esp;

#[cfg(test)]
mod tests;

pub use config::FramebufferConfig;
pub use display::accel::{Accelerator, AcceleratorClient, Rotation, SoftwareAccelerator};
pub use display::colors::{ColorOrder, PixelFormat, Rgb565Encoder};
pub use display::convert::ConversionStrategy;
pub use display::panel::PanelDriver;
pub use display::perf_metrics::FrameStats;
pub use display::surface::Surface;
pub use display::Rect;
pub use error::{FramebufferError, Result};
pub use framebuffer::{FramebufferDevice, FramebufferInfo, WindowFramebuffer, SURFACE_PROPERTY};
pub use memory::{MemoryAllocator, MemoryPool, SystemAllocator};
pub use sync::{CompletionSignal, CondvarSignal};
pub use window::{BasicWindow, Properties, Window};
