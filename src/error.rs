use std::fmt;

use crate::memory::MemoryPool;

pub type Result<T> = core::result::Result<T, FramebufferError>;

/// Failures reported by the framebuffer backend.
///
/// Allocation errors come out of `create_window_framebuffer` and leave nothing
/// bound to the window. Hardware errors abort the `update` call that saw them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramebufferError {
    InvalidDimensions { width: u32, height: u32 },
    SurfaceAllocation { bytes: usize },
    ScratchAllocation { bytes: usize, tried: heapless::Vec<MemoryPool, 4> },
    SignalCreation(String),
    AcceleratorRegistration(String),
    SurfaceNotFound,
    PanelInUse,
    Config(String),
    Unsupported(String),
    Hardware { op: &'static str, code: i32 },
    TransferTimeout { y: u32 },
    ScratchOverflow { needed: usize, capacity: usize },
}

impl FramebufferError {
    /// True for errors that mean the caller broke the create/update/destroy contract.
    pub fn is_usage_error(&self) -> bool {
        matches!(self, Self::SurfaceNotFound | Self::PanelInUse | Self::Config(_))
    }

    pub fn is_allocation_error(&self) -> bool {
        matches!(
            self,
            Self::SurfaceAllocation { .. }
                | Self::ScratchAllocation { .. }
                | Self::SignalCreation(_)
                | Self::AcceleratorRegistration(_)
        )
    }
}

impl fmt::Display for FramebufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidDimensions { width, height } => {
                write!(f, "invalid surface dimensions {}x{}", width, height)
            }
            Self::SurfaceAllocation { bytes } => {
                write!(f, "failed to allocate {} byte surface", bytes)
            }
            Self::ScratchAllocation { bytes, tried } => {
                write!(f, "failed to allocate {} byte transfer buffer (tried ", bytes)?;
                for (i, pool) in tried.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    f.write_str(pool.name())?;
                }
                f.write_str(")")
            }
            Self::SignalCreation(msg) => write!(f, "failed to create completion signal: {}", msg),
            Self::AcceleratorRegistration(msg) => {
                write!(f, "failed to register accelerator client: {}", msg)
            }
            Self::SurfaceNotFound => f.write_str("couldn't find framebuffer surface for window"),
            Self::PanelInUse => f.write_str("panel already drives another window framebuffer"),
            Self::Config(msg) => write!(f, "invalid framebuffer config: {}", msg),
            Self::Unsupported(msg) => write!(f, "unsupported: {}", msg),
            Self::Hardware { op, code } => write!(f, "{} failed: error 0x{:X}", op, code),
            Self::TransferTimeout { y } => {
                write!(f, "timed out waiting for transfer completion of chunk at y={}", y)
            }
            Self::ScratchOverflow { needed, capacity } => write!(
                f,
                "chunk needs {} bytes but transfer buffer holds {}",
                needed, capacity
            ),
        }
    }
}

impl std::error::Error for FramebufferError {}
