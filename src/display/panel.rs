/// Panel driver abstraction: asynchronous bitmap transfers plus completion callback
use std::sync::Arc;

use crate::error::Result;
use crate::sync::{CompletionSignal, CondvarSignal};

/// Hardware side of a chunk transfer.
///
/// `draw_bitmap` only queues the transfer; the driver raises the registered
/// completion signal once the engine is done reading `data`.
pub trait PanelDriver: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &'static str;

    /// Start a transfer of `data` into the end-exclusive window `[x0, x1) x [y0, y1)`.
    /// An `Err` means nothing was queued and no completion will follow.
    fn draw_bitmap(&self, x0: i32, y0: i32, x1: i32, y1: i32, data: &[u8]) -> Result<()>;

    /// Create a signal the completion callback can raise from its context.
    fn create_completion_signal(&self) -> Result<Arc<dyn CompletionSignal>> {
        Ok(Arc::new(CondvarSignal::new()))
    }

    /// Route transfer-done notifications to `signal`.
    ///
    /// Fails with [`PanelInUse`](crate::error::FramebufferError::PanelInUse) while another signal is
    /// registered; the existing registration is left untouched.
    fn register_completion(&self, signal: Arc<dyn CompletionSignal>) -> Result<()>;

    /// Stop notifying the registered signal. Safe to call when nothing is registered.
    fn unregister_completion(&self);
}
