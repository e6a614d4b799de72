//! Issue-then-wait handshake for chunk transfers

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, trace, warn};

use super::panel::PanelDriver;
use super::Rect;
use crate::error::{FramebufferError, Result};
use crate::sync::CompletionSignal;

pub struct TransferSync {
    signal: Arc<dyn CompletionSignal>,
    timeout: Option<Duration>,
    offset: (i32, i32),
    /// Source row of a timed-out chunk the panel may still be reading
    outstanding: Option<u32>,
    completions: u64,
}

impl TransferSync {
    pub fn new(signal: Arc<dyn CompletionSignal>, timeout: Option<Duration>, offset: (i32, i32)) -> Self {
        Self { signal, timeout, offset, outstanding: None, completions: 0 }
    }

    pub fn signal(&self) -> &Arc<dyn CompletionSignal> {
        &self.signal
    }

    /// Completions consumed so far, late ones included
    pub fn completions(&self) -> u64 {
        self.completions
    }

    /// Row of the timed-out chunk whose completion has not been seen yet
    pub fn outstanding(&self) -> Option<u32> {
        self.outstanding
    }

    /// Wait out the completion of a chunk that timed out earlier.
    ///
    /// Must succeed before the transfer buffer is written again. While the late
    /// completion is missing this keeps failing with the original chunk's row.
    pub fn settle(&mut self, panel: &dyn PanelDriver) -> Result<()> {
        let Some(y) = self.outstanding else {
            return Ok(());
        };

        if !self.signal.wait(self.timeout) {
            warn!("{} still busy with chunk at y={}", panel.name(), y);
            return Err(FramebufferError::TransferTimeout { y });
        }

        debug!("Late completion for chunk at y={} consumed", y);
        self.outstanding = None;
        self.completions += 1;
        Ok(())
    }

    /// Send `data` to `rect` and block until the panel reports completion.
    ///
    /// `y` is the source row of the chunk, used for diagnostics only.
    pub fn transfer(&mut self, panel: &dyn PanelDriver, rect: Rect, data: &[u8], y: u32) -> Result<()> {
        self.settle(panel)?;

        let x0 = rect.x as i32 + self.offset.0;
        let y0 = rect.y as i32 + self.offset.1;
        let x1 = x0 + rect.width as i32;
        let y1 = y0 + rect.height as i32;

        trace!("draw_bitmap ({},{})-({},{}) {} bytes", x0, y0, x1, y1, data.len());

        if let Err(e) = panel.draw_bitmap(x0, y0, x1, y1, data) {
            error!("{} rejected chunk at y={}: {}", panel.name(), y, e);
            return Err(e);
        }

        if !self.signal.wait(self.timeout) {
            error!(
                "No transfer completion from {} for chunk at y={} within {:?}",
                panel.name(),
                y,
                self.timeout
            );
            self.outstanding = Some(y);
            return Err(FramebufferError::TransferTimeout { y });
        }

        self.completions += 1;
        Ok(())
    }
}
