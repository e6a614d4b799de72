/// Blocking panel adapter over a `mipidsi` display
use std::sync::{Arc, Mutex};

use display_interface::WriteOnlyDataCommand;
use embedded_graphics_core::pixelcolor::raw::RawU16;
use embedded_graphics_core::pixelcolor::Rgb565;
use embedded_hal::digital::v2::OutputPin;
use log::*;
use mipidsi::models::Model;
use mipidsi::Display;

use crate::display::panel::PanelDriver;
use crate::error::{FramebufferError, Result};
use crate::sync::CompletionSignal;

/// Panel for SPI/parallel displays driven by `mipidsi`.
///
/// `draw_bitmap` writes synchronously, so completion is signalled right away.
/// Chunks must arrive as plain little-endian RGB565 (`color_order = rgb`,
/// `swap_bytes = false`); mipidsi applies the panel's own orders.
pub struct MipidsiPanel<DI, M, RST>
where
    DI: WriteOnlyDataCommand,
    M: Model<ColorFormat = Rgb565>,
    RST: OutputPin,
{
    display: Mutex<Display<DI, M, RST>>,
    signal: Mutex<Option<Arc<dyn CompletionSignal>>>,
}

impl<DI, M, RST> MipidsiPanel<DI, M, RST>
where
    DI: WriteOnlyDataCommand,
    M: Model<ColorFormat = Rgb565>,
    RST: OutputPin,
{
    pub fn new(display: Display<DI, M, RST>) -> Self {
        info!("mipidsi panel adapter ready");
        Self { display: Mutex::new(display), signal: Mutex::new(None) }
    }

    /// Hand the display back, e.g. to turn it off.
    pub fn into_inner(self) -> Display<DI, M, RST> {
        self.display.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

impl<DI, M, RST> PanelDriver for MipidsiPanel<DI, M, RST>
where
    DI: WriteOnlyDataCommand + Send,
    M: Model<ColorFormat = Rgb565> + Send,
    RST: OutputPin + Send,
{
    fn name(&self) -> &'static str {
        "mipidsi"
    }

    fn draw_bitmap(&self, x0: i32, y0: i32, x1: i32, y1: i32, data: &[u8]) -> Result<()> {
        if x1 <= x0 || y1 <= y0 || x0 < 0 || y0 < 0 || x1 > u16::MAX as i32 || y1 > u16::MAX as i32 {
            return Err(FramebufferError::Unsupported(format!(
                "mipidsi window ({},{})-({},{})",
                x0, y0, x1, y1
            )));
        }

        let pixels = data
            .chunks_exact(2)
            .map(|px| Rgb565::from(RawU16::new(u16::from_le_bytes([px[0], px[1]]))));

        {
            let mut display = self.display.lock().unwrap_or_else(|e| e.into_inner());
            // mipidsi windows are end-inclusive
            display
                .set_pixels(x0 as u16, y0 as u16, (x1 - 1) as u16, (y1 - 1) as u16, pixels)
                .map_err(|e| {
                    error!("mipidsi set_pixels failed: {:?}", e);
                    FramebufferError::Hardware { op: "mipidsi::set_pixels", code: -1 }
                })?;
        }

        if let Some(signal) = self.signal.lock().unwrap_or_else(|e| e.into_inner()).as_ref() {
            signal.signal();
        }
        Ok(())
    }

    fn register_completion(&self, signal: Arc<dyn CompletionSignal>) -> Result<()> {
        let mut slot = self.signal.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_some() {
            return Err(FramebufferError::PanelInUse);
        }
        *slot = Some(signal);
        Ok(())
    }

    fn unregister_completion(&self) {
        self.signal.lock().unwrap_or_else(|e| e.into_inner()).take();
    }
}
