/// `esp_lcd` panel driver with transfer-done notification
use core::ffi::c_void;
use core::ptr;
use std::sync::{Arc, Mutex};

use esp_idf_sys::*;
use log::*;

use super::hardware_error;
use super::signal::SemaphoreSignal;
use crate::display::panel::PanelDriver;
use crate::error::{FramebufferError, Result};
use crate::sync::CompletionSignal;

type SignalSlot = *mut Arc<dyn CompletionSignal>;

/// Panel driven through `esp_lcd_panel_draw_bitmap`.
///
/// Completion arrives through the panel IO's `on_color_trans_done` callback,
/// which raises whichever signal is currently registered.
pub struct EspLcdPanel {
    panel: esp_lcd_panel_handle_t,
    io: esp_lcd_panel_io_handle_t,
    registered: Mutex<Option<SignalSlot>>,
}

// The esp_lcd handles are used from one updating task at a time and the
// callback slot is guarded by the mutex
unsafe impl Send for EspLcdPanel {}
unsafe impl Sync for EspLcdPanel {}

impl EspLcdPanel {
    /// Wrap handles from an already initialized panel.
    ///
    /// # Safety
    /// Both handles must stay valid for the lifetime of the returned value and
    /// the IO handle must be the one the panel was created on.
    pub unsafe fn from_handles(panel: esp_lcd_panel_handle_t, io: esp_lcd_panel_io_handle_t) -> Self {
        info!("ESP_LCD panel wrapped: panel={:?} io={:?}", panel, io);
        Self { panel, io, registered: Mutex::new(None) }
    }

    pub fn panel_handle(&self) -> esp_lcd_panel_handle_t {
        self.panel
    }

    pub fn io_handle(&self) -> esp_lcd_panel_io_handle_t {
        self.io
    }

    fn set_callback(&self, slot: SignalSlot) -> Result<()> {
        unsafe {
            let callbacks = esp_lcd_panel_io_callbacks_t {
                on_color_trans_done: if slot.is_null() { None } else { Some(on_color_trans_done) },
                ..core::mem::zeroed()
            };
            esp!(esp_lcd_panel_io_register_event_callbacks(self.io, &callbacks, slot as *mut c_void))
                .map_err(|e| hardware_error("esp_lcd_panel_io_register_event_callbacks", e))
        }
    }
}

#[link_section = ".iram1.lcdfb_trans_done"]
unsafe extern "C" fn on_color_trans_done(
    _io: esp_lcd_panel_io_handle_t,
    _edata: *mut esp_lcd_panel_io_event_data_t,
    user_ctx: *mut c_void,
) -> bool {
    if let Some(signal) = (user_ctx as SignalSlot).as_ref() {
        signal.signal();
    }
    // The signal yields on its own when it wakes a task
    false
}

impl PanelDriver for EspLcdPanel {
    fn name(&self) -> &'static str {
        "esp_lcd"
    }

    fn draw_bitmap(&self, x0: i32, y0: i32, x1: i32, y1: i32, data: &[u8]) -> Result<()> {
        unsafe {
            esp!(esp_lcd_panel_draw_bitmap(self.panel, x0, y0, x1, y1, data.as_ptr() as *const c_void))
                .map_err(|e| hardware_error("esp_lcd_panel_draw_bitmap", e))
        }
    }

    fn create_completion_signal(&self) -> Result<Arc<dyn CompletionSignal>> {
        Ok(Arc::new(SemaphoreSignal::new()?))
    }

    fn register_completion(&self, signal: Arc<dyn CompletionSignal>) -> Result<()> {
        let mut registered = self.registered.lock().unwrap_or_else(|e| e.into_inner());
        if registered.is_some() {
            warn!("on_color_trans_done already owned by another framebuffer");
            return Err(FramebufferError::PanelInUse);
        }

        let slot = Box::into_raw(Box::new(signal));
        if let Err(e) = self.set_callback(slot) {
            drop(unsafe { Box::from_raw(slot) });
            return Err(e);
        }

        *registered = Some(slot);
        debug!("on_color_trans_done registered");
        Ok(())
    }

    fn unregister_completion(&self) {
        let mut registered = self.registered.lock().unwrap_or_else(|e| e.into_inner());
        let Some(slot) = registered.take() else {
            return;
        };

        if let Err(e) = self.set_callback(ptr::null_mut()) {
            // Keep the slot alive rather than leave the ISR with a dangling pointer
            warn!("Could not clear transfer callback, leaking its context: {:?}", e);
            return;
        }
        drop(unsafe { Box::from_raw(slot) });
        debug!("on_color_trans_done cleared");
    }
}

impl Drop for EspLcdPanel {
    fn drop(&mut self) {
        self.unregister_completion();
    }
}
