/// FreeRTOS binary semaphore behind the completion signal
use core::ptr;
use std::time::Duration;

use esp_idf_hal::delay::TickType;
use esp_idf_hal::{interrupt, task};
use esp_idf_sys::*;

use crate::error::{FramebufferError, Result};
use crate::sync::CompletionSignal;

/// `queueQUEUE_TYPE_BINARY_SEMAPHORE` is a C macro, bindgen does not export it
const QUEUE_TYPE_BINARY_SEMAPHORE: u8 = 3;
const QUEUE_SEND_TO_BACK: BaseType_t = 0;

/// Given from the `on_color_trans_done` ISR, taken by the task running the update.
pub struct SemaphoreSignal {
    handle: QueueHandle_t,
}

// The handle is only used through the thread- and ISR-safe queue API
unsafe impl Send for SemaphoreSignal {}
unsafe impl Sync for SemaphoreSignal {}

impl SemaphoreSignal {
    pub fn new() -> Result<Self> {
        let handle = unsafe { xQueueGenericCreate(1, 0, QUEUE_TYPE_BINARY_SEMAPHORE) };
        if handle.is_null() {
            return Err(FramebufferError::SignalCreation(
                "xQueueGenericCreate returned NULL".into(),
            ));
        }
        Ok(Self { handle })
    }
}

impl CompletionSignal for SemaphoreSignal {
    #[link_section = ".iram1.lcdfb_signal"]
    fn signal(&self) {
        if interrupt::active() {
            let mut woken: BaseType_t = 0;
            unsafe { xQueueGiveFromISR(self.handle, &mut woken) };
            if woken != 0 {
                task::do_yield();
            }
        } else {
            unsafe { xQueueGenericSend(self.handle, ptr::null(), 0, QUEUE_SEND_TO_BACK) };
        }
    }

    fn wait(&self, timeout: Option<Duration>) -> bool {
        let ticks = match timeout {
            None => TickType_t::MAX,
            Some(t) => TickType::new_millis(t.as_millis() as u64).ticks(),
        };
        unsafe { xQueueSemaphoreTake(self.handle, ticks) != 0 }
    }
}

impl Drop for SemaphoreSignal {
    fn drop(&mut self) {
        unsafe { vQueueDelete(self.handle) };
    }
}
