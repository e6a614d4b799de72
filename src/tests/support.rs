use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::config::FramebufferConfig;
use crate::display::panel::PanelDriver;
use crate::error::{FramebufferError, Result};
use crate::framebuffer::FramebufferDevice;
use crate::memory::SystemAllocator;
use crate::sync::{CompletionSignal, CondvarSignal};

/// ESP_ERR_INVALID_STATE
pub const INVALID_STATE: i32 = 0x103;

/// One accepted `draw_bitmap` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draw {
    pub x0: i32,
    pub y0: i32,
    pub x1: i32,
    pub y1: i32,
    pub data: Vec<u8>,
}

impl Draw {
    pub fn rows(&self) -> (i32, i32) {
        (self.y0, self.y1)
    }
}

/// Condvar signal that counts the completions actually consumed by a wait
struct CountingSignal {
    inner: CondvarSignal,
    consumed: Arc<AtomicUsize>,
}

impl CompletionSignal for CountingSignal {
    fn signal(&self) {
        self.inner.signal();
    }

    fn wait(&self, timeout: Option<Duration>) -> bool {
        let raised = self.inner.wait(timeout);
        if raised {
            self.consumed.fetch_add(1, Ordering::SeqCst);
        }
        raised
    }
}

/// Panel double that records every transfer and raises the completion signal
/// from a worker thread, the way the DMA interrupt would.
#[derive(Default)]
pub struct RecordingPanel {
    draws: Mutex<Vec<Draw>>,
    signal: Mutex<Option<Arc<dyn CompletionSignal>>>,
    attempts: AtomicUsize,
    registrations: AtomicUsize,
    fail_at: Mutex<Option<usize>>,
    fail_register: AtomicBool,
    silent: AtomicBool,
    delay: Mutex<Duration>,
    completed: Arc<AtomicUsize>,
    consumed: Arc<AtomicUsize>,
}

impl RecordingPanel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn draws(&self) -> Vec<Draw> {
        self.draws.lock().unwrap().clone()
    }

    pub fn draw_count(&self) -> usize {
        self.draws.lock().unwrap().len()
    }

    pub fn clear_draws(&self) {
        self.draws.lock().unwrap().clear();
    }

    /// Number of `draw_bitmap` calls, including rejected ones
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn is_registered(&self) -> bool {
        self.signal.lock().unwrap().is_some()
    }

    /// Total successful `register_completion` calls
    pub fn registrations(&self) -> usize {
        self.registrations.load(Ordering::SeqCst)
    }

    /// Reject the `n`th `draw_bitmap` attempt (0-based) with a hardware error.
    pub fn fail_draw_at(&self, n: Option<usize>) {
        *self.fail_at.lock().unwrap() = n;
    }

    pub fn fail_registration(&self, fail: bool) {
        self.fail_register.store(fail, Ordering::SeqCst);
    }

    /// Report completion `delay` after each accepted transfer.
    pub fn delay_completion(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    /// Transfers the panel has reported as finished
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Completions consumed through signals this panel created
    pub fn consumed(&self) -> usize {
        self.consumed.load(Ordering::SeqCst)
    }

    /// Accept transfers but never report completion.
    pub fn go_silent(&self, silent: bool) {
        self.silent.store(silent, Ordering::SeqCst);
    }
}

impl PanelDriver for RecordingPanel {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn draw_bitmap(&self, x0: i32, y0: i32, x1: i32, y1: i32, data: &[u8]) -> Result<()> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if *self.fail_at.lock().unwrap() == Some(attempt) {
            return Err(FramebufferError::Hardware { op: "draw_bitmap", code: INVALID_STATE });
        }

        self.draws.lock().unwrap().push(Draw { x0, y0, x1, y1, data: data.to_vec() });

        if self.silent.load(Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(signal) = self.signal.lock().unwrap().clone() {
            let delay = *self.delay.lock().unwrap();
            let completed = self.completed.clone();
            thread::spawn(move || {
                if !delay.is_zero() {
                    thread::sleep(delay);
                }
                completed.fetch_add(1, Ordering::SeqCst);
                signal.signal();
            });
        }
        Ok(())
    }

    fn create_completion_signal(&self) -> Result<Arc<dyn CompletionSignal>> {
        Ok(Arc::new(CountingSignal { inner: CondvarSignal::new(), consumed: self.consumed.clone() }))
    }

    fn register_completion(&self, signal: Arc<dyn CompletionSignal>) -> Result<()> {
        if self.fail_register.load(Ordering::SeqCst) {
            return Err(FramebufferError::Hardware {
                op: "esp_lcd_panel_io_register_event_callbacks",
                code: INVALID_STATE,
            });
        }
        let mut slot = self.signal.lock().unwrap();
        if slot.is_some() {
            return Err(FramebufferError::PanelInUse);
        }
        *slot = Some(signal);
        self.registrations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn unregister_completion(&self) {
        self.signal.lock().unwrap().take();
    }
}

pub struct Rig {
    pub panel: Arc<RecordingPanel>,
    pub allocator: SystemAllocator,
    pub device: FramebufferDevice,
}

pub fn rig(config: FramebufferConfig) -> Rig {
    rig_with(config, SystemAllocator::new())
}

pub fn rig_with(config: FramebufferConfig, allocator: SystemAllocator) -> Rig {
    let panel = RecordingPanel::new();
    let device = FramebufferDevice::new(config, panel.clone(), Arc::new(allocator.clone())).unwrap();
    Rig { panel, allocator, device }
}

pub fn config_with_chunk(chunk_height: u32) -> FramebufferConfig {
    FramebufferConfig { chunk_height, ..FramebufferConfig::default() }
}
