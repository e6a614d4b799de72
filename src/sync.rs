//! Completion handshake between the issuing thread and the transfer engine.
//!
//! A [`CompletionSignal`] behaves like a binary semaphore: the hardware side
//! raises it once per finished transfer, the issuing thread consumes it once
//! before touching the transfer buffer again. Implementations used from an
//! interrupt must make [`CompletionSignal::signal`] safe to call there.

use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

pub trait CompletionSignal: Send + Sync {
    /// Raise the signal. May be called from the transfer-done callback.
    fn signal(&self);

    /// Block until raised, then consume it. `None` waits forever.
    /// Returns false if the timeout expired first.
    fn wait(&self, timeout: Option<Duration>) -> bool;
}

/// Host signal built from a flag guarded by a mutex and a condition variable.
#[derive(Debug, Default)]
pub struct CondvarSignal {
    raised: Mutex<bool>,
    cond: Condvar,
}

impl CondvarSignal {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CompletionSignal for CondvarSignal {
    fn signal(&self) {
        let mut raised = self.raised.lock().unwrap_or_else(|e| e.into_inner());
        *raised = true;
        self.cond.notify_one();
    }

    fn wait(&self, timeout: Option<Duration>) -> bool {
        let mut raised = self.raised.lock().unwrap_or_else(|e| e.into_inner());

        match timeout {
            None => {
                while !*raised {
                    raised = self.cond.wait(raised).unwrap_or_else(|e| e.into_inner());
                }
            }
            Some(timeout) => {
                let deadline = Instant::now() + timeout;
                while !*raised {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    raised = self
                        .cond
                        .wait_timeout(raised, deadline - now)
                        .map(|(guard, _)| guard)
                        .unwrap_or_else(|e| e.into_inner().0);
                }
            }
        }

        *raised = false;
        true
    }
}
