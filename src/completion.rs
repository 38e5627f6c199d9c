//! Interrupt completion signal
//!
//! The executor issues a command or unmasks a buffer interrupt and then
//! parks on a `Completion` until the interrupt bottom half signals it. Two
//! flags are enough: `ready` for ordinary completion and `error` for the
//! error branch of the bottom half. The waiter checks `error` first so an
//! error raised between unmask and wait is never mistaken for success.

use core::hint::spin_loop;
use core::sync::atomic::{AtomicBool, Ordering};

/// Spin iterations per timeout unit. One unit is nominally 10 ms on the
/// reference platform; the busy-wait is calibration-free because the only
/// requirement is that the total wait comfortably exceeds any card's worst
/// case response time.
const SPINS_PER_UNIT: u32 = 16384;

/// Outcome of waiting on a [`Completion`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    /// The bottom half signaled normal completion.
    Signaled,
    /// The bottom half signaled the error branch.
    Error,
    /// No signal arrived within the timeout.
    TimedOut,
}

/// One-shot completion flag pair shared between the executor and the
/// interrupt bottom half.
#[derive(Debug)]
pub struct Completion {
    ready: AtomicBool,
    error: AtomicBool,
}

impl Completion {
    pub const fn new() -> Self {
        Self {
            ready: AtomicBool::new(false),
            error: AtomicBool::new(false),
        }
    }

    /// Signal normal completion. Called from the bottom half.
    pub fn signal(&self) {
        self.ready.store(true, Ordering::Release);
    }

    /// Signal an error. Sets both flags so a waiter parked on `ready` alone
    /// still wakes.
    pub fn signal_error(&self) {
        self.error.store(true, Ordering::Release);
        self.ready.store(true, Ordering::Release);
    }

    /// Consume a normal completion, leaving any pending error flag intact.
    pub fn clear_ready(&self) {
        self.ready.store(false, Ordering::Release);
    }

    /// Clear both flags. Used when entering error recovery.
    pub fn clear_all(&self) {
        self.error.store(false, Ordering::Release);
        self.ready.store(false, Ordering::Release);
    }

    /// Whether the error flag is raised.
    pub fn error_pending(&self) -> bool {
        self.error.load(Ordering::Acquire)
    }

    /// Busy-wait until signaled or `timeout_units` elapse. The error flag
    /// wins over the ready flag when both are set.
    pub fn wait(&self, timeout_units: u32) -> WaitStatus {
        for _ in 0..timeout_units {
            for _ in 0..SPINS_PER_UNIT {
                if self.error.load(Ordering::Acquire) {
                    return WaitStatus::Error;
                }
                if self.ready.load(Ordering::Acquire) {
                    return WaitStatus::Signaled;
                }
                spin_loop();
            }
        }
        WaitStatus::TimedOut
    }
}

impl Default for Completion {
    fn default() -> Self {
        Self::new()
    }
}
