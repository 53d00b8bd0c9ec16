//! Reset gating and reconnect timing
//!
//! Shared by transport implementations: the gate lets exactly one thread
//! run a teardown-and-reconnect sequence at a time and stays shut forever
//! once the transport is disposed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam::channel::{Receiver, RecvTimeoutError};

/// Single-holder guard around the reset sequence
#[derive(Debug, Default)]
pub struct ResetGate {
    resetting: AtomicBool,
    disposed: AtomicBool,
}

impl ResetGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to become the resetting thread
    pub fn try_begin(&self) -> bool {
        if self
            .resetting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        // Released by a holder that raced with close(): keep it shut.
        !self.disposed.load(Ordering::SeqCst)
    }

    /// Release the gate after a reset finished
    pub fn finish(&self) {
        if !self.disposed.load(Ordering::SeqCst) {
            self.resetting.store(false, Ordering::SeqCst);
        }
    }

    /// Shut the gate for good; true only for the first caller
    pub fn close(&self) -> bool {
        let first = !self.disposed.swap(true, Ordering::SeqCst);
        self.resetting.store(true, Ordering::SeqCst);
        first
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    pub fn is_resetting(&self) -> bool {
        self.resetting.load(Ordering::SeqCst)
    }
}

/// Fixed delays between reconnect attempts
///
/// The first timed attempt waits `delay`, every later one `interval`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectSchedule {
    pub delay: Duration,
    pub interval: Duration,
}

impl ReconnectSchedule {
    pub fn new(delay: Duration, interval: Duration) -> Self {
        Self { delay, interval }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            self.delay
        } else {
            self.interval
        }
    }

    /// Sleep before `attempt`; false if `stop` disconnected meanwhile
    pub fn wait(&self, attempt: u32, stop: &Receiver<()>) -> bool {
        match stop.recv_timeout(self.delay_for(attempt)) {
            Err(RecvTimeoutError::Timeout) => true,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }
}
