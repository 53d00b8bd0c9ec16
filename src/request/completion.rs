//! Call-once completion
//!
//! A logical request may be sent to several nodes; responses and failures
//! can then race in from different transports. The first one to flip the
//! atomic flag owns the callback, every later one is dropped.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

type Callback<T> = Box<dyn FnOnce(T) + Send>;

/// One-shot callback guarded by a compare-and-swap flag
pub struct Completion<T> {
    fired: AtomicBool,
    sends: AtomicUsize,
    callback: Mutex<Option<Callback<T>>>,
}

impl<T> Completion<T> {
    pub fn new<F>(callback: F) -> Self
    where
        F: FnOnce(T) + Send + 'static,
    {
        Self {
            fired: AtomicBool::new(false),
            sends: AtomicUsize::new(0),
            callback: Mutex::new(Some(Box::new(callback))),
        }
    }

    /// Deliver `value` if nobody did before
    ///
    /// Returns false when the completion was already claimed.
    pub fn complete(&self, value: T) -> bool {
        if self
            .fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        // Only the winner of the flag ever gets here, the lock is uncontended.
        let callback = self.callback.lock().take();
        if let Some(callback) = callback {
            callback(value);
        }
        true
    }

    pub fn is_complete(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Count one physical send, returns the new total
    pub fn record_send(&self) -> usize {
        self.sends.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn sends(&self) -> usize {
        self.sends.load(Ordering::Acquire)
    }
}

impl<T> fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("fired", &self.is_complete())
            .field("sends", &self.sends())
            .finish()
    }
}
