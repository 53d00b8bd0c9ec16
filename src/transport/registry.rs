//! Pending-request registry
//!
//! FIFO of requests written to one connection and not yet answered.
//!
//! ## Backpressure
//! Capacity is enforced with a bounded crossbeam channel used as a
//! semaphore: admission sends a token (blocking while the channel is full),
//! matching a response receives one. Waiting admissions are woken by a
//! free slot, the registry timeout, a cancellation token, or `close()`.
//!
//! ## Matching
//! A connection answers in request order, so matching is a pop from the
//! head followed by a check of the echoed opaque.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{self, select, Receiver, Sender, TryRecvError};
use crossbeam::queue::SegQueue;
use parking_lot::{Mutex, RwLock};

use crate::error::MemcastError;
use crate::request::Request;

/// A request and the opaque it was written with
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub opaque: u32,
    pub request: Arc<dyn Request>,
}

/// Outcome of `PendingRequests::admit`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    TimedOut,
    Cancelled,
    /// The registry was closed for a reset or disposal
    Closed,
}

impl Admission {
    pub fn is_admitted(self) -> bool {
        self == Admission::Admitted
    }
}

/// Why a response could not be matched
pub enum MatchError {
    /// Nothing was pending
    Empty { received: u32 },

    /// The head of the registry carries another opaque; it has been removed
    Mismatch {
        expected: u32,
        received: u32,
        request: Arc<dyn Request>,
    },
}

impl MatchError {
    /// Split into the protocol error and the request to fail, if any
    pub fn into_parts(self) -> (MemcastError, Option<Arc<dyn Request>>) {
        match self {
            MatchError::Empty { received } => (
                MemcastError::Protocol(format!(
                    "Received a response (opaque {}) while no request is pending",
                    received
                )),
                None,
            ),
            MatchError::Mismatch {
                expected,
                received,
                request,
            } => (
                MemcastError::Protocol(format!(
                    "Response opaque {} does not match pending request {}",
                    received, expected
                )),
                Some(request),
            ),
        }
    }
}

impl fmt::Debug for MatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchError::Empty { received } => {
                f.debug_struct("Empty").field("received", received).finish()
            }
            MatchError::Mismatch {
                expected, received, ..
            } => f
                .debug_struct("Mismatch")
                .field("expected", expected)
                .field("received", received)
                .finish(),
        }
    }
}

/// Cancels admissions waiting on its tokens
pub struct CancelSource {
    sender: Mutex<Option<Sender<()>>>,
    token: CancelToken,
}

/// Cheap handle observed by a waiting admission
#[derive(Debug, Clone)]
pub struct CancelToken {
    receiver: Receiver<()>,
}

impl CancelSource {
    pub fn new() -> Self {
        let (sender, receiver) = channel::bounded(0);
        Self {
            sender: Mutex::new(Some(sender)),
            token: CancelToken { receiver },
        }
    }

    pub fn token(&self) -> CancelToken {
        self.token.clone()
    }

    /// Disconnects the channel, waking every waiter
    pub fn cancel(&self) {
        self.sender.lock().take();
    }
}

impl Default for CancelSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        matches!(self.receiver.try_recv(), Err(TryRecvError::Disconnected))
    }
}

/// Bounded FIFO of in-flight requests for one connection
pub struct PendingRequests {
    queue: SegQueue<PendingRequest>,

    /// Slot tokens; `None` means unbounded
    slots: Option<(Sender<()>, Receiver<()>)>,

    timeout: Option<Duration>,

    /// Guards pushes against `close()` so a drain sees every entry
    open: RwLock<bool>,

    /// Dropped on close to wake waiting admissions
    closer: Mutex<Option<Sender<()>>>,
    closed: Receiver<()>,
}

impl PendingRequests {
    /// `capacity == 0` disables the limit, `timeout == None` waits forever
    pub fn new(capacity: usize, timeout: Option<Duration>) -> Self {
        let (closer, closed) = channel::bounded(0);
        Self {
            queue: SegQueue::new(),
            slots: (capacity > 0).then(|| channel::bounded(capacity)),
            timeout,
            open: RwLock::new(true),
            closer: Mutex::new(Some(closer)),
            closed,
        }
    }

    /// Track a request, blocking while the registry is full
    pub fn admit(&self, entry: PendingRequest, cancel: Option<&CancelToken>) -> Admission {
        if !*self.open.read() {
            return Admission::Closed;
        }

        if let Some((slots, _)) = &self.slots {
            let timer = match self.timeout {
                Some(timeout) => channel::after(timeout),
                None => channel::never(),
            };
            let cancelled = cancel
                .map(|token| token.receiver.clone())
                .unwrap_or_else(channel::never);

            let outcome = select! {
                send(slots, ()) -> sent => match sent {
                    Ok(()) => Admission::Admitted,
                    Err(_) => Admission::Closed,
                },
                recv(self.closed) -> _ => Admission::Closed,
                recv(cancelled) -> _ => Admission::Cancelled,
                recv(timer) -> _ => Admission::TimedOut,
            };
            if !outcome.is_admitted() {
                return outcome;
            }
        }

        let open = self.open.read();
        if !*open {
            self.release_slot();
            return Admission::Closed;
        }
        self.queue.push(entry);
        Admission::Admitted
    }

    /// Dequeue the head and check it against the response opaque
    pub fn try_match(&self, opaque: u32) -> Result<Arc<dyn Request>, MatchError> {
        let entry = self
            .queue
            .pop()
            .ok_or(MatchError::Empty { received: opaque })?;
        self.release_slot();

        if entry.opaque != opaque {
            return Err(MatchError::Mismatch {
                expected: entry.opaque,
                received: opaque,
                request: entry.request,
            });
        }
        Ok(entry.request)
    }

    /// Stop admissions and wake everyone waiting for a slot
    pub fn close(&self) {
        *self.open.write() = false;
        self.closer.lock().take();
    }

    pub fn is_closed(&self) -> bool {
        !*self.open.read()
    }

    /// Remove every pending request, oldest first
    ///
    /// Only meaningful after `close()`: entries admitted concurrently with a
    /// drain may be missed otherwise.
    pub fn drain_all(&self) -> Vec<Arc<dyn Request>> {
        let mut drained = Vec::with_capacity(self.queue.len());
        while let Some(entry) = self.queue.pop() {
            self.release_slot();
            drained.push(entry.request);
        }
        drained
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// `None` when unbounded
    pub fn capacity(&self) -> Option<usize> {
        self.slots.as_ref().and_then(|(sender, _)| sender.capacity())
    }

    fn release_slot(&self) {
        if let Some((_, slots)) = &self.slots {
            let _ = slots.try_recv();
        }
    }
}

impl fmt::Debug for PendingRequests {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRequests")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("closed", &self.is_closed())
            .finish()
    }
}
