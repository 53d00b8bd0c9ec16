//! Transport Module
//!
//! One connection to one node, pipelining requests and matching responses.
//!
//! ## Architecture
//! - Send thread: takes requests from the node queue, admits them to the
//!   pending registry, then writes them
//! - Receive thread: reads headers and bodies, matches them against the
//!   registry in FIFO order
//! - Any fault resets the connection: the registry is swapped for an empty
//!   one and the old one is drained once the node is reachable again
//!
//! ## States
//! ```text
//!   Disconnected ──► Connecting ──► Running ──► Resetting ──► Disconnected
//!         ▲               │                                        │
//!         └───────────────┘ (connect failed, timed retry)          │
//!                                                                  ▼
//!                           Disposed (from any state)          Connecting
//! ```

mod recovery;
mod registry;
mod socket;

use std::sync::Arc;
use std::time::Duration;

use crate::config::{Config, RequeuePolicy};
use crate::request::Request;

pub use recovery::{ReconnectSchedule, ResetGate};
pub use registry::{
    Admission, CancelSource, CancelToken, MatchError, PendingRequest, PendingRequests,
};
pub use socket::SocketTransport;

/// Lifecycle of a transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Disconnected,
    Connecting,
    Running,
    Resetting,
    Disposed,
}

/// A connection to a node
pub trait Transport: Send + Sync {
    fn endpoint(&self) -> &str;

    fn state(&self) -> TransportState;

    /// Connect in the background if not connected yet; no-op while
    /// running or reconnecting
    fn start(&self);

    /// Requests written and not yet answered
    fn pending_count(&self) -> usize;

    /// Close the connection and fail everything still pending
    fn dispose(&self);
}

/// What a transport needs from the node that owns it
pub trait TransportOwner: Send + Sync {
    /// Put a request back on the node queue, false if it was refused
    fn requeue(&self, request: Arc<dyn Request>) -> bool;

    fn transport_failed(&self, endpoint: &str);

    fn transport_ready(&self, endpoint: &str);
}

/// Per-transport values taken from `Config`
#[derive(Debug, Clone)]
pub struct TransportSettings {
    /// Pending registry capacity (0 = unbounded)
    pub queue_capacity: usize,
    pub queue_timeout: Option<Duration>,
    pub socket_timeout: Option<Duration>,
    pub reconnect: ReconnectSchedule,
    pub dead_policy: RequeuePolicy,
}

impl From<&Config> for TransportSettings {
    fn from(config: &Config) -> Self {
        Self {
            queue_capacity: config.transport_queue_length,
            queue_timeout: config.transport_queue_timeout(),
            socket_timeout: config.socket_timeout(),
            reconnect: ReconnectSchedule::new(
                Duration::from_millis(config.reconnect_delay_ms),
                Duration::from_millis(config.reconnect_interval_ms),
            ),
            dead_policy: config.node_dead_policy,
        }
    }
}
