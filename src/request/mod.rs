//! Request Module
//!
//! Units of work handed to nodes.
//!
//! ## Lifecycle
//! 1. Created by the caller with a completion callback
//! 2. Encoded once per physical send, with the opaque chosen by the transport
//! 3. Completed exactly once: by a matched response, or by `fail()` when no
//!    transport could deliver it
//!
//! Requests are shared as `Arc<dyn Request>` so that replicas of the same
//! logical request can sit in several transports at once.

mod completion;
mod delete;
mod get;
mod noop;
mod store;

use std::fmt;

use bytes::Bytes;

use crate::error::Result;
use crate::protocol::{Opcode, Response};

pub use completion::Completion;
pub use delete::DeleteRequest;
pub use get::{GetRequest, GetResult};
pub use noop::NoOpRequest;
pub use store::{StoreMode, StoreRequest, StoreResult};

/// A request that can be rendered to bytes and completed by a response
pub trait Request: Send + Sync + fmt::Debug {
    fn opcode(&self) -> Opcode;

    /// Routing key (empty for keyless commands)
    fn key(&self) -> &[u8] {
        &[]
    }

    /// Additional nodes this request may be sent to
    fn replicas(&self) -> usize {
        0
    }

    /// Render the packet for one physical send
    fn encode(&self, opaque: u32) -> Result<Bytes>;

    /// Consume the response matched to this request
    fn handle_response(&self, response: &Response);

    /// Complete with an internal error, without a response
    fn fail(&self);

    /// Called by a transport after the packet was written
    fn record_send(&self) {}

    /// Called by the dispatcher with how many nodes accepted the request
    fn dispatched(&self, accepted: usize) {
        if accepted == 0 {
            self.fail();
        }
    }
}
