//! NOOP request
//!
//! Keyless round trip, used as a health probe.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use bytes::Bytes;

use super::{Completion, Request};
use crate::error::Result;
use crate::protocol::{encode_request, Opcode, RequestHeader, Response, ResponseHeader, Status};

pub struct NoOpRequest {
    /// Opaque of the latest send, echoed in synthesized failures
    opaque: AtomicU32,
    completion: Completion<ResponseHeader>,
}

impl NoOpRequest {
    pub fn new<F>(callback: F) -> Self
    where
        F: FnOnce(ResponseHeader) + Send + 'static,
    {
        Self {
            opaque: AtomicU32::new(0),
            completion: Completion::new(callback),
        }
    }
}

impl Request for NoOpRequest {
    fn opcode(&self) -> Opcode {
        Opcode::NoOp
    }

    fn encode(&self, opaque: u32) -> Result<Bytes> {
        self.opaque.store(opaque, Ordering::Release);
        let header = RequestHeader {
            opaque,
            ..RequestHeader::new(Opcode::NoOp)
        };
        encode_request(header, &[], &[], &[])
    }

    fn handle_response(&self, response: &Response) {
        self.completion.complete(response.header);
    }

    fn fail(&self) {
        let header = ResponseHeader {
            opaque: self.opaque.load(Ordering::Acquire),
            ..ResponseHeader::new(Opcode::NoOp, Status::InternalError)
        };
        self.completion.complete(header);
    }

    fn record_send(&self) {
        self.completion.record_send();
    }
}

impl fmt::Debug for NoOpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NoOpRequest")
            .field("opaque", &self.opaque.load(Ordering::Relaxed))
            .field("completion", &self.completion)
            .finish()
    }
}
