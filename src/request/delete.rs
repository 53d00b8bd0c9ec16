//! DELETE request

use std::fmt;

use bytes::Bytes;

use super::{Completion, Request};
use crate::error::Result;
use crate::protocol::{encode_request, Opcode, RequestHeader, Response, Status};

pub struct DeleteRequest {
    key: Bytes,
    replicas: usize,
    completion: Completion<Status>,
}

impl DeleteRequest {
    pub fn new<K, F>(key: K, callback: F) -> Self
    where
        K: Into<Bytes>,
        F: FnOnce(Status) + Send + 'static,
    {
        Self {
            key: key.into(),
            replicas: 0,
            completion: Completion::new(callback),
        }
    }

    pub fn with_replicas(mut self, replicas: usize) -> Self {
        self.replicas = replicas;
        self
    }
}

impl Request for DeleteRequest {
    fn opcode(&self) -> Opcode {
        Opcode::Delete
    }

    fn key(&self) -> &[u8] {
        &self.key
    }

    fn replicas(&self) -> usize {
        self.replicas
    }

    fn encode(&self, opaque: u32) -> Result<Bytes> {
        let header = RequestHeader {
            opaque,
            ..RequestHeader::new(Opcode::Delete)
        };
        encode_request(header, &[], &self.key, &[])
    }

    fn handle_response(&self, response: &Response) {
        self.completion.complete(response.header.status);
    }

    fn fail(&self) {
        self.completion.complete(Status::InternalError);
    }

    fn record_send(&self) {
        self.completion.record_send();
    }
}

impl fmt::Debug for DeleteRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeleteRequest")
            .field("key", &self.key)
            .field("replicas", &self.replicas)
            .field("completion", &self.completion)
            .finish()
    }
}
