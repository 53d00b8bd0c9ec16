//! GET request

use std::fmt;

use bytes::Bytes;

use super::{Completion, Request};
use crate::error::Result;
use crate::protocol::{encode_request, Opcode, RequestHeader, Response, Status};

/// Size of the flag word a successful GET carries as extra
const FLAGS_LENGTH: usize = 4;

/// Outcome handed to a GET callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetResult {
    pub key: Bytes,
    pub status: Status,
    pub flags: u32,
    pub value: Option<Bytes>,
    pub cas: u64,
}

impl GetResult {
    fn failed(key: Bytes) -> Self {
        Self {
            key,
            status: Status::InternalError,
            flags: 0,
            value: None,
            cas: 0,
        }
    }
}

/// Fetch a value, optionally from several replicas
pub struct GetRequest {
    key: Bytes,
    replicas: usize,
    completion: Completion<GetResult>,
}

impl GetRequest {
    pub fn new<K, F>(key: K, callback: F) -> Self
    where
        K: Into<Bytes>,
        F: FnOnce(GetResult) + Send + 'static,
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

    /// Physical sends written so far
    pub fn sends(&self) -> usize {
        self.completion.sends()
    }
}

impl Request for GetRequest {
    fn opcode(&self) -> Opcode {
        Opcode::Get
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
            ..RequestHeader::new(Opcode::Get)
        };
        encode_request(header, &[], &self.key, &[])
    }

    fn handle_response(&self, response: &Response) {
        let header = &response.header;

        let result = if header.status == Status::NoError {
            if response.extra.len() != FLAGS_LENGTH {
                tracing::warn!(
                    "GET {:?}: success carries {} bytes of extra instead of a {}-byte flag",
                    self.key,
                    response.extra.len(),
                    FLAGS_LENGTH
                );
                GetResult::failed(self.key.clone())
            } else {
                let mut word = [0u8; FLAGS_LENGTH];
                word.copy_from_slice(&response.extra);
                GetResult {
                    key: self.key.clone(),
                    status: Status::NoError,
                    flags: u32::from_be_bytes(word),
                    value: Some(response.value.clone()),
                    cas: header.cas,
                }
            }
        } else {
            GetResult {
                key: self.key.clone(),
                status: header.status,
                flags: 0,
                value: None,
                cas: header.cas,
            }
        };

        self.completion.complete(result);
    }

    fn fail(&self) {
        self.completion.complete(GetResult::failed(self.key.clone()));
    }

    fn record_send(&self) {
        self.completion.record_send();
    }
}

impl fmt::Debug for GetRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GetRequest")
            .field("key", &self.key)
            .field("replicas", &self.replicas)
            .field("completion", &self.completion)
            .finish()
    }
}
