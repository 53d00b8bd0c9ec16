//! Storage requests (SET / ADD / REPLACE / APPEND / PREPEND)

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use super::{Completion, Request};
use crate::error::Result;
use crate::protocol::{encode_request, Opcode, RequestHeader, Response, Status};

/// Which storage command to issue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    Set,
    Add,
    Replace,
    Append,
    Prepend,
}

impl StoreMode {
    pub fn opcode(self) -> Opcode {
        match self {
            StoreMode::Set => Opcode::Set,
            StoreMode::Add => Opcode::Add,
            StoreMode::Replace => Opcode::Replace,
            StoreMode::Append => Opcode::Append,
            StoreMode::Prepend => Opcode::Prepend,
        }
    }

    /// APPEND and PREPEND carry no flags/expiration extra
    fn has_extra(self) -> bool {
        matches!(self, StoreMode::Set | StoreMode::Add | StoreMode::Replace)
    }
}

/// Outcome handed to a storage callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreResult {
    pub status: Status,
    pub cas: u64,
}

/// Store a value under a key
pub struct StoreRequest {
    mode: StoreMode,
    key: Bytes,
    value: Bytes,
    flags: u32,
    expiration: u32,
    cas: u64,
    replicas: usize,
    completion: Completion<StoreResult>,
}

impl StoreRequest {
    pub fn new<K, V, F>(mode: StoreMode, key: K, value: V, callback: F) -> Self
    where
        K: Into<Bytes>,
        V: Into<Bytes>,
        F: FnOnce(StoreResult) + Send + 'static,
    {
        Self {
            mode,
            key: key.into(),
            value: value.into(),
            flags: 0,
            expiration: 0,
            cas: 0,
            replicas: 0,
            completion: Completion::new(callback),
        }
    }

    pub fn flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    /// Expiration in seconds (or a unix timestamp past 30 days)
    pub fn expiration(mut self, expiration: u32) -> Self {
        self.expiration = expiration;
        self
    }

    /// Only store if the item's CAS still matches
    pub fn cas(mut self, cas: u64) -> Self {
        self.cas = cas;
        self
    }

    pub fn with_replicas(mut self, replicas: usize) -> Self {
        self.replicas = replicas;
        self
    }

    pub fn mode(&self) -> StoreMode {
        self.mode
    }
}

impl Request for StoreRequest {
    fn opcode(&self) -> Opcode {
        self.mode.opcode()
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
            cas: self.cas,
            ..RequestHeader::new(self.mode.opcode())
        };

        let mut extra = BytesMut::with_capacity(8);
        if self.mode.has_extra() {
            extra.put_u32(self.flags);
            extra.put_u32(self.expiration);
        }

        encode_request(header, &extra, &self.key, &self.value)
    }

    fn handle_response(&self, response: &Response) {
        self.completion.complete(StoreResult {
            status: response.header.status,
            cas: response.header.cas,
        });
    }

    fn fail(&self) {
        self.completion.complete(StoreResult {
            status: Status::InternalError,
            cas: 0,
        });
    }

    fn record_send(&self) {
        self.completion.record_send();
    }
}

impl fmt::Debug for StoreRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreRequest")
            .field("mode", &self.mode)
            .field("key", &self.key)
            .field("value_len", &self.value.len())
            .field("replicas", &self.replicas)
            .field("completion", &self.completion)
            .finish()
    }
}
