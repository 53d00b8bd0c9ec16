//! Fixed-size packet headers
//!
//! Both directions share the same 24-byte layout; only the magic byte and
//! the meaning of bytes 6..8 (vbucket vs status) differ.

use bytes::{Buf, BufMut};

use super::{Opcode, Status};
use crate::error::{MemcastError, Result};

/// Size of every request and response header
pub const HEADER_SIZE: usize = 24;

/// First byte of a request packet
pub const REQUEST_MAGIC: u8 = 0x80;

/// First byte of a response packet
pub const RESPONSE_MAGIC: u8 = 0x81;

/// Header of a request sent to a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHeader {
    pub opcode: Opcode,
    pub key_length: u16,
    pub extra_length: u8,
    pub data_type: u8,
    pub vbucket: u16,
    /// extra + key + value
    pub total_body_length: u32,
    pub opaque: u32,
    pub cas: u64,
}

impl RequestHeader {
    pub fn new(opcode: Opcode) -> Self {
        Self {
            opcode,
            key_length: 0,
            extra_length: 0,
            data_type: 0,
            vbucket: 0,
            total_body_length: 0,
            opaque: 0,
            cas: 0,
        }
    }

    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(REQUEST_MAGIC);
        buf.put_u8(self.opcode as u8);
        buf.put_u16(self.key_length);
        buf.put_u8(self.extra_length);
        buf.put_u8(self.data_type);
        buf.put_u16(self.vbucket);
        buf.put_u32(self.total_body_length);
        buf.put_u32(self.opaque);
        buf.put_u64(self.cas);
    }

    /// Decode a request header
    ///
    /// Returns `Ok(None)` when fewer than `HEADER_SIZE` bytes are available.
    pub fn decode(bytes: &[u8]) -> Result<Option<Self>> {
        if bytes.len() < HEADER_SIZE {
            return Ok(None);
        }
        let mut buf = &bytes[..HEADER_SIZE];

        let magic = buf.get_u8();
        if magic != REQUEST_MAGIC {
            return Err(MemcastError::Protocol(format!(
                "Bad request magic: 0x{:02x}",
                magic
            )));
        }

        let header = Self {
            opcode: Opcode::try_from(buf.get_u8())?,
            key_length: buf.get_u16(),
            extra_length: buf.get_u8(),
            data_type: buf.get_u8(),
            vbucket: buf.get_u16(),
            total_body_length: buf.get_u32(),
            opaque: buf.get_u32(),
            cas: buf.get_u64(),
        };
        check_body_layout(header.total_body_length, header.extra_length, header.key_length)?;

        Ok(Some(header))
    }
}

/// Header of a response received from a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    pub opcode: Opcode,
    pub key_length: u16,
    pub extra_length: u8,
    pub data_type: u8,
    pub status: Status,
    /// extra + key + value
    pub total_body_length: u32,
    pub opaque: u32,
    pub cas: u64,
}

impl ResponseHeader {
    pub fn new(opcode: Opcode, status: Status) -> Self {
        Self {
            opcode,
            key_length: 0,
            extra_length: 0,
            data_type: 0,
            status,
            total_body_length: 0,
            opaque: 0,
            cas: 0,
        }
    }

    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(RESPONSE_MAGIC);
        buf.put_u8(self.opcode as u8);
        buf.put_u16(self.key_length);
        buf.put_u8(self.extra_length);
        buf.put_u8(self.data_type);
        buf.put_u16(self.status as u16);
        buf.put_u32(self.total_body_length);
        buf.put_u32(self.opaque);
        buf.put_u64(self.cas);
    }

    /// Decode a response header
    ///
    /// Returns `Ok(None)` when fewer than `HEADER_SIZE` bytes are available.
    /// A wrong magic byte is a protocol error: once it is seen the stream
    /// framing is lost.
    pub fn decode(bytes: &[u8]) -> Result<Option<Self>> {
        if bytes.len() < HEADER_SIZE {
            return Ok(None);
        }
        let mut buf = &bytes[..HEADER_SIZE];

        let magic = buf.get_u8();
        if magic != RESPONSE_MAGIC {
            return Err(MemcastError::Protocol(format!(
                "Bad response magic: 0x{:02x}",
                magic
            )));
        }

        let header = Self {
            opcode: Opcode::try_from(buf.get_u8())?,
            key_length: buf.get_u16(),
            extra_length: buf.get_u8(),
            data_type: buf.get_u8(),
            status: Status::try_from(buf.get_u16())?,
            total_body_length: buf.get_u32(),
            opaque: buf.get_u32(),
            cas: buf.get_u64(),
        };
        check_body_layout(header.total_body_length, header.extra_length, header.key_length)?;

        Ok(Some(header))
    }

    /// Bytes of value following extra and key
    pub fn value_length(&self) -> usize {
        self.total_body_length as usize - self.extra_length as usize - self.key_length as usize
    }
}

/// The body must at least hold the extra and key it announces
fn check_body_layout(total_body_length: u32, extra_length: u8, key_length: u16) -> Result<()> {
    if (total_body_length as u64) < extra_length as u64 + key_length as u64 {
        return Err(MemcastError::Protocol(format!(
            "Body length {} smaller than extra ({}) + key ({})",
            total_body_length, extra_length, key_length
        )));
    }
    Ok(())
}
