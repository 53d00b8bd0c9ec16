//! Protocol codec
//!
//! Encoding and decoding functions for the binary wire protocol.
//!
//! ## Packet Format
//! ```text
//! ┌──────────────────────────┬─────────┬─────────┬───────────────┐
//! │      Header (24)         │ Extra   │  Key    │    Value      │
//! └──────────────────────────┴─────────┴─────────┴───────────────┘
//!                             <-------- total body length -------->
//! ```
//!
//! All multi-byte integers are big-endian. The pure functions here hold no
//! state; short reads are absorbed by the stream helpers.

use std::io::{Read, Write};

use bytes::{BufMut, Bytes, BytesMut};

use super::{RequestHeader, Response, ResponseHeader, HEADER_SIZE};
use crate::error::{MemcastError, Result};

/// Largest key the 2-byte key length field can describe
pub const MAX_KEY_LENGTH: usize = u16::MAX as usize;

/// Maximum accepted body size (64 MB)
pub const MAX_BODY_SIZE: u32 = 64 * 1024 * 1024;

/// Reject keys that cannot be encoded
pub fn validate_key(key: &[u8]) -> Result<()> {
    if key.len() > MAX_KEY_LENGTH {
        return Err(MemcastError::MalformedRequest(format!(
            "Key of {} bytes exceeds the protocol limit of {}",
            key.len(),
            MAX_KEY_LENGTH
        )));
    }
    Ok(())
}

// =============================================================================
// Request Encoding/Decoding
// =============================================================================

/// Encode a request packet
///
/// Length fields of `header` are overwritten from the slices.
pub fn encode_request(
    mut header: RequestHeader,
    extra: &[u8],
    key: &[u8],
    value: &[u8],
) -> Result<Bytes> {
    let total = body_length(extra, key, value)?;
    header.key_length = key.len() as u16;
    header.extra_length = extra.len() as u8;
    header.total_body_length = total;

    let mut buf = BytesMut::with_capacity(HEADER_SIZE + total as usize);
    header.encode(&mut buf);
    put_body(&mut buf, extra, key, value);

    Ok(buf.freeze())
}

/// Check every length field can describe its slice; returns the body length
fn body_length(extra: &[u8], key: &[u8], value: &[u8]) -> Result<u32> {
    validate_key(key)?;
    if extra.len() > u8::MAX as usize {
        return Err(MemcastError::MalformedRequest(format!(
            "Extra of {} bytes exceeds the protocol limit",
            extra.len()
        )));
    }
    let total = extra.len() + key.len() + value.len();
    if total > MAX_BODY_SIZE as usize {
        return Err(MemcastError::MalformedRequest(format!(
            "Body too large: {} bytes (max {})",
            total, MAX_BODY_SIZE
        )));
    }
    Ok(total as u32)
}

fn put_body(buf: &mut BytesMut, extra: &[u8], key: &[u8], value: &[u8]) {
    buf.put_slice(extra);
    buf.put_slice(key);
    buf.put_slice(value);
}

/// Read a complete request packet from a stream
///
/// Returns the header plus extra, key and value. Used by servers and tests.
pub fn read_request<R: Read>(reader: &mut R) -> Result<(RequestHeader, Bytes, Bytes, Bytes)> {
    let mut raw = [0u8; HEADER_SIZE];
    reader.read_exact(&mut raw)?;

    let header = RequestHeader::decode(&raw)?
        .ok_or_else(|| MemcastError::Protocol("Incomplete request header".to_string()))?;
    let (extra, key, value) = read_body(
        reader,
        header.total_body_length,
        header.extra_length,
        header.key_length,
    )?;

    Ok((header, extra, key, value))
}

/// Write an encoded request to a stream
pub fn write_request<W: Write>(writer: &mut W, packet: &[u8]) -> Result<()> {
    writer.write_all(packet)?;
    writer.flush()?;
    Ok(())
}

// =============================================================================
// Response Encoding/Decoding
// =============================================================================

/// Encode a response packet
///
/// Length fields of `header` are overwritten from the slices, which are
/// held to the same limits as requests.
pub fn encode_response(
    mut header: ResponseHeader,
    extra: &[u8],
    key: &[u8],
    value: &[u8],
) -> Result<Bytes> {
    let total = body_length(extra, key, value)?;
    header.key_length = key.len() as u16;
    header.extra_length = extra.len() as u8;
    header.total_body_length = total;

    let mut buf = BytesMut::with_capacity(HEADER_SIZE + total as usize);
    header.encode(&mut buf);
    put_body(&mut buf, extra, key, value);

    Ok(buf.freeze())
}

/// Read a complete response from a stream
///
/// Blocks until the header and the whole body are received. `read_exact`
/// resumes after short reads, so partial segments never reach the decoder.
pub fn read_response<R: Read>(reader: &mut R) -> Result<Response> {
    let mut raw = [0u8; HEADER_SIZE];
    reader.read_exact(&mut raw)?;

    let header = ResponseHeader::decode(&raw)?
        .ok_or_else(|| MemcastError::Protocol("Incomplete response header".to_string()))?;
    let (extra, key, value) = read_body(
        reader,
        header.total_body_length,
        header.extra_length,
        header.key_length,
    )?;

    Ok(Response {
        header,
        extra,
        key,
        value,
    })
}

/// Read `total` body bytes and split them into extra, key and value
fn read_body<R: Read>(
    reader: &mut R,
    total: u32,
    extra_length: u8,
    key_length: u16,
) -> Result<(Bytes, Bytes, Bytes)> {
    if total > MAX_BODY_SIZE {
        return Err(MemcastError::Protocol(format!(
            "Body too large: {} bytes (max {})",
            total, MAX_BODY_SIZE
        )));
    }
    if total == 0 {
        return Ok((Bytes::new(), Bytes::new(), Bytes::new()));
    }

    let mut body = vec![0u8; total as usize];
    reader.read_exact(&mut body)?;

    let mut body = Bytes::from(body);
    let extra = body.split_to(extra_length as usize);
    let key = body.split_to(key_length as usize);

    Ok((extra, key, body))
}
