//! Response definitions
//!
//! A fully read response packet.

use bytes::Bytes;

use super::ResponseHeader;

/// A decoded response: header plus the three body sections
#[derive(Debug, Clone)]
pub struct Response {
    pub header: ResponseHeader,
    pub extra: Bytes,
    pub key: Bytes,
    pub value: Bytes,
}

impl Response {
    /// Response without any body
    pub fn bare(header: ResponseHeader) -> Self {
        Self {
            header,
            extra: Bytes::new(),
            key: Bytes::new(),
            value: Bytes::new(),
        }
    }
}
