//! Protocol Module
//!
//! The memcache binary protocol: headers, opcodes, statuses and the codec.
//!
//! ## Header Format (24 bytes, big-endian)
//! ```text
//!  Byte/     0       |       1       |       2       |       3       |
//!     +---------------+---------------+---------------+---------------+
//!    0| Magic         | Opcode        | Key length                    |
//!     +---------------+---------------+---------------+---------------+
//!    4| Extra length  | Data type     | vbucket / status              |
//!     +---------------+---------------+---------------+---------------+
//!    8| Total body length                                             |
//!     +---------------+---------------+---------------+---------------+
//!   12| Opaque                                                        |
//!     +---------------+---------------+---------------+---------------+
//!   16| CAS                                                           |
//!     |                                                               |
//!     +---------------+---------------+---------------+---------------+
//! ```
//!
//! ### Magic
//! - 0x80: request
//! - 0x81: response

mod codec;
mod header;
mod opcode;
mod response;
mod status;

pub use codec::{
    encode_request, encode_response, read_request, read_response, validate_key, write_request,
    MAX_BODY_SIZE, MAX_KEY_LENGTH,
};
pub use header::{RequestHeader, ResponseHeader, HEADER_SIZE, REQUEST_MAGIC, RESPONSE_MAGIC};
pub use opcode::Opcode;
pub use response::Response;
pub use status::Status;
