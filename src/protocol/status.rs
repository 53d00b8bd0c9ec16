//! Response status codes
//!
//! Application-level outcomes. These are delivered to callbacks as normal
//! results, they are not errors of the client.

use crate::error::{MemcastError, Result};

/// Response status, mapped 1:1 from the 2-byte wire value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Status {
    NoError = 0x0000,
    KeyNotFound = 0x0001,
    KeyExists = 0x0002,
    ValueTooLarge = 0x0003,
    InvalidArguments = 0x0004,
    ItemNotStored = 0x0005,
    IncrDecrNonNumeric = 0x0006,
    VBucketMismatch = 0x0007,
    AuthenticationError = 0x0020,
    AuthenticationContinue = 0x0021,
    UnknownCommand = 0x0081,
    OutOfMemory = 0x0082,
    NotSupported = 0x0083,
    InternalError = 0x0084,
    Busy = 0x0085,
    TemporaryFailure = 0x0086,
}

impl Status {
    pub fn is_success(self) -> bool {
        self == Status::NoError
    }
}

impl TryFrom<u16> for Status {
    type Error = MemcastError;

    fn try_from(code: u16) -> Result<Self> {
        let status = match code {
            0x0000 => Status::NoError,
            0x0001 => Status::KeyNotFound,
            0x0002 => Status::KeyExists,
            0x0003 => Status::ValueTooLarge,
            0x0004 => Status::InvalidArguments,
            0x0005 => Status::ItemNotStored,
            0x0006 => Status::IncrDecrNonNumeric,
            0x0007 => Status::VBucketMismatch,
            0x0020 => Status::AuthenticationError,
            0x0021 => Status::AuthenticationContinue,
            0x0081 => Status::UnknownCommand,
            0x0082 => Status::OutOfMemory,
            0x0083 => Status::NotSupported,
            0x0084 => Status::InternalError,
            0x0085 => Status::Busy,
            0x0086 => Status::TemporaryFailure,
            _ => {
                return Err(MemcastError::Protocol(format!(
                    "Unknown response status: 0x{:04x}",
                    code
                )))
            }
        };
        Ok(status)
    }
}
