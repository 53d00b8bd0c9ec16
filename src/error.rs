//! Error types for memcast
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using MemcastError
pub type Result<T> = std::result::Result<T, MemcastError>;

/// Unified error type for memcast operations
#[derive(Debug, Error)]
pub enum MemcastError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Caller Errors
    // -------------------------------------------------------------------------
    /// Rejected before any network interaction (key too long, bad input)
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    // -------------------------------------------------------------------------
    // Wire Errors
    // -------------------------------------------------------------------------
    /// Framing can no longer be trusted; the connection must be reset
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("Already disposed")]
    Disposed,
}

impl MemcastError {
    /// True for wire-format violations (bad magic, correlation mismatch, ...)
    pub fn is_protocol(&self) -> bool {
        matches!(self, MemcastError::Protocol(_))
    }
}
