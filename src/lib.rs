//! # memcast
//!
//! A memcache binary protocol client with:
//! - Pipelined transports matching responses to requests in FIFO order
//! - Bounded pending-request registries for backpressure
//! - Transparent reconnection with requeue or fail of in-flight work
//! - Ketama consistent hashing with replica fan-out
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     MemcacheCluster                          │
//! │              (validate key, locate, dispatch)                │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                      NodeLocator                             │
//! │                (ketama ring / round-robin)                   │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │  replicas + 1 nodes
//!          ┌────────────┴────────────┐
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │    Node     │          │    Node     │
//!   │   (queue)   │          │   (queue)   │
//!   └──────┬──────┘          └─────────────┘
//!          │  pool_size transports
//!          ▼
//!   ┌─────────────────────────────┐
//!   │       SocketTransport       │
//!   │ send thread ─► registry ─►  │
//!   │ recv thread ◄─ match opaque │
//!   └─────────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod protocol;
pub mod request;
pub mod events;
pub mod auth;
pub mod transport;
pub mod node;
pub mod locator;
pub mod cluster;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{MemcastError, Result};
pub use config::Config;
pub use cluster::MemcacheCluster;
pub use node::Node;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of memcast
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
