//! Configuration for memcast
//!
//! Centralized configuration with sensible defaults. Values are read once
//! when nodes and transports are built and never re-read afterwards.

use std::time::Duration;

use crate::error::{MemcastError, Result};

/// Main configuration for a memcast cluster
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Cluster Configuration
    // -------------------------------------------------------------------------
    /// Node addresses (host:port)
    pub endpoints: Vec<String>,

    /// Which locator maps keys to nodes
    pub locator: LocatorKind,

    /// Hash used by the ketama locator for ring points and keys
    pub hash: HashAlgorithm,

    /// Whether dead nodes stay locator candidates
    pub dead_node_routing: DeadNodeRouting,

    /// Number of additional nodes a keyed request is sent to
    pub replicas: usize,

    // -------------------------------------------------------------------------
    // Node Configuration
    // -------------------------------------------------------------------------
    /// What happens to in-flight requests of a transport that went down
    pub node_dead_policy: RequeuePolicy,

    /// Capacity of the per-node request queue (0 = unbounded)
    pub node_queue_length: usize,

    /// How long `Node::try_send` waits for queue space (0 = forever)
    pub queue_timeout_ms: u64,

    /// Transports (connections) per node
    pub pool_size: usize,

    // -------------------------------------------------------------------------
    // Transport Configuration
    // -------------------------------------------------------------------------
    /// Max in-flight requests per transport (0 = unbounded)
    pub transport_queue_length: usize,

    /// How long admission waits for an in-flight slot (0 = forever)
    pub transport_queue_timeout_ms: u64,

    /// Connect and write timeout (0 = none)
    pub socket_timeout_ms: u64,

    /// Delay before the first timed reconnect attempt
    pub reconnect_delay_ms: u64,

    /// Delay between subsequent reconnect attempts
    pub reconnect_interval_ms: u64,
}

/// Locator implementation selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocatorKind {
    /// Consistent hash ring with virtual points per node
    Ketama,

    /// Rotates over live nodes, ignores the key
    RoundRobin,
}

/// Hash function for the ketama ring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Blake3,
    Crc32,
}

/// Whether a dead node can still be returned by the locator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadNodeRouting {
    /// Walk past dead nodes to the next live one
    Skip,

    /// Keep dead nodes as candidates and let `try_send` refuse them
    Include,
}

/// Fate of in-flight requests when their transport resets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequeuePolicy {
    /// Resubmit to the owning node once it reconnects
    Requeue,

    /// Fail them immediately
    Ignore,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            locator: LocatorKind::Ketama,
            hash: HashAlgorithm::Blake3,
            dead_node_routing: DeadNodeRouting::Skip,
            replicas: 0,
            node_dead_policy: RequeuePolicy::Ignore,
            node_queue_length: 0,
            queue_timeout_ms: 0,
            pool_size: 1,
            transport_queue_length: 1000,
            transport_queue_timeout_ms: 0,
            socket_timeout_ms: 200,
            reconnect_delay_ms: 1000,
            reconnect_interval_ms: 5000,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check values that would leave a cluster unusable
    pub fn validate(&self) -> Result<()> {
        if self.pool_size == 0 {
            return Err(MemcastError::Config(
                "pool_size must be at least 1".to_string(),
            ));
        }
        if self.reconnect_interval_ms == 0 {
            return Err(MemcastError::Config(
                "reconnect_interval_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn queue_timeout(&self) -> Option<Duration> {
        millis(self.queue_timeout_ms)
    }

    pub fn transport_queue_timeout(&self) -> Option<Duration> {
        millis(self.transport_queue_timeout_ms)
    }

    pub fn socket_timeout(&self) -> Option<Duration> {
        millis(self.socket_timeout_ms)
    }
}

/// 0 means "no limit"
fn millis(ms: u64) -> Option<Duration> {
    if ms > 0 {
        Some(Duration::from_millis(ms))
    } else {
        None
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Add a node address
    pub fn endpoint(mut self, addr: impl Into<String>) -> Self {
        self.config.endpoints.push(addr.into());
        self
    }

    /// Replace the node address list
    pub fn endpoints<I, S>(mut self, addrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.endpoints = addrs.into_iter().map(Into::into).collect();
        self
    }

    pub fn locator(mut self, kind: LocatorKind) -> Self {
        self.config.locator = kind;
        self
    }

    pub fn hash(mut self, hash: HashAlgorithm) -> Self {
        self.config.hash = hash;
        self
    }

    pub fn dead_node_routing(mut self, routing: DeadNodeRouting) -> Self {
        self.config.dead_node_routing = routing;
        self
    }

    pub fn replicas(mut self, replicas: usize) -> Self {
        self.config.replicas = replicas;
        self
    }

    pub fn node_dead_policy(mut self, policy: RequeuePolicy) -> Self {
        self.config.node_dead_policy = policy;
        self
    }

    pub fn node_queue_length(mut self, length: usize) -> Self {
        self.config.node_queue_length = length;
        self
    }

    pub fn queue_timeout_ms(mut self, ms: u64) -> Self {
        self.config.queue_timeout_ms = ms;
        self
    }

    pub fn pool_size(mut self, size: usize) -> Self {
        self.config.pool_size = size;
        self
    }

    /// Set the in-flight request limit per transport
    pub fn transport_queue_length(mut self, length: usize) -> Self {
        self.config.transport_queue_length = length;
        self
    }

    pub fn transport_queue_timeout_ms(mut self, ms: u64) -> Self {
        self.config.transport_queue_timeout_ms = ms;
        self
    }

    pub fn socket_timeout_ms(mut self, ms: u64) -> Self {
        self.config.socket_timeout_ms = ms;
        self
    }

    pub fn reconnect_delay_ms(mut self, ms: u64) -> Self {
        self.config.reconnect_delay_ms = ms;
        self
    }

    pub fn reconnect_interval_ms(mut self, ms: u64) -> Self {
        self.config.reconnect_interval_ms = ms;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
