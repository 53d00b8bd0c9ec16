//! Cluster Module
//!
//! Owns the node set and the active locator, and dispatches requests.
//!
//! ## Dispatch
//! 1. Validate the key (synchronous `MalformedRequest` on failure)
//! 2. Ask the locator for `replicas + 1` nodes
//! 3. Offer the request to each; count acceptances
//! 4. `Request::dispatched` fails the request if nobody took it
//!
//! Membership changes rebuild the locator and swap it in whole.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;

use crate::auth::Authenticator;
use crate::config::Config;
use crate::error::{MemcastError, Result};
use crate::events::{ClusterObserver, Observers, TransportObservers};
use crate::locator::{build_locator, NodeLocator};
use crate::node::Node;
use crate::protocol::{validate_key, ResponseHeader, Status};
use crate::request::{
    DeleteRequest, GetRequest, GetResult, NoOpRequest, Request, StoreMode, StoreRequest,
    StoreResult,
};

/// A set of memcache nodes behind one dispatcher
pub struct MemcacheCluster {
    config: Config,
    authenticator: Option<Arc<dyn Authenticator>>,

    nodes: RwLock<Vec<Arc<Node>>>,
    locator: RwLock<Arc<dyn NodeLocator>>,

    observers: Observers<dyn ClusterObserver>,
    transport_observers: Arc<TransportObservers>,

    disposed: AtomicBool,
}

impl MemcacheCluster {
    /// Create an empty cluster; call `initialize` to add the configured nodes
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let locator = build_locator(&config, Vec::new());

        Ok(Self {
            config,
            authenticator: None,
            nodes: RwLock::new(Vec::new()),
            locator: RwLock::new(locator),
            observers: Observers::new(),
            transport_observers: Arc::new(TransportObservers::new()),
            disposed: AtomicBool::new(false),
        })
    }

    /// Authenticate every connection of nodes added from now on
    pub fn with_authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    /// Add a node for every configured endpoint
    pub fn initialize(&self) -> Result<()> {
        tracing::info!(
            "Initializing cluster with {} endpoints",
            self.config.endpoints.len()
        );
        for endpoint in &self.config.endpoints {
            self.add_node(endpoint.clone())?;
        }
        Ok(())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Add a node; fails if the endpoint is already a member
    pub fn add_node(&self, endpoint: impl Into<String>) -> Result<Arc<Node>> {
        if self.is_disposed() {
            return Err(MemcastError::Disposed);
        }
        let endpoint = endpoint.into();

        let node = {
            let mut nodes = self.nodes.write();
            if nodes.iter().any(|node| node.endpoint() == endpoint) {
                return Err(MemcastError::Config(format!(
                    "Node {} is already in the cluster",
                    endpoint
                )));
            }

            let node = Node::new(
                endpoint,
                &self.config,
                self.authenticator.clone(),
                Arc::clone(&self.transport_observers),
            );
            nodes.push(Arc::clone(&node));
            *self.locator.write() = build_locator(&self.config, nodes.clone());
            node
        };

        tracing::info!("Added node {}", node.endpoint());
        self.observers.notify(|observer| observer.on_node_added(&node));
        Ok(node)
    }

    /// Remove and dispose a node; returns it, or `None` if unknown
    pub fn remove_node(&self, endpoint: &str) -> Option<Arc<Node>> {
        let node = {
            let mut nodes = self.nodes.write();
            let position = nodes.iter().position(|node| node.endpoint() == endpoint)?;
            let node = nodes.remove(position);
            *self.locator.write() = build_locator(&self.config, nodes.clone());
            node
        };

        node.dispose();
        tracing::info!("Removed node {}", endpoint);
        self.observers.notify(|observer| observer.on_node_removed(&node));
        Some(node)
    }

    pub fn nodes(&self) -> Vec<Arc<Node>> {
        self.nodes.read().clone()
    }

    pub fn node(&self, endpoint: &str) -> Option<Arc<Node>> {
        self.nodes
            .read()
            .iter()
            .find(|node| node.endpoint() == endpoint)
            .cloned()
    }

    /// The current locator snapshot
    pub fn locator(&self) -> Arc<dyn NodeLocator> {
        Arc::clone(&self.locator.read())
    }

    /// Membership events
    pub fn observers(&self) -> &Observers<dyn ClusterObserver> {
        &self.observers
    }

    /// Transport events of every node
    pub fn transport_observers(&self) -> &Arc<TransportObservers> {
        &self.transport_observers
    }

    /// Dispatch a request to its nodes
    ///
    /// Returns how many nodes accepted it. An `Err` means the request was
    /// rejected up front and its callback will not run; `Ok(0)` means no
    /// node took it and the callback already ran with an internal error.
    pub fn send(&self, request: Arc<dyn Request>) -> Result<usize> {
        if self.is_disposed() {
            return Err(MemcastError::Disposed);
        }
        validate_key(request.key())?;

        let candidates = self
            .locator()
            .locate_replicas(request.key(), request.replicas());
        let timeout = self.config.queue_timeout();

        let mut accepted = 0;
        for node in &candidates {
            if node.try_send(Arc::clone(&request), timeout) {
                accepted += 1;
            } else {
                tracing::trace!("Node {} refused {:?}", node.endpoint(), request.opcode());
            }
        }

        if accepted == 0 {
            tracing::debug!(
                "No node accepted {:?} ({} candidates)",
                request.opcode(),
                candidates.len()
            );
        }
        request.dispatched(accepted);
        Ok(accepted)
    }

    /// Get `key`, replicated per `Config::replicas`
    pub fn get<K, F>(&self, key: K, callback: F) -> Result<usize>
    where
        K: Into<Bytes>,
        F: FnOnce(GetResult) + Send + 'static,
    {
        let request = GetRequest::new(key, callback).with_replicas(self.config.replicas);
        self.send(Arc::new(request))
    }

    /// Set `key` unconditionally
    pub fn set<K, V, F>(
        &self,
        key: K,
        value: V,
        flags: u32,
        expiration: u32,
        callback: F,
    ) -> Result<usize>
    where
        K: Into<Bytes>,
        V: Into<Bytes>,
        F: FnOnce(StoreResult) + Send + 'static,
    {
        let request = StoreRequest::new(StoreMode::Set, key, value, callback)
            .flags(flags)
            .expiration(expiration)
            .with_replicas(self.config.replicas);
        self.send(Arc::new(request))
    }

    pub fn delete<K, F>(&self, key: K, callback: F) -> Result<usize>
    where
        K: Into<Bytes>,
        F: FnOnce(Status) + Send + 'static,
    {
        let request = DeleteRequest::new(key, callback).with_replicas(self.config.replicas);
        self.send(Arc::new(request))
    }

    /// Send a NoOp straight to `endpoint`, bypassing the locator
    pub fn noop<F>(&self, endpoint: &str, callback: F) -> Result<bool>
    where
        F: FnOnce(ResponseHeader) + Send + 'static,
    {
        let node = self.node(endpoint).ok_or_else(|| {
            MemcastError::Config(format!("Node {} is not in the cluster", endpoint))
        })?;

        let request: Arc<dyn Request> = Arc::new(NoOpRequest::new(callback));
        let accepted = node.try_send(Arc::clone(&request), self.config.queue_timeout());
        request.dispatched(usize::from(accepted));
        Ok(accepted)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Dispose every node; pending and queued requests complete with errors
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        let nodes = std::mem::take(&mut *self.nodes.write());
        *self.locator.write() = build_locator(&self.config, Vec::new());

        for node in &nodes {
            node.dispose();
        }
        tracing::info!("Cluster disposed ({} nodes)", nodes.len());
    }
}

impl Drop for MemcacheCluster {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for MemcacheCluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemcacheCluster")
            .field("nodes", &*self.nodes.read())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
