//! Cache node
//!
//! Pairs an address with its transports. Callers hand requests to the node
//! queue; whichever transport of the pool is free picks them up.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::RwLock;

use crate::auth::Authenticator;
use crate::config::Config;
use crate::events::TransportObservers;
use crate::request::Request;
use crate::transport::{SocketTransport, Transport, TransportOwner, TransportSettings};

/// A memcache server and its connection pool
pub struct Node {
    endpoint: String,
    alive: AtomicBool,

    disposed: AtomicBool,

    /// Held shared by enqueues; dispose takes it exclusively so no requeue
    /// can land after the final drain
    admission: RwLock<()>,

    queue: Sender<Arc<dyn Request>>,
    backlog: Receiver<Arc<dyn Request>>,
    queue_timeout: Option<Duration>,

    transports: Vec<Arc<dyn Transport>>,
}

impl Node {
    /// Build a node with `config.pool_size` transports
    ///
    /// Nothing connects until the first `try_send` or `connect`.
    pub fn new(
        endpoint: impl Into<String>,
        config: &Config,
        authenticator: Option<Arc<dyn Authenticator>>,
        observers: Arc<TransportObservers>,
    ) -> Arc<Self> {
        let endpoint = endpoint.into();
        let (queue, backlog) = if config.node_queue_length > 0 {
            channel::bounded(config.node_queue_length)
        } else {
            channel::unbounded()
        };
        let settings = TransportSettings::from(config);
        let pool_size = config.pool_size.max(1);

        Arc::new_cyclic(|weak: &Weak<Node>| {
            let owner: Weak<dyn TransportOwner> = weak.clone();
            let transports = (0..pool_size)
                .map(|_| {
                    Arc::new(SocketTransport::new(
                        endpoint.clone(),
                        settings.clone(),
                        backlog.clone(),
                        owner.clone(),
                        authenticator.clone(),
                        Arc::clone(&observers),
                    )) as Arc<dyn Transport>
                })
                .collect();

            Node {
                endpoint,
                alive: AtomicBool::new(true),
                disposed: AtomicBool::new(false),
                admission: RwLock::new(()),
                queue,
                backlog,
                queue_timeout: config.queue_timeout(),
                transports,
            }
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub fn mark_dead(&self) {
        if self.alive.swap(false, Ordering::AcqRel) {
            tracing::info!("Node {} is dead", self.endpoint);
        }
    }

    pub fn mark_alive(&self) {
        if !self.alive.swap(true, Ordering::AcqRel) {
            tracing::info!("Node {} is back", self.endpoint);
        }
    }

    /// Best-effort submission
    ///
    /// Returns false when the node is dead or disposed, or when the queue
    /// stays full past `timeout` (`None` waits forever). The caller then
    /// owns the request again and decides whether to fail it.
    pub fn try_send(&self, request: Arc<dyn Request>, timeout: Option<Duration>) -> bool {
        if !self.is_alive() {
            return false;
        }
        if !self.enqueue(request, timeout) {
            return false;
        }
        self.connect();
        true
    }

    /// Start every transport that is not connected yet
    pub fn connect(&self) {
        for transport in &self.transports {
            transport.start();
        }
    }

    pub fn transports(&self) -> &[Arc<dyn Transport>] {
        &self.transports
    }

    /// Requests waiting for a transport
    pub fn queued_count(&self) -> usize {
        self.backlog.len()
    }

    /// Requests written and not yet answered, across the pool
    pub fn pending_count(&self) -> usize {
        self.transports.iter().map(|t| t.pending_count()).sum()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Close every transport and fail requests still queued
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.alive.store(false, Ordering::Release);

        for transport in &self.transports {
            transport.dispose();
        }

        // An enqueue may be blocked on a full queue: keep making room until
        // every in-progress enqueue has finished.
        let mut failed = 0;
        loop {
            failed += self.fail_backlog();
            if self
                .admission
                .try_write_for(Duration::from_millis(10))
                .is_some()
            {
                break;
            }
        }
        failed += self.fail_backlog();

        if failed > 0 {
            tracing::debug!(
                "Failed {} queued requests of disposed node {}",
                failed,
                self.endpoint
            );
        }
    }

    fn fail_backlog(&self) -> usize {
        let mut failed = 0;
        while let Ok(request) = self.backlog.try_recv() {
            request.fail();
            failed += 1;
        }
        failed
    }

    fn enqueue(&self, request: Arc<dyn Request>, timeout: Option<Duration>) -> bool {
        let _admission = self.admission.read();
        if self.is_disposed() {
            return false;
        }
        match timeout {
            Some(timeout) => self.queue.send_timeout(request, timeout).is_ok(),
            None => self.queue.send(request).is_ok(),
        }
    }
}

impl TransportOwner for Node {
    fn requeue(&self, request: Arc<dyn Request>) -> bool {
        self.enqueue(request, self.queue_timeout)
    }

    fn transport_failed(&self, _endpoint: &str) {
        self.mark_dead();
    }

    fn transport_ready(&self, _endpoint: &str) {
        self.mark_alive();
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("endpoint", &self.endpoint)
            .field("alive", &self.is_alive())
            .field("pool_size", &self.transports.len())
            .finish()
    }
}
