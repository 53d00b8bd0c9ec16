//! Observer lists
//!
//! Transports and clusters report faults, responses and membership changes
//! to any number of subscribers. Subscribing and unsubscribing are plain
//! edits of a list; notification iterates over a snapshot so an observer
//! may change the list from inside a callback.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::MemcastError;
use crate::node::Node;
use crate::protocol::ResponseHeader;

/// Handle returned by `Observers::subscribe`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Subscribers to transport activity
///
/// Callbacks run on transport threads and must not block.
pub trait TransportObserver: Send + Sync {
    /// Socket or protocol fault that triggered a reset
    fn on_transport_error(&self, _endpoint: &str, _error: &MemcastError) {}

    /// Every matched response
    fn on_response(&self, _endpoint: &str, _header: &ResponseHeader) {}

    /// Matched responses whose status is not NoError
    fn on_memcache_error(&self, _endpoint: &str, _header: &ResponseHeader) {}
}

/// Subscribers to cluster membership
pub trait ClusterObserver: Send + Sync {
    fn on_node_added(&self, _node: &Arc<Node>) {}

    fn on_node_removed(&self, _node: &Arc<Node>) {}
}

/// An ordered list of observers
pub struct Observers<O: ?Sized> {
    next_id: AtomicU64,
    entries: RwLock<Vec<(SubscriptionId, Arc<O>)>>,
}

impl<O: ?Sized> Observers<O> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: RwLock::new(Vec::new()),
        }
    }

    pub fn subscribe(&self, observer: Arc<O>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.write().push((id, observer));
        id
    }

    /// Returns false if `id` was not subscribed
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Call `f` on every observer, in subscription order
    pub fn notify<F>(&self, mut f: F)
    where
        F: FnMut(&O),
    {
        let snapshot: Vec<Arc<O>> = self
            .entries
            .read()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();

        for observer in &snapshot {
            f(observer);
        }
    }
}

impl<O: ?Sized> Default for Observers<O> {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer list shared by every transport of a cluster
pub type TransportObservers = Observers<dyn TransportObserver>;
