//! Round-robin locator
//!
//! Ignores the key and rotates over the nodes. Useful as a fallback and for
//! tests; gives no key affinity at all.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::NodeLocator;
use crate::config::DeadNodeRouting;
use crate::node::Node;

pub struct RoundRobinLocator {
    nodes: Vec<Arc<Node>>,
    next: AtomicUsize,
    routing: DeadNodeRouting,
}

impl RoundRobinLocator {
    pub fn new(nodes: Vec<Arc<Node>>, routing: DeadNodeRouting) -> Self {
        Self {
            nodes,
            next: AtomicUsize::new(0),
            routing,
        }
    }
}

impl NodeLocator for RoundRobinLocator {
    fn locate_replicas(&self, _key: &[u8], replicas: usize) -> Vec<Arc<Node>> {
        let count = self.nodes.len();
        if count == 0 {
            return Vec::new();
        }

        let wanted = replicas.saturating_add(1);
        let start = self.next.fetch_add(1, Ordering::Relaxed) % count;

        (0..count)
            .map(|offset| &self.nodes[(start + offset) % count])
            .filter(|node| self.routing == DeadNodeRouting::Include || node.is_alive())
            .take(wanted)
            .cloned()
            .collect()
    }

    fn nodes(&self) -> &[Arc<Node>] {
        &self.nodes
    }
}
