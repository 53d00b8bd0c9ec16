//! Locator Module
//!
//! Maps keys to nodes.
//!
//! ## Responsibilities
//! - Resolve a key to its node, or to `replicas + 1` distinct nodes
//! - Skip or keep dead nodes depending on `DeadNodeRouting`
//!
//! A locator is an immutable snapshot of the node set. Membership changes
//! build a new one and swap it in, so a lookup never sees a half-built ring.

mod ketama;
mod round_robin;

use std::sync::Arc;

use crate::config::{Config, LocatorKind};
use crate::node::Node;

pub use ketama::{KetamaLocator, POINTS_PER_NODE};
pub use round_robin::RoundRobinLocator;

/// Key to node resolution over a fixed node set
pub trait NodeLocator: Send + Sync {
    /// The node owning `key`, `None` only when no candidate is left
    fn locate(&self, key: &[u8]) -> Option<Arc<Node>> {
        self.locate_replicas(key, 0).into_iter().next()
    }

    /// Up to `replicas + 1` distinct nodes, primary first
    fn locate_replicas(&self, key: &[u8], replicas: usize) -> Vec<Arc<Node>>;

    /// The node set this locator was built from
    fn nodes(&self) -> &[Arc<Node>];
}

/// Build the locator selected by `config` over `nodes`
pub fn build_locator(config: &Config, nodes: Vec<Arc<Node>>) -> Arc<dyn NodeLocator> {
    match config.locator {
        LocatorKind::Ketama => Arc::new(KetamaLocator::build(
            nodes,
            config.hash,
            config.dead_node_routing,
        )),
        LocatorKind::RoundRobin => {
            Arc::new(RoundRobinLocator::new(nodes, config.dead_node_routing))
        }
    }
}
