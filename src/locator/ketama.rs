//! Ketama consistent hashing
//!
//! Every node contributes `POINTS_PER_NODE` points to a ring of u32
//! positions. A key belongs to the first point at or after its own
//! position, wrapping at the end; replicas continue clockwise to the next
//! distinct nodes. Adding or removing a node only moves the keys that fall
//! on that node's arcs, roughly `1/N` of them.

use std::sync::Arc;

use super::NodeLocator;
use crate::config::{DeadNodeRouting, HashAlgorithm};
use crate::node::Node;

/// Ring points per node
pub const POINTS_PER_NODE: usize = 160;

/// Consistent hash ring over a node snapshot
pub struct KetamaLocator {
    nodes: Vec<Arc<Node>>,

    /// (position, node index), sorted by position
    ring: Vec<(u32, usize)>,

    hash: HashAlgorithm,
    routing: DeadNodeRouting,
}

impl KetamaLocator {
    pub fn build(nodes: Vec<Arc<Node>>, hash: HashAlgorithm, routing: DeadNodeRouting) -> Self {
        let mut ring = Vec::with_capacity(nodes.len() * POINTS_PER_NODE);
        for (index, node) in nodes.iter().enumerate() {
            for position in node_points(hash, node.endpoint()) {
                ring.push((position, index));
            }
        }

        // A colliding position goes to the smallest endpoint, so the ring
        // does not depend on the order nodes were added in
        ring.sort_unstable_by(|(a, a_node), (b, b_node)| {
            a.cmp(b)
                .then_with(|| nodes[*a_node].endpoint().cmp(nodes[*b_node].endpoint()))
        });
        ring.dedup_by_key(|(position, _)| *position);

        tracing::debug!(
            "Built ketama ring: {} nodes, {} points",
            nodes.len(),
            ring.len()
        );

        Self {
            nodes,
            ring,
            hash,
            routing,
        }
    }

    /// Number of points on the ring
    pub fn ring_len(&self) -> usize {
        self.ring.len()
    }

    fn is_candidate(&self, node: &Node) -> bool {
        self.routing == DeadNodeRouting::Include || node.is_alive()
    }
}

impl NodeLocator for KetamaLocator {
    fn locate_replicas(&self, key: &[u8], replicas: usize) -> Vec<Arc<Node>> {
        if self.ring.is_empty() {
            return Vec::new();
        }

        let wanted = replicas.saturating_add(1);
        let position = key_position(self.hash, key);
        let start = self.ring.partition_point(|(point, _)| *point < position);

        let mut seen = vec![false; self.nodes.len()];
        let mut seen_count = 0;
        let mut found = Vec::with_capacity(wanted.min(self.nodes.len()));

        for offset in 0..self.ring.len() {
            let (_, index) = self.ring[(start + offset) % self.ring.len()];
            if seen[index] {
                continue;
            }
            seen[index] = true;
            seen_count += 1;

            let node = &self.nodes[index];
            if self.is_candidate(node) {
                found.push(Arc::clone(node));
                if found.len() == wanted {
                    break;
                }
            }
            if seen_count == self.nodes.len() {
                break;
            }
        }

        found
    }

    fn nodes(&self) -> &[Arc<Node>] {
        &self.nodes
    }
}

/// Ring positions of a node
///
/// BLAKE3 digests are split into eight words, so each hashed label yields
/// eight points; CRC32 yields one point per label.
fn node_points(hash: HashAlgorithm, identity: &str) -> Vec<u32> {
    let mut points = Vec::with_capacity(POINTS_PER_NODE);
    match hash {
        HashAlgorithm::Blake3 => {
            let mut label = 0;
            while points.len() < POINTS_PER_NODE {
                let digest = blake3::hash(format!("{}-{}", identity, label).as_bytes());
                for word in digest.as_bytes().chunks_exact(4) {
                    if points.len() == POINTS_PER_NODE {
                        break;
                    }
                    points.push(u32::from_be_bytes([word[0], word[1], word[2], word[3]]));
                }
                label += 1;
            }
        }
        HashAlgorithm::Crc32 => {
            for label in 0..POINTS_PER_NODE {
                points.push(crc32fast::hash(
                    format!("{}-{}", identity, label).as_bytes(),
                ));
            }
        }
    }
    points
}

fn key_position(hash: HashAlgorithm, key: &[u8]) -> u32 {
    match hash {
        HashAlgorithm::Blake3 => {
            let digest = blake3::hash(key);
            let bytes = digest.as_bytes();
            u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
        }
        HashAlgorithm::Crc32 => crc32fast::hash(key),
    }
}
