//! Fixed-Capacity Multi-Node Registry
//!
//! Multi-receiver boards run several [`RssiNode`]s on one processor, each
//! bound to its own tuner. The registry owns them in a `heapless::Vec` and
//! tracks which node the command handler is currently addressing, replacing
//! the original firmware's file-scope node array and "current node" pointer
//! with an explicit object the protocol dispatcher borrows.
//!
//! Nodes are fully independent of each other; only the tuner-bus timing
//! guard (see [`crate::rx5808::BusGuard`]) is shared across them.

use heapless::Vec;

use crate::median::{SMOOTHING_SAMPLES, SMOOTHING_TIMESTAMPS};
use crate::node::RssiNode;

/// Registry of up to `N` receiver nodes with an active-node cursor.
///
/// `W`/`H` are forwarded to every node's smoothing filter.
#[derive(Debug)]
pub struct NodeRegistry<
    const N: usize,
    const W: usize = SMOOTHING_SAMPLES,
    const H: usize = SMOOTHING_TIMESTAMPS,
> {
    nodes: Vec<RssiNode<W, H>, N>,
    active: usize,
}

impl<const N: usize, const W: usize, const H: usize> NodeRegistry<N, W, H> {
    /// Create a registry holding `count` nodes (clamped to `N`), indexed
    /// from zero. Node 0 starts as the active node.
    pub fn new(count: usize) -> Self {
        let mut nodes = Vec::new();
        for i in 0..count.min(N) {
            // capacity ensured by the clamp above
            let _ = nodes.push(RssiNode::new(i as u8));
        }
        Self { nodes, active: 0 }
    }

    /// Number of nodes present.
    pub fn count(&self) -> usize {
        self.nodes.len()
    }

    /// Index of the node the command handler is addressing.
    pub fn active_index(&self) -> usize {
        self.active
    }

    /// Point the command handler at node `index`.
    ///
    /// Out-of-range selections are ignored, per the protocol contract;
    /// returns whether the selection was applied.
    pub fn select(&mut self, index: usize) -> bool {
        if index < self.nodes.len() {
            self.active = index;
            true
        } else {
            false
        }
    }

    /// The node the command handler is addressing.
    pub fn active(&self) -> &RssiNode<W, H> {
        &self.nodes[self.active]
    }

    /// Mutable access to the addressed node.
    pub fn active_mut(&mut self) -> &mut RssiNode<W, H> {
        &mut self.nodes[self.active]
    }

    /// Node at `index`, if present.
    pub fn get(&self, index: usize) -> Option<&RssiNode<W, H>> {
        self.nodes.get(index)
    }

    /// Mutable node at `index`, if present.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut RssiNode<W, H>> {
        self.nodes.get_mut(index)
    }

    /// Iterate all nodes mutably; the sampling loop walks this every tick.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut RssiNode<W, H>> {
        self.nodes.iter_mut()
    }
}
