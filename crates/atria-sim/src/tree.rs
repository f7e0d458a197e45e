//! Routing tree and per-node routing views.
//!
//! The tree stands in for RPL storing mode: every node knows its preferred
//! parent, and every node has one downward route per descendant, with the
//! child on the path as next hop.

use std::collections::BTreeMap;

use atria_core::NodeAddress;
use atria_rule::{RouteEntry, RoutingSnapshot};

use crate::{Result, SimError};

/// RPL minimum hop-rank increase used for simulated ranks.
pub const MIN_HOP_RANK_INCREASE: u16 = 256;

#[derive(Debug, Clone, Default)]
struct Entry {
    parent: Option<NodeAddress>,
    children: Vec<NodeAddress>,
}

/// A rooted tree of node addresses.
#[derive(Debug, Clone)]
pub struct RoutingTree {
    root: NodeAddress,
    nodes: BTreeMap<NodeAddress, Entry>,
}

impl RoutingTree {
    pub fn new(root: NodeAddress) -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(root, Entry::default());
        Self { root, nodes }
    }

    pub fn root(&self) -> NodeAddress {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, node: &NodeAddress) -> bool {
        self.nodes.contains_key(node)
    }

    /// All nodes in address order.
    pub fn nodes(&self) -> impl Iterator<Item = NodeAddress> + '_ {
        self.nodes.keys().copied()
    }

    pub fn parent(&self, node: &NodeAddress) -> Option<NodeAddress> {
        self.nodes.get(node).and_then(|e| e.parent)
    }

    /// Children in attachment order.
    pub fn children(&self, node: &NodeAddress) -> &[NodeAddress] {
        self.nodes.get(node).map_or(&[][..], |e| e.children.as_slice())
    }

    /// Every `(child, parent)` edge.
    pub fn edges(&self) -> Vec<(NodeAddress, NodeAddress)> {
        self.nodes
            .iter()
            .filter_map(|(node, entry)| entry.parent.map(|parent| (*node, parent)))
            .collect()
    }

    /// Ancestors from the parent up to the root.
    pub fn ancestors(&self, node: &NodeAddress) -> Vec<NodeAddress> {
        let mut ancestors = Vec::new();
        let mut current = self.parent(node);
        while let Some(ancestor) = current {
            ancestors.push(ancestor);
            current = self.parent(&ancestor);
        }
        ancestors
    }

    /// Hops from the root.
    pub fn depth(&self, node: &NodeAddress) -> usize {
        self.ancestors(node).len()
    }

    /// Nodes in the subtree rooted at `node`, including `node`.
    pub fn subtree_size(&self, node: &NodeAddress) -> u32 {
        1 + self
            .children(node)
            .iter()
            .map(|child| self.subtree_size(child))
            .sum::<u32>()
    }

    /// Whether `node` lies in the subtree rooted at `ancestor`.
    pub fn in_subtree(&self, node: &NodeAddress, ancestor: &NodeAddress) -> bool {
        node == ancestor || self.ancestors(node).contains(ancestor)
    }

    /// Add `node` as a child of `parent`.
    pub fn attach(&mut self, node: NodeAddress, parent: NodeAddress) -> Result<()> {
        if self.contains(&node) {
            return Err(SimError::DuplicateNode(node));
        }
        self.nodes
            .get_mut(&parent)
            .ok_or(SimError::UnknownNode(parent))?
            .children
            .push(node);
        self.nodes.insert(
            node,
            Entry {
                parent: Some(parent),
                children: Vec::new(),
            },
        );
        Ok(())
    }

    /// Remove `node`. Its children move to its parent, in order, and are
    /// returned.
    pub fn detach(&mut self, node: &NodeAddress) -> Result<Vec<NodeAddress>> {
        if *node == self.root {
            return Err(SimError::RootImmutable);
        }
        let entry = self.nodes.remove(node).ok_or(SimError::UnknownNode(*node))?;
        let parent = entry.parent.ok_or(SimError::RootImmutable)?;
        for orphan in &entry.children {
            if let Some(e) = self.nodes.get_mut(orphan) {
                e.parent = Some(parent);
            }
        }
        if let Some(e) = self.nodes.get_mut(&parent) {
            e.children.retain(|c| c != node);
            e.children.extend(entry.children.iter().copied());
        }
        Ok(entry.children)
    }

    /// Move `node` (with its subtree) below `parent`.
    pub fn reparent(&mut self, node: &NodeAddress, parent: NodeAddress) -> Result<()> {
        if *node == self.root {
            return Err(SimError::RootImmutable);
        }
        if !self.contains(node) {
            return Err(SimError::UnknownNode(*node));
        }
        if !self.contains(&parent) {
            return Err(SimError::UnknownNode(parent));
        }
        if self.in_subtree(&parent, node) {
            return Err(SimError::Loop { node: *node, parent });
        }
        if let Some(old) = self.parent(node) {
            if let Some(e) = self.nodes.get_mut(&old) {
                e.children.retain(|c| c != node);
            }
        }
        if let Some(e) = self.nodes.get_mut(&parent) {
            e.children.push(*node);
        }
        if let Some(e) = self.nodes.get_mut(node) {
            e.parent = Some(parent);
        }
        Ok(())
    }

    /// Routing snapshot as seen by `node`.
    pub fn view(&self, node: &NodeAddress) -> Option<NodeView> {
        let entry = self.nodes.get(node)?;
        let routes = entry
            .children
            .iter()
            .map(|child| RouteEntry::new(*child, self.subtree_size(child)))
            .collect();
        let hops = u16::try_from(self.depth(node) + 1).unwrap_or(u16::MAX);
        Some(NodeView {
            parent: entry.parent,
            routes,
            rank: MIN_HOP_RANK_INCREASE.saturating_mul(hops),
        })
    }
}

/// Owned routing snapshot of one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeView {
    pub parent: Option<NodeAddress>,
    pub routes: Vec<RouteEntry>,
    pub rank: u16,
}

impl RoutingSnapshot for NodeView {
    fn preferred_parent(&self) -> Option<NodeAddress> {
        self.parent
    }

    fn neighbors(&self) -> &[RouteEntry] {
        &self.routes
    }

    fn rank(&self) -> Option<u16> {
        Some(self.rank)
    }

    fn min_hop_rank_increase(&self) -> u16 {
        MIN_HOP_RANK_INCREASE
    }
}
