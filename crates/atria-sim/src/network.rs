//! Simulated network: one unicast rule and one MAC per node.
//!
//! Topology changes are applied to the [`RoutingTree`] first, then every
//! node whose routing view changed receives the event its routing stack
//! would raise. [`Network::audit`] then checks that both ends of every tree
//! edge derived the same cells.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use atria_core::{Cell, CellCoord, Epoch, Link, NodeAddress, ScheduleConfig};
use atria_rule::{ChildKind, OutgoingFrame, RebuildReport, SlotframeHandle, UnicastRule, DEFAULT_UNICAST_HANDLE};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use crate::{MemoryHost, NetworkSnapshot, NodeSnapshot, NodeView, Result, RoutingTree, SimError};

/// A node: its scheduling rule and its MAC.
#[derive(Debug, Clone)]
pub struct SimNode {
    pub rule: UnicastRule,
    pub host: MemoryHost,
}

/// A broken agreement found by [`Network::audit`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Disagreement {
    /// The child transmits upward on cells the parent does not listen on,
    /// or the reverse.
    Upstream {
        child: NodeAddress,
        parent: NodeAddress,
        child_tx: Vec<CellCoord>,
        parent_rx: Vec<CellCoord>,
    },
    /// The parent transmits downward on cells the child does not listen on,
    /// or the reverse.
    Downstream {
        child: NodeAddress,
        parent: NodeAddress,
        parent_tx: Vec<CellCoord>,
        child_rx: Vec<CellCoord>,
    },
    /// A data frame from `from` to `to` resolves to no cell `to` listens on.
    Unresolved { from: NodeAddress, to: NodeAddress },
    /// The rule's view of its cells differs from the MAC's.
    HostDrift { node: NodeAddress },
}

impl fmt::Display for Disagreement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upstream { child, parent, child_tx, parent_rx } => write!(
                f,
                "upstream {child} -> {parent}: child TX {child_tx:?}, parent RX {parent_rx:?}"
            ),
            Self::Downstream { child, parent, parent_tx, child_rx } => write!(
                f,
                "downstream {parent} -> {child}: parent TX {parent_tx:?}, child RX {child_rx:?}"
            ),
            Self::Unresolved { from, to } => write!(f, "no usable cell for {from} -> {to}"),
            Self::HostDrift { node } => write!(f, "installed cells of {node} drifted from the MAC"),
        }
    }
}

/// A tree of nodes running the unicast rule against each other.
#[derive(Debug, Clone)]
pub struct Network {
    config: ScheduleConfig,
    handle: SlotframeHandle,
    epoch: Epoch,
    tree: RoutingTree,
    nodes: BTreeMap<NodeAddress, SimNode>,
}

impl Network {
    /// A network holding only `root`, at epoch 0.
    pub fn new(root: NodeAddress, config: ScheduleConfig) -> Result<Self> {
        Self::starting_at(root, config, Epoch::ZERO)
    }

    /// A network holding only `root`, with the MAC clock at `epoch`.
    pub fn starting_at(root: NodeAddress, config: ScheduleConfig, epoch: Epoch) -> Result<Self> {
        if root.is_null() {
            return Err(SimError::InvalidConfig("root address is null".into()));
        }
        let mut network = Self {
            config,
            handle: DEFAULT_UNICAST_HANDLE,
            epoch,
            tree: RoutingTree::new(root),
            nodes: BTreeMap::new(),
        };
        network.boot(root)?;
        Ok(network)
    }

    pub fn config(&self) -> &ScheduleConfig {
        &self.config
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn tree(&self) -> &RoutingTree {
        &self.tree
    }

    pub fn handle(&self) -> SlotframeHandle {
        self.handle
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, address: &NodeAddress) -> Option<&SimNode> {
        self.nodes.get(address)
    }

    /// Cells installed at `address`, as the MAC holds them.
    pub fn cells(&self, address: &NodeAddress) -> &[Cell] {
        self.nodes
            .get(address)
            .map_or(&[][..], |n| n.host.cells(self.handle))
    }

    fn boot(&mut self, address: NodeAddress) -> Result<()> {
        let view = self.tree.view(&address).ok_or(SimError::UnknownNode(address))?;
        let mut node = SimNode {
            rule: UnicastRule::new(address, self.config.clone()),
            host: MemoryHost::new(self.epoch),
        };
        node.rule.init(self.handle, &mut node.host, &view)?;
        self.nodes.insert(address, node);
        Ok(())
    }

    fn node_mut(&mut self, address: &NodeAddress) -> Result<(&mut SimNode, NodeView)> {
        let view = self.tree.view(address).ok_or(SimError::UnknownNode(*address))?;
        let node = self.nodes.get_mut(address).ok_or(SimError::UnknownNode(*address))?;
        Ok((node, view))
    }

    /// Tell every ancestor of `node` that a route through its child on the
    /// path appeared.
    fn announce_added(&mut self, node: NodeAddress) -> Result<()> {
        let mut next_hop = node;
        for ancestor in self.tree.ancestors(&node) {
            let kind = if next_hop == node && self.tree.children(&node).is_empty() {
                ChildKind::Leaf
            } else {
                ChildKind::Relay
            };
            let (sim, view) = self.node_mut(&ancestor)?;
            sim.rule.on_child_added(next_hop, kind, &mut sim.host, &view)?;
            next_hop = ancestor;
        }
        Ok(())
    }

    /// Tell each of `ancestors` (parent first) that the route toward `node`
    /// through its child on the old path went away.
    fn announce_removed(&mut self, node: NodeAddress, ancestors: &[NodeAddress]) -> Result<()> {
        let mut next_hop = node;
        for ancestor in ancestors {
            let (sim, view) = self.node_mut(ancestor)?;
            sim.rule.on_child_removed(next_hop, &mut sim.host, &view)?;
            next_hop = *ancestor;
        }
        Ok(())
    }

    fn announce_parent(&mut self, node: NodeAddress) -> Result<()> {
        let parent = self.tree.parent(&node);
        let (sim, view) = self.node_mut(&node)?;
        sim.rule.on_time_source_changed(parent, &mut sim.host, &view)?;
        Ok(())
    }

    /// Add `node` below `parent` and start its rule.
    pub fn join(&mut self, node: NodeAddress, parent: NodeAddress) -> Result<()> {
        if node.is_null() {
            return Err(SimError::InvalidConfig("node address is null".into()));
        }
        self.tree.attach(node, parent)?;
        self.boot(node)?;
        self.announce_added(node)?;
        debug!(%node, %parent, depth = self.tree.depth(&node), "node joined");
        Ok(())
    }

    /// Remove `node`. Its children re-attach to its parent.
    pub fn leave(&mut self, node: NodeAddress) -> Result<()> {
        let ancestors = self.tree.ancestors(&node);
        let orphans = self.tree.detach(&node)?;
        self.nodes.remove(&node);
        for orphan in &orphans {
            self.announce_parent(*orphan)?;
        }
        self.announce_removed(node, &ancestors)?;
        debug!(%node, orphans = orphans.len(), "node left");
        Ok(())
    }

    /// Move `node` and its subtree below `parent`.
    pub fn reparent(&mut self, node: NodeAddress, parent: NodeAddress) -> Result<()> {
        let old_ancestors = self.tree.ancestors(&node);
        self.tree.reparent(&node, parent)?;
        self.announce_parent(node)?;
        self.announce_removed(node, &old_ancestors)?;
        self.announce_added(node)?;
        debug!(%node, %parent, "node changed parent");
        Ok(())
    }

    /// Advance the MAC clock of every node by one slotframe.
    pub fn tick(&mut self) -> Result<RebuildReport> {
        self.epoch = self.epoch.next();
        let mut total = RebuildReport::default();
        let addresses: Vec<_> = self.nodes.keys().copied().collect();
        for address in addresses {
            let epoch = self.epoch;
            let (sim, view) = self.node_mut(&address)?;
            sim.host.set_epoch(epoch);
            if let Some(report) = sim.rule.on_epoch_tick(epoch, &mut sim.host, &view)? {
                total += report;
            }
        }
        trace!(epoch = %self.epoch, retuned = total.retuned, installed = total.installed, "tick");
        Ok(total)
    }

    /// Check every tree edge for cell agreement.
    pub fn audit(&self) -> Vec<Disagreement> {
        let mut found = Vec::new();

        for (address, node) in &self.nodes {
            if node.host.cells(self.handle) != node.rule.installed() {
                found.push(Disagreement::HostDrift { node: *address });
            }
        }

        for (child, parent) in self.tree.edges() {
            let child_cells = self.cells(&child);
            let parent_cells = self.cells(&parent);
            let up_link = Link::parent(parent);
            let down_link = Link::child(child);

            let child_tx = coords(child_cells, &up_link, |c| c.options.tx);
            let child_rx = coords(child_cells, &up_link, |c| c.options.rx);
            let parent_tx = coords(parent_cells, &down_link, |c| c.options.tx);
            let parent_rx = coords(parent_cells, &down_link, |c| c.options.rx);

            if child_tx != parent_rx {
                found.push(Disagreement::Upstream {
                    child,
                    parent,
                    child_tx: child_tx.iter().copied().collect(),
                    parent_rx: parent_rx.iter().copied().collect(),
                });
            }
            if parent_tx != child_rx {
                found.push(Disagreement::Downstream {
                    child,
                    parent,
                    parent_tx: parent_tx.iter().copied().collect(),
                    child_rx: child_rx.iter().copied().collect(),
                });
            }

            if !self.frame_lands(&child, &parent, &parent_rx) {
                found.push(Disagreement::Unresolved { from: child, to: parent });
            }
            if !self.frame_lands(&parent, &child, &child_rx) {
                found.push(Disagreement::Unresolved { from: parent, to: child });
            }
        }

        if found.is_empty() {
            trace!(epoch = %self.epoch, edges = self.tree.len().saturating_sub(1), "audit clean");
        } else {
            info!(epoch = %self.epoch, disagreements = found.len(), "audit found disagreements");
        }
        found
    }

    fn frame_lands(&self, from: &NodeAddress, to: &NodeAddress, receiving: &BTreeSet<CellCoord>) -> bool {
        let (Some(node), Some(view)) = (self.nodes.get(from), self.tree.view(from)) else {
            return false;
        };
        node.rule
            .select_cell_for_frame(&OutgoingFrame::data(*to), &view)
            .is_some_and(|(_, coord)| receiving.contains(&coord))
    }

    /// Serializable view of every node's schedule.
    pub fn snapshot(&self) -> NetworkSnapshot {
        NetworkSnapshot {
            epoch: self.epoch,
            config: self.config.clone(),
            nodes: self
                .nodes
                .keys()
                .map(|address| NodeSnapshot {
                    address: *address,
                    parent: self.tree.parent(address),
                    depth: self.tree.depth(address),
                    routes: self.tree.subtree_size(address).saturating_sub(1),
                    cells: self.cells(address).to_vec(),
                })
                .collect(),
        }
    }
}

fn coords(cells: &[Cell], link: &Link, keep: impl Fn(&Cell) -> bool) -> BTreeSet<CellCoord> {
    cells
        .iter()
        .filter(|c| c.link == *link && keep(c))
        .map(|c| c.coord)
        .collect()
}
