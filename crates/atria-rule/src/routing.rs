//! Routing collaborator interface.
//!
//! The rule never mutates routing state. It reads a fresh snapshot on every
//! rebuild and on every resolver call.

use atria_core::NodeAddress;

/// A routing next hop and the number of downstream routes through it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteEntry {
    pub neighbor: NodeAddress,
    /// Routes whose next hop is `neighbor`, including the neighbor itself.
    pub fan_out: u32,
}

impl RouteEntry {
    pub const fn new(neighbor: NodeAddress, fan_out: u32) -> Self {
        Self { neighbor, fan_out }
    }
}

/// Read-only view of the tree-routing protocol (RPL storing mode).
pub trait RoutingSnapshot {
    /// Preferred parent, `None` on the root or before joining.
    fn preferred_parent(&self) -> Option<NodeAddress>;

    /// Next hops in routing-table order. The order must be stable for the
    /// duration of one rebuild.
    fn neighbors(&self) -> &[RouteEntry];

    /// Own rank, `None` when not part of a DAG.
    fn rank(&self) -> Option<u16>;

    /// Minimum hop-rank increase of the active instance.
    fn min_hop_rank_increase(&self) -> u16;

    /// Total number of downward routes.
    fn total_routes(&self) -> u32 {
        self.neighbors()
            .iter()
            .fold(0u32, |total, entry| total.saturating_add(entry.fan_out))
    }

    /// The root's rank equals the minimum hop-rank increase.
    fn is_root(&self) -> bool {
        self.rank() == Some(self.min_hop_rank_increase())
    }

    /// Whether the parent has acknowledged us as a child.
    fn parent_knows_us(&self) -> bool {
        true
    }

    /// Whether the route change that triggered the current event is already
    /// visible in this snapshot. Routing stacks that fire their callbacks
    /// before committing the route return `false`, and the engine corrects
    /// the route counts by one.
    fn reflects_pending_change(&self) -> bool {
        true
    }

    /// Route entry for `neighbor`.
    fn route_to(&self, neighbor: &NodeAddress) -> Option<&RouteEntry> {
        self.neighbors().iter().find(|e| e.neighbor == *neighbor)
    }

    /// Whether `neighbor` is a routing next hop.
    fn is_neighbor(&self, neighbor: &NodeAddress) -> bool {
        self.route_to(neighbor).is_some()
    }
}
