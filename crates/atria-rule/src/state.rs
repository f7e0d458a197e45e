//! Scheduling state owned by the unicast rule.

use std::fmt;

use atria_core::{Epoch, Geometry, NodeAddress, ScheduleConfig};

/// Why the schedule is being rebuilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChangeReason {
    #[default]
    None,
    NeighborRemoved,
    /// A child without descendants appeared.
    NeighborAddedLeaf,
    /// A route through a child that relays for others appeared.
    NeighborAddedRelay,
}

impl ChangeReason {
    pub const fn is_addition(&self) -> bool {
        matches!(self, Self::NeighborAddedLeaf | Self::NeighborAddedRelay)
    }
}

impl fmt::Display for ChangeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::NeighborRemoved => write!(f, "neighbor-removed"),
            Self::NeighborAddedLeaf => write!(f, "neighbor-added-leaf"),
            Self::NeighborAddedRelay => write!(f, "neighbor-added-relay"),
        }
    }
}

/// Kind of child reported by a child-added event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildKind {
    Leaf,
    Relay,
}

impl From<ChildKind> for ChangeReason {
    fn from(kind: ChildKind) -> Self {
        match kind {
            ChildKind::Leaf => Self::NeighborAddedLeaf,
            ChildKind::Relay => Self::NeighborAddedRelay,
        }
    }
}

/// Process-lifetime scheduling state.
///
/// Only the event adapter mutates it; strategies and the resolver read it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleState {
    local: NodeAddress,
    parent: Option<NodeAddress>,
    epoch: Epoch,
    previous_epoch: Epoch,
    pending: ChangeReason,
    changed: Option<NodeAddress>,
    geometry: Geometry,
}

impl ScheduleState {
    /// Fresh state at `epoch`.
    pub fn new(local: NodeAddress, config: &ScheduleConfig, epoch: Epoch) -> Self {
        Self {
            local,
            parent: None,
            epoch,
            previous_epoch: epoch,
            pending: ChangeReason::None,
            changed: None,
            geometry: config.geometry(),
        }
    }

    pub fn local(&self) -> NodeAddress {
        self.local
    }

    /// Current time-source parent.
    pub fn parent(&self) -> Option<NodeAddress> {
        self.parent
    }

    /// Epoch all cells are derived for.
    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn previous_epoch(&self) -> Epoch {
        self.previous_epoch
    }

    pub fn pending(&self) -> ChangeReason {
        self.pending
    }

    /// Neighbor named by the pending change.
    pub fn changed(&self) -> Option<NodeAddress> {
        self.changed
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Sub-period width (evenly strategy).
    pub fn sub_period(&self) -> u16 {
        self.geometry.sub_period
    }

    /// Sub-period count (evenly strategy).
    pub fn num_sub_period(&self) -> u16 {
        self.geometry.num_sub_period
    }

    pub(crate) fn set_parent(&mut self, parent: Option<NodeAddress>) {
        self.parent = parent.filter(|p| !p.is_null());
    }

    pub(crate) fn advance(&mut self, epoch: Epoch) {
        self.previous_epoch = self.epoch;
        self.epoch = epoch;
    }

    pub(crate) fn record_change(&mut self, reason: ChangeReason, neighbor: Option<NodeAddress>) {
        self.pending = reason;
        self.changed = neighbor;
    }

    pub(crate) fn clear_change(&mut self) {
        self.pending = ChangeReason::None;
        self.changed = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_keeps_previous() {
        let mut state = ScheduleState::new(NodeAddress::from_node_id(1), &ScheduleConfig::default(), Epoch(5));
        assert_eq!(state.previous_epoch(), Epoch(5));
        state.advance(Epoch(6));
        assert_eq!(state.epoch(), Epoch(6));
        assert_eq!(state.previous_epoch(), Epoch(5));
    }

    #[test]
    fn null_parent_is_no_parent() {
        let mut state = ScheduleState::new(NodeAddress::from_node_id(1), &ScheduleConfig::default(), Epoch(0));
        state.set_parent(Some(NodeAddress::NULL));
        assert_eq!(state.parent(), None);
        state.set_parent(Some(NodeAddress::from_node_id(4)));
        assert_eq!(state.parent(), Some(NodeAddress::from_node_id(4)));
    }

    #[test]
    fn change_is_cleared() {
        let mut state = ScheduleState::new(NodeAddress::from_node_id(1), &ScheduleConfig::default(), Epoch(0));
        state.record_change(ChildKind::Leaf.into(), Some(NodeAddress::from_node_id(2)));
        assert!(state.pending().is_addition());
        state.clear_change();
        assert_eq!(state.pending(), ChangeReason::None);
        assert_eq!(state.changed(), None);
    }
}
