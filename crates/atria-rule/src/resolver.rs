//! Frame Cell Resolver
//!
//! Answers "which cell does a frame to this neighbor use?" by re-deriving
//! the coordinate with the current epoch. It never looks at installed cells.
//! Links are picked with [`scheduled_link`], the rule the rebuild engine
//! installs by, so both agree as long as they see the same epoch, routing
//! snapshot and pending change.

use atria_core::{AllocationStrategy, CellCoord, CellIndex, Link, LinkKind, NodeAddress};

use crate::{scheduled_link, RoutingSnapshot, ScheduleState};

/// Picks one of a link's additional cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellSelector {
    /// Replica number (Replicated) or block number (Evenly).
    pub index: u16,
    /// Replica or block count of the link.
    pub capacity: u16,
}

impl CellSelector {
    pub const fn new(index: u16, capacity: u16) -> Self {
        Self { index, capacity }
    }
}

/// The link a frame to `destination` travels on, if any.
pub fn link_to<R>(state: &ScheduleState, routing: &R, destination: &NodeAddress) -> Option<Link>
where
    R: RoutingSnapshot + ?Sized,
{
    scheduled_link(state, routing, destination)
}

/// Cell toward `destination`: the `Up` cell for the parent, the `Down` cell
/// for a routing neighbor.
///
/// Without a selector the base cell is returned. Single ignores the
/// selector; Evenly returns `None` for a block outside `1..=capacity` or of
/// the wrong parity.
pub fn resolve<R>(
    state: &ScheduleState,
    strategy: AllocationStrategy,
    routing: &R,
    destination: &NodeAddress,
    selector: Option<CellSelector>,
) -> Option<CellCoord>
where
    R: RoutingSnapshot + ?Sized,
{
    let link = link_to(state, routing, destination)?;
    let direction = link.outgoing();
    let index = match (strategy, selector) {
        (AllocationStrategy::Single, _) | (_, None) => CellIndex::base(direction),
        (AllocationStrategy::Evenly, Some(selector)) if selector.index == 0 => return None,
        (_, Some(selector)) => CellIndex {
            direction,
            seq: selector.index,
            capacity: selector.capacity,
        },
    };
    let (from, to) = link.endpoints(state.local(), direction);
    strategy
        .coord(&from, &to, index, state.epoch(), state.geometry())
        .schedulable()
}

/// Whether a unicast frame to `destination` has a dedicated link.
///
/// The parent qualifies once it has acknowledged us; a child qualifies
/// whenever the schedule holds a link to it.
pub fn neighbor_has_unicast_link<R>(
    state: &ScheduleState,
    routing: &R,
    destination: &NodeAddress,
) -> bool
where
    R: RoutingSnapshot + ?Sized,
{
    match link_to(state, routing, destination) {
        Some(link) if link.kind == LinkKind::Parent => routing.parent_knows_us(),
        Some(_) => true,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{addr, StaticRouting};
    use crate::{compute_schedule, ChangeReason, ChildKind, RouteEntry};
    use atria_core::{Epoch, ScheduleConfig, TrafficDirection};
    use proptest::prelude::*;

    fn node_state(config: &ScheduleConfig, epoch: u32) -> ScheduleState {
        let mut state = ScheduleState::new(addr(5), config, Epoch(epoch));
        state.set_parent(Some(addr(1)));
        state
    }

    #[test]
    fn resolves_parent_and_children() {
        let config = ScheduleConfig::default();
        let state = node_state(&config, 42);
        let routing = StaticRouting::node(Some(addr(1)), 1).with_child(addr(9), 1);

        assert!(resolve(&state, config.strategy, &routing, &addr(1), None).is_some());
        assert!(resolve(&state, config.strategy, &routing, &addr(9), None).is_some());
        assert_eq!(resolve(&state, config.strategy, &routing, &addr(77), None), None);
        assert_eq!(resolve(&state, config.strategy, &routing, &NodeAddress::NULL, None), None);
    }

    #[test]
    fn agrees_with_rebuild() {
        for config in [
            ScheduleConfig::default(),
            ScheduleConfig::replicated(101).with_channels(8),
            ScheduleConfig::evenly(3, 67),
        ] {
            let state = node_state(&config, 913);
            let routing = StaticRouting::node(Some(addr(1)), 1)
                .with_child(addr(9), 3)
                .with_child(addr(12), 1);
            let schedule = compute_schedule(&state, &routing, config.strategy, None);

            for neighbor in [addr(1), addr(9), addr(12)] {
                let base = resolve(&state, config.strategy, &routing, &neighbor, None).unwrap();
                let outgoing = schedule
                    .cells
                    .iter()
                    .filter(|c| c.link.neighbor == neighbor && c.options.tx)
                    .map(|c| c.coord)
                    .collect::<Vec<_>>();
                assert!(outgoing.contains(&base), "{neighbor} base cell not installed");

                let link = schedule
                    .cells
                    .iter()
                    .find(|c| c.link.neighbor == neighbor)
                    .unwrap();
                for seq in 1..=link.capacity {
                    let selector = CellSelector::new(seq, link.capacity);
                    if let Some(coord) = resolve(&state, config.strategy, &routing, &neighbor, Some(selector)) {
                        assert!(outgoing.contains(&coord), "{neighbor} cell {seq} not installed");
                    }
                }
            }
        }
    }

    proptest! {
        #[test]
        fn base_cell_is_always_installed(
            epoch in any::<u32>(),
            children in proptest::collection::vec((2u8..=255, 1u32..6), 0..6),
            strategy in 0usize..3,
        ) {
            let config = [
                ScheduleConfig::default(),
                ScheduleConfig::replicated(201),
                ScheduleConfig::evenly(3, 67),
            ][strategy].clone();
            let state = node_state(&config, epoch);
            let mut routing = StaticRouting::node(Some(addr(1)), 1);
            for (id, fan_out) in &children {
                if routing.route_to(&addr(*id)).is_none() && *id != 5 {
                    routing = routing.with_child(addr(*id), *fan_out);
                }
            }
            let schedule = compute_schedule(&state, &routing, config.strategy, None);

            for entry in routing.neighbors().iter().chain(Some(&RouteEntry::new(addr(1), 0))) {
                let coord = resolve(&state, config.strategy, &routing, &entry.neighbor, None);
                prop_assert!(coord.is_some());
                prop_assert!(schedule
                    .cells
                    .iter()
                    .any(|c| Some(c.coord) == coord && c.link.neighbor == entry.neighbor && c.options.tx));
            }
        }
    }

    #[test]
    fn evenly_selector_checks_parity() {
        let config = ScheduleConfig::evenly(3, 67);
        let state = node_state(&config, 5);
        let routing = StaticRouting::node(Some(addr(1)), 1).with_child(addr(9), 3);

        // Toward the parent frames go up: odd blocks only.
        assert!(resolve(&state, config.strategy, &routing, &addr(1), Some(CellSelector::new(1, 4))).is_some());
        assert!(resolve(&state, config.strategy, &routing, &addr(1), Some(CellSelector::new(2, 4))).is_none());
        // Toward a child frames go down: even blocks only.
        assert!(resolve(&state, config.strategy, &routing, &addr(9), Some(CellSelector::new(2, 4))).is_some());
        assert!(resolve(&state, config.strategy, &routing, &addr(9), Some(CellSelector::new(3, 4))).is_none());
        assert!(resolve(&state, config.strategy, &routing, &addr(9), Some(CellSelector::new(0, 4))).is_none());
        assert!(resolve(&state, config.strategy, &routing, &addr(9), Some(CellSelector::new(6, 4))).is_none());
    }

    #[test]
    fn single_ignores_selector() {
        let config = ScheduleConfig::default();
        let state = node_state(&config, 8);
        let routing = StaticRouting::node(Some(addr(1)), 1);
        assert_eq!(
            resolve(&state, config.strategy, &routing, &addr(1), Some(CellSelector::new(3, 5))),
            resolve(&state, config.strategy, &routing, &addr(1), None)
        );
    }

    #[test]
    fn unicast_link_requires_acknowledged_parent() {
        let config = ScheduleConfig::default();
        let state = node_state(&config, 0);
        let mut routing = StaticRouting::node(Some(addr(1)), 1).with_child(addr(9), 1);
        assert!(neighbor_has_unicast_link(&state, &routing, &addr(1)));
        assert!(neighbor_has_unicast_link(&state, &routing, &addr(9)));
        assert!(!neighbor_has_unicast_link(&state, &routing, &addr(3)));

        routing.parent_knows_us = false;
        assert!(!neighbor_has_unicast_link(&state, &routing, &addr(1)));
        assert_eq!(link_to(&state, &routing, &addr(1)).map(|l| l.kind), Some(LinkKind::Parent));
        assert_eq!(Link::child(addr(9)).outgoing(), TrafficDirection::Down);
    }

    #[test]
    fn root_does_not_resolve_its_time_source() {
        let config = ScheduleConfig::default();
        let mut state = ScheduleState::new(addr(1), &config, Epoch(30));
        state.set_parent(Some(addr(7)));
        let routing = StaticRouting::root().with_child(addr(2), 1);
        let schedule = compute_schedule(&state, &routing, config.strategy, None);

        assert_eq!(resolve(&state, config.strategy, &routing, &addr(7), None), None);
        assert!(!neighbor_has_unicast_link(&state, &routing, &addr(7)));
        assert!(schedule.cells.iter().all(|c| c.link.neighbor != addr(7)));

        let down = resolve(&state, config.strategy, &routing, &addr(2), None).unwrap();
        assert!(schedule.cells.iter().any(|c| c.coord == down && c.link.neighbor == addr(2)));
    }

    #[test]
    fn stale_snapshot_follows_pending_change() {
        let config = ScheduleConfig::replicated(101).with_channels(8);
        let mut state = node_state(&config, 77);
        let routing = StaticRouting::node(Some(addr(1)), 1)
            .with_child(addr(10), 1)
            .with_child(addr(11), 1)
            .stale();

        state.record_change(ChangeReason::NeighborRemoved, Some(addr(10)));
        let schedule = compute_schedule(&state, &routing, config.strategy, None);
        assert_eq!(resolve(&state, config.strategy, &routing, &addr(10), None), None);
        assert!(!neighbor_has_unicast_link(&state, &routing, &addr(10)));
        assert!(schedule.cells.iter().all(|c| c.link.neighbor != addr(10)));
        assert!(neighbor_has_unicast_link(&state, &routing, &addr(11)));

        state.record_change(ChildKind::Leaf.into(), Some(addr(12)));
        let schedule = compute_schedule(&state, &routing, config.strategy, None);
        let coord = resolve(&state, config.strategy, &routing, &addr(12), None).unwrap();
        assert!(schedule
            .cells
            .iter()
            .any(|c| c.coord == coord && c.link.neighbor == addr(12) && c.options.tx));
    }
}
