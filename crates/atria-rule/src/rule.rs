//! Topology Event Adapter
//!
//! [`UnicastRule`] is the entry point the host MAC talks to. It owns the
//! scheduling state, turns routing and time-source events into rebuilds,
//! and answers per-frame cell queries.

use atria_core::{Cell, CellCoord, Epoch, EpochMode, Error, NodeAddress, Result, ScheduleConfig};
use tracing::{debug, info, trace, warn};

use crate::resolver::{neighbor_has_unicast_link, resolve, CellSelector};
use crate::{ChangeReason, ChildKind, RebuildEngine, RebuildReport, RoutingSnapshot, ScheduleState, SlotframeHandle, SlotframeHost};

/// Kind of an outgoing MAC frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Data,
    Ack,
    Beacon,
    Command,
}

/// The parts of an outgoing frame the rule looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutgoingFrame {
    pub destination: NodeAddress,
    pub kind: FrameKind,
}

impl OutgoingFrame {
    pub const fn data(destination: NodeAddress) -> Self {
        Self {
            destination,
            kind: FrameKind::Data,
        }
    }
}

#[derive(Debug, Clone)]
struct Active {
    state: ScheduleState,
    engine: RebuildEngine,
}

/// Per-neighbor unicast scheduling rule for RPL storing mode.
#[derive(Debug, Clone)]
pub struct UnicastRule {
    local: NodeAddress,
    config: ScheduleConfig,
    active: Option<Active>,
}

impl UnicastRule {
    /// Create a rule for the node at `local`. Nothing happens until
    /// [`init`](Self::init).
    pub fn new(local: NodeAddress, config: ScheduleConfig) -> Self {
        Self {
            local,
            config,
            active: None,
        }
    }

    pub fn local(&self) -> NodeAddress {
        self.local
    }

    pub fn config(&self) -> &ScheduleConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.active.is_some()
    }

    /// Scheduling state, once initialized.
    pub fn state(&self) -> Option<&ScheduleState> {
        self.active.as_ref().map(|a| &a.state)
    }

    pub fn handle(&self) -> Option<SlotframeHandle> {
        self.active.as_ref().map(|a| a.engine.handle())
    }

    /// Cells currently installed, in host order.
    pub fn installed(&self) -> &[Cell] {
        match &self.active {
            Some(active) => active.engine.installed(),
            None => &[],
        }
    }

    /// Allocate the unicast slotframe and install the first schedule.
    ///
    /// With a fixed epoch every node schedules for epoch 0; with rotation
    /// the host's current slotframe number is the starting epoch.
    pub fn init<H, R>(&mut self, handle: SlotframeHandle, host: &mut H, routing: &R) -> Result<RebuildReport>
    where
        H: SlotframeHost + ?Sized,
        R: RoutingSnapshot + ?Sized,
    {
        self.config.validate()?;
        if self.active.is_some() {
            warn!(node = %self.local, "unicast rule initialized twice");
        }
        host.add_slotframe(handle, self.config.unicast_period)?;

        let epoch = match self.config.epoch_mode {
            EpochMode::Fixed => Epoch::ZERO,
            EpochMode::Rotating => host.current_epoch(handle),
        };
        let mut state = ScheduleState::new(self.local, &self.config, epoch);
        state.set_parent(routing.preferred_parent());

        let mut engine = RebuildEngine::new(handle, self.config.strategy, self.config.max_additional_cells);
        let report = engine.rebuild(&mut state, host, routing)?;
        info!(
            node = %self.local,
            %handle,
            period = self.config.unicast_period,
            strategy = %self.config.strategy,
            %epoch,
            cells = report.installed,
            "unicast rule initialized"
        );
        self.active = Some(Active { state, engine });
        Ok(report)
    }

    fn active_mut(&mut self) -> Result<&mut Active> {
        self.active.as_mut().ok_or(Error::NotInitialized)
    }

    /// The time source (preferred parent) changed. Rebuilds only when the
    /// parent actually differs.
    pub fn on_time_source_changed<H, R>(
        &mut self,
        new_parent: Option<NodeAddress>,
        host: &mut H,
        routing: &R,
    ) -> Result<Option<RebuildReport>>
    where
        H: SlotframeHost + ?Sized,
        R: RoutingSnapshot + ?Sized,
    {
        let local = self.local;
        let active = self.active_mut()?;
        let new_parent = new_parent.filter(|p| !p.is_null());
        if active.state.parent() == new_parent {
            trace!(node = %local, "time source unchanged");
            return Ok(None);
        }
        debug!(
            node = %local,
            old = ?active.state.parent(),
            new = ?new_parent,
            "time source changed"
        );
        active.state.set_parent(new_parent);
        active.state.record_change(ChangeReason::None, None);
        active.engine.rebuild(&mut active.state, host, routing).map(Some)
    }

    /// A route through `neighbor` appeared.
    pub fn on_child_added<H, R>(
        &mut self,
        neighbor: NodeAddress,
        kind: ChildKind,
        host: &mut H,
        routing: &R,
    ) -> Result<RebuildReport>
    where
        H: SlotframeHost + ?Sized,
        R: RoutingSnapshot + ?Sized,
    {
        self.on_change(kind.into(), neighbor, host, routing)
    }

    /// A route through `neighbor` went away.
    pub fn on_child_removed<H, R>(&mut self, neighbor: NodeAddress, host: &mut H, routing: &R) -> Result<RebuildReport>
    where
        H: SlotframeHost + ?Sized,
        R: RoutingSnapshot + ?Sized,
    {
        self.on_change(ChangeReason::NeighborRemoved, neighbor, host, routing)
    }

    fn on_change<H, R>(
        &mut self,
        reason: ChangeReason,
        neighbor: NodeAddress,
        host: &mut H,
        routing: &R,
    ) -> Result<RebuildReport>
    where
        H: SlotframeHost + ?Sized,
        R: RoutingSnapshot + ?Sized,
    {
        let local = self.local;
        let active = self.active_mut()?;
        debug!(node = %local, %neighbor, %reason, "routing changed");
        active.state.record_change(reason, Some(neighbor));
        active.engine.rebuild(&mut active.state, host, routing)
    }

    /// A new slotframe repetition started.
    ///
    /// Ignored with a fixed epoch. With rotation every cell is re-derived for
    /// `epoch`.
    pub fn on_epoch_tick<H, R>(&mut self, epoch: Epoch, host: &mut H, routing: &R) -> Result<Option<RebuildReport>>
    where
        H: SlotframeHost + ?Sized,
        R: RoutingSnapshot + ?Sized,
    {
        let mode = self.config.epoch_mode;
        let active = self.active_mut()?;
        if mode == EpochMode::Fixed || active.state.epoch() == epoch {
            return Ok(None);
        }
        active.state.advance(epoch);
        active.engine.refresh(&mut active.state, host, routing).map(Some)
    }

    /// Cell for `destination`, re-derived for the current epoch.
    pub fn resolve<R>(&self, routing: &R, destination: &NodeAddress, selector: Option<CellSelector>) -> Option<CellCoord>
    where
        R: RoutingSnapshot + ?Sized,
    {
        let active = self.active.as_ref()?;
        resolve(&active.state, self.config.strategy, routing, destination, selector)
    }

    /// Slotframe and base cell a frame should go out on.
    ///
    /// Only data frames to a neighbor with a unicast link are scheduled
    /// here; everything else falls through to the other slotframes.
    pub fn select_cell_for_frame<R>(&self, frame: &OutgoingFrame, routing: &R) -> Option<(SlotframeHandle, CellCoord)>
    where
        R: RoutingSnapshot + ?Sized,
    {
        let active = self.active.as_ref()?;
        if frame.kind != FrameKind::Data
            || !neighbor_has_unicast_link(&active.state, routing, &frame.destination)
        {
            return None;
        }
        let coord = resolve(&active.state, self.config.strategy, routing, &frame.destination, None)?;
        Some((active.engine.handle(), coord))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{addr, RecordingHost, StaticRouting};
    use atria_core::{AllocationStrategy, LinkKind};

    const SF: SlotframeHandle = SlotframeHandle(1);

    #[test]
    fn events_before_init_fail() {
        let mut rule = UnicastRule::new(addr(5), ScheduleConfig::default());
        let mut host = RecordingHost::default();
        let routing = StaticRouting::node(Some(addr(1)), 1);

        assert!(matches!(
            rule.on_child_added(addr(9), ChildKind::Leaf, &mut host, &routing),
            Err(Error::NotInitialized)
        ));
        assert!(matches!(
            rule.on_epoch_tick(Epoch(3), &mut host, &routing),
            Err(Error::NotInitialized)
        ));
        assert_eq!(rule.select_cell_for_frame(&OutgoingFrame::data(addr(1)), &routing), None);
        assert!(rule.installed().is_empty());
    }

    #[test]
    fn init_rejects_bad_config() {
        let mut rule = UnicastRule::new(addr(5), ScheduleConfig::single(0));
        let mut host = RecordingHost::default();
        let routing = StaticRouting::node(Some(addr(1)), 1);
        assert!(matches!(rule.init(SF, &mut host, &routing), Err(Error::InvalidConfig(_))));
        assert!(host.slotframes.is_empty());
    }

    #[test]
    fn init_allocates_and_schedules() {
        let mut rule = UnicastRule::new(addr(5), ScheduleConfig::single(67));
        let mut host = RecordingHost::default();
        let routing = StaticRouting::node(Some(addr(1)), 1).with_child(addr(9), 1).with_child(addr(10), 1);

        let report = rule.init(SF, &mut host, &routing).unwrap();
        assert_eq!(host.slotframes, vec![(SF, 67)]);
        assert_eq!(report.installed + report.merged, 6);
        assert_eq!(rule.state().and_then(|s| s.parent()), Some(addr(1)));
        assert_eq!(rule.handle(), Some(SF));
    }

    #[test]
    fn fixed_epoch_ignores_host_counter() {
        let mut rule = UnicastRule::new(addr(5), ScheduleConfig::default().with_epoch_mode(EpochMode::Fixed));
        let mut host = RecordingHost {
            epoch: Epoch(900),
            ..Default::default()
        };
        let routing = StaticRouting::node(Some(addr(1)), 1);
        rule.init(SF, &mut host, &routing).unwrap();
        assert_eq!(rule.state().map(|s| s.epoch()), Some(Epoch::ZERO));
        assert_eq!(rule.on_epoch_tick(Epoch(901), &mut host, &routing).unwrap(), None);
        assert_eq!(rule.state().map(|s| s.epoch()), Some(Epoch::ZERO));
    }

    #[test]
    fn rotating_epoch_follows_ticks() {
        let mut rule = UnicastRule::new(addr(5), ScheduleConfig::default());
        let mut host = RecordingHost {
            epoch: Epoch(900),
            ..Default::default()
        };
        let routing = StaticRouting::node(Some(addr(1)), 1).with_child(addr(9), 1);
        rule.init(SF, &mut host, &routing).unwrap();
        assert_eq!(rule.state().map(|s| s.epoch()), Some(Epoch(900)));

        let report = rule.on_epoch_tick(Epoch(901), &mut host, &routing).unwrap();
        assert!(report.is_some());
        let state = rule.state().unwrap();
        assert_eq!(state.epoch(), Epoch(901));
        assert_eq!(state.previous_epoch(), Epoch(900));
        assert_eq!(host.cells, rule.installed());
        assert!(host.cells.iter().all(|c| c.epoch == Epoch(901)));

        // Same epoch again is a no-op.
        assert_eq!(rule.on_epoch_tick(Epoch(901), &mut host, &routing).unwrap(), None);
    }

    #[test]
    fn time_source_change_rebuilds_once() {
        let mut rule = UnicastRule::new(addr(5), ScheduleConfig::default());
        let mut host = RecordingHost::default();
        let routing = StaticRouting::node(Some(addr(1)), 1);
        rule.init(SF, &mut host, &routing).unwrap();

        assert_eq!(rule.on_time_source_changed(Some(addr(1)), &mut host, &routing).unwrap(), None);

        let routing = StaticRouting::node(Some(addr(2)), 1);
        let report = rule.on_time_source_changed(Some(addr(2)), &mut host, &routing).unwrap();
        assert!(report.is_some());
        assert!(host
            .cells
            .iter()
            .filter(|c| c.link.kind == LinkKind::Parent)
            .all(|c| c.link.neighbor == addr(2)));

        let report = rule.on_time_source_changed(None, &mut host, &routing).unwrap();
        assert!(report.is_some());
        assert!(host.cells.is_empty());
    }

    #[test]
    fn child_events_rebuild() {
        let config = ScheduleConfig::replicated(101).with_channels(16);
        let mut rule = UnicastRule::new(addr(5), config);
        let mut host = RecordingHost::default();
        let routing = StaticRouting::node(Some(addr(1)), 1);
        rule.init(SF, &mut host, &routing).unwrap();
        let before = host.cells.len();

        let routing = routing.with_child(addr(9), 1);
        rule.on_child_added(addr(9), ChildKind::Leaf, &mut host, &routing).unwrap();
        assert!(host.cells.iter().any(|c| c.link.neighbor == addr(9)));
        assert!(host.cells.len() > before);
        assert_eq!(rule.state().map(|s| s.pending()), Some(ChangeReason::None));

        let routing = StaticRouting::node(Some(addr(1)), 1);
        rule.on_child_removed(addr(9), &mut host, &routing).unwrap();
        assert!(host.cells.iter().all(|c| c.link.neighbor != addr(9)));
        assert_eq!(host.removals, 3);
    }

    #[test]
    fn frame_selection_filters() {
        let mut rule = UnicastRule::new(addr(5), ScheduleConfig::default());
        let mut host = RecordingHost::default();
        let mut routing = StaticRouting::node(Some(addr(1)), 1).with_child(addr(9), 1);
        rule.init(SF, &mut host, &routing).unwrap();

        let to_parent = rule.select_cell_for_frame(&OutgoingFrame::data(addr(1)), &routing);
        assert_eq!(to_parent.map(|(h, _)| h), Some(SF));
        assert_eq!(to_parent.map(|(_, c)| c), rule.resolve(&routing, &addr(1), None));

        let beacon = OutgoingFrame {
            destination: addr(1),
            kind: FrameKind::Beacon,
        };
        assert_eq!(rule.select_cell_for_frame(&beacon, &routing), None);
        assert_eq!(rule.select_cell_for_frame(&OutgoingFrame::data(addr(44)), &routing), None);
        assert_eq!(rule.select_cell_for_frame(&OutgoingFrame::data(NodeAddress::NULL), &routing), None);
        assert!(rule.select_cell_for_frame(&OutgoingFrame::data(addr(9)), &routing).is_some());

        routing.parent_knows_us = false;
        assert_eq!(rule.select_cell_for_frame(&OutgoingFrame::data(addr(1)), &routing), None);
    }

    #[test]
    fn default_replicated_gives_relays_more_cells() {
        let tx_to_parent = |routing: &StaticRouting| {
            let mut rule = UnicastRule::new(addr(5), ScheduleConfig::replicated(101));
            let mut host = RecordingHost {
                epoch: Epoch(321),
                ..Default::default()
            };
            rule.init(SF, &mut host, routing).unwrap();
            host.cells
                .iter()
                .filter(|c| c.link.kind == LinkKind::Parent && c.options.tx)
                .count()
        };
        let leaf = StaticRouting::node(Some(addr(1)), 1);
        let relay = StaticRouting::node(Some(addr(1)), 1).with_child(addr(9), 3);
        assert_eq!(tx_to_parent(&leaf), 1);
        assert!(tx_to_parent(&relay) > tx_to_parent(&leaf));
    }

    #[test]
    fn root_falls_through_for_its_time_source() {
        let mut rule = UnicastRule::new(addr(1), ScheduleConfig::default());
        let mut host = RecordingHost::default();
        let mut routing = StaticRouting::root().with_child(addr(2), 1);
        routing.parent = Some(addr(7));
        rule.init(SF, &mut host, &routing).unwrap();

        assert_eq!(rule.state().and_then(|s| s.parent()), Some(addr(7)));
        assert_eq!(rule.resolve(&routing, &addr(7), None), None);
        assert_eq!(rule.select_cell_for_frame(&OutgoingFrame::data(addr(7)), &routing), None);
        assert!(host.cells.iter().all(|c| c.link.neighbor != addr(7)));

        let (_, coord) = rule
            .select_cell_for_frame(&OutgoingFrame::data(addr(2)), &routing)
            .unwrap();
        assert!(host.cells.iter().any(|c| c.coord == coord && c.link.neighbor == addr(2) && c.options.tx));
    }

    #[test]
    fn removed_child_in_stale_snapshot_is_not_selected() {
        let mut rule = UnicastRule::new(addr(5), ScheduleConfig::default());
        let mut host = RecordingHost {
            epoch: Epoch(60),
            ..Default::default()
        };
        let routing = StaticRouting::node(Some(addr(1)), 1).with_child(addr(9), 1).with_child(addr(10), 1);
        rule.init(SF, &mut host, &routing).unwrap();
        assert!(rule.select_cell_for_frame(&OutgoingFrame::data(addr(10)), &routing).is_some());

        let stale = routing.clone().stale();
        rule.on_child_removed(addr(10), &mut host, &stale).unwrap();
        assert!(host.cells.iter().all(|c| c.link.neighbor != addr(10)));
        assert_eq!(rule.select_cell_for_frame(&OutgoingFrame::data(addr(10)), &stale), None);
        assert_eq!(rule.resolve(&stale, &addr(10), None), None);

        rule.on_epoch_tick(Epoch(61), &mut host, &stale).unwrap();
        assert!(host.cells.iter().all(|c| c.link.neighbor != addr(10)));
        assert_eq!(rule.select_cell_for_frame(&OutgoingFrame::data(addr(10)), &stale), None);

        let (_, coord) = rule
            .select_cell_for_frame(&OutgoingFrame::data(addr(9)), &stale)
            .unwrap();
        assert!(host.cells.iter().any(|c| c.coord == coord && c.link.neighbor == addr(9) && c.options.tx));

        let fresh = StaticRouting::node(Some(addr(1)), 1).with_child(addr(9), 1);
        rule.on_epoch_tick(Epoch(62), &mut host, &fresh).unwrap();
        assert_eq!(rule.state().map(|s| s.pending()), Some(ChangeReason::None));
        assert_eq!(rule.select_cell_for_frame(&OutgoingFrame::data(addr(10)), &fresh), None);
    }

    #[test]
    fn selected_cells_are_installed() {
        for strategy in [AllocationStrategy::Single, AllocationStrategy::Replicated, AllocationStrategy::Evenly] {
            let config = ScheduleConfig::default().with_strategy(strategy);
            let mut rule = UnicastRule::new(addr(5), config);
            let mut host = RecordingHost {
                epoch: Epoch(40),
                ..Default::default()
            };
            let routing = StaticRouting::node(Some(addr(1)), 1).with_child(addr(9), 2).with_child(addr(11), 1);
            rule.init(SF, &mut host, &routing).unwrap();

            for epoch in 41..50 {
                rule.on_epoch_tick(Epoch(epoch), &mut host, &routing).unwrap();
                for neighbor in [addr(1), addr(9), addr(11)] {
                    let (_, coord) = rule
                        .select_cell_for_frame(&OutgoingFrame::data(neighbor), &routing)
                        .unwrap();
                    assert!(
                        host.cells.iter().any(|c| c.coord == coord && c.link.neighbor == neighbor && c.options.tx),
                        "{strategy}: no TX cell for {neighbor} at {coord}"
                    );
                }
            }
        }
    }
}
