//! Schedule Rebuild Engine
//!
//! Turns the routing snapshot into the full list of unicast cells for the
//! current epoch and installs it into the host slotframe.
//!
//! # Demand
//!
//! The parent link carries every route below us plus our own traffic, so its
//! demand is `total_routes + 1`. A child link carries the child's subtree,
//! so its demand is the child's fan-out. [`CellPlan`] turns demand into
//! replicas or blocks for the configured strategy.
//!
//! # Merging
//!
//! Cells of one link that land on the same coordinate are installed once,
//! with the union of their options. Cells of different links that coincide
//! are both installed; the host picks one by precedence. A child's upward
//! RX cell that coincides with our upward TX cell to the parent is therefore
//! not folded into it: the host's precedence among cells of one slotframe
//! decides which of the two is active in that timeslot.

use std::collections::HashMap;
use std::ops::AddAssign;

use atria_core::{AllocationStrategy, Cell, CellCoord, CellPlan, Epoch, Geometry, Link, NodeAddress, Result};
use tracing::{debug, trace, warn};

use crate::{ChangeReason, RoutingSnapshot, ScheduleState, SlotframeHandle, SlotframeHost};

/// Outcome of one rebuild or epoch refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RebuildReport {
    /// Cells now present in the slotframe.
    pub installed: usize,
    /// Cells updated in place by an epoch refresh.
    pub retuned: usize,
    /// Same-link cell pairs folded into one cell.
    pub merged: usize,
    /// Links whose demand exceeded the slotframe.
    pub clamped: usize,
    /// Cells sharing a coordinate with a cell of another link.
    pub coincidences: usize,
    /// Cells the host refused to install.
    pub failed: usize,
}

impl AddAssign for RebuildReport {
    fn add_assign(&mut self, other: Self) {
        self.installed += other.installed;
        self.retuned += other.retuned;
        self.merged += other.merged;
        self.clamped += other.clamped;
        self.coincidences += other.coincidences;
        self.failed += other.failed;
    }
}

/// A computed cell list, not yet installed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schedule {
    pub cells: Vec<Cell>,
    pub merged: usize,
    pub clamped: usize,
    pub coincidences: usize,
}

impl Schedule {
    /// Whether `installed` can be retuned into this schedule position by
    /// position.
    pub fn matches_shape(&self, installed: &[Cell]) -> bool {
        self.cells.len() == installed.len()
            && self.cells.iter().zip(installed).all(|(a, b)| a.same_shape(b))
    }
}

struct ScheduleBuilder<'a> {
    strategy: AllocationStrategy,
    max_additional: Option<u16>,
    local: NodeAddress,
    epoch: Epoch,
    geometry: &'a Geometry,
    owners: HashMap<CellCoord, Link>,
    schedule: Schedule,
}

impl ScheduleBuilder<'_> {
    fn push_link(&mut self, link: Link, demand: u32) {
        let plan = CellPlan::for_demand(self.strategy, demand, self.geometry, self.max_additional);
        if plan.is_clamped() {
            warn!(
                link = %link,
                demand,
                additional = plan.additional(),
                strategy = %self.strategy,
                "link demand exceeds slotframe, clamped"
            );
            self.schedule.clamped += 1;
        }

        let first = self.schedule.cells.len();
        for cell in plan.cells(&link, self.local, self.epoch, self.geometry) {
            if let Some(existing) = self.schedule.cells[first..]
                .iter_mut()
                .find(|c| c.coord == cell.coord)
            {
                existing.options |= cell.options;
                self.schedule.merged += 1;
                trace!(link = %link, coord = %cell.coord, options = %existing.options, "merged cells");
                continue;
            }

            match self.owners.get(&cell.coord) {
                Some(owner) => {
                    self.schedule.coincidences += 1;
                    debug!(
                        coord = %cell.coord,
                        link = %link,
                        other = %owner,
                        "cells of two links coincide"
                    );
                }
                None => {
                    self.owners.insert(cell.coord, link);
                }
            }
            self.schedule.cells.push(cell);
        }
    }
}

/// The pending change, if the snapshot does not reflect it yet.
fn stale_change<R>(state: &ScheduleState, routing: &R) -> ChangeReason
where
    R: RoutingSnapshot + ?Sized,
{
    if routing.reflects_pending_change() {
        ChangeReason::None
    } else {
        state.pending()
    }
}

/// The link the schedule keeps toward `neighbor`, if any.
///
/// This is the membership rule [`compute_schedule`] installs by: no parent
/// link at the root, the parent never doubles as a child, and a stale
/// snapshot is corrected by the pending change (a removed child that is
/// still listed has no link, an added leaf that is not listed yet has one).
pub fn scheduled_link<R>(state: &ScheduleState, routing: &R, neighbor: &NodeAddress) -> Option<Link>
where
    R: RoutingSnapshot + ?Sized,
{
    if neighbor.is_null() {
        return None;
    }
    if state.parent() == Some(*neighbor) {
        return (!routing.is_root()).then_some(Link::parent(*neighbor));
    }
    let changed = state.changed() == Some(*neighbor);
    let listed = match stale_change(state, routing) {
        ChangeReason::NeighborRemoved if changed => false,
        ChangeReason::NeighborAddedLeaf if changed => true,
        _ => routing.is_neighbor(neighbor),
    };
    listed.then_some(Link::child(*neighbor))
}

/// Compute the cell list for `state` from `routing`.
///
/// When the snapshot does not yet reflect the pending change, route counts
/// are corrected by one in the direction of the change.
pub fn compute_schedule<R>(
    state: &ScheduleState,
    routing: &R,
    strategy: AllocationStrategy,
    max_additional: Option<u16>,
) -> Schedule
where
    R: RoutingSnapshot + ?Sized,
{
    let reason = stale_change(state, routing);
    let changed = state.changed();
    let parent = state.parent();

    let mut builder = ScheduleBuilder {
        strategy,
        max_additional,
        local: state.local(),
        epoch: state.epoch(),
        geometry: state.geometry(),
        owners: HashMap::new(),
        schedule: Schedule::default(),
    };

    if let Some(parent) = parent.filter(|_| !routing.is_root()) {
        let routes = routing.total_routes();
        let routes = match reason {
            ChangeReason::NeighborAddedLeaf | ChangeReason::NeighborAddedRelay => {
                routes.saturating_add(1)
            }
            ChangeReason::NeighborRemoved => routes.saturating_sub(1),
            ChangeReason::None => routes,
        };
        builder.push_link(Link::parent(parent), routes.saturating_add(1));
    }

    let mut unlisted_leaf = changed.filter(|_| reason == ChangeReason::NeighborAddedLeaf);
    for entry in routing.neighbors() {
        if entry.neighbor.is_null() || Some(entry.neighbor) == parent {
            continue;
        }
        if reason == ChangeReason::NeighborRemoved && changed == Some(entry.neighbor) {
            continue;
        }
        let mut demand = entry.fan_out;
        if unlisted_leaf == Some(entry.neighbor) {
            demand = demand.saturating_add(1);
            unlisted_leaf = None;
        }
        builder.push_link(Link::child(entry.neighbor), demand);
    }
    if let Some(leaf) = unlisted_leaf.filter(|leaf| !leaf.is_null() && Some(*leaf) != parent) {
        builder.push_link(Link::child(leaf), 1);
    }

    builder.schedule
}

fn settle_change<R>(state: &mut ScheduleState, routing: &R)
where
    R: RoutingSnapshot + ?Sized,
{
    if routing.reflects_pending_change() {
        state.clear_change();
    } else if state.pending() != ChangeReason::None {
        trace!(reason = %state.pending(), "snapshot still stale, keeping pending change");
    }
}

/// Installs computed schedules into one host slotframe and remembers what
/// was installed.
#[derive(Debug, Clone)]
pub struct RebuildEngine {
    handle: SlotframeHandle,
    strategy: AllocationStrategy,
    max_additional: Option<u16>,
    installed: Vec<Cell>,
}

impl RebuildEngine {
    pub fn new(
        handle: SlotframeHandle,
        strategy: AllocationStrategy,
        max_additional: Option<u16>,
    ) -> Self {
        Self {
            handle,
            strategy,
            max_additional,
            installed: Vec::new(),
        }
    }

    pub fn handle(&self) -> SlotframeHandle {
        self.handle
    }

    pub fn strategy(&self) -> AllocationStrategy {
        self.strategy
    }

    /// Cells in host installation order.
    pub fn installed(&self) -> &[Cell] {
        &self.installed
    }

    /// The schedule `state` and `routing` call for right now.
    pub fn compute<R>(&self, state: &ScheduleState, routing: &R) -> Schedule
    where
        R: RoutingSnapshot + ?Sized,
    {
        compute_schedule(state, routing, self.strategy, self.max_additional)
    }

    /// Wipe the slotframe and install the full schedule.
    ///
    /// The pending change is cleared once the snapshot reflects it. Until
    /// then it keeps correcting later refreshes and frame lookups.
    pub fn rebuild<H, R>(
        &mut self,
        state: &mut ScheduleState,
        host: &mut H,
        routing: &R,
    ) -> Result<RebuildReport>
    where
        H: SlotframeHost + ?Sized,
        R: RoutingSnapshot + ?Sized,
    {
        let schedule = self.compute(state, routing);
        let reason = state.pending();
        let report = self.install(schedule, host)?;
        settle_change(state, routing);
        debug!(
            handle = %self.handle,
            %reason,
            epoch = %state.epoch(),
            installed = report.installed,
            merged = report.merged,
            clamped = report.clamped,
            coincidences = report.coincidences,
            failed = report.failed,
            "rebuilt unicast slotframe"
        );
        Ok(report)
    }

    /// Re-derive every cell for the current epoch.
    ///
    /// Cells are retuned in place when the new schedule has the same shape
    /// as the installed one. Otherwise, or when the host refuses a retune,
    /// the slotframe is rebuilt.
    pub fn refresh<H, R>(
        &mut self,
        state: &mut ScheduleState,
        host: &mut H,
        routing: &R,
    ) -> Result<RebuildReport>
    where
        H: SlotframeHost + ?Sized,
        R: RoutingSnapshot + ?Sized,
    {
        let schedule = self.compute(state, routing);
        if !schedule.matches_shape(&self.installed) {
            debug!(
                epoch = %state.epoch(),
                before = self.installed.len(),
                after = schedule.cells.len(),
                "schedule shape changed, rebuilding"
            );
            return self.rebuild(state, host, routing);
        }

        for (position, cell) in schedule.cells.iter().enumerate() {
            if let Err(e) = host.retune_cell(self.handle, position, cell) {
                warn!(position, coord = %cell.coord, error = %e, "retune failed, rebuilding");
                return self.rebuild(state, host, routing);
            }
        }

        let report = RebuildReport {
            installed: schedule.cells.len(),
            retuned: schedule.cells.len(),
            merged: schedule.merged,
            clamped: schedule.clamped,
            coincidences: schedule.coincidences,
            failed: 0,
        };
        trace!(epoch = %state.epoch(), retuned = report.retuned, "retuned unicast slotframe");
        self.installed = schedule.cells;
        settle_change(state, routing);
        Ok(report)
    }

    fn install<H>(&mut self, schedule: Schedule, host: &mut H) -> Result<RebuildReport>
    where
        H: SlotframeHost + ?Sized,
    {
        host.remove_all_cells(self.handle)?;
        self.installed.clear();

        let mut report = RebuildReport {
            merged: schedule.merged,
            clamped: schedule.clamped,
            coincidences: schedule.coincidences,
            ..Default::default()
        };
        for cell in schedule.cells {
            match host.install_cell(self.handle, &cell) {
                Ok(()) => {
                    trace!(link = %cell.link, coord = %cell.coord, options = %cell.options, seq = cell.seq, "installed cell");
                    self.installed.push(cell);
                }
                Err(e) => {
                    warn!(link = %cell.link, coord = %cell.coord, error = %e, "host rejected cell");
                    report.failed += 1;
                }
            }
        }
        report.installed = self.installed.len();
        Ok(report)
    }
}
