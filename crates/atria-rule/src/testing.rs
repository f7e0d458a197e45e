//! Routing and host doubles for unit tests.

use atria_core::{Cell, Epoch, Error, NodeAddress, Result};

use crate::{RouteEntry, RoutingSnapshot, SlotframeHandle, SlotframeHost};

pub const MIN_HOP: u16 = 256;

pub fn addr(id: u8) -> NodeAddress {
    NodeAddress::from_node_id(id)
}

#[derive(Debug, Clone)]
pub struct StaticRouting {
    pub parent: Option<NodeAddress>,
    pub routes: Vec<RouteEntry>,
    pub rank: Option<u16>,
    pub parent_knows_us: bool,
    pub fresh: bool,
}

impl StaticRouting {
    pub fn root() -> Self {
        Self::node(None, 0)
    }

    /// A node `depth` hops below the root.
    pub fn node(parent: Option<NodeAddress>, depth: u16) -> Self {
        Self {
            parent,
            routes: Vec::new(),
            rank: Some(MIN_HOP * (depth + 1)),
            parent_knows_us: true,
            fresh: true,
        }
    }

    pub fn with_child(mut self, neighbor: NodeAddress, fan_out: u32) -> Self {
        self.routes.push(RouteEntry::new(neighbor, fan_out));
        self
    }

    pub fn stale(mut self) -> Self {
        self.fresh = false;
        self
    }
}

impl RoutingSnapshot for StaticRouting {
    fn preferred_parent(&self) -> Option<NodeAddress> {
        self.parent
    }

    fn neighbors(&self) -> &[RouteEntry] {
        &self.routes
    }

    fn rank(&self) -> Option<u16> {
        self.rank
    }

    fn min_hop_rank_increase(&self) -> u16 {
        MIN_HOP
    }

    fn parent_knows_us(&self) -> bool {
        self.parent_knows_us
    }

    fn reflects_pending_change(&self) -> bool {
        self.fresh
    }
}

#[derive(Debug, Default)]
pub struct RecordingHost {
    pub slotframes: Vec<(SlotframeHandle, u16)>,
    pub epoch: Epoch,
    pub cells: Vec<Cell>,
    pub removals: usize,
    pub retunes: usize,
    /// Reject installs beyond this many cells.
    pub capacity: Option<usize>,
}

impl SlotframeHost for RecordingHost {
    fn add_slotframe(&mut self, handle: SlotframeHandle, period: u16) -> Result<()> {
        self.slotframes.push((handle, period));
        Ok(())
    }

    fn current_epoch(&self, _handle: SlotframeHandle) -> Epoch {
        self.epoch
    }

    fn install_cell(&mut self, _handle: SlotframeHandle, cell: &Cell) -> Result<()> {
        if self.capacity.is_some_and(|max| self.cells.len() >= max) {
            return Err(Error::Host("slotframe full".into()));
        }
        self.cells.push(*cell);
        Ok(())
    }

    fn remove_all_cells(&mut self, _handle: SlotframeHandle) -> Result<()> {
        self.cells.clear();
        self.removals += 1;
        Ok(())
    }

    fn retune_cell(&mut self, _handle: SlotframeHandle, position: usize, cell: &Cell) -> Result<()> {
        let slot = self
            .cells
            .get_mut(position)
            .ok_or_else(|| Error::Host(format!("no cell at {position}")))?;
        *slot = *cell;
        self.retunes += 1;
        Ok(())
    }
}
