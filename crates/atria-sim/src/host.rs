//! In-memory TSCH MAC.

use std::collections::BTreeMap;

use atria_core::{Cell, Epoch, Error, Result};
use atria_rule::{SlotframeHandle, SlotframeHost};

/// One slotframe: a period and its cells in installation order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Slotframe {
    pub period: u16,
    pub cells: Vec<Cell>,
}

/// A [`SlotframeHost`] that keeps slotframes in memory.
///
/// Rejects duplicate slotframes, cells outside the period and retunes of
/// positions that were never installed, like a real MAC would.
#[derive(Debug, Clone, Default)]
pub struct MemoryHost {
    epoch: Epoch,
    slotframes: BTreeMap<SlotframeHandle, Slotframe>,
}

impl MemoryHost {
    pub fn new(epoch: Epoch) -> Self {
        Self {
            epoch,
            slotframes: BTreeMap::new(),
        }
    }

    /// Current absolute slotframe number.
    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn set_epoch(&mut self, epoch: Epoch) {
        self.epoch = epoch;
    }

    pub fn slotframe(&self, handle: SlotframeHandle) -> Option<&Slotframe> {
        self.slotframes.get(&handle)
    }

    /// Cells of `handle`, empty if the slotframe does not exist.
    pub fn cells(&self, handle: SlotframeHandle) -> &[Cell] {
        self.slotframes
            .get(&handle)
            .map_or(&[][..], |sf| sf.cells.as_slice())
    }

    fn slotframe_mut(&mut self, handle: SlotframeHandle) -> Result<&mut Slotframe> {
        self.slotframes
            .get_mut(&handle)
            .ok_or_else(|| Error::Host(format!("no slotframe {handle}")))
    }
}

impl SlotframeHost for MemoryHost {
    fn add_slotframe(&mut self, handle: SlotframeHandle, period: u16) -> Result<()> {
        if self.slotframes.contains_key(&handle) {
            return Err(Error::Host(format!("slotframe {handle} already exists")));
        }
        self.slotframes.insert(
            handle,
            Slotframe {
                period,
                cells: Vec::new(),
            },
        );
        Ok(())
    }

    fn current_epoch(&self, _handle: SlotframeHandle) -> Epoch {
        self.epoch
    }

    fn install_cell(&mut self, handle: SlotframeHandle, cell: &Cell) -> Result<()> {
        let sf = self.slotframe_mut(handle)?;
        if cell.coord.timeslot >= sf.period {
            return Err(Error::Host(format!(
                "timeslot {} outside period {}",
                cell.coord.timeslot, sf.period
            )));
        }
        sf.cells.push(*cell);
        Ok(())
    }

    fn remove_all_cells(&mut self, handle: SlotframeHandle) -> Result<()> {
        self.slotframe_mut(handle)?.cells.clear();
        Ok(())
    }

    fn retune_cell(&mut self, handle: SlotframeHandle, position: usize, cell: &Cell) -> Result<()> {
        let sf = self.slotframe_mut(handle)?;
        if cell.coord.timeslot >= sf.period {
            return Err(Error::Host(format!(
                "timeslot {} outside period {}",
                cell.coord.timeslot, sf.period
            )));
        }
        let slot = sf
            .cells
            .get_mut(position)
            .ok_or_else(|| Error::Host(format!("no cell at position {position}")))?;
        *slot = *cell;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atria_core::{CellCoord, CellOptions, Link, NodeAddress, TrafficDirection};

    fn cell(timeslot: u16) -> Cell {
        Cell {
            coord: CellCoord::new(timeslot, 1),
            options: CellOptions::TX,
            link: Link::parent(NodeAddress::from_node_id(1)),
            direction: TrafficDirection::Up,
            seq: 0,
            capacity: 0,
            epoch: Epoch(0),
        }
    }

    #[test]
    fn rejects_duplicate_slotframe() {
        let mut host = MemoryHost::default();
        host.add_slotframe(SlotframeHandle(1), 10).unwrap();
        assert!(host.add_slotframe(SlotframeHandle(1), 10).is_err());
    }

    #[test]
    fn install_and_retune() {
        let mut host = MemoryHost::default();
        let sf = SlotframeHandle(2);
        assert!(host.install_cell(sf, &cell(0)).is_err());

        host.add_slotframe(sf, 10).unwrap();
        host.install_cell(sf, &cell(3)).unwrap();
        assert!(host.install_cell(sf, &cell(10)).is_err());
        host.retune_cell(sf, 0, &cell(7)).unwrap();
        assert!(host.retune_cell(sf, 1, &cell(7)).is_err());
        assert_eq!(host.cells(sf), &[cell(7)]);

        host.remove_all_cells(sf).unwrap();
        assert!(host.cells(sf).is_empty());
    }
}
