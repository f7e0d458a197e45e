//! Host MAC slotframe interface.

use std::fmt;

use atria_core::{Cell, Epoch, Result};

/// Identifies one slotframe of the host MAC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SlotframeHandle(pub u16);

impl fmt::Display for SlotframeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sf{}", self.0)
    }
}

/// The TSCH MAC that owns slotframes and actually uses the cells.
///
/// Failures are reported as [`atria_core::Error::Host`].
pub trait SlotframeHost {
    /// Allocate a slotframe of `period` timeslots.
    fn add_slotframe(&mut self, handle: SlotframeHandle, period: u16) -> Result<()>;

    /// Absolute slotframe number of `handle` right now.
    fn current_epoch(&self, handle: SlotframeHandle) -> Epoch;

    /// Append a cell to the slotframe.
    fn install_cell(&mut self, handle: SlotframeHandle, cell: &Cell) -> Result<()>;

    /// Remove every cell from the slotframe.
    fn remove_all_cells(&mut self, handle: SlotframeHandle) -> Result<()>;

    /// Overwrite the cell at `position` (installation order) in place.
    fn retune_cell(&mut self, handle: SlotframeHandle, position: usize, cell: &Cell) -> Result<()>;
}
