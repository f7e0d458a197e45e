//! Cells and the links that own them.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use crate::{Epoch, NodeAddress};

/// A (timeslot, channel offset) position in the unicast slotframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CellCoord {
    /// Timeslot within the slotframe
    pub timeslot: u16,
    /// Channel offset (0 is reserved)
    pub channel_offset: u16,
}

impl CellCoord {
    /// Returned for null addresses and zero-capacity slotframes.
    pub const UNSCHEDULABLE: Self = Self {
        timeslot: u16::MAX,
        channel_offset: 1,
    };

    pub const fn new(timeslot: u16, channel_offset: u16) -> Self {
        Self {
            timeslot,
            channel_offset,
        }
    }

    /// Whether this coordinate may be installed.
    #[inline]
    pub const fn is_schedulable(&self) -> bool {
        self.timeslot != u16::MAX
    }

    /// `Some(self)` unless this is the sentinel.
    #[inline]
    pub const fn schedulable(self) -> Option<Self> {
        if self.is_schedulable() {
            Some(self)
        } else {
            None
        }
    }
}

impl fmt::Display for CellCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(ts {}, ch {})", self.timeslot, self.channel_offset)
    }
}

/// Transmit/receive capability of an installed cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CellOptions {
    pub tx: bool,
    pub rx: bool,
}

impl CellOptions {
    pub const TX: Self = Self { tx: true, rx: false };
    pub const RX: Self = Self { tx: false, rx: true };
    pub const TX_RX: Self = Self { tx: true, rx: true };

    /// Whether `other`'s capabilities are all present here.
    pub const fn contains(&self, other: Self) -> bool {
        (self.tx || !other.tx) && (self.rx || !other.rx)
    }
}

impl BitOr for CellOptions {
    type Output = Self;

    fn bitor(self, other: Self) -> Self {
        Self {
            tx: self.tx || other.tx,
            rx: self.rx || other.rx,
        }
    }
}

impl BitOrAssign for CellOptions {
    fn bitor_assign(&mut self, other: Self) {
        *self = *self | other;
    }
}

impl fmt::Display for CellOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.tx, self.rx) {
            (true, true) => write!(f, "TX|RX"),
            (true, false) => write!(f, "TX"),
            (false, true) => write!(f, "RX"),
            (false, false) => write!(f, "-"),
        }
    }
}

/// Direction of traffic carried by a cell, relative to the routing tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TrafficDirection {
    /// Toward the root
    Up,
    /// Away from the root
    Down,
}

/// Which side of the local node a link sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LinkKind {
    /// Link to the preferred parent
    Parent,
    /// Link to a routing next hop below us
    Child,
}

/// A relationship between the local node and one neighbor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Link {
    pub kind: LinkKind,
    pub neighbor: NodeAddress,
}

impl Link {
    pub const fn parent(neighbor: NodeAddress) -> Self {
        Self {
            kind: LinkKind::Parent,
            neighbor,
        }
    }

    pub const fn child(neighbor: NodeAddress) -> Self {
        Self {
            kind: LinkKind::Child,
            neighbor,
        }
    }

    /// The ordered `(from, to)` pair hashed for `direction` on this link.
    pub const fn endpoints(
        &self,
        local: NodeAddress,
        direction: TrafficDirection,
    ) -> (NodeAddress, NodeAddress) {
        match (self.kind, direction) {
            (LinkKind::Parent, TrafficDirection::Up) => (local, self.neighbor),
            (LinkKind::Parent, TrafficDirection::Down) => (self.neighbor, local),
            (LinkKind::Child, TrafficDirection::Up) => (self.neighbor, local),
            (LinkKind::Child, TrafficDirection::Down) => (local, self.neighbor),
        }
    }

    /// Capability the local node needs for `direction` on this link.
    pub const fn options_for(&self, direction: TrafficDirection) -> CellOptions {
        match (self.kind, direction) {
            (LinkKind::Parent, TrafficDirection::Up) => CellOptions::TX,
            (LinkKind::Parent, TrafficDirection::Down) => CellOptions::RX,
            (LinkKind::Child, TrafficDirection::Up) => CellOptions::RX,
            (LinkKind::Child, TrafficDirection::Down) => CellOptions::TX,
        }
    }

    /// Direction of frames the local node sends on this link.
    pub const fn outgoing(&self) -> TrafficDirection {
        match self.kind {
            LinkKind::Parent => TrafficDirection::Up,
            LinkKind::Child => TrafficDirection::Down,
        }
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            LinkKind::Parent => write!(f, "parent {}", self.neighbor),
            LinkKind::Child => write!(f, "child {}", self.neighbor),
        }
    }
}

/// A cell assignment installed in the unicast slotframe.
///
/// Derived state: every field can be recomputed from the link, the epoch,
/// the sequence index and the capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Cell {
    pub coord: CellCoord,
    pub options: CellOptions,
    pub link: Link,
    pub direction: TrafficDirection,
    /// 0 for the base cell, replica number or block number otherwise
    pub seq: u16,
    /// Replica or block count the cell was computed with
    pub capacity: u16,
    /// Epoch the coordinate was derived for
    pub epoch: Epoch,
}

impl Cell {
    /// Whether two cells occupy the same link, direction and sequence slot.
    pub fn same_shape(&self, other: &Cell) -> bool {
        self.link == other.link
            && self.direction == other.direction
            && self.seq == other.seq
            && self.capacity == other.capacity
            && self.options == other.options
    }
}
