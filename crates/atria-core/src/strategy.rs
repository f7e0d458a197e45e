//! Cell allocation strategies.
//!
//! Every function here is pure: the same ordered address pair, epoch, index
//! and slotframe geometry always produce the same [`CellCoord`], on every
//! node and on every call. A null address or an empty modulus produces
//! [`CellCoord::UNSCHEDULABLE`] instead of an error.

use std::fmt;
use std::str::FromStr;

use crate::{
    link_key, try_hash, BlockLayout, Cell, CellCoord, Epoch, Error, Geometry, Link, NodeAddress,
    Result, TrafficDirection, RESERVED_CHANNEL_OFFSETS,
};

/// The cell allocation policy, chosen once per network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AllocationStrategy {
    /// One cell per direction per link.
    #[default]
    Single,
    /// Base cell plus one rehashed replica per extra unit of demand.
    Replicated,
    /// Base cell plus alternating up/down blocks spread over the slotframe.
    Evenly,
}

impl AllocationStrategy {
    /// Coordinate of one cell of a link.
    ///
    /// Sequence 0 is the base cell and is identical for every strategy.
    /// Replicated accepts `1..=capacity`; Evenly accepts block numbers
    /// `1..=capacity` whose parity matches `index.direction`.
    pub fn coord(
        &self,
        from: &NodeAddress,
        to: &NodeAddress,
        index: CellIndex,
        epoch: Epoch,
        geometry: &Geometry,
    ) -> CellCoord {
        if index.seq == 0 {
            return single_cell(from, to, epoch, geometry);
        }
        if index.seq > index.capacity {
            return CellCoord::UNSCHEDULABLE;
        }
        match self {
            Self::Single => CellCoord::UNSCHEDULABLE,
            Self::Replicated => replicated_cell(from, to, epoch, index.seq, geometry),
            Self::Evenly => match BlockLayout::new(geometry.num_sub_period, index.capacity) {
                Some(layout) if BlockLayout::direction(index.seq) == index.direction => {
                    evenly_cell(from, to, epoch, index.seq, &layout, geometry)
                }
                _ => CellCoord::UNSCHEDULABLE,
            },
        }
    }
}

impl fmt::Display for AllocationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single => write!(f, "single"),
            Self::Replicated => write!(f, "replicated"),
            Self::Evenly => write!(f, "evenly"),
        }
    }
}

impl FromStr for AllocationStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" => Ok(Self::Single),
            "replicated" | "multiple" => Ok(Self::Replicated),
            "evenly" | "blocks" => Ok(Self::Evenly),
            other => Err(Error::InvalidConfig(format!("unknown strategy '{other}'"))),
        }
    }
}

/// Which cell of a link is being computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellIndex {
    pub direction: TrafficDirection,
    /// 0 for the base cell
    pub seq: u16,
    /// Replica or block count of the link
    pub capacity: u16,
}

impl CellIndex {
    /// The base cell for `direction`.
    pub const fn base(direction: TrafficDirection) -> Self {
        Self {
            direction,
            seq: 0,
            capacity: 0,
        }
    }
}

#[inline]
fn channel_offset(key: u32, geometry: &Geometry) -> u16 {
    RESERVED_CHANNEL_OFFSETS + try_hash(key, geometry.channel_offsets).unwrap_or(0)
}

/// One cell per direction per link per epoch.
pub fn single_cell(
    from: &NodeAddress,
    to: &NodeAddress,
    epoch: Epoch,
    geometry: &Geometry,
) -> CellCoord {
    replicated_cell(from, to, epoch, 0, geometry)
}

/// Replica `seq` of a link: the epoch is scaled by `seq + 1` before hashing.
pub fn replicated_cell(
    from: &NodeAddress,
    to: &NodeAddress,
    epoch: Epoch,
    seq: u16,
    geometry: &Geometry,
) -> CellCoord {
    if from.is_null() || to.is_null() {
        return CellCoord::UNSCHEDULABLE;
    }
    let key = link_key(from, to).wrapping_add(epoch.0.wrapping_mul(seq as u32 + 1));
    match try_hash(key, geometry.period) {
        Some(timeslot) => CellCoord::new(timeslot, channel_offset(key, geometry)),
        None => CellCoord::UNSCHEDULABLE,
    }
}

/// Cell for block `block` (1-based) of an evenly distributed layout.
///
/// ```text
/// timeslot = (H(key) mod size(block) + start(block)) × sub_period + H(key) mod sub_period
/// ```
pub fn evenly_cell(
    from: &NodeAddress,
    to: &NodeAddress,
    epoch: Epoch,
    block: u16,
    layout: &BlockLayout,
    geometry: &Geometry,
) -> CellCoord {
    if from.is_null() || to.is_null() {
        return CellCoord::UNSCHEDULABLE;
    }
    let key = link_key(from, to).wrapping_add(epoch.0.wrapping_mul(block as u32 + 1));
    let (Some(frame_offset), Some(slot_offset)) = (
        try_hash(key, layout.size(block)),
        try_hash(key, geometry.sub_period),
    ) else {
        return CellCoord::UNSCHEDULABLE;
    };
    let timeslot = (frame_offset as u32 + layout.start(block) as u32) * geometry.sub_period as u32
        + slot_offset as u32;
    if timeslot >= geometry.period as u32 {
        return CellCoord::UNSCHEDULABLE;
    }
    CellCoord::new(timeslot as u16, channel_offset(key, geometry))
}

/// How many cells a link gets for a given demand.
///
/// Demand counts the flows carried by the link: the base cell serves one,
/// every further unit adds a replica (Replicated) or an up/down block pair
/// (Evenly). Requests beyond what the slotframe can hold are clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellPlan {
    strategy: AllocationStrategy,
    additional: u16,
    clamped: bool,
}

impl CellPlan {
    /// Plan the cells of a link carrying `demand` flows.
    pub fn for_demand(
        strategy: AllocationStrategy,
        demand: u32,
        geometry: &Geometry,
        max_additional: Option<u16>,
    ) -> Self {
        let extra = demand.saturating_sub(1);
        let (wanted, mut limit) = match strategy {
            AllocationStrategy::Single => (0, 0),
            AllocationStrategy::Replicated => (extra, geometry.capacity().saturating_sub(1)),
            AllocationStrategy::Evenly => (extra.saturating_mul(2), geometry.num_sub_period as u32),
        };
        if let Some(max) = max_additional {
            limit = limit.min(max as u32);
        }
        limit = limit.min(u16::MAX as u32);
        if strategy == AllocationStrategy::Evenly {
            // Blocks come in up/down pairs.
            limit &= !1;
        }
        Self {
            strategy,
            additional: wanted.min(limit) as u16,
            clamped: wanted > limit,
        }
    }

    pub const fn strategy(&self) -> AllocationStrategy {
        self.strategy
    }

    /// Replica count (Replicated) or block count (Evenly).
    pub const fn additional(&self) -> u16 {
        self.additional
    }

    /// Whether the demand was cut down to fit the slotframe.
    pub const fn is_clamped(&self) -> bool {
        self.clamped
    }

    /// All schedulable cells of `link` for `epoch`, in installation order:
    /// base up, base down, then the additional cells.
    pub fn cells(
        &self,
        link: &Link,
        local: NodeAddress,
        epoch: Epoch,
        geometry: &Geometry,
    ) -> Vec<Cell> {
        let mut indices = vec![
            CellIndex::base(TrafficDirection::Up),
            CellIndex::base(TrafficDirection::Down),
        ];
        match self.strategy {
            AllocationStrategy::Single => {}
            AllocationStrategy::Replicated => {
                for seq in 1..=self.additional {
                    for direction in [TrafficDirection::Up, TrafficDirection::Down] {
                        indices.push(CellIndex {
                            direction,
                            seq,
                            capacity: self.additional,
                        });
                    }
                }
            }
            AllocationStrategy::Evenly => {
                for seq in 1..=self.additional {
                    indices.push(CellIndex {
                        direction: BlockLayout::direction(seq),
                        seq,
                        capacity: self.additional,
                    });
                }
            }
        }

        indices
            .into_iter()
            .filter_map(|index| {
                let (from, to) = link.endpoints(local, index.direction);
                let coord = self
                    .strategy
                    .coord(&from, &to, index, epoch, geometry)
                    .schedulable()?;
                Some(Cell {
                    coord,
                    options: link.options_for(index.direction),
                    link: *link,
                    direction: index.direction,
                    seq: index.seq,
                    capacity: self.additional,
                    epoch,
                })
            })
            .collect()
    }
}
