//! ATRIA Scheduling Core
//!
//! Deterministic, coordination-free cell allocation for the unicast slotframe
//! of a TSCH (time-slotted channel hopping) mesh organized as a routing tree.
//!
//! # Agreement Without Messages
//!
//! Two neighbors never negotiate a cell. Each of them hashes the same inputs:
//!
//! ```text
//! key      = id(from) + 264 × id(to)            (order encodes direction)
//! timeslot = H(key + epoch × (seq + 1)) mod period
//! channel  = 1 + H(key + epoch × (seq + 1)) mod (channels − 1)
//! ```
//!
//! and therefore lands on the same (timeslot, channel offset) pair. The epoch
//! (absolute slotframe number) rotates the assignment every slotframe so that
//! two links colliding in one epoch are unlikely to collide in the next.
//!
//! # Strategies
//!
//! - **Single**: one cell per direction per link.
//! - **Replicated**: `demand − 1` extra cells per direction, rehashed per replica.
//! - **Evenly**: the slotframe is split into `2 × (demand − 1)` blocks of
//!   sub-periods, alternating upstream and downstream, one cell per block.
//!
//! Everything in this crate is a pure function of its arguments. The stateful
//! rebuild engine and frame resolver live in `atria-rule`.

mod address;
mod blocks;
mod cell;
mod config;
mod epoch;
mod error;
mod hash;
mod strategy;

pub use address::NodeAddress;
pub use blocks::BlockLayout;
pub use cell::{Cell, CellCoord, CellOptions, Link, LinkKind, TrafficDirection};
pub use config::{EpochMode, Geometry, ScheduleConfig};
pub use epoch::Epoch;
pub use error::{Error, Result};
pub use hash::{hash, link_key, mix, try_hash};
pub use strategy::{
    evenly_cell, replicated_cell, single_cell, AllocationStrategy, CellIndex, CellPlan,
};

/// Channel offset 0 is reserved for the broadcast/EB slotframes.
pub const RESERVED_CHANNEL_OFFSETS: u16 = 1;

/// Multiplier separating the two endpoints in a link key.
pub const LINK_KEY_STRIDE: u32 = 264;

/// Default unicast slotframe length (sub-period × sub-period count).
pub const DEFAULT_UNICAST_PERIOD: u16 = 201;

/// Default hopping sequence length.
pub const DEFAULT_NUM_CHANNELS: u16 = 4;

/// Default width of one sub-period in timeslots.
pub const DEFAULT_SUB_PERIOD: u16 = 3;

/// Default number of sub-periods in the slotframe.
pub const DEFAULT_NUM_SUB_PERIOD: u16 = 67;

const _: () = assert!(DEFAULT_SUB_PERIOD as u32 * DEFAULT_NUM_SUB_PERIOD as u32 <= DEFAULT_UNICAST_PERIOD as u32);
