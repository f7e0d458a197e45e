//! ATRIA Network Simulation
//!
//! Runs the unicast rule on every node of a simulated routing tree, each
//! against its own in-memory MAC, and audits that neighbors derived the same
//! cells without exchanging a single message.
//!
//! # Model
//!
//! - [`RoutingTree`] plays RPL storing mode: one preferred parent per node,
//!   one downward route per descendant.
//! - [`MemoryHost`] plays the TSCH MAC: slotframes as ordered cell lists
//!   and a shared slotframe counter.
//! - [`Network`] turns joins, departures, parent switches and slotframe
//!   ticks into the events a real routing stack would raise.
//!
//! # Agreement
//!
//! For every edge `child → parent`, the child's TX cells on its parent link
//! must equal the parent's RX cells on the child link, and the reverse for
//! downward traffic. A per-frame cell lookup on either side must land on a
//! cell the other side listens on.

mod error;
mod host;
mod network;
mod simulation;
mod snapshot;
mod tree;

pub use error::{Result, SimError};
pub use host::{MemoryHost, Slotframe};
pub use network::{Disagreement, Network, SimNode};
pub use simulation::{node_address, random_network, run, SimulationConfig, SimulationOutcome, MAX_NODES};
pub use snapshot::{NetworkSnapshot, NodeSnapshot};
pub use tree::{NodeView, RoutingTree, MIN_HOP_RANK_INCREASE};
