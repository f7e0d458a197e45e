//! ATRIA Unicast Rule
//!
//! Per-neighbor unicast scheduling for a TSCH MAC running RPL in storing
//! mode. The rule owns one unicast slotframe and keeps it in sync with the
//! routing tree:
//!
//! - the **rebuild engine** derives every cell of the parent link and of
//!   each child link from `atria-core` and installs them into the host;
//! - the **frame cell resolver** re-derives the cell for a single outgoing
//!   frame without looking at the installed schedule;
//! - the **event adapter** ([`UnicastRule`]) maps parent changes, child
//!   additions and removals, and slotframe ticks onto rebuilds.
//!
//! # Collaborators
//!
//! The rule reads routing through [`RoutingSnapshot`] and drives the MAC
//! through [`SlotframeHost`]. Both are passed in on every call, so the rule
//! holds no references into either.
//!
//! ```text
//!   routing events ──► UnicastRule ──► RebuildEngine ──► SlotframeHost
//!                          │
//!   outgoing frame ──► resolver ──► (slotframe, timeslot, channel offset)
//! ```

mod engine;
mod host;
mod resolver;
mod routing;
mod rule;
mod state;

#[cfg(test)]
mod testing;

pub use engine::{compute_schedule, scheduled_link, RebuildEngine, RebuildReport, Schedule};
pub use host::{SlotframeHandle, SlotframeHost};
pub use resolver::{link_to, neighbor_has_unicast_link, resolve, CellSelector};
pub use routing::{RouteEntry, RoutingSnapshot};
pub use rule::{FrameKind, OutgoingFrame, UnicastRule};
pub use state::{ChangeReason, ChildKind, ScheduleState};

/// Slotframe handle used for the unicast slotframe unless the host picks one.
pub const DEFAULT_UNICAST_HANDLE: SlotframeHandle = SlotframeHandle(1);
