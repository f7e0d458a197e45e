//! Serializable schedule snapshots.

use atria_core::{Cell, Epoch, NodeAddress, ScheduleConfig};
use serde::{Deserialize, Serialize};

use crate::Result;

/// Every node's installed cells at one epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSnapshot {
    pub epoch: Epoch,
    pub config: ScheduleConfig,
    pub nodes: Vec<NodeSnapshot>,
}

/// One node's position in the tree and its cells.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub address: NodeAddress,
    pub parent: Option<NodeAddress>,
    pub depth: usize,
    /// Downward routes (descendants).
    pub routes: u32,
    pub cells: Vec<Cell>,
}

impl NetworkSnapshot {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Total cells across all nodes.
    pub fn cell_count(&self) -> usize {
        self.nodes.iter().map(|n| n.cells.len()).sum()
    }

    pub fn node(&self, address: &NodeAddress) -> Option<&NodeSnapshot> {
        self.nodes.iter().find(|n| n.address == *address)
    }
}
