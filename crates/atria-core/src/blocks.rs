//! Evenly-distributed block layout.
//!
//! The slotframe is a run of `num_sub_period` sub-periods. An evenly
//! distributed allocation splits that run into `blocks` contiguous blocks
//! with cumulative boundaries:
//!
//! ```text
//! end(0) = 0
//! end(i) = ceil(num_sub_period × i / blocks)
//! size(i) = end(i) − end(i − 1)
//! ```
//!
//! Computing each boundary from scratch (instead of summing rounded sizes)
//! means rounding never drifts: the sizes always sum to `num_sub_period`.
//! Integer arithmetic keeps the layout identical on every node.
//!
//! Boundaries round up, so the larger blocks come first: 67 sub-periods in
//! four blocks are `[17, 17, 17, 16]`. Layouts that truncate the boundary
//! (`[16, 17, 17, 17]`) or round it to nearest place blocks differently and
//! do not interoperate with this one.

use crate::TrafficDirection;

/// Block boundaries for one evenly distributed allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockLayout {
    num_sub_period: u16,
    blocks: u16,
}

impl BlockLayout {
    /// Create a layout. Returns `None` for zero blocks.
    pub const fn new(num_sub_period: u16, blocks: u16) -> Option<Self> {
        if blocks == 0 {
            return None;
        }
        Some(Self {
            num_sub_period,
            blocks,
        })
    }

    /// Number of blocks.
    pub const fn blocks(&self) -> u16 {
        self.blocks
    }

    /// Total sub-periods covered.
    pub const fn num_sub_period(&self) -> u16 {
        self.num_sub_period
    }

    /// Exclusive end of block `i` (1-based). `end(0) == 0`.
    pub const fn end(&self, i: u16) -> u16 {
        if i >= self.blocks {
            return self.num_sub_period;
        }
        let n = self.num_sub_period as u64;
        let b = self.blocks as u64;
        ((n * i as u64 + b - 1) / b) as u16
    }

    /// First sub-period of block `i` (1-based).
    pub const fn start(&self, i: u16) -> u16 {
        if i == 0 {
            return 0;
        }
        self.end(i - 1)
    }

    /// Size of block `i` (1-based) in sub-periods. Zero outside `1..=blocks`.
    pub const fn size(&self, i: u16) -> u16 {
        if i == 0 || i > self.blocks {
            return 0;
        }
        self.end(i) - self.end(i - 1)
    }

    /// Sizes of all blocks in order.
    pub fn sizes(&self) -> impl Iterator<Item = u16> + '_ {
        (1..=self.blocks).map(move |i| self.size(i))
    }

    /// Traffic direction served by block `i`: odd blocks upward, even downward.
    pub const fn direction(i: u16) -> TrafficDirection {
        if i % 2 == 1 {
            TrafficDirection::Up
        } else {
            TrafficDirection::Down
        }
    }
}
