//! Identifier newtypes for the CIF core.
//!
//! Kept in their own crate, mirroring how larger stores separate the
//! key-shaped types (table/column/index ids) from the engine that uses them:
//! these types carry no behavior beyond comparison, ordering and display.

use derive_more::{Display, From};

/// Surrogate primary key of a `container` row (one per block or frame).
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, From)]
pub struct ContainerId(pub i64);

/// Sentinel used in place of a nullable `block_id` column for a block's own
/// (non-existent) parent. Frames always carry a real `ContainerId` here.
pub const NO_PARENT: i64 = -1;

/// Container-local loop number, assigned monotonically as loops are created.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, From)]
pub struct LoopNum(pub i64);

/// Row number within a loop. Dense and zero-based in steady state, though the
/// core never assumes a particular row is present — only that every item of
/// a loop shares the same set of row numbers (see `state_view` invariant).
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, From)]
pub struct RowNum(pub i64);

impl LoopNum {
    pub const FIRST: LoopNum = LoopNum(0);

    pub fn next(self) -> LoopNum {
        LoopNum(self.0 + 1)
    }
}

impl RowNum {
    pub const FIRST: RowNum = RowNum(0);

    pub fn next(self) -> RowNum {
        RowNum(self.0 + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loop_num_ordering_matches_inner_value() {
        assert!(LoopNum(0) < LoopNum(1));
        assert_eq!(LoopNum::FIRST.next(), LoopNum(1));
    }

    #[test]
    fn row_num_next_is_monotonic() {
        let a = RowNum(5);
        assert!(a.next() > a);
    }
}
