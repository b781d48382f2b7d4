//! Inclusive GNO intervals.

use std::fmt;

use crate::{GNO_RANGE_SEPARATOR, Gno};

/// A non-empty inclusive range `[start, end]` of GNOs belonging to one SID.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct Interval {
    start: Gno,
    end: Gno,
}

impl Interval {
    /// Build an interval. Returns `None` when `start > end`.
    #[must_use]
    pub fn new(start: Gno, end: Gno) -> Option<Self> {
        if start <= end {
            Some(Self { start, end })
        } else {
            None
        }
    }

    /// A degenerate single-GNO interval `[gno, gno]`.
    #[must_use]
    pub const fn point(gno: Gno) -> Self {
        Self {
            start: gno,
            end: gno,
        }
    }

    /// First GNO of the range.
    #[must_use]
    pub const fn start(&self) -> Gno {
        self.start
    }

    /// Last GNO of the range.
    #[must_use]
    pub const fn end(&self) -> Gno {
        self.end
    }

    /// Number of GNOs covered.
    #[must_use]
    pub const fn count(&self) -> u64 {
        self.end.get() - self.start.get() + 1
    }

    /// Whether `gno` falls inside the range.
    #[must_use]
    pub fn contains(&self, gno: Gno) -> bool {
        self.start <= gno && gno <= self.end
    }

    /// Whether `next` starts exactly one past this range's end.
    ///
    /// Two intervals of the same SID are consecutive iff this holds; the
    /// overflow guard makes `[.., u64::MAX]` consecutive with nothing.
    #[must_use]
    pub fn is_followed_by(&self, next: &Self) -> bool {
        match self.end.checked_next() {
            Some(succ) => succ == next.start,
            None => false,
        }
    }

    /// Whether the two ranges overlap or touch, i.e. their union is one
    /// contiguous range.
    #[must_use]
    pub fn joinable_with(&self, other: &Self) -> bool {
        let (lo, hi) = if self.start <= other.start {
            (self, other)
        } else {
            (other, self)
        };
        match lo.end.checked_next() {
            Some(succ) => succ >= hi.start,
            None => true,
        }
    }

    /// Union of two joinable ranges.
    #[must_use]
    pub fn join(&self, other: &Self) -> Self {
        Self {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.start, GNO_RANGE_SEPARATOR, self.end)
    }
}
