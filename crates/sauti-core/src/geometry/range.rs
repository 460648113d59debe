//! Index-range primitives for the geometry engine.
//!
//! Positions are integer timestep indices on the grid of one pipeline
//! stage. All ranges are half-open. A [`GridRange`] pairs the window of
//! interest (`sub`) with the maximal valid window at that stage (`full`)
//! and the compounded grid scale, so solver results at different stages
//! can be compared safely.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Half-open window `[lo, hi)` of timestep indices at one pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    lo: i64,
    hi: i64,
}

impl Range {
    pub fn new(lo: i64, hi: i64) -> Result<Self> {
        if lo > hi {
            return Err(Error::invariant(format!(
                "range lower bound {lo} exceeds upper bound {hi}"
            )));
        }
        Ok(Range { lo, hi })
    }

    /// Empty range anchored at `at`.
    pub fn empty(at: i64) -> Self {
        Range { lo: at, hi: at }
    }

    /// A candidate upper bound below `lo` collapses to an empty range.
    pub(crate) fn saturating(lo: i64, hi: i64) -> Self {
        Range { lo, hi: hi.max(lo) }
    }

    pub fn lo(&self) -> i64 {
        self.lo
    }

    pub fn hi(&self) -> i64 {
        self.hi
    }

    pub fn len(&self) -> i64 {
        self.hi - self.lo
    }

    pub fn is_empty(&self) -> bool {
        self.lo == self.hi
    }

    /// True when `other` lies entirely within `self`.
    pub fn contains(&self, other: &Range) -> bool {
        self.lo <= other.lo && other.hi <= self.hi
    }

    /// Both bounds clamped into `frame`.
    pub fn clamp_into(&self, frame: &Range) -> Range {
        let lo = self.lo.clamp(frame.lo, frame.hi);
        let hi = self.hi.clamp(frame.lo, frame.hi);
        Range { lo, hi: hi.max(lo) }
    }

    pub fn translate(&self, offset: i64) -> Range {
        Range {
            lo: self.lo + offset,
            hi: self.hi + offset,
        }
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.lo, self.hi)
    }
}

/// Exact rational scale of a grid relative to the anchor grid.
///
/// Downsampling multiplies the scale by the stride; upsampling divides by
/// the factor. Kept reduced so equality is structural.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scale {
    num: u64,
    den: u64,
}

impl Scale {
    pub fn unit() -> Self {
        Scale { num: 1, den: 1 }
    }

    pub fn times(&self, factor: u64) -> Self {
        Scale::reduced(self.num * factor, self.den)
    }

    pub fn over(&self, factor: u64) -> Self {
        Scale::reduced(self.num, self.den * factor)
    }

    pub fn is_unit(&self) -> bool {
        self.num == 1 && self.den == 1
    }

    fn reduced(num: u64, den: u64) -> Self {
        let g = gcd(num, den);
        Scale {
            num: num / g,
            den: den / g,
        }
    }
}

impl Default for Scale {
    fn default() -> Self {
        Scale::unit()
    }
}

impl fmt::Display for Scale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let r = a % b;
        a = b;
        b = r;
    }
    a.max(1)
}

/// Window of interest within the maximal valid window at one stage.
///
/// Invariant: `full.lo <= sub.lo <= sub.hi <= full.hi`. Instances are
/// immutable; every update constructs a new value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridRange {
    full: Range,
    sub: Range,
    scale: Scale,
}

impl GridRange {
    pub fn new(full: Range, sub: Range, scale: Scale) -> Result<Self> {
        if !full.contains(&sub) {
            return Err(Error::invariant(format!(
                "sub range {sub} extends outside full range {full}"
            )));
        }
        Ok(GridRange { full, sub, scale })
    }

    /// Convenience constructor from raw bounds at unit scale.
    pub fn from_bounds(full: (i64, i64), sub: (i64, i64)) -> Result<Self> {
        GridRange::new(
            Range::new(full.0, full.1)?,
            Range::new(sub.0, sub.1)?,
            Scale::unit(),
        )
    }

    pub fn full(&self) -> &Range {
        &self.full
    }

    pub fn sub(&self) -> &Range {
        &self.sub
    }

    pub fn scale(&self) -> Scale {
        self.scale
    }

    pub fn sub_length(&self) -> i64 {
        self.sub.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sub.is_empty()
    }

    /// New instance with the same full range and scale, different window.
    pub fn with_sub(&self, sub: Range) -> Result<Self> {
        GridRange::new(self.full, sub, self.scale)
    }
}

impl fmt::Display for GridRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "full {} sub {} scale {}", self.full, self.sub, self.scale)
    }
}
