//! Window propagation across a chain span.
//!
//! Both directions are folds over the chain span: backward propagation
//! composes [`crate::geometry::Stage::input_range`] from the downstream
//! cut up to the upstream one, forward propagation composes
//! [`crate::geometry::Stage::output_range`] the other way. Identical
//! endpoints denote the identity, so a waypoint pair that happens to
//! collapse (for example an empty decoder segment) costs nothing and
//! changes nothing.

use tracing::debug;

use crate::error::{Error, Result};
use crate::geometry::chain::{Chain, Waypoint};
use crate::geometry::range::GridRange;

/// Frame bound wide enough that any practical window stays interior, so
/// boundary padding never extends availability.
pub(crate) const OPEN_BOUND: i64 = 1 << 40;

/// Grid range on an effectively unbounded frame with window `[lo, hi)`.
pub fn open_window(lo: i64, hi: i64) -> Result<GridRange> {
    GridRange::from_bounds((-OPEN_BOUND, OPEN_BOUND), (lo, hi))
}

impl Chain {
    /// Minimal window at `from` able to produce `out` at `to`.
    pub fn input_range(&self, from: Waypoint, to: Waypoint, out: &GridRange) -> Result<GridRange> {
        let span = self.span(self.resolve(from)?, self.resolve(to)?)?;
        let mut acc = *out;
        for id in span.iter().rev() {
            let stage = &self.stages[*id];
            acc = self.checked(stage.input_range(&acc))?;
        }
        debug!(%from, %to, window = %acc, "geometry: backward propagation");
        Ok(acc)
    }

    /// Window at `to` fully computable from `inp` at `from`.
    pub fn output_range(&self, from: Waypoint, to: Waypoint, inp: &GridRange) -> Result<GridRange> {
        let span = self.span(self.resolve(from)?, self.resolve(to)?)?;
        let mut acc = *inp;
        for id in span {
            let stage = &self.stages[id];
            acc = self.checked(stage.output_range(&acc))?;
        }
        debug!(%from, %to, window = %acc, "geometry: forward propagation");
        Ok(acc)
    }

    /// Length of the minimal `from` window producing a single position
    /// at `to`. This is the receptive field of the span.
    pub fn min_input_length(&self, from: Waypoint, to: Waypoint) -> Result<i64> {
        let out = open_window(0, 1)?;
        Ok(self.input_range(from, to, &out)?.sub_length())
    }

    /// Attach the full chain state to defects surfacing mid-fold.
    fn checked(&self, step: Result<GridRange>) -> Result<GridRange> {
        step.map_err(|err| {
            if err.is_defect() {
                Error::invariant(format!("{err}\n{}", self.dump()))
            } else {
                err
            }
        })
    }
}
