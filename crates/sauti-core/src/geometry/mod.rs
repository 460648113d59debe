//! Receptive-field geometry for stacked resampling filter stages.
//!
//! Every tensor window the models exchange is described on an integer grid
//! by a [`GridRange`]: a half-open full range for the whole timestep axis,
//! a half-open sub-range for the window of interest, and the exact rational
//! scale of the grid relative to where propagation started. Stages declare
//! only their filter geometry (kernel size, resampling factor, dilation,
//! wing placement, boundary pads); the solver folds windows across a
//! [`Chain`] of stages in either direction:
//!
//! ```text
//!             backward: minimal input needed for a requested output
//!        <-------------------------------------------------------
//!   samples -> [mfcc /160] -> [encoder convs] -> [upsample xN] -> samples
//!        ------------------------------------------------------->
//!             forward: maximal output computable from an input
//! ```
//!
//! Backward-then-forward never loses positions: the forward image of a
//! minimal input window always covers the window it was derived from.
//! Named grids along the chain are addressed by [`Waypoint`] rather than
//! raw stage index, so callers stay valid when a stack is reconfigured.

mod chain;
mod range;
mod solver;
mod stage;

pub use chain::{Chain, CutPoint, Waypoint};
pub use range::{GridRange, Range, Scale};
pub use solver::open_window;
pub use stage::{Placement, Resample, Stage, StageId, StageSpec};
