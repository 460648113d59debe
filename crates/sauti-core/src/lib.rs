//! Sauti Core - Receptive-Field Geometry for Speech Autoencoders
//!
//! This crate tracks tensor window geometry through a WaveNet-style speech
//! autoencoder: an MFCC frontend, a strided conv encoder, an upsampling
//! conditioning path, and a dilated causal decoder.
//!
//! # Architecture
//!
//! Geometry is solved symbolically, never by running tensors:
//! - Stages declare filter geometry (kernel, resampling, dilation, wings)
//! - A chain arena links stages and names the grids between them
//! - The solver folds windows backward (minimal input) or forward
//!   (maximal output) across any chain span
//! - The model layer composes the full chain from configuration and fixes
//!   the per-window tensor lengths and trim offsets once per model
//!
//! # Example
//!
//! ```ignore
//! use sauti_core::model::{Autoencoder, AutoencoderConfig};
//!
//! let model = Autoencoder::new(AutoencoderConfig::default(), 100)?;
//! let geometry = model.geometry();
//! println!("{geometry}");
//! ```

pub mod audio;
pub mod batch;
pub mod error;
pub mod geometry;
pub mod model;

pub use error::{Error, Result};

// Geometry-facing re-exports
pub use geometry::{
    open_window, Chain, CutPoint, GridRange, Placement, Range, Resample, Scale, Stage, StageId,
    StageSpec, Waypoint,
};

// Model-facing re-exports
pub use model::{Autoencoder, AutoencoderConfig, Trim, WindowGeometry};

// Slicing re-exports
pub use batch::{WindowSlicer, WindowSlices};
