#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Annotation reports and the annotation data model.
pub mod annotation;

/// Run configuration.
pub mod config;

/// Frame bound extraction from hit maps.
pub mod contour;

/// Umbrella error type of the crate.
pub mod error;

/// Rendered frame and source video listings.
pub mod frames;

/// Terrain metric clouds sampled from the mesh.
pub mod geomorphometrics;

/// Per camera ray/mesh intersection rasters.
pub mod hitmap;

/// Mapping of 2D annotations to 3D coordinates.
pub mod mapper;

/// Cooperative cancellation and progress reporting.
pub mod progress;

/// Point cloud statistics inside annotation volumes.
pub mod stats;

/// Reprojection and summary tables.
pub mod tables;

/// Alignment of video annotation tracks with rendered frames.
pub mod tracks;

pub use crate::config::ReprojectionConfig;
pub use crate::error::ReprojectError;
pub use crate::progress::RunControl;
