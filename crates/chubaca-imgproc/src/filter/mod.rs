//! Filter operations
//!
//! This module provides the gradient filters used by the edge detector.

/// Filter kernels
pub mod kernels;

/// Filter operations
mod ops;
pub use ops::*;
