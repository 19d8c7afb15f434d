#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// canny edge detection module.
pub mod canny;

/// border following module.
pub mod contours;

/// image filtering module.
pub mod filter;

/// image padding module.
pub mod padding;

/// operations to threshold images.
pub mod threshold;
