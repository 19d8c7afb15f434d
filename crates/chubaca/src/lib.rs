#![doc = env!("CARGO_PKG_DESCRIPTION")]

#[doc(inline)]
pub use chubaca_image as image;

#[doc(inline)]
pub use chubaca_imgproc as imgproc;

#[doc(inline)]
pub use chubaca_3d as k3d;

#[doc(inline)]
pub use chubaca_reproject as reproject;
