#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Calibrated camera model and ray generation.
pub mod camera;

/// I/O utilities for reading meshes, point clouds and reconstructions.
pub mod io;

/// Triangle mesh representation.
pub mod mesh;

/// Point cloud with named scalar fields.
pub mod pointcloud;

/// Ray casting against triangle meshes.
pub mod raycast;

/// Closed volumes extruded from annotation footprints.
pub mod volume;

/// 2D Delaunay triangulation.
pub mod delaunay;

/// Terrain metrics from local neighbourhoods of surface samples.
pub mod geomorphometry;
