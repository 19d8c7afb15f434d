/// Wavefront OBJ mesh reader module.
pub mod obj;

/// OpenMVG `sfm_data.json` reader module.
pub mod openmvg;

/// PCD reader and writer module.
pub mod pcd;
