use chubaca_3d::io::{obj::ObjError, openmvg::SfmError, pcd::PcdError};

use crate::annotation::AnnotationError;
use crate::config::ConfigError;
use crate::contour::ContourError;
use crate::frames::FrameError;
use crate::geomorphometrics::MetricsError;
use crate::hitmap::HitMapError;
use crate::tables::TableError;

/// An error type for the reprojection pipeline.
#[derive(Debug, thiserror::Error)]
pub enum ReprojectError {
    /// The run was aborted before completion.
    #[error("The run was aborted")]
    Aborted,

    /// Error from the configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Error while rendering, writing or reading hit maps.
    #[error(transparent)]
    HitMap(#[from] HitMapError),

    /// Error while building a frame bound.
    #[error(transparent)]
    Contour(#[from] ContourError),

    /// Error while reading an annotation report.
    #[error(transparent)]
    Annotation(#[from] AnnotationError),

    /// Error while reading or writing a table.
    #[error(transparent)]
    Table(#[from] TableError),

    /// Error while listing frames or videos.
    #[error(transparent)]
    Frames(#[from] FrameError),

    /// Error while reading the reconstruction.
    #[error(transparent)]
    Sfm(#[from] SfmError),

    /// Error while reading the mesh.
    #[error(transparent)]
    Mesh(#[from] ObjError),

    /// Error while reading a point cloud.
    #[error(transparent)]
    PointCloud(#[from] PcdError),

    /// Error while generating the terrain metric clouds.
    #[error(transparent)]
    Metrics(#[from] MetricsError),
}
