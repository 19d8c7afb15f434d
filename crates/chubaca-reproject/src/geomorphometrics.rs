use std::path::{Path, PathBuf};

use chubaca_3d::geomorphometry::{metric_cloud, scale_label, GeomorphometryError};
use chubaca_3d::io::pcd::{write_pcd, PcdError};
use chubaca_3d::mesh::TriangleMesh;
use rayon::prelude::*;

use crate::config::GeomorphometryConfig;
use crate::progress::RunControl;

/// Error types for the metric cloud batch.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Failed to create the output directory.
    #[error("Failed to create the output directory")]
    Io(#[from] std::io::Error),

    /// The metrics cannot be computed.
    #[error(transparent)]
    Geomorphometry(#[from] GeomorphometryError),

    /// The metric cloud cannot be written.
    #[error(transparent)]
    Pcd(#[from] PcdError),
}

/// The path of the metric cloud of a scale, `cloud_metrics_<scale>.pcd`.
pub fn metrics_cloud_path(output_dir: &Path, scale: f64) -> PathBuf {
    output_dir.join(format!("cloud_metrics_{}.pcd", scale_label(scale)))
}

/// The outcome of a metric cloud batch.
#[derive(Debug, Default)]
pub struct MetricsBatch {
    /// The written clouds with their scale, in scale order.
    pub written: Vec<(f64, PathBuf)>,
    /// The scales that failed with their error.
    pub failed: Vec<(f64, MetricsError)>,
    /// Whether the batch stopped early on request.
    pub aborted: bool,
}

enum ScaleOutcome {
    Written(f64, PathBuf),
    Failed(f64, MetricsError),
    Skipped,
}

/// Sample the mesh and write one terrain metric cloud per scale.
///
/// Scales run concurrently and each one is sampled with the same seed. A failing scale is
/// logged and reported without stopping the others.
///
/// # Arguments
///
/// * `mesh` - The reconstructed surface.
/// * `output_dir` - The directory receiving the `cloud_metrics_<scale>.pcd` files.
/// * `config` - The scales, sampling and metric settings.
/// * `control` - The abort flag and progress callback.
pub fn generate_metric_clouds(
    mesh: &TriangleMesh,
    output_dir: impl AsRef<Path>,
    config: &GeomorphometryConfig,
    control: &RunControl,
) -> Result<MetricsBatch, MetricsError> {
    let output_dir = output_dir.as_ref();
    std::fs::create_dir_all(output_dir)?;
    let tracker = control.tracker(config.scales.len());

    let outcomes: Vec<ScaleOutcome> = config
        .scales
        .par_iter()
        .map(|&scale| {
            if control.is_aborted() {
                return ScaleOutcome::Skipped;
            }
            let now = std::time::Instant::now();
            let path = metrics_cloud_path(output_dir, scale);
            let result = metric_cloud(mesh, scale, &config.params)
                .map_err(MetricsError::from)
                .and_then(|cloud| write_pcd(&path, &cloud).map_err(MetricsError::from));
            let outcome = match result {
                Ok(()) => {
                    log::info!("scale {scale}: wrote {} in {:?}", path.display(), now.elapsed());
                    ScaleOutcome::Written(scale, path)
                }
                Err(e) => {
                    log::error!("scale {scale}: {e}");
                    ScaleOutcome::Failed(scale, e)
                }
            };
            tracker.advance();
            outcome
        })
        .collect();

    let mut batch = MetricsBatch::default();
    for outcome in outcomes {
        match outcome {
            ScaleOutcome::Written(scale, path) => batch.written.push((scale, path)),
            ScaleOutcome::Failed(scale, e) => batch.failed.push((scale, e)),
            ScaleOutcome::Skipped => batch.aborted = true,
        }
    }
    Ok(batch)
}
