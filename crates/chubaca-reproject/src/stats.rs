use std::collections::{BTreeMap, BTreeSet, HashMap};

use chubaca_3d::pointcloud::PointCloud;
use chubaca_3d::volume::{ExtrusionParams, Volume, VolumeError};
use rayon::prelude::*;

use crate::config::StatsConfig;
use crate::error::ReprojectError;
use crate::mapper::BOUND_ID;
use crate::progress::RunControl;
use crate::tables::{MetricSummary, PolygonRecord};

const RESERVED_FIELDS: [&str; 4] = ["x", "y", "z", "_"];
const RESERVED_PREFIXES: [&str; 3] = ["normal_", "__", "vtkOriginal"];

/// Descriptive statistics of a sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldStats {
    /// The arithmetic mean.
    pub mean: f64,
    /// The sample standard deviation, `NaN` below two values.
    pub sd: f64,
    /// The median.
    pub median: f64,
    /// The first quartile.
    pub q1: f64,
    /// The third quartile.
    pub q3: f64,
}

impl FieldStats {
    /// The statistics of an empty sample.
    pub const NAN: Self = Self {
        mean: f64::NAN,
        sd: f64::NAN,
        median: f64::NAN,
        q1: f64::NAN,
        q3: f64::NAN,
    };
}

/// Compute the statistics of a sample, ignoring its `NaN` values.
///
/// Quartiles follow the exclusive method: the sample is treated as `n + 1` equal parts and
/// the cut points are linearly interpolated between neighbours.
///
/// # Arguments
///
/// * `values` - The sample.
///
/// # Returns
///
/// The statistics, all `NaN` when no value is left.
pub fn describe(values: &[f64]) -> FieldStats {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() {
        return FieldStats::NAN;
    }
    sorted.sort_by(f64::total_cmp);

    let n = sorted.len();
    let mean = sorted.iter().sum::<f64>() / n as f64;
    let sd = if n < 2 {
        f64::NAN
    } else {
        let ss: f64 = sorted.iter().map(|v| (v - mean).powi(2)).sum();
        (ss / (n - 1) as f64).sqrt()
    };
    let median = if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    };
    let (q1, q3) = quartiles(&sorted);

    FieldStats {
        mean,
        sd,
        median,
        q1,
        q3,
    }
}

// sorted must not be empty
fn quartiles(sorted: &[f64]) -> (f64, f64) {
    let n = sorted.len();
    if n == 1 {
        return (sorted[0], sorted[0]);
    }
    let m = (n + 1) as i64;
    let cut = |i: i64| {
        let j = (i * m / 4).clamp(1, n as i64 - 1);
        let delta = (i * m - 4 * j) as f64;
        let j = j as usize;
        (sorted[j - 1] * (4.0 - delta) + sorted[j] * delta) / 4.0
    };
    (cut(1), cut(3))
}

/// Whether a scalar field is a coordinate, normal or bookkeeping field.
pub fn is_reserved_field(name: &str) -> bool {
    RESERVED_FIELDS.contains(&name) || RESERVED_PREFIXES.iter().any(|p| name.starts_with(p))
}

/// Summarize every non reserved scalar field over a subset of the cloud.
///
/// Every field yields one row, with `NaN` statistics when the subset is empty.
pub fn summarize_indices(
    cloud: &PointCloud,
    indices: &[usize],
    track: i64,
    frame: Option<&str>,
) -> Vec<MetricSummary> {
    cloud
        .fields()
        .iter()
        .filter(|field| !is_reserved_field(field.name()))
        .map(|field| {
            let values: Vec<f64> = indices
                .iter()
                .filter_map(|&i| field.values().get(i).copied())
                .collect();
            let stats = describe(&values);
            MetricSummary {
                metrics_name: field.name().to_string(),
                mean: stats.mean,
                sd: stats.sd,
                median: stats.median,
                q1: stats.q1,
                q3: stats.q3,
                track,
                frame: frame.map(str::to_string),
            }
        })
        .collect()
}

/// Polygons grouped into annotation tracks and individual polygons.
#[derive(Debug, Default)]
pub struct Partition<'a> {
    /// Polygons sharing an identifier with at least one other polygon, by identifier.
    pub tracks: BTreeMap<i64, Vec<&'a PolygonRecord>>,
    /// Every other polygon, frame bounds included.
    pub polygons: Vec<&'a PolygonRecord>,
}

/// Split the polygon table into tracks and individual polygons.
pub fn partition(polygons: &[PolygonRecord]) -> Partition<'_> {
    let mut counts: HashMap<i64, usize> = HashMap::new();
    for polygon in polygons {
        *counts.entry(polygon.annotation_id).or_default() += 1;
    }

    let mut partition = Partition::default();
    for polygon in polygons {
        let id = polygon.annotation_id;
        if id != BOUND_ID && counts.get(&id).copied().unwrap_or(0) >= 2 {
            partition.tracks.entry(id).or_default().push(polygon);
        } else {
            partition.polygons.push(polygon);
        }
    }
    partition
}

/// The cloud points enclosed by the volume extruded from a polygon.
pub fn enclosed_indices(
    cloud: &PointCloud,
    polygon: &PolygonRecord,
    params: &ExtrusionParams,
) -> Result<Vec<usize>, VolumeError> {
    let volume = Volume::from_footprint(&polygon.points, params)?;
    Ok(volume.select_enclosed(cloud))
}

/// The union of the points enclosed by every polygon of a track.
///
/// Polygons whose volume cannot be built are logged and left out.
pub fn track_indices(
    cloud: &PointCloud,
    polygons: &[&PolygonRecord],
    params: &ExtrusionParams,
) -> BTreeSet<usize> {
    let mut indices = BTreeSet::new();
    for polygon in polygons {
        match enclosed_indices(cloud, polygon, params) {
            Ok(selected) => indices.extend(selected),
            Err(e) => log::warn!(
                "track {} frame {}: no volume: {e}",
                polygon.annotation_id,
                polygon.frame
            ),
        }
    }
    indices
}

/// Summarize the cloud inside the volume of one polygon.
pub fn summarize_polygon(
    cloud: &PointCloud,
    polygon: &PolygonRecord,
    params: &ExtrusionParams,
) -> Result<Vec<MetricSummary>, VolumeError> {
    let indices = enclosed_indices(cloud, polygon, params)?;
    Ok(summarize_indices(
        cloud,
        &indices,
        polygon.annotation_id,
        Some(polygon.frame.as_str()),
    ))
}

/// Summarize the cloud inside the union of the volumes of a track.
pub fn summarize_track(
    cloud: &PointCloud,
    track: i64,
    polygons: &[&PolygonRecord],
    params: &ExtrusionParams,
) -> Vec<MetricSummary> {
    let indices: Vec<usize> = track_indices(cloud, polygons, params).into_iter().collect();
    log::debug!(
        "track {track}: {} points in {} volumes",
        indices.len(),
        polygons.len()
    );
    summarize_indices(cloud, &indices, track, None)
}

/// The polygon and track summaries of one point cloud.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct VolumeSummaries {
    /// Rows of the individual polygons.
    pub polygons: Vec<MetricSummary>,
    /// Rows of the annotation tracks.
    pub tracks: Vec<MetricSummary>,
}

/// Summarize the scalar fields of a point cloud inside every annotation volume.
///
/// Tracks and polygons are processed in parallel over the shared cloud; their rows keep the
/// order of the track identifiers and of the polygon table.
///
/// # Arguments
///
/// * `cloud` - The point cloud with its scalar fields.
/// * `polygons` - The reprojected polygon table.
/// * `params` - The volume extrusion parameters.
/// * `config` - The statistics settings.
/// * `control` - The abort flag and progress callback.
pub fn stat_summary(
    cloud: &PointCloud,
    polygons: &[PolygonRecord],
    params: &ExtrusionParams,
    config: &StatsConfig,
    control: &RunControl,
) -> Result<VolumeSummaries, ReprojectError> {
    let now = std::time::Instant::now();
    let partition = partition(polygons);
    let individual: &[&PolygonRecord] = if config.video_tracks_only {
        &[]
    } else {
        &partition.polygons
    };
    log::info!(
        "summarizing {} tracks and {} polygons over {} points",
        partition.tracks.len(),
        individual.len(),
        cloud.len()
    );

    let tracker = control.tracker(partition.tracks.len() + individual.len());

    let tracks: Vec<(i64, &Vec<&PolygonRecord>)> =
        partition.tracks.iter().map(|(id, p)| (*id, p)).collect();
    let track_rows: Vec<Vec<MetricSummary>> = tracks
        .par_iter()
        .filter_map(|(id, members)| {
            if control.is_aborted() {
                return None;
            }
            let rows = summarize_track(cloud, *id, members, params);
            tracker.advance();
            Some(rows)
        })
        .collect();

    let polygon_rows: Vec<Vec<MetricSummary>> = individual
        .par_iter()
        .filter_map(|polygon| {
            if control.is_aborted() {
                return None;
            }
            let result = summarize_polygon(cloud, polygon, params);
            tracker.advance();
            match result {
                Ok(rows) => Some(rows),
                Err(e) => {
                    log::warn!(
                        "polygon {} frame {} skipped: {e}",
                        polygon.annotation_id,
                        polygon.frame
                    );
                    None
                }
            }
        })
        .collect();

    if control.is_aborted() {
        return Err(ReprojectError::Aborted);
    }

    log::debug!("volume statistics took {:?}", now.elapsed());

    Ok(VolumeSummaries {
        polygons: polygon_rows.into_iter().flatten().collect(),
        tracks: track_rows.into_iter().flatten().collect(),
    })
}
