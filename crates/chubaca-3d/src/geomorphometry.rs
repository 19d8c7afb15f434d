use faer::prelude::SpSolver;
use glam::DVec3;
use kiddo::immutable::float::kdtree::ImmutableKdTree;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rayon::prelude::*;

use crate::mesh::TriangleMesh;
use crate::pointcloud::{PointCloud, PointCloudError};

/// Error types for the geomorphometry module.
#[derive(Debug, thiserror::Error)]
pub enum GeomorphometryError {
    /// The neighbourhood radius is not a positive number.
    #[error("Invalid scale {0}, expected a positive radius")]
    InvalidScale(f64),

    /// The mesh has no area to sample.
    #[error("The mesh has no surface to sample")]
    EmptySurface,

    /// The sampling density is not a positive number.
    #[error("Invalid sampling density {0}")]
    InvalidDensity(f64),

    /// A metric field cannot be attached to the cloud.
    #[error(transparent)]
    PointCloud(#[from] PointCloudError),
}

/// The terrain metrics to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct MetricSelection {
    /// Angle between the local normal and the vertical, in degrees.
    pub slope: bool,
    /// Azimuth of the steepest descent clockwise from north, in degrees, with its northness
    /// and eastness components.
    pub aspect: bool,
    /// Distance of each point to the plane fitted on its neighbours.
    pub roughness: bool,
    /// Terrain ruggedness index.
    pub tri: bool,
    /// Bathymetric position index.
    pub bpi: bool,
    /// Gaussian curvature of the local quadric.
    pub gaussian_curvature: bool,
    /// Mean curvature of the local quadric.
    pub mean_curvature: bool,
    /// Vector ruggedness measure.
    pub vrm: bool,
}

impl Default for MetricSelection {
    fn default() -> Self {
        Self {
            slope: true,
            aspect: true,
            roughness: true,
            tri: true,
            bpi: true,
            gaussian_curvature: true,
            mean_curvature: true,
            vrm: true,
        }
    }
}

/// How the mesh is sampled before the metrics are computed.
#[derive(Debug, Clone, Copy, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct GeomorphometryParams {
    /// Expected number of points in a disk of radius `scale`.
    pub target_neighbours: usize,
    /// Lower bound of the sampling density, in points per square unit.
    pub min_density: f64,
    /// Upper bound of the sampling density, in points per square unit.
    pub max_density: f64,
    /// Seed of the surface sampler.
    pub seed: u64,
    /// The metrics to compute.
    pub metrics: MetricSelection,
}

impl Default for GeomorphometryParams {
    fn default() -> Self {
        Self {
            target_neighbours: 10,
            min_density: 100.0,
            max_density: 3000.0,
            seed: 0,
            metrics: MetricSelection::default(),
        }
    }
}

/// The label of a scale in field and file names: `0.5` gives `0.5`, `2` gives `2.0`.
pub fn scale_label(scale: f64) -> String {
    if scale.fract() == 0.0 {
        format!("{scale:.1}")
    } else {
        format!("{scale}")
    }
}

/// The name of a metric field at a scale, e.g. `slope_deg_0.5_m`.
pub fn metric_field_name(metric: &str, scale: f64) -> String {
    format!("{metric}_{}_m", scale_label(scale))
}

/// The sampling density giving about `target_neighbours` points within `scale` of a point.
pub fn sampling_density(scale: f64, params: &GeomorphometryParams) -> f64 {
    let density = params.target_neighbours as f64 / (std::f64::consts::PI * scale * scale);
    density.max(params.min_density).min(params.max_density)
}

/// Draw points uniformly over the surface of a mesh.
///
/// The number of points is the mesh area times the density, rounded up. Each point carries
/// the unit normal of the face it was drawn from.
///
/// # Arguments
///
/// * `mesh` - The surface to sample.
/// * `density` - The number of points per square unit.
/// * `seed` - The seed of the random generator.
pub fn sample_surface(
    mesh: &TriangleMesh,
    density: f64,
    seed: u64,
) -> Result<PointCloud, GeomorphometryError> {
    if !(density.is_finite() && density > 0.0) {
        return Err(GeomorphometryError::InvalidDensity(density));
    }

    let faces: Vec<([DVec3; 3], DVec3)> = (0..mesh.num_faces())
        .map(|i| {
            let [a, b, c] = mesh.triangle(i);
            ([a, b, c], (b - a).cross(c - a))
        })
        .collect();

    // cumulative face areas, the cross product length is twice the area
    let cumulative: Vec<f64> = faces
        .iter()
        .scan(0.0, |acc, (_, n)| {
            *acc += n.length() / 2.0;
            Some(*acc)
        })
        .collect();
    let area = cumulative.last().copied().unwrap_or(0.0);
    if !(area > 0.0) {
        return Err(GeomorphometryError::EmptySurface);
    }

    let count = (area * density).ceil() as usize;
    let mut rng = StdRng::seed_from_u64(seed);
    let mut points = Vec::with_capacity(count);
    let mut normals = Vec::with_capacity(count);
    for _ in 0..count {
        let target = rng.random::<f64>() * area;
        let face = cumulative
            .partition_point(|&c| c <= target)
            .min(faces.len() - 1);
        let ([a, b, c], n) = faces[face];

        let (mut r1, mut r2) = (rng.random::<f64>(), rng.random::<f64>());
        if r1 + r2 > 1.0 {
            (r1, r2) = (1.0 - r1, 1.0 - r2);
        }
        points.push((a + (b - a) * r1 + (c - a) * r2).to_array());
        normals.push(n.normalize_or_zero().to_array());
    }

    log::debug!("sampled {count} points over an area of {area:.3}");
    Ok(PointCloud::new(points, None, Some(normals)))
}

// A least squares plane through the centroid of a neighbourhood.
#[derive(Debug, Clone, Copy)]
struct PlaneFit {
    centroid: DVec3,
    // unit normal, smallest variance direction
    normal: DVec3,
    // unit in-plane axes, largest variance first
    tangents: [DVec3; 2],
}

impl PlaneFit {
    fn signed_distance(&self, p: DVec3) -> f64 {
        (p - self.centroid).dot(self.normal)
    }

    // flip the frame so the normal agrees with `up`
    fn oriented(mut self, up: DVec3) -> Self {
        if self.normal.dot(up) < 0.0 {
            self.normal = -self.normal;
            self.tangents[1] = -self.tangents[1];
        }
        self
    }
}

fn fit_plane(points: &[DVec3]) -> Option<PlaneFit> {
    if points.len() < 3 {
        return None;
    }
    let centroid = points.iter().copied().sum::<DVec3>() / points.len() as f64;
    let centered = faer::Mat::<f64>::from_fn(points.len(), 3, |i, j| (points[i] - centroid)[j]);

    // the right singular vectors are the principal axes, by decreasing variance
    let svd = centered.svd();
    let v = svd.v();
    let axis = |k: usize| {
        let col = v.col(k);
        DVec3::new(col[0], col[1], col[2])
    };
    let tangents = [axis(0), axis(1)];
    let normal = axis(2);

    // collinear neighbourhoods have no variance along the second axis
    let spread: f64 = points.iter().map(|p| (*p - centroid).length_squared()).sum();
    let second: f64 = points
        .iter()
        .map(|p| (*p - centroid).dot(tangents[1]).powi(2))
        .sum();
    if !(spread > 0.0) || second <= 1e-12 * spread || !normal.is_finite() {
        return None;
    }

    Some(PlaneFit {
        centroid,
        normal,
        tangents,
    })
}

// Mean and Gaussian curvature at `origin` of the quadric w = a u² + b uv + c v² + d u + e v + f
// fitted in the plane frame, coordinates scaled by `scale` for conditioning.
fn quadric_curvatures(
    origin: DVec3,
    neighbours: &[DVec3],
    plane: &PlaneFit,
    scale: f64,
) -> Option<(f64, f64)> {
    if neighbours.len() < 6 {
        return None;
    }

    let mut ata = [[0.0; 6]; 6];
    let mut atb = [0.0; 6];
    for p in neighbours {
        let d = (*p - origin) / scale;
        let (u, v, w) = (d.dot(plane.tangents[0]), d.dot(plane.tangents[1]), d.dot(plane.normal));
        let row = [u * u, u * v, v * v, u, v, 1.0];
        for i in 0..6 {
            for j in 0..6 {
                ata[i][j] += row[i] * row[j];
            }
            atb[i] += row[i] * w;
        }
    }

    let lhs = faer::Mat::<f64>::from_fn(6, 6, |i, j| ata[i][j]);
    let rhs = faer::Mat::<f64>::from_fn(6, 1, |i, _| atb[i]);
    let x = lhs.partial_piv_lu().solve(&rhs);
    let coef: [f64; 6] = std::array::from_fn(|k| x[(k, 0)]);
    if coef.iter().any(|c| !c.is_finite()) {
        return None;
    }

    let (fx, fy) = (coef[3], coef[4]);
    let (fxx, fxy, fyy) = (2.0 * coef[0] / scale, coef[1] / scale, 2.0 * coef[2] / scale);
    let g = 1.0 + fx * fx + fy * fy;
    let gaussian = (fxx * fyy - fxy * fxy) / (g * g);
    let mean = ((1.0 + fx * fx) * fyy - 2.0 * fx * fy * fxy + (1.0 + fy * fy) * fxx)
        / (2.0 * g.powf(1.5));
    Some((mean, gaussian))
}

// Everything computed from one neighbourhood.
#[derive(Debug, Clone, Copy)]
struct LocalMetrics {
    normal: DVec3,
    slope: f64,
    aspect: f64,
    roughness: f64,
    tri: f64,
    bpi: f64,
    mean_curvature: f64,
    gaussian_curvature: f64,
}

impl LocalMetrics {
    const NAN: Self = Self {
        normal: DVec3::NAN,
        slope: f64::NAN,
        aspect: f64::NAN,
        roughness: f64::NAN,
        tri: f64::NAN,
        bpi: f64::NAN,
        mean_curvature: f64::NAN,
        gaussian_curvature: f64::NAN,
    };
}

fn local_metrics(
    index: usize,
    neighbours: &[usize],
    points: &[DVec3],
    hint: DVec3,
    scale: f64,
    selection: &MetricSelection,
) -> LocalMetrics {
    let origin = points[index];
    let hood: Vec<DVec3> = neighbours.iter().map(|&j| points[j]).collect();
    let Some(plane) = fit_plane(&hood).map(|p| p.oriented(hint)) else {
        return LocalMetrics::NAN;
    };

    // dip and dip direction use the upward normal
    let up = if plane.normal.z < 0.0 {
        -plane.normal
    } else {
        plane.normal
    };
    let slope = up.z.clamp(-1.0, 1.0).acos().to_degrees();
    let aspect = up.x.atan2(up.y).to_degrees().rem_euclid(360.0);

    let roughness = if selection.roughness {
        let others: Vec<DVec3> = neighbours
            .iter()
            .filter(|&&j| j != index)
            .map(|&j| points[j])
            .collect();
        fit_plane(&others).map_or(f64::NAN, |p| p.signed_distance(origin).abs())
    } else {
        f64::NAN
    };

    let d_ref = plane.signed_distance(origin);
    let (tri, bpi) = {
        let n = hood.len() as f64;
        let tri = hood
            .iter()
            .map(|p| (plane.signed_distance(*p) - d_ref).abs())
            .sum::<f64>()
            / n;
        let mean = hood.iter().map(|p| plane.signed_distance(*p)).sum::<f64>() / n;
        (tri, d_ref - mean)
    };

    let (mean_curvature, gaussian_curvature) =
        if selection.mean_curvature || selection.gaussian_curvature {
            quadric_curvatures(origin, &hood, &plane, scale).unwrap_or((f64::NAN, f64::NAN))
        } else {
            (f64::NAN, f64::NAN)
        };

    LocalMetrics {
        normal: plane.normal,
        slope,
        aspect,
        roughness,
        tri,
        bpi,
        mean_curvature,
        gaussian_curvature,
    }
}

/// Compute terrain metrics over the spherical neighbourhood of every point of a cloud.
///
/// Each neighbourhood gets a least squares plane whose normal is oriented like the point
/// normal of the input, or upward when the input has none. Neighbourhoods with less than
/// three points, or collinear ones, give `NaN` metrics.
///
/// # Arguments
///
/// * `cloud` - The surface samples.
/// * `scale` - The neighbourhood radius.
/// * `selection` - The metrics to compute.
///
/// # Returns
///
/// A cloud with the same points, the fitted normals and one scalar field per metric named
/// after the scale, e.g. `TRI_0.5_m`.
pub fn compute_metrics(
    cloud: &PointCloud,
    scale: f64,
    selection: &MetricSelection,
) -> Result<PointCloud, GeomorphometryError> {
    if !(scale.is_finite() && scale > 0.0) {
        return Err(GeomorphometryError::InvalidScale(scale));
    }
    if cloud.is_empty() {
        return Ok(PointCloud::new(Vec::new(), None, Some(Vec::new())));
    }

    let now = std::time::Instant::now();
    let points: Vec<DVec3> = cloud.points().iter().map(|p| DVec3::from_array(*p)).collect();
    let hints: Vec<DVec3> = match cloud.normals() {
        Some(normals) => normals.iter().map(|n| DVec3::from_array(*n)).collect(),
        None => vec![DVec3::Z; points.len()],
    };

    let kdtree: ImmutableKdTree<f64, u32, 3, 32> = ImmutableKdTree::new_from_slice(cloud.points());
    let radius_sq = scale * scale;
    let neighbourhood = |p: &[f64; 3]| -> Vec<usize> {
        kdtree
            .within_unsorted::<kiddo::SquaredEuclidean>(p, radius_sq)
            .into_iter()
            .map(|nn| nn.item as usize)
            .collect()
    };

    let metrics: Vec<LocalMetrics> = cloud
        .points()
        .par_iter()
        .enumerate()
        .map(|(i, p)| local_metrics(i, &neighbourhood(p), &points, hints[i], scale, selection))
        .collect();

    // 1 - |sum of unit normals| / n over the neighbourhood
    let vrm: Vec<f64> = if selection.vrm {
        cloud
            .points()
            .par_iter()
            .map(|p| {
                let normals: Vec<DVec3> = neighbourhood(p)
                    .into_iter()
                    .map(|j| metrics[j].normal)
                    .filter(|n| n.is_finite())
                    .map(|n| if n.z < 0.0 { -n } else { n })
                    .collect();
                if normals.is_empty() {
                    return f64::NAN;
                }
                let sum = normals.iter().copied().sum::<DVec3>();
                1.0 - sum.length() / normals.len() as f64
            })
            .collect()
    } else {
        Vec::new()
    };

    let normals = metrics.iter().map(|m| m.normal.to_array()).collect();
    let mut out = PointCloud::new(cloud.points().to_vec(), cloud.colors().cloned(), Some(normals));
    let column = |f: fn(&LocalMetrics) -> f64| metrics.iter().map(f).collect::<Vec<f64>>();

    if selection.slope {
        out.add_field(&metric_field_name("slope_deg", scale), column(|m| m.slope))?;
    }
    if selection.aspect {
        out.add_field(&metric_field_name("aspect_deg", scale), column(|m| m.aspect))?;
        out.add_field(
            &metric_field_name("northness", scale),
            column(|m| m.aspect.to_radians().cos()),
        )?;
        out.add_field(
            &metric_field_name("eastness", scale),
            column(|m| m.aspect.to_radians().sin()),
        )?;
    }
    if selection.roughness {
        out.add_field(&metric_field_name("roughness", scale), column(|m| m.roughness))?;
    }
    if selection.gaussian_curvature {
        out.add_field(
            &metric_field_name("gaus_curv", scale),
            column(|m| m.gaussian_curvature),
        )?;
    }
    if selection.mean_curvature {
        out.add_field(&metric_field_name("mean_curv", scale), column(|m| m.mean_curvature))?;
    }
    if selection.tri {
        out.add_field(&metric_field_name("TRI", scale), column(|m| m.tri))?;
    }
    if selection.bpi {
        out.add_field(&metric_field_name("BPI", scale), column(|m| m.bpi))?;
    }
    if selection.vrm {
        out.add_field(&metric_field_name("VRM", scale), vrm)?;
    }

    log::debug!(
        "computed {} metric fields over {} points at scale {scale} in {:?}",
        out.fields().len(),
        out.len(),
        now.elapsed()
    );
    Ok(out)
}

/// Sample a mesh and compute its terrain metrics at one scale.
///
/// # Arguments
///
/// * `mesh` - The reconstructed surface.
/// * `scale` - The neighbourhood radius.
/// * `params` - The sampling and metric settings.
pub fn metric_cloud(
    mesh: &TriangleMesh,
    scale: f64,
    params: &GeomorphometryParams,
) -> Result<PointCloud, GeomorphometryError> {
    if !(scale.is_finite() && scale > 0.0) {
        return Err(GeomorphometryError::InvalidScale(scale));
    }
    let density = sampling_density(scale, params);
    log::info!("scale {scale}: sampling at {density:.1} points per square unit");
    let samples = sample_surface(mesh, density, params.seed)?;
    compute_metrics(&samples, scale, &params.metrics)
}
