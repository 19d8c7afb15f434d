use std::collections::HashMap;

use glam::DVec3;
use rayon::prelude::*;

use crate::delaunay::{triangulate, DelaunayError};
use crate::mesh::{MeshError, TriangleMesh};
use crate::pointcloud::PointCloud;
use crate::raycast::{Bvh, Ray};

/// Error types for the volume module.
#[derive(Debug, thiserror::Error)]
pub enum VolumeError {
    /// The footprint cannot be triangulated.
    #[error("Degenerate footprint: {0}")]
    DegenerateFootprint(#[from] DelaunayError),

    /// The surface normals cancel out.
    #[error("The footprint surface has no dominant normal")]
    NoDominantNormal,

    /// The extruded mesh is invalid.
    #[error("Failed to build the extruded mesh")]
    Mesh(#[from] MeshError),
}

/// How far the footprint surface is pushed along its mean normal.
#[derive(Debug, Clone, Copy, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct ExtrusionParams {
    /// The surface is first translated by `-offset_scale * n`.
    pub offset_scale: f64,
    /// The translated surface is then swept by `extrusion_scale * n`.
    pub extrusion_scale: f64,
}

impl Default for ExtrusionParams {
    fn default() -> Self {
        Self {
            offset_scale: 1.0,
            extrusion_scale: 4.0,
        }
    }
}

// Oblique directions for the parity test, chosen away from the axes and from each other.
const RAY_DIRECTIONS: [[f64; 3]; 3] = [
    [0.5773, 0.5774, 0.5772],
    [-0.6123, 0.3536, 0.7071],
    [0.2673, -0.8018, -0.5345],
];

/// A closed prism swept from a triangulated footprint.
#[derive(Debug, Clone)]
pub struct Volume {
    mesh: TriangleMesh,
    bvh: Bvh,
    min: DVec3,
    max: DVec3,
}

impl Volume {
    /// Build the volume enclosing the space around a 3D polygon footprint.
    ///
    /// The footprint is triangulated in the xy plane, the mean of its vertex normals `n` gives
    /// the sweep direction, and the surface is moved to `-offset_scale * n` and swept by
    /// `extrusion_scale * n` with both ends capped.
    ///
    /// # Arguments
    ///
    /// * `footprint` - The 3D polygon vertices.
    /// * `params` - The extrusion parameters.
    pub fn from_footprint(
        footprint: &[[f64; 3]],
        params: &ExtrusionParams,
    ) -> Result<Self, VolumeError> {
        let planar: Vec<[f64; 2]> = footprint.iter().map(|p| [p[0], p[1]]).collect();
        let triangles = triangulate(&planar)?;

        // compact the vertex set to the triangulated points
        let mut remap = HashMap::new();
        let mut vertices = Vec::new();
        let faces: Vec<[usize; 3]> = triangles
            .iter()
            .map(|t| {
                t.map(|i| {
                    *remap.entry(i).or_insert_with(|| {
                        vertices.push(footprint[i]);
                        vertices.len() - 1
                    })
                })
            })
            .collect();

        let surface = TriangleMesh::new(vertices, faces)?;
        let normals = surface.vertex_normals();
        let mean_normal = normals.iter().copied().sum::<DVec3>() / normals.len() as f64;
        if mean_normal.length() < 1e-12 {
            return Err(VolumeError::NoDominantNormal);
        }

        let offset = -mean_normal * params.offset_scale;
        let sweep = mean_normal * params.extrusion_scale;
        let mesh = extrude(&surface, offset, sweep)?;
        Ok(Self::from_mesh(mesh))
    }

    /// Wrap an already closed mesh.
    pub fn from_mesh(mesh: TriangleMesh) -> Self {
        let bvh = Bvh::new(&mesh);
        let (min, max) = mesh.bounds().unwrap_or((DVec3::ZERO, DVec3::ZERO));
        Self {
            mesh,
            bvh,
            min,
            max,
        }
    }

    /// Get as reference the closed mesh.
    pub fn mesh(&self) -> &TriangleMesh {
        &self.mesh
    }

    /// The axis aligned bounds of the volume.
    pub fn bounds(&self) -> (DVec3, DVec3) {
        (self.min, self.max)
    }

    /// Test whether a point is enclosed by the volume.
    ///
    /// Points outside the bounding box are rejected directly; the rest cast three oblique
    /// rays and a point is inside when at least two of them cross the surface an odd number
    /// of times.
    pub fn contains(&self, point: &[f64; 3]) -> bool {
        let p = DVec3::from_array(*point);
        if self.mesh.is_empty() || p.cmplt(self.min).any() || p.cmpgt(self.max).any() {
            return false;
        }
        let votes = RAY_DIRECTIONS
            .iter()
            .filter(|d| {
                let ray = Ray::new(p, DVec3::from_array(**d));
                self.bvh.count_crossings(&ray) % 2 == 1
            })
            .count();
        votes >= 2
    }

    /// The indices of the cloud points enclosed by the volume, in ascending order.
    pub fn select_enclosed(&self, cloud: &PointCloud) -> Vec<usize> {
        cloud
            .points()
            .par_iter()
            .enumerate()
            .filter(|(_, p)| self.contains(p))
            .map(|(i, _)| i)
            .collect()
    }
}

// Sweep an open surface into a closed prism: the bottom at `surface + offset`, the top at
// `surface + offset + sweep` and one wall quad per boundary edge.
fn extrude(
    surface: &TriangleMesh,
    offset: DVec3,
    sweep: DVec3,
) -> Result<TriangleMesh, MeshError> {
    let n = surface.vertices().len();
    let bottom = surface
        .vertices()
        .iter()
        .map(|v| (DVec3::from_array(*v) + offset).to_array());
    let top = surface
        .vertices()
        .iter()
        .map(|v| (DVec3::from_array(*v) + offset + sweep).to_array());
    let vertices: Vec<[f64; 3]> = bottom.chain(top).collect();

    let mut faces = Vec::with_capacity(surface.num_faces() * 2);
    let mut edge_count: HashMap<(usize, usize), usize> = HashMap::new();
    for &[a, b, c] in surface.faces() {
        faces.push([a, c, b]);
        faces.push([a + n, b + n, c + n]);
        for (u, v) in [(a, b), (b, c), (c, a)] {
            *edge_count.entry((u.min(v), u.max(v))).or_default() += 1;
        }
    }

    for &[a, b, c] in surface.faces() {
        for (u, v) in [(a, b), (b, c), (c, a)] {
            if edge_count.get(&(u.min(v), u.max(v))) == Some(&1) {
                faces.push([u, v, v + n]);
                faces.push([u, v + n, u + n]);
            }
        }
    }

    TriangleMesh::new(vertices, faces)
}
