use glam::DVec3;

/// Error types for the mesh module.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum MeshError {
    /// A face references a vertex that does not exist.
    #[error("Face {0} references vertex {1} but the mesh has {2} vertices")]
    FaceIndexOutOfBounds(usize, usize, usize),
}

/// An indexed triangle mesh.
#[derive(Debug, Clone, Default)]
pub struct TriangleMesh {
    vertices: Vec<[f64; 3]>,
    faces: Vec<[usize; 3]>,
}

impl TriangleMesh {
    /// Create a new mesh from vertices and triangle faces.
    ///
    /// # Errors
    ///
    /// If a face references a vertex out of range.
    pub fn new(vertices: Vec<[f64; 3]>, faces: Vec<[usize; 3]>) -> Result<Self, MeshError> {
        for (i, face) in faces.iter().enumerate() {
            if let Some(&idx) = face.iter().find(|&&idx| idx >= vertices.len()) {
                return Err(MeshError::FaceIndexOutOfBounds(i, idx, vertices.len()));
            }
        }
        Ok(Self { vertices, faces })
    }

    /// Get as reference the vertices of the mesh.
    pub fn vertices(&self) -> &[[f64; 3]] {
        &self.vertices
    }

    /// Get as reference the faces of the mesh.
    pub fn faces(&self) -> &[[usize; 3]] {
        &self.faces
    }

    /// Number of triangles.
    #[inline]
    pub fn num_faces(&self) -> usize {
        self.faces.len()
    }

    /// Check if the mesh has no triangles.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    /// The three corners of a triangle.
    pub fn triangle(&self, face: usize) -> [DVec3; 3] {
        let [a, b, c] = self.faces[face];
        [
            DVec3::from_array(self.vertices[a]),
            DVec3::from_array(self.vertices[b]),
            DVec3::from_array(self.vertices[c]),
        ]
    }

    /// Per-vertex unit normals, averaged from the adjacent faces weighted by their area.
    ///
    /// Vertices without a non-degenerate adjacent face get a zero normal.
    pub fn vertex_normals(&self) -> Vec<DVec3> {
        let mut normals = vec![DVec3::ZERO; self.vertices.len()];
        for (i, face) in self.faces.iter().enumerate() {
            let [a, b, c] = self.triangle(i);
            // the cross product length is twice the area
            let n = (b - a).cross(c - a);
            for &idx in face {
                normals[idx] += n;
            }
        }
        normals
            .into_iter()
            .map(|n| n.try_normalize().unwrap_or(DVec3::ZERO))
            .collect()
    }

    /// The axis aligned bounds of the vertices, or `None` for an empty mesh.
    pub fn bounds(&self) -> Option<(DVec3, DVec3)> {
        let first = DVec3::from_array(*self.vertices.first()?);
        Some(self.vertices.iter().fold((first, first), |(lo, hi), v| {
            let v = DVec3::from_array(*v);
            (lo.min(v), hi.max(v))
        }))
    }
}
