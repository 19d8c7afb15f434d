use std::io::BufRead;
use std::path::Path;

use crate::mesh::{MeshError, TriangleMesh};

/// Error types for the OBJ module.
#[derive(Debug, thiserror::Error)]
pub enum ObjError {
    /// Failed to read the OBJ file
    #[error("Failed to read OBJ file")]
    Io(#[from] std::io::Error),

    /// A line could not be parsed.
    #[error("Malformed OBJ line {0}: {1}")]
    MalformedLine(usize, String),

    /// The file contains no faces.
    #[error("The OBJ file contains no faces")]
    NoFaces,

    /// A face references a missing vertex.
    #[error(transparent)]
    Mesh(#[from] MeshError),
}

/// Read a triangle mesh from a Wavefront OBJ file.
///
/// Only vertex positions and faces are used; polygons are fan triangulated.
///
/// # Arguments
///
/// * `path` - Path to a `.obj` file.
pub fn read_obj_mesh(path: impl AsRef<Path>) -> Result<TriangleMesh, ObjError> {
    let file = std::fs::File::open(path)?;
    parse_obj(std::io::BufReader::new(file))
}

/// Parse an OBJ stream into a triangle mesh.
pub fn parse_obj<R: BufRead>(reader: R) -> Result<TriangleMesh, ObjError> {
    let mut vertices: Vec<[f64; 3]> = Vec::new();
    let mut faces: Vec<[usize; 3]> = Vec::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = line_no + 1;
        let mut tokens = line.split_whitespace();

        match tokens.next() {
            Some("v") => {
                let coords = tokens
                    .take(3)
                    .map(|t| t.parse::<f64>())
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| ObjError::MalformedLine(line_no, e.to_string()))?;
                let [x, y, z] = coords.as_slice() else {
                    return Err(ObjError::MalformedLine(
                        line_no,
                        "vertex needs 3 coordinates".to_string(),
                    ));
                };
                vertices.push([*x, *y, *z]);
            }
            Some("f") => {
                let polygon = tokens
                    .map(|t| resolve_index(t, vertices.len()))
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| {
                        ObjError::MalformedLine(line_no, "invalid face index".to_string())
                    })?;
                if polygon.len() < 3 {
                    return Err(ObjError::MalformedLine(
                        line_no,
                        "face needs at least 3 vertices".to_string(),
                    ));
                }
                for k in 1..polygon.len() - 1 {
                    faces.push([polygon[0], polygon[k], polygon[k + 1]]);
                }
            }
            _ => {}
        }
    }

    if faces.is_empty() {
        return Err(ObjError::NoFaces);
    }

    log::debug!(
        "parsed obj mesh with {} vertices and {} triangles",
        vertices.len(),
        faces.len()
    );

    Ok(TriangleMesh::new(vertices, faces)?)
}

// `v`, `v/vt`, `v//vn` or `v/vt/vn`; negative indices count back from the last vertex
fn resolve_index(token: &str, num_vertices: usize) -> Option<usize> {
    let index: i64 = token.split('/').next()?.parse().ok()?;
    match index {
        i if i > 0 => Some(i as usize - 1),
        i if i < 0 => num_vertices.checked_sub(i.unsigned_abs() as usize),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parses_quads_and_slashes() -> Result<(), ObjError> {
        let data = b"# plane
o plane
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
vn 0 0 1
f 1//1 2//1 3//1 4//1
";
        let mesh = parse_obj(Cursor::new(&data[..]))?;
        assert_eq!(mesh.vertices().len(), 4);
        assert_eq!(mesh.faces(), &[[0, 1, 2], [0, 2, 3]]);
        Ok(())
    }

    #[test]
    fn parses_negative_indices() -> Result<(), ObjError> {
        let data = b"v 0 0 0\nv 1 0 0\nv 0 1 0\nf -3/1 -2/2 -1/3\n";
        let mesh = parse_obj(Cursor::new(&data[..]))?;
        assert_eq!(mesh.faces(), &[[0, 1, 2]]);
        Ok(())
    }

    #[test]
    fn rejects_bad_input() {
        let no_faces = b"v 0 0 0\n";
        assert!(matches!(
            parse_obj(Cursor::new(&no_faces[..])),
            Err(ObjError::NoFaces)
        ));

        let bad_vertex = b"v 0 zero 0\n";
        assert!(matches!(
            parse_obj(Cursor::new(&bad_vertex[..])),
            Err(ObjError::MalformedLine(1, _))
        ));

        let bad_face = b"v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 9\n";
        assert!(matches!(
            parse_obj(Cursor::new(&bad_face[..])),
            Err(ObjError::Mesh(MeshError::FaceIndexOutOfBounds(0, 8, 3)))
        ));
    }
}
