use std::collections::HashMap;

use spade::{DelaunayTriangulation, HasPosition, Point2, Triangulation};

/// Error types for the triangulation.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum DelaunayError {
    /// Less than three distinct points.
    #[error("Need at least 3 distinct points, got {0}")]
    NotEnoughPoints(usize),

    /// All the points lie on a line.
    #[error("The points are collinear")]
    Collinear,

    /// A coordinate is NaN or infinite.
    #[error("Point {0} has a non-finite coordinate")]
    NonFinite(usize),

    /// A coordinate is outside the range the exact predicates accept.
    #[error("Point {0} cannot be inserted: {1}")]
    InvalidCoordinate(usize, String),
}

/// Triangulate a set of planar points.
///
/// Duplicated points are merged into their first occurrence. Triangles are oriented
/// counterclockwise and index into the input slice.
///
/// # Arguments
///
/// * `points` - The planar points.
///
/// # Returns
///
/// The triangles covering the convex hull of the points.
pub fn triangulate(points: &[[f64; 2]]) -> Result<Vec<[usize; 3]>, DelaunayError> {
    if let Some(i) = points.iter().position(|p| !p[0].is_finite() || !p[1].is_finite()) {
        return Err(DelaunayError::NonFinite(i));
    }

    // keep the first index of every distinct location
    let mut seen = HashMap::new();
    let unique: Vec<usize> = (0..points.len())
        .filter(|&i| {
            let key = (points[i][0].to_bits(), points[i][1].to_bits());
            seen.insert(key, i).is_none()
        })
        .collect();
    if unique.len() < 3 {
        return Err(DelaunayError::NotEnoughPoints(unique.len()));
    }

    let mut triangulation: DelaunayTriangulation<IndexedVertex> = DelaunayTriangulation::new();
    for &index in &unique {
        let [x, y] = points[index];
        triangulation
            .insert(IndexedVertex {
                position: Point2::new(x, y),
                index,
            })
            .map_err(|e| DelaunayError::InvalidCoordinate(index, format!("{e:?}")))?;
    }

    if triangulation.num_inner_faces() == 0 {
        return Err(DelaunayError::Collinear);
    }

    Ok(triangulation
        .inner_faces()
        .map(|face| face.vertices().map(|v| v.data().index))
        .collect())
}

// a vertex remembering its position in the input slice
struct IndexedVertex {
    position: Point2<f64>,
    index: usize,
}

impl HasPosition for IndexedVertex {
    type Scalar = f64;

    fn position(&self) -> Point2<f64> {
        self.position
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn total_area(points: &[[f64; 2]], tris: &[[usize; 3]]) -> f64 {
        tris.iter()
            .map(|t| {
                let [a, b, c] = t.map(|i| points[i]);
                ((b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0])) / 2.0
            })
            .sum()
    }

    #[test]
    fn test_square() -> Result<(), DelaunayError> {
        let points = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];
        let tris = triangulate(&points)?;
        assert_eq!(tris.len(), 2);
        assert!((total_area(&points, &tris) - 1.0).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn test_duplicates_are_merged() -> Result<(), DelaunayError> {
        let points = [
            [0.0, 0.0],
            [2.0, 0.0],
            [1.0, 2.0],
            [0.0, 0.0],
            [1.0, 0.5],
        ];
        let tris = triangulate(&points)?;
        assert_eq!(tris.len(), 3);
        assert!(tris.iter().all(|t| !t.contains(&3)));
        assert!((total_area(&points, &tris) - 2.0).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn test_convex_hull_is_covered() -> Result<(), DelaunayError> {
        // points on a circle plus the centre
        let mut points: Vec<[f64; 2]> = (0..32)
            .map(|i| {
                let a = i as f64 / 32.0 * std::f64::consts::TAU;
                [100.0 + 5.0 * a.cos(), -40.0 + 5.0 * a.sin()]
            })
            .collect();
        points.push([100.0, -40.0]);
        let tris = triangulate(&points)?;
        let polygon_area = 0.5 * 32.0 * 25.0 * (std::f64::consts::TAU / 32.0).sin();
        assert!((total_area(&points, &tris) - polygon_area).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_dense_jittered_ring() -> Result<(), DelaunayError> {
        // nearly cocircular points far from the origin
        let n = 200;
        let points: Vec<[f64; 2]> = (0..n)
            .map(|i| {
                let a = i as f64 / n as f64 * std::f64::consts::TAU;
                let r = 1.0 + 0.02 * (5.0 * a).sin();
                [350_000.0 + r * a.cos(), 6_200_000.0 + r * a.sin()]
            })
            .collect();
        let tris = triangulate(&points)?;
        assert_eq!(tris.len(), n - 2);

        let local: Vec<[f64; 2]> = points
            .iter()
            .map(|p| [p[0] - 350_000.0, p[1] - 6_200_000.0])
            .collect();
        let ring_area: f64 = (0..n)
            .map(|i| {
                let (a, b) = (local[i], local[(i + 1) % n]);
                (a[0] * b[1] - b[0] * a[1]) / 2.0
            })
            .sum();
        assert!((total_area(&local, &tris) - ring_area).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_degenerate_inputs() {
        assert_eq!(
            triangulate(&[[0.0, 0.0], [1.0, 1.0], [0.0, 0.0]]),
            Err(DelaunayError::NotEnoughPoints(2))
        );
        assert_eq!(
            triangulate(&[[0.0, 0.0], [1.0, 1.0], [2.0, 2.0], [3.0, 3.0]]),
            Err(DelaunayError::Collinear)
        );
        assert_eq!(
            triangulate(&[[0.0, f64::NAN], [1.0, 1.0], [2.0, 0.0]]),
            Err(DelaunayError::NonFinite(0))
        );
    }
}
