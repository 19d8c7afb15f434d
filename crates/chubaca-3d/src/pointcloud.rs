use glam::DVec3;

/// Error types for the point cloud module.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PointCloudError {
    /// A scalar field does not have one value per point.
    #[error("Scalar field {0} has {1} values but the cloud has {2} points")]
    FieldLength(String, usize, usize),

    /// A scalar field with the same name already exists.
    #[error("Duplicated scalar field {0}")]
    DuplicatedField(String),
}

/// A named per-point scalar attribute, e.g. a roughness or curvature metric.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarField {
    name: String,
    values: Vec<f64>,
}

impl ScalarField {
    /// The field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The per-point values.
    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

/// A point cloud with points, colors, normals and named scalar fields.
#[derive(Debug, Clone, Default)]
pub struct PointCloud {
    // The points in the point cloud.
    points: Vec<[f64; 3]>,
    // The colors of the points.
    colors: Option<Vec<[u8; 3]>>,
    // The normals of the points.
    normals: Option<Vec<[f64; 3]>>,
    // The scalar fields, in file order.
    fields: Vec<ScalarField>,
}

impl PointCloud {
    /// Create a new point cloud from points, colors (optional), and normals (optional).
    pub fn new(
        points: Vec<[f64; 3]>,
        colors: Option<Vec<[u8; 3]>>,
        normals: Option<Vec<[f64; 3]>>,
    ) -> Self {
        Self {
            points,
            colors,
            normals,
            fields: Vec::new(),
        }
    }

    /// Attach a scalar field to the cloud.
    ///
    /// # Errors
    ///
    /// If the number of values differs from the number of points or the name is taken.
    pub fn add_field(&mut self, name: &str, values: Vec<f64>) -> Result<(), PointCloudError> {
        if values.len() != self.points.len() {
            return Err(PointCloudError::FieldLength(
                name.to_string(),
                values.len(),
                self.points.len(),
            ));
        }
        if self.field(name).is_some() {
            return Err(PointCloudError::DuplicatedField(name.to_string()));
        }
        self.fields.push(ScalarField {
            name: name.to_string(),
            values,
        });
        Ok(())
    }

    /// Get the number of points in the point cloud.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the point cloud is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Get as reference the points in the point cloud.
    pub fn points(&self) -> &[[f64; 3]] {
        &self.points
    }

    /// Get as reference the colors of the points in the point cloud.
    pub fn colors(&self) -> Option<&Vec<[u8; 3]>> {
        self.colors.as_ref()
    }

    /// Get as reference the normals of the points in the point cloud.
    pub fn normals(&self) -> Option<&Vec<[f64; 3]>> {
        self.normals.as_ref()
    }

    /// Get as reference the scalar fields of the point cloud.
    pub fn fields(&self) -> &[ScalarField] {
        &self.fields
    }

    /// Look up a scalar field by name.
    pub fn field(&self, name: &str) -> Option<&ScalarField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Extract the subset of the cloud at the given point indices, keeping every attribute.
    ///
    /// Indices out of range are ignored.
    pub fn select(&self, indices: &[usize]) -> PointCloud {
        let indices: Vec<usize> = indices
            .iter()
            .copied()
            .filter(|&i| i < self.points.len())
            .collect();
        let pick = |values: &[f64]| indices.iter().map(|&i| values[i]).collect::<Vec<_>>();

        PointCloud {
            points: indices.iter().map(|&i| self.points[i]).collect(),
            colors: self
                .colors
                .as_ref()
                .map(|c| indices.iter().map(|&i| c[i]).collect()),
            normals: self
                .normals
                .as_ref()
                .map(|n| indices.iter().map(|&i| n[i]).collect()),
            fields: self
                .fields
                .iter()
                .map(|f| ScalarField {
                    name: f.name.clone(),
                    values: pick(&f.values),
                })
                .collect(),
        }
    }

    /// Get the minimum bound of the point cloud.
    pub fn get_min_bound(&self) -> DVec3 {
        self.points
            .iter()
            .map(|p| DVec3::from_array(*p))
            .reduce(DVec3::min)
            .unwrap_or(DVec3::ZERO)
    }

    /// Get the maximum bound of the point cloud.
    pub fn get_max_bound(&self) -> DVec3 {
        self.points
            .iter()
            .map(|p| DVec3::from_array(*p))
            .reduce(DVec3::max)
            .unwrap_or(DVec3::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pointcloud() {
        let pointcloud = PointCloud::new(
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]],
            Some(vec![[255, 0, 0], [0, 255, 0]]),
            Some(vec![[0.0, 1.0, 0.0], [1.0, 0.0, 0.0]]),
        );

        assert_eq!(pointcloud.len(), 2);
        assert_eq!(pointcloud.points().len(), 2);
        assert_eq!(pointcloud.colors().map(|c| c.len()), Some(2));
        assert_eq!(pointcloud.normals().map(|n| n.len()), Some(2));
        assert_eq!(pointcloud.get_min_bound(), DVec3::ZERO);
        assert_eq!(pointcloud.get_max_bound(), DVec3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_scalar_fields() -> Result<(), PointCloudError> {
        let mut cloud = PointCloud::new(vec![[0.0; 3], [1.0; 3], [2.0; 3]], None, None);
        cloud.add_field("rugosity", vec![0.1, 0.2, 0.3])?;
        assert_eq!(
            cloud.add_field("slope", vec![1.0]),
            Err(PointCloudError::FieldLength("slope".to_string(), 1, 3))
        );
        assert_eq!(
            cloud.add_field("rugosity", vec![0.0; 3]),
            Err(PointCloudError::DuplicatedField("rugosity".to_string()))
        );

        let subset = cloud.select(&[2, 0, 7]);
        assert_eq!(subset.len(), 2);
        assert_eq!(subset.points(), &[[2.0; 3], [0.0; 3]]);
        assert_eq!(
            subset.field("rugosity").map(|f| f.values().to_vec()),
            Some(vec![0.3, 0.1])
        );
        Ok(())
    }
}
