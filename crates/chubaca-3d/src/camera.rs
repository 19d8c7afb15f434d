use std::path::PathBuf;

use glam::{DMat3, DVec3};

/// Error types for the camera module.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CameraError {
    /// The camera resolution has a zero dimension.
    #[error("Camera {0} has an invalid resolution {1}x{2}")]
    InvalidResolution(String, usize, usize),

    /// The focal length is not a positive finite number.
    #[error("Camera {0} has an invalid focal length {1}")]
    InvalidFocalLength(String, f64),

    /// The pose contains non-finite values.
    #[error("Camera {0} has a non-finite pose")]
    InvalidPose(String),
}

/// Radial distortion coefficients attached to a camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RadialDistortion {
    /// No distortion model.
    None,
    /// One coefficient radial model.
    K1(f64),
    /// Three coefficients radial model.
    K3([f64; 3]),
}

impl RadialDistortion {
    /// Whether any of the coefficients is non-zero.
    pub fn is_distorted(&self) -> bool {
        match self {
            RadialDistortion::None => false,
            RadialDistortion::K1(k1) => *k1 != 0.0,
            RadialDistortion::K3(k) => k.iter().any(|v| *v != 0.0),
        }
    }
}

/// The intrinsic parameters of a pinhole camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraIntrinsics {
    /// The focal length in pixels.
    pub focal_length: f64,
    /// The principal point in pixels (cx, cy).
    pub principal_point: [f64; 2],
}

impl CameraIntrinsics {
    /// Returns the camera matrix as a 3x3 matrix.
    pub fn camera_matrix(&self) -> DMat3 {
        DMat3::from_cols(
            DVec3::new(self.focal_length, 0.0, 0.0),
            DVec3::new(0.0, self.focal_length, 0.0),
            DVec3::new(self.principal_point[0], self.principal_point[1], 1.0),
        )
    }
}

/// A calibrated and registered camera of the reconstruction.
///
/// The rotation maps world coordinates into the camera frame, where the camera looks along +Z
/// with +Y pointing down the image.
#[derive(Debug, Clone)]
pub struct Camera {
    /// The image file name, e.g. `20210521T101512.250Z.jpg`.
    pub image_name: String,
    /// The image path relative to the reconstruction root.
    pub relative_path: PathBuf,
    /// The absolute image path.
    pub absolute_path: PathBuf,
    /// The image width in pixels.
    pub width: usize,
    /// The image height in pixels.
    pub height: usize,
    /// The pinhole intrinsics.
    pub intrinsics: CameraIntrinsics,
    /// The distortion model. Rays are cast with the undistorted model.
    pub distortion: RadialDistortion,
    /// The world to camera rotation.
    pub rotation: DMat3,
    /// The camera center in world coordinates.
    pub center: DVec3,
    /// The view index in the reconstruction.
    pub view_index: u32,
    /// Whether the camera is an equirectangular panorama.
    pub panoramic: bool,
}

impl Camera {
    /// Check that the camera can be used to cast rays.
    pub fn validate(&self) -> Result<(), CameraError> {
        if self.width == 0 || self.height == 0 {
            return Err(CameraError::InvalidResolution(
                self.image_name.clone(),
                self.width,
                self.height,
            ));
        }

        let f = self.intrinsics.focal_length;
        if !self.panoramic && !(f.is_finite() && f > 0.0) {
            return Err(CameraError::InvalidFocalLength(self.image_name.clone(), f));
        }

        if !self.rotation.is_finite() || !self.center.is_finite() {
            return Err(CameraError::InvalidPose(self.image_name.clone()));
        }

        Ok(())
    }

    /// The image file name without its extension.
    pub fn image_stem(&self) -> &str {
        match self.image_name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => &self.image_name,
        }
    }

    /// The horizontal and vertical field of view in radians.
    pub fn field_of_view(&self) -> (f64, f64) {
        let f = self.intrinsics.focal_length;
        (
            2.0 * (self.width as f64 / (2.0 * f)).atan(),
            2.0 * (self.height as f64 / (2.0 * f)).atan(),
        )
    }

    /// The world direction of the ray through a sensor pixel.
    ///
    /// # Arguments
    ///
    /// * `x` - The pixel column.
    /// * `y` - The pixel row counted from the bottom of the image.
    ///
    /// # Returns
    ///
    /// A unit direction in world coordinates.
    pub fn pixel_direction(&self, x: usize, y: usize) -> DVec3 {
        let camera_dir = if self.panoramic {
            self.equirectangular_direction(x, y)
        } else {
            self.pinhole_direction(x, y)
        };
        (self.rotation.transpose() * camera_dir).normalize()
    }

    // The rays span the field of view shrunk by half a pixel on each side, which puts them
    // through the pixel centres of a sensor whose optical axis crosses the image centre.
    fn pinhole_direction(&self, x: usize, y: usize) -> DVec3 {
        let (fov_x, fov_y) = self.field_of_view();
        let half_x = (fov_x / 2.0).tan() * (1.0 - 1.0 / self.width as f64);
        let half_y = (fov_y / 2.0).tan() * (1.0 - 1.0 / self.height as f64);

        let lerp = |half: f64, i: usize, n: usize| {
            if n < 2 {
                0.0
            } else {
                -half + 2.0 * half * i as f64 / (n - 1) as f64
            }
        };
        let up = lerp(half_y, y, self.height);
        let right = lerp(half_x, x, self.width);

        DVec3::new(right, -up, 1.0)
    }

    fn equirectangular_direction(&self, x: usize, y: usize) -> DVec3 {
        let lon = ((x as f64 + 0.5) / self.width as f64 - 0.5) * std::f64::consts::TAU;
        let lat = ((y as f64 + 0.5) / self.height as f64 - 0.5) * std::f64::consts::PI;
        DVec3::new(lat.cos() * lon.sin(), -lat.sin(), lat.cos() * lon.cos())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn nadir_camera(width: usize, height: usize, focal_length: f64) -> Camera {
        // camera at z = 10 looking down the world -Z axis, image up is world +Y
        let rotation = DMat3::from_cols(
            DVec3::new(1.0, 0.0, 0.0),
            DVec3::new(0.0, -1.0, 0.0),
            DVec3::new(0.0, 0.0, -1.0),
        );
        Camera {
            image_name: "20210521T101512.250Z.jpg".to_string(),
            relative_path: PathBuf::from("20210521T101512.250Z.jpg"),
            absolute_path: PathBuf::from("/data/20210521T101512.250Z.jpg"),
            width,
            height,
            intrinsics: CameraIntrinsics {
                focal_length,
                principal_point: [width as f64 / 2.0, height as f64 / 2.0],
            },
            distortion: RadialDistortion::None,
            rotation,
            center: DVec3::new(0.0, 0.0, 10.0),
            view_index: 0,
            panoramic: false,
        }
    }

    #[test]
    fn test_validate() {
        let camera = nadir_camera(4, 3, 2.0);
        assert!(camera.validate().is_ok());

        let mut camera = nadir_camera(0, 3, 2.0);
        assert!(matches!(
            camera.validate(),
            Err(CameraError::InvalidResolution(_, 0, 3))
        ));

        camera.width = 4;
        camera.intrinsics.focal_length = 0.0;
        assert!(matches!(
            camera.validate(),
            Err(CameraError::InvalidFocalLength(_, _))
        ));
    }

    #[test]
    fn test_image_stem() {
        let camera = nadir_camera(4, 3, 2.0);
        assert_eq!(camera.image_stem(), "20210521T101512.250Z");
    }

    #[test]
    fn test_center_ray_points_down() {
        let camera = nadir_camera(3, 3, 2.0);
        let dir = camera.pixel_direction(1, 1);
        assert_relative_eq!(dir.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(dir.y, 0.0, epsilon = 1e-12);
        assert_relative_eq!(dir.z, -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_pixel_centres() {
        // tan(fov/2) * (1 - 1/W) == (W - 1) / (2 f), the outermost pixel centre
        let camera = nadir_camera(4, 2, 2.0);
        let dir = camera.pixel_direction(3, 1);
        let expected = DVec3::new(0.75, 0.25, -1.0).normalize();
        assert_relative_eq!(dir.x, expected.x, epsilon = 1e-12);
        assert_relative_eq!(dir.y, expected.y, epsilon = 1e-12);
        assert_relative_eq!(dir.z, expected.z, epsilon = 1e-12);

        // bottom-left sensor pixel maps to world -x, -y
        let dir = camera.pixel_direction(0, 0);
        assert!(dir.x < 0.0 && dir.y < 0.0);
    }

    #[test]
    fn test_camera_matrix() {
        let intrinsics = CameraIntrinsics {
            focal_length: 100.0,
            principal_point: [50.0, 40.0],
        };
        let k = intrinsics.camera_matrix();
        assert_eq!(k.x_axis, DVec3::new(100.0, 0.0, 0.0));
        assert_eq!(k.z_axis, DVec3::new(50.0, 40.0, 1.0));
    }

    #[test]
    fn test_distortion_flag() {
        assert!(!RadialDistortion::None.is_distorted());
        assert!(!RadialDistortion::K3([0.0; 3]).is_distorted());
        assert!(RadialDistortion::K1(0.1).is_distorted());
    }
}
