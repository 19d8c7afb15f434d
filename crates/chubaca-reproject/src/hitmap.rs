use std::path::{Path, PathBuf};

use chubaca_3d::camera::{Camera, CameraError};
use chubaca_3d::mesh::TriangleMesh;
use chubaca_3d::raycast::{Bvh, Ray};
use chubaca_image::{Image, ImageError, ImageSize};
use rayon::prelude::*;

use crate::config::HitMapConfig;
use crate::progress::RunControl;

/// The file extension of persisted hit maps.
pub const HIT_MAP_EXTENSION: &str = "hitmap";

/// Error types for the hit map module.
#[derive(Debug, thiserror::Error)]
pub enum HitMapError {
    /// Failed to read or write a hit map file
    #[error("Failed to access hit map file")]
    Io(#[from] std::io::Error),

    /// Failed to encode a hit map.
    #[error("Failed to encode hit map")]
    Encode(#[from] bincode::error::EncodeError),

    /// Failed to decode a hit map.
    #[error("Failed to decode hit map")]
    Decode(#[from] bincode::error::DecodeError),

    /// The raster length does not match the resolution.
    #[error("Hit map data has {0} entries but the resolution needs {1}")]
    InvalidLength(usize, usize),

    /// The camera cannot cast rays.
    #[error(transparent)]
    Camera(#[from] CameraError),

    /// The worker pool could not be created.
    #[error("Failed to build the worker pool")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// A per pixel raster of the first surface point seen by a camera.
///
/// Entries are addressed in sensor order: `x` is the column and `y` counts rows from the
/// bottom of the image. `[0, 0, 0]` marks a pixel whose ray missed the mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct HitMap {
    width: usize,
    height: usize,
    data: Vec<[f32; 3]>,
}

impl HitMap {
    /// Create a hit map from sensor ordered entries.
    ///
    /// # Arguments
    ///
    /// * `width` - The camera width in pixels.
    /// * `height` - The camera height in pixels.
    /// * `data` - `width * height` entries, row `y` starting at `y * width`.
    pub fn new(width: usize, height: usize, data: Vec<[f32; 3]>) -> Result<Self, HitMapError> {
        if data.len() != width * height {
            return Err(HitMapError::InvalidLength(data.len(), width * height));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Create a hit map where every ray missed.
    pub fn empty(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![[0.0; 3]; width * height],
        }
    }

    /// The width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// The height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// The raw entries in sensor order.
    pub fn as_slice(&self) -> &[[f32; 3]] {
        &self.data
    }

    /// The entry at a sensor pixel, `None` outside of the raster.
    pub fn get(&self, x: usize, y: usize) -> Option<[f32; 3]> {
        (x < self.width && y < self.height).then(|| self.data[y * self.width + x])
    }

    /// Overwrite the entry at a sensor pixel, ignoring pixels outside of the raster.
    pub fn set(&mut self, x: usize, y: usize, value: [f32; 3]) {
        if x < self.width && y < self.height {
            self.data[y * self.width + x] = value;
        }
    }

    /// Whether the ray of a sensor pixel hit the mesh.
    pub fn is_hit(&self, x: usize, y: usize) -> bool {
        self.get(x, y).is_some_and(is_hit_value)
    }

    /// The number of pixels that hit the mesh.
    pub fn num_hits(&self) -> usize {
        self.data.iter().filter(|v| is_hit_value(**v)).count()
    }

    /// Convert to an image with the top scanline first.
    pub fn to_image(&self) -> Result<Image<f32, 3>, ImageError> {
        let data = self
            .data
            .chunks_exact(self.width.max(1))
            .rev()
            .flat_map(|row| row.iter().flatten().copied())
            .collect();
        Image::new(
            ImageSize {
                width: self.width,
                height: self.height,
            },
            data,
        )
    }

    /// Write the hit map to a file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), HitMapError> {
        let file = std::fs::File::create(path)?;
        let mut writer = std::io::BufWriter::new(file);
        bincode::encode_into_std_write(self, &mut writer, bincode::config::standard())?;
        Ok(())
    }

    /// Read a hit map written by [`HitMap::save`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, HitMapError> {
        let file = std::fs::File::open(path)?;
        let mut reader = std::io::BufReader::new(file);
        Ok(bincode::decode_from_std_read(
            &mut reader,
            bincode::config::standard(),
        )?)
    }
}

fn is_hit_value(value: [f32; 3]) -> bool {
    value != [0.0; 3]
}

impl bincode::enc::Encode for HitMap {
    fn encode<E: bincode::enc::Encoder>(
        &self,
        encoder: &mut E,
    ) -> Result<(), bincode::error::EncodeError> {
        bincode::Encode::encode(&self.width, encoder)?;
        bincode::Encode::encode(&self.height, encoder)?;
        bincode::Encode::encode(&self.data, encoder)?;
        Ok(())
    }
}

impl<C> bincode::de::Decode<C> for HitMap {
    fn decode<D: bincode::de::Decoder<Context = C>>(
        decoder: &mut D,
    ) -> Result<Self, bincode::error::DecodeError> {
        let width = bincode::Decode::decode(decoder)?;
        let height = bincode::Decode::decode(decoder)?;
        let data = bincode::Decode::decode(decoder)?;
        HitMap::new(width, height, data)
            .map_err(|e| bincode::error::DecodeError::OtherString(e.to_string()))
    }
}

/// The path of the hit map of an image inside `dir`.
pub fn hit_map_path(dir: impl AsRef<Path>, image_name: &str) -> PathBuf {
    dir.as_ref()
        .join(format!("{image_name}.{HIT_MAP_EXTENSION}"))
}

/// Cast one ray per pixel of a camera and keep the nearest surface point.
///
/// # Arguments
///
/// * `bvh` - The bounding volume hierarchy of the mesh.
/// * `camera` - The camera to render.
///
/// # Returns
///
/// The hit map with the camera resolution.
pub fn render_hit_map(bvh: &Bvh, camera: &Camera) -> Result<HitMap, HitMapError> {
    camera.validate()?;
    let width = camera.width;
    let mut data = vec![[0.0f32; 3]; width * camera.height];

    data.par_chunks_exact_mut(width)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, entry) in row.iter_mut().enumerate() {
                let ray = Ray::new(camera.center, camera.pixel_direction(x, y));
                if let Some(hit) = bvh.intersect(&ray) {
                    *entry = hit.point.as_vec3().to_array();
                }
            }
        });

    HitMap::new(width, camera.height, data)
}

/// The outcome of a hit-map batch.
#[derive(Debug, Default)]
pub struct HitMapBatch {
    /// The written hit maps, in camera order.
    pub written: Vec<PathBuf>,
    /// The cameras that failed with their error.
    pub failed: Vec<(String, HitMapError)>,
    /// Whether the batch stopped early on request.
    pub aborted: bool,
}

enum CameraOutcome {
    Written(PathBuf),
    Failed(String, HitMapError),
    Skipped,
}

/// Render and persist the hit map of every camera.
///
/// Cameras run concurrently; a failing camera is logged and reported without stopping the
/// others. The abort flag is checked before each camera and the progress callback receives
/// the share of finished cameras.
///
/// # Arguments
///
/// * `mesh` - The reconstructed surface.
/// * `cameras` - The registered cameras.
/// * `output_dir` - The directory receiving one `<image name>.hitmap` per camera.
/// * `config` - The generator settings.
/// * `control` - The abort flag and progress callback.
pub fn generate_hit_maps(
    mesh: &TriangleMesh,
    cameras: &[Camera],
    output_dir: impl AsRef<Path>,
    config: &HitMapConfig,
    control: &RunControl,
) -> Result<HitMapBatch, HitMapError> {
    let output_dir = output_dir.as_ref();
    std::fs::create_dir_all(output_dir)?;

    let now = std::time::Instant::now();
    let bvh = Bvh::new(mesh);
    log::debug!(
        "built bvh over {} triangles in {:?}",
        bvh.num_triangles(),
        now.elapsed()
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.num_threads)
        .build()?;
    let tracker = control.tracker(cameras.len());

    let outcomes: Vec<CameraOutcome> = pool.install(|| {
        cameras
            .par_iter()
            .map(|camera| {
                if control.is_aborted() {
                    return CameraOutcome::Skipped;
                }
                let now = std::time::Instant::now();
                let path = hit_map_path(output_dir, &camera.image_name);
                let outcome = match render_hit_map(&bvh, camera).and_then(|m| m.save(&path)) {
                    Ok(()) => {
                        log::debug!("rendered {} in {:?}", camera.image_name, now.elapsed());
                        CameraOutcome::Written(path)
                    }
                    Err(e) => {
                        log::error!("failed to render {}: {e}", camera.image_name);
                        CameraOutcome::Failed(camera.image_name.clone(), e)
                    }
                };
                tracker.advance();
                outcome
            })
            .collect()
    });

    let mut batch = HitMapBatch::default();
    for outcome in outcomes {
        match outcome {
            CameraOutcome::Written(path) => batch.written.push(path),
            CameraOutcome::Failed(name, e) => batch.failed.push((name, e)),
            CameraOutcome::Skipped => batch.aborted = true,
        }
    }

    log::info!(
        "wrote {} hit maps, {} failed{}",
        batch.written.len(),
        batch.failed.len(),
        if batch.aborted { ", aborted" } else { "" }
    );

    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chubaca_3d::camera::{CameraIntrinsics, RadialDistortion};
    use glam::{DMat3, DVec3};

    fn plane(z: f64) -> TriangleMesh {
        let vertices = vec![
            [-20.0, -20.0, z],
            [20.0, -20.0, z],
            [20.0, 20.0, z],
            [-20.0, 20.0, z],
        ];
        TriangleMesh::new(vertices, vec![[0, 1, 2], [0, 2, 3]]).unwrap()
    }

    fn camera(name: &str, width: usize, height: usize, center: DVec3) -> Camera {
        Camera {
            image_name: name.to_string(),
            relative_path: PathBuf::from(name),
            absolute_path: PathBuf::from(name),
            width,
            height,
            intrinsics: CameraIntrinsics {
                focal_length: width as f64,
                principal_point: [width as f64 / 2.0, height as f64 / 2.0],
            },
            distortion: RadialDistortion::None,
            rotation: DMat3::from_cols(
                DVec3::new(1.0, 0.0, 0.0),
                DVec3::new(0.0, -1.0, 0.0),
                DVec3::new(0.0, 0.0, -1.0),
            ),
            center,
            view_index: 0,
            panoramic: false,
        }
    }

    #[test]
    fn test_lookup_and_bounds() -> Result<(), HitMapError> {
        let mut map = HitMap::empty(3, 2);
        map.set(2, 1, [1.0, 2.0, 3.0]);
        map.set(5, 5, [1.0, 1.0, 1.0]);

        assert_eq!(map.get(2, 1), Some([1.0, 2.0, 3.0]));
        assert_eq!(map.get(3, 0), None);
        assert!(map.is_hit(2, 1));
        assert!(!map.is_hit(0, 0));
        assert_eq!(map.num_hits(), 1);

        assert!(matches!(
            HitMap::new(3, 2, vec![[0.0; 3]; 5]),
            Err(HitMapError::InvalidLength(5, 6))
        ));
        Ok(())
    }

    #[test]
    fn test_to_image_flips_rows() -> Result<(), Box<dyn std::error::Error>> {
        let mut map = HitMap::empty(2, 2);
        map.set(0, 0, [1.0, 1.0, 1.0]);
        let image = map.to_image()?;
        // the bottom sensor row becomes the last image row
        assert_eq!(image.get_pixel(0, 1, 0)?, 1.0);
        assert_eq!(image.get_pixel(0, 0, 0)?, 0.0);
        Ok(())
    }

    #[test]
    fn test_save_load() -> Result<(), HitMapError> {
        let dir = tempfile::tempdir()?;
        let path = hit_map_path(dir.path(), "20210521T101512.250Z.jpg");
        assert!(path.ends_with("20210521T101512.250Z.jpg.hitmap"));

        let mut map = HitMap::empty(4, 3);
        map.set(1, 2, [0.5, -1.25, 7.0]);
        map.save(&path)?;

        assert_eq!(HitMap::load(&path)?, map);
        Ok(())
    }

    #[test]
    fn test_render_plane() -> Result<(), HitMapError> {
        let bvh = Bvh::new(&plane(0.0));
        let cam = camera("a.jpg", 5, 3, DVec3::new(1.0, 2.0, 10.0));
        let map = render_hit_map(&bvh, &cam)?;

        assert_eq!((map.width(), map.height()), (5, 3));
        assert_eq!(map.num_hits(), 15);

        // the central ray goes straight down
        let center = map.get(2, 1).unwrap();
        assert!((center[0] - 1.0).abs() < 1e-5);
        assert!((center[1] - 2.0).abs() < 1e-5);
        assert_eq!(center[2], 0.0);

        // sensor x grows along world x and sensor y along world y
        assert!(map.get(4, 1).unwrap()[0] > center[0]);
        assert!(map.get(2, 2).unwrap()[1] > center[1]);
        Ok(())
    }

    #[test]
    fn test_camera_facing_away_misses() -> Result<(), HitMapError> {
        let bvh = Bvh::new(&plane(20.0));
        let cam = camera("a.jpg", 4, 4, DVec3::new(0.0, 0.0, 10.0));
        assert_eq!(render_hit_map(&bvh, &cam)?.num_hits(), 0);
        Ok(())
    }

    #[test]
    fn test_batch_keeps_going() -> Result<(), HitMapError> {
        let dir = tempfile::tempdir()?;
        let cameras = vec![
            camera("a.jpg", 4, 3, DVec3::new(0.5, 0.5, 5.0)),
            camera("broken.jpg", 0, 3, DVec3::new(0.5, 0.5, 5.0)),
            camera("c.jpg", 4, 3, DVec3::new(1.5, 0.5, 5.0)),
        ];
        let config = HitMapConfig {
            num_threads: 2,
            ..Default::default()
        };
        let batch = generate_hit_maps(
            &plane(0.0),
            &cameras,
            dir.path(),
            &config,
            &RunControl::new(),
        )?;

        assert_eq!(batch.written.len(), 2);
        assert_eq!(batch.failed.len(), 1);
        assert_eq!(batch.failed[0].0, "broken.jpg");
        assert!(!batch.aborted);
        assert_eq!(HitMap::load(&batch.written[1])?.num_hits(), 12);
        Ok(())
    }

    #[test]
    fn test_batch_abort() -> Result<(), HitMapError> {
        let dir = tempfile::tempdir()?;
        let cameras = vec![camera("a.jpg", 4, 3, DVec3::new(0.5, 0.5, 5.0))];
        let control = RunControl::new();
        control.abort();
        let batch = generate_hit_maps(
            &plane(0.0),
            &cameras,
            dir.path(),
            &HitMapConfig::default(),
            &control,
        )?;
        assert!(batch.aborted);
        assert!(batch.written.is_empty());
        Ok(())
    }
}
