use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use glam::{DMat3, DVec3};
use serde::Deserialize;

use crate::camera::{Camera, CameraIntrinsics, RadialDistortion};

/// Error types for the OpenMVG module.
#[derive(Debug, thiserror::Error)]
pub enum SfmError {
    /// Failed to read the reconstruction file
    #[error("Failed to read sfm_data file")]
    Io(#[from] std::io::Error),

    /// The file is not a valid reconstruction document.
    #[error("Failed to parse sfm_data file")]
    Json(#[from] serde_json::Error),

    /// The intrinsic with key 0 is missing, so the camera model is unknown.
    #[error("The reconstruction has no intrinsic with key 0")]
    MissingDefaultIntrinsic,

    /// An intrinsic model is not supported.
    #[error("Unsupported intrinsic model {0}")]
    UnsupportedModel(String),
}

#[derive(Debug, Deserialize)]
struct SfmData {
    #[serde(default)]
    root_path: String,
    #[serde(default)]
    views: Vec<Entry<Polymorphic<ViewData>>>,
    #[serde(default)]
    intrinsics: Vec<Entry<Polymorphic<IntrinsicData>>>,
    #[serde(default)]
    extrinsics: Vec<Entry<PoseData>>,
}

#[derive(Debug, Deserialize)]
struct Entry<T> {
    key: u32,
    value: T,
}

#[derive(Debug, Deserialize)]
struct Polymorphic<T> {
    #[serde(default)]
    polymorphic_name: Option<String>,
    ptr_wrapper: PtrWrapper<T>,
}

#[derive(Debug, Deserialize)]
struct PtrWrapper<T> {
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ViewData {
    #[serde(default)]
    local_path: String,
    filename: String,
    width: usize,
    height: usize,
    id_view: u32,
    id_intrinsic: u32,
    id_pose: u32,
}

#[derive(Debug, Deserialize)]
struct IntrinsicData {
    #[serde(default)]
    focal_length: f64,
    #[serde(default)]
    principal_point: [f64; 2],
    #[serde(default)]
    disto_k1: Option<[f64; 1]>,
    #[serde(default)]
    disto_k3: Option<[f64; 3]>,
}

#[derive(Debug, Deserialize)]
struct PoseData {
    rotation: [[f64; 3]; 3],
    center: [f64; 3],
}

/// Options for reading a reconstruction.
#[derive(Debug, Clone, Copy, Default)]
pub struct SfmReadOptions {
    /// Do not log a warning for cameras with radial distortion.
    pub suppress_distortion_warnings: bool,
}

/// Read the registered cameras of an OpenMVG `sfm_data.json` reconstruction.
///
/// # Arguments
///
/// * `path` - Path to the reconstruction file.
/// * `options` - The reading options.
///
/// # Returns
///
/// One camera per view whose pose and intrinsic are both known, in view order.
pub fn read_openmvg_sfm(
    path: impl AsRef<Path>,
    options: &SfmReadOptions,
) -> Result<Vec<Camera>, SfmError> {
    let file = std::fs::File::open(path)?;
    parse_openmvg_sfm(std::io::BufReader::new(file), options)
}

/// Parse an OpenMVG reconstruction stream.
pub fn parse_openmvg_sfm<R: Read>(
    reader: R,
    options: &SfmReadOptions,
) -> Result<Vec<Camera>, SfmError> {
    let sfm: SfmData = serde_json::from_reader(reader)?;

    let default_model = sfm
        .intrinsics
        .iter()
        .find(|e| e.key == 0)
        .ok_or(SfmError::MissingDefaultIntrinsic)?
        .value
        .polymorphic_name
        .clone()
        .unwrap_or_else(|| "pinhole".to_string());

    let mut intrinsics = HashMap::new();
    for entry in &sfm.intrinsics {
        let model = entry
            .value
            .polymorphic_name
            .as_deref()
            .unwrap_or(&default_model);
        let Some(data) = entry.value.ptr_wrapper.data.as_ref() else {
            log::warn!("intrinsic {} has no data, skipped", entry.key);
            continue;
        };
        intrinsics.insert(entry.key, (model.to_string(), data));
    }

    let poses: HashMap<u32, &PoseData> = sfm.extrinsics.iter().map(|e| (e.key, &e.value)).collect();
    let root = PathBuf::from(&sfm.root_path);

    let mut cameras = Vec::new();
    for entry in &sfm.views {
        let Some(view) = entry.value.ptr_wrapper.data.as_ref() else {
            log::warn!("view {} has no data, skipped", entry.key);
            continue;
        };
        let (Some(pose), Some((model, intrinsic))) =
            (poses.get(&view.id_pose), intrinsics.get(&view.id_intrinsic))
        else {
            log::debug!("view {} ({}) is not registered", view.id_view, view.filename);
            continue;
        };

        let camera = match build_camera(view, model, intrinsic, pose, &root) {
            Ok(camera) => camera,
            Err(e) => {
                log::error!("view {} ({}) skipped: {e}", view.id_view, view.filename);
                continue;
            }
        };
        if camera.distortion.is_distorted() && !options.suppress_distortion_warnings {
            log::warn!(
                "camera {} has radial distortion {:?}, rays use the undistorted model",
                camera.image_name,
                camera.distortion
            );
        }
        cameras.push(camera);
    }

    log::info!(
        "parsed {} registered cameras out of {} views",
        cameras.len(),
        sfm.views.len()
    );

    Ok(cameras)
}

fn build_camera(
    view: &ViewData,
    model: &str,
    intrinsic: &IntrinsicData,
    pose: &PoseData,
    root: &Path,
) -> Result<Camera, SfmError> {
    let panoramic = match model {
        "spherical" => true,
        "pinhole" | "pinhole_radial_k1" | "pinhole_radial_k3" => false,
        other => return Err(SfmError::UnsupportedModel(other.to_string())),
    };

    let (intrinsics, distortion) = if panoramic {
        (
            CameraIntrinsics {
                focal_length: 1.0,
                principal_point: [view.width as f64 / 2.0, view.height as f64 / 2.0],
            },
            RadialDistortion::None,
        )
    } else {
        let distortion = match (intrinsic.disto_k3, intrinsic.disto_k1) {
            (Some(k3), _) => RadialDistortion::K3(k3),
            (None, Some([k1])) => RadialDistortion::K1(k1),
            (None, None) => RadialDistortion::None,
        };
        (
            CameraIntrinsics {
                focal_length: intrinsic.focal_length,
                principal_point: intrinsic.principal_point,
            },
            distortion,
        )
    };

    let relative_path = Path::new(&view.local_path).join(&view.filename);

    Ok(Camera {
        image_name: view.filename.clone(),
        absolute_path: root.join(&relative_path),
        relative_path,
        width: view.width,
        height: view.height,
        intrinsics,
        distortion,
        // the json stores the rotation row by row
        rotation: DMat3::from_cols_array_2d(&pose.rotation).transpose(),
        center: DVec3::from_array(pose.center),
        view_index: view.id_view,
        panoramic,
    })
}
