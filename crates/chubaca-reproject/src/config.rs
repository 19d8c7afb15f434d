use std::path::Path;

use chubaca_3d::geomorphometry::GeomorphometryParams;
use chubaca_3d::volume::ExtrusionParams;
use serde::{Deserialize, Serialize};

/// Error types for the configuration module.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file
    #[error("Failed to read the configuration file")]
    Io(#[from] std::io::Error),

    /// The configuration is not valid JSON or has unknown values.
    #[error("Failed to parse the configuration")]
    Json(#[from] serde_json::Error),

    /// A value is out of its valid range.
    #[error("Invalid configuration value {0}: {1}")]
    InvalidValue(&'static str, String),
}

/// Settings of the hit-map generator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HitMapConfig {
    /// Number of worker threads, `0` uses one per core.
    pub num_threads: usize,
    /// Do not warn about cameras with radial distortion.
    pub suppress_distortion_warnings: bool,
}

/// Settings of the contour tracer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContourConfig {
    /// Zero margin added around the hit mask before edge detection.
    pub padding: usize,
    /// Lower Canny hysteresis threshold.
    pub canny_low: f64,
    /// Upper Canny hysteresis threshold.
    pub canny_high: f64,
    /// Largest neighbourhood radius searched for a hit around a contour point.
    pub search_radius: usize,
}

impl Default for ContourConfig {
    fn default() -> Self {
        Self {
            padding: 10,
            canny_low: 30.0,
            canny_high: 200.0,
            search_radius: 3,
        }
    }
}

/// How the bound of a frame is built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum BoundMode {
    /// Trace the outline of the hit pixels.
    #[default]
    Contour,
    /// Use the image rectangle shrunk by `margin` pixels on every side.
    InsetBorder {
        /// The inset in pixels.
        margin: usize,
    },
}

/// Settings of the annotation mapper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapperConfig {
    /// Radius given to circles whose four cardinal points all miss.
    pub min_radius: f64,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self { min_radius: 0.01 }
    }
}

/// Settings of the temporal track resolver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackConfig {
    /// Largest distance in seconds between an annotation timestamp and its frame.
    pub tolerance: f64,
    /// Only keep the whole-frame tracks.
    pub wholeframe_only: bool,
}

impl Default for TrackConfig {
    fn default() -> Self {
        Self {
            tolerance: 2.0,
            wholeframe_only: false,
        }
    }
}

/// Settings of the volume statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Only summarize annotation tracks, skipping the individual polygons.
    pub video_tracks_only: bool,
}

/// Settings of the terrain metric clouds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeomorphometryConfig {
    /// The neighbourhood radii, one metric cloud per scale.
    pub scales: Vec<f64>,
    /// Surface sampling and metric selection.
    #[serde(flatten)]
    pub params: GeomorphometryParams,
}

impl Default for GeomorphometryConfig {
    fn default() -> Self {
        Self {
            scales: vec![0.5],
            params: GeomorphometryParams::default(),
        }
    }
}

/// The configuration of a reprojection run.
///
/// Every section falls back to its default when missing from the file.
///
/// # Examples
///
/// ```
/// use chubaca_reproject::config::{BoundMode, ReprojectionConfig};
///
/// let config = ReprojectionConfig::from_json_str(
///     r#"{"bound": {"mode": "inset_border", "margin": 5}, "tracks": {"tolerance": 0.5}}"#,
/// ).unwrap();
///
/// assert_eq!(config.bound, BoundMode::InsetBorder { margin: 5 });
/// assert_eq!(config.tracks.tolerance, 0.5);
/// assert_eq!(config.contour.padding, 10);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReprojectionConfig {
    /// Hit-map generation.
    pub hit_maps: HitMapConfig,
    /// Contour tracing.
    pub contour: ContourConfig,
    /// Frame bound construction.
    pub bound: BoundMode,
    /// Annotation mapping.
    pub mapper: MapperConfig,
    /// Video track alignment.
    pub tracks: TrackConfig,
    /// Volume extrusion.
    pub volume: ExtrusionParams,
    /// Volume statistics.
    pub stats: StatsConfig,
    /// Terrain metric clouds.
    pub geomorphometry: GeomorphometryConfig,
}

impl ReprojectionConfig {
    /// Read the configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Parse the configuration from a JSON string.
    pub fn from_json_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the ranges of the numeric settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.tracks.tolerance.is_finite() && self.tracks.tolerance >= 0.0) {
            return Err(ConfigError::InvalidValue(
                "tracks.tolerance",
                self.tracks.tolerance.to_string(),
            ));
        }
        if !(self.mapper.min_radius.is_finite() && self.mapper.min_radius >= 0.0) {
            return Err(ConfigError::InvalidValue(
                "mapper.min_radius",
                self.mapper.min_radius.to_string(),
            ));
        }
        let sampling = &self.geomorphometry.params;
        if !(sampling.min_density > 0.0 && sampling.min_density <= sampling.max_density) {
            return Err(ConfigError::InvalidValue(
                "geomorphometry.min_density",
                format!("{}/{}", sampling.min_density, sampling.max_density),
            ));
        }
        if let Some(scale) = self
            .geomorphometry
            .scales
            .iter()
            .find(|s| !(s.is_finite() && **s > 0.0))
        {
            return Err(ConfigError::InvalidValue(
                "geomorphometry.scales",
                scale.to_string(),
            ));
        }
        if self.contour.canny_low < 0.0 || self.contour.canny_high < 0.0 {
            return Err(ConfigError::InvalidValue(
                "contour.canny",
                format!("{}/{}", self.contour.canny_low, self.contour.canny_high),
            ));
        }
        Ok(())
    }
}
