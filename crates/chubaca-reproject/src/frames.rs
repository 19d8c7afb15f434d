use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;

use crate::hitmap::HIT_MAP_EXTENSION;

/// Capture time layout of image names, e.g. `20210521T101512.250Z`.
pub const IMAGE_TIME_FORMAT: &str = "%Y%m%dT%H%M%S%.fZ";

/// Start time layout of the third `_` separated field of video names.
pub const VIDEO_TIME_FORMAT: &str = "%y%m%d%H%M%S";

/// Error types for the frames module.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The listed path is not a directory.
    #[error("{0} is not a directory")]
    NotADirectory(PathBuf),

    /// Failed to walk the directory.
    #[error("Failed to list directory")]
    Walk(#[from] walkdir::Error),
}

/// A frame whose hit map was rendered.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedFrame {
    /// The image name, which is also the frame identifier of annotations.
    pub image_name: String,
    /// The hit map file.
    pub hit_map: PathBuf,
    /// The capture time encoded in the image name, if any.
    pub capture_time: Option<NaiveDateTime>,
}

/// A source video of a video report.
#[derive(Debug, Clone, PartialEq)]
pub struct Video {
    /// The video file name.
    pub name: String,
    /// The video file.
    pub path: PathBuf,
    /// The recording start time encoded in the file name.
    pub start: NaiveDateTime,
}

/// Parse the capture time of an image name such as `20210521T101512.250Z.jpg`.
pub fn parse_capture_time(image_name: &str) -> Option<NaiveDateTime> {
    let stem = image_name
        .rsplit_once('.')
        .map_or(image_name, |(stem, _)| stem);
    NaiveDateTime::parse_from_str(stem, IMAGE_TIME_FORMAT).ok()
}

/// Parse the start time of a video name such as `dive_A_210521101000.mp4`.
pub fn parse_video_start(video_name: &str) -> Option<NaiveDateTime> {
    let stem = video_name
        .rsplit_once('.')
        .map_or(video_name, |(stem, _)| stem);
    let field = stem.split('_').nth(2)?;
    NaiveDateTime::parse_from_str(field, VIDEO_TIME_FORMAT).ok()
}

fn files_with_extension(
    dir: &Path,
    extension: &str,
) -> Result<Vec<(String, PathBuf)>, FrameError> {
    if !dir.is_dir() {
        return Err(FrameError::NotADirectory(dir.to_path_buf()));
    }
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(dir).max_depth(1) {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type().is_file()
            || path.extension().map_or(true, |ext| ext != extension)
        {
            continue;
        }
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            files.push((name.to_string(), path.to_path_buf()));
        }
    }
    Ok(files)
}

/// List the hit maps of a directory as rendered frames.
///
/// # Returns
///
/// The frames sorted by capture time, frames without a capture time last, ties by name.
pub fn list_rendered_frames(dir: impl AsRef<Path>) -> Result<Vec<RenderedFrame>, FrameError> {
    let mut frames: Vec<RenderedFrame> = files_with_extension(dir.as_ref(), HIT_MAP_EXTENSION)?
        .into_iter()
        .filter_map(|(name, path)| {
            let image_name = name.strip_suffix(&format!(".{HIT_MAP_EXTENSION}"))?.to_string();
            let capture_time = parse_capture_time(&image_name);
            if capture_time.is_none() {
                log::debug!("{image_name} has no capture time in its name");
            }
            Some(RenderedFrame {
                image_name,
                hit_map: path,
                capture_time,
            })
        })
        .collect();

    frames.sort_by(|a, b| {
        let key = |f: &RenderedFrame| (f.capture_time.is_none(), f.capture_time);
        key(a)
            .cmp(&key(b))
            .then_with(|| a.image_name.cmp(&b.image_name))
    });

    log::debug!("found {} rendered frames", frames.len());

    Ok(frames)
}

/// List the `.mp4` videos of a directory with their start times.
///
/// Videos whose name carries no start time are skipped with a warning.
pub fn list_videos(dir: impl AsRef<Path>) -> Result<Vec<Video>, FrameError> {
    let mut videos: Vec<Video> = files_with_extension(dir.as_ref(), "mp4")?
        .into_iter()
        .filter_map(|(name, path)| match parse_video_start(&name) {
            Some(start) => Some(Video { name, path, start }),
            None => {
                log::warn!("video {name} has no start time in its name, skipped");
                None
            }
        })
        .collect();

    videos.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.name.cmp(&b.name)));

    Ok(videos)
}
