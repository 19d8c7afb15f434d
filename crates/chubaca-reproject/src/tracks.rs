use std::collections::HashMap;

use crate::annotation::{Annotation, Shape, ShapeKind, VideoTrack};
use crate::config::TrackConfig;
use crate::frames::{RenderedFrame, Video};

/// A rendered frame placed on the timeline of its source video.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameTime {
    /// The image name of the frame.
    pub image_name: String,
    /// Seconds since the start of the video.
    pub elapsed: f64,
}

/// Assign every rendered frame to the latest video started at or before its capture.
///
/// Frames without a capture time or captured before every video are left out.
///
/// # Returns
///
/// For each video name, its frames in chronological order.
pub fn frame_timeline(
    frames: &[RenderedFrame],
    videos: &[Video],
) -> HashMap<String, Vec<FrameTime>> {
    let mut videos: Vec<&Video> = videos.iter().collect();
    videos.sort_by_key(|v| v.start);

    let mut timeline: HashMap<String, Vec<FrameTime>> = HashMap::new();
    for frame in frames {
        let Some(capture) = frame.capture_time else {
            continue;
        };
        let started = videos.partition_point(|v| v.start <= capture);
        let Some(video) = started.checked_sub(1).map(|i| videos[i]) else {
            log::debug!("{} was captured before every video", frame.image_name);
            continue;
        };
        let Some(elapsed) = (capture - video.start).num_microseconds() else {
            continue;
        };
        timeline
            .entry(video.name.clone())
            .or_default()
            .push(FrameTime {
                image_name: frame.image_name.clone(),
                elapsed: elapsed as f64 / 1e6,
            });
    }

    for frames in timeline.values_mut() {
        frames.sort_by(|a, b| a.elapsed.total_cmp(&b.elapsed));
    }
    timeline
}

// index of the frame closest to `t`, the earlier one on ties
fn nearest(frames: &[FrameTime], t: f64, tolerance: Option<f64>) -> Option<usize> {
    let after = frames.partition_point(|f| f.elapsed < t);
    let candidates = [after.checked_sub(1), (after < frames.len()).then_some(after)];
    let best = candidates
        .into_iter()
        .flatten()
        .fold(None, |best: Option<(usize, f64)>, i| {
            let d = (frames[i].elapsed - t).abs();
            match best {
                Some((_, bd)) if bd <= d => best,
                _ => Some((i, d)),
            }
        })?;
    match tolerance {
        Some(tol) if best.1 > tol => None,
        _ => Some(best.0),
    }
}

/// Expand video tracks into per frame annotations on the rendered frames.
///
/// Tracks with key points pair each timestamp with its point list and keep the pairs
/// within `tolerance` seconds of a frame of the same video. Tracks without points mark
/// presence: each run of consecutive timestamps spans every frame between the frames
/// nearest to its ends, both included, and a single timestamp resolves like a key point.
/// Instances without points get the whole-frame geometry.
///
/// # Arguments
///
/// * `tracks` - The tracks of a video report.
/// * `frames` - The rendered frames.
/// * `videos` - The source videos.
/// * `config` - The matching tolerance and track filter.
///
/// # Returns
///
/// The annotations, grouped by track in report order and chronological within a track.
pub fn resolve_tracks(
    tracks: &[VideoTrack],
    frames: &[RenderedFrame],
    videos: &[Video],
    config: &TrackConfig,
) -> Vec<Annotation> {
    let timeline = frame_timeline(frames, videos);
    let mut annotations = Vec::new();

    for track in tracks {
        if config.wholeframe_only && track.kind != ShapeKind::WholeFrame {
            continue;
        }
        let Some(video_frames) = timeline.get(&track.video) else {
            log::warn!(
                "track {}: no rendered frame from video {}",
                track.id,
                track.video
            );
            continue;
        };

        let mut hits: Vec<(usize, Shape)> = if track.has_points() {
            keyframe_instances(track, video_frames, config.tolerance)
        } else {
            presence_instances(track, video_frames, config.tolerance)
        };
        hits.sort_by_key(|(i, _)| *i);

        if hits.is_empty() {
            log::debug!("track {} matched no rendered frame", track.id);
        }

        annotations.extend(hits.into_iter().map(|(i, shape)| Annotation {
            frame: video_frames[i].image_name.clone(),
            shape,
            label_name: track.label_name.clone(),
            label_hierarchy: track.label_hierarchy.clone(),
            id: track.id,
        }));
    }

    log::info!(
        "resolved {} tracks into {} frame annotations",
        tracks.len(),
        annotations.len()
    );

    annotations
}

fn keyframe_instances(
    track: &VideoTrack,
    frames: &[FrameTime],
    tolerance: f64,
) -> Vec<(usize, Shape)> {
    let mut hits = Vec::new();
    for (t, coords) in track.timestamps.iter().zip(&track.points) {
        let Some(t) = t else {
            continue;
        };
        let Some(i) = nearest(frames, *t, Some(tolerance)) else {
            continue;
        };
        let shape = match coords {
            Some(coords) => match Shape::from_coords(track.kind, coords) {
                Ok(shape) => shape,
                Err(e) => {
                    log::warn!("track {} at {t}s skipped: {e}", track.id);
                    continue;
                }
            },
            None if track.kind == ShapeKind::WholeFrame => Shape::WholeFrame,
            // a shaped track has no geometry at this keyframe
            None => {
                log::debug!("track {} at {t}s has no points", track.id);
                continue;
            }
        };
        hits.push((i, shape));
    }
    hits
}

fn presence_instances(
    track: &VideoTrack,
    frames: &[FrameTime],
    tolerance: f64,
) -> Vec<(usize, Shape)> {
    let mut hits = Vec::new();
    for run in track.timestamps.split(Option::is_none) {
        let times: Vec<f64> = run.iter().flatten().copied().collect();
        match times.as_slice() {
            [] => {}
            [t] => {
                if let Some(i) = nearest(frames, *t, Some(tolerance)) {
                    hits.push((i, Shape::WholeFrame));
                }
            }
            _ => {
                let start = times.iter().copied().fold(f64::INFINITY, f64::min);
                let end = times.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                let (Some(first), Some(last)) =
                    (nearest(frames, start, None), nearest(frames, end, None))
                else {
                    continue;
                };
                if first == last {
                    continue;
                }
                hits.extend((first..=last).map(|i| (i, Shape::WholeFrame)));
            }
        }
    }
    hits
}
