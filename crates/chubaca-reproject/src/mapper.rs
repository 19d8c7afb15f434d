use std::collections::HashMap;

use rayon::prelude::*;

use crate::annotation::{Annotation, Shape};
use crate::config::ReprojectionConfig;
use crate::contour::{frame_bound, Contour};
use crate::error::ReprojectError;
use crate::frames::RenderedFrame;
use crate::hitmap::HitMap;
use crate::progress::RunControl;
use crate::tables::{LineRecord, PointRecord, PolygonRecord, ReprojectionTables};

/// Identifier of the synthetic frame bound annotations.
pub const BOUND_ID: i64 = -999;

/// Label name and hierarchy of the synthetic frame bound annotations.
pub const BOUND_LABEL: &str = "bound";

/// Look up the surface point under an annotation coordinate.
///
/// The coordinate must lie strictly inside the image; `y` counts from the bottom edge and
/// is flipped once to index the hit map.
///
/// # Arguments
///
/// * `hit_map` - The hit map of the frame.
/// * `point` - The annotation coordinate `(x, y)` in pixels.
///
/// # Returns
///
/// The surface point, or `None` when the coordinate is outside of the image or its ray
/// missed the mesh.
pub fn annotation_to_hitpoint(hit_map: &HitMap, point: [f64; 2]) -> Option<[f64; 3]> {
    let [x, y] = point;
    let (width, height) = (hit_map.width() as f64, hit_map.height() as f64);
    if !(0.0 < x && x < width && 0.0 < y && y < height) {
        return None;
    }
    let sensor_x = x.floor() as usize;
    let sensor_y = (height - y).floor() as usize;
    let value = hit_map.get(sensor_x, sensor_y)?;
    (value != [0.0; 3]).then(|| value.map(f64::from))
}

/// The synthetic annotation covering the valid footprint of a frame.
pub fn bound_annotation(frame: &str) -> Annotation {
    Annotation {
        frame: frame.to_string(),
        shape: Shape::WholeFrame,
        label_name: BOUND_LABEL.to_string(),
        label_hierarchy: BOUND_LABEL.to_string(),
        id: BOUND_ID,
    }
}

// smallest planar distance from the centre to the four cardinal points
fn circle_radius(hit_map: &HitMap, center: [f64; 2], center_hit: [f64; 3], radius: f64) -> Option<f64> {
    let [x, y] = center;
    [[x + radius, y], [x - radius, y], [x, y + radius], [x, y - radius]]
        .into_iter()
        .filter_map(|point| annotation_to_hitpoint(hit_map, point))
        .map(|p| ((p[0] - center_hit[0]).powi(2) + (p[1] - center_hit[1]).powi(2)).sqrt())
        .reduce(f64::min)
}

fn map_vertices(hit_map: &HitMap, vertices: &[[f64; 2]]) -> (Vec<[f64; 3]>, usize) {
    let mut points = Vec::with_capacity(vertices.len());
    let mut misses = 0;
    for v in vertices {
        match annotation_to_hitpoint(hit_map, *v) {
            Some(p) => points.push(p),
            None => misses += 1,
        }
    }
    (points, misses)
}

fn polygon_record(
    hit_map: &HitMap,
    vertices: &[[f64; 2]],
    annotation: &Annotation,
) -> Option<PolygonRecord> {
    let (points, misses) = map_vertices(hit_map, vertices);
    if points.is_empty() {
        return None;
    }
    Some(PolygonRecord {
        points,
        misses,
        label: annotation.label_name.clone(),
        label_hierarchy: annotation.label_hierarchy.clone(),
        frame: annotation.frame.clone(),
        annotation_id: annotation.id,
    })
}

/// Map one annotation of a frame to the surface and append its record.
///
/// Annotations without any surface hit produce no record.
///
/// # Arguments
///
/// * `hit_map` - The hit map of the frame.
/// * `bound` - The frame bound, the geometry of whole-frame annotations.
/// * `annotation` - The annotation to map.
/// * `min_radius` - The radius of circles whose cardinal points all missed.
/// * `tables` - The tables receiving the record.
pub fn reproject_annotation(
    hit_map: &HitMap,
    bound: &Contour,
    annotation: &Annotation,
    min_radius: f64,
    tables: &mut ReprojectionTables,
) {
    let label = annotation.label_name.clone();
    let label_hierarchy = annotation.label_hierarchy.clone();
    let frame = annotation.frame.clone();
    let annotation_id = annotation.id;

    match &annotation.shape {
        Shape::Point(p) => {
            if let Some(point) = annotation_to_hitpoint(hit_map, *p) {
                tables.points.push(PointRecord {
                    point,
                    radius: 0.0,
                    label,
                    label_hierarchy,
                    frame,
                    annotation_id,
                });
            }
        }
        Shape::Circle { center, radius } => {
            if let Some(point) = annotation_to_hitpoint(hit_map, *center) {
                let radius = circle_radius(hit_map, *center, point, *radius).unwrap_or(min_radius);
                tables.points.push(PointRecord {
                    point,
                    radius,
                    label,
                    label_hierarchy,
                    frame,
                    annotation_id,
                });
            }
        }
        Shape::LineString(vertices) => {
            let (points, _) = map_vertices(hit_map, vertices);
            if !points.is_empty() {
                tables.lines.push(LineRecord {
                    points,
                    label,
                    label_hierarchy,
                    frame,
                    annotation_id,
                });
            }
        }
        Shape::Polygon(vertices) | Shape::Rectangle(vertices) => {
            tables.polygons.extend(polygon_record(hit_map, vertices, annotation));
        }
        Shape::WholeFrame => {
            tables
                .polygons
                .extend(polygon_record(hit_map, bound.points(), annotation));
        }
    }
}

/// Map the annotations of one frame, followed by the frame bound.
pub fn reproject_frame(
    hit_map: &HitMap,
    bound: &Contour,
    frame: &str,
    annotations: &[&Annotation],
    min_radius: f64,
) -> ReprojectionTables {
    let mut tables = ReprojectionTables::default();
    for annotation in annotations {
        reproject_annotation(hit_map, bound, annotation, min_radius, &mut tables);
    }
    reproject_annotation(
        hit_map,
        bound,
        &bound_annotation(frame),
        min_radius,
        &mut tables,
    );
    tables
}

/// Map the annotations of every rendered frame.
///
/// Frames run in parallel and their rows are concatenated in frame order. A frame whose
/// hit map cannot be read or whose bound cannot be built is logged and skipped.
///
/// # Arguments
///
/// * `frames` - The rendered frames, in chronological order.
/// * `annotations` - The annotations, matched to frames by image name.
/// * `config` - The bound and mapper settings.
/// * `control` - The abort flag and progress callback.
pub fn reproject_frames(
    frames: &[RenderedFrame],
    annotations: &[Annotation],
    config: &ReprojectionConfig,
    control: &RunControl,
) -> Result<ReprojectionTables, ReprojectError> {
    let mut by_frame: HashMap<&str, Vec<&Annotation>> = HashMap::new();
    for annotation in annotations {
        by_frame
            .entry(annotation.frame.as_str())
            .or_default()
            .push(annotation);
    }

    let tracker = control.tracker(frames.len());
    let per_frame: Vec<Option<ReprojectionTables>> = frames
        .par_iter()
        .map(|frame| {
            if control.is_aborted() {
                return None;
            }
            let result = reproject_one(frame, &by_frame, config);
            tracker.advance();
            match result {
                Ok(tables) => Some(tables),
                Err(e) => {
                    log::warn!("frame {} skipped: {e}", frame.image_name);
                    None
                }
            }
        })
        .collect();

    if control.is_aborted() {
        return Err(ReprojectError::Aborted);
    }

    let mut tables = ReprojectionTables::default();
    for frame_tables in per_frame.into_iter().flatten() {
        tables.append(frame_tables);
    }

    let matched: usize = frames
        .iter()
        .filter_map(|f| by_frame.get(f.image_name.as_str()))
        .map(Vec::len)
        .sum();
    if matched < annotations.len() {
        log::warn!(
            "{} annotations have no rendered frame",
            annotations.len() - matched
        );
    }

    Ok(tables)
}

fn reproject_one(
    frame: &RenderedFrame,
    by_frame: &HashMap<&str, Vec<&Annotation>>,
    config: &ReprojectionConfig,
) -> Result<ReprojectionTables, ReprojectError> {
    let now = std::time::Instant::now();
    let hit_map = HitMap::load(&frame.hit_map)?;
    let bound = frame_bound(&hit_map, &config.bound, &config.contour)?;
    let annotations = by_frame
        .get(frame.image_name.as_str())
        .map(Vec::as_slice)
        .unwrap_or_default();
    let tables = reproject_frame(
        &hit_map,
        &bound,
        &frame.image_name,
        annotations,
        config.mapper.min_radius,
    );
    log::debug!(
        "reprojected {} annotations of {} in {:?}",
        annotations.len(),
        frame.image_name,
        now.elapsed()
    );
    Ok(tables)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hitmap::hit_map_path;
    use approx::assert_relative_eq;

    // every pixel hits, the surface point of sensor (x, y) is (x + 0.5, y + 0.5, 1)
    fn ramp(width: usize, height: usize) -> HitMap {
        let mut map = HitMap::empty(width, height);
        for y in 0..height {
            for x in 0..width {
                map.set(x, y, [x as f32 + 0.5, y as f32 + 0.5, 1.0]);
            }
        }
        map
    }

    fn annotation(shape: Shape) -> Annotation {
        Annotation {
            frame: "a.jpg".to_string(),
            shape,
            label_name: "Coral".to_string(),
            label_hierarchy: "Biota > Coral".to_string(),
            id: 3,
        }
    }

    #[test]
    fn test_hitpoint_lookup() {
        let map = ramp(10, 8);
        // y is flipped: annotation y = 8 - 5.5 lands on sensor row 5
        assert_eq!(annotation_to_hitpoint(&map, [2.5, 2.5]), Some([2.5, 5.5, 1.0]));
        assert_eq!(annotation_to_hitpoint(&map, [9.9, 0.1]), Some([9.5, 7.5, 1.0]));

        let mut holes = map.clone();
        holes.set(2, 5, [0.0; 3]);
        assert_eq!(annotation_to_hitpoint(&holes, [2.5, 2.5]), None);
    }

    #[test]
    fn test_hitpoint_boundaries_are_exclusive() {
        let map = ramp(10, 8);
        for p in [[0.0, 4.0], [10.0, 4.0], [5.0, 0.0], [5.0, 8.0], [-1.0, 4.0], [5.0, 9.0]] {
            assert_eq!(annotation_to_hitpoint(&map, p), None, "{p:?}");
        }
    }

    #[test]
    fn test_point_and_circle() {
        let map = ramp(20, 20);
        let bound = Contour::new(Vec::new());
        let mut tables = ReprojectionTables::default();

        reproject_annotation(&map, &bound, &annotation(Shape::Point([5.5, 5.5])), 0.01, &mut tables);
        reproject_annotation(
            &map,
            &bound,
            &annotation(Shape::Circle {
                center: [10.5, 10.5],
                radius: 3.0,
            }),
            0.01,
            &mut tables,
        );

        assert_eq!(tables.points.len(), 2);
        assert_eq!(tables.points[0].radius, 0.0);
        assert_eq!(tables.points[0].annotation_id, 3);
        assert_relative_eq!(tables.points[1].radius, 3.0);
    }

    #[test]
    fn test_circle_radius_is_the_nearest_cardinal_hit() {
        // stretch x so that the horizontal cardinal points are further away
        let mut map = HitMap::empty(20, 20);
        for y in 0..20 {
            for x in 0..20 {
                map.set(x, y, [2.0 * x as f32 + 1.0, y as f32 + 1.0, 0.0]);
            }
        }
        let center = annotation_to_hitpoint(&map, [10.5, 10.5]).unwrap();
        let radius = circle_radius(&map, [10.5, 10.5], center, 2.0).unwrap();
        assert_relative_eq!(radius, 2.0);

        // only the +x cardinal point hits
        let mut sparse = HitMap::empty(20, 20);
        sparse.set(10, 9, [1.0, 1.0, 0.0]);
        sparse.set(13, 9, [4.0, 5.0, 0.0]);
        let center = annotation_to_hitpoint(&sparse, [10.5, 10.5]).unwrap();
        assert_eq!(center, [1.0, 1.0, 0.0]);
        assert_relative_eq!(circle_radius(&sparse, [10.5, 10.5], center, 3.0).unwrap(), 5.0);
    }

    #[test]
    fn test_circle_without_cardinal_hits_gets_min_radius() {
        let mut map = HitMap::empty(20, 20);
        map.set(10, 9, [1.0, 1.0, 1.0]);
        let mut tables = ReprojectionTables::default();
        reproject_annotation(
            &map,
            &Contour::new(Vec::new()),
            &annotation(Shape::Circle {
                center: [10.5, 10.5],
                radius: 3.0,
            }),
            0.05,
            &mut tables,
        );
        assert_eq!(tables.points.len(), 1);
        assert_eq!(tables.points[0].radius, 0.05);
    }

    #[test]
    fn test_polygon_misses() {
        let mut map = ramp(20, 20);
        let square = vec![[2.5, 2.5], [12.5, 2.5], [12.5, 12.5], [2.5, 12.5]];
        // the sensor pixel under (12.5, 12.5)
        map.set(12, 7, [0.0; 3]);

        let bound = Contour::new(Vec::new());
        let mut tables = ReprojectionTables::default();
        reproject_annotation(&map, &bound, &annotation(Shape::Polygon(square.clone())), 0.01, &mut tables);
        assert_eq!(tables.polygons.len(), 1);
        assert_eq!(tables.polygons[0].points.len(), 3);
        assert_eq!(tables.polygons[0].misses, 1);

        let empty = HitMap::empty(20, 20);
        let mut tables = ReprojectionTables::default();
        reproject_annotation(&empty, &bound, &annotation(Shape::Rectangle(square)), 0.01, &mut tables);
        assert!(tables.polygons.is_empty());
    }

    #[test]
    fn test_line_drops_misses() {
        let map = ramp(20, 20);
        let mut tables = ReprojectionTables::default();
        let line = Shape::LineString(vec![[1.5, 1.5], [25.0, 1.5], [3.5, 4.5]]);
        reproject_annotation(&map, &Contour::new(Vec::new()), &annotation(line), 0.01, &mut tables);
        assert_eq!(tables.lines.len(), 1);
        assert_eq!(tables.lines[0].points, vec![[1.5, 18.5, 1.0], [3.5, 15.5, 1.0]]);

        let mut tables = ReprojectionTables::default();
        let line = Shape::LineString(vec![[0.0, 1.5], [25.0, 1.5]]);
        reproject_annotation(&map, &Contour::new(Vec::new()), &annotation(line), 0.01, &mut tables);
        assert!(tables.lines.is_empty());
    }

    #[test]
    fn test_frame_appends_bound() {
        let map = ramp(30, 20);
        let bound = Contour::new(vec![[2.0, 2.0], [28.0, 2.0], [28.0, 18.0], [2.0, 18.0]]);
        let wholeframe = annotation(Shape::WholeFrame);
        let tables = reproject_frame(&map, &bound, "a.jpg", &[&wholeframe], 0.01);

        assert_eq!(tables.polygons.len(), 2);
        assert_eq!(tables.polygons[0].annotation_id, 3);
        assert_eq!(tables.polygons[0].points.len(), 5);
        let last = &tables.polygons[1];
        assert_eq!(last.annotation_id, BOUND_ID);
        assert_eq!(last.label, "bound");
        assert_eq!(last.label_hierarchy, "bound");
        assert_eq!(last.points, tables.polygons[0].points);
    }

    #[test]
    fn test_reproject_frames_skips_bad_frames() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let good = RenderedFrame {
            image_name: "a.jpg".to_string(),
            hit_map: hit_map_path(dir.path(), "a.jpg"),
            capture_time: None,
        };
        let empty = RenderedFrame {
            image_name: "b.jpg".to_string(),
            hit_map: hit_map_path(dir.path(), "b.jpg"),
            capture_time: None,
        };
        let missing = RenderedFrame {
            image_name: "c.jpg".to_string(),
            hit_map: hit_map_path(dir.path(), "c.jpg"),
            capture_time: None,
        };
        ramp(40, 30).save(&good.hit_map)?;
        HitMap::empty(40, 30).save(&empty.hit_map)?;
        let frames = vec![good, empty, missing];

        let annotations = vec![annotation(Shape::Point([5.5, 5.5]))];
        let tables = reproject_frames(
            &frames,
            &annotations,
            &ReprojectionConfig::default(),
            &RunControl::new(),
        )?;
        assert_eq!(tables.points.len(), 1);
        assert_eq!(tables.polygons.len(), 1);
        assert_eq!(tables.polygons[0].annotation_id, BOUND_ID);

        let control = RunControl::new();
        control.abort();
        assert!(matches!(
            reproject_frames(&frames, &annotations, &ReprojectionConfig::default(), &control),
            Err(ReprojectError::Aborted)
        ));
        Ok(())
    }
}
