use std::io::Read;
use std::path::Path;

use serde::Deserialize;

/// Error types for the annotation module.
#[derive(Debug, thiserror::Error)]
pub enum AnnotationError {
    /// Failed to read the report
    #[error("Failed to read annotation report")]
    Io(#[from] std::io::Error),

    /// The report is not valid CSV.
    #[error("Failed to parse annotation report")]
    Csv(#[from] csv::Error),

    /// The first column does not identify an image or a video report.
    #[error("Unknown annotation report with first column {0:?}")]
    UnknownReportType(String),

    /// A data row cannot be turned into an annotation.
    #[error("Malformed annotation row {row}: {reason}")]
    MalformedRow {
        /// The 1-based data row, the header excluded.
        row: usize,
        /// What is wrong with the row.
        reason: String,
    },
}

/// The shape kinds found in annotation reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShapeKind {
    /// A single pixel.
    Point,
    /// A pixel and a radius.
    Circle,
    /// An open polyline.
    LineString,
    /// A closed polygon.
    Polygon,
    /// A rectangle given by its corners.
    Rectangle,
    /// The whole image.
    WholeFrame,
}

impl ShapeKind {
    /// Parse the shape name used by the reports, `None` for unhandled shapes.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Point" => Some(Self::Point),
            "Circle" => Some(Self::Circle),
            "LineString" => Some(Self::LineString),
            "Polygon" => Some(Self::Polygon),
            "Rectangle" => Some(Self::Rectangle),
            "WholeFrame" => Some(Self::WholeFrame),
            _ => None,
        }
    }

    /// The shape name used by the reports.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Point => "Point",
            Self::Circle => "Circle",
            Self::LineString => "LineString",
            Self::Polygon => "Polygon",
            Self::Rectangle => "Rectangle",
            Self::WholeFrame => "WholeFrame",
        }
    }
}

/// The 2D geometry of an annotation, in pixels with the y axis pointing up.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    /// A single pixel.
    Point([f64; 2]),
    /// A circle around a pixel.
    Circle {
        /// The centre.
        center: [f64; 2],
        /// The radius in pixels.
        radius: f64,
    },
    /// An open polyline.
    LineString(Vec<[f64; 2]>),
    /// A polygon.
    Polygon(Vec<[f64; 2]>),
    /// A rectangle given by its corners.
    Rectangle(Vec<[f64; 2]>),
    /// The valid footprint of the frame.
    WholeFrame,
}

impl Shape {
    /// Build a shape from the flat coordinate list of a report.
    ///
    /// Points use `[x, y]`, circles `[x, y, r]` and the other shapes `[x0, y0, x1, y1, ...]`.
    /// Whole-frame shapes ignore the coordinates.
    pub fn from_coords(kind: ShapeKind, coords: &[f64]) -> Result<Self, String> {
        if let Some(v) = coords.iter().find(|v| !v.is_finite()) {
            return Err(format!("non-finite coordinate {v}"));
        }
        let pairs = |min_points: usize| -> Result<Vec<[f64; 2]>, String> {
            if coords.len() % 2 != 0 {
                return Err(format!(
                    "{} needs pairs of coordinates, got {}",
                    kind.name(),
                    coords.len()
                ));
            }
            if coords.len() < 2 * min_points {
                return Err(format!(
                    "{} needs at least {min_points} points, got {}",
                    kind.name(),
                    coords.len() / 2
                ));
            }
            Ok(coords.chunks_exact(2).map(|c| [c[0], c[1]]).collect())
        };

        match kind {
            ShapeKind::Point => match coords {
                [x, y, ..] => Ok(Shape::Point([*x, *y])),
                _ => Err(format!("Point needs 2 coordinates, got {}", coords.len())),
            },
            ShapeKind::Circle => match coords {
                [x, y, r, ..] => Ok(Shape::Circle {
                    center: [*x, *y],
                    radius: *r,
                }),
                _ => Err(format!("Circle needs 3 coordinates, got {}", coords.len())),
            },
            ShapeKind::LineString => Ok(Shape::LineString(pairs(2)?)),
            ShapeKind::Polygon => Ok(Shape::Polygon(pairs(3)?)),
            ShapeKind::Rectangle => Ok(Shape::Rectangle(pairs(3)?)),
            ShapeKind::WholeFrame => Ok(Shape::WholeFrame),
        }
    }

    /// The kind of the shape.
    pub fn kind(&self) -> ShapeKind {
        match self {
            Shape::Point(_) => ShapeKind::Point,
            Shape::Circle { .. } => ShapeKind::Circle,
            Shape::LineString(_) => ShapeKind::LineString,
            Shape::Polygon(_) => ShapeKind::Polygon,
            Shape::Rectangle(_) => ShapeKind::Rectangle,
            Shape::WholeFrame => ShapeKind::WholeFrame,
        }
    }
}

/// A 2D annotation on one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    /// The image name of the frame, e.g. `20210521T101512.250Z.jpg`.
    pub frame: String,
    /// The geometry.
    pub shape: Shape,
    /// The label name.
    pub label_name: String,
    /// The label hierarchy path.
    pub label_hierarchy: String,
    /// The annotation identifier, shared by the instances of a video track.
    pub id: i64,
}

/// One row of a video report: an annotation followed through a video.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoTrack {
    /// The source video file name.
    pub video: String,
    /// The shape kind of every instance.
    pub kind: ShapeKind,
    /// The label name.
    pub label_name: String,
    /// The label hierarchy path.
    pub label_hierarchy: String,
    /// The track identifier.
    pub id: i64,
    /// Seconds since the start of the video, `None` for null entries.
    pub timestamps: Vec<Option<f64>>,
    /// The flat coordinates at each timestamp, `None` for null entries.
    pub points: Vec<Option<Vec<f64>>>,
}

impl VideoTrack {
    /// Whether the track has key points, otherwise it only marks presence intervals.
    pub fn has_points(&self) -> bool {
        self.points.iter().any(Option::is_some)
    }
}

/// The two report layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportType {
    /// One row per shape drawn on an image.
    Image,
    /// One row per track drawn on a video.
    Video,
}

/// A parsed annotation report.
#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    /// The annotations of an image report.
    Image(Vec<Annotation>),
    /// The tracks of a video report.
    Video(Vec<VideoTrack>),
}

#[derive(Debug, Deserialize)]
struct ImageRow {
    filename: String,
    shape_name: String,
    points: String,
    label_name: String,
    label_hierarchy: String,
    annotation_id: i64,
}

#[derive(Debug, Deserialize)]
struct VideoRow {
    video_filename: String,
    shape_name: String,
    points: String,
    frames: String,
    label_name: String,
    label_hierarchy: String,
    video_annotation_label_id: i64,
}

/// Tell an image report from a video report by its first column.
pub fn detect_report_type(path: impl AsRef<Path>) -> Result<ReportType, AnnotationError> {
    let file = std::fs::File::open(path)?;
    report_type_of(file)
}

fn report_type_of<R: Read>(reader: R) -> Result<ReportType, AnnotationError> {
    let mut reader = csv::Reader::from_reader(reader);
    let first = reader
        .headers()?
        .get(0)
        .unwrap_or_default()
        .trim()
        .to_string();
    match first.as_str() {
        "annotation_label_id" => Ok(ReportType::Image),
        "video_annotation_label_id" => Ok(ReportType::Video),
        _ => Err(AnnotationError::UnknownReportType(first)),
    }
}

/// Read an annotation report of either layout.
pub fn read_report(path: impl AsRef<Path>) -> Result<Report, AnnotationError> {
    let path = path.as_ref();
    let report = match detect_report_type(path)? {
        ReportType::Image => Report::Image(read_image_report(path)?),
        ReportType::Video => Report::Video(read_video_report(path)?),
    };
    Ok(report)
}

/// Read the annotations of an image report.
pub fn read_image_report(path: impl AsRef<Path>) -> Result<Vec<Annotation>, AnnotationError> {
    let file = std::fs::File::open(path)?;
    parse_image_report(file)
}

/// Parse the annotations of an image report.
///
/// Rows with an unhandled shape kind are skipped with a warning; any other malformed row
/// fails the whole report.
pub fn parse_image_report<R: Read>(reader: R) -> Result<Vec<Annotation>, AnnotationError> {
    let mut reader = csv::Reader::from_reader(reader);
    let mut annotations = Vec::new();

    for (i, record) in reader.deserialize::<ImageRow>().enumerate() {
        let row = i + 1;
        let record = record.map_err(|e| malformed(row, e))?;

        let Some(kind) = ShapeKind::from_name(&record.shape_name) else {
            log::warn!("row {row}: unhandled shape {}, skipped", record.shape_name);
            continue;
        };
        let coords: Vec<f64> = parse_literal(&record.points).map_err(|e| malformed(row, e))?;
        let shape = Shape::from_coords(kind, &coords).map_err(|e| malformed(row, e))?;

        annotations.push(Annotation {
            frame: record.filename,
            shape,
            label_name: record.label_name,
            label_hierarchy: record.label_hierarchy,
            id: record.annotation_id,
        });
    }

    log::info!("parsed {} image annotations", annotations.len());

    Ok(annotations)
}

/// Read the tracks of a video report.
pub fn read_video_report(path: impl AsRef<Path>) -> Result<Vec<VideoTrack>, AnnotationError> {
    let file = std::fs::File::open(path)?;
    parse_video_report(file)
}

/// Parse the tracks of a video report.
///
/// `frames` holds the seconds since the video start of each instance and `points` the
/// matching flat coordinate lists; both may contain `null` entries. A `points` list longer
/// than `frames` is malformed.
pub fn parse_video_report<R: Read>(reader: R) -> Result<Vec<VideoTrack>, AnnotationError> {
    let mut reader = csv::Reader::from_reader(reader);
    let mut tracks = Vec::new();

    for (i, record) in reader.deserialize::<VideoRow>().enumerate() {
        let row = i + 1;
        let record = record.map_err(|e| malformed(row, e))?;

        let Some(kind) = ShapeKind::from_name(&record.shape_name) else {
            log::warn!("row {row}: unhandled shape {}, skipped", record.shape_name);
            continue;
        };

        let timestamps: Vec<Option<f64>> =
            parse_literal(&record.frames).map_err(|e| malformed(row, e))?;
        let mut points: Vec<Option<Vec<f64>>> = if record.points.trim().is_empty() {
            Vec::new()
        } else {
            parse_literal(&record.points).map_err(|e| malformed(row, e))?
        };

        if points.len() > timestamps.len() {
            return Err(malformed(
                row,
                format!(
                    "{} point lists for {} timestamps",
                    points.len(),
                    timestamps.len()
                ),
            ));
        }
        for coords in points.iter().flatten() {
            Shape::from_coords(kind, coords).map_err(|e| malformed(row, e))?;
        }
        points.resize(timestamps.len(), None);

        tracks.push(VideoTrack {
            video: record.video_filename,
            kind,
            label_name: record.label_name,
            label_hierarchy: record.label_hierarchy,
            id: record.video_annotation_label_id,
            timestamps,
            points,
        });
    }

    log::info!("parsed {} video tracks", tracks.len());

    Ok(tracks)
}

fn parse_literal<T: serde::de::DeserializeOwned>(literal: &str) -> Result<T, String> {
    serde_json::from_str(literal.trim()).map_err(|e| format!("invalid literal {literal:?}: {e}"))
}

fn malformed(row: usize, reason: impl ToString) -> AnnotationError {
    AnnotationError::MalformedRow {
        row,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const IMAGE_REPORT: &str = "\
annotation_label_id,filename,shape_name,points,label_name,label_hierarchy,annotation_id
1,img_a.jpg,Point,\"[10.5, 20.0]\",Sponge,Biota > Sponge,100
2,img_a.jpg,Circle,\"[50, 60, 4.5]\",Coral,Biota > Coral,101
3,img_b.jpg,Polygon,\"[1, 1, 10, 1, 10, 10, 1, 10]\",Rock,Substrate > Rock,102
4,img_b.jpg,Ellipse,\"[1, 1, 3, 2]\",Rock,Substrate > Rock,103
5,img_b.jpg,LineString,\"[0, 0, 5, 5, 9, 2]\",Crack,Substrate > Crack,104
6,img_c.jpg,WholeFrame,[],Sand,Substrate > Sand,105
";

    const VIDEO_REPORT: &str = "\
video_annotation_label_id,video_filename,shape_name,points,frames,label_name,label_hierarchy
7,dive_A_210521101000.mp4,Polygon,\"[[1, 1, 5, 1, 5, 5], null]\",\"[1.5, 3.0, null]\",Fish,Biota > Fish
8,dive_A_210521101000.mp4,WholeFrame,[],\"[2.0, 8.0]\",Sand,Substrate > Sand
9,dive_A_210521101000.mp4,Ellipse,[],\"[2.0, 8.0]\",Sand,Substrate > Sand
";

    #[test]
    fn parses_image_report() -> Result<(), AnnotationError> {
        let annotations = parse_image_report(Cursor::new(IMAGE_REPORT))?;
        // the ellipse is skipped
        assert_eq!(annotations.len(), 5);

        assert_eq!(annotations[0].frame, "img_a.jpg");
        assert_eq!(annotations[0].shape, Shape::Point([10.5, 20.0]));
        assert_eq!(annotations[0].label_hierarchy, "Biota > Sponge");
        assert_eq!(annotations[0].id, 100);

        assert_eq!(
            annotations[1].shape,
            Shape::Circle {
                center: [50.0, 60.0],
                radius: 4.5
            }
        );
        assert_eq!(annotations[2].shape.kind(), ShapeKind::Polygon);
        assert_eq!(
            annotations[3].shape,
            Shape::LineString(vec![[0.0, 0.0], [5.0, 5.0], [9.0, 2.0]])
        );
        assert_eq!(annotations[4].shape, Shape::WholeFrame);
        Ok(())
    }

    #[test]
    fn rejects_malformed_rows() {
        let report = "\
annotation_label_id,filename,shape_name,points,label_name,label_hierarchy,annotation_id
1,img_a.jpg,Point,\"[10.5, 20.0]\",Sponge,Biota,100
2,img_a.jpg,Polygon,\"[1, 1, 10]\",Coral,Biota,101
";
        assert!(matches!(
            parse_image_report(Cursor::new(report)),
            Err(AnnotationError::MalformedRow { row: 2, .. })
        ));

        let report = "\
annotation_label_id,filename,shape_name,points,label_name,label_hierarchy,annotation_id
1,img_a.jpg,Point,\"[10.5, \",Sponge,Biota,100
";
        assert!(matches!(
            parse_image_report(Cursor::new(report)),
            Err(AnnotationError::MalformedRow { row: 1, .. })
        ));

        let report = "\
annotation_label_id,filename,shape_name,points,label_name,label_hierarchy,annotation_id
1,img_a.jpg,Point,\"[10.5, 3]\",Sponge,Biota,not-a-number
";
        assert!(matches!(
            parse_image_report(Cursor::new(report)),
            Err(AnnotationError::MalformedRow { row: 1, .. })
        ));
    }

    #[test]
    fn parses_video_report() -> Result<(), AnnotationError> {
        let tracks = parse_video_report(Cursor::new(VIDEO_REPORT))?;
        assert_eq!(tracks.len(), 2);

        let fish = &tracks[0];
        assert_eq!(fish.id, 7);
        assert_eq!(fish.kind, ShapeKind::Polygon);
        assert_eq!(fish.timestamps, vec![Some(1.5), Some(3.0), None]);
        // padded to the number of timestamps
        assert_eq!(fish.points.len(), 3);
        assert!(fish.points[1].is_none() && fish.points[2].is_none());
        assert!(fish.has_points());

        let sand = &tracks[1];
        assert_eq!(sand.kind, ShapeKind::WholeFrame);
        assert!(!sand.has_points());
        assert_eq!(sand.points, vec![None, None]);
        Ok(())
    }

    #[test]
    fn rejects_extra_point_lists() {
        let report = "\
video_annotation_label_id,video_filename,shape_name,points,frames,label_name,label_hierarchy
7,v.mp4,Point,\"[[1, 1], [2, 2]]\",[1.5],Fish,Biota
";
        assert!(matches!(
            parse_video_report(Cursor::new(report)),
            Err(AnnotationError::MalformedRow { row: 1, .. })
        ));
    }

    #[test]
    fn detects_report_type() -> Result<(), AnnotationError> {
        assert_eq!(report_type_of(Cursor::new(IMAGE_REPORT))?, ReportType::Image);
        assert_eq!(report_type_of(Cursor::new(VIDEO_REPORT))?, ReportType::Video);
        assert!(matches!(
            report_type_of(Cursor::new("id,filename\n1,a.jpg\n")),
            Err(AnnotationError::UnknownReportType(c)) if c == "id"
        ));
        Ok(())
    }

    #[test]
    fn reads_report_from_file() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("report.csv");
        std::fs::write(&path, VIDEO_REPORT)?;
        assert!(matches!(read_report(&path)?, Report::Video(t) if t.len() == 2));
        Ok(())
    }

    #[test]
    fn shape_coordinate_counts() {
        assert!(Shape::from_coords(ShapeKind::Point, &[1.0]).is_err());
        assert!(Shape::from_coords(ShapeKind::Circle, &[1.0, 2.0]).is_err());
        assert!(Shape::from_coords(ShapeKind::LineString, &[1.0, 2.0]).is_err());
        assert!(Shape::from_coords(ShapeKind::Rectangle, &[0.0, 0.0, 1.0, 0.0, 1.0]).is_err());
        assert!(Shape::from_coords(ShapeKind::Point, &[f64::NAN, 1.0]).is_err());
        assert_eq!(
            Shape::from_coords(ShapeKind::WholeFrame, &[1.0]),
            Ok(Shape::WholeFrame)
        );
    }
}
