use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// File name of the reprojected points table.
pub const POINTS_TABLE: &str = "points.csv";
/// File name of the reprojected lines table.
pub const LINES_TABLE: &str = "lines.csv";
/// File name of the reprojected polygons table.
pub const POLYGONS_TABLE: &str = "polygons.csv";

/// Error types for the tables module.
#[derive(Debug, thiserror::Error)]
pub enum TableError {
    /// Failed to access a table file
    #[error("Failed to access table file")]
    Io(#[from] std::io::Error),

    /// The CSV layer failed.
    #[error("Failed to read or write CSV table")]
    Csv(#[from] csv::Error),

    /// Failed to encode a coordinate list.
    #[error("Failed to encode coordinates")]
    Json(#[from] serde_json::Error),

    /// A row of a table cannot be read back.
    #[error("Malformed table row {row}: {reason}")]
    MalformedRow {
        /// The 1-based data row, the header excluded.
        row: usize,
        /// What is wrong with the row.
        reason: String,
    },
}

/// A point or circle mapped to the surface.
#[derive(Debug, Clone, PartialEq)]
pub struct PointRecord {
    /// The surface point.
    pub point: [f64; 3],
    /// The radius in world units, `0` for points.
    pub radius: f64,
    /// The label name.
    pub label: String,
    /// The label hierarchy.
    pub label_hierarchy: String,
    /// The image name of the frame.
    pub frame: String,
    /// The annotation identifier.
    pub annotation_id: i64,
}

/// A polyline mapped to the surface.
#[derive(Debug, Clone, PartialEq)]
pub struct LineRecord {
    /// The vertices that hit the surface, in order.
    pub points: Vec<[f64; 3]>,
    /// The label name.
    pub label: String,
    /// The label hierarchy.
    pub label_hierarchy: String,
    /// The image name of the frame.
    pub frame: String,
    /// The annotation identifier.
    pub annotation_id: i64,
}

/// A polygon mapped to the surface.
#[derive(Debug, Clone, PartialEq)]
pub struct PolygonRecord {
    /// The vertices that hit the surface, in order.
    pub points: Vec<[f64; 3]>,
    /// The number of vertices that missed the surface.
    pub misses: usize,
    /// The label name.
    pub label: String,
    /// The label hierarchy.
    pub label_hierarchy: String,
    /// The image name of the frame.
    pub frame: String,
    /// The annotation identifier.
    pub annotation_id: i64,
}

/// The three reprojection tables, rows in frame then annotation order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReprojectionTables {
    /// Points and circles.
    pub points: Vec<PointRecord>,
    /// Polylines.
    pub lines: Vec<LineRecord>,
    /// Polygons, rectangles and frame bounds.
    pub polygons: Vec<PolygonRecord>,
}

impl ReprojectionTables {
    /// Append the rows of another set of tables.
    pub fn append(&mut self, other: ReprojectionTables) {
        self.points.extend(other.points);
        self.lines.extend(other.lines);
        self.polygons.extend(other.polygons);
    }

    /// The total number of rows.
    pub fn len(&self) -> usize {
        self.points.len() + self.lines.len() + self.polygons.len()
    }

    /// Whether every table is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write `points.csv`, `lines.csv` and `polygons.csv` into a directory.
    ///
    /// # Returns
    ///
    /// The paths of the three tables.
    pub fn write_csv(&self, dir: impl AsRef<Path>) -> Result<[PathBuf; 3], TableError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let paths = [
            dir.join(POINTS_TABLE),
            dir.join(LINES_TABLE),
            dir.join(POLYGONS_TABLE),
        ];

        let mut writer = csv::Writer::from_path(&paths[0])?;
        for r in &self.points {
            writer.serialize(PointRow {
                points: serde_json::to_string(&r.point)?,
                label: &r.label,
                label_hier: &r.label_hierarchy,
                filename: &r.frame,
                ann_id: r.annotation_id,
                radius: r.radius,
            })?;
        }
        write_header_if_empty(&mut writer, self.points.is_empty(), &PointRow::HEADER)?;
        writer.flush()?;

        let mut writer = csv::Writer::from_path(&paths[1])?;
        for r in &self.lines {
            writer.serialize(LineRow {
                points: serde_json::to_string(&r.points)?,
                label: &r.label,
                label_hier: &r.label_hierarchy,
                filename: &r.frame,
                ann_id: r.annotation_id,
            })?;
        }
        write_header_if_empty(&mut writer, self.lines.is_empty(), &LineRow::HEADER)?;
        writer.flush()?;

        let mut writer = csv::Writer::from_path(&paths[2])?;
        for r in &self.polygons {
            writer.serialize(PolygonRow {
                points: serde_json::to_string(&r.points)?,
                label: r.label.clone(),
                label_hier: r.label_hierarchy.clone(),
                filename: r.frame.clone(),
                ann_id: r.annotation_id,
                misses: r.misses,
            })?;
        }
        write_header_if_empty(&mut writer, self.polygons.is_empty(), &PolygonRow::HEADER)?;
        writer.flush()?;

        log::info!(
            "wrote {} points, {} lines and {} polygons to {}",
            self.points.len(),
            self.lines.len(),
            self.polygons.len(),
            dir.display()
        );

        Ok(paths)
    }
}

// serde only emits the header with the first record
fn write_header_if_empty<W: std::io::Write>(
    writer: &mut csv::Writer<W>,
    empty: bool,
    header: &[&str],
) -> Result<(), TableError> {
    if empty {
        writer.write_record(header)?;
    }
    Ok(())
}

#[derive(Serialize)]
struct PointRow<'a> {
    points: String,
    label: &'a str,
    label_hier: &'a str,
    filename: &'a str,
    ann_id: i64,
    radius: f64,
}

impl PointRow<'_> {
    const HEADER: [&'static str; 6] = ["points", "label", "label_hier", "filename", "ann_id", "radius"];
}

#[derive(Serialize)]
struct LineRow<'a> {
    points: String,
    label: &'a str,
    label_hier: &'a str,
    filename: &'a str,
    ann_id: i64,
}

impl LineRow<'_> {
    const HEADER: [&'static str; 5] = ["points", "label", "label_hier", "filename", "ann_id"];
}

#[derive(Serialize, Deserialize)]
struct PolygonRow {
    points: String,
    label: String,
    label_hier: String,
    filename: String,
    ann_id: i64,
    misses: usize,
}

impl PolygonRow {
    const HEADER: [&'static str; 6] = ["points", "label", "label_hier", "filename", "ann_id", "misses"];
}

/// Read back a `polygons.csv` table.
pub fn read_polygons_csv(path: impl AsRef<Path>) -> Result<Vec<PolygonRecord>, TableError> {
    let file = std::fs::File::open(path)?;
    parse_polygons_csv(file)
}

/// Parse a polygons table.
pub fn parse_polygons_csv<R: std::io::Read>(reader: R) -> Result<Vec<PolygonRecord>, TableError> {
    let mut reader = csv::Reader::from_reader(reader);
    let mut polygons = Vec::new();
    for (i, row) in reader.deserialize::<PolygonRow>().enumerate() {
        let malformed = |reason: String| TableError::MalformedRow { row: i + 1, reason };
        let row = row.map_err(|e| malformed(e.to_string()))?;
        let points: Vec<[f64; 3]> =
            serde_json::from_str(&row.points).map_err(|e| malformed(e.to_string()))?;
        polygons.push(PolygonRecord {
            points,
            misses: row.misses,
            label: row.label,
            label_hierarchy: row.label_hier,
            frame: row.filename,
            annotation_id: row.ann_id,
        });
    }
    Ok(polygons)
}

/// Summary statistics of one scalar field inside an annotation volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    /// The scalar field name.
    pub metrics_name: String,
    /// The mean.
    pub mean: f64,
    /// The sample standard deviation.
    pub sd: f64,
    /// The median.
    pub median: f64,
    /// The first quartile.
    pub q1: f64,
    /// The third quartile.
    pub q3: f64,
    /// The annotation or track identifier.
    pub track: i64,
    /// The frame of a single polygon, empty for tracks.
    pub frame: Option<String>,
}

/// Which summary table a file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryKind {
    /// One block of rows per individual polygon.
    Polygons,
    /// One block of rows per annotation track.
    Tracks,
}

/// The path of a summary table, `<cloud>_<report>_poly_sum.csv` or `..._track_sum.csv`.
pub fn summary_path(dir: impl AsRef<Path>, cloud: &str, report: &str, kind: SummaryKind) -> PathBuf {
    let suffix = match kind {
        SummaryKind::Polygons => "poly_sum",
        SummaryKind::Tracks => "track_sum",
    };
    dir.as_ref().join(format!("{cloud}_{report}_{suffix}.csv"))
}

/// Write summary rows to a CSV file.
pub fn write_summary_csv(path: impl AsRef<Path>, rows: &[MetricSummary]) -> Result<(), TableError> {
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    write_header_if_empty(
        &mut writer,
        rows.is_empty(),
        &["metrics_name", "mean", "sd", "median", "q1", "q3", "track", "frame"],
    )?;
    writer.flush()?;
    Ok(())
}
