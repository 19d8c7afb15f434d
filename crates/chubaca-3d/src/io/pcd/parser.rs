use std::io::BufRead;
use std::path::Path;

use crate::pointcloud::{PointCloud, PointCloudError};

const MAX_POINT_STEP: usize = 4096;
const MAX_POINTS: usize = 200_000_000;

/// Error types for the PCD module.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum PcdError {
    /// Failed to read PCD file
    #[error("Failed to read PCD file")]
    Io(#[from] std::io::Error),

    /// Unsupported header
    #[error("Unsupported PCD header: {0}")]
    UnsupportedProperty(String),

    /// Malformed PCD header
    #[error("Malformed PCD header")]
    MalformedHeader,

    /// Malformed ascii record
    #[error("Malformed PCD record {0}")]
    MalformedRecord(usize),

    /// Invalid PCD file extension
    #[error("Invalid PCD file extension. Got:{0}")]
    InvalidFileExtension(String),

    /// The fields do not form a valid cloud.
    #[error(transparent)]
    PointCloud(#[from] PointCloudError),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum PcdEncoding {
    Ascii,
    Binary,
}

/// Describes a single field in a PCD point record
#[derive(Debug)]
struct PcdField {
    name: String,
    offset: usize, // byte offset within a point
    size: usize,   // size of one element (bytes)
    count: usize,  // number of elements
    kind: char,    // PCD type: 'F' = float, 'U' = unsigned int, 'I' = signed int
}

impl PcdField {
    // names of the scalar columns this field expands to
    fn column_names(&self) -> Vec<String> {
        if self.count == 1 {
            vec![self.name.clone()]
        } else {
            (0..self.count).map(|k| format!("{}_{k}", self.name)).collect()
        }
    }

    fn decode(&self, buf: &[u8], k: usize) -> Result<f64, PcdError> {
        let start = self.offset + k * self.size;
        let bytes = buf
            .get(start..start + self.size)
            .ok_or(PcdError::MalformedHeader)?;
        let mut raw = [0u8; 8];
        raw[..self.size].copy_from_slice(bytes);
        let value = match (self.kind, self.size) {
            ('F', 4) => f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as f64,
            ('F', 8) => f64::from_le_bytes(raw),
            ('U', 1) => raw[0] as f64,
            ('U', 2) => u16::from_le_bytes([raw[0], raw[1]]) as f64,
            ('U', 4) => u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as f64,
            ('U', 8) => u64::from_le_bytes(raw) as f64,
            ('I', 1) => raw[0] as i8 as f64,
            ('I', 2) => i16::from_le_bytes([raw[0], raw[1]]) as f64,
            ('I', 4) => i32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as f64,
            ('I', 8) => i64::from_le_bytes(raw) as f64,
            (kind, size) => {
                return Err(PcdError::UnsupportedProperty(format!(
                    "{} with type {kind} and size {size}",
                    self.name
                )))
            }
        };
        Ok(value)
    }
}

#[derive(Debug)]
struct PcdLayout {
    fields: Vec<PcdField>,
    point_step: usize, // total bytes per point
    num_points: usize, // number of points
    encoding: PcdEncoding,
}

impl PcdLayout {
    fn field(&self, name: &str) -> Option<&PcdField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

fn parse_pcd_layout<R: BufRead>(reader: &mut R) -> Result<PcdLayout, PcdError> {
    let mut field_names: Vec<String> = Vec::new();
    let mut sizes = Vec::new();
    let mut types = Vec::new();
    let mut counts = Vec::new();
    let mut points = None;
    let mut width_height = (0usize, 1usize);
    let invalid = |token: &str| PcdError::UnsupportedProperty(token.to_string());

    let encoding = loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line)?;
        if n == 0 {
            return Err(PcdError::MalformedHeader);
        }
        let line = line.trim();

        if let Some(kind) = line.strip_prefix("DATA") {
            match kind.trim() {
                "ascii" => break PcdEncoding::Ascii,
                "binary" => break PcdEncoding::Binary,
                other => return Err(invalid(other)),
            }
        }

        let mut it = line.split_whitespace();
        match it.next() {
            Some("SIZE") => {
                sizes = it
                    .map(|v| v.parse::<usize>().map_err(|_| invalid(v)))
                    .collect::<Result<Vec<_>, _>>()?;
            }
            Some("TYPE") => {
                types = it
                    .map(|v| v.chars().next().ok_or_else(|| invalid(v)))
                    .collect::<Result<Vec<_>, _>>()?;
            }
            Some("COUNT") => {
                counts = it
                    .map(|v| v.parse::<usize>().map_err(|_| invalid(v)))
                    .collect::<Result<Vec<_>, _>>()?;
            }
            Some("POINTS") => {
                let token = it.next().ok_or(PcdError::MalformedHeader)?;
                points = Some(token.parse::<usize>().map_err(|_| invalid(token))?);
            }
            Some("WIDTH") => {
                let token = it.next().ok_or(PcdError::MalformedHeader)?;
                width_height.0 = token.parse::<usize>().map_err(|_| invalid(token))?;
            }
            Some("HEIGHT") => {
                let token = it.next().ok_or(PcdError::MalformedHeader)?;
                width_height.1 = token.parse::<usize>().map_err(|_| invalid(token))?;
            }
            Some("FIELDS") => field_names = it.map(String::from).collect(),
            _ => {}
        }
    };

    if field_names.is_empty()
        || sizes.len() != field_names.len()
        || types.len() != field_names.len()
        || (!counts.is_empty() && counts.len() != field_names.len())
    {
        return Err(PcdError::MalformedHeader);
    }

    // Compute byte offsets for each field
    let mut offset = 0usize;
    let mut fields: Vec<PcdField> = Vec::with_capacity(field_names.len());

    for (i, name) in field_names.iter().enumerate() {
        // a missing COUNT line means one element per field
        let count = counts.get(i).copied().unwrap_or(1);
        let size = sizes[i];
        if !matches!(size, 1 | 2 | 4 | 8) || count == 0 {
            return Err(PcdError::MalformedHeader);
        }

        if fields.iter().any(|f| f.name == *name && name != "_") {
            return Err(PcdError::MalformedHeader);
        }
        fields.push(PcdField {
            name: name.clone(),
            offset,
            size,
            count,
            kind: types[i],
        });

        offset = size
            .checked_mul(count)
            .and_then(|bytes| offset.checked_add(bytes))
            .ok_or(PcdError::MalformedHeader)?;
        if offset > MAX_POINT_STEP {
            return Err(PcdError::MalformedHeader);
        }
    }

    let num_points = points.unwrap_or(width_height.0 * width_height.1);

    Ok(PcdLayout {
        fields,
        point_step: offset,
        num_points,
        encoding,
    })
}

/// Read a PCD file with `ascii` or `binary` data.
///
/// # Arguments
/// * `path` - Path to a `.pcd` file.
///
/// # Returns
/// A [`PointCloud`] containing:
/// - 3D points (always)
/// - RGB colors (if present)
/// - Normals (if present)
/// - One scalar field per remaining column. Fields with a count greater than one are split
///   into `name_0`, `name_1`, ... and padding fields named `_` are skipped.
pub fn read_pcd(path: impl AsRef<Path>) -> Result<PointCloud, PcdError> {
    let Some(file_ext) = path.as_ref().extension() else {
        return Err(PcdError::InvalidFileExtension("".into()));
    };

    if file_ext != "pcd" {
        return Err(PcdError::InvalidFileExtension(
            file_ext.to_string_lossy().to_string(),
        ));
    }

    let file = std::fs::File::open(path)?;
    parse_pcd(std::io::BufReader::new(file))
}

/// Parse a PCD stream into a point cloud.
pub fn parse_pcd<R: BufRead>(mut reader: R) -> Result<PointCloud, PcdError> {
    let layout = parse_pcd_layout(&mut reader)?;

    if layout.num_points > MAX_POINTS {
        return Err(PcdError::MalformedHeader);
    }

    // Required fields
    let xyz = ["x", "y", "z"]
        .map(|name| layout.field(name).filter(|f| f.count == 1));
    let [Some(fx), Some(fy), Some(fz)] = xyz else {
        return Err(PcdError::UnsupportedProperty("missing x y z fields".to_string()));
    };

    // Optional fields
    let frgb = layout
        .field("rgb")
        .or_else(|| layout.field("rgba"))
        .filter(|f| f.size == 4 && f.count == 1);
    let normal_fields = [("normal_x", "nx"), ("normal_y", "ny"), ("normal_z", "nz")]
        .map(|(long, short)| layout.field(long).or_else(|| layout.field(short)));
    let fnormals = match normal_fields {
        [Some(nx), Some(ny), Some(nz)] => Some([nx, ny, nz]),
        _ => None,
    };

    let is_special = |f: &PcdField| {
        std::ptr::eq(f, fx)
            || std::ptr::eq(f, fy)
            || std::ptr::eq(f, fz)
            || frgb.is_some_and(|c| std::ptr::eq(f, c))
            || fnormals.is_some_and(|n| n.iter().any(|c| std::ptr::eq(f, *c)))
            || f.name == "_"
    };
    let scalar_fields: Vec<&PcdField> = layout.fields.iter().filter(|f| !is_special(*f)).collect();

    let mut points = Vec::with_capacity(layout.num_points);
    let mut colors = Vec::new();
    let mut normals = Vec::new();
    let mut columns: Vec<Vec<f64>> = scalar_fields
        .iter()
        .flat_map(|f| f.column_names())
        .map(|_| Vec::with_capacity(layout.num_points))
        .collect();

    let mut buffer = vec![0u8; layout.point_step];
    let mut line = String::new();

    for record in 0..layout.num_points {
        match layout.encoding {
            PcdEncoding::Binary => reader.read_exact(&mut buffer)?,
            PcdEncoding::Ascii => {
                line.clear();
                if reader.read_line(&mut line)? == 0 {
                    return Err(PcdError::MalformedRecord(record));
                }
                encode_ascii_record(&layout, &line, &mut buffer)
                    .ok_or(PcdError::MalformedRecord(record))?;
            }
        }

        points.push([
            fx.decode(&buffer, 0)?,
            fy.decode(&buffer, 0)?,
            fz.decode(&buffer, 0)?,
        ]);

        if let Some(f) = frgb {
            let rgb = buffer
                .get(f.offset..f.offset + 4)
                .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .ok_or(PcdError::MalformedHeader)?;
            colors.push([
                ((rgb >> 16) & 0xFF) as u8,
                ((rgb >> 8) & 0xFF) as u8,
                (rgb & 0xFF) as u8,
            ]);
        }

        if let Some([nx, ny, nz]) = fnormals {
            normals.push([
                nx.decode(&buffer, 0)?,
                ny.decode(&buffer, 0)?,
                nz.decode(&buffer, 0)?,
            ]);
        }

        let mut column = 0;
        for f in &scalar_fields {
            for k in 0..f.count {
                columns[column].push(f.decode(&buffer, k)?);
                column += 1;
            }
        }
    }

    let mut cloud = PointCloud::new(
        points,
        frgb.is_some().then_some(colors),
        fnormals.is_some().then_some(normals),
    );
    let names = scalar_fields.iter().flat_map(|f| f.column_names());
    for (name, values) in names.zip(columns) {
        cloud.add_field(&name, values)?;
    }

    log::debug!(
        "parsed pcd with {} points and {} scalar fields",
        cloud.len(),
        cloud.fields().len()
    );

    Ok(cloud)
}

// Re-encode an ascii record into the binary layout so both encodings share the decoder.
fn encode_ascii_record(layout: &PcdLayout, line: &str, buffer: &mut [u8]) -> Option<()> {
    let mut tokens = line.split_whitespace();
    for field in &layout.fields {
        for k in 0..field.count {
            let token = tokens.next()?;
            let start = field.offset + k * field.size;
            let dst = buffer.get_mut(start..start + field.size)?;
            match (field.kind, field.size) {
                ('F', 4) => dst.copy_from_slice(&token.parse::<f32>().ok()?.to_le_bytes()),
                ('F', 8) => dst.copy_from_slice(&token.parse::<f64>().ok()?.to_le_bytes()),
                ('U', _) => {
                    // packed rgb values are sometimes written as floats
                    let v = token
                        .parse::<u64>()
                        .ok()
                        .or_else(|| token.parse::<f32>().ok().map(|f| f.to_bits() as u64))?;
                    dst.copy_from_slice(&v.to_le_bytes()[..field.size]);
                }
                ('I', _) => {
                    let v = token.parse::<i64>().ok()?;
                    dst.copy_from_slice(&v.to_le_bytes()[..field.size]);
                }
                _ => return None,
            }
        }
    }
    Some(())
}
