use std::io::Write;
use std::path::Path;

use super::PcdError;
use crate::pointcloud::PointCloud;

// names the reader maps to points, colors and normals
const GEOMETRY_FIELDS: [&str; 11] = [
    "x", "y", "z", "rgb", "rgba", "normal_x", "normal_y", "normal_z", "nx", "ny", "nz",
];

/// Write a point cloud to an ascii PCD file.
///
/// # Arguments
/// * `path` - Path to the `.pcd` file to create.
/// * `cloud` - The cloud to write.
///
/// Points and normals are written as 8 byte floats, colors as packed `rgb` and every scalar
/// field as an 8 byte float column.
pub fn write_pcd(path: impl AsRef<Path>, cloud: &PointCloud) -> Result<(), PcdError> {
    let path = path.as_ref();
    match path.extension() {
        Some(ext) if ext == "pcd" => {}
        ext => {
            return Err(PcdError::InvalidFileExtension(
                ext.map(|e| e.to_string_lossy().to_string())
                    .unwrap_or_default(),
            ))
        }
    }

    let file = std::fs::File::create(path)?;
    let mut writer = std::io::BufWriter::new(file);
    write_pcd_to(&mut writer, cloud)?;
    writer.flush()?;
    Ok(())
}

/// Write a point cloud as ascii PCD to a stream.
pub fn write_pcd_to<W: Write>(mut writer: W, cloud: &PointCloud) -> Result<(), PcdError> {
    for field in cloud.fields() {
        let name = field.name();
        if name.is_empty()
            || name.contains(char::is_whitespace)
            || GEOMETRY_FIELDS.contains(&name)
        {
            return Err(PcdError::UnsupportedProperty(format!("field name {name:?}")));
        }
    }

    let mut names: Vec<&str> = vec!["x", "y", "z"];
    let mut sizes = vec!["8"; 3];
    let mut types = vec!["F"; 3];
    if cloud.colors().is_some() {
        names.push("rgb");
        sizes.push("4");
        types.push("U");
    }
    if cloud.normals().is_some() {
        names.extend(["normal_x", "normal_y", "normal_z"]);
        sizes.extend(["8"; 3]);
        types.extend(["F"; 3]);
    }
    for field in cloud.fields() {
        names.push(field.name());
        sizes.push("8");
        types.push("F");
    }

    let n = cloud.len();
    writeln!(writer, "# .PCD v0.7 - Point Cloud Data file format")?;
    writeln!(writer, "VERSION 0.7")?;
    writeln!(writer, "FIELDS {}", names.join(" "))?;
    writeln!(writer, "SIZE {}", sizes.join(" "))?;
    writeln!(writer, "TYPE {}", types.join(" "))?;
    writeln!(writer, "COUNT {}", vec!["1"; names.len()].join(" "))?;
    writeln!(writer, "WIDTH {n}")?;
    writeln!(writer, "HEIGHT 1")?;
    writeln!(writer, "VIEWPOINT 0 0 0 1 0 0 0")?;
    writeln!(writer, "POINTS {n}")?;
    writeln!(writer, "DATA ascii")?;

    let mut record = String::new();
    for (i, p) in cloud.points().iter().enumerate() {
        record.clear();
        record.push_str(&format!("{} {} {}", p[0], p[1], p[2]));
        if let Some(colors) = cloud.colors() {
            let [r, g, b] = colors[i];
            let rgb = ((r as u32) << 16) | ((g as u32) << 8) | b as u32;
            record.push_str(&format!(" {rgb}"));
        }
        if let Some(normals) = cloud.normals() {
            let [nx, ny, nz] = normals[i];
            record.push_str(&format!(" {nx} {ny} {nz}"));
        }
        for field in cloud.fields() {
            record.push_str(&format!(" {}", field.values()[i]));
        }
        writeln!(writer, "{record}")?;
    }

    log::debug!(
        "wrote pcd with {n} points and {} scalar fields",
        cloud.fields().len()
    );
    Ok(())
}
