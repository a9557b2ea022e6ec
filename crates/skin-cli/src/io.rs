//! Text point clouds in, Wavefront OBJ and XYZ out.
//!
//! Point files hold one sample per line: `x y z` or `x y z r g b` with
//! channels in 0-255, separated by whitespace or commas. `#` starts a
//! comment. Blank and malformed lines are skipped with a warning.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use nalgebra::{Point3, Vector3};
use skin_recon::{Mesh, Sample, VertexColor};
use tracing::{debug, info, warn};

/// Samples read from a point file.
#[derive(Debug, Clone, Default)]
pub struct PointCloud {
    pub samples: Vec<Sample>,
    /// Non-comment lines that could not be parsed.
    pub skipped: usize,
}

impl PointCloud {
    pub fn has_colors(&self) -> bool {
        self.samples.iter().any(|s| s.color.is_some())
    }

    pub fn positions(&self) -> Vec<Point3<f64>> {
        self.samples.iter().map(|s| s.position).collect()
    }
}

/// Read a point file from disk.
pub fn read_points(path: &Path) -> Result<PointCloud> {
    let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    let cloud = parse_points(BufReader::new(file))
        .with_context(|| format!("Failed to read points from {:?}", path))?;
    info!(
        path = %path.display(),
        points = cloud.samples.len(),
        skipped = cloud.skipped,
        "Loaded point cloud"
    );
    Ok(cloud)
}

/// Parse point lines from any reader.
pub fn parse_points(reader: impl BufRead) -> Result<PointCloud> {
    let mut cloud = PointCloud::default();
    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        let content = line.split('#').next().unwrap_or("").trim();
        if content.is_empty() {
            continue;
        }
        match parse_line(content) {
            Some(sample) => cloud.samples.push(sample),
            None => {
                warn!(line = number + 1, content, "Skipping malformed point line");
                cloud.skipped += 1;
            }
        }
    }
    Ok(cloud)
}

fn parse_line(content: &str) -> Option<Sample> {
    let fields: Vec<f64> = content
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|f| !f.is_empty())
        .map(str::parse)
        .collect::<Result<_, _>>()
        .ok()?;

    match fields.as_slice() {
        [x, y, z] => Some(Sample::new(*x, *y, *z)),
        [x, y, z, r, g, b, ..] => Some(Sample::with_color(
            *x,
            *y,
            *z,
            VertexColor::from_channels(*r, *g, *b),
        )),
        _ => None,
    }
}

/// Write a mesh as Wavefront OBJ.
///
/// Colors go on the vertex line as `v x y z r g b` with channels in
/// [0, 1]; normals are written as `vn` and referenced by the faces.
pub fn write_obj(mesh: &Mesh, path: &Path) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
    let mut writer = BufWriter::new(file);
    write_obj_to(mesh, &mut writer).with_context(|| format!("Failed to write {:?}", path))?;
    writer.flush()?;
    debug!(path = %path.display(), "Saved OBJ");
    Ok(())
}

pub fn write_obj_to(mesh: &Mesh, writer: &mut impl Write) -> std::io::Result<()> {
    writeln!(writer, "# OBJ file exported by skin")?;
    writeln!(writer, "# Vertices: {}", mesh.vertex_count())?;
    writeln!(writer, "# Faces: {}", mesh.face_count())?;
    writeln!(writer)?;

    for v in &mesh.vertices {
        let p = v.position;
        match v.color {
            Some(color) => {
                let (r, g, b) = color.to_float();
                writeln!(
                    writer,
                    "v {:.6} {:.6} {:.6} {:.4} {:.4} {:.4}",
                    p.x, p.y, p.z, r, g, b
                )?;
            }
            None => writeln!(writer, "v {:.6} {:.6} {:.6}", p.x, p.y, p.z)?,
        }
    }

    // One `vn` per vertex keeps normal indices equal to vertex indices.
    // Vertices without a normal are not referenced by any faces.
    let normals = mesh.has_normals();
    if normals {
        for v in &mesh.vertices {
            let n = v.normal.unwrap_or_else(Vector3::zeros);
            writeln!(writer, "vn {:.6} {:.6} {:.6}", n.x, n.y, n.z)?;
        }
    }

    for [a, b, c] in &mesh.faces {
        let (a, b, c) = (a + 1, b + 1, c + 1);
        if normals {
            writeln!(writer, "f {a}//{a} {b}//{b} {c}//{c}")?;
        } else {
            writeln!(writer, "f {a} {b} {c}")?;
        }
    }
    Ok(())
}

/// Write points as `x y z` lines.
pub fn write_points(points: &[Point3<f64>], path: &Path) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
    let mut writer = BufWriter::new(file);
    for p in points {
        writeln!(writer, "{:.6} {:.6} {:.6}", p.x, p.y, p.z)
            .with_context(|| format!("Failed to write {:?}", path))?;
    }
    writer.flush()?;
    debug!(path = %path.display(), points = points.len(), "Saved points");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use skin_recon::Vertex;

    #[test]
    fn test_parse_points_skips_noise() {
        let text = "\
# header
0 0 1
1.5, 2.5, 3.5

1 2 3 255 0 128  # colored
not a point
4 5
";
        let cloud = parse_points(text.as_bytes()).unwrap();
        assert_eq!(cloud.samples.len(), 3);
        assert_eq!(cloud.skipped, 2);
        assert_eq!(cloud.samples[1].position, Point3::new(1.5, 2.5, 3.5));
        assert_eq!(cloud.samples[2].color, Some(VertexColor::new(255, 0, 128)));
        assert!(cloud.has_colors());
    }

    #[test]
    fn test_obj_output() {
        let mut mesh = Mesh::new();
        for (x, y) in [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0)] {
            let mut v = Vertex::with_color(Point3::new(x, y, 0.0), VertexColor::new(255, 0, 0));
            v.normal = Some(nalgebra::Vector3::z());
            mesh.vertices.push(v);
        }
        mesh.faces.push([0, 1, 2]);

        let mut buf = Vec::new();
        write_obj_to(&mesh, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("v 1.000000 0.000000 0.000000 1.0000 0.0000 0.0000"));
        assert_eq!(text.lines().filter(|l| l.starts_with("vn ")).count(), 3);
        assert!(text.contains("f 1//1 2//2 3//3"));
    }

    #[test]
    fn test_obj_normals_indexed_by_vertex() {
        let mut mesh = Mesh::new();
        for (x, y) in [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (5.0, 5.0)] {
            mesh.vertices.push(Vertex::new(Point3::new(x, y, 0.0)));
        }
        for v in &mut mesh.vertices[..3] {
            v.normal = Some(nalgebra::Vector3::z());
        }
        mesh.faces.push([0, 1, 2]);

        let mut buf = Vec::new();
        write_obj_to(&mesh, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.lines().filter(|l| l.starts_with("vn ")).count(), 4);
        assert!(text.contains("vn 0.000000 0.000000 0.000000"));
        assert!(text.contains("f 1//1 2//2 3//3"));
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("points.xyz");
        let points = vec![Point3::new(1.0, 2.0, 3.0), Point3::new(-4.0, 0.5, 0.25)];
        write_points(&points, &path).unwrap();

        let cloud = read_points(&path).unwrap();
        assert_eq!(cloud.positions(), points);
        assert!(!cloud.has_colors());
    }
}
