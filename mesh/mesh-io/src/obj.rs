//! Wavefront OBJ support (geometry only).
//!
//! Only `v` and `f` records are read. Face corners may use the
//! `v`, `v/vt`, `v//vn` and `v/vt/vn` forms; texture and normal references
//! are ignored. Polygons with more than three corners are fan-triangulated
//! around their first corner, and negative (relative) indices are resolved
//! against the vertices read so far.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use mesh_types::{IndexedMesh, Vertex};

use crate::error::{open_file, IoError, IoResult};

/// Load a mesh from an OBJ file.
///
/// # Errors
///
/// Returns an error if the file cannot be read, a record is malformed, or a
/// face references a vertex that does not exist.
pub fn load_obj<P: AsRef<Path>>(path: P) -> IoResult<IndexedMesh> {
    parse_obj(BufReader::new(open_file(path.as_ref())?))
}

/// Parse OBJ content from any buffered reader.
///
/// # Errors
///
/// See [`load_obj`].
pub fn parse_obj<R: BufRead>(reader: R) -> IoResult<IndexedMesh> {
    let mut mesh = IndexedMesh::new();
    let mut corners: Vec<u32> = Vec::with_capacity(8);

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let content = line.split('#').next().unwrap_or_default();
        let mut parts = content.split_whitespace();
        match parts.next() {
            Some("v") => {
                let coords = parts
                    .take(3)
                    .map(str::parse::<f64>)
                    .collect::<Result<Vec<_>, _>>()?;
                if coords.len() != 3 {
                    return Err(IoError::invalid_content(format!(
                        "line {}: vertex needs 3 coordinates",
                        line_no + 1
                    )));
                }
                mesh.vertices.push(Vertex::from_coords(coords[0], coords[1], coords[2]));
            }
            Some("f") => {
                corners.clear();
                for token in parts {
                    corners.push(resolve_index(token, mesh.vertices.len(), line_no + 1)?);
                }
                if corners.len() < 3 {
                    return Err(IoError::invalid_content(format!(
                        "line {}: face needs at least 3 corners",
                        line_no + 1
                    )));
                }
                for k in 1..corners.len() - 1 {
                    mesh.faces.push([corners[0], corners[k], corners[k + 1]]);
                }
            }
            _ => {}
        }
    }

    Ok(mesh)
}

fn resolve_index(token: &str, vertex_count: usize, line: usize) -> IoResult<u32> {
    let raw: i64 = token.split('/').next().unwrap_or_default().parse()?;
    #[allow(clippy::cast_possible_wrap)]
    let count = vertex_count as i64;
    let zero_based = match raw {
        r if r > 0 => r - 1,
        r if r < 0 => count + r,
        _ => -1,
    };
    if zero_based < 0 || zero_based >= count {
        return Err(IoError::invalid_content(format!(
            "line {line}: face index {raw} out of range for {vertex_count} vertices"
        )));
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Ok(zero_based as u32)
}

/// Save a mesh as OBJ.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn save_obj<P: AsRef<Path>>(mesh: &IndexedMesh, path: P) -> IoResult<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    for v in &mesh.vertices {
        let p = v.position;
        writeln!(writer, "v {:.12} {:.12} {:.12}", p.x, p.y, p.z)?;
    }
    for [a, b, c] in &mesh.faces {
        writeln!(writer, "f {} {} {}", a + 1, b + 1, c + 1)?;
    }
    writer.flush()?;
    Ok(())
}
