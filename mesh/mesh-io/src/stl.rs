//! STL (Stereolithography) file format support.
//!
//! Supports both ASCII and binary STL formats. STL stores an unindexed
//! triangle soup: every facet gets three fresh vertices, so loaded meshes
//! must be welded before any topological use.
//!
//! # Format Detection
//!
//! - ASCII files start with "solid" (after optional whitespace) and contain
//!   no NUL bytes in the first 80 bytes
//! - Binary files have an 80-byte header followed by a face count, and the
//!   file length equals `84 + 50 * count`
//!
//! # Binary Format
//!
//! ```text
//! UINT8[80]    – Header (ignored)
//! UINT32       – Number of triangles
//! foreach triangle
//!     REAL32[3] – Normal vector (ignored on load)
//!     REAL32[3] – Vertex 1
//!     REAL32[3] – Vertex 2
//!     REAL32[3] – Vertex 3
//!     UINT16    – Attribute byte count
//! end
//! ```

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use mesh_types::{IndexedMesh, Point3, Vertex};

use crate::error::{open_file, IoError, IoResult};

/// STL binary header size in bytes.
const HEADER_SIZE: usize = 80;

/// Size of one triangle in binary STL (normal + 3 vertices + attribute).
const TRIANGLE_SIZE: usize = 50;

/// Load a mesh from an STL file.
///
/// Automatically detects ASCII vs binary format.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not valid STL.
///
/// # Example
///
/// ```no_run
/// use mesh_io::load_stl;
///
/// let mesh = load_stl("cell01.stl")?;
/// println!("Loaded {} facets", mesh.faces.len());
/// # Ok::<(), mesh_io::IoError>(())
/// ```
pub fn load_stl<P: AsRef<Path>>(path: P) -> IoResult<IndexedMesh> {
    let path = path.as_ref();
    let mut bytes = Vec::new();
    open_file(path)?.read_to_end(&mut bytes)?;
    parse_stl(&bytes)
}

/// Parse STL content already held in memory.
///
/// # Errors
///
/// Returns an error if the content is not valid STL.
pub fn parse_stl(bytes: &[u8]) -> IoResult<IndexedMesh> {
    if bytes.len() < 6 {
        return Err(IoError::invalid_content("file too small to be valid STL"));
    }

    let head = &bytes[..bytes.len().min(HEADER_SIZE)];
    let looks_ascii = String::from_utf8_lossy(head).trim_start().starts_with("solid");
    if looks_ascii && !is_binary_stl(bytes) {
        load_stl_ascii(BufReader::new(bytes))
    } else {
        load_stl_binary(bytes)
    }
}

/// Some binary STLs start their header with "solid"; NUL bytes in the header
/// or a length matching the declared face count give them away.
fn is_binary_stl(bytes: &[u8]) -> bool {
    if bytes.len() < HEADER_SIZE + 4 {
        return false;
    }
    if bytes[..HEADER_SIZE].contains(&0) {
        return true;
    }
    let count = face_count(bytes);
    bytes.len() == HEADER_SIZE + 4 + count as usize * TRIANGLE_SIZE
}

fn face_count(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([
        bytes[HEADER_SIZE],
        bytes[HEADER_SIZE + 1],
        bytes[HEADER_SIZE + 2],
        bytes[HEADER_SIZE + 3],
    ])
}

fn load_stl_binary(bytes: &[u8]) -> IoResult<IndexedMesh> {
    if bytes.len() < HEADER_SIZE + 4 {
        return Err(IoError::InvalidHeader {
            expected: HEADER_SIZE + 4,
            got: bytes.len(),
        });
    }

    let count = face_count(bytes);
    let body = &bytes[HEADER_SIZE + 4..];
    let available = body.len() / TRIANGLE_SIZE;
    if available < count as usize {
        #[allow(clippy::cast_possible_truncation)]
        let got = available as u32;
        return Err(IoError::InvalidFaceCount {
            expected: count,
            got,
        });
    }

    let mut mesh = IndexedMesh::with_capacity(count as usize * 3, count as usize);
    for facet in body.chunks_exact(TRIANGLE_SIZE).take(count as usize) {
        #[allow(clippy::cast_possible_truncation)]
        let base = mesh.vertices.len() as u32;
        // Skip the 12-byte normal.
        for offset in [12, 24, 36] {
            mesh.vertices.push(read_vertex(&facet[offset..offset + 12]));
        }
        mesh.faces.push([base, base + 1, base + 2]);
    }
    Ok(mesh)
}

fn read_vertex(buf: &[u8]) -> Vertex {
    let f = |i: usize| f64::from(f32::from_le_bytes([buf[i], buf[i + 1], buf[i + 2], buf[i + 3]]));
    Vertex::from_coords(f(0), f(4), f(8))
}

fn load_stl_ascii<R: BufRead>(reader: R) -> IoResult<IndexedMesh> {
    let mut mesh = IndexedMesh::new();
    let mut in_loop = false;
    let mut corners: Vec<Vertex> = Vec::with_capacity(3);

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let mut parts = line.split_whitespace();
        let Some(keyword) = parts.next() else {
            continue;
        };

        match keyword.to_ascii_lowercase().as_str() {
            "outer" => {
                in_loop = true;
                corners.clear();
            }
            "vertex" if in_loop => {
                let mut coord = || -> IoResult<f64> {
                    parts
                        .next()
                        .ok_or_else(|| {
                            IoError::invalid_content(format!("line {}: vertex needs 3 coordinates", line_no + 1))
                        })?
                        .parse::<f64>()
                        .map_err(IoError::from)
                };
                let (x, y, z) = (coord()?, coord()?, coord()?);
                corners.push(Vertex::from_coords(x, y, z));
            }
            "endloop" => in_loop = false,
            "endfacet" => {
                if corners.len() != 3 {
                    return Err(IoError::invalid_content(format!(
                        "line {}: facet has {} vertices, expected 3",
                        line_no + 1,
                        corners.len()
                    )));
                }
                #[allow(clippy::cast_possible_truncation)]
                let base = mesh.vertices.len() as u32;
                mesh.vertices.append(&mut corners);
                mesh.faces.push([base, base + 1, base + 2]);
            }
            "endsolid" => break,
            _ => {}
        }
    }

    Ok(mesh)
}

/// Save a mesh to an STL file.
///
/// # Errors
///
/// Returns an error if the file cannot be written or a face references a
/// missing vertex.
pub fn save_stl<P: AsRef<Path>>(mesh: &IndexedMesh, path: P, binary: bool) -> IoResult<()> {
    let writer = BufWriter::new(File::create(path)?);
    if binary {
        save_stl_binary(mesh, writer)
    } else {
        save_stl_ascii(mesh, writer)
    }
}

fn facets(mesh: &IndexedMesh) -> IoResult<Vec<[Point3<f64>; 3]>> {
    mesh.faces
        .iter()
        .enumerate()
        .map(|(i, _)| {
            mesh.triangle(i)
                .map(|t| [t.v0, t.v1, t.v2])
                .ok_or_else(|| IoError::invalid_content(format!("face {i} references a missing vertex")))
        })
        .collect()
}

fn unit_normal(tri: &[Point3<f64>; 3]) -> [f64; 3] {
    let n = (tri[1] - tri[0]).cross(&(tri[2] - tri[0]));
    let len = n.norm();
    if len > f64::EPSILON {
        [n.x / len, n.y / len, n.z / len]
    } else {
        [0.0; 3]
    }
}

fn save_stl_binary<W: Write>(mesh: &IndexedMesh, mut writer: W) -> IoResult<()> {
    let facets = facets(mesh)?;

    let mut header = [b' '; HEADER_SIZE];
    let text = b"binary STL written by mesh-io";
    header[..text.len()].copy_from_slice(text);
    writer.write_all(&header)?;

    #[allow(clippy::cast_possible_truncation)]
    let count = facets.len() as u32;
    writer.write_all(&count.to_le_bytes())?;

    for tri in &facets {
        let n = unit_normal(tri);
        write_f32s(&mut writer, n)?;
        for p in tri {
            write_f32s(&mut writer, [p.x, p.y, p.z])?;
        }
        writer.write_all(&0u16.to_le_bytes())?;
    }
    writer.flush()?;
    Ok(())
}

fn write_f32s<W: Write>(writer: &mut W, values: [f64; 3]) -> IoResult<()> {
    for v in values {
        #[allow(clippy::cast_possible_truncation)]
        let v = v as f32;
        writer.write_all(&v.to_le_bytes())?;
    }
    Ok(())
}

fn save_stl_ascii<W: Write>(mesh: &IndexedMesh, mut writer: W) -> IoResult<()> {
    let facets = facets(mesh)?;
    writeln!(writer, "solid mesh")?;
    for tri in &facets {
        let [nx, ny, nz] = unit_normal(tri);
        writeln!(writer, "  facet normal {nx:.6e} {ny:.6e} {nz:.6e}")?;
        writeln!(writer, "    outer loop")?;
        for p in tri {
            writeln!(writer, "      vertex {:.9e} {:.9e} {:.9e}", p.x, p.y, p.z)?;
        }
        writeln!(writer, "    endloop")?;
        writeln!(writer, "  endfacet")?;
    }
    writeln!(writer, "endsolid mesh")?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use mesh_types::unit_cube;

    fn create_test_triangle() -> IndexedMesh {
        IndexedMesh::from_parts(
            vec![
                Vertex::from_coords(0.0, 0.0, 0.0),
                Vertex::from_coords(1.0, 0.0, 0.0),
                Vertex::from_coords(0.0, 1.0, 0.0),
            ],
            vec![[0, 1, 2]],
        )
    }

    #[test]
    fn roundtrip_binary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cube.stl");
        save_stl(&unit_cube(), &path, true).unwrap();

        let loaded = load_stl(&path).unwrap();
        assert_eq!(loaded.face_count(), 12);
        // Triangle soup: no sharing across facets.
        assert_eq!(loaded.vertex_count(), 36);
        assert!((loaded.signed_volume() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn roundtrip_ascii() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tri.stl");
        save_stl(&create_test_triangle(), &path, false).unwrap();

        let loaded = load_stl(&path).unwrap();
        assert_eq!(loaded.face_count(), 1);
        assert!((loaded.vertices[1].position.x - 1.0).abs() < 1e-9);
    }

    #[test]
    fn binary_header_starting_with_solid() {
        let mut bytes = Vec::new();
        save_stl_binary(&create_test_triangle(), &mut bytes).unwrap();
        bytes[..5].copy_from_slice(b"solid");
        let mesh = parse_stl(&bytes).unwrap();
        assert_eq!(mesh.face_count(), 1);
    }

    #[test]
    fn truncated_binary_is_rejected() {
        let mut bytes = Vec::new();
        save_stl_binary(&unit_cube(), &mut bytes).unwrap();
        bytes.truncate(bytes.len() - 10);
        assert!(matches!(
            parse_stl(&bytes),
            Err(IoError::InvalidFaceCount { expected: 12, got: 11 })
        ));
    }

    #[test]
    fn load_nonexistent_file() {
        let result = load_stl("nonexistent_file_12345.stl");
        assert!(matches!(result, Err(IoError::FileNotFound { .. })));
    }

    #[test]
    fn ascii_stl_parsing() {
        let ascii_stl = b"solid test
  facet normal 0 0 1
    outer loop
      vertex 0 0 0
      vertex 1 0 0
      vertex 0 1 0
    endloop
  endfacet
endsolid test";

        let mesh = parse_stl(ascii_stl).unwrap();
        assert_eq!(mesh.face_count(), 1);
        assert_eq!(mesh.vertex_count(), 3);
    }

    #[test]
    fn ascii_facet_with_missing_vertex() {
        let ascii_stl = b"solid bad
  facet normal 0 0 1
    outer loop
      vertex 0 0 0
      vertex 1 0 0
    endloop
  endfacet
endsolid bad";
        assert!(matches!(parse_stl(ascii_stl), Err(IoError::InvalidContent { .. })));
    }

    #[test]
    fn bad_face_index_fails_to_save() {
        let mesh = IndexedMesh::from_parts(vec![Vertex::from_coords(0.0, 0.0, 0.0)], vec![[0, 1, 2]]);
        let mut out = Vec::new();
        assert!(save_stl_binary(&mesh, &mut out).is_err());
    }
}
