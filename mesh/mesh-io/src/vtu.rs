//! VTK XML unstructured grid (`.vtu`) writer for tetrahedral meshes.
//!
//! Files are written in ASCII encoding so they stay diff-able and need no
//! base64/compression support. Tetrahedra use VTK cell type 10.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use mesh_types::{TetMesh, Vector3};

use crate::error::{IoError, IoResult};

/// VTK cell type id for a linear tetrahedron.
const VTK_TETRA: u8 = 10;

/// Values attached to every node of a mesh.
#[derive(Debug, Clone, Copy)]
pub enum FieldData<'a> {
    /// One scalar per node.
    Scalar(&'a [f64]),
    /// One 3-vector per node.
    Vector(&'a [Vector3<f64>]),
}

impl FieldData<'_> {
    fn len(&self) -> usize {
        match self {
            Self::Scalar(v) => v.len(),
            Self::Vector(v) => v.len(),
        }
    }

    const fn components(&self) -> usize {
        match self {
            Self::Scalar(_) => 1,
            Self::Vector(_) => 3,
        }
    }
}

/// A named node field.
#[derive(Debug, Clone, Copy)]
pub struct PointField<'a> {
    /// Array name as shown in ParaView.
    pub name: &'a str,
    /// Per-node values.
    pub data: FieldData<'a>,
}

impl<'a> PointField<'a> {
    /// A vector field.
    #[must_use]
    pub const fn vector(name: &'a str, values: &'a [Vector3<f64>]) -> Self {
        Self {
            name,
            data: FieldData::Vector(values),
        }
    }

    /// A scalar field.
    #[must_use]
    pub const fn scalar(name: &'a str, values: &'a [f64]) -> Self {
        Self {
            name,
            data: FieldData::Scalar(values),
        }
    }
}

/// Save a tetrahedral mesh with optional node fields as a `.vtu` file.
///
/// # Errors
///
/// Returns [`IoError::FieldLength`] if a field does not have one value per
/// node, or an I/O error if the file cannot be written.
pub fn save_vtu<P: AsRef<Path>>(mesh: &TetMesh, fields: &[PointField<'_>], path: P) -> IoResult<()> {
    let writer = BufWriter::new(File::create(path)?);
    write_vtu(mesh, fields, writer)
}

/// Write a `.vtu` document to any writer.
///
/// # Errors
///
/// See [`save_vtu`].
pub fn write_vtu<W: Write>(mesh: &TetMesh, fields: &[PointField<'_>], mut w: W) -> IoResult<()> {
    for field in fields {
        if field.data.len() != mesh.node_count() {
            return Err(IoError::FieldLength {
                name: field.name.to_string(),
                expected: mesh.node_count(),
                got: field.data.len(),
            });
        }
    }

    writeln!(w, r#"<?xml version="1.0"?>"#)?;
    writeln!(
        w,
        r#"<VTKFile type="UnstructuredGrid" version="0.1" byte_order="LittleEndian">"#
    )?;
    writeln!(w, "  <UnstructuredGrid>")?;
    writeln!(
        w,
        r#"    <Piece NumberOfPoints="{}" NumberOfCells="{}">"#,
        mesh.node_count(),
        mesh.element_count()
    )?;

    if !fields.is_empty() {
        writeln!(w, "      <PointData>")?;
        for field in fields {
            writeln!(
                w,
                r#"        <DataArray type="Float64" Name="{}" NumberOfComponents="{}" format="ascii">"#,
                field.name,
                field.data.components()
            )?;
            match field.data {
                FieldData::Scalar(values) => {
                    for v in values {
                        writeln!(w, "          {v:e}")?;
                    }
                }
                FieldData::Vector(values) => {
                    for v in values {
                        writeln!(w, "          {:e} {:e} {:e}", v.x, v.y, v.z)?;
                    }
                }
            }
            writeln!(w, "        </DataArray>")?;
        }
        writeln!(w, "      </PointData>")?;
    }

    writeln!(w, "      <Points>")?;
    writeln!(
        w,
        r#"        <DataArray type="Float64" NumberOfComponents="3" format="ascii">"#
    )?;
    for p in &mesh.nodes {
        writeln!(w, "          {:e} {:e} {:e}", p.x, p.y, p.z)?;
    }
    writeln!(w, "        </DataArray>")?;
    writeln!(w, "      </Points>")?;

    writeln!(w, "      <Cells>")?;
    writeln!(
        w,
        r#"        <DataArray type="Int64" Name="connectivity" format="ascii">"#
    )?;
    for [a, b, c, d] in &mesh.elements {
        writeln!(w, "          {a} {b} {c} {d}")?;
    }
    writeln!(w, "        </DataArray>")?;
    writeln!(w, r#"        <DataArray type="Int64" Name="offsets" format="ascii">"#)?;
    for i in 1..=mesh.element_count() {
        writeln!(w, "          {}", 4 * i)?;
    }
    writeln!(w, "        </DataArray>")?;
    writeln!(w, r#"        <DataArray type="UInt8" Name="types" format="ascii">"#)?;
    for _ in 0..mesh.element_count() {
        writeln!(w, "          {VTK_TETRA}")?;
    }
    writeln!(w, "        </DataArray>")?;
    writeln!(w, "      </Cells>")?;

    writeln!(w, "    </Piece>")?;
    writeln!(w, "  </UnstructuredGrid>")?;
    writeln!(w, "</VTKFile>")?;
    w.flush()?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use mesh_types::Point3;

    fn single_tet() -> TetMesh {
        TetMesh {
            nodes: vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
                Point3::new(0.0, 0.0, 1.0),
            ],
            elements: vec![[0, 1, 2, 3]],
            surface_nodes: vec![0, 1, 2, 3],
        }
    }

    #[test]
    fn writes_points_cells_and_fields() {
        let mesh = single_tet();
        let disp = vec![Vector3::new(0.1, 0.0, 0.0); 4];
        let mut out = Vec::new();
        write_vtu(&mesh, &[PointField::vector("Displacement", &disp)], &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains(r#"NumberOfPoints="4" NumberOfCells="1""#));
        assert!(text.contains(r#"Name="Displacement" NumberOfComponents="3""#));
        assert!(text.contains("          0 1 2 3"));
        assert!(text.contains("          10"));
        assert!(text.trim_end().ends_with("</VTKFile>"));
    }

    #[test]
    fn rejects_short_field() {
        let mesh = single_tet();
        let v = [1.0, 2.0];
        let mut out = Vec::new();
        let err = write_vtu(&mesh, &[PointField::scalar("v", &v)], &mut out);
        assert!(matches!(err, Err(IoError::FieldLength { expected: 4, got: 2, .. })));
    }

    #[test]
    fn saves_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cell0001.vtu");
        save_vtu(&single_tet(), &[], &path).unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().contains("UnstructuredGrid"));
    }
}
