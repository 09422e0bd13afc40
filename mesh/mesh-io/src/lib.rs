//! Mesh file I/O.
//!
//! Loading of closed object surfaces and writing of derived meshes:
//!
//! - **STL** (Stereolithography) - Binary and ASCII, read and write
//! - **OBJ** (Wavefront) - ASCII, read and write, n-gon faces fan-triangulated
//! - **VTU** (VTK XML unstructured grid) - write only, tetrahedral meshes
//!   with per-node fields
//!
//! # Example
//!
//! ```no_run
//! use mesh_io::{load_mesh, save_stl};
//!
//! // Format detected from the .stl extension
//! let mesh = load_mesh("cell01.stl")?;
//! save_stl(&mesh, "copy.stl", true)?;
//! # Ok::<(), mesh_io::IoError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

mod error;
mod obj;
mod stl;
mod vtu;

pub use error::{IoError, IoResult};
pub use obj::{load_obj, parse_obj, save_obj};
pub use stl::{load_stl, parse_stl, save_stl};
pub use vtu::{save_vtu, write_vtu, FieldData, PointField};

use std::path::Path;

use mesh_types::IndexedMesh;

/// Supported surface file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeshFormat {
    /// STL (Stereolithography) format, binary or ASCII.
    Stl,
    /// OBJ (Wavefront) format.
    Obj,
}

impl MeshFormat {
    /// Detect format from file extension (case-insensitive).
    ///
    /// Returns `None` if the extension is missing or not recognized.
    #[must_use]
    pub fn from_path<P: AsRef<Path>>(path: P) -> Option<Self> {
        let ext = path.as_ref().extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "stl" => Some(Self::Stl),
            "obj" => Some(Self::Obj),
            _ => None,
        }
    }

    /// Canonical file extension for this format.
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Stl => "stl",
            Self::Obj => "obj",
        }
    }
}

fn detect(path: &Path) -> IoResult<MeshFormat> {
    MeshFormat::from_path(path).ok_or_else(|| IoError::UnknownFormat {
        extension: path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("(none)")
            .to_string(),
    })
}

/// Load a surface from a file, detecting format from extension.
///
/// # Errors
///
/// Returns an error if:
/// - The file format cannot be determined from the extension
/// - The file cannot be read
/// - The file content is invalid for the detected format
pub fn load_mesh<P: AsRef<Path>>(path: P) -> IoResult<IndexedMesh> {
    let path = path.as_ref();
    match detect(path)? {
        MeshFormat::Stl => load_stl(path),
        MeshFormat::Obj => load_obj(path),
    }
}

/// Save a surface to a file, detecting format from extension.
///
/// STL output is binary.
///
/// # Errors
///
/// Returns an error if the format cannot be determined or the file cannot be
/// written.
pub fn save_mesh<P: AsRef<Path>>(mesh: &IndexedMesh, path: P) -> IoResult<()> {
    let path = path.as_ref();
    match detect(path)? {
        MeshFormat::Stl => save_stl(mesh, path, true),
        MeshFormat::Obj => save_obj(mesh, path),
    }
}
