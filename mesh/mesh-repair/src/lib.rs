//! Surface preparation for volume meshing.
//!
//! Segmented object surfaces usually arrive as STL triangle soup: every
//! facet carries its own copies of its corners, winding may be
//! inconsistent, and slivers can appear where the surface extractor
//! collapsed a cell. This crate turns such input into a closed, indexed,
//! outward-oriented surface, or explains why it cannot:
//!
//! - Vertex welding (spatial hash)
//! - Degenerate and duplicate face removal
//! - Unreferenced vertex removal
//! - Closed 2-manifold validation
//! - Consistent outward winding
//!
//! # Example
//!
//! ```
//! use mesh_types::unit_cube;
//! use mesh_repair::{prepare_surface, RepairParams};
//!
//! let mut cube = unit_cube();
//! cube.flip_faces();
//! let (surface, summary) = prepare_surface(&cube, &RepairParams::default())?;
//! assert_eq!(summary.faces_flipped, 12);
//! assert!(surface.signed_volume() > 0.0);
//! # Ok::<(), mesh_repair::RepairError>(())
//! ```

#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod adjacency;
mod error;
mod repair;
mod validate;
mod winding;

pub use adjacency::MeshAdjacency;
pub use error::{RepairError, RepairResult};
pub use repair::{
    clean_mesh, remove_degenerate_triangles, remove_duplicate_faces, remove_unreferenced_vertices,
    weld_vertices, RepairParams, RepairSummary,
};
pub use validate::{require_closed_manifold, validate_mesh, MeshReport};
pub use winding::{face_components, fix_winding};

use mesh_types::IndexedMesh;
use tracing::debug;

/// Produce a closed, outward-oriented copy of a raw surface.
///
/// The input is left untouched.
///
/// # Errors
///
/// Returns an error if the cleaned surface is empty, has holes, is not
/// manifold or cannot be oriented.
pub fn prepare_surface(
    raw: &IndexedMesh,
    params: &RepairParams,
) -> RepairResult<(IndexedMesh, RepairSummary)> {
    let mut mesh = raw.clone();
    let mut summary = clean_mesh(&mut mesh, params);
    let report = require_closed_manifold(&mesh)?;
    summary.faces_flipped = fix_winding(&mut mesh)?;
    debug!(%report, %summary, "prepared surface");
    Ok((mesh, summary))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use mesh_types::{icosphere, Vertex};

    #[test]
    fn soup_sphere_becomes_closed_surface() {
        let sphere = icosphere(2.0, 2);
        let mut soup = IndexedMesh::new();
        for (i, t) in sphere.triangles().enumerate() {
            #[allow(clippy::cast_possible_truncation)]
            let base = soup.vertices.len() as u32;
            soup.vertices.extend([Vertex::new(t.v0), Vertex::new(t.v1), Vertex::new(t.v2)]);
            // Scramble winding of every third facet.
            if i % 3 == 0 {
                soup.faces.push([base, base + 2, base + 1]);
            } else {
                soup.faces.push([base, base + 1, base + 2]);
            }
        }

        let (surface, summary) = prepare_surface(&soup, &RepairParams::default()).unwrap();
        assert_eq!(surface.vertex_count(), sphere.vertex_count());
        assert_eq!(surface.face_count(), sphere.face_count());
        assert!(summary.faces_flipped > 0);
        assert!((surface.signed_volume() - sphere.signed_volume()).abs() < 1e-9);
    }

    #[test]
    fn open_surface_is_rejected() {
        let mut sphere = icosphere(1.0, 1);
        sphere.faces.truncate(10);
        assert!(matches!(
            prepare_surface(&sphere, &RepairParams::default()),
            Err(RepairError::NotClosed { .. })
        ));
    }
}
