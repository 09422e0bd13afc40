//! Surface validation.

use mesh_types::IndexedMesh;

use crate::adjacency::MeshAdjacency;
use crate::error::{RepairError, RepairResult};

/// Topology report for a triangle surface.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MeshReport {
    /// Total number of vertices.
    pub vertex_count: usize,
    /// Total number of faces.
    pub face_count: usize,
    /// Total number of undirected edges.
    pub edge_count: usize,
    /// Edges with only one adjacent face.
    pub boundary_edge_count: usize,
    /// Edges with more than two adjacent faces.
    pub non_manifold_edge_count: usize,
    /// Number of edge-connected face components.
    pub component_count: usize,
}

impl MeshReport {
    /// True for a closed 2-manifold.
    #[must_use]
    pub const fn is_closed_manifold(&self) -> bool {
        self.boundary_edge_count == 0 && self.non_manifold_edge_count == 0
    }

    /// Euler characteristic `V - E + F`; 2 for each sphere-like component.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub const fn euler_characteristic(&self) -> i64 {
        self.vertex_count as i64 - self.edge_count as i64 + self.face_count as i64
    }
}

impl std::fmt::Display for MeshReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} vertices, {} faces, {} edges ({} boundary, {} non-manifold), {} components",
            self.vertex_count,
            self.face_count,
            self.edge_count,
            self.boundary_edge_count,
            self.non_manifold_edge_count,
            self.component_count
        )
    }
}

/// Compute a topology report.
#[must_use]
pub fn validate_mesh(mesh: &IndexedMesh) -> MeshReport {
    let adjacency = MeshAdjacency::build(&mesh.faces);
    MeshReport {
        vertex_count: mesh.vertex_count(),
        face_count: mesh.face_count(),
        edge_count: adjacency.edge_count(),
        boundary_edge_count: adjacency.boundary_edge_count(),
        non_manifold_edge_count: adjacency.non_manifold_edge_count(),
        component_count: crate::winding::face_components(&mesh.faces, &adjacency).len(),
    }
}

/// Check that a surface can bound a volume.
///
/// # Errors
///
/// - [`RepairError::EmptyMesh`] if there are no faces
/// - [`RepairError::InvalidIndex`] if a face references a missing vertex
/// - [`RepairError::NonManifold`] if an edge has more than two faces
/// - [`RepairError::NotClosed`] if an edge has only one face
pub fn require_closed_manifold(mesh: &IndexedMesh) -> RepairResult<MeshReport> {
    if mesh.is_empty() {
        return Err(RepairError::EmptyMesh);
    }
    if let Some(&index) = mesh
        .faces
        .iter()
        .flatten()
        .find(|&&v| v as usize >= mesh.vertex_count())
    {
        return Err(RepairError::InvalidIndex {
            index,
            vertex_count: mesh.vertex_count(),
        });
    }

    let report = validate_mesh(mesh);
    if report.non_manifold_edge_count > 0 {
        return Err(RepairError::NonManifold {
            non_manifold_edges: report.non_manifold_edge_count,
        });
    }
    if report.boundary_edge_count > 0 {
        return Err(RepairError::NotClosed {
            boundary_edges: report.boundary_edge_count,
        });
    }
    Ok(report)
}
