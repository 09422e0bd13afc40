//! Error types for surface preparation.

use thiserror::Error;

/// Result type for repair operations.
pub type RepairResult<T> = Result<T, RepairError>;

/// Errors that make a surface unusable as a closed object boundary.
#[derive(Debug, Error)]
pub enum RepairError {
    /// Mesh is empty (no vertices or faces).
    #[error("mesh is empty")]
    EmptyMesh,

    /// A face references a vertex that does not exist.
    #[error("invalid vertex index {index} (mesh has {vertex_count} vertices)")]
    InvalidIndex {
        /// The invalid index.
        index: u32,
        /// Total number of vertices in the mesh.
        vertex_count: usize,
    },

    /// Surface has holes.
    #[error("surface is not closed: {boundary_edges} boundary edges")]
    NotClosed {
        /// Number of edges with a single adjacent face.
        boundary_edges: usize,
    },

    /// Surface is not a 2-manifold.
    #[error("surface is not manifold: {non_manifold_edges} edges shared by more than two faces")]
    NonManifold {
        /// Number of edges with more than two adjacent faces.
        non_manifold_edges: usize,
    },

    /// Faces cannot be given a consistent winding (e.g. a Moebius strip).
    #[error("surface is not orientable")]
    NonOrientable,
}
