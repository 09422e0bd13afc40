//! Error types for tetrahedral meshing and mass properties.

use mesh_repair::RepairError;
use thiserror::Error;

/// Errors that can occur while meshing a surface or integrating over the
/// resulting volume.
#[derive(Debug, Error)]
pub enum TetraError {
    /// The surface has no faces.
    #[error("surface is empty")]
    EmptySurface,

    /// The surface has boundary edges.
    #[error("surface is not closed: {boundary_edges} boundary edges")]
    OpenSurface {
        /// Number of edges used by a single face.
        boundary_edges: usize,
    },

    /// Some edge is shared by more than two faces.
    #[error("surface is not manifold: {non_manifold_edges} edges shared by more than two faces")]
    NonManifold {
        /// Number of offending edges.
        non_manifold_edges: usize,
    },

    /// Face winding cannot be made consistent.
    #[error("surface is not orientable")]
    NonOrientable,

    /// The surface references vertices that do not exist.
    #[error("invalid surface: {0}")]
    InvalidSurface(String),

    /// Fewer than four points were given.
    #[error("at least 4 points are required, got {count}")]
    TooFewPoints {
        /// Number of points given.
        count: usize,
    },

    /// A point has a NaN or infinite coordinate.
    #[error("point {index} has a non-finite coordinate")]
    NonFinitePoint {
        /// Index of the offending point.
        index: usize,
    },

    /// All points are coincident, collinear or coplanar.
    #[error("points do not span a volume")]
    DegenerateInput,

    /// No element survived carving away the exterior.
    #[error("no tetrahedra lie inside the surface")]
    NoInteriorElements,

    /// Splitting the surface did not make every surface triangle a union
    /// of element faces within the point budget.
    #[error("surface not recovered: {missing_faces} surface triangles are not element faces")]
    BoundaryRecovery {
        /// Surface triangles still missing when recovery stopped.
        missing_faces: usize,
    },

    /// Every element has zero volume.
    #[error("mesh has zero volume")]
    ZeroVolume,

    /// A meshing parameter is out of range.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

impl From<RepairError> for TetraError {
    fn from(err: RepairError) -> Self {
        match err {
            RepairError::EmptyMesh => Self::EmptySurface,
            RepairError::NotClosed { boundary_edges } => Self::OpenSurface { boundary_edges },
            RepairError::NonManifold { non_manifold_edges } => {
                Self::NonManifold { non_manifold_edges }
            }
            RepairError::NonOrientable => Self::NonOrientable,
            other @ RepairError::InvalidIndex { .. } => Self::InvalidSurface(other.to_string()),
        }
    }
}

/// Result type for meshing operations.
pub type TetraResult<T> = Result<T, TetraError>;
