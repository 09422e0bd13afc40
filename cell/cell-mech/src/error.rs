//! Error and warning types for the analysis pipeline.

use std::fmt;
use std::path::PathBuf;

use mesh_io::IoError;
use mesh_repair::RepairError;
use serde::Serialize;
use thiserror::Error;

use crate::record::FailureStage;
use crate::store::State;

/// Result type for the analysis pipeline.
pub type CellMechResult<T> = Result<T, CellMechError>;

/// Errors that abort a whole run.
///
/// Failures confined to one object are not errors; they are recorded as
/// [`crate::ObjectFailure`]s in the [`crate::Analysis`].
#[derive(Debug, Error)]
pub enum CellMechError {
    /// The reference and deformed directories hold different object names.
    #[error(
        "reference and deformed surfaces do not pair up \
         (only in reference: {only_in_reference:?}, only in deformed: {only_in_deformed:?})"
    )]
    Pairing {
        /// Names with no deformed counterpart.
        only_in_reference: Vec<String>,
        /// Names with no reference counterpart.
        only_in_deformed: Vec<String>,
    },

    /// No surface files were found.
    #[error("no object surfaces found")]
    NoObjects,

    /// Two files in one directory share a stem.
    #[error("object '{name}' has more than one surface file in {}", dir.display())]
    DuplicateObject {
        /// Shared stem.
        name: String,
        /// Directory holding both files.
        dir: PathBuf,
    },

    /// A directory could not be listed.
    #[error("cannot read directory {}", path.display())]
    Io {
        /// Directory being listed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A surface could not be loaded or prepared.
    #[error("{state} surface of '{name}' is unusable")]
    Surface {
        /// Object name.
        name: String,
        /// Which of the two surfaces failed.
        state: State,
        /// Underlying error.
        #[source]
        source: SurfaceError,
    },

    /// The configuration is inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A configuration or summary document could not be (de)serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An output file could not be written.
    #[error("cannot write {}", path.display())]
    Export {
        /// File being written.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: IoError,
    },

    /// The deformable registration collaborator failed.
    #[error("deformable registration failed: {0}")]
    Deformable(String),

    /// A displacement field is malformed.
    #[error("invalid displacement field: {0}")]
    InvalidField(String),
}

/// Why a single surface could not be used.
#[derive(Debug, Error)]
pub enum SurfaceError {
    /// The file could not be read or parsed.
    #[error(transparent)]
    Io(#[from] IoError),
    /// The surface is not a closed, orientable 2-manifold.
    #[error(transparent)]
    Repair(#[from] RepairError),
}

/// Conditions that do not stop the run but qualify its results.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalysisWarning {
    /// Too few completed objects for a tissue-level strain.
    InsufficientObjects {
        /// Objects with mass properties.
        count: usize,
    },
    /// No usable tetrahedron of object centroids.
    DegenerateTessellation {
        /// What went wrong.
        detail: String,
    },
    /// Affine registration hit its iteration cap.
    RegistrationQuality {
        /// Object name.
        object: String,
        /// Mean landmark movement at the last iteration.
        mean_distance: f64,
        /// Iterations run.
        iterations: u32,
    },
    /// A volume mesh does not reproduce its surface exactly.
    MeshQuality {
        /// Object name.
        object: String,
        /// Which surface was meshed.
        state: State,
        /// Surface triangles missing from the element faces.
        missing_surface_faces: usize,
        /// Elements above the radius-edge bound.
        elements_over_bound: usize,
    },
    /// An object was skipped.
    ObjectFailed {
        /// Object name.
        object: String,
        /// Stage that failed.
        stage: FailureStage,
        /// Error message.
        message: String,
    },
}

impl fmt::Display for AnalysisWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientObjects { count } => write!(
                f,
                "ECM strain unavailable: {count} objects, at least 4 are required"
            ),
            Self::DegenerateTessellation { detail } => {
                write!(f, "ECM strain unavailable: {detail}")
            }
            Self::RegistrationQuality {
                object,
                mean_distance,
                iterations,
            } => write!(
                f,
                "'{object}': registration stopped after {iterations} iterations \
                 with mean distance {mean_distance:.3e}"
            ),
            Self::MeshQuality {
                object,
                state,
                missing_surface_faces,
                elements_over_bound,
            } => write!(
                f,
                "'{object}' ({state}): {missing_surface_faces} surface faces not recovered, \
                 {elements_over_bound} elements over the quality bound"
            ),
            Self::ObjectFailed {
                object,
                stage,
                message,
            } => write!(f, "'{object}' skipped at {stage}: {message}"),
        }
    }
}
