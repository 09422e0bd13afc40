//! Error types for surface registration.

use thiserror::Error;

/// Errors that can occur during registration.
#[derive(Debug, Error)]
pub enum RegistrationError {
    /// Source surface has no vertices.
    #[error("source surface has no vertices")]
    EmptySourceMesh,

    /// Target surface has no faces to project onto.
    #[error("target surface has no faces")]
    EmptyTargetMesh,

    /// Not enough point pairs to determine the transform.
    #[error("at least {required} point pairs required, got {provided}")]
    InsufficientPoints {
        /// Number of pairs required.
        required: usize,
        /// Number of pairs provided.
        provided: usize,
    },

    /// SVD computation failed during rotation estimation.
    #[error("SVD computation failed during transform estimation")]
    SvdFailed,

    /// Points are coplanar or collinear, so an affine map is not determined.
    #[error("degenerate point configuration: {0}")]
    DegenerateConfiguration(String),

    /// The estimated transform contains NaN or infinite entries.
    #[error("transform estimate is not finite")]
    NonFiniteTransform,

    /// Invalid parameter value.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Result type for registration operations.
pub type RegistrationResult<T> = Result<T, RegistrationError>;
