//! Surface registration for deformation analysis.
//!
//! This crate aligns a reference surface onto its deformed counterpart:
//! - **ICP (Iterative Closest Point)** - rigid or affine, matching source
//!   landmarks to the closest points of the target surface
//! - **Landmark fits** - Kabsch rigid and least-squares affine transforms
//!   from paired points
//! - **Locators** - KD-tree nearest point and closest surface point queries
//!
//! The linear part of an affine registration is the deformation gradient
//! `F` of the homogeneous deformation that best explains the shape change.
//!
//! # Quick Start
//!
//! ```
//! use mesh_registration::{icp_register, IcpParams};
//! use mesh_types::icosphere;
//!
//! let reference = icosphere(5.0, 2);
//! let mut deformed = reference.clone();
//! deformed.scale(1.1);
//!
//! // Rigid pre-fit, then affine from the pre-aligned copy.
//! let rigid = icp_register(&reference, &deformed, &IcpParams::rigid())?;
//! let aligned = reference.map_positions(|p| rigid.transform.transform_point(p));
//! let affine = icp_register(&aligned, &deformed, &IcpParams::default())?;
//!
//! let f = affine.transform.linear * rigid.transform.linear;
//! assert!((f.determinant() - 1.331).abs() < 0.01);
//! # Ok::<(), mesh_registration::RegistrationError>(())
//! ```

#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod error;
mod fit;
mod icp;
mod locate;
mod transform;

pub use error::{RegistrationError, RegistrationResult};
pub use fit::{centroid, fit_affine, fit_rigid, MIN_AFFINE_POINTS, MIN_RIGID_POINTS};
pub use icp::{icp_register, Correspondence, IcpMode, IcpParams, IcpResult, MeanDistanceMode};
pub use locate::{PointIndex, SurfaceLocator};
pub use transform::{AffineTransform, RigidTransform};
