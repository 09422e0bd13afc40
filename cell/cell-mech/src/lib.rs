//! Cell deformation and strain quantification.
//!
//! Paired surfaces of the same objects (cells, nuclei, ...) in a reference
//! and a deformed configuration are turned into:
//!
//! - **Mass properties** - volume, centroid and principal axes of each
//!   object's volume mesh, in both configurations
//! - **Cell strain** - Green-Lagrange strain of the affine map registering
//!   the reference surface onto the deformed one
//! - **Volumetric strain** - relative volume change
//! - **ECM strain** - strain of the surrounding matrix, from how the object
//!   centroids moved
//! - **Displacement fields** - optional, from an external deformable image
//!   registration resampled on the volume meshes
//!
//! # Quick Start
//!
//! ```no_run
//! use cell_mech::{export_analysis, CellMech, CellMechConfig, ExportOptions, SurfaceStore};
//!
//! let store = SurfaceStore::open("reference", "deformed")?;
//! let config = CellMechConfig::default();
//! let analysis = CellMech::new(config.clone())?.run(&store)?;
//!
//! for record in analysis.records() {
//!     println!("{}: {:?}", record.name, record.strain.principal_strains());
//! }
//! export_analysis(&analysis, "deformed", &ExportOptions::from_config(&config))?;
//! # Ok::<(), cell_mech::CellMechError>(())
//! ```

#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod config;
mod displacement;
mod ecm;
mod error;
mod export;
mod pipeline;
mod record;
mod store;
mod strain;
mod voxelize;

pub use config::{CellMechConfig, DeformableSettings, MeshingConfig};
pub use displacement::{
    boundary_displacements, map_to_nodes, DeformableRegistration, DisplacementField, NodalField,
};
pub use ecm::{estimate_ecm_strain, EcmStrain, EcmUnavailable, MIN_ECM_OBJECTS};
pub use error::{AnalysisWarning, CellMechError, CellMechResult, SurfaceError};
pub use export::{export_analysis, ExportOptions};
pub use pipeline::CellMech;
pub use record::{
    Analysis, DeformableMapping, FailureStage, ObjectFailure, ObjectOutcome, ObjectRecord,
    Registration,
};
pub use store::{State, SurfacePair, SurfaceStore};
pub use strain::{volumetric_strain, StrainTensor};
pub use voxelize::{voxelize_pair, BinaryImage};
