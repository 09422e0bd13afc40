//! Tetrahedral volume meshing and mass properties.
//!
//! - **Delaunay** - Bowyer-Watson tetrahedralization of point sets
//! - **Surface meshing** - fills a closed surface with tetrahedra, keeping
//!   its vertices as the first nodes
//! - **Quality** - shape measures normalized to a regular tetrahedron
//! - **Mass properties** - volume, centroid, inertia tensor and the
//!   radii of the equivalent ellipsoid
//!
//! # Quick Start
//!
//! ```
//! use mesh_tetra::{mass_properties, tetrahedralize, InertiaModel, TetMeshParams};
//! use mesh_types::icosphere;
//!
//! let surface = icosphere(2.0, 2);
//! let (mesh, stats) = tetrahedralize(&surface, &TetMeshParams::default())?;
//! println!("{stats}");
//!
//! let props = mass_properties(&mesh, InertiaModel::Exact)?;
//! assert!((props.volume - surface.volume()).abs() < 1e-9);
//! assert!(props.radii().iter().all(|r| (r - 2.0).abs() < 0.1));
//! # Ok::<(), mesh_tetra::TetraError>(())
//! ```

#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod delaunay;
mod error;
mod mass;
mod quality;
mod tetrahedralize;
mod winding;

pub use delaunay::Delaunay;
pub use error::{TetraError, TetraResult};
pub use mass::{mass_properties, InertiaModel, MassProperties, PrincipalAxis};
pub use quality::{edge_ratio, radius_edge_ratio, radius_ratio, TetQualityMeasure};
pub use tetrahedralize::{tetrahedralize, TetMeshParams, TetMeshStats};
pub use winding::SurfaceField;
