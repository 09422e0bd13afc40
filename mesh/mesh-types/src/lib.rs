//! Core mesh value types.
//!
//! This crate provides the foundational types shared by the meshing,
//! registration and strain crates:
//!
//! - [`Vertex`] - A point in 3D space
//! - [`IndexedMesh`] - A closed triangle surface with indexed vertices
//! - [`Triangle`] - A concrete triangle with vertex positions
//! - [`TetMesh`] - A tetrahedral volume mesh derived from a surface
//! - [`Aabb`] - Axis-aligned bounding box
//!
//! All types are plain values: transforms and derived meshes are returned
//! as new values, never applied in place by downstream algorithms.
//!
//! # Units
//!
//! This library is **unit-agnostic**. All coordinates are `f64` in whatever
//! physical unit the input surfaces use (typically micrometres).
//!
//! # Winding
//!
//! Face winding is **counter-clockwise (CCW) when viewed from outside**.
//! Normals point outward by the right-hand rule, so a correctly oriented
//! closed surface has positive [`IndexedMesh::signed_volume`].
//!
//! # Example
//!
//! ```
//! use mesh_types::{unit_cube, MeshBounds};
//!
//! let cube = unit_cube();
//! assert_eq!(cube.face_count(), 12);
//! assert!((cube.signed_volume() - 1.0).abs() < 1e-12);
//! assert!((cube.bounds().max_extent() - 1.0).abs() < 1e-12);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

mod bounds;
mod mesh;
mod primitives;
mod tet_mesh;
mod traits;
mod triangle;
mod vertex;

pub use bounds::Aabb;
pub use mesh::IndexedMesh;
pub use primitives::{icosphere, unit_cube, uv_ellipsoid};
pub use tet_mesh::{TetMesh, Tetrahedron};
pub use traits::MeshBounds;
pub use triangle::Triangle;
pub use vertex::Vertex;

// Re-export nalgebra types for convenience
pub use nalgebra::{Matrix3, Point3, Vector3};
