//! Vertex type.

use nalgebra::{Point3, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A vertex in 3D space.
///
/// The position is stored as a `Point3<f64>` for high precision. An optional
/// normal is carried when the source format provides one (STL facet normals
/// are not propagated to vertices).
///
/// # Example
///
/// ```
/// use mesh_types::Vertex;
///
/// let v = Vertex::from_coords(1.0, 2.0, 3.0);
/// assert_eq!(v.position.y, 2.0);
/// assert!(v.normal.is_none());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Vertex {
    /// Position in 3D space.
    pub position: Point3<f64>,
    /// Optional unit normal.
    pub normal: Option<Vector3<f64>>,
}

impl Vertex {
    /// Create a vertex at the given position.
    #[inline]
    #[must_use]
    pub const fn new(position: Point3<f64>) -> Self {
        Self {
            position,
            normal: None,
        }
    }

    /// Create a vertex from individual coordinates.
    #[inline]
    #[must_use]
    pub fn from_coords(x: f64, y: f64, z: f64) -> Self {
        Self::new(Point3::new(x, y, z))
    }

    /// Create a vertex with a normal.
    #[inline]
    #[must_use]
    pub const fn with_normal(position: Point3<f64>, normal: Vector3<f64>) -> Self {
        Self {
            position,
            normal: Some(normal),
        }
    }
}

impl From<Point3<f64>> for Vertex {
    fn from(position: Point3<f64>) -> Self {
        Self::new(position)
    }
}

impl From<[f64; 3]> for Vertex {
    fn from(coords: [f64; 3]) -> Self {
        Self::from_coords(coords[0], coords[1], coords[2])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions_keep_position() {
        let a: Vertex = [1.0, 2.0, 3.0].into();
        let b: Vertex = Point3::new(1.0, 2.0, 3.0).into();
        assert_eq!(a, b);
    }

    #[test]
    fn with_normal_sets_normal() {
        let v = Vertex::with_normal(Point3::origin(), Vector3::z());
        assert_eq!(v.normal, Some(Vector3::z()));
    }
}
