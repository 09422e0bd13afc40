//! Inside/outside and distance queries against a closed surface.
//!
//! The inside test uses the generalized winding number: the signed solid
//! angle subtended by every face, divided by `4π`. It is ≈1 inside an
//! outward-oriented closed surface, ≈0 outside, and degrades gracefully
//! near small defects where ray parity would flip.

use std::f64::consts::PI;

use mesh_types::{Aabb, IndexedMesh, MeshBounds, Point3, Triangle};

/// Precomputed triangles of a closed surface.
#[derive(Debug, Clone)]
pub struct SurfaceField {
    triangles: Vec<Triangle>,
    bounds: Aabb,
}

impl SurfaceField {
    /// Captures the triangles of `mesh`.
    #[must_use]
    pub fn new(mesh: &IndexedMesh) -> Self {
        Self {
            triangles: mesh.triangles().collect(),
            bounds: mesh.bounds(),
        }
    }

    /// Bounding box of the surface.
    #[must_use]
    pub const fn bounds(&self) -> &Aabb {
        &self.bounds
    }

    /// Generalized winding number of the surface around `p`.
    ///
    /// # Example
    ///
    /// ```
    /// use mesh_tetra::SurfaceField;
    /// use mesh_types::{unit_cube, Point3};
    ///
    /// let field = SurfaceField::new(&unit_cube());
    /// assert!((field.winding_number(&Point3::new(0.5, 0.5, 0.5)) - 1.0).abs() < 1e-9);
    /// assert!(field.winding_number(&Point3::new(2.0, 0.5, 0.5)).abs() < 1e-9);
    /// ```
    #[must_use]
    pub fn winding_number(&self, p: &Point3<f64>) -> f64 {
        let total: f64 = self.triangles.iter().map(|t| solid_angle(t, p)).sum();
        total / (4.0 * PI)
    }

    /// True if `p` is inside the surface.
    #[must_use]
    pub fn is_inside(&self, p: &Point3<f64>) -> bool {
        self.bounds.contains(p) && self.winding_number(p) > 0.5
    }

    /// Unsigned distance from `p` to the surface.
    #[must_use]
    pub fn distance(&self, p: &Point3<f64>) -> f64 {
        self.triangles
            .iter()
            .map(|t| (t.closest_point(p) - p).norm_squared())
            .fold(f64::INFINITY, f64::min)
            .sqrt()
    }
}

/// Signed solid angle of a triangle seen from `p` (Van Oosterom and
/// Strackee). Positive when `p` is behind the face.
fn solid_angle(t: &Triangle, p: &Point3<f64>) -> f64 {
    let a = t.v0 - p;
    let b = t.v1 - p;
    let c = t.v2 - p;
    let (la, lb, lc) = (a.norm(), b.norm(), c.norm());
    let numerator = a.dot(&b.cross(&c));
    let denominator = la * lb * lc + a.dot(&b) * lc + a.dot(&c) * lb + b.dot(&c) * la;
    2.0 * numerator.atan2(denominator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use mesh_types::{icosphere, unit_cube};

    #[test]
    fn sphere_inside_and_outside() {
        let sphere = icosphere(1.0, 2);
        let field = SurfaceField::new(&sphere);
        assert_relative_eq!(field.winding_number(&Point3::origin()), 1.0, epsilon = 1e-9);
        assert_relative_eq!(
            field.winding_number(&Point3::new(0.3, -0.5, 0.4)),
            1.0,
            epsilon = 1e-9
        );
        assert!(field.winding_number(&Point3::new(0.0, 0.0, 1.5)).abs() < 1e-9);
        assert!(field.is_inside(&Point3::new(0.1, 0.1, 0.1)));
        assert!(!field.is_inside(&Point3::new(1.1, 0.0, 0.0)));
    }

    #[test]
    fn inverted_surface_has_negative_winding() {
        let mut cube = unit_cube();
        cube.flip_faces();
        let field = SurfaceField::new(&cube);
        assert_relative_eq!(
            field.winding_number(&Point3::new(0.5, 0.5, 0.5)),
            -1.0,
            epsilon = 1e-9
        );
    }

    #[test]
    fn distance_to_cube() {
        let field = SurfaceField::new(&unit_cube());
        assert_relative_eq!(field.distance(&Point3::new(0.5, 0.5, 0.2)), 0.2, epsilon = 1e-12);
        assert_relative_eq!(field.distance(&Point3::new(0.5, 0.5, 3.0)), 2.0, epsilon = 1e-12);
        assert_relative_eq!(field.distance(&Point3::new(2.0, 2.0, 0.5)), 2.0_f64.sqrt(), epsilon = 1e-12);
    }
}
