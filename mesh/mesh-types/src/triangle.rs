//! Triangle type for geometric calculations.

use nalgebra::{Point3, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A triangle with concrete vertex positions.
///
/// Winding is **counter-clockwise (CCW) when viewed from the front**
/// (normal points toward viewer).
///
/// # Example
///
/// ```
/// use mesh_types::{Triangle, Point3};
///
/// let tri = Triangle::new(
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(1.0, 0.0, 0.0),
///     Point3::new(0.0, 1.0, 0.0),
/// );
/// assert!((tri.area() - 0.5).abs() < 1e-10);
/// assert!((tri.normal().map_or(0.0, |n| n.z) - 1.0).abs() < 1e-10);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Triangle {
    /// First vertex.
    pub v0: Point3<f64>,
    /// Second vertex.
    pub v1: Point3<f64>,
    /// Third vertex.
    pub v2: Point3<f64>,
}

impl Triangle {
    /// Create a new triangle from three points.
    #[inline]
    #[must_use]
    pub const fn new(v0: Point3<f64>, v1: Point3<f64>, v2: Point3<f64>) -> Self {
        Self { v0, v1, v2 }
    }

    /// Unnormalized normal; its magnitude is twice the area.
    #[inline]
    #[must_use]
    pub fn normal_unnormalized(&self) -> Vector3<f64> {
        (self.v1 - self.v0).cross(&(self.v2 - self.v0))
    }

    /// Unit normal, `None` for degenerate triangles.
    #[must_use]
    pub fn normal(&self) -> Option<Vector3<f64>> {
        let n = self.normal_unnormalized();
        let len_sq = n.norm_squared();
        (len_sq > f64::EPSILON * f64::EPSILON).then(|| n / len_sq.sqrt())
    }

    /// Area.
    #[inline]
    #[must_use]
    pub fn area(&self) -> f64 {
        0.5 * self.normal_unnormalized().norm()
    }

    /// Centroid.
    #[inline]
    #[must_use]
    pub fn centroid(&self) -> Point3<f64> {
        Point3::from((self.v0.coords + self.v1.coords + self.v2.coords) / 3.0)
    }

    /// Edge lengths `[|v1-v0|, |v2-v1|, |v0-v2|]`.
    #[must_use]
    pub fn edge_lengths(&self) -> [f64; 3] {
        [
            (self.v1 - self.v0).norm(),
            (self.v2 - self.v1).norm(),
            (self.v0 - self.v2).norm(),
        ]
    }

    /// Longest edge length.
    #[must_use]
    pub fn max_edge_length(&self) -> f64 {
        self.edge_lengths().into_iter().fold(0.0, f64::max)
    }

    /// Closest point on the triangle to `p`.
    ///
    /// Uses the Voronoi-region classification from Ericson,
    /// *Real-Time Collision Detection*, section 5.1.5.
    #[must_use]
    pub fn closest_point(&self, p: &Point3<f64>) -> Point3<f64> {
        let (a, b, c) = (self.v0, self.v1, self.v2);
        let ab = b - a;
        let ac = c - a;
        let ap = p - a;

        let d1 = ab.dot(&ap);
        let d2 = ac.dot(&ap);
        if d1 <= 0.0 && d2 <= 0.0 {
            return a;
        }

        let bp = p - b;
        let d3 = ab.dot(&bp);
        let d4 = ac.dot(&bp);
        if d3 >= 0.0 && d4 <= d3 {
            return b;
        }

        let vc = d1 * d4 - d3 * d2;
        if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
            let v = d1 / (d1 - d3);
            return a + ab * v;
        }

        let cp = p - c;
        let d5 = ab.dot(&cp);
        let d6 = ac.dot(&cp);
        if d6 >= 0.0 && d5 <= d6 {
            return c;
        }

        let vb = d5 * d2 - d1 * d6;
        if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
            let w = d2 / (d2 - d6);
            return a + ac * w;
        }

        let va = d3 * d6 - d5 * d4;
        if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
            let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
            return b + (c - b) * w;
        }

        let denom = va + vb + vc;
        if denom.abs() < f64::MIN_POSITIVE {
            return a;
        }
        let v = vb / denom;
        let w = vc / denom;
        a + ab * v + ac * w
    }

    /// Same triangle with opposite winding.
    #[inline]
    #[must_use]
    pub const fn reversed(&self) -> Self {
        Self::new(self.v0, self.v2, self.v1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_right() -> Triangle {
        Triangle::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        )
    }

    #[test]
    fn degenerate_has_no_normal() {
        let t = Triangle::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
        );
        assert!(t.normal().is_none());
        assert_relative_eq!(t.area(), 0.0);
    }

    #[test]
    fn reversed_flips_normal() {
        let t = unit_right();
        assert_relative_eq!(t.reversed().normal_unnormalized().z, -1.0);
    }

    #[test]
    fn closest_point_regions() {
        let t = unit_right();
        // Face interior, projected straight down.
        let p = t.closest_point(&Point3::new(0.25, 0.25, 2.0));
        assert_relative_eq!(p, Point3::new(0.25, 0.25, 0.0), epsilon = 1e-12);
        // Vertex region.
        let p = t.closest_point(&Point3::new(-1.0, -1.0, 0.0));
        assert_relative_eq!(p, Point3::origin(), epsilon = 1e-12);
        // Edge region of the hypotenuse.
        let p = t.closest_point(&Point3::new(1.0, 1.0, 0.0));
        assert_relative_eq!(p, Point3::new(0.5, 0.5, 0.0), epsilon = 1e-12);
        // Edge region along x.
        let p = t.closest_point(&Point3::new(0.5, -3.0, 1.0));
        assert_relative_eq!(p, Point3::new(0.5, 0.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn centroid_and_edges() {
        let t = unit_right();
        assert_relative_eq!(t.centroid(), Point3::new(1.0 / 3.0, 1.0 / 3.0, 0.0));
        assert_relative_eq!(t.max_edge_length(), 2.0_f64.sqrt());
    }
}
