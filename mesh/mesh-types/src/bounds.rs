//! Axis-aligned bounding box.

use nalgebra::{Point3, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// An axis-aligned bounding box.
///
/// An empty box has `min > max` on every axis; expanding it with a point
/// yields a degenerate box around that point.
///
/// # Example
///
/// ```
/// use mesh_types::{Aabb, Point3};
///
/// let pts = [Point3::new(0.0, 0.0, 0.0), Point3::new(2.0, 1.0, 3.0)];
/// let b = Aabb::from_points(pts.iter());
/// assert_eq!(b.center(), Point3::new(1.0, 0.5, 1.5));
/// assert_eq!(b.max_extent(), 3.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Aabb {
    /// Minimum corner.
    pub min: Point3<f64>,
    /// Maximum corner.
    pub max: Point3<f64>,
}

impl Aabb {
    /// Create a box from two corners, ordering each axis.
    #[must_use]
    pub fn new(a: Point3<f64>, b: Point3<f64>) -> Self {
        Self {
            min: Point3::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            max: Point3::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        }
    }

    /// An empty box that contains nothing.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            min: Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY),
            max: Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
        }
    }

    /// Smallest box containing all points.
    #[must_use]
    pub fn from_points<'a>(points: impl Iterator<Item = &'a Point3<f64>>) -> Self {
        let mut b = Self::empty();
        for p in points {
            b.expand_to_include(p);
        }
        b
    }

    /// True if the box contains no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Extent along each axis (zero for an empty box).
    #[must_use]
    pub fn size(&self) -> Vector3<f64> {
        if self.is_empty() {
            Vector3::zeros()
        } else {
            self.max - self.min
        }
    }

    /// Centre point.
    #[must_use]
    pub fn center(&self) -> Point3<f64> {
        nalgebra::center(&self.min, &self.max)
    }

    /// Largest axis extent.
    #[must_use]
    pub fn max_extent(&self) -> f64 {
        self.size().max()
    }

    /// Length of the diagonal.
    #[must_use]
    pub fn diagonal(&self) -> f64 {
        self.size().norm()
    }

    /// True if the point lies inside or on the box.
    #[must_use]
    pub fn contains(&self, p: &Point3<f64>) -> bool {
        (0..3).all(|i| p[i] >= self.min[i] && p[i] <= self.max[i])
    }

    /// Grow the box to include a point.
    pub fn expand_to_include(&mut self, p: &Point3<f64>) {
        for i in 0..3 {
            self.min[i] = self.min[i].min(p[i]);
            self.max[i] = self.max[i].max(p[i]);
        }
    }

    /// A copy grown by `margin` on every side.
    #[must_use]
    pub fn expanded(&self, margin: f64) -> Self {
        let m = Vector3::repeat(margin);
        Self {
            min: self.min - m,
            max: self.max + m,
        }
    }

    /// Smallest box containing both boxes.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        let mut b = *self;
        if !other.is_empty() {
            b.expand_to_include(&other.min);
            b.expand_to_include(&other.max);
        }
        b
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_box_has_zero_size() {
        let b = Aabb::empty();
        assert!(b.is_empty());
        assert_eq!(b.size(), Vector3::zeros());
    }

    #[test]
    fn new_orders_corners() {
        let b = Aabb::new(Point3::new(1.0, 0.0, 5.0), Point3::new(0.0, 2.0, 3.0));
        assert_eq!(b.min, Point3::new(0.0, 0.0, 3.0));
        assert_eq!(b.max, Point3::new(1.0, 2.0, 5.0));
    }

    #[test]
    fn union_and_contains() {
        let a = Aabb::new(Point3::origin(), Point3::new(1.0, 1.0, 1.0));
        let b = Aabb::new(Point3::new(2.0, 2.0, 2.0), Point3::new(3.0, 3.0, 3.0));
        let u = a.union(&b);
        assert!(u.contains(&Point3::new(1.5, 1.5, 1.5)));
        assert!(!a.contains(&Point3::new(1.5, 1.5, 1.5)));
        assert_eq!(u.union(&Aabb::empty()), u);
    }

    #[test]
    fn expanded_grows_every_side() {
        let b = Aabb::new(Point3::origin(), Point3::new(1.0, 1.0, 1.0)).expanded(0.5);
        assert_eq!(b.min, Point3::new(-0.5, -0.5, -0.5));
        assert!((b.max_extent() - 2.0).abs() < 1e-12);
    }
}
