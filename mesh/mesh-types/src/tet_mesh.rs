//! Tetrahedral volume mesh.

use nalgebra::{Matrix3, Point3, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A tetrahedron with concrete vertex positions.
///
/// Positive orientation means `(v1 - v0) x (v2 - v0) . (v3 - v0) > 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Tetrahedron {
    /// The four corner positions.
    pub vertices: [Point3<f64>; 4],
}

impl Tetrahedron {
    /// Create a tetrahedron from four corners.
    #[inline]
    #[must_use]
    pub const fn new(v0: Point3<f64>, v1: Point3<f64>, v2: Point3<f64>, v3: Point3<f64>) -> Self {
        Self {
            vertices: [v0, v1, v2, v3],
        }
    }

    /// Signed volume, one sixth of the edge triple product.
    #[must_use]
    pub fn signed_volume(&self) -> f64 {
        let [a, b, c, d] = self.vertices;
        (b - a).cross(&(c - a)).dot(&(d - a)) / 6.0
    }

    /// Unsigned volume.
    #[inline]
    #[must_use]
    pub fn volume(&self) -> f64 {
        self.signed_volume().abs()
    }

    /// Centroid (mean of the corners).
    #[must_use]
    pub fn centroid(&self) -> Point3<f64> {
        let sum: Vector3<f64> = self.vertices.iter().map(|p| p.coords).sum();
        Point3::from(sum * 0.25)
    }

    /// The six edge vectors, ordered `1-0, 2-0, 3-0, 3-1, 3-2, 2-1`.
    #[must_use]
    pub fn edge_vectors(&self) -> [Vector3<f64>; 6] {
        let [a, b, c, d] = self.vertices;
        [b - a, c - a, d - a, d - b, d - c, c - b]
    }

    /// The six edge lengths in [`Tetrahedron::edge_vectors`] order.
    #[must_use]
    pub fn edge_lengths(&self) -> [f64; 6] {
        self.edge_vectors().map(|e| e.norm())
    }

    /// Shortest and longest edge length.
    #[must_use]
    pub fn edge_length_range(&self) -> (f64, f64) {
        self.edge_lengths()
            .into_iter()
            .fold((f64::INFINITY, 0.0), |(lo, hi), l| (lo.min(l), hi.max(l)))
    }

    /// Total area of the four faces.
    #[must_use]
    pub fn surface_area(&self) -> f64 {
        let [a, b, c, d] = self.vertices;
        let face = |p: Point3<f64>, q: Point3<f64>, r: Point3<f64>| 0.5 * (q - p).cross(&(r - p)).norm();
        face(a, b, c) + face(a, b, d) + face(a, c, d) + face(b, c, d)
    }

    /// Circumsphere centre and radius, `None` for a flat tetrahedron.
    #[must_use]
    pub fn circumsphere(&self) -> Option<(Point3<f64>, f64)> {
        let [a, b, c, d] = self.vertices;
        let (ab, ac, ad) = (b - a, c - a, d - a);
        let m = Matrix3::from_rows(&[ab.transpose(), ac.transpose(), ad.transpose()]);
        let rhs = 0.5 * Vector3::new(ab.norm_squared(), ac.norm_squared(), ad.norm_squared());
        let offset = m.lu().solve(&rhs)?;
        if !offset.iter().all(|v| v.is_finite()) {
            return None;
        }
        Some((a + offset, offset.norm()))
    }

    /// Inscribed sphere radius `3V / A`.
    #[must_use]
    pub fn inradius(&self) -> f64 {
        let area = self.surface_area();
        if area > 0.0 {
            3.0 * self.volume() / area
        } else {
            0.0
        }
    }
}

/// A tetrahedral volume mesh.
///
/// `elements` index into `nodes`; every element is stored with positive
/// orientation. `surface_nodes` lists the node indices that lie on the
/// bounding surface the mesh was generated from.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TetMesh {
    /// Node positions.
    pub nodes: Vec<Point3<f64>>,
    /// Tetrahedra as node index quadruples.
    pub elements: Vec<[u32; 4]>,
    /// Indices of nodes on the bounding surface.
    pub surface_nodes: Vec<u32>,
}

impl TetMesh {
    /// Number of nodes.
    #[inline]
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of elements.
    #[inline]
    #[must_use]
    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    /// True if the mesh has no elements.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Resolved tetrahedron for an element, `None` if out of range.
    #[must_use]
    pub fn tetrahedron(&self, element: usize) -> Option<Tetrahedron> {
        let [a, b, c, d] = *self.elements.get(element)?;
        Some(Tetrahedron::new(
            *self.nodes.get(a as usize)?,
            *self.nodes.get(b as usize)?,
            *self.nodes.get(c as usize)?,
            *self.nodes.get(d as usize)?,
        ))
    }

    /// Iterate over all resolvable elements.
    pub fn tetrahedra(&self) -> impl Iterator<Item = Tetrahedron> + '_ {
        (0..self.elements.len()).filter_map(|i| self.tetrahedron(i))
    }

    /// Sum of unsigned element volumes.
    #[must_use]
    pub fn volume(&self) -> f64 {
        self.tetrahedra().map(|t| t.volume()).sum()
    }

    /// A copy of the mesh with every node mapped through `f`.
    #[must_use]
    pub fn map_nodes(&self, f: impl Fn(&Point3<f64>) -> Point3<f64>) -> Self {
        Self {
            nodes: self.nodes.iter().map(f).collect(),
            elements: self.elements.clone(),
            surface_nodes: self.surface_nodes.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn corner() -> Tetrahedron {
        Tetrahedron::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
        )
    }

    #[test]
    fn corner_volume_and_orientation() {
        let t = corner();
        assert_relative_eq!(t.signed_volume(), 1.0 / 6.0, epsilon = 1e-15);
        let flipped = Tetrahedron::new(t.vertices[1], t.vertices[0], t.vertices[2], t.vertices[3]);
        assert_relative_eq!(flipped.signed_volume(), -1.0 / 6.0, epsilon = 1e-15);
    }

    #[test]
    fn circumsphere_passes_through_corners() {
        let t = corner();
        let (c, r) = t.circumsphere().unwrap_or((Point3::origin(), 0.0));
        assert_relative_eq!(c, Point3::new(0.5, 0.5, 0.5), epsilon = 1e-12);
        for v in t.vertices {
            assert_relative_eq!((v - c).norm(), r, epsilon = 1e-12);
        }
    }

    #[test]
    fn flat_tetrahedron_has_no_circumsphere() {
        let t = Tetrahedron::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
        );
        assert!(t.circumsphere().is_none());
    }

    #[test]
    fn edge_order() {
        let t = corner();
        let e = t.edge_vectors();
        assert_eq!(e[0], Vector3::new(1.0, 0.0, 0.0));
        assert_eq!(e[3], Vector3::new(-1.0, 0.0, 1.0));
        assert_eq!(e[5], Vector3::new(-1.0, 1.0, 0.0));
        let (lo, hi) = t.edge_length_range();
        assert_relative_eq!(lo, 1.0);
        assert_relative_eq!(hi, 2.0_f64.sqrt());
    }

    #[test]
    fn mesh_volume_and_map() {
        let mesh = TetMesh {
            nodes: corner().vertices.to_vec(),
            elements: vec![[0, 1, 2, 3]],
            surface_nodes: vec![0, 1, 2, 3],
        };
        assert_relative_eq!(mesh.volume(), 1.0 / 6.0, epsilon = 1e-15);
        let doubled = mesh.map_nodes(|p| Point3::from(p.coords * 2.0));
        assert_relative_eq!(doubled.volume(), 8.0 / 6.0, epsilon = 1e-12);
        assert_eq!(doubled.surface_nodes, mesh.surface_nodes);
        assert!(mesh.tetrahedron(1).is_none());
    }
}
