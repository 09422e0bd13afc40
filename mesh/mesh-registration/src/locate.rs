//! Nearest-point queries against point sets and closed surfaces.

use kiddo::{KdTree, SquaredEuclidean};
use mesh_types::IndexedMesh;
use nalgebra::{Point3, UnitQuaternion};
use smallvec::SmallVec;

/// Number of nearest vertices whose incident faces are searched for the
/// closest surface point.
const CANDIDATE_VERTICES: usize = 4;

/// KD-tree over a point set.
///
/// Points are stored in a fixed, slightly rotated frame. Surfaces extracted
/// from voxel data put many vertices on the same axis-aligned plane, which
/// would otherwise overflow the tree's buckets.
pub struct PointIndex {
    tree: KdTree<f64, 3>,
    frame: UnitQuaternion<f64>,
    len: usize,
}

impl PointIndex {
    /// Builds an index over `points`; items are their slice positions.
    #[must_use]
    pub fn build(points: &[Point3<f64>]) -> Self {
        let frame = UnitQuaternion::from_euler_angles(0.314_159, 0.271_828, 0.161_803);
        let mut tree: KdTree<f64, 3> = KdTree::new();
        for (i, p) in points.iter().enumerate() {
            tree.add(&Self::key(&frame, p), i as u64);
        }
        Self {
            tree,
            frame,
            len: points.len(),
        }
    }

    fn key(frame: &UnitQuaternion<f64>, p: &Point3<f64>) -> [f64; 3] {
        let q = frame * p;
        [q.x, q.y, q.z]
    }

    /// Number of indexed points.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// True if no points are indexed.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Index and squared distance of the nearest point.
    #[must_use]
    pub fn nearest(&self, query: &Point3<f64>) -> Option<(usize, f64)> {
        if self.is_empty() {
            return None;
        }
        let found = self
            .tree
            .nearest_one::<SquaredEuclidean>(&Self::key(&self.frame, query));
        #[allow(clippy::cast_possible_truncation)]
        let index = found.item as usize;
        Some((index, found.distance))
    }

    /// Indices of the `k` nearest points, closest first.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn nearest_k(&self, query: &Point3<f64>, k: usize) -> Vec<usize> {
        if self.is_empty() || k == 0 {
            return Vec::new();
        }
        self.tree
            .nearest_n::<SquaredEuclidean>(&Self::key(&self.frame, query), k.min(self.len))
            .into_iter()
            .map(|n| n.item as usize)
            .collect()
    }
}

/// Closest-point queries on a triangle surface.
///
/// Candidate faces are those incident to the few vertices nearest to the
/// query, which is exact for the reasonably uniform surfaces produced by
/// segmentation.
pub struct SurfaceLocator<'a> {
    mesh: &'a IndexedMesh,
    vertices: PointIndex,
    vertex_faces: Vec<SmallVec<[u32; 8]>>,
}

impl<'a> SurfaceLocator<'a> {
    /// Indexes `mesh` for closest-point queries.
    #[must_use]
    pub fn new(mesh: &'a IndexedMesh) -> Self {
        let mut vertex_faces = vec![SmallVec::new(); mesh.vertex_count()];
        for (f, face) in mesh.faces.iter().enumerate() {
            for &v in face {
                if let Some(list) = vertex_faces.get_mut(v as usize) {
                    #[allow(clippy::cast_possible_truncation)]
                    list.push(f as u32);
                }
            }
        }
        Self {
            mesh,
            vertices: PointIndex::build(&mesh.positions()),
            vertex_faces,
        }
    }

    /// The indexed surface.
    #[must_use]
    pub const fn mesh(&self) -> &IndexedMesh {
        self.mesh
    }

    /// Closest vertex of the surface.
    #[must_use]
    pub fn closest_vertex(&self, query: &Point3<f64>) -> Option<Point3<f64>> {
        let (i, _) = self.vertices.nearest(query)?;
        self.mesh.vertices.get(i).map(|v| v.position)
    }

    /// Closest point on the surface, falling back to the closest vertex
    /// when it has no incident faces.
    #[must_use]
    pub fn closest_point(&self, query: &Point3<f64>) -> Option<Point3<f64>> {
        let mut best: Option<(Point3<f64>, f64)> = None;
        for v in self.vertices.nearest_k(query, CANDIDATE_VERTICES) {
            for &f in &self.vertex_faces[v] {
                let Some(triangle) = self.mesh.triangle(f as usize) else {
                    continue;
                };
                let candidate = triangle.closest_point(query);
                let d = (candidate - query).norm_squared();
                if best.map_or(true, |(_, bd)| d < bd) {
                    best = Some((candidate, d));
                }
            }
        }
        best.map(|(p, _)| p).or_else(|| self.closest_vertex(query))
    }
}
