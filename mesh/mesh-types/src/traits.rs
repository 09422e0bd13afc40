//! Traits shared by surface and volume meshes.

use crate::{Aabb, IndexedMesh, TetMesh};

/// Types that can compute an axis-aligned bounding box.
pub trait MeshBounds {
    /// Compute the axis-aligned bounding box.
    ///
    /// Returns an empty AABB if the mesh has no vertices.
    fn bounds(&self) -> Aabb;

    /// Compute the bounding box, returning `None` if empty.
    fn bounds_opt(&self) -> Option<Aabb> {
        let b = self.bounds();
        if b.is_empty() { None } else { Some(b) }
    }
}

impl MeshBounds for IndexedMesh {
    fn bounds(&self) -> Aabb {
        Aabb::from_points(self.vertices.iter().map(|v| &v.position))
    }
}

impl MeshBounds for TetMesh {
    fn bounds(&self) -> Aabb {
        Aabb::from_points(self.nodes.iter())
    }
}
