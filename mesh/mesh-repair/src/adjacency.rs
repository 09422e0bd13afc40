//! Edge and vertex adjacency for triangle surfaces.

use hashbrown::HashMap;
use smallvec::SmallVec;

/// Faces incident to one undirected edge; two for a closed manifold.
type EdgeFaces = SmallVec<[usize; 2]>;

/// Adjacency information for a triangle surface.
///
/// Provides lookups for:
/// - Faces adjacent to an edge
/// - Faces adjacent to a vertex
/// - Boundary edges (one adjacent face) and non-manifold edges (more than two)
/// - Edge-neighbouring faces, used to propagate a consistent winding
#[derive(Debug, Clone)]
pub struct MeshAdjacency {
    /// Maps edge `(lo, hi)` to the faces that use it.
    edge_to_faces: HashMap<(u32, u32), EdgeFaces>,
    /// Faces using each vertex, indexed by vertex.
    vertex_to_faces: Vec<SmallVec<[usize; 8]>>,
}

impl MeshAdjacency {
    /// Build adjacency information from a list of faces.
    ///
    /// # Example
    ///
    /// ```
    /// use mesh_repair::MeshAdjacency;
    ///
    /// let faces = vec![[0, 1, 2], [1, 3, 2]];
    /// let adj = MeshAdjacency::build(&faces);
    ///
    /// assert_eq!(adj.boundary_edge_count(), 4);
    /// assert_eq!(adj.face_neighbors(&faces, 0).count(), 1);
    /// ```
    #[must_use]
    pub fn build(faces: &[[u32; 3]]) -> Self {
        let mut edge_to_faces: HashMap<(u32, u32), EdgeFaces> = HashMap::with_capacity(faces.len() * 3 / 2);
        let max_vertex = faces.iter().flatten().copied().max().map_or(0, |m| m as usize + 1);
        let mut vertex_to_faces = vec![SmallVec::new(); max_vertex];

        for (face_idx, face) in faces.iter().enumerate() {
            for &v in face {
                vertex_to_faces[v as usize].push(face_idx);
            }
            for (a, b) in face_edges(*face) {
                edge_to_faces.entry(undirected(a, b)).or_default().push(face_idx);
            }
        }

        Self {
            edge_to_faces,
            vertex_to_faces,
        }
    }

    /// Faces adjacent to an edge, `None` if the edge does not exist.
    #[must_use]
    pub fn faces_for_edge(&self, v0: u32, v1: u32) -> Option<&[usize]> {
        self.edge_to_faces.get(&undirected(v0, v1)).map(SmallVec::as_slice)
    }

    /// Faces adjacent to a vertex; empty if the vertex is unused.
    #[must_use]
    pub fn faces_for_vertex(&self, v: u32) -> &[usize] {
        self.vertex_to_faces.get(v as usize).map_or(&[], SmallVec::as_slice)
    }

    /// Faces sharing an edge with `face`, given the face list the adjacency
    /// was built from. Non-manifold edges contribute all their other faces.
    pub fn face_neighbors<'a>(
        &'a self,
        faces: &'a [[u32; 3]],
        face: usize,
    ) -> impl Iterator<Item = usize> + 'a {
        faces
            .get(face)
            .into_iter()
            .flat_map(|f| face_edges(*f))
            .filter_map(move |(a, b)| self.faces_for_edge(a, b))
            .flat_map(move |fs| fs.iter().copied().filter(move |&f| f != face))
    }

    /// Iterate over `(edge, faces)` pairs.
    pub fn edges(&self) -> impl Iterator<Item = ((u32, u32), &[usize])> + '_ {
        self.edge_to_faces.iter().map(|(&e, f)| (e, f.as_slice()))
    }

    /// Count the number of boundary edges.
    #[must_use]
    pub fn boundary_edge_count(&self) -> usize {
        self.edge_to_faces.values().filter(|f| f.len() == 1).count()
    }

    /// Count the number of non-manifold edges.
    #[must_use]
    pub fn non_manifold_edge_count(&self) -> usize {
        self.edge_to_faces.values().filter(|f| f.len() > 2).count()
    }

    /// True if every edge has at most two adjacent faces.
    #[must_use]
    pub fn is_manifold(&self) -> bool {
        self.edge_to_faces.values().all(|f| f.len() <= 2)
    }

    /// True if every edge has at least two adjacent faces.
    #[must_use]
    pub fn is_watertight(&self) -> bool {
        self.edge_to_faces.values().all(|f| f.len() >= 2)
    }

    /// Total number of undirected edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edge_to_faces.len()
    }
}

/// The three directed edges of a face in winding order.
#[inline]
pub(crate) fn face_edges(face: [u32; 3]) -> [(u32, u32); 3] {
    [(face[0], face[1]), (face[1], face[2]), (face[2], face[0])]
}

#[inline]
fn undirected(v0: u32, v1: u32) -> (u32, u32) {
    if v0 < v1 { (v0, v1) } else { (v1, v0) }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use mesh_types::unit_cube;

    #[test]
    fn shared_and_boundary_edges() {
        let adj = MeshAdjacency::build(&[[0, 1, 2], [1, 3, 2]]);
        assert_eq!(adj.faces_for_edge(1, 2).unwrap().len(), 2);
        assert_eq!(adj.faces_for_edge(2, 1), adj.faces_for_edge(1, 2));
        assert_eq!(adj.faces_for_edge(0, 1).unwrap().len(), 1);
        assert!(adj.faces_for_edge(0, 3).is_none());
        assert!(!adj.is_watertight());
        assert!(adj.is_manifold());
    }

    #[test]
    fn vertex_faces() {
        let adj = MeshAdjacency::build(&[[0, 1, 2], [1, 3, 2]]);
        assert_eq!(adj.faces_for_vertex(2).len(), 2);
        assert_eq!(adj.faces_for_vertex(0).len(), 1);
        assert!(adj.faces_for_vertex(99).is_empty());
    }

    #[test]
    fn non_manifold_detection() {
        let adj = MeshAdjacency::build(&[[0, 1, 2], [0, 1, 3], [0, 1, 4]]);
        assert_eq!(adj.non_manifold_edge_count(), 1);
        assert!(!adj.is_manifold());
    }

    #[test]
    fn closed_cube() {
        let cube = unit_cube();
        let adj = MeshAdjacency::build(&cube.faces);
        assert!(adj.is_watertight());
        assert!(adj.is_manifold());
        assert_eq!(adj.edge_count(), 18);
        for f in 0..cube.faces.len() {
            assert_eq!(adj.face_neighbors(&cube.faces, f).count(), 3);
        }
    }
}
