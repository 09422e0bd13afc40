//! Indexed triangle mesh.

use nalgebra::{Point3, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{Triangle, Vertex};

/// A triangle mesh with indexed vertices.
///
/// Faces reference vertices by index; winding is CCW viewed from outside.
/// Object surfaces are loaded once and treated as immutable: operations that
/// move geometry come in a consuming/in-place form for builders and a
/// `*_copy`-style form ([`IndexedMesh::map_positions`]) for analysis code.
///
/// # Example
///
/// ```
/// use mesh_types::{IndexedMesh, Vertex};
///
/// let mesh = IndexedMesh::from_parts(
///     vec![
///         Vertex::from_coords(0.0, 0.0, 0.0),
///         Vertex::from_coords(1.0, 0.0, 0.0),
///         Vertex::from_coords(0.0, 1.0, 0.0),
///     ],
///     vec![[0, 1, 2]],
/// );
/// assert_eq!(mesh.vertex_count(), 3);
/// assert!((mesh.surface_area() - 0.5).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IndexedMesh {
    /// Vertex data.
    pub vertices: Vec<Vertex>,
    /// Triangle faces as vertex index triples.
    pub faces: Vec<[u32; 3]>,
}

impl IndexedMesh {
    /// Create an empty mesh.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            vertices: Vec::new(),
            faces: Vec::new(),
        }
    }

    /// Create an empty mesh with pre-allocated capacity.
    #[must_use]
    pub fn with_capacity(vertex_count: usize, face_count: usize) -> Self {
        Self {
            vertices: Vec::with_capacity(vertex_count),
            faces: Vec::with_capacity(face_count),
        }
    }

    /// Create a mesh from vertices and faces.
    #[inline]
    #[must_use]
    pub const fn from_parts(vertices: Vec<Vertex>, faces: Vec<[u32; 3]>) -> Self {
        Self { vertices, faces }
    }

    /// Create a mesh from flat position (`[x0, y0, z0, x1, ...]`) and index arrays.
    ///
    /// Trailing values that do not form a whole vertex or face are ignored.
    #[must_use]
    pub fn from_raw(positions: &[f64], indices: &[u32]) -> Self {
        let vertices = positions
            .chunks_exact(3)
            .map(|c| Vertex::from_coords(c[0], c[1], c[2]))
            .collect();
        let faces = indices.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect();
        Self { vertices, faces }
    }

    /// Number of vertices.
    #[inline]
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Number of faces.
    #[inline]
    #[must_use]
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// True if the mesh has no vertices or no faces.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.faces.is_empty()
    }

    /// Resolved triangle for a face index, `None` if the index or any of
    /// its vertex references is out of range.
    #[must_use]
    pub fn triangle(&self, face_index: usize) -> Option<Triangle> {
        let [a, b, c] = *self.faces.get(face_index)?;
        Some(Triangle::new(
            self.vertices.get(a as usize)?.position,
            self.vertices.get(b as usize)?.position,
            self.vertices.get(c as usize)?.position,
        ))
    }

    /// Iterate over all faces as resolved triangles, skipping invalid faces.
    pub fn triangles(&self) -> impl Iterator<Item = Triangle> + '_ {
        (0..self.faces.len()).filter_map(|i| self.triangle(i))
    }

    /// Vertex positions as a new vector.
    #[must_use]
    pub fn positions(&self) -> Vec<Point3<f64>> {
        self.vertices.iter().map(|v| v.position).collect()
    }

    /// Signed enclosed volume (divergence theorem).
    ///
    /// Positive for a closed surface with outward-facing CCW winding.
    #[must_use]
    pub fn signed_volume(&self) -> f64 {
        self.triangles()
            .map(|t| t.v0.coords.dot(&t.v1.coords.cross(&t.v2.coords)))
            .sum::<f64>()
            / 6.0
    }

    /// Absolute enclosed volume.
    #[inline]
    #[must_use]
    pub fn volume(&self) -> f64 {
        self.signed_volume().abs()
    }

    /// Total surface area.
    #[must_use]
    pub fn surface_area(&self) -> f64 {
        self.triangles().map(|t| t.area()).sum()
    }

    /// Arithmetic mean of the vertex positions.
    ///
    /// Returns the origin for an empty mesh.
    #[must_use]
    pub fn vertex_centroid(&self) -> Point3<f64> {
        if self.vertices.is_empty() {
            return Point3::origin();
        }
        #[allow(clippy::cast_precision_loss)]
        let n = self.vertices.len() as f64;
        let sum: Vector3<f64> = self.vertices.iter().map(|v| v.position.coords).sum();
        Point3::from(sum / n)
    }

    /// Mean length over all face edges (each shared edge counted twice).
    #[must_use]
    pub fn mean_edge_length(&self) -> f64 {
        let mut total = 0.0;
        let mut count = 0_usize;
        for t in self.triangles() {
            total += t.edge_lengths().iter().sum::<f64>();
            count += 3;
        }
        if count == 0 {
            0.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            let n = count as f64;
            total / n
        }
    }

    /// Translate every vertex in place.
    pub fn translate(&mut self, offset: Vector3<f64>) {
        for v in &mut self.vertices {
            v.position += offset;
        }
    }

    /// Scale every vertex about the origin in place.
    pub fn scale(&mut self, factor: f64) {
        for v in &mut self.vertices {
            v.position.coords *= factor;
        }
    }

    /// Reverse the winding of every face.
    pub fn flip_faces(&mut self) {
        for f in &mut self.faces {
            f.swap(1, 2);
        }
    }

    /// A copy of the mesh with every position mapped through `f`.
    ///
    /// Normals are dropped since a general map does not preserve them.
    #[must_use]
    pub fn map_positions(&self, f: impl Fn(&Point3<f64>) -> Point3<f64>) -> Self {
        Self {
            vertices: self
                .vertices
                .iter()
                .map(|v| Vertex::new(f(&v.position)))
                .collect(),
            faces: self.faces.clone(),
        }
    }
}
