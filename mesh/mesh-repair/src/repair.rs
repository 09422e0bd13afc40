//! Clean-up operations that turn a raw triangle soup into an indexed surface.

use hashbrown::{HashMap, HashSet};
use mesh_types::{IndexedMesh, MeshBounds, Point3};

/// Configuration parameters for surface clean-up.
///
/// Tolerances are relative to the bounding-box diagonal so that the same
/// parameters work for surfaces in micrometres or millimetres.
///
/// # Example
///
/// ```
/// use mesh_repair::RepairParams;
///
/// let params = RepairParams::default().with_relative_weld_epsilon(1e-6);
/// assert_eq!(params.relative_weld_epsilon, 1e-6);
/// ```
#[derive(Debug, Clone)]
pub struct RepairParams {
    /// Vertices closer than this fraction of the bounding-box diagonal are
    /// merged. Default: `1e-7`.
    pub relative_weld_epsilon: f64,

    /// Faces whose area is below this fraction of the squared diagonal are
    /// removed. Default: `1e-14`.
    pub relative_area_threshold: f64,
}

impl Default for RepairParams {
    fn default() -> Self {
        Self {
            relative_weld_epsilon: 1e-7,
            relative_area_threshold: 1e-14,
        }
    }
}

impl RepairParams {
    /// Set the relative welding distance.
    #[must_use]
    pub const fn with_relative_weld_epsilon(mut self, epsilon: f64) -> Self {
        self.relative_weld_epsilon = epsilon;
        self
    }

    /// Set the relative degenerate-area threshold.
    #[must_use]
    pub const fn with_relative_area_threshold(mut self, threshold: f64) -> Self {
        self.relative_area_threshold = threshold;
        self
    }
}

/// What the clean-up pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepairSummary {
    /// Vertices merged into another vertex.
    pub vertices_welded: usize,
    /// Zero-area or collapsed faces removed.
    pub degenerate_faces_removed: usize,
    /// Repeated faces removed.
    pub duplicate_faces_removed: usize,
    /// Vertices dropped because no face used them.
    pub unreferenced_vertices_removed: usize,
    /// Faces whose winding was reversed.
    pub faces_flipped: usize,
}

impl std::fmt::Display for RepairSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "welded {} vertices, removed {} degenerate + {} duplicate faces and {} unused vertices, flipped {} faces",
            self.vertices_welded,
            self.degenerate_faces_removed,
            self.duplicate_faces_removed,
            self.unreferenced_vertices_removed,
            self.faces_flipped
        )
    }
}

/// Clean a mesh in place: weld, drop degenerate and duplicate faces, then
/// compact the vertex array.
pub fn clean_mesh(mesh: &mut IndexedMesh, params: &RepairParams) -> RepairSummary {
    let diagonal = mesh.bounds().diagonal();
    let mut summary = RepairSummary {
        vertices_welded: weld_vertices(mesh, params.relative_weld_epsilon * diagonal),
        ..RepairSummary::default()
    };
    summary.degenerate_faces_removed =
        remove_degenerate_triangles(mesh, params.relative_area_threshold * diagonal * diagonal);
    summary.duplicate_faces_removed = remove_duplicate_faces(mesh);
    summary.unreferenced_vertices_removed = remove_unreferenced_vertices(mesh);
    summary
}

/// Weld vertices that are within `epsilon` of each other.
///
/// Uses a spatial hash with cells of twice the tolerance and checks the
/// 3x3x3 neighbourhood. Faces that collapse are removed. Returns the number
/// of vertices merged.
///
/// # Example
///
/// ```
/// use mesh_types::{IndexedMesh, Vertex};
/// use mesh_repair::weld_vertices;
///
/// let mut mesh = IndexedMesh::new();
/// mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0));
/// mesh.vertices.push(Vertex::from_coords(1.0, 0.0, 0.0));
/// mesh.vertices.push(Vertex::from_coords(0.0, 1.0, 0.0));
/// mesh.vertices.push(Vertex::from_coords(1.0001, 0.0, 0.0));
/// mesh.faces.push([0, 1, 2]);
/// mesh.faces.push([0, 3, 2]);
///
/// assert_eq!(weld_vertices(&mut mesh, 0.001), 1);
/// ```
pub fn weld_vertices(mesh: &mut IndexedMesh, epsilon: f64) -> usize {
    if mesh.vertices.is_empty() {
        return 0;
    }
    // Exact duplicates still merge when the tolerance underflows.
    let epsilon = epsilon.max(f64::MIN_POSITIVE);
    let cell_size = epsilon * 2.0;

    let mut grid: HashMap<(i64, i64, i64), Vec<u32>> = HashMap::new();
    for (idx, vertex) in mesh.vertices.iter().enumerate() {
        #[allow(clippy::cast_possible_truncation)]
        grid.entry(cell_of(&vertex.position, cell_size))
            .or_default()
            .push(idx as u32);
    }

    #[allow(clippy::cast_possible_truncation)]
    let mut remap: Vec<u32> = (0..mesh.vertices.len() as u32).collect();
    let mut merged = 0;

    for (idx, vertex) in mesh.vertices.iter().enumerate() {
        #[allow(clippy::cast_possible_truncation)]
        let idx = idx as u32;
        if remap[idx as usize] != idx {
            continue;
        }
        let (cx, cy, cz) = cell_of(&vertex.position, cell_size);
        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    let Some(candidates) = grid.get(&(cx + dx, cy + dy, cz + dz)) else {
                        continue;
                    };
                    for &other in candidates {
                        if other <= idx || remap[other as usize] != other {
                            continue;
                        }
                        let d = (vertex.position - mesh.vertices[other as usize].position).norm();
                        if d <= epsilon {
                            remap[other as usize] = idx;
                            merged += 1;
                        }
                    }
                }
            }
        }
    }

    if merged > 0 {
        for face in &mut mesh.faces {
            for v in face.iter_mut() {
                *v = remap[*v as usize];
            }
        }
        mesh.faces.retain(|&[a, b, c]| a != b && b != c && a != c);
    }
    merged
}

#[allow(clippy::cast_possible_truncation)]
fn cell_of(p: &Point3<f64>, cell_size: f64) -> (i64, i64, i64) {
    (
        (p.x / cell_size).floor() as i64,
        (p.y / cell_size).floor() as i64,
        (p.z / cell_size).floor() as i64,
    )
}

/// Remove faces with an out-of-range index, a repeated index, or an area at
/// or below `area_threshold`. Returns the number of faces removed.
pub fn remove_degenerate_triangles(mesh: &mut IndexedMesh, area_threshold: f64) -> usize {
    let before = mesh.faces.len();
    let vertices = &mesh.vertices;
    mesh.faces.retain(|&[a, b, c]| {
        if a == b || b == c || a == c {
            return false;
        }
        let (Some(p), Some(q), Some(r)) = (
            vertices.get(a as usize),
            vertices.get(b as usize),
            vertices.get(c as usize),
        ) else {
            return false;
        };
        let area = 0.5 * (q.position - p.position).cross(&(r.position - p.position)).norm();
        area > area_threshold
    });
    before - mesh.faces.len()
}

/// Remove repeated faces.
///
/// Two faces with the same vertex set and the same winding are duplicates;
/// the later one is dropped. A pair with opposite winding encloses no volume
/// and both faces are dropped. Returns the number of faces removed.
pub fn remove_duplicate_faces(mesh: &mut IndexedMesh) -> usize {
    let before = mesh.faces.len();
    let mut first_seen: HashMap<[u32; 3], (usize, [u32; 3])> = HashMap::new();
    let mut drop: HashSet<usize> = HashSet::new();

    for (i, face) in mesh.faces.iter().enumerate() {
        let mut key = *face;
        key.sort_unstable();
        match first_seen.get(&key) {
            Some(&(j, other)) => {
                drop.insert(i);
                if rotate_min_first(other) != rotate_min_first(*face) {
                    drop.insert(j);
                }
            }
            None => {
                first_seen.insert(key, (i, *face));
            }
        }
    }

    if drop.is_empty() {
        return 0;
    }
    let mut idx = 0;
    mesh.faces.retain(|_| {
        let keep = !drop.contains(&idx);
        idx += 1;
        keep
    });
    before - mesh.faces.len()
}

fn rotate_min_first(face: [u32; 3]) -> [u32; 3] {
    let k = (0..3).min_by_key(|&i| face[i]).unwrap_or(0);
    [face[k], face[(k + 1) % 3], face[(k + 2) % 3]]
}

/// Remove vertices no face references and compact the vertex array.
///
/// Returns the number of vertices removed.
///
/// # Example
///
/// ```
/// use mesh_types::{IndexedMesh, Vertex};
/// use mesh_repair::remove_unreferenced_vertices;
///
/// let mut mesh = IndexedMesh::new();
/// mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0));
/// mesh.vertices.push(Vertex::from_coords(1.0, 0.0, 0.0));
/// mesh.vertices.push(Vertex::from_coords(0.0, 1.0, 0.0));
/// mesh.vertices.push(Vertex::from_coords(100.0, 100.0, 100.0));
/// mesh.faces.push([0, 1, 2]);
///
/// assert_eq!(remove_unreferenced_vertices(&mut mesh), 1);
/// assert_eq!(mesh.vertices.len(), 3);
/// ```
pub fn remove_unreferenced_vertices(mesh: &mut IndexedMesh) -> usize {
    let before = mesh.vertices.len();
    let mut used = vec![false; before];
    for &v in mesh.faces.iter().flatten() {
        if let Some(u) = used.get_mut(v as usize) {
            *u = true;
        }
    }
    if used.iter().all(|&u| u) {
        return 0;
    }

    let mut remap = vec![u32::MAX; before];
    let mut kept = Vec::with_capacity(before);
    for (old, vertex) in mesh.vertices.iter().enumerate() {
        if used[old] {
            #[allow(clippy::cast_possible_truncation)]
            {
                remap[old] = kept.len() as u32;
            }
            kept.push(*vertex);
        }
    }
    for face in &mut mesh.faces {
        for v in face.iter_mut() {
            *v = remap.get(*v as usize).copied().unwrap_or(u32::MAX);
        }
    }
    mesh.vertices = kept;
    before - mesh.vertices.len()
}
