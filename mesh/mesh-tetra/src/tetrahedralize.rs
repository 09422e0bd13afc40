//! Volume meshing of closed surfaces.
//!
//! Surface vertices are inserted unchanged. Interior points come from a
//! body-centred cubic lattice and from circumcentres of poorly shaped
//! elements. Surface triangles that the triangulation misses are then
//! split at edge midpoints until each one is a union of element faces,
//! and the elements are carved along the recovered surface.

use std::fmt;
use std::ops::Range;

use hashbrown::{HashMap, HashSet};
use mesh_repair::{fix_winding, require_closed_manifold};
use mesh_types::{Aabb, IndexedMesh, Point3, TetMesh, Vector3};
use rayon::prelude::*;
use tracing::{debug, warn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::delaunay::{solid_elements, spatial_order, tetrahedron, Triangulation};
use crate::error::{TetraError, TetraResult};
use crate::quality::radius_edge_ratio;
use crate::winding::SurfaceField;

/// Lattice points must stay this many spacings away from the surface.
const LATTICE_MARGIN: f64 = 0.5;

/// Refinement points must stay this many spacings away from the surface.
const REFINEMENT_MARGIN: f64 = 0.25;

/// Rounds of surface splitting before recovery gives up.
const MAX_RECOVERY_ROUNDS: usize = 64;

/// Parameters for [`tetrahedralize`].
#[derive(Debug, Clone, PartialEq)]
pub struct TetMeshParams {
    /// Largest acceptable circumradius to shortest edge ratio (default: 1.2).
    pub quality_bound: f64,
    /// Interior point spacing as a multiple of the mean surface edge
    /// length (default: 1.0).
    pub interior_spacing: f64,
    /// Maximum number of refinement passes (default: 4).
    pub max_refinement_passes: u32,
    /// Maximum number of interior points, lattice and refinement
    /// together (default: 20000).
    pub max_steiner_points: usize,
    /// Maximum number of points placed on the surface to recover it
    /// (default: 10000).
    pub max_boundary_points: usize,
}

impl Default for TetMeshParams {
    fn default() -> Self {
        Self {
            quality_bound: 1.2,
            interior_spacing: 1.0,
            max_refinement_passes: 4,
            max_steiner_points: 20_000,
            max_boundary_points: 10_000,
        }
    }
}

impl TetMeshParams {
    /// Creates parameters with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the radius-edge quality bound.
    #[must_use]
    pub const fn with_quality_bound(mut self, bound: f64) -> Self {
        self.quality_bound = bound;
        self
    }

    /// Sets the interior spacing factor.
    #[must_use]
    pub const fn with_interior_spacing(mut self, factor: f64) -> Self {
        self.interior_spacing = factor;
        self
    }

    /// Sets the number of refinement passes.
    #[must_use]
    pub const fn with_max_refinement_passes(mut self, passes: u32) -> Self {
        self.max_refinement_passes = passes;
        self
    }

    /// Sets the interior point budget.
    #[must_use]
    pub const fn with_max_steiner_points(mut self, count: usize) -> Self {
        self.max_steiner_points = count;
        self
    }

    /// Sets the surface point budget.
    #[must_use]
    pub const fn with_max_boundary_points(mut self, count: usize) -> Self {
        self.max_boundary_points = count;
        self
    }

    fn validate(&self) -> TetraResult<()> {
        if !(self.quality_bound.is_finite() && self.quality_bound > 0.0) {
            return Err(TetraError::InvalidParameter(format!(
                "quality_bound must be positive, got {}",
                self.quality_bound
            )));
        }
        if !(self.interior_spacing.is_finite() && self.interior_spacing > 0.0) {
            return Err(TetraError::InvalidParameter(format!(
                "interior_spacing must be positive, got {}",
                self.interior_spacing
            )));
        }
        Ok(())
    }
}

/// What happened while meshing one surface.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TetMeshStats {
    /// Vertices of the input surface.
    pub surface_vertices: usize,
    /// Interior lattice points inserted.
    pub lattice_points: usize,
    /// Circumcentres inserted by refinement.
    pub refinement_points: usize,
    /// Edge midpoints placed on the surface during recovery.
    pub boundary_points: usize,
    /// Refinement passes run.
    pub refinement_passes: u32,
    /// Elements in the final mesh.
    pub elements: usize,
    /// Elements whose radius-edge ratio exceeds the bound.
    pub elements_over_bound: usize,
    /// Largest radius-edge ratio in the mesh.
    pub worst_radius_edge: f64,
    /// Pieces of the split surface that are not a face of any element.
    pub missing_surface_faces: usize,
}

impl fmt::Display for TetMeshStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} elements from {} surface + {} lattice + {} refinement + {} boundary points \
             ({} passes, {} over bound, worst radius-edge {:.3}, {} missing surface faces)",
            self.elements,
            self.surface_vertices,
            self.lattice_points,
            self.refinement_points,
            self.boundary_points,
            self.refinement_passes,
            self.elements_over_bound,
            self.worst_radius_edge,
            self.missing_surface_faces
        )
    }
}

/// Fills a closed surface with tetrahedra.
///
/// Surface vertices keep their indices as the first nodes of the result.
/// [`TetMesh::surface_nodes`] lists them followed by any points placed on
/// the surface during recovery. Elements are positively oriented and
/// their boundary is the input surface.
///
/// # Errors
///
/// Returns an error if the surface is empty, open, non-manifold or
/// non-orientable, if a parameter is out of range, if the surface cannot
/// be recovered within [`TetMeshParams::max_boundary_points`], or if no
/// element ends up inside the surface.
///
/// # Example
///
/// ```
/// use mesh_tetra::{tetrahedralize, TetMeshParams};
/// use mesh_types::icosphere;
///
/// let sphere = icosphere(1.0, 2);
/// let (mesh, stats) = tetrahedralize(&sphere, &TetMeshParams::default())?;
/// assert!((mesh.volume() - sphere.volume()).abs() < 1e-9);
/// assert_eq!(stats.missing_surface_faces, 0);
/// # Ok::<(), mesh_tetra::TetraError>(())
/// ```
pub fn tetrahedralize(
    surface: &IndexedMesh,
    params: &TetMeshParams,
) -> TetraResult<(TetMesh, TetMeshStats)> {
    params.validate()?;
    let mut surface = surface.clone();
    require_closed_manifold(&surface)?;
    fix_winding(&mut surface)?;

    let field = SurfaceField::new(&surface);
    let bounds = *field.bounds();
    let surface_count = surface.vertex_count();

    let spacing = params.interior_spacing * surface.mean_edge_length();
    let lattice = interior_lattice(&field, spacing, params.max_steiner_points);

    let mut positions = surface.positions();
    positions.extend_from_slice(&lattice);
    let mut triangulation = Triangulation::new(&bounds);
    let mut nodes = Nodes::insert_all(&mut triangulation, positions, &bounds);

    let mut stats = TetMeshStats {
        surface_vertices: surface_count,
        lattice_points: lattice.len(),
        ..TetMeshStats::default()
    };
    let mut budget = params.max_steiner_points.saturating_sub(lattice.len());

    for _ in 0..params.max_refinement_passes {
        if budget == 0 {
            break;
        }
        let elements = carve(&triangulation, &nodes.by_slot, &field);
        let candidates = refinement_candidates(
            &elements,
            &nodes.by_slot,
            &field,
            params.quality_bound,
            REFINEMENT_MARGIN * spacing,
            budget,
        );
        if candidates.is_empty() {
            break;
        }
        stats.refinement_passes += 1;
        for c in candidates {
            nodes.insert(&mut triangulation, c);
            stats.refinement_points += 1;
            budget -= 1;
        }
    }

    let boundary_start = nodes.positions.len();
    let mut split = SplitSurface::new(
        surface
            .faces
            .iter()
            .map(|f| f.map(|v| nodes.node_slot[v as usize]))
            .collect(),
    );
    stats.boundary_points = recover_boundary(
        &mut triangulation,
        &mut nodes,
        &mut split,
        params.max_boundary_points,
    )?;

    let elements = carve_along_surface(&triangulation, &nodes.by_slot, &field, &split);
    if elements.is_empty() {
        return Err(TetraError::NoInteriorElements);
    }

    let Nodes {
        positions,
        slot_node,
        ..
    } = nodes;
    let to_node = |slot: u32| slot_node[slot as usize];
    let elements: Vec<[u32; 4]> = elements.into_iter().map(|e| e.map(to_node)).collect();
    let boundary = boundary_start..positions.len();
    let (mesh, remap) = compact(positions, elements, surface_count, boundary);

    let pieces: Vec<[u32; 3]> = split
        .triangles
        .iter()
        .map(|t| t.map(|slot| remap[to_node(slot) as usize]))
        .collect();
    let ratios: Vec<f64> = mesh.tetrahedra().map(|t| radius_edge_ratio(&t)).collect();
    stats.elements = mesh.element_count();
    stats.elements_over_bound = ratios.iter().filter(|&&r| r > params.quality_bound).count();
    stats.worst_radius_edge = ratios.iter().copied().fold(0.0, f64::max);
    stats.missing_surface_faces = missing_faces(&pieces, &mesh);
    debug!(%stats, "tetrahedralized surface");

    Ok((mesh, stats))
}

/// Node positions in the caller's numbering next to the triangulation's
/// insertion order.
struct Nodes {
    positions: Vec<Point3<f64>>,
    by_slot: Vec<Point3<f64>>,
    slot_node: Vec<u32>,
    node_slot: Vec<u32>,
}

impl Nodes {
    /// Inserts `positions` along a space-filling curve.
    #[allow(clippy::cast_possible_truncation)]
    fn insert_all(
        triangulation: &mut Triangulation,
        positions: Vec<Point3<f64>>,
        bounds: &Aabb,
    ) -> Self {
        let order = spatial_order(&positions, bounds);
        let by_slot: Vec<Point3<f64>> = order.iter().map(|&i| positions[i]).collect();
        let slot_node: Vec<u32> = order.iter().map(|&i| i as u32).collect();
        let mut node_slot = vec![0; positions.len()];
        for (slot, &node) in order.iter().enumerate() {
            node_slot[node] = slot as u32;
        }
        for p in &by_slot {
            triangulation.insert(p);
        }
        Self {
            positions,
            by_slot,
            slot_node,
            node_slot,
        }
    }

    /// Adds one point as a new node and returns its slot.
    #[allow(clippy::cast_possible_truncation)]
    fn insert(&mut self, triangulation: &mut Triangulation, p: Point3<f64>) -> u32 {
        if !triangulation.insert(&p) {
            debug!(?p, "point merged with an existing vertex");
        }
        let slot = self.by_slot.len() as u32;
        self.by_slot.push(p);
        self.slot_node.push(self.positions.len() as u32);
        self.node_slot.push(slot);
        self.positions.push(p);
        slot
    }
}

/// Body-centred cubic lattice points inside the surface, at least
/// `LATTICE_MARGIN` spacings from it.
#[allow(clippy::cast_precision_loss)]
fn interior_lattice(field: &SurfaceField, spacing: f64, budget: usize) -> Vec<Point3<f64>> {
    let bounds = field.bounds();
    let size = bounds.size();
    if budget == 0 || spacing.is_nan() || spacing <= 0.0 || size.min() <= 0.0 {
        return Vec::new();
    }

    // Cube edge giving `spacing` between nearest lattice neighbours,
    // widened if the box would hold more points than the budget allows.
    let box_volume = size.x * size.y * size.z;
    let min_cube = (2.0 * box_volume / budget as f64).cbrt();
    let cube = (spacing * 2.0 / 3.0_f64.sqrt()).max(min_cube);

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let counts = size.map(|s| (s / cube).floor() as usize + 1);
    let start = bounds.center() - Vector3::new(
        (counts.x - 1) as f64,
        (counts.y - 1) as f64,
        (counts.z - 1) as f64,
    ) * (0.5 * cube);

    let mut candidates = Vec::new();
    for i in 0..counts.x {
        for j in 0..counts.y {
            for k in 0..counts.z {
                let corner = start + Vector3::new(i as f64, j as f64, k as f64) * cube;
                candidates.push(corner);
                candidates.push(corner + Vector3::repeat(0.5 * cube));
            }
        }
    }

    let margin = LATTICE_MARGIN * spacing;
    let mut kept: Vec<Point3<f64>> = candidates
        .into_par_iter()
        .filter(|p| field.is_inside(p) && field.distance(p) >= margin)
        .collect();
    kept.truncate(budget);
    kept
}

/// Elements of the current triangulation whose centroid is inside the
/// surface, as slot indices.
fn carve(
    triangulation: &Triangulation,
    by_slot: &[Point3<f64>],
    field: &SurfaceField,
) -> Vec<[u32; 4]> {
    triangulation
        .elements(by_slot)
        .into_par_iter()
        .filter(|&e| field.is_inside(&tetrahedron(by_slot, e).centroid()))
        .collect()
}

/// Circumcentres of elements over the quality bound, worst first, that
/// lie well inside the surface and away from each other.
fn refinement_candidates(
    elements: &[[u32; 4]],
    by_slot: &[Point3<f64>],
    field: &SurfaceField,
    bound: f64,
    margin: f64,
    budget: usize,
) -> Vec<Point3<f64>> {
    let mut bad: Vec<(f64, Point3<f64>, f64)> = elements
        .par_iter()
        .filter_map(|&e| {
            let tet = tetrahedron(by_slot, e);
            let ratio = radius_edge_ratio(&tet);
            if ratio <= bound || !ratio.is_finite() {
                return None;
            }
            let (center, radius) = tet.circumsphere()?;
            (field.is_inside(&center) && field.distance(&center) >= margin)
                .then_some((ratio, center, radius))
        })
        .collect();
    bad.sort_by(|a, b| b.0.total_cmp(&a.0));

    // Circumcentres of neighbouring bad elements nearly coincide; keep
    // one per half circumradius.
    let mut accepted: Vec<(Point3<f64>, f64)> = Vec::new();
    let mut grid: HashMap<[i64; 3], Vec<usize>> = HashMap::new();
    let cell_size = margin.max(f64::MIN_POSITIVE) * 4.0;
    #[allow(clippy::cast_possible_truncation)]
    let key = |p: &Point3<f64>| p.coords.map(|c| (c / cell_size).floor() as i64);
    for (_, center, radius) in bad {
        if accepted.len() >= budget {
            break;
        }
        let k = key(&center);
        let reach = (0.5 * radius / cell_size).ceil().clamp(1.0, 4.0);
        #[allow(clippy::cast_possible_truncation)]
        let reach = reach as i64;
        let mut crowded = false;
        'search: for dx in -reach..=reach {
            for dy in -reach..=reach {
                for dz in -reach..=reach {
                    let Some(list) = grid.get(&[k.x + dx, k.y + dy, k.z + dz]) else {
                        continue;
                    };
                    if list.iter().any(|&i| {
                        let (other, other_radius) = accepted[i];
                        (other - center).norm() < 0.5 * radius.min(other_radius)
                    }) {
                        crowded = true;
                        break 'search;
                    }
                }
            }
        }
        if !crowded {
            grid.entry([k.x, k.y, k.z]).or_default().push(accepted.len());
            accepted.push((center, radius));
        }
    }
    accepted.into_iter().map(|(c, _)| c).collect()
}

fn edge_key(a: u32, b: u32) -> [u32; 2] {
    if a < b {
        [a, b]
    } else {
        [b, a]
    }
}

fn sorted(mut face: [u32; 3]) -> [u32; 3] {
    face.sort_unstable();
    face
}

fn cell_faces([a, b, c, d]: [u32; 4]) -> [[u32; 3]; 4] {
    [[a, b, c], [a, b, d], [a, c, d], [b, c, d]].map(sorted)
}

fn cell_edges([a, b, c, d]: [u32; 4]) -> [[u32; 2]; 6] {
    [
        edge_key(a, b),
        edge_key(a, c),
        edge_key(a, d),
        edge_key(b, c),
        edge_key(b, d),
        edge_key(c, d),
    ]
}

/// The surface triangulation in slot numbering, refined by edge splits.
struct SplitSurface {
    triangles: Vec<[u32; 3]>,
    /// Triangles using each edge.
    edges: HashMap<[u32; 2], Vec<usize>>,
}

impl SplitSurface {
    fn new(triangles: Vec<[u32; 3]>) -> Self {
        let mut edges: HashMap<[u32; 2], Vec<usize>> = HashMap::new();
        for (t, &[a, b, c]) in triangles.iter().enumerate() {
            for key in [edge_key(a, b), edge_key(b, c), edge_key(c, a)] {
                edges.entry(key).or_default().push(t);
            }
        }
        Self { triangles, edges }
    }

    /// Splits every triangle on `edge` at slot `mid`, keeping winding.
    fn split(&mut self, edge: [u32; 2], mid: u32) {
        let Some(owners) = self.edges.remove(&edge) else {
            return;
        };
        for t in owners {
            let tri = self.triangles[t];
            let Some(i) = (0..3).find(|&i| edge_key(tri[i], tri[(i + 1) % 3]) == edge) else {
                continue;
            };
            let (p, q, r) = (tri[i], tri[(i + 1) % 3], tri[(i + 2) % 3]);
            let added = self.triangles.len();
            self.triangles[t] = [p, mid, r];
            self.triangles.push([mid, q, r]);

            if let Some(list) = self.edges.get_mut(&edge_key(q, r)) {
                for owner in list.iter_mut().filter(|o| **o == t) {
                    *owner = added;
                }
            }
            self.edges.entry(edge_key(p, mid)).or_default().push(t);
            self.edges.entry(edge_key(mid, q)).or_default().push(added);
            self.edges.entry(edge_key(mid, r)).or_default().extend([t, added]);
        }
    }
}

/// Splits surface edges at their midpoints until every piece of the
/// surface is a face of the triangulation. Returns the number of points
/// placed.
fn recover_boundary(
    triangulation: &mut Triangulation,
    nodes: &mut Nodes,
    split: &mut SplitSurface,
    budget: usize,
) -> TetraResult<usize> {
    let mut placed = 0;
    let mut round = 0;
    loop {
        let cells: Vec<[u32; 4]> = triangulation.interior_cells().collect();
        let faces: HashSet<[u32; 3]> = cells.iter().flat_map(|&c| cell_faces(c)).collect();
        let missing: Vec<[u32; 3]> = split
            .triangles
            .iter()
            .copied()
            .filter(|&t| !faces.contains(&sorted(t)))
            .collect();
        if missing.is_empty() {
            if placed > 0 {
                debug!(points = placed, rounds = round, "recovered surface");
            }
            return Ok(placed);
        }

        // A missing edge is split first; a triangle whose edges all exist
        // loses its longest one.
        let edges: HashSet<[u32; 2]> = cells.iter().flat_map(|&c| cell_edges(c)).collect();
        let length =
            |[a, b]: [u32; 2]| (nodes.by_slot[a as usize] - nodes.by_slot[b as usize]).norm();
        let by_length = |x: &[u32; 2], y: &[u32; 2]| length(*x).total_cmp(&length(*y));
        let mut chosen: Vec<[u32; 2]> = missing
            .iter()
            .filter_map(|&[a, b, c]| {
                let sides = [edge_key(a, b), edge_key(b, c), edge_key(c, a)];
                sides
                    .iter()
                    .copied()
                    .filter(|e| !edges.contains(e))
                    .max_by(by_length)
                    .or_else(|| sides.into_iter().max_by(by_length))
            })
            .collect();
        chosen.sort_unstable();
        chosen.dedup();

        if round == MAX_RECOVERY_ROUNDS || placed + chosen.len() > budget {
            warn!(
                points = placed,
                missing = missing.len(),
                "surface recovery stopped"
            );
            return Err(TetraError::BoundaryRecovery {
                missing_faces: missing.len(),
            });
        }
        for edge in chosen {
            let [a, b] = edge.map(|s| nodes.by_slot[s as usize]);
            let mid = Point3::from((a.coords + b.coords) * 0.5);
            let slot = nodes.insert(triangulation, mid);
            split.split(edge, slot);
            placed += 1;
        }
        round += 1;
    }
}

/// Elements on the inner side of the recovered surface, as slot indices.
///
/// Cells are grouped into regions connected across faces that are not
/// part of the surface. A region is kept when most of its volume has its
/// centroid inside the surface.
fn carve_along_surface(
    triangulation: &Triangulation,
    by_slot: &[Point3<f64>],
    field: &SurfaceField,
    split: &SplitSurface,
) -> Vec<[u32; 4]> {
    let cells: Vec<[u32; 4]> = triangulation.interior_cells().collect();
    let walls: HashSet<[u32; 3]> = split.triangles.iter().map(|&t| sorted(t)).collect();

    let mut sharing: HashMap<[u32; 3], Vec<usize>> = HashMap::new();
    for (i, &cell) in cells.iter().enumerate() {
        for face in cell_faces(cell) {
            if !walls.contains(&face) {
                sharing.entry(face).or_default().push(i);
            }
        }
    }
    let mut neighbours = vec![Vec::new(); cells.len()];
    for owners in sharing.values() {
        if let &[a, b] = owners.as_slice() {
            neighbours[a].push(b);
            neighbours[b].push(a);
        }
    }

    let mut region = vec![usize::MAX; cells.len()];
    let mut region_count = 0;
    for start in 0..cells.len() {
        if region[start] != usize::MAX {
            continue;
        }
        region[start] = region_count;
        let mut stack = vec![start];
        while let Some(i) = stack.pop() {
            for &j in &neighbours[i] {
                if region[j] == usize::MAX {
                    region[j] = region_count;
                    stack.push(j);
                }
            }
        }
        region_count += 1;
    }

    let votes: Vec<f64> = cells
        .par_iter()
        .map(|&cell| {
            let tet = tetrahedron(by_slot, cell);
            let weight = tet.signed_volume().abs();
            if field.is_inside(&tet.centroid()) {
                weight
            } else {
                -weight
            }
        })
        .collect();
    let mut balance = vec![0.0; region_count];
    for (&r, vote) in region.iter().zip(&votes) {
        balance[r] += vote;
    }

    let inside = cells
        .into_iter()
        .zip(region)
        .filter(|&(_, r)| balance[r] > 0.0)
        .map(|(cell, _)| cell);
    solid_elements(by_slot, inside)
}

/// Drops interior nodes no element uses. Surface vertices stay first;
/// `boundary` nodes are kept and listed after them as surface nodes.
/// Returns the mesh and the old-to-new node map.
fn compact(
    nodes: Vec<Point3<f64>>,
    elements: Vec<[u32; 4]>,
    surface_count: usize,
    boundary: Range<usize>,
) -> (TetMesh, Vec<u32>) {
    let mut used = vec![false; nodes.len()];
    for &v in elements.iter().flatten() {
        used[v as usize] = true;
    }
    let mut remap = vec![u32::MAX; nodes.len()];
    let mut kept = Vec::with_capacity(nodes.len());
    for (i, p) in nodes.into_iter().enumerate() {
        if i < surface_count || boundary.contains(&i) || used[i] {
            #[allow(clippy::cast_possible_truncation)]
            let index = kept.len() as u32;
            remap[i] = index;
            kept.push(p);
        }
    }
    #[allow(clippy::cast_possible_truncation)]
    let surface_nodes = (0..surface_count as u32)
        .chain(boundary.map(|i| remap[i]))
        .collect();
    let mesh = TetMesh {
        nodes: kept,
        elements: elements
            .into_iter()
            .map(|e| e.map(|v| remap[v as usize]))
            .collect(),
        surface_nodes,
    };
    (mesh, remap)
}

/// Surface pieces not matched by an element face.
fn missing_faces(pieces: &[[u32; 3]], mesh: &TetMesh) -> usize {
    let element_faces: HashSet<[u32; 3]> =
        mesh.elements.iter().flat_map(|&e| cell_faces(e)).collect();
    pieces
        .iter()
        .filter(|&&f| !element_faces.contains(&sorted(f)))
        .count()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use mesh_types::{icosphere, unit_cube, uv_ellipsoid};

    /// Prism over the L outline (0,0) (3,0) (3,1) (1,1) (1,3) (0,3), one
    /// unit tall. Volume 5, centroid (1.1, 1.1, 0.5).
    fn l_prism() -> IndexedMesh {
        let outline = [[0.0, 0.0], [3.0, 0.0], [3.0, 1.0], [1.0, 1.0], [1.0, 3.0], [0.0, 3.0]];
        let positions: Vec<f64> = [0.0, 1.0]
            .iter()
            .flat_map(|&z| outline.iter().flat_map(move |&[x, y]| [x, y, z]))
            .collect();
        let mut indices = Vec::new();
        for [a, b, c] in [[0, 1, 2], [0, 2, 3], [0, 3, 4], [0, 4, 5]] {
            indices.extend([a, c, b]);
            indices.extend([a + 6, b + 6, c + 6]);
        }
        for i in 0..6 {
            let j = (i + 1) % 6;
            indices.extend([i, j, j + 6, i, j + 6, i + 6]);
        }
        IndexedMesh::from_raw(&positions, &indices)
    }

    #[test]
    fn cube_is_filled_exactly() {
        let cube = unit_cube();
        let (mesh, stats) = tetrahedralize(&cube, &TetMeshParams::default()).unwrap();
        assert_relative_eq!(mesh.volume(), 1.0, epsilon = 1e-9);
        assert_eq!(mesh.surface_nodes.len(), 8 + stats.boundary_points);
        assert_eq!(&mesh.nodes[..8], &cube.positions()[..]);
        assert_eq!(stats.elements, mesh.element_count());
        assert!(mesh.tetrahedra().all(|t| t.signed_volume() > 0.0));
    }

    #[test]
    fn sphere_gets_interior_points() {
        let sphere = icosphere(1.0, 3);
        let (mesh, stats) = tetrahedralize(&sphere, &TetMeshParams::default()).unwrap();
        assert!(stats.lattice_points > 0);
        assert_eq!(stats.boundary_points, 0);
        assert!(mesh.node_count() > sphere.vertex_count());
        assert_relative_eq!(mesh.volume(), sphere.volume(), max_relative = 1e-9);
        // Every interior node stays off the surface.
        let field = SurfaceField::new(&sphere);
        for p in &mesh.nodes[sphere.vertex_count()..] {
            assert!(field.is_inside(p));
        }
    }

    #[test]
    fn refinement_keeps_the_surface() {
        let ellipsoid = uv_ellipsoid(Vector3::new(2.0, 1.0, 1.0), 24, 12);
        let coarse = TetMeshParams::default().with_max_refinement_passes(0);
        let (unrefined, before) = tetrahedralize(&ellipsoid, &coarse).unwrap();
        let (mesh, after) = tetrahedralize(&ellipsoid, &TetMeshParams::default()).unwrap();
        assert_eq!(before.refinement_points, 0);
        assert_eq!(before.refinement_passes, 0);
        assert!(after.refinement_passes <= 4);
        assert!(after.elements_over_bound <= after.elements);
        assert_relative_eq!(unrefined.volume(), ellipsoid.volume(), max_relative = 1e-9);
        assert_relative_eq!(mesh.volume(), ellipsoid.volume(), max_relative = 1e-9);
        assert_eq!(&mesh.nodes[..ellipsoid.vertex_count()], &ellipsoid.positions()[..]);
    }

    #[test]
    fn steiner_budget_is_respected() {
        let sphere = icosphere(1.0, 3);
        let params = TetMeshParams::default().with_max_steiner_points(25);
        let (mesh, stats) = tetrahedralize(&sphere, &params).unwrap();
        assert!(stats.lattice_points + stats.refinement_points <= 25);
        assert!(mesh.node_count() <= sphere.vertex_count() + 25);
    }

    #[test]
    fn inside_out_surface_is_reoriented() {
        let mut sphere = icosphere(1.0, 2);
        sphere.flip_faces();
        let (mesh, _) = tetrahedralize(&sphere, &TetMeshParams::default()).unwrap();
        assert_relative_eq!(mesh.volume(), sphere.volume(), max_relative = 1e-9);
    }

    #[test]
    fn open_surface_is_rejected() {
        let mut sphere = icosphere(1.0, 1);
        sphere.faces.pop();
        assert!(matches!(
            tetrahedralize(&sphere, &TetMeshParams::default()),
            Err(TetraError::OpenSurface { boundary_edges: 3 })
        ));
        assert!(matches!(
            tetrahedralize(&IndexedMesh::new(), &TetMeshParams::default()),
            Err(TetraError::EmptySurface)
        ));
    }

    #[test]
    fn non_convex_prism_is_filled_exactly() {
        let prism = l_prism();
        assert_relative_eq!(prism.volume(), 5.0, epsilon = 1e-12);

        let (mesh, stats) = tetrahedralize(&prism, &TetMeshParams::default()).unwrap();
        assert_relative_eq!(mesh.volume(), prism.volume(), epsilon = 1e-9);
        assert!(mesh.tetrahedra().all(|t| t.signed_volume() > 0.0));
        // The obtuse floor triangle (0, 2, 3) has vertex 1 inside its
        // circumcircle, so it cannot survive without splitting.
        assert!(stats.boundary_points > 0);
        assert_eq!(stats.missing_surface_faces, 0);
        assert_eq!(mesh.surface_nodes.len(), 12 + stats.boundary_points);
        assert_eq!(&mesh.nodes[..12], &prism.positions()[..]);

        let field = SurfaceField::new(&prism);
        for &v in &mesh.surface_nodes {
            assert!(field.distance(&mesh.nodes[v as usize]) < 1e-9);
        }
        let centroid = mesh
            .tetrahedra()
            .fold(Vector3::zeros(), |acc, t| acc + t.centroid().coords * t.volume())
            / mesh.volume();
        assert_relative_eq!(centroid, Vector3::new(1.1, 1.1, 0.5), epsilon = 1e-9);
    }

    #[test]
    fn recovery_budget_is_respected() {
        let params = TetMeshParams::default().with_max_boundary_points(0);
        assert!(matches!(
            tetrahedralize(&l_prism(), &params),
            Err(TetraError::BoundaryRecovery { missing_faces }) if missing_faces > 0
        ));
    }

    #[test]
    fn split_surface_keeps_winding() {
        let mut split = SplitSurface::new(vec![[0, 1, 2], [1, 0, 3]]);
        split.split(edge_key(0, 1), 4);
        assert_eq!(split.triangles, vec![[0, 4, 2], [1, 4, 3], [4, 1, 2], [4, 0, 3]]);
        assert!(!split.edges.contains_key(&edge_key(0, 1)));
        assert_eq!(split.edges[&edge_key(2, 4)], vec![0, 2]);
        assert_eq!(split.edges[&edge_key(1, 2)], vec![2]);
        assert_eq!(split.edges[&edge_key(0, 4)].len(), 2);
    }

    #[test]
    fn invalid_parameters() {
        let cube = unit_cube();
        let params = TetMeshParams::default().with_interior_spacing(0.0);
        assert!(matches!(
            tetrahedralize(&cube, &params),
            Err(TetraError::InvalidParameter(_))
        ));
    }
}
