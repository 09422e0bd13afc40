//! Incremental 3-D Delaunay tetrahedralization.
//!
//! Bowyer–Watson insertion inside a large enclosing tetrahedron:
//!
//! 1. locate the cell containing the new point by walking across faces,
//! 2. grow the cavity of cells whose circumsphere contains the point,
//! 3. shrink the cavity until every boundary face is visible from the
//!    point (rounding can break the star shape of the exact cavity),
//! 4. connect the point to the cavity boundary.
//!
//! Points are scaled into a unit box and perturbed by a deterministic
//! sub-nanometre jitter, which resolves the cospherical configurations
//! that lattices and sphere tessellations are full of. Orientation of the
//! output is recomputed in the caller's coordinates.

use hashbrown::HashMap;
use mesh_types::{Aabb, Point3, Tetrahedron, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{TetraError, TetraResult};

const NONE: u32 = u32::MAX;

/// Half-size of the enclosing tetrahedron relative to the unit box.
const SUPER_SCALE: f64 = 100.0;

/// Relative perturbation applied to every inserted point.
const JITTER: f64 = 1e-9;

/// Points closer than this (in unit-box coordinates) to an existing
/// vertex are not inserted.
const MERGE_DISTANCE: f64 = 1e-8;

const JITTER_SEED: u64 = 0x5eed_de1a;

/// Elements flatter than this fraction of their longest edge cubed are
/// dropped from the output.
pub(crate) const DEGENERATE_VOLUME: f64 = 1e-12;

fn orient(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>, d: &Point3<f64>) -> f64 {
    (b - a).cross(&(c - a)).dot(&(d - a))
}

#[derive(Debug, Clone)]
struct Cell {
    vertices: [u32; 4],
    /// Neighbour across the face opposite each vertex.
    neighbors: [u32; 4],
    center: Point3<f64>,
    radius_sq: f64,
    alive: bool,
}

impl Cell {
    fn contains_in_sphere(&self, p: &Point3<f64>) -> bool {
        (p - self.center).norm_squared() < self.radius_sq
    }
}

/// Mutable Delaunay tetrahedralization in unit-box coordinates.
///
/// Point `i` of the caller is vertex `i + 4`; vertices 0 to 3 belong to
/// the enclosing tetrahedron.
pub(crate) struct Triangulation {
    origin: Point3<f64>,
    scale: f64,
    rng: StdRng,
    local: Vec<Point3<f64>>,
    cells: Vec<Cell>,
    free: Vec<u32>,
    mark: Vec<u32>,
    epoch: u32,
    last: u32,
}

impl Triangulation {
    /// Empty triangulation able to hold points inside `bounds`.
    pub(crate) fn new(bounds: &Aabb) -> Self {
        let scale = bounds.max_extent().max(f64::MIN_POSITIVE);
        let mut corners = [
            Point3::new(1.0, 1.0, 1.0),
            Point3::new(1.0, -1.0, -1.0),
            Point3::new(-1.0, 1.0, -1.0),
            Point3::new(-1.0, -1.0, 1.0),
        ]
        .map(|p| Point3::from(p.coords * SUPER_SCALE));
        if orient(&corners[0], &corners[1], &corners[2], &corners[3]) < 0.0 {
            corners.swap(2, 3);
        }

        let mut triangulation = Self {
            origin: bounds.center(),
            scale,
            rng: StdRng::seed_from_u64(JITTER_SEED),
            local: corners.to_vec(),
            cells: Vec::new(),
            free: Vec::new(),
            mark: Vec::new(),
            epoch: 0,
            last: 0,
        };
        let root = triangulation.make_cell([0, 1, 2, 3]);
        triangulation.cells.push(root);
        triangulation.mark.push(0);
        triangulation
    }

    fn make_cell(&self, vertices: [u32; 4]) -> Cell {
        let [a, b, c, d] = vertices.map(|v| self.local[v as usize]);
        let tet = Tetrahedron::new(a, b, c, d);
        let (center, radius_sq) = match tet.circumsphere() {
            Some((center, radius)) => (center, radius * radius),
            None => (tet.centroid(), f64::INFINITY),
        };
        Cell {
            vertices,
            neighbors: [NONE; 4],
            center,
            radius_sq,
            alive: true,
        }
    }

    fn alloc(&mut self, cell: Cell) -> u32 {
        if let Some(slot) = self.free.pop() {
            self.cells[slot as usize] = cell;
            slot
        } else {
            self.cells.push(cell);
            self.mark.push(0);
            #[allow(clippy::cast_possible_truncation)]
            let slot = (self.cells.len() - 1) as u32;
            slot
        }
    }

    fn to_local(&mut self, p: &Point3<f64>) -> Point3<f64> {
        let jitter = Vector3::new(
            self.rng.gen_range(-JITTER..JITTER),
            self.rng.gen_range(-JITTER..JITTER),
            self.rng.gen_range(-JITTER..JITTER),
        );
        Point3::from((p - self.origin) / self.scale + jitter)
    }

    /// Inserts a point. Returns `false` if it was skipped (duplicate,
    /// out of range or unlocatable); the point still consumes an index.
    pub(crate) fn insert(&mut self, p: &Point3<f64>) -> bool {
        let q = self.to_local(p);
        #[allow(clippy::cast_possible_truncation)]
        let index = self.local.len() as u32;
        self.local.push(q);

        if !q.coords.iter().all(|c| c.is_finite() && c.abs() < 0.25 * SUPER_SCALE) {
            return false;
        }
        let Some(start) = self.locate(&q) else {
            return false;
        };
        let near_duplicate = self.cells[start as usize]
            .vertices
            .iter()
            .any(|&v| (self.local[v as usize] - q).norm() < MERGE_DISTANCE);
        if near_duplicate {
            return false;
        }
        let Some((members, boundary)) = self.cavity(start, &q) else {
            return false;
        };
        self.fill(&members, &boundary, index);
        true
    }

    fn face_points(&self, cell: u32, replace: usize, q: &Point3<f64>) -> [Point3<f64>; 4] {
        let mut points = self.cells[cell as usize]
            .vertices
            .map(|v| self.local[v as usize]);
        points[replace] = *q;
        points
    }

    /// True if `q` is strictly on the inner side of the face opposite
    /// vertex `k` of `cell`.
    fn sees(&self, cell: u32, k: usize, q: &Point3<f64>) -> bool {
        let [a, b, c, d] = self.face_points(cell, k, q);
        orient(&a, &b, &c, &d) > 0.0
    }

    fn locate(&self, q: &Point3<f64>) -> Option<u32> {
        let mut current = if self.cells[self.last as usize].alive {
            self.last
        } else {
            self.first_alive()?
        };
        let limit = 4 * self.cells.len() + 16;
        for step in 0..limit {
            let mut next = None;
            for i in 0..4 {
                let k = (i + step) % 4;
                let [a, b, c, d] = self.face_points(current, k, q);
                if orient(&a, &b, &c, &d) < 0.0 {
                    next = Some(self.cells[current as usize].neighbors[k]);
                    break;
                }
            }
            match next {
                None => return Some(current),
                Some(NONE) => return None,
                Some(cell) => current = cell,
            }
        }
        self.locate_exhaustive(q)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn first_alive(&self) -> Option<u32> {
        self.cells.iter().position(|c| c.alive).map(|i| i as u32)
    }

    /// Fallback when the walk cycles: any cell containing `q`, else any
    /// cell whose circumsphere does.
    #[allow(clippy::cast_possible_truncation)]
    fn locate_exhaustive(&self, q: &Point3<f64>) -> Option<u32> {
        let alive = || {
            self.cells
                .iter()
                .enumerate()
                .filter(|(_, c)| c.alive)
                .map(|(i, c)| (i as u32, c))
        };
        alive()
            .find(|&(i, _)| {
                (0..4).all(|k| {
                    let [a, b, c, d] = self.face_points(i, k, q);
                    orient(&a, &b, &c, &d) >= 0.0
                })
            })
            .or_else(|| alive().find(|(_, c)| c.contains_in_sphere(q)))
            .map(|(i, _)| i)
    }

    fn next_epoch(&mut self) -> u32 {
        self.epoch = self.epoch.wrapping_add(1);
        if self.epoch == 0 {
            self.mark.iter_mut().for_each(|m| *m = 0);
            self.epoch = 1;
        }
        self.epoch
    }

    /// Cells to delete and their boundary faces as `(cell, opposite vertex)`.
    #[allow(clippy::type_complexity)]
    fn cavity(&mut self, seed: u32, q: &Point3<f64>) -> Option<(Vec<u32>, Vec<(u32, usize)>)> {
        let mut epoch = self.next_epoch();
        self.mark[seed as usize] = epoch;
        let mut members = vec![seed];
        let mut i = 0;
        while i < members.len() {
            let cell = members[i];
            i += 1;
            for nb in self.cells[cell as usize].neighbors {
                if nb != NONE
                    && self.mark[nb as usize] != epoch
                    && self.cells[nb as usize].contains_in_sphere(q)
                {
                    self.mark[nb as usize] = epoch;
                    members.push(nb);
                }
            }
        }

        loop {
            let boundary: Vec<(u32, usize)> = members
                .iter()
                .flat_map(|&cell| (0..4).map(move |k| (cell, k)))
                .filter(|&(cell, k)| {
                    let nb = self.cells[cell as usize].neighbors[k];
                    nb == NONE || self.mark[nb as usize] != epoch
                })
                .collect();

            let hidden: Vec<u32> = boundary
                .iter()
                .filter(|&&(cell, k)| !self.sees(cell, k, q))
                .map(|&(cell, _)| cell)
                .collect();
            if hidden.is_empty() {
                return Some((members, boundary));
            }
            if hidden.contains(&seed) {
                return None;
            }

            // Drop the offending cells and keep what is still connected
            // to the seed.
            for &cell in &hidden {
                self.mark[cell as usize] = 0;
            }
            let previous = epoch;
            epoch = self.next_epoch();
            self.mark[seed as usize] = epoch;
            members.clear();
            members.push(seed);
            let mut i = 0;
            while i < members.len() {
                let cell = members[i];
                i += 1;
                for nb in self.cells[cell as usize].neighbors {
                    if nb != NONE && self.mark[nb as usize] == previous {
                        self.mark[nb as usize] = epoch;
                        members.push(nb);
                    }
                }
            }
        }
    }

    fn fill(&mut self, members: &[u32], boundary: &[(u32, usize)], index: u32) {
        let mut open_faces: HashMap<(u32, u32), (u32, usize)> =
            HashMap::with_capacity(boundary.len() * 2);

        // Fresh slots only: freed cavity cells are recycled by later
        // insertions, so outer neighbours can be matched by old cell id.
        let reusable = std::mem::take(&mut self.free);
        let mut reusable = reusable.into_iter();

        for &(old, k) in boundary {
            let (mut vertices, outer) = {
                let cell = &self.cells[old as usize];
                (cell.vertices, cell.neighbors[k])
            };
            vertices[k] = index;
            let mut cell = self.make_cell(vertices);
            cell.neighbors[k] = outer;
            let created = match reusable.next() {
                Some(slot) => {
                    self.cells[slot as usize] = cell;
                    slot
                }
                None => self.alloc(cell),
            };

            if outer != NONE {
                if let Some(back) = self.cells[outer as usize]
                    .neighbors
                    .iter_mut()
                    .find(|n| **n == old)
                {
                    *back = created;
                }
            }

            for j in (0..4).filter(|&j| j != k) {
                let mut edge = [0u32; 2];
                let mut e = 0;
                for (m, &v) in vertices.iter().enumerate() {
                    if m != j && m != k {
                        edge[e] = v;
                        e += 1;
                    }
                }
                let key = (edge[0].min(edge[1]), edge[0].max(edge[1]));
                if let Some((other, other_face)) = open_faces.remove(&key) {
                    self.cells[created as usize].neighbors[j] = other;
                    self.cells[other as usize].neighbors[other_face] = created;
                } else {
                    open_faces.insert(key, (created, j));
                }
            }
            self.last = created;
        }

        self.free.extend(reusable);
        for &cell in members {
            self.cells[cell as usize].alive = false;
            self.free.push(cell);
        }
    }

    /// Live cells not touching the enclosing tetrahedron, as caller point
    /// indices.
    pub(crate) fn interior_cells(&self) -> impl Iterator<Item = [u32; 4]> + '_ {
        self.cells
            .iter()
            .filter(|c| c.alive && c.vertices.iter().all(|&v| v >= 4))
            .map(|c| c.vertices.map(|v| v - 4))
    }

    /// Interior cells re-oriented in caller coordinates, flat ones dropped.
    pub(crate) fn elements(&self, points: &[Point3<f64>]) -> Vec<[u32; 4]> {
        solid_elements(points, self.interior_cells())
    }
}

/// Positively oriented copies of `cells`, dropping the flat ones.
pub(crate) fn solid_elements(
    points: &[Point3<f64>],
    cells: impl IntoIterator<Item = [u32; 4]>,
) -> Vec<[u32; 4]> {
    cells
        .into_iter()
        .filter_map(|mut element| {
            let tet = tetrahedron(points, element);
            let (_, longest) = tet.edge_length_range();
            let volume = tet.signed_volume();
            if volume.abs() <= DEGENERATE_VOLUME * longest.powi(3) {
                return None;
            }
            if volume < 0.0 {
                element.swap(1, 2);
            }
            Some(element)
        })
        .collect()
}

pub(crate) fn tetrahedron(points: &[Point3<f64>], element: [u32; 4]) -> Tetrahedron {
    let [a, b, c, d] = element.map(|i| points[i as usize]);
    Tetrahedron::new(a, b, c, d)
}

/// Insertion order following a Z-order curve, so consecutive points are
/// spatially close and the location walk stays short.
pub(crate) fn spatial_order(points: &[Point3<f64>], bounds: &Aabb) -> Vec<usize> {
    let size = bounds.size();
    let extent = size.amax().max(f64::MIN_POSITIVE);
    let quantize = |v: f64| {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let q = ((v / extent).clamp(0.0, 1.0) * 1023.0) as u64;
        q
    };
    let code = |p: &Point3<f64>| {
        let d = p - bounds.min;
        let (x, y, z) = (quantize(d.x), quantize(d.y), quantize(d.z));
        (0..10).fold(0u64, |acc, bit| {
            acc | ((x >> bit) & 1) << (3 * bit)
                | ((y >> bit) & 1) << (3 * bit + 1)
                | ((z >> bit) & 1) << (3 * bit + 2)
        })
    };
    let mut order: Vec<usize> = (0..points.len()).collect();
    order.sort_by_key(|&i| code(&points[i]));
    order
}

/// Delaunay tetrahedralization of a point set.
///
/// # Example
///
/// ```
/// use mesh_tetra::Delaunay;
/// use mesh_types::Point3;
///
/// let points = [
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(1.0, 0.0, 0.0),
///     Point3::new(0.0, 1.0, 0.0),
///     Point3::new(0.0, 0.0, 1.0),
///     Point3::new(1.0, 1.0, 1.0),
/// ];
/// let delaunay = Delaunay::build(&points)?;
/// let volume: f64 = delaunay.tetrahedra_iter().map(|t| t.volume()).sum();
/// // Convex hull of the five points.
/// assert!((volume - 0.5).abs() < 1e-9);
/// # Ok::<(), mesh_tetra::TetraError>(())
/// ```
#[derive(Debug, Clone)]
pub struct Delaunay {
    points: Vec<Point3<f64>>,
    tetrahedra: Vec<[u32; 4]>,
}

impl Delaunay {
    /// Tetrahedralizes `points`.
    ///
    /// Duplicate points are ignored. Elements are positively oriented.
    ///
    /// # Errors
    ///
    /// Returns an error for fewer than four points, non-finite
    /// coordinates, or points that do not span a volume.
    pub fn build(points: &[Point3<f64>]) -> TetraResult<Self> {
        if points.len() < 4 {
            return Err(TetraError::TooFewPoints {
                count: points.len(),
            });
        }
        if let Some(index) = points
            .iter()
            .position(|p| !p.coords.iter().all(|c| c.is_finite()))
        {
            return Err(TetraError::NonFinitePoint { index });
        }
        let bounds = Aabb::from_points(points.iter());
        if bounds.max_extent() <= 0.0 {
            return Err(TetraError::DegenerateInput);
        }

        let mut triangulation = Triangulation::new(&bounds);
        let order = spatial_order(points, &bounds);
        let by_slot: Vec<Point3<f64>> = order.iter().map(|&i| points[i]).collect();
        for p in &by_slot {
            triangulation.insert(p);
        }
        #[allow(clippy::cast_possible_truncation)]
        let tetrahedra: Vec<[u32; 4]> = triangulation
            .elements(&by_slot)
            .into_iter()
            .map(|element| element.map(|slot| order[slot as usize] as u32))
            .collect();
        if tetrahedra.is_empty() {
            return Err(TetraError::DegenerateInput);
        }
        Ok(Self {
            points: points.to_vec(),
            tetrahedra,
        })
    }

    /// Input points.
    #[must_use]
    pub fn points(&self) -> &[Point3<f64>] {
        &self.points
    }

    /// Elements as point index quadruples.
    #[must_use]
    pub fn tetrahedra(&self) -> &[[u32; 4]] {
        &self.tetrahedra
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tetrahedra.len()
    }

    /// True if there are no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tetrahedra.is_empty()
    }

    /// Element `i` with concrete positions.
    #[must_use]
    pub fn tetrahedron(&self, i: usize) -> Option<Tetrahedron> {
        self.tetrahedra
            .get(i)
            .map(|&element| tetrahedron(&self.points, element))
    }

    /// Iterator over all elements with concrete positions.
    pub fn tetrahedra_iter(&self) -> impl Iterator<Item = Tetrahedron> + '_ {
        self.tetrahedra
            .iter()
            .map(|&element| tetrahedron(&self.points, element))
    }
}
