//! Binary images of closed surfaces for deformable registration.

use mesh_types::{Aabb, IndexedMesh, MeshBounds, Point3, Triangle, Vector3};
use rayon::prelude::*;
use tracing::debug;

use crate::error::{CellMechError, CellMechResult};

/// Voxels added around the object on every axis.
const BORDER_VOXELS: usize = 10;

/// Scan lines are nudged off the voxel centres by these fractions of the
/// spacing so they never pass exactly through a surface edge or vertex.
const RAY_NUDGE: [f64; 2] = [1.234_567e-6, 2.345_678e-6];

/// A regular grid of inside (1) and outside (0) voxels, x fastest.
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryImage {
    /// Centre of voxel `(0, 0, 0)`.
    pub origin: Point3<f64>,
    /// Voxel size per axis.
    pub spacing: Vector3<f64>,
    /// Voxel counts per axis.
    pub dims: [usize; 3],
    /// Voxel values.
    pub data: Vec<u8>,
}

impl BinaryImage {
    /// An all-outside image.
    #[must_use]
    pub fn empty(origin: Point3<f64>, spacing: Vector3<f64>, dims: [usize; 3]) -> Self {
        Self {
            origin,
            spacing,
            dims,
            data: vec![0; dims[0] * dims[1] * dims[2]],
        }
    }

    /// Linear index of voxel `(i, j, k)`.
    #[must_use]
    pub const fn index(&self, i: usize, j: usize, k: usize) -> usize {
        i + self.dims[0] * (j + self.dims[1] * k)
    }

    /// Value of voxel `(i, j, k)`, `None` outside the grid.
    #[must_use]
    pub fn get(&self, i: usize, j: usize, k: usize) -> Option<u8> {
        if i < self.dims[0] && j < self.dims[1] && k < self.dims[2] {
            self.data.get(self.index(i, j, k)).copied()
        } else {
            None
        }
    }

    /// Centre of voxel `(i, j, k)`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn voxel_center(&self, i: usize, j: usize, k: usize) -> Point3<f64> {
        self.origin + self.spacing.component_mul(&Vector3::new(i as f64, j as f64, k as f64))
    }

    /// Number of inside voxels.
    #[must_use]
    pub fn filled(&self) -> usize {
        self.data.iter().filter(|&&v| v != 0).count()
    }

    /// Volume of the inside voxels.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn filled_volume(&self) -> f64 {
        self.filled() as f64 * self.spacing.x * self.spacing.y * self.spacing.z
    }
}

/// Rasterizes a reference and a deformed surface onto matching grids.
///
/// Both grids have `ceil(1 / precision) + 10` voxels per axis. The spacing
/// on each axis is `precision` times the larger of the two surfaces' spans,
/// so both objects fit with a margin; each grid is centred on its own
/// surface.
///
/// # Errors
///
/// [`CellMechError::InvalidConfig`] if `precision` is not in `(0, 1]` and
/// [`CellMechError::InvalidField`] if a surface is empty or flat.
pub fn voxelize_pair(
    reference: &IndexedMesh,
    deformed: &IndexedMesh,
    precision: f64,
) -> CellMechResult<(BinaryImage, BinaryImage)> {
    if !(precision > 0.0 && precision <= 1.0) {
        return Err(CellMechError::InvalidConfig(format!(
            "voxel precision must be in (0, 1], got {precision}"
        )));
    }
    let reference_bounds = reference.bounds();
    let deformed_bounds = deformed.bounds();
    if reference_bounds.is_empty() || deformed_bounds.is_empty() {
        return Err(CellMechError::InvalidField("cannot voxelize an empty surface".to_string()));
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let n = (1.0 / precision).ceil() as usize + BORDER_VOXELS;
    let spacing = reference_bounds
        .size()
        .zip_map(&deformed_bounds.size(), f64::max)
        * precision;
    if spacing.min() <= 0.0 {
        return Err(CellMechError::InvalidField(
            "cannot voxelize a surface with zero extent".to_string(),
        ));
    }

    let image = |surface: &IndexedMesh, bounds: &Aabb| {
        #[allow(clippy::cast_precision_loss)]
        let half = n as f64 / 2.0;
        let origin = bounds.center() - spacing * half + spacing / 2.0;
        let mut image = BinaryImage::empty(origin, spacing, [n, n, n]);
        fill(&mut image, surface);
        image
    };
    let reference_image = image(reference, &reference_bounds);
    let deformed_image = image(deformed, &deformed_bounds);
    debug!(
        dims = n,
        reference_voxels = reference_image.filled(),
        deformed_voxels = deformed_image.filled(),
        "voxelized surface pair"
    );
    Ok((reference_image, deformed_image))
}

/// Parity fill along x scan lines.
fn fill(image: &mut BinaryImage, surface: &IndexedMesh) {
    let triangles: Vec<Triangle> = surface.triangles().collect();
    let [nx, ny, _] = image.dims;
    let origin = image.origin;
    let spacing = image.spacing;

    image
        .data
        .par_chunks_mut(nx * ny)
        .enumerate()
        .for_each(|(k, slab)| {
            #[allow(clippy::cast_precision_loss)]
            let z = origin.z + spacing.z * (k as f64 + RAY_NUDGE[1]);
            for (j, row) in slab.chunks_mut(nx).enumerate() {
                #[allow(clippy::cast_precision_loss)]
                let y = origin.y + spacing.y * (j as f64 + RAY_NUDGE[0]);
                let mut crossings: Vec<f64> = triangles
                    .iter()
                    .filter_map(|t| crossing_x(t, y, z))
                    .collect();
                crossings.sort_by(f64::total_cmp);
                for span in crossings.chunks_exact(2) {
                    let first = ((span[0] - origin.x) / spacing.x).ceil().max(0.0);
                    let end = ((span[1] - origin.x) / spacing.x).floor() + 1.0;
                    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                    let (first, end) = (first as usize, end.max(0.0) as usize);
                    for voxel in row.iter_mut().take(end).skip(first) {
                        *voxel = 1;
                    }
                }
            }
        });
}

/// x coordinate where the line `(·, y, z)` crosses the triangle.
fn crossing_x(t: &Triangle, y: f64, z: f64) -> Option<f64> {
    let (a, b, c) = (t.v0, t.v1, t.v2);
    // Barycentric coordinates in the yz projection.
    let det = (b.y - a.y) * (c.z - a.z) - (c.y - a.y) * (b.z - a.z);
    if det == 0.0 {
        return None;
    }
    let u = ((y - a.y) * (c.z - a.z) - (c.y - a.y) * (z - a.z)) / det;
    let v = ((b.y - a.y) * (z - a.z) - (y - a.y) * (b.z - a.z)) / det;
    if u < 0.0 || v < 0.0 || u + v > 1.0 {
        return None;
    }
    Some(a.x + u * (b.x - a.x) + v * (c.x - a.x))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use mesh_types::{icosphere, unit_cube};

    #[test]
    fn grid_size_and_spacing() {
        let cube = unit_cube();
        let mut big = unit_cube();
        big.scale(2.0);
        let (reference, deformed) = voxelize_pair(&cube, &big, 0.05).unwrap();
        assert_eq!(reference.dims, [30, 30, 30]);
        assert_eq!(deformed.dims, [30, 30, 30]);
        assert_relative_eq!(reference.spacing, Vector3::repeat(0.1), epsilon = 1e-12);
        // Each grid is centred on its own surface.
        assert_relative_eq!(reference.voxel_center(15, 15, 15), Point3::new(0.55, 0.55, 0.55), epsilon = 1e-12);
        assert_relative_eq!(deformed.voxel_center(15, 15, 15), Point3::new(1.05, 1.05, 1.05), epsilon = 1e-12);
    }

    #[test]
    fn filled_volume_matches_the_surface() {
        let sphere = icosphere(5.0, 3);
        let (image, _) = voxelize_pair(&sphere, &sphere, 0.02).unwrap();
        assert_relative_eq!(image.filled_volume(), sphere.volume(), max_relative = 0.02);
        // Border voxels stay empty.
        assert_eq!(image.get(0, 0, 0), Some(0));
        assert_eq!(image.get(30, 30, 30), Some(1));
        assert_eq!(image.get(60, 0, 0), None);
    }

    #[test]
    fn bad_precision_is_rejected() {
        let cube = unit_cube();
        assert!(voxelize_pair(&cube, &cube, 0.0).is_err());
        assert!(voxelize_pair(&cube, &cube, 1.5).is_err());
        assert!(voxelize_pair(&IndexedMesh::new(), &cube, 0.1).is_err());
    }
}
