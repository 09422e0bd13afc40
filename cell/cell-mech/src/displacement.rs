//! Resampling of voxel displacement fields onto volume meshes.
//!
//! The displacement field itself comes from an external deformable image
//! registration, reached through [`DeformableRegistration`]. This module
//! only interpolates it.

use mesh_registration::AffineTransform;
use mesh_types::{Point3, TetMesh, Vector3};
use nalgebra::Matrix3;
use rayon::prelude::*;

use crate::config::DeformableSettings;
use crate::error::{CellMechError, CellMechResult};
use crate::strain::StrainTensor;
use crate::voxelize::BinaryImage;

/// Tolerance, in voxels, for points on the outer grid faces.
const EDGE_TOLERANCE: f64 = 1e-9;

/// Computes a displacement field taking `reference` onto `deformed`.
///
/// Implementations wrap a deformable (demons-type) image registration.
/// The returned field is sampled in the physical frame of `reference`.
pub trait DeformableRegistration: Send + Sync {
    /// Registers two binary images.
    ///
    /// # Errors
    ///
    /// Implementations report failures as [`CellMechError::Deformable`].
    fn register(
        &self,
        reference: &BinaryImage,
        deformed: &BinaryImage,
        settings: &DeformableSettings,
    ) -> CellMechResult<DisplacementField>;
}

/// Displacement vectors on a regular grid, x fastest.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplacementField {
    origin: Point3<f64>,
    spacing: Vector3<f64>,
    dims: [usize; 3],
    vectors: Vec<Vector3<f64>>,
}

impl DisplacementField {
    /// Wraps grid samples.
    ///
    /// # Errors
    ///
    /// [`CellMechError::InvalidField`] if a dimension is zero, a spacing is
    /// not positive, or `vectors` has the wrong length.
    pub fn new(
        origin: Point3<f64>,
        spacing: Vector3<f64>,
        dims: [usize; 3],
        vectors: Vec<Vector3<f64>>,
    ) -> CellMechResult<Self> {
        if dims.contains(&0) {
            return Err(CellMechError::InvalidField(format!("empty grid {dims:?}")));
        }
        if !spacing.iter().all(|s| s.is_finite() && *s > 0.0) {
            return Err(CellMechError::InvalidField(format!(
                "spacing must be positive, got {spacing:?}"
            )));
        }
        let expected = dims[0] * dims[1] * dims[2];
        if vectors.len() != expected {
            return Err(CellMechError::InvalidField(format!(
                "{} vectors for a {dims:?} grid of {expected} points",
                vectors.len()
            )));
        }
        Ok(Self {
            origin,
            spacing,
            dims,
            vectors,
        })
    }

    /// Samples `displacement` at every grid point.
    ///
    /// # Errors
    ///
    /// See [`DisplacementField::new`].
    #[allow(clippy::cast_precision_loss)]
    pub fn from_fn(
        origin: Point3<f64>,
        spacing: Vector3<f64>,
        dims: [usize; 3],
        displacement: impl Fn(&Point3<f64>) -> Vector3<f64>,
    ) -> CellMechResult<Self> {
        let mut vectors = Vec::with_capacity(dims[0] * dims[1] * dims[2]);
        for k in 0..dims[2] {
            for j in 0..dims[1] {
                for i in 0..dims[0] {
                    let offset = Vector3::new(i as f64, j as f64, k as f64).component_mul(&spacing);
                    vectors.push(displacement(&(origin + offset)));
                }
            }
        }
        Self::new(origin, spacing, dims, vectors)
    }

    /// First grid point.
    #[must_use]
    pub const fn origin(&self) -> &Point3<f64> {
        &self.origin
    }

    /// Grid spacing per axis.
    #[must_use]
    pub const fn spacing(&self) -> &Vector3<f64> {
        &self.spacing
    }

    /// Grid points per axis.
    #[must_use]
    pub const fn dims(&self) -> [usize; 3] {
        self.dims
    }

    /// Grid samples.
    #[must_use]
    pub fn vectors(&self) -> &[Vector3<f64>] {
        &self.vectors
    }

    /// Moves the grid without changing its samples.
    #[must_use]
    pub fn with_origin(mut self, origin: Point3<f64>) -> Self {
        self.origin = origin;
        self
    }

    fn at(&self, i: usize, j: usize, k: usize) -> Vector3<f64> {
        self.vectors[i + self.dims[0] * (j + self.dims[1] * k)]
    }

    /// Lower cell corner and fractional offset along one axis.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn axis(&self, axis: usize, coordinate: f64) -> Option<(usize, f64)> {
        let n = self.dims[axis];
        let local = (coordinate - self.origin[axis]) / self.spacing[axis];
        let last = (n - 1) as f64;
        if !(local >= -EDGE_TOLERANCE && local <= last + EDGE_TOLERANCE) {
            return None;
        }
        if n == 1 {
            return Some((0, 0.0));
        }
        let local = local.clamp(0.0, last);
        let cell = (local.floor() as usize).min(n - 2);
        Some((cell, local - cell as f64))
    }

    /// Trilinear displacement at `p`, `None` outside the grid.
    #[must_use]
    pub fn sample(&self, p: &Point3<f64>) -> Option<Vector3<f64>> {
        let (i, tx) = self.axis(0, p.x)?;
        let (j, ty) = self.axis(1, p.y)?;
        let (k, tz) = self.axis(2, p.z)?;
        let step = |axis: usize, base: usize| usize::from(self.dims[axis] > 1) + base;
        let (i1, j1, k1) = (step(0, i), step(1, j), step(2, k));

        let lerp = |a: Vector3<f64>, b: Vector3<f64>, t: f64| a + (b - a) * t;
        let x00 = lerp(self.at(i, j, k), self.at(i1, j, k), tx);
        let x10 = lerp(self.at(i, j1, k), self.at(i1, j1, k), tx);
        let x01 = lerp(self.at(i, j, k1), self.at(i1, j, k1), tx);
        let x11 = lerp(self.at(i, j1, k1), self.at(i1, j1, k1), tx);
        Some(lerp(lerp(x00, x10, ty), lerp(x01, x11, ty), tz))
    }

    /// Displacement gradient `∂uᵢ/∂xⱼ` at `p` by central differences over
    /// one voxel, one-sided at the grid faces.
    #[must_use]
    pub fn gradient_at(&self, p: &Point3<f64>) -> Option<Matrix3<f64>> {
        self.sample(p)?;
        let mut gradient = Matrix3::zeros();
        for axis in 0..3 {
            if self.dims[axis] == 1 {
                continue;
            }
            let h = 0.5 * self.spacing[axis];
            let mut ahead = *p;
            let mut behind = *p;
            ahead[axis] += h;
            behind[axis] -= h;
            let (ahead, forward) = match self.sample(&ahead) {
                Some(u) => (u, h),
                None => (self.sample(p)?, 0.0),
            };
            let (behind, backward) = match self.sample(&behind) {
                Some(u) => (u, h),
                None => (self.sample(p)?, 0.0),
            };
            let span = forward + backward;
            if span > 0.0 {
                gradient.set_column(axis, &((ahead - behind) / span));
            }
        }
        Some(gradient)
    }

    /// Infinitesimal strain at `p`.
    #[must_use]
    pub fn strain_at(&self, p: &Point3<f64>) -> Option<StrainTensor> {
        self.gradient_at(p).map(|g| StrainTensor::small_strain(&g))
    }
}

/// A displacement field resampled at mesh nodes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NodalField {
    /// Displacement per node; zero where invalid.
    pub displacements: Vec<Vector3<f64>>,
    /// Small strain per node; zero where invalid.
    pub strains: Vec<StrainTensor>,
    /// False for nodes outside the field's grid.
    pub valid: Vec<bool>,
}

impl NodalField {
    /// Nodes that received a value.
    #[must_use]
    pub fn valid_count(&self) -> usize {
        self.valid.iter().filter(|&&v| v).count()
    }
}

/// Interpolates `field` at every node of `mesh`.
///
/// With a `pre_transform`, nodes are first mapped by it; use this when the
/// field was computed against a rigidly pre-aligned reference surface.
#[must_use]
pub fn map_to_nodes(
    field: &DisplacementField,
    mesh: &TetMesh,
    pre_transform: Option<&AffineTransform>,
) -> NodalField {
    let samples: Vec<(Vector3<f64>, StrainTensor, bool)> = mesh
        .nodes
        .par_iter()
        .map(|node| {
            let p = pre_transform.map_or(*node, |t| t.transform_point(node));
            match (field.sample(&p), field.strain_at(&p)) {
                (Some(u), Some(e)) => (u, e, true),
                _ => (Vector3::zeros(), StrainTensor::zero(), false),
            }
        })
        .collect();

    let mut nodal = NodalField {
        displacements: Vec::with_capacity(samples.len()),
        strains: Vec::with_capacity(samples.len()),
        valid: Vec::with_capacity(samples.len()),
    };
    for (u, e, ok) in samples {
        nodal.displacements.push(u);
        nodal.strains.push(e);
        nodal.valid.push(ok);
    }
    nodal
}

/// Displacements of the surface nodes of `mesh`, in
/// [`TetMesh::surface_nodes`] order.
#[must_use]
pub fn boundary_displacements(mesh: &TetMesh, nodal: &NodalField) -> Vec<Vector3<f64>> {
    mesh.surface_nodes
        .iter()
        .map(|&n| {
            nodal
                .displacements
                .get(n as usize)
                .copied()
                .unwrap_or_else(Vector3::zeros)
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use mesh_registration::RigidTransform;
    use nalgebra::UnitQuaternion;

    fn linear_field() -> (DisplacementField, Matrix3<f64>) {
        let gradient = Matrix3::new(0.01, 0.02, 0.0, 0.0, -0.03, 0.01, 0.005, 0.0, 0.02);
        let field = DisplacementField::from_fn(
            Point3::new(-2.0, -2.0, -2.0),
            Vector3::new(0.5, 0.25, 0.4),
            [9, 17, 11],
            |p| gradient * p.coords + Vector3::new(0.1, 0.0, -0.1),
        )
        .unwrap();
        (field, gradient)
    }

    #[test]
    fn trilinear_sampling_is_exact_for_linear_fields() {
        let (field, gradient) = linear_field();
        for p in [
            Point3::new(0.3, -1.1, 0.77),
            Point3::new(-2.0, -2.0, -2.0),
            Point3::new(2.0, 2.0, 2.0),
        ] {
            let expected = gradient * p.coords + Vector3::new(0.1, 0.0, -0.1);
            assert_relative_eq!(field.sample(&p).unwrap(), expected, epsilon = 1e-12);
        }
        assert!(field.sample(&Point3::new(2.1, 0.0, 0.0)).is_none());
    }

    #[test]
    fn gradient_and_strain_of_linear_field() {
        let (field, gradient) = linear_field();
        for p in [Point3::new(0.1, 0.2, 0.3), Point3::new(2.0, -2.0, 0.0)] {
            assert_relative_eq!(field.gradient_at(&p).unwrap(), gradient, epsilon = 1e-9);
        }
        let e = field.strain_at(&Point3::origin()).unwrap();
        assert_relative_eq!(*e.matrix(), *StrainTensor::small_strain(&gradient).matrix(), epsilon = 1e-9);
    }

    #[test]
    fn invalid_grids_are_rejected() {
        let origin = Point3::origin();
        assert!(DisplacementField::new(origin, Vector3::repeat(1.0), [0, 1, 1], Vec::new()).is_err());
        assert!(DisplacementField::new(origin, Vector3::new(1.0, 0.0, 1.0), [1, 1, 1], vec![Vector3::zeros()]).is_err());
        assert!(DisplacementField::new(origin, Vector3::repeat(1.0), [2, 2, 2], vec![Vector3::zeros(); 7]).is_err());
    }

    #[test]
    fn nodes_outside_the_grid_are_flagged() {
        let (field, _) = linear_field();
        let mesh = TetMesh {
            nodes: vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
                Point3::new(0.0, 0.0, 5.0),
            ],
            elements: vec![[0, 1, 2, 3]],
            surface_nodes: vec![3, 1],
        };
        let nodal = map_to_nodes(&field, &mesh, None);
        assert_eq!(nodal.valid, vec![true, true, true, false]);
        assert_eq!(nodal.valid_count(), 3);
        assert_eq!(nodal.displacements[3], Vector3::zeros());

        let boundary = boundary_displacements(&mesh, &nodal);
        assert_eq!(boundary.len(), 2);
        assert_eq!(boundary[0], Vector3::zeros());
        assert_relative_eq!(boundary[1], nodal.displacements[1]);
    }

    #[test]
    fn pre_transform_moves_nodes_into_the_field_frame() {
        let field = DisplacementField::from_fn(
            Point3::new(9.0, -1.0, -1.0),
            Vector3::repeat(0.5),
            [5, 5, 5],
            |p| p.coords * 0.1,
        )
        .unwrap();
        let mesh = TetMesh {
            nodes: vec![Point3::origin()],
            elements: Vec::new(),
            surface_nodes: vec![0],
        };
        assert_eq!(map_to_nodes(&field, &mesh, None).valid, vec![false]);

        let shift = AffineTransform::from(RigidTransform::new(
            UnitQuaternion::identity(),
            Vector3::new(10.0, 0.0, 0.0),
        ));
        let nodal = map_to_nodes(&field, &mesh, Some(&shift));
        assert!(nodal.valid[0]);
        assert_relative_eq!(nodal.displacements[0], Vector3::new(1.0, 0.0, 0.0), epsilon = 1e-12);
    }
}
