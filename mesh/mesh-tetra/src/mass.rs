//! Volume, centroid, inertia and equivalent-ellipsoid axes of a
//! tetrahedral mesh of uniform density.

use std::f64::consts::PI;

use mesh_types::{Point3, TetMesh, Tetrahedron, Vector3};
use nalgebra::{Matrix3, SymmetricEigen};
use tracing::debug;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::delaunay::DEGENERATE_VOLUME;
use crate::error::{TetraError, TetraResult};

/// How each element contributes to the inertia tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum InertiaModel {
    /// Element volume concentrated at its centroid.
    #[default]
    LumpedCentroid,
    /// Lumped term plus each element's own second moment; exact for the
    /// polyhedron the mesh fills.
    Exact,
}

/// One principal axis of the inertia tensor.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PrincipalAxis {
    /// Semi-axis of the ellipsoid with the same volume-normalized inertia.
    pub radius: f64,
    /// Unit direction; its largest-magnitude component is positive.
    pub direction: Vector3<f64>,
    /// Principal moment of inertia.
    pub moment: f64,
}

/// Mass properties of a solid with unit density.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MassProperties {
    /// Total volume.
    pub volume: f64,
    /// Volume-weighted centroid.
    pub centroid: Point3<f64>,
    /// Inertia tensor about the centroid.
    pub inertia: Matrix3<f64>,
    /// Principal axes by ascending moment, so the major radius is first.
    pub principal_axes: [PrincipalAxis; 3],
}

impl MassProperties {
    /// Principal radii, major first.
    #[must_use]
    pub fn radii(&self) -> [f64; 3] {
        self.principal_axes.map(|a| a.radius)
    }

    /// Volume of the ellipsoid spanned by the principal radii.
    #[must_use]
    pub fn ellipsoid_volume(&self) -> f64 {
        let [a, b, c] = self.radii();
        4.0 / 3.0 * PI * a * b * c
    }
}

/// Integrates `mesh` as a solid of unit density.
///
/// Elements whose volume is negligible relative to their size are
/// skipped.
///
/// # Errors
///
/// [`TetraError::NoInteriorElements`] if the mesh has no elements and
/// [`TetraError::ZeroVolume`] if every element is degenerate.
///
/// # Example
///
/// ```
/// use mesh_tetra::{mass_properties, tetrahedralize, InertiaModel, TetMeshParams};
/// use mesh_types::unit_cube;
///
/// let (mesh, _) = tetrahedralize(&unit_cube(), &TetMeshParams::default())?;
/// let props = mass_properties(&mesh, InertiaModel::Exact)?;
/// assert!((props.volume - 1.0).abs() < 1e-9);
/// assert!((props.inertia[(0, 0)] - 1.0 / 6.0).abs() < 1e-9);
/// # Ok::<(), mesh_tetra::TetraError>(())
/// ```
pub fn mass_properties(mesh: &TetMesh, model: InertiaModel) -> TetraResult<MassProperties> {
    if mesh.is_empty() {
        return Err(TetraError::NoInteriorElements);
    }

    let elements: Vec<(f64, Tetrahedron)> = mesh
        .tetrahedra()
        .filter_map(|t| {
            let v = t.volume();
            let (_, longest) = t.edge_length_range();
            (v > DEGENERATE_VOLUME * longest.powi(3)).then_some((v, t))
        })
        .collect();
    let volume: f64 = elements.iter().map(|(v, _)| v).sum();
    if elements.is_empty() {
        return Err(TetraError::ZeroVolume);
    }

    let centroid = Point3::from(
        elements
            .iter()
            .map(|(v, t)| t.centroid().coords * *v)
            .sum::<Vector3<f64>>()
            / volume,
    );

    let mut inertia = Matrix3::zeros();
    for (v, t) in &elements {
        let d = t.centroid() - centroid;
        inertia += point_inertia(&d) * *v;
        if model == InertiaModel::Exact {
            inertia += element_inertia(t, *v);
        }
    }

    let principal_axes = principal_axes(&inertia, volume);
    debug!(
        elements = elements.len(),
        skipped = mesh.element_count() - elements.len(),
        volume,
        "integrated mass properties"
    );
    Ok(MassProperties {
        volume,
        centroid,
        inertia,
        principal_axes,
    })
}

/// Inertia of a unit point mass at offset `d`.
fn point_inertia(d: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::identity() * d.norm_squared() - d * d.transpose()
}

/// Inertia of a uniform tetrahedron about its own centroid.
fn element_inertia(t: &Tetrahedron, volume: f64) -> Matrix3<f64> {
    let c = t.centroid();
    let covariance = t
        .vertices
        .iter()
        .map(|p| {
            let e = p - c;
            e * e.transpose()
        })
        .sum::<Matrix3<f64>>()
        * (volume / 20.0);
    Matrix3::identity() * covariance.trace() - covariance
}

fn principal_axes(inertia: &Matrix3<f64>, volume: f64) -> [PrincipalAxis; 3] {
    let eigen = SymmetricEigen::new(*inertia);
    let mut order = [0, 1, 2];
    order.sort_by(|&a, &b| eigen.eigenvalues[a].total_cmp(&eigen.eigenvalues[b]));
    let total = eigen.eigenvalues.sum();

    order.map(|i| {
        let moment = eigen.eigenvalues[i];
        let mut direction: Vector3<f64> = eigen.eigenvectors.column(i).into_owned();
        if direction[direction.iamax()] < 0.0 {
            direction = -direction;
        }
        PrincipalAxis {
            radius: (2.5 * (total - 2.0 * moment) / volume).max(0.0).sqrt(),
            direction,
            moment,
        }
    })
}
