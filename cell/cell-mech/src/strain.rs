//! Strain tensors.

use nalgebra::{Matrix3, SymmetricEigen, Vector3};
use serde::{Deserialize, Serialize};

/// A symmetric 3x3 strain tensor.
///
/// The tensor is symmetric by construction: it is only ever built from
/// six independent components or from a deformation measure that is
/// symmetric algebraically.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(into = "[[f64; 3]; 3]", from = "[[f64; 3]; 3]")]
pub struct StrainTensor {
    matrix: Matrix3<f64>,
}

impl Default for StrainTensor {
    fn default() -> Self {
        Self::zero()
    }
}

impl StrainTensor {
    /// No strain.
    #[must_use]
    pub fn zero() -> Self {
        Self {
            matrix: Matrix3::zeros(),
        }
    }

    /// Green-Lagrange strain `E = ½(FᵀF − I)` of a deformation gradient.
    ///
    /// # Example
    ///
    /// ```
    /// use cell_mech::StrainTensor;
    /// use nalgebra::Matrix3;
    ///
    /// let e = StrainTensor::green_lagrange(&(Matrix3::identity() * 1.1));
    /// assert!((e.matrix()[(0, 0)] - 0.105).abs() < 1e-12);
    /// assert_eq!(e.matrix()[(0, 1)], 0.0);
    /// ```
    #[must_use]
    pub fn green_lagrange(f: &Matrix3<f64>) -> Self {
        Self::symmetric((f.transpose() * f - Matrix3::identity()) * 0.5)
    }

    /// Infinitesimal strain `½(∇u + ∇uᵀ)` of a displacement gradient.
    #[must_use]
    pub fn small_strain(displacement_gradient: &Matrix3<f64>) -> Self {
        Self::symmetric(*displacement_gradient)
    }

    /// Builds a tensor from `[E11, E22, E33, E12, E13, E23]`.
    #[must_use]
    pub fn from_components(c: [f64; 6]) -> Self {
        Self {
            matrix: Matrix3::new(c[0], c[3], c[4], c[3], c[1], c[5], c[4], c[5], c[2]),
        }
    }

    fn symmetric(m: Matrix3<f64>) -> Self {
        Self {
            matrix: (m + m.transpose()) * 0.5,
        }
    }

    /// The full tensor.
    #[must_use]
    pub const fn matrix(&self) -> &Matrix3<f64> {
        &self.matrix
    }

    /// Independent components `[E11, E22, E33, E12, E13, E23]`.
    #[must_use]
    pub fn components(&self) -> [f64; 6] {
        let m = &self.matrix;
        [m[(0, 0)], m[(1, 1)], m[(2, 2)], m[(0, 1)], m[(0, 2)], m[(1, 2)]]
    }

    /// Sum of the normal strains.
    #[must_use]
    pub fn trace(&self) -> f64 {
        self.matrix.trace()
    }

    /// Principal strains and directions, largest strain first.
    #[must_use]
    pub fn principal(&self) -> [(f64, Vector3<f64>); 3] {
        let eigen = SymmetricEigen::new(self.matrix);
        let mut order = [0, 1, 2];
        order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));
        order.map(|i| (eigen.eigenvalues[i], eigen.eigenvectors.column(i).into_owned()))
    }

    /// Principal strains, largest first.
    #[must_use]
    pub fn principal_strains(&self) -> [f64; 3] {
        self.principal().map(|(value, _)| value)
    }

    /// True if all components are finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.matrix.iter().all(|v| v.is_finite())
    }
}

impl From<StrainTensor> for [[f64; 3]; 3] {
    fn from(e: StrainTensor) -> Self {
        let m = e.matrix;
        [
            [m[(0, 0)], m[(0, 1)], m[(0, 2)]],
            [m[(1, 0)], m[(1, 1)], m[(1, 2)]],
            [m[(2, 0)], m[(2, 1)], m[(2, 2)]],
        ]
    }
}

impl From<[[f64; 3]; 3]> for StrainTensor {
    fn from(rows: [[f64; 3]; 3]) -> Self {
        Self::symmetric(Matrix3::from_fn(|r, c| rows[r][c]))
    }
}

/// Relative volume change `V_def / V_ref − 1`.
///
/// Measured from the two volumes directly, independent of any fitted
/// deformation gradient.
#[must_use]
pub fn volumetric_strain(reference_volume: f64, deformed_volume: f64) -> f64 {
    deformed_volume / reference_volume - 1.0
}
