//! Rigid and affine transforms produced by registration.

use nalgebra::{Matrix3, Matrix4, Point3, UnitQuaternion, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A rigid transformation: rotation followed by translation.
///
/// # Example
///
/// ```
/// use mesh_registration::RigidTransform;
/// use nalgebra::{Point3, UnitQuaternion, Vector3};
/// use std::f64::consts::PI;
///
/// let rotation = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), PI / 2.0);
/// let transform = RigidTransform::new(rotation, Vector3::new(1.0, 2.0, 3.0));
///
/// let p = transform.transform_point(&Point3::new(1.0, 0.0, 0.0));
/// assert!((p - Point3::new(1.0, 3.0, 3.0)).norm() < 1e-12);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RigidTransform {
    /// Rotation as a unit quaternion.
    pub rotation: UnitQuaternion<f64>,
    /// Translation vector.
    pub translation: Vector3<f64>,
}

impl Default for RigidTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl RigidTransform {
    /// Creates a new rigid transform.
    #[must_use]
    pub const fn new(rotation: UnitQuaternion<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// The identity transform.
    #[must_use]
    pub fn identity() -> Self {
        Self::new(UnitQuaternion::identity(), Vector3::zeros())
    }

    /// A pure translation.
    #[must_use]
    pub fn from_translation(translation: Vector3<f64>) -> Self {
        Self::new(UnitQuaternion::identity(), translation)
    }

    /// Transforms a point.
    #[must_use]
    pub fn transform_point(&self, point: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.rotation * point.coords + self.translation)
    }

    /// Composes this transform with another (`self * other`): `other` is
    /// applied first.
    #[must_use]
    pub fn compose(&self, other: &Self) -> Self {
        Self {
            rotation: self.rotation * other.rotation,
            translation: self.translation + self.rotation * other.translation,
        }
    }

    /// The inverse transform.
    #[must_use]
    pub fn inverse(&self) -> Self {
        let rotation = self.rotation.inverse();
        Self {
            rotation,
            translation: -(rotation * self.translation),
        }
    }

    /// Converts to a 4x4 homogeneous matrix.
    #[must_use]
    pub fn to_matrix4(&self) -> Matrix4<f64> {
        AffineTransform::from(*self).to_matrix4()
    }
}

/// A general affine transformation `x -> A x + t`.
///
/// The linear part `A` is the deformation gradient `F` of a homogeneous
/// deformation. Serialized as its 4x4 homogeneous matrix (row-major).
///
/// # Example
///
/// ```
/// use mesh_registration::AffineTransform;
/// use nalgebra::{Matrix3, Point3, Vector3};
///
/// let stretch = AffineTransform::new(Matrix3::from_diagonal(&Vector3::new(2.0, 1.0, 1.0)), Vector3::x());
/// let p = stretch.transform_point(&Point3::new(1.0, 1.0, 1.0));
/// assert_eq!(p, Point3::new(3.0, 1.0, 1.0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(into = "[[f64; 4]; 4]", from = "[[f64; 4]; 4]"))]
pub struct AffineTransform {
    /// Linear part.
    pub linear: Matrix3<f64>,
    /// Translation part.
    pub translation: Vector3<f64>,
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl AffineTransform {
    /// Creates an affine transform from its parts.
    #[must_use]
    pub const fn new(linear: Matrix3<f64>, translation: Vector3<f64>) -> Self {
        Self {
            linear,
            translation,
        }
    }

    /// The identity transform.
    #[must_use]
    pub fn identity() -> Self {
        Self::new(Matrix3::identity(), Vector3::zeros())
    }

    /// A pure translation.
    #[must_use]
    pub fn from_translation(translation: Vector3<f64>) -> Self {
        Self::new(Matrix3::identity(), translation)
    }

    /// Builds a transform from a homogeneous matrix, ignoring the bottom row.
    #[must_use]
    pub fn from_matrix4(m: &Matrix4<f64>) -> Self {
        Self::new(
            m.fixed_view::<3, 3>(0, 0).into_owned(),
            m.fixed_view::<3, 1>(0, 3).into_owned(),
        )
    }

    /// Converts to a 4x4 homogeneous matrix.
    #[must_use]
    pub fn to_matrix4(&self) -> Matrix4<f64> {
        let mut m = Matrix4::identity();
        m.fixed_view_mut::<3, 3>(0, 0).copy_from(&self.linear);
        m.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.translation);
        m
    }

    /// Transforms a point.
    #[must_use]
    pub fn transform_point(&self, point: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.linear * point.coords + self.translation)
    }

    /// Transforms a direction (translation ignored).
    #[must_use]
    pub fn transform_vector(&self, v: &Vector3<f64>) -> Vector3<f64> {
        self.linear * v
    }

    /// Composes this transform with another (`self * other`): `other` is
    /// applied first.
    #[must_use]
    pub fn compose(&self, other: &Self) -> Self {
        Self::new(
            self.linear * other.linear,
            self.linear * other.translation + self.translation,
        )
    }

    /// The inverse transform, `None` if the linear part is singular.
    #[must_use]
    pub fn inverse(&self) -> Option<Self> {
        let inv = self.linear.try_inverse()?;
        Some(Self::new(inv, -(inv * self.translation)))
    }

    /// Ratio of transformed to original volume, `det(A)`.
    #[must_use]
    pub fn volume_ratio(&self) -> f64 {
        self.linear.determinant()
    }

    /// True if every entry is finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.linear.iter().chain(self.translation.iter()).all(|v| v.is_finite())
    }

    /// True if the transform is within `epsilon` of the identity entry-wise.
    #[must_use]
    pub fn is_identity(&self, epsilon: f64) -> bool {
        (self.linear - Matrix3::identity()).amax() < epsilon && self.translation.amax() < epsilon
    }
}

impl From<RigidTransform> for AffineTransform {
    fn from(rigid: RigidTransform) -> Self {
        Self::new(rigid.rotation.to_rotation_matrix().into_inner(), rigid.translation)
    }
}

impl From<AffineTransform> for [[f64; 4]; 4] {
    fn from(t: AffineTransform) -> Self {
        let m = t.to_matrix4();
        std::array::from_fn(|i| std::array::from_fn(|j| m[(i, j)]))
    }
}

impl From<[[f64; 4]; 4]> for AffineTransform {
    fn from(rows: [[f64; 4]; 4]) -> Self {
        Self::from_matrix4(&Matrix4::from_fn(|i, j| rows[i][j]))
    }
}
