//! Closed-form transforms from paired landmarks.
//!
//! Both fits centre the point sets first. The rigid fit is the Kabsch
//! solution (SVD of the cross-covariance with a reflection guard); the
//! affine fit is the linear least-squares solution
//! `A = (Σ y xᵀ)(Σ x xᵀ)⁻¹` on centred coordinates.

use nalgebra::{Matrix3, Point3, Rotation3, UnitQuaternion, Vector3};

use crate::error::{RegistrationError, RegistrationResult};
use crate::transform::{AffineTransform, RigidTransform};

/// Minimum number of pairs for a rigid fit.
pub const MIN_RIGID_POINTS: usize = 3;

/// Minimum number of pairs for an affine fit.
pub const MIN_AFFINE_POINTS: usize = 4;

/// Relative conditioning below which the source spread is treated as flat.
const DEGENERATE_SPREAD: f64 = 1e-12;

/// Mean of a point set. Returns the origin for an empty slice.
#[must_use]
pub fn centroid(points: &[Point3<f64>]) -> Point3<f64> {
    if points.is_empty() {
        return Point3::origin();
    }
    let sum: Vector3<f64> = points.iter().map(|p| p.coords).sum();
    #[allow(clippy::cast_precision_loss)]
    let n = points.len() as f64;
    Point3::from(sum / n)
}

fn check_pairs(
    source: &[Point3<f64>],
    target: &[Point3<f64>],
    required: usize,
) -> RegistrationResult<()> {
    if source.is_empty() {
        return Err(RegistrationError::EmptySourceMesh);
    }
    if target.is_empty() {
        return Err(RegistrationError::EmptyTargetMesh);
    }
    if source.len() != target.len() {
        return Err(RegistrationError::InvalidParameter(format!(
            "point sets must have equal length: {} vs {}",
            source.len(),
            target.len()
        )));
    }
    if source.len() < required {
        return Err(RegistrationError::InsufficientPoints {
            required,
            provided: source.len(),
        });
    }
    Ok(())
}

/// Rotation and translation minimizing the squared distance between
/// `transform(source[i])` and `target[i]`.
///
/// # Errors
///
/// Returns an error if the sets are empty, differ in length, hold fewer
/// than [`MIN_RIGID_POINTS`] pairs, or the SVD fails.
///
/// # Example
///
/// ```
/// use mesh_registration::fit_rigid;
/// use nalgebra::Point3;
///
/// let source = [
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(1.0, 0.0, 0.0),
///     Point3::new(0.0, 1.0, 0.0),
/// ];
/// let target = source.map(|p| p + nalgebra::Vector3::new(1.0, 2.0, 3.0));
///
/// let t = fit_rigid(&source, &target).unwrap();
/// assert!((t.transform_point(&source[2]) - target[2]).norm() < 1e-9);
/// ```
pub fn fit_rigid(
    source: &[Point3<f64>],
    target: &[Point3<f64>],
) -> RegistrationResult<RigidTransform> {
    check_pairs(source, target, MIN_RIGID_POINTS)?;

    let source_centroid = centroid(source).coords;
    let target_centroid = centroid(target).coords;

    // Cross-covariance H = Σ s tᵀ on centred points.
    let mut h = Matrix3::zeros();
    for (s, t) in source.iter().zip(target) {
        h += (s.coords - source_centroid) * (t.coords - target_centroid).transpose();
    }

    let svd = h.svd(true, true);
    let u = svd.u.ok_or(RegistrationError::SvdFailed)?;
    let v_t = svd.v_t.ok_or(RegistrationError::SvdFailed)?;

    let mut v = v_t.transpose();
    let mut rotation_matrix = v * u.transpose();
    if rotation_matrix.determinant() < 0.0 {
        // Reflection: flip the axis of the smallest singular value.
        for i in 0..3 {
            v[(i, 2)] = -v[(i, 2)];
        }
        rotation_matrix = v * u.transpose();
    }

    let rotation =
        UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(rotation_matrix));
    let translation = target_centroid - rotation * source_centroid;

    let transform = RigidTransform::new(rotation, translation);
    if AffineTransform::from(transform).is_finite() {
        Ok(transform)
    } else {
        Err(RegistrationError::NonFiniteTransform)
    }
}

/// Least-squares affine map taking `source[i]` to `target[i]`.
///
/// # Errors
///
/// Returns an error if the sets are empty, differ in length, hold fewer
/// than [`MIN_AFFINE_POINTS`] pairs, or the source points are coplanar
/// (the linear part is then undetermined).
///
/// # Example
///
/// ```
/// use mesh_registration::fit_affine;
/// use nalgebra::{Matrix3, Point3, Vector3};
///
/// let source = [
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(1.0, 0.0, 0.0),
///     Point3::new(0.0, 1.0, 0.0),
///     Point3::new(0.0, 0.0, 1.0),
/// ];
/// let target = source.map(|p| Point3::new(2.0 * p.x, p.y, p.z + 1.0));
///
/// let t = fit_affine(&source, &target).unwrap();
/// assert!((t.linear - Matrix3::from_diagonal(&Vector3::new(2.0, 1.0, 1.0))).norm() < 1e-9);
/// ```
pub fn fit_affine(
    source: &[Point3<f64>],
    target: &[Point3<f64>],
) -> RegistrationResult<AffineTransform> {
    check_pairs(source, target, MIN_AFFINE_POINTS)?;

    let source_centroid = centroid(source).coords;
    let target_centroid = centroid(target).coords;

    let mut sxx = Matrix3::zeros();
    let mut syx = Matrix3::zeros();
    for (s, t) in source.iter().zip(target) {
        let x = s.coords - source_centroid;
        let y = t.coords - target_centroid;
        sxx += x * x.transpose();
        syx += y * x.transpose();
    }

    // Sxx is symmetric positive semi-definite; compare its smallest
    // eigenvalue against its largest.
    let eigenvalues = sxx.symmetric_eigenvalues();
    let largest = eigenvalues.max();
    let smallest = eigenvalues.min();
    if largest <= 0.0 || smallest <= DEGENERATE_SPREAD * largest {
        return Err(RegistrationError::DegenerateConfiguration(
            "source landmarks do not span three dimensions".to_string(),
        ));
    }
    let sxx_inv = sxx.try_inverse().ok_or_else(|| {
        RegistrationError::DegenerateConfiguration("singular landmark covariance".to_string())
    })?;

    let linear = syx * sxx_inv;
    let translation = target_centroid - linear * source_centroid;
    let transform = AffineTransform::new(linear, translation);
    if transform.is_finite() {
        Ok(transform)
    } else {
        Err(RegistrationError::NonFiniteTransform)
    }
}
