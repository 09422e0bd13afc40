//! Iterative Closest Point (ICP) registration of one closed surface onto
//! another.
//!
//! Each iteration:
//! 1. finds, for every source landmark, the closest point on the target
//!    surface,
//! 2. fits a rigid or affine landmark transform to those pairs,
//! 3. moves the landmarks and measures how far they moved.
//!
//! The loop stops once the mean movement drops to
//! [`IcpParams::max_mean_distance`] or after
//! [`IcpParams::max_iterations`]. ICP is a local method: it converges to
//! the optimum nearest the starting pose, which centroid matching makes
//! a reasonable one for cells that deform more than they move.

use mesh_types::IndexedMesh;
use nalgebra::Point3;
use rayon::prelude::*;
use tracing::debug;

use crate::error::{RegistrationError, RegistrationResult};
use crate::fit::{centroid, fit_affine, fit_rigid, MIN_AFFINE_POINTS, MIN_RIGID_POINTS};
use crate::locate::SurfaceLocator;
use crate::transform::AffineTransform;

/// Family of transforms fitted at every iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IcpMode {
    /// Rotation and translation only.
    Rigid,
    /// Full 12-parameter affine map.
    #[default]
    Affine,
}

impl IcpMode {
    const fn min_points(self) -> usize {
        match self {
            Self::Rigid => MIN_RIGID_POINTS,
            Self::Affine => MIN_AFFINE_POINTS,
        }
    }
}

/// How per-landmark movement is averaged into the mean distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MeanDistanceMode {
    /// Root of the mean squared movement.
    #[default]
    Rms,
    /// Mean absolute movement.
    Absolute,
}

/// What a landmark is matched to on the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Correspondence {
    /// Closest point anywhere on the target triangles.
    #[default]
    SurfacePoint,
    /// Closest target vertex.
    Vertex,
}

/// Parameters for ICP registration.
#[derive(Debug, Clone)]
pub struct IcpParams {
    /// Transform family (default: affine).
    pub mode: IcpMode,
    /// Maximum number of iterations (default: 5000).
    pub max_iterations: u32,
    /// Convergence threshold on the mean landmark movement (default: 0.001).
    pub max_mean_distance: f64,
    /// Averaging used for the mean distance (default: RMS).
    pub mean_distance_mode: MeanDistanceMode,
    /// Translate the source centroid onto the target centroid before the
    /// first iteration (default: true).
    pub start_by_matching_centroids: bool,
    /// Nominal number of source landmarks; larger surfaces are subsampled
    /// with a stride of `n / max_landmarks` (default: 200).
    pub max_landmarks: usize,
    /// Target matching (default: closest surface point).
    pub correspondence: Correspondence,
}

impl Default for IcpParams {
    fn default() -> Self {
        Self {
            mode: IcpMode::Affine,
            max_iterations: 5000,
            max_mean_distance: 0.001,
            mean_distance_mode: MeanDistanceMode::Rms,
            start_by_matching_centroids: true,
            max_landmarks: 200,
            correspondence: Correspondence::SurfacePoint,
        }
    }
}

impl IcpParams {
    /// Creates new ICP parameters with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rigid-only parameters with otherwise default values.
    #[must_use]
    pub fn rigid() -> Self {
        Self::default().with_mode(IcpMode::Rigid)
    }

    /// Sets the transform family.
    #[must_use]
    pub const fn with_mode(mut self, mode: IcpMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the maximum number of iterations.
    #[must_use]
    pub const fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Sets the convergence threshold on the mean landmark movement.
    #[must_use]
    pub const fn with_max_mean_distance(mut self, distance: f64) -> Self {
        self.max_mean_distance = distance;
        self
    }

    /// Sets the mean distance averaging.
    #[must_use]
    pub const fn with_mean_distance_mode(mut self, mode: MeanDistanceMode) -> Self {
        self.mean_distance_mode = mode;
        self
    }

    /// Enables or disables the initial centroid alignment.
    #[must_use]
    pub const fn with_centroid_matching(mut self, enabled: bool) -> Self {
        self.start_by_matching_centroids = enabled;
        self
    }

    /// Sets the maximum number of landmarks.
    #[must_use]
    pub const fn with_max_landmarks(mut self, max_landmarks: usize) -> Self {
        self.max_landmarks = max_landmarks;
        self
    }

    /// Sets the correspondence type.
    #[must_use]
    pub const fn with_correspondence(mut self, correspondence: Correspondence) -> Self {
        self.correspondence = correspondence;
        self
    }

    fn validate(&self) -> RegistrationResult<()> {
        if self.max_iterations == 0 {
            return Err(RegistrationError::InvalidParameter(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        if !(self.max_mean_distance.is_finite() && self.max_mean_distance >= 0.0) {
            return Err(RegistrationError::InvalidParameter(format!(
                "max_mean_distance must be finite and non-negative, got {}",
                self.max_mean_distance
            )));
        }
        if self.max_landmarks < self.mode.min_points() {
            return Err(RegistrationError::InvalidParameter(format!(
                "max_landmarks must be at least {}, got {}",
                self.mode.min_points(),
                self.max_landmarks
            )));
        }
        Ok(())
    }
}

/// Result of ICP registration.
#[derive(Debug, Clone)]
pub struct IcpResult {
    /// Transform taking the source surface onto the target.
    pub transform: AffineTransform,
    /// Number of iterations performed.
    pub iterations: u32,
    /// Mean landmark movement in the last iteration.
    pub mean_distance: f64,
    /// RMS distance from the registered landmarks to the target.
    pub rms_error: f64,
    /// Largest distance from a registered landmark to the target.
    pub max_error: f64,
    /// Whether the mean distance reached the threshold.
    pub converged: bool,
    /// Number of landmarks used.
    pub correspondence_count: usize,
}

/// Source vertices taken with a stride of `n / max_landmarks`, so the whole
/// surface is covered. The count lies in `max_landmarks..2 * max_landmarks`.
fn select_landmarks(points: &[Point3<f64>], max_landmarks: usize) -> Vec<Point3<f64>> {
    if points.len() <= max_landmarks {
        return points.to_vec();
    }
    let step = points.len() / max_landmarks;
    points
        .iter()
        .step_by(step)
        .take(points.len() / step)
        .copied()
        .collect()
}

/// Registers `source` onto `target`.
///
/// # Errors
///
/// Returns an error if either surface is empty, the parameters are
/// invalid, or a landmark fit degenerates. Failing to converge within
/// the iteration cap is not an error; see [`IcpResult::converged`].
///
/// # Example
///
/// ```
/// use mesh_registration::{icp_register, IcpParams};
/// use mesh_types::icosphere;
/// use nalgebra::Vector3;
///
/// let source = icosphere(1.0, 2);
/// let mut target = source.clone();
/// target.scale(1.1);
/// target.translate(Vector3::new(0.5, 0.0, 0.0));
///
/// let result = icp_register(&source, &target, &IcpParams::default()).unwrap();
/// assert!(result.converged);
/// assert!((result.transform.volume_ratio() - 1.331).abs() < 0.01);
/// ```
pub fn icp_register(
    source: &IndexedMesh,
    target: &IndexedMesh,
    params: &IcpParams,
) -> RegistrationResult<IcpResult> {
    params.validate()?;
    if source.vertices.is_empty() {
        return Err(RegistrationError::EmptySourceMesh);
    }
    let needs_faces = params.correspondence == Correspondence::SurfacePoint;
    if target.vertices.is_empty() || (needs_faces && target.faces.is_empty()) {
        return Err(RegistrationError::EmptyTargetMesh);
    }

    let all_points = source.positions();
    let mut landmarks = select_landmarks(&all_points, params.max_landmarks);
    if landmarks.len() < params.mode.min_points() {
        return Err(RegistrationError::InsufficientPoints {
            required: params.mode.min_points(),
            provided: landmarks.len(),
        });
    }

    let locator = SurfaceLocator::new(target);
    let find = |p: &Point3<f64>| -> Option<Point3<f64>> {
        match params.correspondence {
            Correspondence::SurfacePoint => locator.closest_point(p),
            Correspondence::Vertex => locator.closest_vertex(p),
        }
    };

    let mut accumulated = AffineTransform::identity();
    if params.start_by_matching_centroids {
        let offset = centroid(&target.positions()) - centroid(&all_points);
        accumulated = AffineTransform::from_translation(offset);
        for p in &mut landmarks {
            *p += offset;
        }
    }

    let mut iterations = 0;
    let mut mean_distance = f64::MAX;
    let mut converged = false;

    for iter in 0..params.max_iterations {
        iterations = iter + 1;

        let matched: Vec<Point3<f64>> = landmarks
            .par_iter()
            .map(|p| find(p).ok_or(RegistrationError::EmptyTargetMesh))
            .collect::<RegistrationResult<_>>()?;

        let step: AffineTransform = match params.mode {
            IcpMode::Rigid => fit_rigid(&landmarks, &matched)?.into(),
            IcpMode::Affine => fit_affine(&landmarks, &matched)?,
        };
        accumulated = step.compose(&accumulated);

        let moved: Vec<Point3<f64>> = landmarks.iter().map(|p| step.transform_point(p)).collect();
        mean_distance = mean_movement(&landmarks, &moved, params.mean_distance_mode);
        landmarks = moved;

        if mean_distance <= params.max_mean_distance {
            converged = true;
            break;
        }
    }

    if !accumulated.is_finite() {
        return Err(RegistrationError::NonFiniteTransform);
    }

    let residuals: Vec<f64> = landmarks
        .par_iter()
        .filter_map(|p| find(p).map(|q| (q - p).norm_squared()))
        .collect();
    let (rms_error, max_error) = error_metrics(&residuals);

    debug!(
        mode = ?params.mode,
        iterations,
        mean_distance,
        rms_error,
        converged,
        landmarks = landmarks.len(),
        "icp finished"
    );

    Ok(IcpResult {
        transform: accumulated,
        iterations,
        mean_distance,
        rms_error,
        max_error,
        converged,
        correspondence_count: landmarks.len(),
    })
}

fn mean_movement(before: &[Point3<f64>], after: &[Point3<f64>], mode: MeanDistanceMode) -> f64 {
    if before.is_empty() {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let n = before.len() as f64;
    let distances = before.iter().zip(after).map(|(a, b)| (b - a).norm_squared());
    match mode {
        MeanDistanceMode::Rms => (distances.sum::<f64>() / n).sqrt(),
        MeanDistanceMode::Absolute => distances.map(f64::sqrt).sum::<f64>() / n,
    }
}

/// RMS and max from squared distances.
fn error_metrics(squared: &[f64]) -> (f64, f64) {
    if squared.is_empty() {
        return (0.0, 0.0);
    }
    #[allow(clippy::cast_precision_loss)]
    let rms = (squared.iter().sum::<f64>() / squared.len() as f64).sqrt();
    let max = squared.iter().copied().fold(0.0, f64::max).sqrt();
    (rms, max)
}
