//! Tissue-level strain of the matrix between objects.
//!
//! Object centroids are treated as material points of a homogeneously
//! deforming matrix. A tetrahedron of four centroids fixes the six
//! independent Green-Lagrange components exactly: each of its six edges
//! `X → x` gives one equation `‖x‖² − ‖X‖² = 2 Xᵀ E X`.

use mesh_tetra::{Delaunay, TetQualityMeasure};
use mesh_types::Point3;
use nalgebra::{Matrix6, Vector3, Vector6};
use serde::Serialize;
use tracing::debug;

use crate::strain::StrainTensor;

/// Fewest objects that span a tetrahedron.
pub const MIN_ECM_OBJECTS: usize = 4;

/// Vertex pairs of the six edges, in equation order.
const EDGES: [(usize, usize); 6] = [(1, 0), (2, 0), (3, 0), (3, 1), (3, 2), (2, 1)];

/// Outcome of the tissue-level strain estimate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EcmStrain {
    /// Strain solved on the best-shaped centroid tetrahedron.
    Available {
        /// Green-Lagrange strain of the matrix.
        strain: StrainTensor,
        /// Indices of the four centroids used.
        vertices: [usize; 4],
        /// Shape quality of that tetrahedron (1 is regular).
        quality: f64,
        /// Measure the quality was ranked by.
        measure: TetQualityMeasure,
    },
    /// No estimate could be made.
    Unavailable {
        /// Why.
        reason: EcmUnavailable,
    },
}

impl EcmStrain {
    /// The strain, if available.
    #[must_use]
    pub const fn strain(&self) -> Option<&StrainTensor> {
        match self {
            Self::Available { strain, .. } => Some(strain),
            Self::Unavailable { .. } => None,
        }
    }

    /// True if a strain was estimated.
    #[must_use]
    pub const fn is_available(&self) -> bool {
        matches!(self, Self::Available { .. })
    }
}

/// Why the tissue-level strain is missing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EcmUnavailable {
    /// Fewer than [`MIN_ECM_OBJECTS`] objects.
    InsufficientObjects {
        /// Objects available.
        count: usize,
    },
    /// The two centroid lists differ in length.
    MismatchedCentroids {
        /// Reference centroids.
        reference: usize,
        /// Deformed centroids.
        deformed: usize,
    },
    /// The centroids span no usable tetrahedron.
    DegenerateTessellation {
        /// What failed.
        detail: String,
    },
}

/// Estimates the matrix strain from paired object centroids.
///
/// The reference centroids are tessellated, the tetrahedron whose
/// `measure` is closest to 1 is picked, and the 6x6 edge system on it is
/// solved exactly.
///
/// # Example
///
/// ```
/// use cell_mech::{estimate_ecm_strain, EcmStrain};
/// use mesh_tetra::TetQualityMeasure;
/// use mesh_types::Point3;
///
/// let reference = [
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(10.0, 0.0, 0.0),
///     Point3::new(0.0, 10.0, 0.0),
///     Point3::new(0.0, 0.0, 10.0),
/// ];
/// let deformed = reference.map(|p| Point3::new(1.2 * p.x, p.y, p.z));
/// let ecm = estimate_ecm_strain(&reference, &deformed, TetQualityMeasure::EdgeRatio);
/// let e = ecm.strain().expect("four objects");
/// assert!((e.matrix()[(0, 0)] - 0.22).abs() < 1e-9);
/// ```
#[must_use]
pub fn estimate_ecm_strain(
    reference: &[Point3<f64>],
    deformed: &[Point3<f64>],
    measure: TetQualityMeasure,
) -> EcmStrain {
    let unavailable = |reason| EcmStrain::Unavailable { reason };
    if reference.len() != deformed.len() {
        return unavailable(EcmUnavailable::MismatchedCentroids {
            reference: reference.len(),
            deformed: deformed.len(),
        });
    }
    if reference.len() < MIN_ECM_OBJECTS {
        return unavailable(EcmUnavailable::InsufficientObjects {
            count: reference.len(),
        });
    }

    let tessellation = match Delaunay::build(reference) {
        Ok(t) => t,
        Err(err) => {
            return unavailable(EcmUnavailable::DegenerateTessellation {
                detail: format!("centroid tessellation failed: {err}"),
            })
        }
    };

    let best = tessellation
        .tetrahedra()
        .iter()
        .zip(tessellation.tetrahedra_iter())
        .map(|(&element, tet)| (element, measure.evaluate(&tet)))
        .filter(|(_, q)| q.is_finite())
        .min_by(|a, b| (a.1 - 1.0).abs().total_cmp(&(b.1 - 1.0).abs()));
    let Some((element, quality)) = best else {
        return unavailable(EcmUnavailable::DegenerateTessellation {
            detail: "every centroid tetrahedron is flat".to_string(),
        });
    };

    let vertices = element.map(|v| v as usize);
    let pick = |points: &[Point3<f64>]| vertices.map(|v| points[v]);
    match solve_edge_system(&pick(reference), &pick(deformed)) {
        Some(strain) => {
            debug!(?vertices, quality, "estimated ECM strain");
            EcmStrain::Available {
                strain,
                vertices,
                quality,
                measure,
            }
        }
        None => unavailable(EcmUnavailable::DegenerateTessellation {
            detail: "edge system of the best tetrahedron is singular".to_string(),
        }),
    }
}

/// Solves the six edge equations of one tetrahedron for `E`.
fn solve_edge_system(reference: &[Point3<f64>; 4], deformed: &[Point3<f64>; 4]) -> Option<StrainTensor> {
    let mut a = Matrix6::zeros();
    let mut b = Vector6::zeros();
    for (row, &(i, j)) in EDGES.iter().enumerate() {
        let big: Vector3<f64> = reference[i] - reference[j];
        let small: Vector3<f64> = deformed[i] - deformed[j];
        let coefficients = [
            2.0 * big.x * big.x,
            2.0 * big.y * big.y,
            2.0 * big.z * big.z,
            4.0 * big.x * big.y,
            4.0 * big.x * big.z,
            4.0 * big.y * big.z,
        ];
        for (col, c) in coefficients.into_iter().enumerate() {
            a[(row, col)] = c;
        }
        b[row] = small.norm_squared() - big.norm_squared();
    }

    let x = a.lu().solve(&b)?;
    let strain = StrainTensor::from_components([x[0], x[1], x[2], x[3], x[4], x[5]]);
    strain.is_finite().then_some(strain)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Matrix3;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn corner() -> [Point3<f64>; 4] {
        [
            Point3::new(1.0, 2.0, 3.0),
            Point3::new(21.0, 2.0, 3.0),
            Point3::new(1.0, 22.0, 3.0),
            Point3::new(1.0, 2.0, 23.0),
        ]
    }

    #[test]
    fn affine_map_round_trip() {
        let f = Matrix3::new(1.1, 0.05, 0.0, -0.02, 0.95, 0.1, 0.03, 0.0, 1.2);
        let t = Vector3::new(5.0, -3.0, 2.0);
        let reference = corner();
        let deformed = reference.map(|p| Point3::from(f * p.coords + t));
        let ecm = estimate_ecm_strain(&reference, &deformed, TetQualityMeasure::EdgeRatio);
        let expected = StrainTensor::green_lagrange(&f);
        assert_relative_eq!(*ecm.strain().unwrap().matrix(), *expected.matrix(), epsilon = 1e-9);
    }

    #[test]
    fn rigid_motion_gives_zero_strain() {
        let rotation = nalgebra::Rotation3::from_euler_angles(0.4, 0.2, -0.7);
        let reference = corner();
        let deformed = reference.map(|p| rotation * p + Vector3::new(1.0, 2.0, 3.0));
        let ecm = estimate_ecm_strain(&reference, &deformed, TetQualityMeasure::RadiusRatio);
        assert_relative_eq!(*ecm.strain().unwrap().matrix(), Matrix3::zeros(), epsilon = 1e-9);
    }

    #[test]
    fn best_tetrahedron_is_picked_from_many() {
        let mut rng = StdRng::seed_from_u64(11);
        let reference: Vec<Point3<f64>> = (0..30)
            .map(|_| Point3::new(rng.gen_range(0.0..100.0), rng.gen_range(0.0..100.0), rng.gen_range(0.0..100.0)))
            .collect();
        let f = Matrix3::new(1.05, 0.0, 0.0, 0.0, 0.97, 0.0, 0.0, 0.0, 1.0);
        let deformed: Vec<_> = reference.iter().map(|p| Point3::from(f * p.coords)).collect();

        for measure in [
            TetQualityMeasure::EdgeRatio,
            TetQualityMeasure::RadiusRatio,
            TetQualityMeasure::RadiusEdgeRatio,
        ] {
            let EcmStrain::Available {
                strain,
                vertices,
                quality,
                ..
            } = estimate_ecm_strain(&reference, &deformed, measure)
            else {
                panic!("expected a strain");
            };
            assert!(quality >= 1.0 - 1e-9);
            let delaunay = Delaunay::build(&reference).unwrap();
            let best_gap = delaunay
                .tetrahedra_iter()
                .map(|t| (measure.evaluate(&t) - 1.0).abs())
                .fold(f64::INFINITY, f64::min);
            assert_relative_eq!((quality - 1.0).abs(), best_gap, epsilon = 1e-12);
            assert!(vertices.iter().all(|&v| v < reference.len()));
            assert_relative_eq!(
                *strain.matrix(),
                *StrainTensor::green_lagrange(&f).matrix(),
                epsilon = 1e-9
            );
        }
    }

    #[test]
    fn fewer_than_four_objects_is_unavailable() {
        let all = corner();
        let reference = &all[..3];
        let ecm = estimate_ecm_strain(reference, reference, TetQualityMeasure::EdgeRatio);
        assert_eq!(
            ecm,
            EcmStrain::Unavailable {
                reason: EcmUnavailable::InsufficientObjects { count: 3 }
            }
        );
        assert!(ecm.strain().is_none());
    }

    #[test]
    fn coplanar_centroids_are_degenerate() {
        let flat: Vec<_> = (0..6)
            .map(|i| Point3::new(f64::from(i), f64::from(i * i), 0.0))
            .collect();
        let ecm = estimate_ecm_strain(&flat, &flat, TetQualityMeasure::EdgeRatio);
        assert!(matches!(
            ecm,
            EcmStrain::Unavailable {
                reason: EcmUnavailable::DegenerateTessellation { .. }
            }
        ));
    }

    #[test]
    fn mismatched_lengths() {
        let reference = corner();
        let ecm = estimate_ecm_strain(&reference, &reference[..3], TetQualityMeasure::EdgeRatio);
        assert!(!ecm.is_available());
    }

    #[test]
    fn serializes_with_status() {
        let ecm = EcmStrain::Unavailable {
            reason: EcmUnavailable::InsufficientObjects { count: 2 },
        };
        let json = serde_json::to_value(&ecm).unwrap();
        assert_eq!(json["status"], "unavailable");
        assert_eq!(json["reason"]["kind"], "insufficient_objects");
    }
}
