//! Shape quality measures for tetrahedra.
//!
//! [`TetQualityMeasure::evaluate`] normalizes every measure so a regular
//! tetrahedron scores exactly 1 and worse shapes score higher. Flat
//! tetrahedra score infinity.

use mesh_types::Tetrahedron;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Radius-edge ratio of a regular tetrahedron, `√6 / 4`.
const REGULAR_RADIUS_EDGE: f64 = 0.612_372_435_695_794_5;

/// Which shape measure to rank tetrahedra by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum TetQualityMeasure {
    /// Longest over shortest edge.
    #[default]
    EdgeRatio,
    /// Circumradius over three times the inradius.
    RadiusRatio,
    /// Circumradius over shortest edge, scaled by the regular value.
    RadiusEdgeRatio,
}

impl TetQualityMeasure {
    /// Quality of `tet`; 1 for a regular tetrahedron.
    ///
    /// # Example
    ///
    /// ```
    /// use mesh_tetra::TetQualityMeasure;
    /// use mesh_types::{Point3, Tetrahedron};
    ///
    /// let regular = Tetrahedron::new(
    ///     Point3::new(1.0, 1.0, 1.0),
    ///     Point3::new(1.0, -1.0, -1.0),
    ///     Point3::new(-1.0, 1.0, -1.0),
    ///     Point3::new(-1.0, -1.0, 1.0),
    /// );
    /// for measure in [
    ///     TetQualityMeasure::EdgeRatio,
    ///     TetQualityMeasure::RadiusRatio,
    ///     TetQualityMeasure::RadiusEdgeRatio,
    /// ] {
    ///     assert!((measure.evaluate(&regular) - 1.0).abs() < 1e-9);
    /// }
    /// ```
    #[must_use]
    pub fn evaluate(self, tet: &Tetrahedron) -> f64 {
        match self {
            Self::EdgeRatio => edge_ratio(tet),
            Self::RadiusRatio => radius_ratio(tet),
            Self::RadiusEdgeRatio => radius_edge_ratio(tet) / REGULAR_RADIUS_EDGE,
        }
    }
}

/// Longest edge over shortest edge.
#[must_use]
pub fn edge_ratio(tet: &Tetrahedron) -> f64 {
    let (shortest, longest) = tet.edge_length_range();
    if shortest > 0.0 {
        longest / shortest
    } else {
        f64::INFINITY
    }
}

/// Circumradius over three times the inradius.
#[must_use]
pub fn radius_ratio(tet: &Tetrahedron) -> f64 {
    let inradius = tet.inradius();
    match tet.circumsphere() {
        Some((_, circumradius)) if inradius > 0.0 => circumradius / (3.0 * inradius),
        _ => f64::INFINITY,
    }
}

/// Circumradius over shortest edge (unnormalized; `√6/4` when regular).
#[must_use]
pub fn radius_edge_ratio(tet: &Tetrahedron) -> f64 {
    let (shortest, _) = tet.edge_length_range();
    match tet.circumsphere() {
        Some((_, circumradius)) if shortest > 0.0 => circumradius / shortest,
        _ => f64::INFINITY,
    }
}
