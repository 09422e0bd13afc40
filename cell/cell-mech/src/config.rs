//! Analysis configuration.
//!
//! Every field has a documented default, so a JSON document only needs the
//! values it changes:
//!
//! ```
//! use cell_mech::CellMechConfig;
//!
//! let config = CellMechConfig::from_json(r#"{ "rigid_prefit": false, "max_iterations": 500 }"#)?;
//! assert!(!config.rigid_prefit);
//! assert_eq!(config.max_iterations, 500);
//! assert!((config.max_mean_distance - 0.001).abs() < 1e-12);
//! # Ok::<(), cell_mech::CellMechError>(())
//! ```

use std::path::Path;

use mesh_registration::{IcpMode, IcpParams};
use mesh_tetra::{InertiaModel, TetMeshParams, TetQualityMeasure};
use serde::{Deserialize, Serialize};

use crate::error::{CellMechError, CellMechResult};

/// Settings for one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CellMechConfig {
    /// Rigidly align each reference surface before the affine fit
    /// (default: true).
    pub rigid_prefit: bool,
    /// Map a voxel displacement field onto every reference mesh; needs a
    /// deformable registration collaborator (default: false).
    pub require_deformable_registration: bool,
    /// Write node, element and boundary displacement packages for finite
    /// element analysis (default: false).
    pub export_fea_package: bool,
    /// ICP iteration cap (default: 5000).
    pub max_iterations: u32,
    /// ICP convergence threshold on mean landmark movement (default: 0.001).
    pub max_mean_distance: f64,
    /// ICP landmark budget (default: 200).
    pub max_landmarks: usize,
    /// Shape measure used to pick the ECM tetrahedron (default: edge ratio).
    pub ecm_quality: TetQualityMeasure,
    /// Inertia integration (default: lumped at element centroids).
    pub inertia: InertiaModel,
    /// Volume meshing.
    pub meshing: MeshingConfig,
    /// Passed through to the deformable registration collaborator.
    pub deformable: DeformableSettings,
}

impl Default for CellMechConfig {
    fn default() -> Self {
        Self {
            rigid_prefit: true,
            require_deformable_registration: false,
            export_fea_package: false,
            max_iterations: 5000,
            max_mean_distance: 0.001,
            max_landmarks: 200,
            ecm_quality: TetQualityMeasure::EdgeRatio,
            inertia: InertiaModel::LumpedCentroid,
            meshing: MeshingConfig::default(),
            deformable: DeformableSettings::default(),
        }
    }
}

impl CellMechConfig {
    /// Parses and validates a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`CellMechError::Json`] for malformed or unknown fields and
    /// [`CellMechError::InvalidConfig`] for out-of-range values.
    pub fn from_json(text: &str) -> CellMechResult<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a JSON configuration file.
    ///
    /// # Errors
    ///
    /// See [`CellMechConfig::from_json`]; unreadable files give
    /// [`CellMechError::Io`].
    pub fn from_json_file(path: impl AsRef<Path>) -> CellMechResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| CellMechError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`CellMechError::InvalidConfig`] naming the first bad field.
    pub fn validate(&self) -> CellMechResult<()> {
        if self.max_iterations == 0 {
            return Err(invalid("max_iterations must be at least 1"));
        }
        if !(self.max_mean_distance.is_finite() && self.max_mean_distance >= 0.0) {
            return Err(invalid(format!(
                "max_mean_distance must be finite and non-negative, got {}",
                self.max_mean_distance
            )));
        }
        if self.max_landmarks < 4 {
            return Err(invalid(format!(
                "max_landmarks must be at least 4, got {}",
                self.max_landmarks
            )));
        }
        self.meshing.validate()?;
        self.deformable.validate()
    }

    /// ICP parameters for one registration stage.
    #[must_use]
    pub fn icp_params(&self, mode: IcpMode) -> IcpParams {
        IcpParams::new()
            .with_mode(mode)
            .with_max_iterations(self.max_iterations)
            .with_max_mean_distance(self.max_mean_distance)
            .with_max_landmarks(self.max_landmarks)
    }
}

fn invalid(message: impl Into<String>) -> CellMechError {
    CellMechError::InvalidConfig(message.into())
}

fn positive(name: &str, value: f64) -> CellMechResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(format!("{name} must be positive, got {value}")))
    }
}

/// Volume meshing settings, see [`TetMeshParams`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MeshingConfig {
    /// Radius-edge ratio bound for refinement (default: 1.2).
    pub quality_bound: f64,
    /// Interior spacing relative to the mean surface edge (default: 1.0).
    pub interior_spacing: f64,
    /// Refinement passes (default: 4).
    pub max_refinement_passes: u32,
    /// Interior point budget per object (default: 20000).
    pub max_steiner_points: usize,
    /// Budget for points placed on the surface to recover it
    /// (default: 10000).
    pub max_boundary_points: usize,
}

impl Default for MeshingConfig {
    fn default() -> Self {
        let params = TetMeshParams::default();
        Self {
            quality_bound: params.quality_bound,
            interior_spacing: params.interior_spacing,
            max_refinement_passes: params.max_refinement_passes,
            max_steiner_points: params.max_steiner_points,
            max_boundary_points: params.max_boundary_points,
        }
    }
}

impl MeshingConfig {
    fn validate(&self) -> CellMechResult<()> {
        positive("meshing.quality_bound", self.quality_bound)?;
        positive("meshing.interior_spacing", self.interior_spacing)
    }

    /// Equivalent meshing parameters.
    #[must_use]
    pub fn params(&self) -> TetMeshParams {
        TetMeshParams::new()
            .with_quality_bound(self.quality_bound)
            .with_interior_spacing(self.interior_spacing)
            .with_max_refinement_passes(self.max_refinement_passes)
            .with_max_steiner_points(self.max_steiner_points)
            .with_max_boundary_points(self.max_boundary_points)
    }
}

/// Settings handed to a [`crate::DeformableRegistration`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeformableSettings {
    /// Iteration cap (default: 200).
    pub iterations: u32,
    /// Stop once the RMS change falls below this (default: 0.01).
    pub max_rms: f64,
    /// Standard deviation of the displacement smoothing kernel, in voxels
    /// (default: 3.0).
    pub displacement_smoothing: f64,
    /// Fraction of the larger bounding box span covered by one voxel
    /// (default: 0.01).
    pub precision: f64,
}

impl Default for DeformableSettings {
    fn default() -> Self {
        Self {
            iterations: 200,
            max_rms: 0.01,
            displacement_smoothing: 3.0,
            precision: 0.01,
        }
    }
}

impl DeformableSettings {
    fn validate(&self) -> CellMechResult<()> {
        positive("deformable.max_rms", self.max_rms)?;
        positive("deformable.displacement_smoothing", self.displacement_smoothing)?;
        positive("deformable.precision", self.precision)?;
        if self.precision > 1.0 {
            return Err(invalid(format!(
                "deformable.precision must not exceed 1, got {}",
                self.precision
            )));
        }
        Ok(())
    }
}
