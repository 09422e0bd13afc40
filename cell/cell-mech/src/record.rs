//! Per-object records and the assembled analysis.

use std::fmt;

use mesh_registration::AffineTransform;
use mesh_tetra::{MassProperties, TetMeshStats};
use mesh_types::{IndexedMesh, Point3, TetMesh, Vector3};
use nalgebra::Matrix3;
use serde::Serialize;

use crate::displacement::NodalField;
use crate::ecm::EcmStrain;
use crate::error::AnalysisWarning;
use crate::store::State;
use crate::strain::StrainTensor;

/// Transforms taking a reference surface onto its deformed counterpart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Registration {
    /// Rigid pre-alignment, if it was run.
    pub rigid: Option<AffineTransform>,
    /// Affine map from the pre-aligned reference to the deformed surface.
    pub affine: AffineTransform,
    /// Mean landmark movement in the last affine iteration.
    pub mean_distance: f64,
    /// RMS distance from the registered landmarks to the deformed surface.
    pub residual_rms: f64,
    /// Affine iterations run.
    pub iterations: u32,
    /// Whether the affine fit met its threshold.
    pub converged: bool,
}

impl Registration {
    /// Deformation gradient `F`, the linear part of the affine map.
    #[must_use]
    pub const fn deformation_gradient(&self) -> &Matrix3<f64> {
        &self.affine.linear
    }

    /// Rigid pre-alignment followed by the affine map.
    #[must_use]
    pub fn total(&self) -> AffineTransform {
        self.rigid
            .as_ref()
            .map_or(self.affine, |rigid| self.affine.compose(rigid))
    }
}

/// A voxel displacement field resampled on one reference mesh.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeformableMapping {
    /// Per-node displacement and strain.
    pub nodal: NodalField,
    /// Displacement of every surface node, in
    /// [`TetMesh::surface_nodes`] order.
    pub boundary: Vec<Vector3<f64>>,
}

/// Everything computed for one paired object.
#[derive(Debug, Clone)]
pub struct ObjectRecord {
    /// Object name (file stem).
    pub name: String,
    /// Position in the sorted object list.
    pub index: usize,
    /// Reference surface.
    pub reference: IndexedMesh,
    /// Deformed surface.
    pub deformed: IndexedMesh,
    /// Volume mesh of the reference surface.
    pub mesh: TetMesh,
    /// Meshing statistics of the reference and deformed surfaces.
    pub mesh_stats: [TetMeshStats; 2],
    /// Mass properties of the reference volume.
    pub reference_properties: MassProperties,
    /// Mass properties of the deformed volume.
    pub deformed_properties: MassProperties,
    /// Surface registration.
    pub registration: Registration,
    /// Green-Lagrange strain of the object.
    pub strain: StrainTensor,
    /// Relative volume change.
    pub volumetric_strain: f64,
    /// Displacement field on the reference mesh, when one was computed.
    pub deformable: Option<DeformableMapping>,
}

impl ObjectRecord {
    /// Mass properties of one state.
    #[must_use]
    pub const fn properties(&self, state: State) -> &MassProperties {
        match state {
            State::Reference => &self.reference_properties,
            State::Deformed => &self.deformed_properties,
        }
    }

    /// Centroid of one state.
    #[must_use]
    pub const fn centroid(&self, state: State) -> &Point3<f64> {
        &self.properties(state).centroid
    }
}

/// Pipeline stage at which an object was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "stage", content = "state", rename_all = "snake_case")]
pub enum FailureStage {
    /// Reading or cleaning up one surface.
    Loading(State),
    /// Volume meshing or mass properties of one surface.
    Meshing(State),
    /// Rigid or affine surface registration.
    Registration,
    /// Voxelization, deformable registration or field mapping.
    Deformable,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loading(state) => write!(f, "{state} loading"),
            Self::Meshing(state) => write!(f, "{state} meshing"),
            Self::Registration => f.write_str("registration"),
            Self::Deformable => f.write_str("deformable registration"),
        }
    }
}

/// An object that could not be analysed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectFailure {
    /// Object name.
    pub name: String,
    /// Position in the sorted object list.
    pub index: usize,
    /// Failing stage.
    pub stage: FailureStage,
    /// Error message, including its sources.
    pub message: String,
}

/// Result for one object slot.
#[derive(Debug, Clone)]
pub enum ObjectOutcome {
    /// Fully analysed.
    Complete(Box<ObjectRecord>),
    /// Skipped.
    Failed(ObjectFailure),
}

impl ObjectOutcome {
    /// Object name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Complete(record) => &record.name,
            Self::Failed(failure) => &failure.name,
        }
    }

    /// The record, if the object completed.
    #[must_use]
    pub fn record(&self) -> Option<&ObjectRecord> {
        match self {
            Self::Complete(record) => Some(record),
            Self::Failed(_) => None,
        }
    }
}

/// Output of one run.
///
/// Holds one outcome per object, in sorted name order.
#[derive(Debug, Clone)]
pub struct Analysis {
    objects: Vec<ObjectOutcome>,
    ecm: EcmStrain,
    warnings: Vec<AnalysisWarning>,
}

impl Analysis {
    pub(crate) const fn new(
        objects: Vec<ObjectOutcome>,
        ecm: EcmStrain,
        warnings: Vec<AnalysisWarning>,
    ) -> Self {
        Self {
            objects,
            ecm,
            warnings,
        }
    }

    /// Every object slot.
    #[must_use]
    pub fn objects(&self) -> &[ObjectOutcome] {
        &self.objects
    }

    /// Completed objects.
    pub fn records(&self) -> impl Iterator<Item = &ObjectRecord> {
        self.objects.iter().filter_map(ObjectOutcome::record)
    }

    /// Skipped objects.
    pub fn failures(&self) -> impl Iterator<Item = &ObjectFailure> {
        self.objects.iter().filter_map(|o| match o {
            ObjectOutcome::Failed(failure) => Some(failure),
            ObjectOutcome::Complete(_) => None,
        })
    }

    /// Record of the named object.
    #[must_use]
    pub fn record(&self, name: &str) -> Option<&ObjectRecord> {
        self.records().find(|r| r.name == name)
    }

    /// Tissue-level strain.
    #[must_use]
    pub const fn ecm(&self) -> &EcmStrain {
        &self.ecm
    }

    /// Non-fatal conditions met during the run.
    #[must_use]
    pub fn warnings(&self) -> &[AnalysisWarning] {
        &self.warnings
    }

    /// Cell strain per object slot, `None` for skipped objects.
    #[must_use]
    pub fn cell_strains(&self) -> Vec<Option<StrainTensor>> {
        self.objects
            .iter()
            .map(|o| o.record().map(|r| r.strain))
            .collect()
    }

    /// Volumetric strain per object slot, `None` for skipped objects.
    #[must_use]
    pub fn volumetric_strains(&self) -> Vec<Option<f64>> {
        self.objects
            .iter()
            .map(|o| o.record().map(|r| r.volumetric_strain))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use mesh_registration::RigidTransform;
    use nalgebra::UnitQuaternion;

    #[test]
    fn total_applies_the_rigid_step_first() {
        let rigid = AffineTransform::from(RigidTransform::new(
            UnitQuaternion::from_euler_angles(0.0, 0.0, std::f64::consts::FRAC_PI_2),
            Vector3::new(1.0, 0.0, 0.0),
        ));
        let affine = AffineTransform::new(Matrix3::identity() * 2.0, Vector3::zeros());
        let registration = Registration {
            rigid: Some(rigid),
            affine,
            mean_distance: 0.0,
            residual_rms: 0.0,
            iterations: 1,
            converged: true,
        };
        let p = Point3::new(1.0, 0.0, 0.0);
        let expected = affine.transform_point(&rigid.transform_point(&p));
        assert_relative_eq!(registration.total().transform_point(&p), expected, epsilon = 1e-12);
        assert_relative_eq!(*registration.deformation_gradient(), Matrix3::identity() * 2.0);
    }

    #[test]
    fn failure_stage_display_and_json() {
        assert_eq!(FailureStage::Meshing(State::Deformed).to_string(), "deformed meshing");
        assert_eq!(FailureStage::Loading(State::Reference).to_string(), "reference loading");
        let json = serde_json::to_value(FailureStage::Meshing(State::Reference)).unwrap_or_default();
        assert_eq!(json["stage"], "meshing");
        assert_eq!(json["state"], "reference");
        let json = serde_json::to_value(FailureStage::Registration).unwrap_or_default();
        assert_eq!(json["stage"], "registration");
    }
}
