//! Orchestration of one analysis run.

use std::error::Error;
use std::fmt;

use mesh_registration::{icp_register, AffineTransform, IcpMode};
use mesh_tetra::{mass_properties, tetrahedralize, MassProperties, TetMeshStats};
use mesh_types::{IndexedMesh, Point3, TetMesh};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::config::CellMechConfig;
use crate::displacement::{boundary_displacements, map_to_nodes, DeformableRegistration};
use crate::ecm::{estimate_ecm_strain, EcmStrain, EcmUnavailable};
use crate::error::{AnalysisWarning, CellMechError, CellMechResult};
use crate::record::{
    Analysis, DeformableMapping, FailureStage, ObjectFailure, ObjectOutcome, ObjectRecord,
    Registration,
};
use crate::store::{State, SurfacePair, SurfaceStore};
use crate::strain::{volumetric_strain, StrainTensor};
use crate::voxelize::voxelize_pair;

/// Runs the full analysis over paired surfaces.
///
/// Objects are processed in parallel. An object that cannot be loaded,
/// meshed or registered is recorded as an [`ObjectFailure`] and the run
/// continues.
///
/// # Example
///
/// ```
/// use cell_mech::{CellMech, CellMechConfig, SurfacePair, SurfaceStore};
/// use mesh_types::icosphere;
///
/// let reference = icosphere(5.0, 2);
/// let mut deformed = reference.clone();
/// deformed.scale(1.1);
///
/// let store = SurfaceStore::from_pairs(vec![SurfacePair::new("cellA", reference, deformed)])?;
/// let analysis = CellMech::new(CellMechConfig::default())?.run(&store)?;
///
/// let strain = analysis.cell_strains()[0].expect("object completed");
/// assert!((strain.matrix()[(0, 0)] - 0.105).abs() < 5e-3);
/// assert!(!analysis.ecm().is_available());
/// # Ok::<(), cell_mech::CellMechError>(())
/// ```
pub struct CellMech {
    config: CellMechConfig,
    deformable: Option<Box<dyn DeformableRegistration>>,
}

impl fmt::Debug for CellMech {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CellMech")
            .field("config", &self.config)
            .field("deformable", &self.deformable.is_some())
            .finish()
    }
}

/// Per-object result before assembly.
struct ObjectRun {
    outcome: ObjectOutcome,
    warnings: Vec<AnalysisWarning>,
}

/// Meshing output for one surface.
struct Volume {
    mesh: TetMesh,
    stats: TetMeshStats,
    properties: MassProperties,
}

impl CellMech {
    /// Creates a pipeline.
    ///
    /// # Errors
    ///
    /// [`CellMechError::InvalidConfig`] if the configuration is out of range.
    pub fn new(config: CellMechConfig) -> CellMechResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            deformable: None,
        })
    }

    /// Adds a deformable registration collaborator.
    ///
    /// With one attached, every completed object also gets a voxel
    /// displacement field mapped onto its reference mesh.
    #[must_use]
    pub fn with_deformable_registration(
        mut self,
        registrar: impl DeformableRegistration + 'static,
    ) -> Self {
        self.deformable = Some(Box::new(registrar));
        self
    }

    /// The run configuration.
    #[must_use]
    pub const fn config(&self) -> &CellMechConfig {
        &self.config
    }

    /// Loads the store and analyses it.
    ///
    /// An object whose surface cannot be read or prepared is recorded as
    /// failed at [`FailureStage::Loading`] and keeps its slot.
    ///
    /// # Errors
    ///
    /// Configuration errors are reported before any surface is read. See
    /// [`CellMech::analyze`].
    pub fn run(&self, store: &SurfaceStore) -> CellMechResult<Analysis> {
        self.check_ready()?;
        if store.is_empty() {
            return Err(CellMechError::NoObjects);
        }
        let names = store.names();
        let loaded = store.load();
        info!(objects = loaded.len(), "analysing objects");

        let runs: Vec<ObjectRun> = loaded
            .par_iter()
            .zip(names.par_iter())
            .enumerate()
            .map(|(index, (slot, name))| match slot {
                Ok(pair) => self.analyze_object(index, pair),
                Err(err) => load_failure(index, name, err),
            })
            .collect();
        Ok(self.assemble(runs))
    }

    /// Analyses already loaded surface pairs, in the given order.
    ///
    /// # Errors
    ///
    /// [`CellMechError::InvalidConfig`] if deformable registration is
    /// required but no collaborator is attached, and
    /// [`CellMechError::NoObjects`] for an empty input. Per-object problems
    /// are not errors.
    pub fn analyze(&self, pairs: &[SurfacePair]) -> CellMechResult<Analysis> {
        self.check_ready()?;
        if pairs.is_empty() {
            return Err(CellMechError::NoObjects);
        }
        info!(objects = pairs.len(), "analysing objects");

        let runs: Vec<ObjectRun> = pairs
            .par_iter()
            .enumerate()
            .map(|(index, pair)| self.analyze_object(index, pair))
            .collect();
        Ok(self.assemble(runs))
    }

    /// Collects per-object runs into an analysis with the ECM strain.
    fn assemble(&self, runs: Vec<ObjectRun>) -> Analysis {
        let mut objects = Vec::with_capacity(runs.len());
        let mut warnings = Vec::new();
        for run in runs {
            warnings.extend(run.warnings);
            if let ObjectOutcome::Failed(failure) = &run.outcome {
                warnings.push(AnalysisWarning::ObjectFailed {
                    object: failure.name.clone(),
                    stage: failure.stage,
                    message: failure.message.clone(),
                });
            }
            objects.push(run.outcome);
        }

        let ecm = self.ecm_strain(&objects);
        match &ecm {
            EcmStrain::Available { strain, .. } => {
                info!(principal = ?strain.principal_strains(), "ECM strain");
            }
            EcmStrain::Unavailable { reason } => warnings.push(match reason {
                EcmUnavailable::InsufficientObjects { count } => {
                    AnalysisWarning::InsufficientObjects { count: *count }
                }
                EcmUnavailable::DegenerateTessellation { detail } => {
                    AnalysisWarning::DegenerateTessellation {
                        detail: detail.clone(),
                    }
                }
                EcmUnavailable::MismatchedCentroids { reference, deformed } => {
                    AnalysisWarning::DegenerateTessellation {
                        detail: format!("{reference} reference and {deformed} deformed centroids"),
                    }
                }
            }),
        }

        for warning in &warnings {
            warn!(%warning, "analysis warning");
        }
        let analysis = Analysis::new(objects, ecm, warnings);
        info!(
            completed = analysis.records().count(),
            failed = analysis.failures().count(),
            warnings = analysis.warnings().len(),
            "analysis finished"
        );
        analysis
    }

    fn check_ready(&self) -> CellMechResult<()> {
        if self.config.require_deformable_registration && self.deformable.is_none() {
            return Err(CellMechError::InvalidConfig(
                "deformable registration is required but no registrar is attached".to_string(),
            ));
        }
        Ok(())
    }

    fn analyze_object(&self, index: usize, pair: &SurfacePair) -> ObjectRun {
        let mut warnings = Vec::new();
        let fail = |stage, message| ObjectRun {
            outcome: ObjectOutcome::Failed(ObjectFailure {
                name: pair.name.clone(),
                index,
                stage,
                message,
            }),
            warnings: Vec::new(),
        };

        let mut volumes = Vec::with_capacity(2);
        for state in [State::Reference, State::Deformed] {
            match self.volume(pair.surface(state)) {
                Ok(volume) => {
                    if volume.stats.missing_surface_faces > 0 {
                        warnings.push(AnalysisWarning::MeshQuality {
                            object: pair.name.clone(),
                            state,
                            missing_surface_faces: volume.stats.missing_surface_faces,
                            elements_over_bound: volume.stats.elements_over_bound,
                        });
                    }
                    volumes.push(volume);
                }
                Err(err) => {
                    let mut run = fail(FailureStage::Meshing(state), error_chain(&err));
                    run.warnings = warnings;
                    return run;
                }
            }
        }
        let Some(deformed_volume) = volumes.pop() else {
            return fail(FailureStage::Meshing(State::Deformed), "no volume".to_string());
        };
        let Some(reference_volume) = volumes.pop() else {
            return fail(FailureStage::Meshing(State::Reference), "no volume".to_string());
        };

        let (registration, aligned) = match self.register(&pair.reference, &pair.deformed) {
            Ok(registered) => registered,
            Err(err) => {
                let mut run = fail(FailureStage::Registration, error_chain(&err));
                run.warnings = warnings;
                return run;
            }
        };
        if !registration.converged {
            warnings.push(AnalysisWarning::RegistrationQuality {
                object: pair.name.clone(),
                mean_distance: registration.mean_distance,
                iterations: registration.iterations,
            });
        }

        let strain = StrainTensor::green_lagrange(registration.deformation_gradient());
        let vstrain = volumetric_strain(
            reference_volume.properties.volume,
            deformed_volume.properties.volume,
        );

        let deformable = match &self.deformable {
            Some(registrar) => match self.map_displacements(
                registrar.as_ref(),
                &aligned,
                &pair.deformed,
                registration.rigid.as_ref(),
                &reference_volume.mesh,
            ) {
                Ok(mapping) => Some(mapping),
                Err(err) => {
                    let mut run = fail(FailureStage::Deformable, error_chain(&err));
                    run.warnings = warnings;
                    return run;
                }
            },
            None => None,
        };

        info!(
            object = %pair.name,
            reference_volume = reference_volume.properties.volume,
            deformed_volume = deformed_volume.properties.volume,
            volumetric_strain = vstrain,
            principal_strains = ?strain.principal_strains(),
            iterations = registration.iterations,
            "object analysed"
        );

        ObjectRun {
            outcome: ObjectOutcome::Complete(Box::new(ObjectRecord {
                name: pair.name.clone(),
                index,
                reference: pair.reference.clone(),
                deformed: pair.deformed.clone(),
                mesh_stats: [reference_volume.stats, deformed_volume.stats],
                mesh: reference_volume.mesh,
                reference_properties: reference_volume.properties,
                deformed_properties: deformed_volume.properties,
                registration,
                strain,
                volumetric_strain: vstrain,
                deformable,
            })),
            warnings,
        }
    }

    fn volume(&self, surface: &IndexedMesh) -> mesh_tetra::TetraResult<Volume> {
        let (mesh, stats) = tetrahedralize(surface, &self.config.meshing.params())?;
        let properties = mass_properties(&mesh, self.config.inertia)?;
        Ok(Volume {
            mesh,
            stats,
            properties,
        })
    }

    /// Rigid pre-alignment (optional) then affine ICP. Returns the
    /// registration and the pre-aligned copy of the reference surface.
    fn register(
        &self,
        reference: &IndexedMesh,
        deformed: &IndexedMesh,
    ) -> mesh_registration::RegistrationResult<(Registration, IndexedMesh)> {
        let rigid = if self.config.rigid_prefit {
            let fit = icp_register(reference, deformed, &self.config.icp_params(IcpMode::Rigid))?;
            debug!(
                iterations = fit.iterations,
                rms = fit.rms_error,
                "rigid pre-alignment"
            );
            Some(fit.transform)
        } else {
            None
        };
        let aligned = match &rigid {
            Some(transform) => reference.map_positions(|p| transform.transform_point(p)),
            None => reference.clone(),
        };

        let fit = icp_register(&aligned, deformed, &self.config.icp_params(IcpMode::Affine))?;
        debug!(
            iterations = fit.iterations,
            mean_distance = fit.mean_distance,
            rms = fit.rms_error,
            max = fit.max_error,
            landmarks = fit.correspondence_count,
            "affine registration"
        );
        let registration = Registration {
            rigid,
            affine: fit.transform,
            mean_distance: fit.mean_distance,
            residual_rms: fit.rms_error,
            iterations: fit.iterations,
            converged: fit.converged,
        };
        Ok((registration, aligned))
    }

    fn map_displacements(
        &self,
        registrar: &dyn DeformableRegistration,
        aligned: &IndexedMesh,
        deformed: &IndexedMesh,
        rigid: Option<&AffineTransform>,
        mesh: &TetMesh,
    ) -> CellMechResult<DeformableMapping> {
        let settings = &self.config.deformable;
        let (reference_image, deformed_image) = voxelize_pair(aligned, deformed, settings.precision)?;
        let field = registrar.register(&reference_image, &deformed_image, settings)?;
        let nodal = map_to_nodes(&field, mesh, rigid);
        debug!(
            nodes = mesh.node_count(),
            mapped = nodal.valid_count(),
            "mapped displacement field"
        );
        let boundary = boundary_displacements(mesh, &nodal);
        Ok(DeformableMapping { nodal, boundary })
    }

    /// Tissue strain over the completed objects' centroids.
    fn ecm_strain(&self, objects: &[ObjectOutcome]) -> EcmStrain {
        let records: Vec<&ObjectRecord> = objects.iter().filter_map(ObjectOutcome::record).collect();
        let centroids = |state| -> Vec<Point3<f64>> {
            records.iter().map(|r| *r.centroid(state)).collect()
        };
        let ecm = estimate_ecm_strain(
            &centroids(State::Reference),
            &centroids(State::Deformed),
            self.config.ecm_quality,
        );
        match ecm {
            EcmStrain::Available {
                strain,
                vertices,
                quality,
                measure,
            } => EcmStrain::Available {
                strain,
                vertices: vertices.map(|v| records[v].index),
                quality,
                measure,
            },
            unavailable @ EcmStrain::Unavailable { .. } => unavailable,
        }
    }
}

/// Failure record for an object whose surfaces did not load.
fn load_failure(index: usize, name: &str, err: &CellMechError) -> ObjectRun {
    let state = match err {
        CellMechError::Surface { state, .. } => *state,
        _ => State::Reference,
    };
    ObjectRun {
        outcome: ObjectOutcome::Failed(ObjectFailure {
            name: name.to_string(),
            index,
            stage: FailureStage::Loading(state),
            message: error_chain(err),
        }),
        warnings: Vec::new(),
    }
}

/// An error message followed by its sources.
fn error_chain(err: &dyn Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::record::FailureStage;
    use mesh_types::{icosphere, unit_cube, Vector3};
    use nalgebra::Matrix3;

    fn config() -> CellMechConfig {
        CellMechConfig {
            max_iterations: 200,
            ..CellMechConfig::default()
        }
    }

    #[test]
    fn required_registrar_is_checked_before_work() {
        let config = CellMechConfig {
            require_deformable_registration: true,
            ..config()
        };
        let pipeline = CellMech::new(config).unwrap();
        let err = pipeline.analyze(&[]).unwrap_err();
        assert!(matches!(err, CellMechError::InvalidConfig(_)));
    }

    #[test]
    fn empty_input_has_no_objects() {
        let pipeline = CellMech::new(config()).unwrap();
        assert!(matches!(pipeline.analyze(&[]), Err(CellMechError::NoObjects)));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = CellMechConfig {
            max_iterations: 0,
            ..config()
        };
        assert!(CellMech::new(config).is_err());
    }

    #[test]
    fn translation_only_is_strain_free() {
        let reference = icosphere(3.0, 2);
        let mut deformed = reference.clone();
        deformed.translate(Vector3::new(4.0, -1.0, 2.0));
        let pair = SurfacePair::new("moved", reference, deformed);

        let analysis = CellMech::new(config()).unwrap().analyze(&[pair]).unwrap();
        let record = analysis.record("moved").unwrap();
        assert!(record.strain.matrix().amax() < 1e-3);
        assert!(record.volumetric_strain.abs() < 1e-9);
        assert!(record.registration.rigid.is_some());
        let moved = record.deformed_properties.centroid - record.reference_properties.centroid;
        assert!((moved - Vector3::new(4.0, -1.0, 2.0)).norm() < 1e-9);
    }

    #[test]
    fn open_surface_fails_only_its_object() {
        let mut open = unit_cube();
        open.faces.pop();
        let pairs = [
            SurfacePair::new("a_open", open, unit_cube()),
            SurfacePair::new("b_cube", unit_cube(), unit_cube()),
        ];
        let analysis = CellMech::new(config()).unwrap().analyze(&pairs).unwrap();

        let failures: Vec<_> = analysis.failures().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].index, 0);
        assert_eq!(failures[0].stage, FailureStage::Meshing(State::Reference));
        assert!(analysis.cell_strains()[0].is_none());
        assert!(analysis.cell_strains()[1].is_some());
        assert!(analysis
            .warnings()
            .iter()
            .any(|w| matches!(w, AnalysisWarning::ObjectFailed { object, .. } if object == "a_open")));
        assert!(analysis
            .warnings()
            .iter()
            .any(|w| matches!(w, AnalysisWarning::InsufficientObjects { count: 1 })));
    }

    #[test]
    fn unusable_surface_fails_only_its_object() {
        let mut open = icosphere(2.0, 2);
        open.faces.truncate(open.faces.len() - 1);
        let store = SurfaceStore::from_pairs(vec![
            SurfacePair::new("a", icosphere(2.0, 2), icosphere(2.0, 2)),
            SurfacePair::new("b", icosphere(2.0, 2), open),
        ])
        .unwrap();
        let analysis = CellMech::new(config()).unwrap().run(&store).unwrap();

        assert_eq!(analysis.objects().len(), 2);
        assert!(analysis.record("a").is_some());
        let failures: Vec<_> = analysis.failures().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].name, "b");
        assert_eq!(failures[0].index, 1);
        assert_eq!(failures[0].stage, FailureStage::Loading(State::Deformed));
        assert!(failures[0].message.contains("deformed surface of 'b'"));
        assert!(analysis.warnings().iter().any(|w| matches!(
            w,
            AnalysisWarning::ObjectFailed { object, stage: FailureStage::Loading(_), .. }
                if object == "b"
        )));
    }

    #[test]
    fn unconverged_registration_is_reported() {
        let reference = icosphere(3.0, 2);
        let mut deformed = reference.clone();
        deformed.scale(1.1);
        let config = CellMechConfig {
            max_iterations: 1,
            max_mean_distance: 0.0,
            ..config()
        };
        let analysis = CellMech::new(config)
            .unwrap()
            .analyze(&[SurfacePair::new("cell", reference, deformed)])
            .unwrap();

        let record = analysis.record("cell").unwrap();
        assert!(!record.registration.converged);
        assert!(record.registration.iterations <= 1);
        assert!(record.registration.residual_rms.is_finite());
        assert!(analysis.warnings().iter().any(|w| matches!(
            w,
            AnalysisWarning::RegistrationQuality { object, iterations, .. }
                if object == "cell" && *iterations == record.registration.iterations
        )));
    }

    #[test]
    fn affine_fit_alone_recovers_a_uniform_stretch() {
        let reference = icosphere(3.0, 2);
        let mut deformed = reference.clone();
        deformed.scale(1.1);
        let config = CellMechConfig {
            rigid_prefit: false,
            ..config()
        };
        let analysis = CellMech::new(config)
            .unwrap()
            .analyze(&[SurfacePair::new("cell", reference, deformed)])
            .unwrap();

        let record = analysis.record("cell").unwrap();
        assert!(record.registration.rigid.is_none());
        let expected = Matrix3::identity() * (0.5 * (1.1_f64.powi(2) - 1.0));
        assert!((record.strain.matrix() - expected).amax() < 5e-3);
        assert!((record.volumetric_strain - (1.1_f64.powi(3) - 1.0)).abs() < 1e-3);
    }

    #[test]
    fn error_chain_includes_sources() {
        let err = CellMechError::Surface {
            name: "x".to_string(),
            state: State::Reference,
            source: mesh_repair::RepairError::NonOrientable.into(),
        };
        let message = error_chain(&err);
        assert!(message.starts_with("reference surface of 'x' is unusable: "));
        assert!(message.len() > "reference surface of 'x' is unusable: ".len());
    }
}
