//! End-to-end runs of the analysis pipeline.
//!
//! Run with: cargo test -p cell-mech --test scenarios

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::fs;
use std::path::Path;

use approx::assert_relative_eq;
use cell_mech::{
    export_analysis, AnalysisWarning, BinaryImage, CellMech, CellMechConfig, CellMechError,
    CellMechResult, DeformableRegistration, DeformableSettings, DisplacementField, EcmStrain,
    EcmUnavailable, ExportOptions, FailureStage, State, StrainTensor, SurfacePair, SurfaceStore,
};
use mesh_io::save_stl;
use mesh_types::{icosphere, uv_ellipsoid, IndexedMesh, Vector3};
use nalgebra::Matrix3;
use tempfile::TempDir;

fn sphere_at(radius: f64, center: Vector3<f64>) -> IndexedMesh {
    let mut sphere = icosphere(radius, 2);
    sphere.translate(center);
    sphere
}

fn write_dirs(objects: &[(&str, &IndexedMesh, &IndexedMesh)]) -> TempDir {
    let root = TempDir::new().unwrap();
    let reference = root.path().join("reference");
    let deformed = root.path().join("deformed");
    fs::create_dir_all(&reference).unwrap();
    fs::create_dir_all(&deformed).unwrap();
    for (name, before, after) in objects {
        save_stl(before, reference.join(format!("{name}.stl")), true).unwrap();
        save_stl(after, deformed.join(format!("{name}.stl")), true).unwrap();
    }
    root
}

fn open(root: &Path) -> SurfaceStore {
    SurfaceStore::open(root.join("reference"), root.join("deformed")).unwrap()
}

#[test]
fn scaled_object_gives_uniform_strain() {
    let cell_a = sphere_at(5.0, Vector3::zeros());
    let cell_b = sphere_at(4.0, Vector3::new(20.0, 0.0, 0.0));
    let mut cell_b_scaled = cell_b.clone();
    cell_b_scaled.scale(1.1);
    let root = write_dirs(&[("cellA", &cell_a, &cell_a), ("cellB", &cell_b, &cell_b_scaled)]);

    let analysis = CellMech::new(CellMechConfig::default())
        .unwrap()
        .run(&open(root.path()))
        .unwrap();

    let strains = analysis.cell_strains();
    let vstrains = analysis.volumetric_strains();
    assert_eq!(strains.len(), 2);

    let unchanged = strains[0].unwrap();
    assert!(unchanged.matrix().amax() < 5e-3);
    assert!(vstrains[0].unwrap().abs() < 1e-6);

    let stretched = strains[1].unwrap();
    assert_relative_eq!(*stretched.matrix(), Matrix3::identity() * 0.105, epsilon = 5e-3);
    assert_relative_eq!(vstrains[1].unwrap(), 1.1_f64.powi(3) - 1.0, epsilon = 1e-3);

    // Two objects cannot span a tetrahedron.
    assert_eq!(
        *analysis.ecm(),
        EcmStrain::Unavailable {
            reason: EcmUnavailable::InsufficientObjects { count: 2 }
        }
    );
    assert!(analysis
        .warnings()
        .contains(&AnalysisWarning::InsufficientObjects { count: 2 }));
}

#[test]
fn unpaired_files_fail_before_any_surface_is_read() {
    let root = TempDir::new().unwrap();
    let reference = root.path().join("reference");
    let deformed = root.path().join("deformed");
    fs::create_dir_all(&reference).unwrap();
    fs::create_dir_all(&deformed).unwrap();
    let cube = mesh_types::unit_cube();
    save_stl(&cube, reference.join("cellA.stl"), false).unwrap();
    save_stl(&cube, deformed.join("cellA.stl"), false).unwrap();
    // Unparseable, so a read would fail with a different error.
    fs::write(reference.join("cellB.stl"), "not a mesh").unwrap();

    match SurfaceStore::open(&reference, &deformed) {
        Err(CellMechError::Pairing {
            only_in_reference,
            only_in_deformed,
        }) => {
            assert_eq!(only_in_reference, vec!["cellB".to_string()]);
            assert!(only_in_deformed.is_empty());
        }
        other => panic!("expected a pairing error, got {other:?}"),
    }
}

#[test]
fn broken_surface_file_does_not_stop_the_batch() {
    let good = sphere_at(3.0, Vector3::zeros());
    let mut holed = sphere_at(3.0, Vector3::new(10.0, 0.0, 0.0));
    let intact = holed.clone();
    holed.faces.swap_remove(0);
    let root = write_dirs(&[("a", &good, &good), ("b", &holed, &intact)]);

    let analysis = CellMech::new(CellMechConfig::default())
        .unwrap()
        .run(&open(root.path()))
        .unwrap();

    assert_eq!(analysis.objects().len(), 2);
    assert!(analysis.record("a").unwrap().volumetric_strain.abs() < 1e-9);
    let failure = analysis.failures().next().unwrap();
    assert_eq!((failure.name.as_str(), failure.index), ("b", 1));
    assert_eq!(failure.stage, FailureStage::Loading(State::Reference));
    assert!(analysis.warnings().iter().any(|w| matches!(
        w,
        AnalysisWarning::ObjectFailed { object, .. } if object == "b"
    )));

    let out = TempDir::new().unwrap();
    export_analysis(&analysis, out.path(), &ExportOptions::default()).unwrap();
    let summary: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.path().join("summary.json")).unwrap()).unwrap();
    assert_eq!(summary["failures"][0]["name"], "b");
    assert_eq!(summary["failures"][0]["stage"]["stage"], "loading");
    assert!(out.path().join("cell0001.vtu").exists());
    assert!(!out.path().join("cell0002.vtu").exists());
}

#[test]
fn self_registration_is_the_identity() {
    let surface = uv_ellipsoid(Vector3::new(3.0, 2.0, 1.5), 24, 12);
    let store =
        SurfaceStore::from_pairs(vec![SurfacePair::new("cell", surface.clone(), surface)]).unwrap();
    let analysis = CellMech::new(CellMechConfig::default()).unwrap().run(&store).unwrap();

    let record = analysis.record("cell").unwrap();
    assert!(record.registration.affine.is_identity(1e-3));
    assert!(record.registration.residual_rms < 1e-6);
    assert!(record.registration.converged);
    assert!(record.volumetric_strain.abs() < 1e-12);
    assert!(record.strain.matrix().amax() < 1e-3);

    let radii = record.reference_properties.radii();
    assert!(radii[0] > radii[1] && radii[1] > radii[2]);
}

#[test]
fn ecm_strain_follows_the_centroids() {
    let f = Matrix3::new(1.05, 0.02, 0.0, 0.0, 0.97, 0.01, 0.0, 0.0, 1.1);
    let centers = [
        Vector3::new(0.0, 0.0, 0.0),
        Vector3::new(20.0, 0.0, 0.0),
        Vector3::new(0.0, 20.0, 0.0),
        Vector3::new(0.0, 0.0, 20.0),
        Vector3::new(15.0, 15.0, 15.0),
    ];
    let pairs: Vec<SurfacePair> = centers
        .iter()
        .enumerate()
        .map(|(i, c)| {
            SurfacePair::new(
                format!("cell{i}"),
                sphere_at(2.0, *c),
                sphere_at(2.0, f * c),
            )
        })
        .collect();
    let config = CellMechConfig {
        max_iterations: 200,
        ..CellMechConfig::default()
    };
    let analysis = CellMech::new(config).unwrap().analyze(&pairs).unwrap();

    let EcmStrain::Available { strain, vertices, .. } = analysis.ecm() else {
        panic!("expected an ECM strain, got {:?}", analysis.ecm());
    };
    assert!(vertices.iter().all(|&v| v < centers.len()));
    assert_relative_eq!(
        *strain.matrix(),
        *StrainTensor::green_lagrange(&f).matrix(),
        epsilon = 1e-6
    );
}

/// Returns `u = 0.1 (x - c)` about the reference image centre.
struct UniformStretch;

impl DeformableRegistration for UniformStretch {
    fn register(
        &self,
        reference: &BinaryImage,
        deformed: &BinaryImage,
        settings: &DeformableSettings,
    ) -> CellMechResult<DisplacementField> {
        assert_eq!(reference.dims, deformed.dims);
        assert!(settings.iterations > 0);
        let [nx, ny, nz] = reference.dims;
        let center = reference.voxel_center(nx - 1, ny - 1, nz - 1).coords * 0.5
            + reference.origin.coords * 0.5;
        DisplacementField::from_fn(reference.origin, reference.spacing, reference.dims, |p| {
            (p.coords - center) * 0.1
        })
    }
}

#[test]
fn deformable_mapping_is_exported() {
    let reference = icosphere(3.0, 2);
    let mut deformed = reference.clone();
    deformed.scale(1.1);
    let mut config = CellMechConfig {
        require_deformable_registration: true,
        export_fea_package: true,
        ..CellMechConfig::default()
    };
    config.deformable.precision = 0.1;

    let store = SurfaceStore::from_pairs(vec![SurfacePair::new("cellA", reference, deformed)]).unwrap();
    let pipeline = CellMech::new(config.clone())
        .unwrap()
        .with_deformable_registration(UniformStretch);
    let analysis = pipeline.run(&store).unwrap();

    let record = analysis.record("cellA").unwrap();
    let mapping = record.deformable.as_ref().unwrap();
    assert_eq!(mapping.nodal.valid_count(), record.mesh.node_count());
    assert_eq!(mapping.boundary.len(), record.mesh.surface_nodes.len());
    for e in &mapping.nodal.strains {
        assert_relative_eq!(*e.matrix(), Matrix3::identity() * 0.1, epsilon = 1e-9);
    }

    let out = TempDir::new().unwrap();
    let written = export_analysis(&analysis, out.path(), &ExportOptions::from_config(&config)).unwrap();
    for name in ["summary.json", "cell0001.vtu", "cellFEA00.json"] {
        assert!(written.contains(&out.path().join(name)), "{name} not written");
    }

    let summary: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.path().join("summary.json")).unwrap()).unwrap();
    assert_eq!(summary["objects"][0]["name"], "cellA");
    assert_eq!(summary["ecm"]["status"], "unavailable");

    let fea: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.path().join("cellFEA00.json")).unwrap()).unwrap();
    assert_eq!(
        fea["boundary_conditions"].as_array().unwrap().len(),
        fea["surfaces"].as_array().unwrap().len()
    );
    assert_eq!(fea["nodes"].as_array().unwrap().len(), record.mesh.node_count());

    let vtu = fs::read_to_string(out.path().join("cell0001.vtu")).unwrap();
    assert!(vtu.contains("Name=\"Displacement\""));
    assert!(vtu.contains("Name=\"Exy\""));
}

#[test]
fn missing_registrar_is_a_configuration_error() {
    let root = write_dirs(&[("cellA", &icosphere(1.0, 1), &icosphere(1.0, 1))]);
    let config = CellMechConfig {
        require_deformable_registration: true,
        ..CellMechConfig::default()
    };
    let err = CellMech::new(config).unwrap().run(&open(root.path())).unwrap_err();
    assert!(matches!(err, CellMechError::InvalidConfig(_)));
}
