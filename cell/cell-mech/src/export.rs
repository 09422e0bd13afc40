//! Writing analysis results to disk.
//!
//! | File | Content |
//! |------|---------|
//! | `summary.json` | Per-object volumes, centroids, axes, strains and registration, failures, ECM strain, warnings |
//! | `cell{NNNN}.vtu` | Reference volume mesh of object `NNNN` (1-based), with displacement and strain node fields when a mapping exists |
//! | `cellFEA{NN}.json` | Nodes, elements, surface nodes and boundary displacements of object `NN` (0-based) |

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use mesh_io::{save_vtu, PointField};
use mesh_tetra::{MassProperties, TetMeshStats};
use serde::Serialize;
use tracing::info;

use crate::config::CellMechConfig;
use crate::ecm::EcmStrain;
use crate::error::{AnalysisWarning, CellMechError, CellMechResult};
use crate::record::{Analysis, ObjectFailure, ObjectRecord, Registration};
use crate::strain::StrainTensor;

/// Names of the strain component node fields, in
/// [`StrainTensor::components`] order.
const STRAIN_FIELDS: [&str; 6] = ["Exx", "Eyy", "Ezz", "Exy", "Exz", "Eyz"];

/// Which files to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportOptions {
    /// `summary.json` (default: true).
    pub summary: bool,
    /// One `.vtu` volume mesh per completed object (default: true).
    pub meshes: bool,
    /// Finite element packages for objects with a displacement mapping
    /// (default: false).
    pub fea_package: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            summary: true,
            meshes: true,
            fea_package: false,
        }
    }
}

impl ExportOptions {
    /// Options matching a run configuration.
    #[must_use]
    pub fn from_config(config: &CellMechConfig) -> Self {
        Self {
            fea_package: config.export_fea_package,
            ..Self::default()
        }
    }
}

#[derive(Serialize)]
struct Summary<'a> {
    objects: Vec<ObjectSummary<'a>>,
    failures: Vec<&'a ObjectFailure>,
    ecm: &'a EcmStrain,
    warnings: &'a [AnalysisWarning],
}

#[derive(Serialize)]
struct ObjectSummary<'a> {
    name: &'a str,
    index: usize,
    reference: &'a MassProperties,
    deformed: &'a MassProperties,
    registration: &'a Registration,
    strain: &'a StrainTensor,
    principal_strains: [f64; 3],
    volumetric_strain: f64,
    meshing: &'a [TetMeshStats; 2],
    mapped_nodes: Option<usize>,
}

impl<'a> From<&'a ObjectRecord> for ObjectSummary<'a> {
    fn from(record: &'a ObjectRecord) -> Self {
        Self {
            name: &record.name,
            index: record.index,
            reference: &record.reference_properties,
            deformed: &record.deformed_properties,
            registration: &record.registration,
            strain: &record.strain,
            principal_strains: record.strain.principal_strains(),
            volumetric_strain: record.volumetric_strain,
            meshing: &record.mesh_stats,
            mapped_nodes: record.deformable.as_ref().map(|m| m.nodal.valid_count()),
        }
    }
}

/// Finite element input for one object.
#[derive(Serialize)]
struct FeaPackage<'a> {
    nodes: Vec<[f64; 3]>,
    elements: &'a [[u32; 4]],
    surfaces: &'a [u32],
    boundary_conditions: Vec<[f64; 3]>,
}

/// Writes the selected outputs of `analysis` into `dir`, creating it if
/// needed, and returns the paths written.
///
/// # Errors
///
/// [`CellMechError::Io`] if the directory or a file cannot be created,
/// [`CellMechError::Export`] if a mesh cannot be written and
/// [`CellMechError::Json`] if a document cannot be serialized.
pub fn export_analysis(
    analysis: &Analysis,
    dir: impl AsRef<Path>,
    options: &ExportOptions,
) -> CellMechResult<Vec<PathBuf>> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir).map_err(|source| CellMechError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut written = Vec::new();

    if options.summary {
        let summary = Summary {
            objects: analysis.records().map(ObjectSummary::from).collect(),
            failures: analysis.failures().collect(),
            ecm: analysis.ecm(),
            warnings: analysis.warnings(),
        };
        let path = dir.join("summary.json");
        write_json(&path, &summary)?;
        written.push(path);
    }

    for record in analysis.records() {
        if options.meshes {
            let path = dir.join(format!("cell{:04}.vtu", record.index + 1));
            write_mesh(record, &path)?;
            written.push(path);
        }
        if options.fea_package {
            if let Some(mapping) = &record.deformable {
                let package = FeaPackage {
                    nodes: record.mesh.nodes.iter().map(|p| [p.x, p.y, p.z]).collect(),
                    elements: &record.mesh.elements,
                    surfaces: &record.mesh.surface_nodes,
                    boundary_conditions: mapping.boundary.iter().map(|u| [u.x, u.y, u.z]).collect(),
                };
                let path = dir.join(format!("cellFEA{:02}.json", record.index));
                write_json(&path, &package)?;
                written.push(path);
            }
        }
    }

    info!(dir = %dir.display(), files = written.len(), "exported analysis");
    Ok(written)
}

fn write_mesh(record: &ObjectRecord, path: &Path) -> CellMechResult<()> {
    let components: Vec<Vec<f64>> = match &record.deformable {
        Some(mapping) => (0..STRAIN_FIELDS.len())
            .map(|c| mapping.nodal.strains.iter().map(|e| e.components()[c]).collect())
            .collect(),
        None => Vec::new(),
    };
    let mut fields = Vec::with_capacity(STRAIN_FIELDS.len() + 1);
    if let Some(mapping) = &record.deformable {
        fields.push(PointField::vector("Displacement", &mapping.nodal.displacements));
    }
    fields.extend(
        STRAIN_FIELDS
            .iter()
            .zip(&components)
            .map(|(name, values)| PointField::scalar(name, values)),
    );

    save_vtu(&record.mesh, &fields, path).map_err(|source| CellMechError::Export {
        path: path.to_path_buf(),
        source,
    })
}

fn write_json(path: &Path, value: &impl Serialize) -> CellMechResult<()> {
    let io_error = |source| CellMechError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = BufWriter::new(File::create(path).map_err(io_error)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush().map_err(io_error)
}
