//! Pairing and loading of reference and deformed object surfaces.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use mesh_io::{load_mesh, MeshFormat};
use mesh_repair::{prepare_surface, RepairParams};
use mesh_types::IndexedMesh;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{CellMechError, CellMechResult, SurfaceError};

/// Which of the two configurations a surface belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    /// Undeformed configuration.
    Reference,
    /// Deformed configuration.
    Deformed,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Reference => "reference",
            Self::Deformed => "deformed",
        })
    }
}

/// The two surfaces of one object.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfacePair {
    /// Object name, the shared file stem.
    pub name: String,
    /// Surface in the reference configuration.
    pub reference: IndexedMesh,
    /// Surface in the deformed configuration.
    pub deformed: IndexedMesh,
}

impl SurfacePair {
    /// Pairs two in-memory surfaces.
    #[must_use]
    pub fn new(name: impl Into<String>, reference: IndexedMesh, deformed: IndexedMesh) -> Self {
        Self {
            name: name.into(),
            reference,
            deformed,
        }
    }

    /// The surface for `state`.
    #[must_use]
    pub const fn surface(&self, state: State) -> &IndexedMesh {
        match state {
            State::Reference => &self.reference,
            State::Deformed => &self.deformed,
        }
    }
}

#[derive(Debug, Clone)]
struct PairedFiles {
    name: String,
    reference: PathBuf,
    deformed: PathBuf,
}

#[derive(Debug, Clone)]
enum Source {
    Files(Vec<PairedFiles>),
    Memory(Vec<SurfacePair>),
}

/// Object surfaces matched by name across the two configurations.
///
/// Objects are ordered by name. Pairing is checked when the store is
/// created, before any surface is parsed.
#[derive(Debug, Clone)]
pub struct SurfaceStore {
    source: Source,
    repair: RepairParams,
}

impl SurfaceStore {
    /// Pairs the `.stl` and `.obj` files of two directories by file stem.
    ///
    /// # Errors
    ///
    /// - [`CellMechError::NoObjects`] if neither directory has surface files
    /// - [`CellMechError::Pairing`] if the name sets differ
    /// - [`CellMechError::DuplicateObject`] if a stem appears twice in one
    ///   directory
    /// - [`CellMechError::Io`] if a directory cannot be listed
    pub fn open(
        reference_dir: impl AsRef<Path>,
        deformed_dir: impl AsRef<Path>,
    ) -> CellMechResult<Self> {
        let reference = list_surfaces(reference_dir.as_ref())?;
        let mut deformed = list_surfaces(deformed_dir.as_ref())?;
        if reference.is_empty() && deformed.is_empty() {
            return Err(CellMechError::NoObjects);
        }

        let only_in_reference: Vec<String> = reference
            .keys()
            .filter(|name| !deformed.contains_key(*name))
            .cloned()
            .collect();
        let only_in_deformed: Vec<String> = deformed
            .keys()
            .filter(|name| !reference.contains_key(*name))
            .cloned()
            .collect();
        if !only_in_reference.is_empty() || !only_in_deformed.is_empty() {
            return Err(CellMechError::Pairing {
                only_in_reference,
                only_in_deformed,
            });
        }

        let files: Vec<PairedFiles> = reference
            .into_iter()
            .filter_map(|(name, reference)| {
                let deformed = deformed.remove(&name)?;
                Some(PairedFiles {
                    name,
                    reference,
                    deformed,
                })
            })
            .collect();
        info!(objects = files.len(), "paired object surfaces");
        Ok(Self {
            source: Source::Files(files),
            repair: RepairParams::default(),
        })
    }

    /// Wraps surfaces already in memory, sorted by name.
    ///
    /// # Errors
    ///
    /// [`CellMechError::NoObjects`] if `pairs` is empty and
    /// [`CellMechError::DuplicateObject`] if two pairs share a name.
    pub fn from_pairs(mut pairs: Vec<SurfacePair>) -> CellMechResult<Self> {
        if pairs.is_empty() {
            return Err(CellMechError::NoObjects);
        }
        pairs.sort_by(|a, b| a.name.cmp(&b.name));
        if let Some(w) = pairs.windows(2).find(|w| w[0].name == w[1].name) {
            return Err(CellMechError::DuplicateObject {
                name: w[0].name.clone(),
                dir: PathBuf::new(),
            });
        }
        Ok(Self {
            source: Source::Memory(pairs),
            repair: RepairParams::default(),
        })
    }

    /// Replaces the surface cleanup parameters.
    #[must_use]
    pub fn with_repair_params(mut self, params: RepairParams) -> Self {
        self.repair = params;
        self
    }

    /// Object names in analysis order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        match &self.source {
            Source::Files(files) => files.iter().map(|f| f.name.as_str()).collect(),
            Source::Memory(pairs) => pairs.iter().map(|p| p.name.as_str()).collect(),
        }
    }

    /// Number of objects.
    #[must_use]
    pub fn len(&self) -> usize {
        match &self.source {
            Source::Files(files) => files.len(),
            Source::Memory(pairs) => pairs.len(),
        }
    }

    /// True if the store holds no objects.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads every surface and turns it into a closed, outward-oriented
    /// triangle mesh, one result per object in name order.
    ///
    /// Polygon faces are fan-triangulated on load, coincident vertices of
    /// STL facets are welded, and degenerate or duplicate faces dropped.
    /// An object whose surface cannot be read, or is not a closed,
    /// orientable 2-manifold, gets a [`CellMechError::Surface`] in its slot;
    /// the others still load.
    #[must_use]
    pub fn load(&self) -> Vec<CellMechResult<SurfacePair>> {
        match &self.source {
            Source::Files(files) => files
                .par_iter()
                .map(|f| {
                    Ok(SurfacePair {
                        name: f.name.clone(),
                        reference: self.read(&f.name, State::Reference, &f.reference)?,
                        deformed: self.read(&f.name, State::Deformed, &f.deformed)?,
                    })
                })
                .collect(),
            Source::Memory(pairs) => pairs
                .par_iter()
                .map(|p| {
                    Ok(SurfacePair {
                        name: p.name.clone(),
                        reference: self.prepare(&p.name, State::Reference, &p.reference)?,
                        deformed: self.prepare(&p.name, State::Deformed, &p.deformed)?,
                    })
                })
                .collect(),
        }
    }

    fn read(&self, name: &str, state: State, path: &Path) -> CellMechResult<IndexedMesh> {
        let raw = load_mesh(path).map_err(|e| surface_error(name, state, e))?;
        debug!(name, %state, path = %path.display(), faces = raw.face_count(), "read surface");
        self.prepare(name, state, &raw)
    }

    fn prepare(&self, name: &str, state: State, raw: &IndexedMesh) -> CellMechResult<IndexedMesh> {
        prepare_surface(raw, &self.repair)
            .map(|(surface, _)| surface)
            .map_err(|e| surface_error(name, state, e))
    }
}

fn surface_error(name: &str, state: State, source: impl Into<SurfaceError>) -> CellMechError {
    CellMechError::Surface {
        name: name.to_string(),
        state,
        source: source.into(),
    }
}

/// Surface files of `dir` keyed by stem.
fn list_surfaces(dir: &Path) -> CellMechResult<BTreeMap<String, PathBuf>> {
    let io_error = |source| CellMechError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut found = BTreeMap::new();
    for entry in std::fs::read_dir(dir).map_err(io_error)? {
        let path = entry.map_err(io_error)?.path();
        if !path.is_file() || MeshFormat::from_path(&path).is_none() {
            continue;
        }
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let name = name.to_string();
        if found.contains_key(&name) {
            return Err(CellMechError::DuplicateObject {
                name,
                dir: dir.to_path_buf(),
            });
        }
        found.insert(name, path);
    }
    Ok(found)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use mesh_io::{save_obj, save_stl};
    use mesh_types::{icosphere, unit_cube};
    use tempfile::tempdir;

    fn dirs() -> (tempfile::TempDir, PathBuf, PathBuf) {
        let root = tempdir().unwrap();
        let reference = root.path().join("ref");
        let deformed = root.path().join("def");
        std::fs::create_dir(&reference).unwrap();
        std::fs::create_dir(&deformed).unwrap();
        (root, reference, deformed)
    }

    fn loaded(store: &SurfaceStore) -> Vec<SurfacePair> {
        store.load().into_iter().collect::<CellMechResult<_>>().unwrap()
    }

    #[test]
    fn pairs_by_stem_in_name_order() {
        let (_root, reference, deformed) = dirs();
        let sphere = icosphere(1.0, 1);
        for dir in [&reference, &deformed] {
            save_stl(&sphere, dir.join("cellB.stl"), true).unwrap();
            save_stl(&sphere, dir.join("cellA.STL"), false).unwrap();
            std::fs::write(dir.join("notes.txt"), "ignored").unwrap();
        }
        let store = SurfaceStore::open(&reference, &deformed).unwrap();
        assert_eq!(store.names(), vec!["cellA", "cellB"]);

        let pairs = loaded(&store);
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].name, "cellA");
        // STL facets are welded back into a closed surface.
        assert_eq!(pairs[0].reference.vertex_count(), sphere.vertex_count());
        assert!(pairs[1].deformed.signed_volume() > 0.0);
    }

    #[test]
    fn mixed_formats_pair_up() {
        let (_root, reference, deformed) = dirs();
        save_obj(&unit_cube(), reference.join("cube.obj")).unwrap();
        save_stl(&unit_cube(), deformed.join("cube.stl"), true).unwrap();
        let pairs = loaded(&SurfaceStore::open(&reference, &deformed).unwrap());
        assert!((pairs[0].reference.volume() - 1.0).abs() < 1e-9);
        assert!((pairs[0].deformed.volume() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn mismatch_is_reported_before_loading() {
        let (_root, reference, deformed) = dirs();
        // Unparseable content: pairing must fail before anything is read.
        std::fs::write(reference.join("A.stl"), "garbage").unwrap();
        std::fs::write(reference.join("B.stl"), "garbage").unwrap();
        std::fs::write(deformed.join("A.stl"), "garbage").unwrap();
        match SurfaceStore::open(&reference, &deformed) {
            Err(CellMechError::Pairing {
                only_in_reference,
                only_in_deformed,
            }) => {
                assert_eq!(only_in_reference, vec!["B".to_string()]);
                assert!(only_in_deformed.is_empty());
            }
            other => panic!("expected pairing error, got {other:?}"),
        }
    }

    #[test]
    fn empty_directories_have_no_objects() {
        let (_root, reference, deformed) = dirs();
        assert!(matches!(
            SurfaceStore::open(&reference, &deformed),
            Err(CellMechError::NoObjects)
        ));
        assert!(matches!(
            SurfaceStore::open(reference.join("missing"), &deformed),
            Err(CellMechError::Io { .. })
        ));
    }

    #[test]
    fn duplicate_stems_are_rejected() {
        let (_root, reference, deformed) = dirs();
        save_stl(&unit_cube(), reference.join("a.stl"), true).unwrap();
        save_obj(&unit_cube(), reference.join("a.obj")).unwrap();
        save_stl(&unit_cube(), deformed.join("a.stl"), true).unwrap();
        assert!(matches!(
            SurfaceStore::open(&reference, &deformed),
            Err(CellMechError::DuplicateObject { .. })
        ));
    }

    #[test]
    fn open_surface_fails_only_its_slot() {
        let mut open = icosphere(1.0, 1);
        open.faces.pop();
        let store = SurfaceStore::from_pairs(vec![
            SurfacePair::new("x", icosphere(1.0, 1), open),
            SurfacePair::new("y", unit_cube(), unit_cube()),
        ])
        .unwrap();
        let slots = store.load();
        assert_eq!(slots.len(), 2);
        assert!(matches!(
            &slots[0],
            Err(CellMechError::Surface {
                name,
                state: State::Deformed,
                ..
            }) if name == "x"
        ));
        assert_eq!(slots[1].as_ref().map(|p| p.name.as_str()).ok(), Some("y"));
    }

    #[test]
    fn unreadable_file_fails_only_its_slot() {
        let (_root, reference, deformed) = dirs();
        for dir in [&reference, &deformed] {
            save_stl(&unit_cube(), dir.join("a.stl"), true).unwrap();
        }
        std::fs::write(reference.join("b.stl"), "solid b\nnot a facet\n").unwrap();
        save_stl(&unit_cube(), deformed.join("b.stl"), true).unwrap();

        let slots = SurfaceStore::open(&reference, &deformed).unwrap().load();
        assert!(slots[0].is_ok());
        assert!(matches!(
            slots[1],
            Err(CellMechError::Surface {
                state: State::Reference,
                ..
            })
        ));
    }

    #[test]
    fn in_memory_pairs_are_sorted() {
        let store = SurfaceStore::from_pairs(vec![
            SurfacePair::new("b", unit_cube(), unit_cube()),
            SurfacePair::new("a", unit_cube(), unit_cube()),
        ])
        .unwrap();
        assert_eq!(store.names(), vec!["a", "b"]);
        assert!(SurfaceStore::from_pairs(Vec::new()).is_err());
    }
}
