//! Property-based tests for surface preparation.
//!
//! Run with: cargo test -p mesh-repair --test proptest_surface

#![allow(clippy::unwrap_used, clippy::expect_used)]

use mesh_repair::{clean_mesh, prepare_surface, validate_mesh, RepairParams};
use mesh_types::{icosphere, IndexedMesh, Vertex};
use proptest::prelude::*;

/// Random index soup over a fixed set of random vertices.
fn arb_soup() -> impl Strategy<Value = IndexedMesh> {
    (3_usize..30).prop_flat_map(|n| {
        let vertices = prop::collection::vec(prop::array::uniform3(-10.0..10.0_f64), n);
        #[allow(clippy::cast_possible_truncation)]
        let faces = prop::collection::vec(prop::array::uniform3(0..n as u32), 1..60);
        (vertices, faces).prop_map(|(v, f)| IndexedMesh {
            vertices: v.into_iter().map(Vertex::from).collect(),
            faces: f,
        })
    })
}

/// Sphere split into a soup with per-facet winding flags.
fn sphere_soup(flips: &[bool]) -> IndexedMesh {
    let sphere = icosphere(5.0, 1);
    let mut soup = IndexedMesh::new();
    for (t, &flip) in sphere.triangles().zip(flips.iter().cycle()) {
        #[allow(clippy::cast_possible_truncation)]
        let b = soup.vertices.len() as u32;
        soup.vertices.extend([Vertex::new(t.v0), Vertex::new(t.v1), Vertex::new(t.v2)]);
        soup.faces.push(if flip { [b, b + 2, b + 1] } else { [b, b + 1, b + 2] });
    }
    soup
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn cleaning_never_panics_and_keeps_indices_valid(mesh in arb_soup()) {
        let mut mesh = mesh;
        let _ = clean_mesh(&mut mesh, &RepairParams::default());
        let n = mesh.vertices.len();
        prop_assert!(mesh.faces.iter().flatten().all(|&v| (v as usize) < n));
        prop_assert!(mesh.faces.iter().all(|&[a, b, c]| a != b && b != c && a != c));
    }

    #[test]
    fn cleaning_is_idempotent(mesh in arb_soup()) {
        let mut once = mesh;
        let _ = clean_mesh(&mut once, &RepairParams::default());
        let mut twice = once.clone();
        let second = clean_mesh(&mut twice, &RepairParams::default());
        prop_assert_eq!(second.vertices_welded, 0);
        prop_assert_eq!(second.duplicate_faces_removed, 0);
        prop_assert_eq!(validate_mesh(&once), validate_mesh(&twice));
    }

    #[test]
    fn any_winding_scramble_is_repaired(flips in prop::collection::vec(any::<bool>(), 1..80)) {
        let soup = sphere_soup(&flips);
        let (surface, _) = prepare_surface(&soup, &RepairParams::default()).unwrap();
        let reference = icosphere(5.0, 1);
        prop_assert_eq!(surface.face_count(), reference.face_count());
        prop_assert!((surface.signed_volume() - reference.signed_volume()).abs() < 1e-9);
    }
}
