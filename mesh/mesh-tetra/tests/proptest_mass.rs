//! Property-based tests for mass properties of meshed surfaces.
//!
//! Run with: cargo test -p mesh-tetra --test proptest_mass

#![allow(clippy::unwrap_used, clippy::expect_used)]

use mesh_tetra::{mass_properties, tetrahedralize, InertiaModel, MassProperties, TetMeshParams};
use mesh_types::{uv_ellipsoid, IndexedMesh, Point3, Vector3};
use nalgebra::{Rotation3, Vector3 as Vec3};
use proptest::prelude::*;

fn surface(radii: [f64; 3]) -> IndexedMesh {
    uv_ellipsoid(Vector3::new(radii[0], radii[1], radii[2]), 16, 8)
}

fn props(surface: &IndexedMesh) -> MassProperties {
    let (mesh, _) = tetrahedralize(surface, &TetMeshParams::default()).unwrap();
    mass_properties(&mesh, InertiaModel::Exact).unwrap()
}

fn close(a: f64, b: f64, rel: f64) -> bool {
    (a - b).abs() <= rel * a.abs().max(b.abs())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn rigid_motion_preserves_volume_and_radii(
        radii in prop::array::uniform3(1.0..4.0_f64),
        angles in prop::array::uniform3(-3.0..3.0_f64),
        offset in prop::array::uniform3(-50.0..50.0_f64),
    ) {
        let reference = surface(radii);
        let rotation = Rotation3::from_euler_angles(angles[0], angles[1], angles[2]);
        let offset = Vec3::from(offset);
        let moved = reference.map_positions(|p| rotation * p + offset);

        let before = props(&reference);
        let after = props(&moved);
        prop_assert!(close(before.volume, after.volume, 1e-9));
        let expected: Point3<f64> = rotation * before.centroid + offset;
        prop_assert!((after.centroid - expected).norm() < 1e-6);
        for (a, b) in before.radii().iter().zip(after.radii()) {
            prop_assert!(close(*a, b, 1e-6));
        }
    }

    #[test]
    fn uniform_scale_scales_volume_and_radii(
        radii in prop::array::uniform3(1.0..4.0_f64),
        scale in 0.5..3.0_f64,
    ) {
        let reference = surface(radii);
        let mut scaled = reference.clone();
        scaled.scale(scale);

        let before = props(&reference);
        let after = props(&scaled);
        prop_assert!(close(after.volume, before.volume * scale.powi(3), 1e-9));
        for (a, b) in before.radii().iter().zip(after.radii()) {
            prop_assert!(close(a * scale, b, 1e-6));
        }
    }
}
