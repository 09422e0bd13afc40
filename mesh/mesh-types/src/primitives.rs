//! Closed primitive surfaces used as fixtures and for calibration.

use std::collections::HashMap;

use nalgebra::{Point3, Vector3};

use crate::{IndexedMesh, Vertex};

/// Create an axis-aligned unit cube from `(0,0,0)` to `(1,1,1)`.
///
/// # Example
///
/// ```
/// use mesh_types::unit_cube;
///
/// let cube = unit_cube();
/// assert_eq!(cube.vertex_count(), 8);
/// assert_eq!(cube.face_count(), 12);
/// ```
#[must_use]
pub fn unit_cube() -> IndexedMesh {
    let mut mesh = IndexedMesh::with_capacity(8, 12);
    for z in [0.0, 1.0] {
        mesh.vertices.push(Vertex::from_coords(0.0, 0.0, z));
        mesh.vertices.push(Vertex::from_coords(1.0, 0.0, z));
        mesh.vertices.push(Vertex::from_coords(1.0, 1.0, z));
        mesh.vertices.push(Vertex::from_coords(0.0, 1.0, z));
    }

    // CCW viewed from outside: -Z, +Z, -Y, +Y, -X, +X
    mesh.faces.extend_from_slice(&[
        [0, 2, 1],
        [0, 3, 2],
        [4, 5, 6],
        [4, 6, 7],
        [0, 1, 5],
        [0, 5, 4],
        [3, 7, 6],
        [3, 6, 2],
        [0, 4, 7],
        [0, 7, 3],
        [1, 2, 6],
        [1, 6, 5],
    ]);
    mesh
}

/// Create a geodesic sphere centred on the origin.
///
/// Starts from an icosahedron and splits every triangle into four
/// `subdivisions` times, projecting new vertices onto the sphere. Level 0
/// has 12 vertices; level `n` has `10 * 4^n + 2`.
///
/// # Example
///
/// ```
/// use mesh_types::icosphere;
///
/// let s = icosphere(2.0, 2);
/// assert_eq!(s.vertex_count(), 162);
/// assert!(s.signed_volume() > 0.0);
/// ```
#[must_use]
pub fn icosphere(radius: f64, subdivisions: u32) -> IndexedMesh {
    let phi = (1.0 + 5.0_f64.sqrt()) / 2.0;
    let mut points: Vec<Vector3<f64>> = [
        [-1.0, phi, 0.0],
        [1.0, phi, 0.0],
        [-1.0, -phi, 0.0],
        [1.0, -phi, 0.0],
        [0.0, -1.0, phi],
        [0.0, 1.0, phi],
        [0.0, -1.0, -phi],
        [0.0, 1.0, -phi],
        [phi, 0.0, -1.0],
        [phi, 0.0, 1.0],
        [-phi, 0.0, -1.0],
        [-phi, 0.0, 1.0],
    ]
    .iter()
    .map(|c| Vector3::new(c[0], c[1], c[2]).normalize())
    .collect();

    let mut faces: Vec<[u32; 3]> = vec![
        [0, 11, 5],
        [0, 5, 1],
        [0, 1, 7],
        [0, 7, 10],
        [0, 10, 11],
        [1, 5, 9],
        [5, 11, 4],
        [11, 10, 2],
        [10, 7, 6],
        [7, 1, 8],
        [3, 9, 4],
        [3, 4, 2],
        [3, 2, 6],
        [3, 6, 8],
        [3, 8, 9],
        [4, 9, 5],
        [2, 4, 11],
        [6, 2, 10],
        [8, 6, 7],
        [9, 8, 1],
    ];

    for _ in 0..subdivisions {
        let mut midpoints: HashMap<(u32, u32), u32> = HashMap::new();
        let mut midpoint = |a: u32, b: u32, points: &mut Vec<Vector3<f64>>| -> u32 {
            let key = (a.min(b), a.max(b));
            *midpoints.entry(key).or_insert_with(|| {
                let m = (points[a as usize] + points[b as usize]).normalize();
                points.push(m);
                #[allow(clippy::cast_possible_truncation)]
                let idx = (points.len() - 1) as u32;
                idx
            })
        };

        let mut next = Vec::with_capacity(faces.len() * 4);
        for [a, b, c] in faces {
            let ab = midpoint(a, b, &mut points);
            let bc = midpoint(b, c, &mut points);
            let ca = midpoint(c, a, &mut points);
            next.extend_from_slice(&[[a, ab, ca], [b, bc, ab], [c, ca, bc], [ab, bc, ca]]);
        }
        faces = next;
    }

    let vertices = points
        .into_iter()
        .map(|p| Vertex::new(Point3::from(p * radius)))
        .collect();
    outward(IndexedMesh::from_parts(vertices, faces))
}

/// Create a latitude/longitude ellipsoid centred on the origin.
///
/// `slices` is the number of meridian segments (at least 3) and `stacks` the
/// number of latitude bands (at least 2).
#[must_use]
pub fn uv_ellipsoid(radii: Vector3<f64>, slices: u32, stacks: u32) -> IndexedMesh {
    let slices = slices.max(3);
    let stacks = stacks.max(2);
    let mut mesh = IndexedMesh::new();

    mesh.vertices.push(Vertex::from_coords(0.0, 0.0, radii.z));
    for i in 1..stacks {
        let theta = std::f64::consts::PI * f64::from(i) / f64::from(stacks);
        for j in 0..slices {
            let phi = std::f64::consts::TAU * f64::from(j) / f64::from(slices);
            mesh.vertices.push(Vertex::from_coords(
                radii.x * theta.sin() * phi.cos(),
                radii.y * theta.sin() * phi.sin(),
                radii.z * theta.cos(),
            ));
        }
    }
    mesh.vertices.push(Vertex::from_coords(0.0, 0.0, -radii.z));

    let ring = |i: u32, j: u32| 1 + (i - 1) * slices + (j % slices);
    let south = 1 + (stacks - 1) * slices;
    for j in 0..slices {
        mesh.faces.push([0, ring(1, j), ring(1, j + 1)]);
        mesh.faces.push([south, ring(stacks - 1, j + 1), ring(stacks - 1, j)]);
    }
    for i in 1..stacks - 1 {
        for j in 0..slices {
            let (a, b) = (ring(i, j), ring(i, j + 1));
            let (c, d) = (ring(i + 1, j), ring(i + 1, j + 1));
            mesh.faces.push([a, c, d]);
            mesh.faces.push([a, d, b]);
        }
    }
    outward(mesh)
}

fn outward(mut mesh: IndexedMesh) -> IndexedMesh {
    if mesh.signed_volume() < 0.0 {
        mesh.flip_faces();
    }
    mesh
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    #[test]
    fn icosphere_counts() {
        for (level, verts) in [(0, 12), (1, 42), (2, 162), (3, 642)] {
            let s = icosphere(1.0, level);
            assert_eq!(s.vertex_count(), verts);
            assert_eq!(s.face_count(), 20 * 4_usize.pow(level));
        }
    }

    #[test]
    fn icosphere_vertices_on_sphere() {
        let s = icosphere(3.0, 2);
        for v in &s.vertices {
            assert_relative_eq!(v.position.coords.norm(), 3.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn icosphere_volume_approaches_sphere() {
        let s = icosphere(1.0, 4);
        let exact = 4.0 / 3.0 * PI;
        assert!(s.signed_volume() > 0.98 * exact);
        assert!(s.signed_volume() < exact);
    }

    #[test]
    fn ellipsoid_is_closed_and_outward() {
        let e = uv_ellipsoid(Vector3::new(3.0, 2.0, 1.0), 48, 24);
        let exact = 4.0 / 3.0 * PI * 6.0;
        assert!(e.signed_volume() > 0.95 * exact);
        assert!(e.signed_volume() < exact);
        assert_eq!(e.vertex_count(), 2 + 23 * 48);
    }
}
