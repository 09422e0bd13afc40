//! Consistent, outward-facing winding for closed surfaces.

use std::collections::VecDeque;

use mesh_types::IndexedMesh;

use crate::adjacency::{face_edges, MeshAdjacency};
use crate::error::{RepairError, RepairResult};

/// Group faces into edge-connected components.
#[must_use]
pub fn face_components(faces: &[[u32; 3]], adjacency: &MeshAdjacency) -> Vec<Vec<usize>> {
    let mut component_of = vec![usize::MAX; faces.len()];
    let mut components = Vec::new();

    for seed in 0..faces.len() {
        if component_of[seed] != usize::MAX {
            continue;
        }
        let id = components.len();
        let mut members = vec![seed];
        component_of[seed] = id;
        let mut queue = VecDeque::from([seed]);
        while let Some(face) = queue.pop_front() {
            for next in adjacency.face_neighbors(faces, face) {
                if component_of[next] == usize::MAX {
                    component_of[next] = id;
                    members.push(next);
                    queue.push_back(next);
                }
            }
        }
        components.push(members);
    }
    components
}

/// Make neighbouring faces agree on winding, then turn every closed
/// component outward (positive enclosed volume).
///
/// Assumes a manifold surface. Returns the number of faces flipped.
///
/// # Errors
///
/// Returns [`RepairError::NonOrientable`] if some component cannot be
/// consistently oriented.
///
/// # Example
///
/// ```
/// use mesh_types::unit_cube;
/// use mesh_repair::fix_winding;
///
/// let mut cube = unit_cube();
/// cube.faces[3].swap(1, 2);
/// assert_eq!(fix_winding(&mut cube).ok(), Some(1));
/// assert!((cube.signed_volume() - 1.0).abs() < 1e-12);
/// ```
pub fn fix_winding(mesh: &mut IndexedMesh) -> RepairResult<usize> {
    let original = mesh.faces.clone();
    let adjacency = MeshAdjacency::build(&mesh.faces);
    let components = face_components(&mesh.faces, &adjacency);
    let mut visited = vec![false; mesh.faces.len()];

    for members in &components {
        let seed = members[0];
        visited[seed] = true;
        let mut queue = VecDeque::from([seed]);

        while let Some(face) = queue.pop_front() {
            for (a, b) in face_edges(mesh.faces[face]) {
                let Some(neighbors) = adjacency.faces_for_edge(a, b) else {
                    continue;
                };
                for &next in neighbors {
                    if next == face {
                        continue;
                    }
                    // A consistent neighbour traverses the shared edge as b -> a.
                    let agrees = !face_edges(mesh.faces[next]).contains(&(a, b));
                    if visited[next] {
                        if !agrees {
                            return Err(RepairError::NonOrientable);
                        }
                        continue;
                    }
                    if !agrees {
                        mesh.faces[next].swap(1, 2);
                    }
                    visited[next] = true;
                    queue.push_back(next);
                }
            }
        }

        let volume: f64 = members
            .iter()
            .filter_map(|&f| mesh.triangle(f))
            .map(|t| t.v0.coords.dot(&t.v1.coords.cross(&t.v2.coords)))
            .sum();
        if volume < 0.0 {
            for &f in members {
                mesh.faces[f].swap(1, 2);
            }
        }
    }

    Ok(mesh
        .faces
        .iter()
        .zip(&original)
        .filter(|(now, before)| now != before)
        .count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_types::{icosphere, unit_cube};

    #[test]
    fn consistent_cube_untouched() {
        let mut cube = unit_cube();
        assert_eq!(fix_winding(&mut cube).ok(), Some(0));
        assert_eq!(cube, unit_cube());
    }

    #[test]
    fn inside_out_sphere_is_turned_outward() {
        let mut sphere = icosphere(1.0, 1);
        sphere.flip_faces();
        assert!(sphere.signed_volume() < 0.0);
        assert!(fix_winding(&mut sphere).is_ok());
        assert!(sphere.signed_volume() > 0.0);
    }

    #[test]
    fn two_shells_are_separate_components() {
        let mut two = unit_cube();
        let mut other = unit_cube();
        other.translate(mesh_types::Vector3::new(5.0, 0.0, 0.0));
        other.flip_faces();
        #[allow(clippy::cast_possible_truncation)]
        let offset = two.vertices.len() as u32;
        two.vertices.extend(other.vertices);
        two.faces.extend(other.faces.iter().map(|f| f.map(|v| v + offset)));

        let adjacency = MeshAdjacency::build(&two.faces);
        assert_eq!(face_components(&two.faces, &adjacency).len(), 2);
        assert!(fix_winding(&mut two).is_ok());
        assert!((two.signed_volume() - 2.0).abs() < 1e-9);
    }
}
