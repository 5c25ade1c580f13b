//! Flat-shaded face geometry built from control points.
//!
//! Polyhedra in Hedrite are described by a handful of control points and a
//! flat list of point indices, three per triangular face. [`build_flat_faces`]
//! expands that description into per-corner arrays ready for upload:
//!
//! ```
//! use hedrite::{Vec3, build_flat_faces, polyhedra};
//!
//! let points = polyhedra::tetrahedron(Vec3::ZERO);
//! let faces = build_flat_faces(&points, &polyhedra::TETRAHEDRON_FACES).unwrap();
//!
//! // 4 faces × 3 corners
//! assert_eq!(faces.positions.len(), 12);
//! assert_eq!(faces.normals.len(), 12);
//! assert_eq!(faces.indices, (0..12).collect::<Vec<u32>>());
//! ```
//!
//! # Normals
//!
//! Every corner of a face stores the same face normal, so shading is faceted.
//! For corners `(a, b, c)` in the given winding order the normal is
//! `-((c - a) × (b - a))`. It is **not** normalized; the shader normalizes.
//! Collinear corners produce a zero normal, which is passed through as-is.

use glam::Vec3;

/// Errors that can occur when building or uploading geometry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GeometryError {
    /// The face order does not describe whole triangles.
    #[error("face order has {len} entries, which is not a multiple of 3")]
    IncompleteFace { len: usize },
    /// A face references a control point that does not exist.
    #[error("face order references point {index} but only {points} points were given")]
    PointOutOfRange { index: usize, points: usize },
    /// Per-corner positions and normals disagree in length.
    #[error("{positions} positions but {normals} normals")]
    LengthMismatch { positions: usize, normals: usize },
    /// An index refers past the end of the vertex data.
    #[error("index {index} is out of range for {vertices} vertices")]
    IndexOutOfRange { index: u32, vertices: usize },
    /// Nothing to draw.
    #[error("geometry has no indices")]
    Empty,
}

/// Per-corner geometry for a set of triangular faces.
///
/// `positions[i]` and `normals[i]` describe the same corner. `indices` is the
/// sequential draw order `0..positions.len()`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FaceGeometry {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub indices: Vec<u32>,
}

impl FaceGeometry {
    /// Number of triangular faces.
    pub fn face_count(&self) -> usize {
        self.positions.len() / 3
    }
}

/// Flat normal of the face `(a, b, c)`: `-((c - a) × (b - a))`, unnormalized.
pub fn face_normal(a: Vec3, b: Vec3, c: Vec3) -> Vec3 {
    let u = c - a;
    let v = b - a;
    -u.cross(v)
}

/// Expands control points and a face order into per-corner positions and normals.
///
/// `order` lists point indices, three per face, in winding order.
///
/// # Errors
///
/// - [`GeometryError::IncompleteFace`] if `order.len()` is not a multiple of 3
/// - [`GeometryError::PointOutOfRange`] if an entry of `order` is not a valid
///   index into `points`
pub fn build_flat_faces(points: &[Vec3], order: &[usize]) -> Result<FaceGeometry, GeometryError> {
    if order.len() % 3 != 0 {
        return Err(GeometryError::IncompleteFace { len: order.len() });
    }

    if let Some(&index) = order.iter().find(|&&i| i >= points.len()) {
        return Err(GeometryError::PointOutOfRange {
            index,
            points: points.len(),
        });
    }

    let mut geometry = FaceGeometry {
        positions: Vec::with_capacity(order.len()),
        normals: Vec::with_capacity(order.len()),
        indices: (0..order.len() as u32).collect(),
    };

    for face in order.chunks_exact(3) {
        let [a, b, c] = [points[face[0]], points[face[1]], points[face[2]]];
        let normal = face_normal(a, b, c).to_array();

        for corner in [a, b, c] {
            geometry.positions.push(corner.to_array());
            geometry.normals.push(normal);
        }
    }

    Ok(geometry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polyhedra::{TETRAHEDRON_FACES, tetrahedron};

    fn close(a: [f32; 3], b: [f32; 3]) -> bool {
        a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() < 1e-5)
    }

    #[test]
    fn tetrahedron_normals_match_hand_computed() {
        let k = std::f32::consts::FRAC_1_SQRT_2;
        let faces = build_flat_faces(&tetrahedron(Vec3::ZERO), &TETRAHEDRON_FACES).unwrap();

        // -(c - a) × (b - a) worked out per face
        let expected = [
            [0.0, -4.0 * k, 2.0],
            [0.0, 4.0 * k, 2.0],
            [-4.0 * k, 0.0, -2.0],
            [4.0 * k, 0.0, -2.0],
        ];

        for (face, normal) in expected.iter().enumerate() {
            for corner in 0..3 {
                let got = faces.normals[face * 3 + corner];
                assert!(close(got, *normal), "face {face} corner {corner}: {got:?}");
            }
        }
    }

    #[test]
    fn tetrahedron_normals_point_outward() {
        let points = tetrahedron(Vec3::ZERO);
        let faces = build_flat_faces(&points, &TETRAHEDRON_FACES).unwrap();

        for face in 0..faces.face_count() {
            let centroid = (0..3)
                .map(|c| Vec3::from_array(faces.positions[face * 3 + c]))
                .sum::<Vec3>()
                / 3.0;
            let normal = Vec3::from_array(faces.normals[face * 3]);
            assert!(normal.dot(centroid) > 0.0, "face {face} points inward");
        }
    }

    #[test]
    fn positions_are_replicated_control_points() {
        let points = tetrahedron(Vec3::ZERO);
        let faces = build_flat_faces(&points, &TETRAHEDRON_FACES).unwrap();

        assert_eq!(faces.positions.len(), TETRAHEDRON_FACES.len());
        for (corner, &point) in faces.positions.iter().zip(TETRAHEDRON_FACES.iter()) {
            assert_eq!(*corner, points[point].to_array());
        }
    }

    #[test]
    fn degenerate_face_passes_zero_normal_through() {
        let points = [Vec3::ZERO, Vec3::X, Vec3::X * 2.0];
        let faces = build_flat_faces(&points, &[0, 1, 2]).unwrap();
        assert_eq!(faces.normals, vec![[0.0, 0.0, 0.0]; 3]);
    }

    #[test]
    fn incomplete_face_is_rejected() {
        let points = tetrahedron(Vec3::ZERO);
        assert_eq!(
            build_flat_faces(&points, &[0, 1, 2, 3]),
            Err(GeometryError::IncompleteFace { len: 4 })
        );
    }

    #[test]
    fn out_of_range_point_is_rejected() {
        let points = tetrahedron(Vec3::ZERO);
        assert_eq!(
            build_flat_faces(&points, &[0, 1, 4]),
            Err(GeometryError::PointOutOfRange {
                index: 4,
                points: 4
            })
        );
    }
}
