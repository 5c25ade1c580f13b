//! Control points and face orders for the bundled polyhedra.

use glam::Vec3;

/// Face order for [`tetrahedron`] points, counter-clockwise seen from outside.
pub const TETRAHEDRON_FACES: [usize; 12] = [
    0, 1, 2, //
    0, 3, 1, //
    1, 3, 2, //
    2, 3, 0,
];

/// Regular tetrahedron with edge length 2, centred on `offset`.
pub fn tetrahedron(offset: Vec3) -> [Vec3; 4] {
    let k = std::f32::consts::FRAC_1_SQRT_2;
    [
        Vec3::new(1.0, 0.0, k) + offset,
        Vec3::new(-1.0, 0.0, k) + offset,
        Vec3::new(0.0, -1.0, -k) + offset,
        Vec3::new(0.0, 1.0, -k) + offset,
    ]
}
