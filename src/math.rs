//! Projection and point-transform helpers.

use glam::{Mat4, Vec3, Vec4};

/// Half the width of the near clip plane.
pub const FRUSTUM_HALF_WIDTH: f32 = 0.25;
pub const NEAR_PLANE: f32 = 1.0;
pub const FAR_PLANE: f32 = 200.0;

/// Right-handed perspective frustum mapping depth to `0..=1`.
///
/// `left`, `right`, `bottom` and `top` are the extents of the near plane at
/// distance `near` in front of the eye (looking down -Z).
pub fn frustum(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Mat4 {
    let width = right - left;
    let height = top - bottom;
    let depth = near - far;

    Mat4::from_cols(
        Vec4::new(2.0 * near / width, 0.0, 0.0, 0.0),
        Vec4::new(0.0, 2.0 * near / height, 0.0, 0.0),
        Vec4::new(
            (right + left) / width,
            (top + bottom) / height,
            far / depth,
            -1.0,
        ),
        Vec4::new(0.0, 0.0, near * far / depth, 0.0),
    )
}

/// The scene projection for a viewport of `width` × `height`.
///
/// Fixed half-width with the half-height following the aspect ratio. Rebuilt
/// every frame from the current viewport.
pub fn projection_matrix(width: f32, height: f32) -> Mat4 {
    let w = FRUSTUM_HALF_WIDTH;
    let h = if width > 0.0 && height > 0.0 {
        w * height / width
    } else {
        w
    };
    frustum(-w, w, -h, h, NEAR_PLANE, FAR_PLANE)
}

/// Applies `matrix` to `point` with `w = 1`, returning xyz without dividing by w.
///
/// Only meaningful for affine matrices such as a view matrix.
pub fn transform_point(matrix: Mat4, point: Vec3) -> Vec3 {
    (matrix * point.extend(1.0)).truncate()
}

pub fn transpose(matrix: Mat4) -> Mat4 {
    matrix.transpose()
}
