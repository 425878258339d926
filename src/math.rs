//! Conversions between the headset runtime's matrix layout and `glam`.
//!
//! OpenVR hands out row-major matrices: rigid transforms come as 3x4 with an
//! implicit `[0, 0, 0, 1]` final row, projections as full 4x4. `glam::Mat4`
//! is column-major and is applied as `M * v` to column vectors, so both
//! conversions place runtime element `m[row][col]` at (row, col) of the host
//! matrix. No numeric transformation happens here.

use glam::{Mat4, Vec4};

/// Converts a row-major 3x4 rigid transform into a `Mat4`.
pub fn mat4_from_steam34(m: &[[f32; 4]; 3]) -> Mat4 {
    Mat4::from_cols(
        Vec4::new(m[0][0], m[1][0], m[2][0], 0.0),
        Vec4::new(m[0][1], m[1][1], m[2][1], 0.0),
        Vec4::new(m[0][2], m[1][2], m[2][2], 0.0),
        Vec4::new(m[0][3], m[1][3], m[2][3], 1.0),
    )
}

/// Converts a row-major 4x4 matrix (projection) into a `Mat4`.
pub fn mat4_from_steam44(m: &[[f32; 4]; 4]) -> Mat4 {
    Mat4::from_cols(
        Vec4::new(m[0][0], m[1][0], m[2][0], m[3][0]),
        Vec4::new(m[0][1], m[1][1], m[2][1], m[3][1]),
        Vec4::new(m[0][2], m[1][2], m[2][2], m[3][2]),
        Vec4::new(m[0][3], m[1][3], m[2][3], m[3][3]),
    )
}

/// Row-major identity in the runtime's 3x4 layout.
pub const fn steam34_identity() -> [[f32; 4]; 3] {
    [
        [1.0, 0.0, 0.0, 0.0],
        [0.0, 1.0, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
    ]
}

/// Row-major 3x4 rigid transform with identity rotation and the given
/// translation.
pub const fn steam34_translation(x: f32, y: f32, z: f32) -> [[f32; 4]; 3] {
    [
        [1.0, 0.0, 0.0, x],
        [0.0, 1.0, 0.0, y],
        [0.0, 0.0, 1.0, z],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_bridges_to_identity() {
        assert_eq!(mat4_from_steam34(&steam34_identity()), Mat4::IDENTITY);
    }

    #[test]
    fn translation_column_is_preserved() {
        let m = mat4_from_steam34(&steam34_translation(1.5, -2.0, 3.25));
        assert_eq!(m.w_axis, Vec4::new(1.5, -2.0, 3.25, 1.0));
        // Rotation block untouched.
        assert_eq!(m.x_axis, Vec4::X);
        assert_eq!(m.y_axis, Vec4::Y);
        assert_eq!(m.z_axis, Vec4::Z);
    }

    #[test]
    fn rotation_block_is_copied_element_for_element() {
        // 90 degree rotation about Y plus a translation, in row-major order.
        let raw = [
            [0.0, 0.0, 1.0, 4.0],
            [0.0, 1.0, 0.0, 5.0],
            [-1.0, 0.0, 0.0, 6.0],
        ];
        let m = mat4_from_steam34(&raw);
        for row in 0..3 {
            for col in 0..3 {
                assert_eq!(m.col(col).to_array()[row], raw[row][col]);
            }
        }
        assert_eq!(m.w_axis, Vec4::new(4.0, 5.0, 6.0, 1.0));
    }

    #[test]
    fn projection_bridges_full_four_rows() {
        let raw = [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, -1.0, -0.2],
            [0.0, 0.0, -1.0, 0.0],
        ];
        let m = mat4_from_steam44(&raw);
        assert_eq!(m.col(2).to_array(), [0.0, 0.0, -1.0, -1.0]);
        assert_eq!(m.col(3).to_array(), [0.0, 0.0, -0.2, 0.0]);
    }
}
