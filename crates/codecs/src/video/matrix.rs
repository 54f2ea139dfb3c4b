// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Column-major 4x4 matrix helpers for the video renderer's view-projection transform.

use mediakit_core::Matrix4;

pub const IDENTITY: Matrix4 = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

/// Orthographic projection onto the given clip volume.
pub fn ortho(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Matrix4 {
    let r_width = 1.0 / (right - left);
    let r_height = 1.0 / (top - bottom);
    let r_depth = 1.0 / (far - near);

    let mut m = [0.0; 16];
    m[0] = 2.0 * r_width;
    m[5] = 2.0 * r_height;
    m[10] = -2.0 * r_depth;
    m[12] = -(right + left) * r_width;
    m[13] = -(top + bottom) * r_height;
    m[14] = -(far + near) * r_depth;
    m[15] = 1.0;
    m
}

type Vec3 = [f32; 3];

fn cross(a: Vec3, b: Vec3) -> Vec3 {
    [a[1] * b[2] - a[2] * b[1], a[2] * b[0] - a[0] * b[2], a[0] * b[1] - a[1] * b[0]]
}

fn normalize(v: Vec3) -> Vec3 {
    let length = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    if length <= f32::EPSILON {
        return v;
    }
    [v[0] / length, v[1] / length, v[2] / length]
}

/// View matrix for a camera at `eye` looking at `center` with the given `up` direction.
pub fn look_at(eye: Vec3, center: Vec3, up: Vec3) -> Matrix4 {
    let f = normalize([center[0] - eye[0], center[1] - eye[1], center[2] - eye[2]]);
    let s = normalize(cross(f, up));
    let u = cross(s, f);

    let mut m = [
        s[0], u[0], -f[0], 0.0, //
        s[1], u[1], -f[1], 0.0, //
        s[2], u[2], -f[2], 0.0, //
        0.0, 0.0, 0.0, 1.0,
    ];
    for i in 0..4 {
        m[12 + i] += m[i] * -eye[0] + m[4 + i] * -eye[1] + m[8 + i] * -eye[2];
    }
    m
}

/// `lhs * rhs`.
pub fn multiply(lhs: &Matrix4, rhs: &Matrix4) -> Matrix4 {
    let mut out = [0.0; 16];
    for column in 0..4 {
        for row in 0..4 {
            out[column * 4 + row] =
                (0..4).map(|k| lhs[k * 4 + row] * rhs[column * 4 + k]).sum();
        }
    }
    out
}

/// Camera up vector that undoes a frame rotation of `degrees`.
#[allow(clippy::cast_precision_loss)]
pub fn up_vector(degrees: i64) -> (f32, f32) {
    match degrees.rem_euclid(360) {
        0 => (0.0, 1.0),
        90 => (1.0, 0.0),
        180 => (0.0, -1.0),
        270 => (-1.0, 0.0),
        other => {
            let radians = (other as f32).to_radians();
            (radians.sin(), radians.cos())
        },
    }
}

/// View-projection matrix for a frame with the given rotation and aspect ratio.
pub fn vp_matrix(rotation_degrees: i64, aspect_ratio: f32) -> Matrix4 {
    let projection = ortho(-aspect_ratio, aspect_ratio, -1.0, 1.0, -1.0, 1.0);
    let (up_x, up_y) = up_vector(rotation_degrees);
    let view = look_at([0.0, 0.0, 1.0], [0.0, 0.0, 0.0], [up_x, up_y, 0.0]);
    multiply(&projection, &view)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: &Matrix4, expected: &Matrix4) {
        for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
            assert!((a - e).abs() < 1e-6, "element {i}: {a} != {e}");
        }
    }

    #[test]
    fn identity_is_neutral() {
        let m = ortho(-2.0, 2.0, -1.0, 1.0, -1.0, 1.0);
        assert_close(&multiply(&m, &IDENTITY), &m);
        assert_close(&multiply(&IDENTITY, &m), &m);
    }

    #[test]
    fn upright_frame_scales_by_aspect() {
        let m = vp_matrix(0, 2.0);
        let mut expected = [0.0; 16];
        expected[0] = 0.5;
        expected[5] = 1.0;
        expected[10] = -1.0;
        expected[14] = 1.0;
        expected[15] = 1.0;
        assert_close(&m, &expected);
    }

    #[test]
    fn quarter_turn_swaps_axes() {
        let m = vp_matrix(90, 1.0);
        let mut expected = [0.0; 16];
        expected[1] = 1.0;
        expected[4] = -1.0;
        expected[10] = -1.0;
        expected[14] = 1.0;
        expected[15] = 1.0;
        assert_close(&m, &expected);
    }

    #[test]
    fn odd_angles_use_trigonometry() {
        let (x, y) = up_vector(45);
        assert!((x - y).abs() < 1e-6);
        assert_eq!(up_vector(-90), up_vector(270));
        assert_eq!(up_vector(450), up_vector(90));
    }
}
