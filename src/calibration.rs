//! Extrinsic calibration: Euler angles and translation to a rigid transform.
//!
//! Rotation convention is `R = Rz(yaw) · Ry(pitch) · Rx(roll)` and points map
//! as `p_shared = R · p_local + t`. The same convention is used by
//! [`apply`] and by the point reconstructor.

use crate::types::{DeviceRecord, ExtrinsicParameter};

/// Build the extrinsic parameter for one device.
///
/// Angles are given in degrees and stored in radians. The rotation matrix is
/// computed even when `enabled` is false.
pub fn resolve(
    roll_deg: f64,
    pitch_deg: f64,
    yaw_deg: f64,
    x: f64,
    y: f64,
    z: f64,
    enabled: bool,
) -> ExtrinsicParameter {
    let euler = [
        roll_deg * std::f64::consts::PI / 180.0,
        pitch_deg * std::f64::consts::PI / 180.0,
        yaw_deg * std::f64::consts::PI / 180.0,
    ];
    ExtrinsicParameter {
        euler,
        translation: [x, y, z],
        rotation: euler_to_rotation(euler),
        enabled,
    }
}

/// Resolve calibration straight from a capture device record.
pub fn resolve_record(record: &DeviceRecord) -> ExtrinsicParameter {
    resolve(
        record.roll as f64,
        record.pitch as f64,
        record.yaw as f64,
        record.x as f64,
        record.y as f64,
        record.z as f64,
        record.extrinsic_enabled,
    )
}

/// Convert [roll, pitch, yaw] (radians) to a 3x3 row-major rotation matrix.
pub fn euler_to_rotation(euler: [f64; 3]) -> [[f64; 3]; 3] {
    let (sr, cr) = euler[0].sin_cos();
    let (sp, cp) = euler[1].sin_cos();
    let (sy, cy) = euler[2].sin_cos();
    [
        [cp * cy, sr * sp * cy - cr * sy, cr * sp * cy + sr * sy],
        [cp * sy, sr * sp * sy + cr * cy, cr * sp * sy - sr * cy],
        [-sp,     sr * cp,                cr * cp],
    ]
}

/// Map a sensor-local point (meters) into the shared frame.
#[inline]
pub fn apply(extrinsic: &ExtrinsicParameter, p: [f64; 3]) -> [f64; 3] {
    let r = &extrinsic.rotation;
    let t = &extrinsic.translation;
    [
        r[0][0] * p[0] + r[0][1] * p[1] + r[0][2] * p[2] + t[0],
        r[1][0] * p[0] + r[1][1] * p[1] + r[1][2] * p[2] + t[1],
        r[2][0] * p[0] + r[2][1] * p[1] + r[2][2] * p[2] + t[2],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: [f64; 3], b: [f64; 3]) {
        for i in 0..3 {
            assert!((a[i] - b[i]).abs() < 1e-9, "{:?} != {:?}", a, b);
        }
    }

    #[test]
    fn test_zero_angles_identity() {
        let ext = resolve(0.0, 0.0, 0.0, 0.0, 0.0, 0.0, true);
        assert_eq!(ext.rotation, ExtrinsicParameter::identity().rotation);
        assert_eq!(apply(&ext, [1.5, -2.0, 3.25]), [1.5, -2.0, 3.25]);
    }

    #[test]
    fn test_degrees_to_radians() {
        let ext = resolve(90.0, -45.0, 180.0, 0.0, 0.0, 0.0, false);
        assert!((ext.euler[0] - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
        assert!((ext.euler[1] + std::f64::consts::FRAC_PI_4).abs() < 1e-12);
        assert!((ext.euler[2] - std::f64::consts::PI).abs() < 1e-12);
        assert!(!ext.enabled);
    }

    #[test]
    fn test_yaw_rotates_about_z() {
        let ext = resolve(0.0, 0.0, 90.0, 0.0, 0.0, 0.0, true);
        assert_close(apply(&ext, [1.0, 0.0, 0.0]), [0.0, 1.0, 0.0]);
        assert_close(apply(&ext, [0.0, 0.0, 1.0]), [0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_pitch_rotates_about_y() {
        let ext = resolve(0.0, 90.0, 0.0, 0.0, 0.0, 0.0, true);
        assert_close(apply(&ext, [1.0, 0.0, 0.0]), [0.0, 0.0, -1.0]);
    }

    #[test]
    fn test_roll_rotates_about_x() {
        let ext = resolve(90.0, 0.0, 0.0, 0.0, 0.0, 0.0, true);
        assert_close(apply(&ext, [0.0, 1.0, 0.0]), [0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_translation_after_rotation() {
        let ext = resolve(0.0, 0.0, 90.0, 1.0, 2.0, 3.0, true);
        assert_close(apply(&ext, [1.0, 0.0, 0.0]), [1.0, 3.0, 3.0]);
    }

    #[test]
    fn test_rotation_is_orthonormal() {
        let r = euler_to_rotation([0.3, -1.1, 2.4]);
        for i in 0..3 {
            for j in 0..3 {
                let dot: f64 = (0..3).map(|k| r[i][k] * r[j][k]).sum();
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((dot - expected).abs() < 1e-12);
            }
        }
    }
}
