use std::ops::Mul;

use glam::{DMat3, DVec3};
use serde::{Deserialize, Serialize};

use crate::so3::SO3;

/// Rigid transform mapping object-frame points into the camera frame.
///
/// `p_camera = rotation * p_object + translation`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// Rotation object -> camera.
    pub rotation: DMat3,
    /// Translation object -> camera, in object template units.
    pub translation: DVec3,
}

impl Pose {
    /// The identity transform.
    pub const IDENTITY: Self = Self {
        rotation: DMat3::IDENTITY,
        translation: DVec3::ZERO,
    };

    /// Create a pose from a rotation matrix and a translation.
    pub fn new(rotation: DMat3, translation: DVec3) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// Create a pose from an axis-angle rotation and a translation.
    pub fn from_rvec(rvec: DVec3, translation: DVec3) -> Self {
        Self::new(SO3::exp(rvec).matrix(), translation)
    }

    /// Create a pose from a row-major rotation and a translation array.
    pub fn from_arrays(rotation: &[[f64; 3]; 3], translation: &[f64; 3]) -> Self {
        Self::new(
            DMat3::from_cols_array_2d(rotation).transpose(),
            DVec3::from_array(*translation),
        )
    }

    /// Row-major rotation matrix.
    pub fn rotation_rows(&self) -> [[f64; 3]; 3] {
        self.rotation.transpose().to_cols_array_2d()
    }

    /// Axis-angle (Rodrigues) vector of the rotation.
    pub fn rvec(&self) -> DVec3 {
        SO3::from_matrix(&self.rotation).log()
    }

    /// Apply the transform to a single point.
    #[inline]
    pub fn transform_point(&self, p: DVec3) -> DVec3 {
        self.rotation * p + self.translation
    }

    /// Inverse transform (camera -> object).
    pub fn inverse(&self) -> Self {
        let r_t = self.rotation.transpose();
        Self::new(r_t, -(r_t * self.translation))
    }

    /// Check that the rotation is orthonormal with determinant `+1` within `tol`.
    pub fn is_proper_rotation(&self, tol: f64) -> bool {
        let rrt = self.rotation * self.rotation.transpose();
        let identity_err = (rrt - DMat3::IDENTITY)
            .to_cols_array()
            .iter()
            .fold(0.0f64, |acc, v| acc.max(v.abs()));
        identity_err < tol && (self.rotation.determinant() - 1.0).abs() < tol
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mul for Pose {
    type Output = Pose;

    /// Composition: `(a * b)(p) == a(b(p))`.
    fn mul(self, rhs: Self) -> Self::Output {
        Pose::new(
            self.rotation * rhs.rotation,
            self.rotation * rhs.translation + self.translation,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_inverse_roundtrip() {
        let pose = Pose::from_rvec(DVec3::new(0.3, -0.2, 0.9), DVec3::new(10.0, -5.0, 600.0));
        let p = DVec3::new(12.0, 40.0, -7.5);
        let back = pose.inverse().transform_point(pose.transform_point(p));
        assert_relative_eq!(back.x, p.x, epsilon = 1e-9);
        assert_relative_eq!(back.y, p.y, epsilon = 1e-9);
        assert_relative_eq!(back.z, p.z, epsilon = 1e-9);

        let ident = pose * pose.inverse();
        assert!(ident.is_proper_rotation(1e-12));
        assert_relative_eq!(ident.translation.length(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_arrays_are_row_major() {
        let rows = [[0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]];
        let pose = Pose::from_arrays(&rows, &[1.0, 2.0, 3.0]);
        // 90 degrees about z maps x to y
        let p = pose.transform_point(DVec3::X);
        assert_relative_eq!(p.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(p.y, 3.0, epsilon = 1e-12);
        assert_relative_eq!(p.z, 3.0, epsilon = 1e-12);
        assert_eq!(pose.rotation_rows(), rows);
    }

    #[test]
    fn test_proper_rotation_rejects_reflection() {
        let mut pose = Pose::IDENTITY;
        assert!(pose.is_proper_rotation(1e-12));
        pose.rotation.z_axis.z = -1.0;
        assert!(!pose.is_proper_rotation(1e-6));
    }
}
