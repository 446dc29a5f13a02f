use std::ops::Mul;

use glam::{DMat3, DQuat, DVec3};

/// Rotation group SO(3) backed by a unit quaternion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SO3 {
    /// Unit quaternion with non-negative scalar part.
    pub q: DQuat,
}

impl SO3 {
    /// The identity rotation.
    pub const IDENTITY: Self = Self { q: DQuat::IDENTITY };

    /// Build from a quaternion; the input is normalized and moved to the `w >= 0` hemisphere.
    pub fn from_quaternion(q: DQuat) -> Self {
        let q = q.normalize();
        Self {
            q: if q.w < 0.0 { -q } else { q },
        }
    }

    /// Build from a rotation matrix.
    pub fn from_matrix(mat: &DMat3) -> Self {
        Self::from_quaternion(DQuat::from_mat3(mat))
    }

    /// Rotation matrix of this element.
    pub fn matrix(&self) -> DMat3 {
        DMat3::from_quat(self.q)
    }

    /// Inverse rotation.
    pub fn inverse(&self) -> Self {
        Self {
            q: self.q.conjugate(),
        }
    }

    /// Lie algebra -> Lie group (Rodrigues).
    pub fn exp(v: DVec3) -> Self {
        Self::from_quaternion(DQuat::from_scaled_axis(v))
    }

    /// Lie group -> Lie algebra, with the angle in `[0, pi]`.
    pub fn log(&self) -> DVec3 {
        let xyz = DVec3::new(self.q.x, self.q.y, self.q.z);
        let sin_half = xyz.length();
        if sin_half < 1e-12 {
            // first order: q ~ (v/2, 1)
            return xyz * 2.0;
        }
        let theta = 2.0 * sin_half.atan2(self.q.w);
        xyz * (theta / sin_half)
    }

    /// Rotation angle in radians, in `[0, pi]`.
    pub fn angle(&self) -> f64 {
        let xyz = DVec3::new(self.q.x, self.q.y, self.q.z);
        2.0 * xyz.length().atan2(self.q.w.abs())
    }

    /// Vector space -> Lie algebra.
    pub fn hat(v: DVec3) -> DMat3 {
        DMat3::from_cols(
            DVec3::new(0.0, v.z, -v.y),
            DVec3::new(-v.z, 0.0, v.x),
            DVec3::new(v.y, -v.x, 0.0),
        )
    }

    /// Lie algebra -> vector space.
    pub fn vee(omega: &DMat3) -> DVec3 {
        DVec3::new(omega.y_axis.z, omega.z_axis.x, omega.x_axis.y)
    }
}

impl Default for SO3 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mul for SO3 {
    type Output = SO3;

    fn mul(self, rhs: Self) -> Self::Output {
        SO3::from_quaternion(self.q * rhs.q)
    }
}

/// Angle in radians of the relative rotation `a^T * b`.
///
/// Uses the `atan2` form so that nearly identical rotations report an angle
/// close to zero instead of the `acos` round-off floor. The inputs do not need
/// to be perfectly orthogonal.
pub fn relative_angle(a: &DMat3, b: &DMat3) -> f64 {
    let rel = a.transpose() * *b;
    let trace = rel.x_axis.x + rel.y_axis.y + rel.z_axis.z;
    let skew = DVec3::new(
        rel.y_axis.z - rel.z_axis.y,
        rel.z_axis.x - rel.x_axis.z,
        rel.x_axis.y - rel.y_axis.x,
    );
    (0.5 * skew.length()).atan2(0.5 * (trace - 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_identity() {
        let s = SO3::IDENTITY;
        assert_eq!(s.q, DQuat::from_xyzw(0.0, 0.0, 0.0, 1.0));
        assert_eq!(s.log(), DVec3::ZERO);
    }

    #[test]
    fn test_exp_log() {
        for v in [
            DVec3::new(1.0, 0.0, 0.0),
            DVec3::new(0.1, -0.2, 0.3),
            DVec3::new(0.0, 3.0, 0.0),
            DVec3::new(1e-9, 0.0, -1e-9),
        ] {
            let log = SO3::exp(v).log();
            assert_relative_eq!(log.x, v.x, epsilon = 1e-9);
            assert_relative_eq!(log.y, v.y, epsilon = 1e-9);
            assert_relative_eq!(log.z, v.z, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_matrix_roundtrip() {
        let s = SO3::exp(DVec3::new(0.4, -0.3, 1.2));
        let back = SO3::from_matrix(&s.matrix());
        assert_relative_eq!((s.inverse() * back).angle(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_hat_vee() {
        let v = DVec3::new(1.0, 2.0, 3.0);
        let hat_v = SO3::hat(v);
        assert_eq!(hat_v.x_axis.y, 3.0);
        assert_eq!(hat_v.x_axis.z, -2.0);
        assert_eq!(hat_v.y_axis.x, -3.0);
        assert_eq!(hat_v.y_axis.z, 1.0);
        assert_eq!(hat_v.z_axis.x, 2.0);
        assert_eq!(hat_v.z_axis.y, -1.0);
        assert_eq!(SO3::vee(&hat_v), v);
        // hat(v) * w == v x w
        let w = DVec3::new(-0.5, 0.25, 2.0);
        let lhs = hat_v * w;
        let rhs = v.cross(w);
        assert_relative_eq!(lhs.x, rhs.x, epsilon = 1e-12);
        assert_relative_eq!(lhs.y, rhs.y, epsilon = 1e-12);
        assert_relative_eq!(lhs.z, rhs.z, epsilon = 1e-12);
    }

    #[test]
    fn test_relative_angle() {
        let a = SO3::exp(DVec3::new(0.2, 0.1, -0.3)).matrix();
        let b = (SO3::from_matrix(&a) * SO3::exp(DVec3::new(0.0, 0.0, 0.5))).matrix();
        assert_relative_eq!(relative_angle(&a, &b), 0.5, epsilon = 1e-9);
        assert_relative_eq!(relative_angle(&a, &a), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_angle_near_pi() {
        let s = SO3::exp(DVec3::new(0.0, 0.0, std::f64::consts::PI - 1e-6));
        assert_relative_eq!(s.angle(), std::f64::consts::PI - 1e-6, epsilon = 1e-9);
    }
}
