//! Direct Linear Transform for non-planar point sets.

use contourpose_geometry::linalg::{orthogonalize_rotation, principal_axes};
use contourpose_geometry::{CameraIntrinsics, Pose};
use glam::{DMat3, DVec2, DVec3};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::ops::{check_inputs, in_front, normalize_image, normalize_world, null_space, score_pose};
use crate::pnp::{PnPError, PnPResult, PnPSolver};

/// Marker type representing the DLT solver.
pub struct Dlt;

/// Parameters controlling the DLT solver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DltParams {
    /// Ratio of the smallest to the largest principal spread below which the
    /// world points are rejected as coplanar.
    pub planarity_eps: f64,
}

impl Default for DltParams {
    fn default() -> Self {
        Self {
            planarity_eps: 1e-3,
        }
    }
}

impl PnPSolver for Dlt {
    type Param = DltParams;

    fn solve(
        world: &[DVec3],
        image: &[DVec2],
        weights: &[f64],
        k: &CameraIntrinsics,
        params: &Self::Param,
    ) -> Result<PnPResult, PnPError> {
        solve_dlt(world, image, weights, k, params)
    }
}

/// Solve for the pose from the 3×4 projection matrix estimated linearly.
///
/// Requires at least six non-coplanar correspondences. The rotation block is
/// projected onto SO(3) with an SVD.
pub fn solve_dlt(
    world: &[DVec3],
    image: &[DVec2],
    weights: &[f64],
    k: &CameraIntrinsics,
    params: &DltParams,
) -> Result<PnPResult, PnPError> {
    check_inputs(world, image, weights, 6)?;

    let pa = principal_axes(world)
        .map_err(|_| PnPError::DegenerateConfiguration("empty point set"))?;
    if !(pa.sigmas[2] > params.planarity_eps * pa.sigmas[0]) {
        return Err(PnPError::DegenerateConfiguration(
            "DLT requires non-coplanar world points",
        ));
    }

    let (xw, c, s) = normalize_world(world);
    let xi = normalize_image(image, k);

    let n = world.len();
    let mut a = DMatrix::<f64>::zeros(2 * n, 12);
    for (i, ((p, uv), &w)) in xw.iter().zip(&xi).zip(weights).enumerate() {
        let sw = w.sqrt();
        let ph = [p.x, p.y, p.z, 1.0];
        for j in 0..4 {
            a[(2 * i, j)] = sw * ph[j];
            a[(2 * i, 8 + j)] = -sw * uv.x * ph[j];
            a[(2 * i + 1, 4 + j)] = sw * ph[j];
            a[(2 * i + 1, 8 + j)] = -sw * uv.y * ph[j];
        }
    }

    let ns = null_space(&a, 1)?;
    let p = ns
        .first()
        .ok_or(PnPError::DecompositionFailed("empty null space"))?;

    // P = [M | p4] with M = (lambda / s) R and p4 = lambda (R c + t)
    let m = DMat3::from_cols(
        DVec3::new(p[0], p[4], p[8]),
        DVec3::new(p[1], p[5], p[9]),
        DVec3::new(p[2], p[6], p[10]),
    );
    let p4 = DVec3::new(p[3], p[7], p[11]);

    let det = m.determinant();
    if !det.is_finite() || det.abs() < 1e-300 {
        return Err(PnPError::DegenerateConfiguration("singular projection matrix"));
    }
    let lambda_over_s = det.signum() * det.abs().cbrt();
    let rotation = orthogonalize_rotation(&(m * (1.0 / lambda_over_s)))
        .ok_or(PnPError::DecompositionFailed("rotation orthogonalization"))?;
    let lambda = lambda_over_s * s;
    let translation = p4 / lambda - rotation * c;

    let pose = Pose::new(rotation, translation);
    if !in_front(world, &pose) {
        return Err(PnPError::DegenerateConfiguration("points behind the camera"));
    }
    Ok(score_pose(world, image, weights, k, pose))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use contourpose_geometry::relative_angle;

    fn k() -> CameraIntrinsics {
        CameraIntrinsics::new(572.4114, 573.57043, 325.2611, 242.04899).unwrap()
    }

    fn cube(half: f64) -> Vec<DVec3> {
        let mut pts = Vec::new();
        for &x in &[-half, half] {
            for &y in &[-half, half] {
                for &z in &[-half, half] {
                    pts.push(DVec3::new(x, y, z));
                }
            }
        }
        pts
    }

    #[test]
    fn test_dlt_exact() -> Result<(), PnPError> {
        let world = cube(50.0);
        let pose = Pose::from_rvec(DVec3::new(0.5, -0.2, 0.3), DVec3::new(20.0, -10.0, 600.0));
        let image: Vec<DVec2> = world
            .iter()
            .map(|&p| k().project(pose.transform_point(p)).unwrap())
            .collect();
        let res = solve_dlt(&world, &image, &[1.0; 8], &k(), &DltParams::default())?;
        assert!(res.reproj_rmse < 1e-4);
        assert!(relative_angle(&res.pose.rotation, &pose.rotation) < 1e-6);
        assert_relative_eq!(
            res.pose.translation.distance(pose.translation),
            0.0,
            epsilon = 1e-3
        );
        Ok(())
    }

    #[test]
    fn test_dlt_rejects_planar() {
        let world: Vec<DVec3> = cube(50.0)
            .into_iter()
            .map(|p| DVec3::new(p.x, p.y + p.z * 0.5, 0.0))
            .collect();
        let image = vec![DVec2::new(320.0, 240.0); world.len()];
        assert!(matches!(
            solve_dlt(&world, &image, &[1.0; 8], &k(), &DltParams::default()),
            Err(PnPError::DegenerateConfiguration(_))
        ));
    }
}
