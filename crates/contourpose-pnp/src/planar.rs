//! Homography-based pose for coplanar point sets.

use contourpose_geometry::linalg::{orthogonalize_rotation, principal_axes};
use contourpose_geometry::{CameraIntrinsics, Pose};
use glam::{DMat3, DVec2, DVec3};
use nalgebra::DMatrix;

use crate::ops::{check_inputs, in_front, normalize_image, null_space, score_pose};
use crate::pnp::{PnPError, PnPResult, PnPSolver};

/// Marker type representing the planar homography solver.
pub struct Planar;

impl PnPSolver for Planar {
    type Param = ();

    fn solve(
        world: &[DVec3],
        image: &[DVec2],
        weights: &[f64],
        k: &CameraIntrinsics,
        _params: &Self::Param,
    ) -> Result<PnPResult, PnPError> {
        solve_planar(world, image, weights, k)
    }
}

/// Solve for the pose of (near) coplanar world points.
///
/// The points are expressed in the basis of their best-fit plane, a
/// homography to normalized image coordinates is estimated and decomposed
/// into `[r1 r2 t]`.
pub fn solve_planar(
    world: &[DVec3],
    image: &[DVec2],
    weights: &[f64],
    k: &CameraIntrinsics,
) -> Result<PnPResult, PnPError> {
    check_inputs(world, image, weights, 4)?;

    let pa = principal_axes(world)
        .map_err(|_| PnPError::DegenerateConfiguration("empty point set"))?;
    if !(pa.sigmas[1] > 1e-9 * pa.sigmas[0]) || !(pa.sigmas[0] > 0.0) {
        return Err(PnPError::DegenerateConfiguration("collinear world points"));
    }

    // right-handed plane basis
    let e1 = pa.axes[0];
    let e2 = pa.axes[1];
    let basis = DMat3::from_cols(e1, e2, e1.cross(e2));

    let scale = 1.0 / pa.sigmas[0];
    let plane: Vec<DVec2> = world
        .iter()
        .map(|&p| {
            let d = p - pa.centroid;
            DVec2::new(e1.dot(d), e2.dot(d)) * scale
        })
        .collect();
    let xi = normalize_image(image, k);

    let n = world.len();
    let mut a = DMatrix::<f64>::zeros(2 * n, 9);
    for (i, ((q, uv), &w)) in plane.iter().zip(&xi).zip(weights).enumerate() {
        let sw = w.sqrt();
        let qh = [q.x, q.y, 1.0];
        for j in 0..3 {
            a[(2 * i, j)] = sw * qh[j];
            a[(2 * i, 6 + j)] = -sw * uv.x * qh[j];
            a[(2 * i + 1, 3 + j)] = sw * qh[j];
            a[(2 * i + 1, 6 + j)] = -sw * uv.y * qh[j];
        }
    }
    let ns = null_space(&a, 1)?;
    let h = ns
        .first()
        .ok_or(PnPError::DecompositionFailed("empty null space"))?;

    // undo the plane scaling on the first two columns
    let h1 = DVec3::new(h[0], h[3], h[6]) * scale;
    let h2 = DVec3::new(h[1], h[4], h[7]) * scale;
    let h3 = DVec3::new(h[2], h[5], h[8]);

    let norm = 0.5 * (h1.length() + h2.length());
    if !(norm > 0.0) || !norm.is_finite() {
        return Err(PnPError::DegenerateConfiguration("degenerate homography"));
    }
    // the plane centroid must be in front of the camera
    let lambda = if h3.z < 0.0 { -norm } else { norm };

    let r1 = h1 / lambda;
    let r2 = h2 / lambda;
    let rotation_plane = orthogonalize_rotation(&DMat3::from_cols(r1, r2, r1.cross(r2)))
        .ok_or(PnPError::DecompositionFailed("rotation orthogonalization"))?;
    let t_plane = h3 / lambda;

    let rotation = rotation_plane * basis.transpose();
    let translation = t_plane - rotation * pa.centroid;
    let pose = Pose::new(rotation, translation);
    if !in_front(world, &pose) {
        return Err(PnPError::DegenerateConfiguration("points behind the camera"));
    }
    Ok(score_pose(world, image, weights, k, pose))
}
