#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! # Weighted PnP (Perspective-n-Point)
//!
//! Object pose estimation from weighted 2D-3D keypoint correspondences.
//!
//! ## Key Features
//!
//! - **Linear solvers**: EPnP, DLT for non-planar sets, homography decomposition for planar sets
//! - **Refinement**: weighted Levenberg–Marquardt on the reprojection error
//! - **Distortion handling**: image points are undistorted before solving
//! - **Conditioning**: detection of collinear, coplanar and ill-conditioned problems
//!
//! ## Example
//!
//! ```rust
//! use contourpose_geometry::{CameraIntrinsics, CameraModel, Pose};
//! use contourpose_pnp::{solve_pnp, PnPMethod};
//! use glam::DVec3;
//!
//! let k = CameraIntrinsics::new(800.0, 800.0, 320.0, 240.0)?;
//! let world = vec![
//!     DVec3::new(0.0, 0.0, 0.0),
//!     DVec3::new(0.1, 0.0, 0.0),
//!     DVec3::new(0.0, 0.1, 0.0),
//!     DVec3::new(0.0, 0.0, 0.1),
//!     DVec3::new(0.1, 0.1, 0.05),
//! ];
//! let truth = Pose::from_rvec(DVec3::new(0.1, 0.2, -0.1), DVec3::new(0.0, 0.0, 1.0));
//! let image: Vec<_> = world
//!     .iter()
//!     .filter_map(|&p| k.project(truth.transform_point(p)))
//!     .collect();
//!
//! let result = solve_pnp(&world, &image, None, &CameraModel::pinhole(k), &PnPMethod::Auto(Default::default()))?;
//! assert!(result.reproj_rmse < 1e-3);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use contourpose_geometry::CameraModel;
use glam::{DVec2, DVec3};
use serde::{Deserialize, Serialize};

/// Detection of degenerate and poorly conditioned problems.
pub mod conditioning;

/// Direct Linear Transform solver.
pub mod dlt;

/// EPnP: four virtual control points, closed-form betas and Gauss-Newton polish.
pub mod epnp;

/// Homography decomposition for coplanar points.
pub mod planar;

/// Errors, results and the [`PnPSolver`] trait.
pub mod pnp;

/// Levenberg–Marquardt refinement.
pub mod refine;

mod ops;

pub use conditioning::{assess_conditioning, Conditioning, ConditioningParams, Degeneracy};
pub use dlt::{Dlt, DltParams};
pub use epnp::{EPnP, EPnPParams};
pub use ops::{reprojection_errors, weighted_rmse};
pub use planar::Planar;
pub use pnp::{NumericTol, PnPError, PnPResult, PnPSolver};
pub use refine::{refine_pose_lm, LMOutput, LMParams};

/// Parameters for the automatic linear-then-refine solver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PnPParams {
    /// EPnP parameters.
    pub epnp: EPnPParams,
    /// DLT parameters.
    pub dlt: DltParams,
    /// Principal spread ratio below which the planar solver is also tried.
    pub planar_ratio: f64,
    /// Refinement parameters, `None` to return the linear estimate.
    pub refine_lm: Option<LMParams>,
}

impl Default for PnPParams {
    fn default() -> Self {
        Self {
            epnp: EPnPParams::default(),
            dlt: DltParams::default(),
            planar_ratio: 0.05,
            refine_lm: Some(LMParams::default()),
        }
    }
}

/// Solver selection for [`solve_pnp`].
#[derive(Debug, Clone)]
pub enum PnPMethod {
    /// EPnP with explicit tolerances.
    EPnP(EPnPParams),
    /// EPnP with default tolerances.
    EPnPDefault,
    /// Direct Linear Transform.
    Dlt(DltParams),
    /// Planar homography decomposition.
    Planar,
    /// Best linear candidate by weighted reprojection error, then LM refinement.
    Auto(PnPParams),
}

/// Solve the object pose with the selected method.
///
/// `weights` defaults to uniform weights. Distorted image points are
/// undistorted with the camera model before solving; the reported residuals
/// are in undistorted pixels.
pub fn solve_pnp(
    world: &[DVec3],
    image: &[DVec2],
    weights: Option<&[f64]>,
    camera: &CameraModel,
    method: &PnPMethod,
) -> Result<PnPResult, PnPError> {
    camera.validate()?;
    let uniform;
    let weights = match weights {
        Some(w) => w,
        None => {
            uniform = vec![1.0; world.len()];
            uniform.as_slice()
        }
    };
    let undistorted;
    let image = if camera.has_distortion() {
        undistorted = camera.undistort_points(image);
        undistorted.as_slice()
    } else {
        image
    };
    let k = &camera.intrinsics;

    match method {
        PnPMethod::EPnP(params) => EPnP::solve(world, image, weights, k, params),
        PnPMethod::EPnPDefault => EPnP::solve(world, image, weights, k, &EPnPParams::default()),
        PnPMethod::Dlt(params) => Dlt::solve(world, image, weights, k, params),
        PnPMethod::Planar => Planar::solve(world, image, weights, k, &()),
        PnPMethod::Auto(params) => solve_auto(world, image, weights, k, params),
    }
}

fn solve_auto(
    world: &[DVec3],
    image: &[DVec2],
    weights: &[f64],
    k: &contourpose_geometry::CameraIntrinsics,
    params: &PnPParams,
) -> Result<PnPResult, PnPError> {
    let mut candidates = vec![("epnp", EPnP::solve(world, image, weights, k, &params.epnp))];
    if world.len() >= 6 {
        candidates.push(("dlt", Dlt::solve(world, image, weights, k, &params.dlt)));
    }
    let near_planar = contourpose_geometry::linalg::principal_axes(world)
        .map(|pa| pa.sigmas[2] < params.planar_ratio * pa.sigmas[0])
        .unwrap_or(false);
    if near_planar {
        candidates.push(("planar", Planar::solve(world, image, weights, k, &())));
    }

    let mut best: Option<(&str, PnPResult)> = None;
    let mut first_err = None;
    for (name, candidate) in candidates {
        match candidate {
            Ok(res) if res.reproj_rmse.is_finite() => {
                log::trace!("{name} candidate rmse {:.4}px", res.reproj_rmse);
                match &best {
                    Some((_, b)) if b.reproj_rmse <= res.reproj_rmse => {}
                    _ => best = Some((name, res)),
                }
            }
            Ok(_) => {}
            Err(e) => {
                log::trace!("{name} candidate failed: {e}");
                // input errors are the same for every solver
                if matches!(
                    e,
                    PnPError::InsufficientCorrespondences { .. }
                        | PnPError::MismatchedArrayLengths { .. }
                        | PnPError::NonFiniteInput { .. }
                        | PnPError::InvalidWeight { .. }
                ) {
                    return Err(e);
                }
                first_err.get_or_insert(e);
            }
        }
    }

    let Some((name, linear)) = best else {
        return Err(first_err.unwrap_or(PnPError::NoSolution));
    };
    log::debug!("seeding refinement with {name} (rmse {:.4}px)", linear.reproj_rmse);

    let Some(lm) = &params.refine_lm else {
        return Ok(linear);
    };
    match refine_pose_lm(world, image, weights, k, &linear.pose, lm) {
        Ok(out) if out.rmse.is_finite() && out.rmse <= linear.reproj_rmse => {
            let mut res = ops::score_pose(world, image, weights, k, out.pose);
            res.num_iterations = Some(out.iterations);
            res.converged = Some(out.converged);
            Ok(res)
        }
        Ok(_) => Ok(linear),
        Err(e) => {
            log::debug!("refinement failed, keeping linear estimate: {e}");
            Ok(linear)
        }
    }
}
