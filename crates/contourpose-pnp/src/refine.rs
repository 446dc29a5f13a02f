//! Weighted Levenberg–Marquardt pose refinement.

use contourpose_geometry::{CameraIntrinsics, Pose, SO3};
use glam::{DVec2, DVec3};
use nalgebra::{Matrix6, Vector6};
use serde::{Deserialize, Serialize};

use crate::ops::check_inputs;
use crate::pnp::PnPError;

/// Parameters controlling the LM pose refinement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LMParams {
    /// Maximum number of LM iterations.
    pub max_iters: usize,
    /// Convergence threshold on the relative decrease of the weighted squared error.
    pub eps: f64,
    /// Initial damping factor (lambda).
    pub lambda_init: f64,
    /// Multiplicative factor to increase/decrease lambda.
    pub lambda_mul: f64,
}

impl Default for LMParams {
    fn default() -> Self {
        Self {
            max_iters: 50,
            eps: 1e-10,
            lambda_init: 1e-3,
            lambda_mul: 10.0,
        }
    }
}

/// Outcome of [`refine_pose_lm`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LMOutput {
    /// Refined pose.
    pub pose: Pose,
    /// Weighted RMS reprojection error in pixels.
    pub rmse: f64,
    /// Iterations performed.
    pub iterations: usize,
    /// Whether a convergence criterion was met.
    pub converged: bool,
}

/// Parameter vector `[rx, ry, rz, tx, ty, tz]`.
type State = [f64; 6];

fn state_of(pose: &Pose) -> State {
    let r = pose.rvec();
    let t = pose.translation;
    [r.x, r.y, r.z, t.x, t.y, t.z]
}

fn pose_of(x: &State) -> Pose {
    Pose::new(
        SO3::exp(DVec3::new(x[0], x[1], x[2])).matrix(),
        DVec3::new(x[3], x[4], x[5]),
    )
}

/// Weighted residuals of all correspondences.
struct Problem<'a> {
    world: &'a [DVec3],
    image: &'a [DVec2],
    sqrt_w: Vec<f64>,
    k: &'a CameraIntrinsics,
}

impl Problem<'_> {
    /// Fill `out` with `sqrt(w) * (projection - observation)`.
    ///
    /// Returns the weighted squared error, or `None` if a point falls behind the camera.
    fn residuals(&self, x: &State, out: &mut [f64]) -> Option<f64> {
        let pose = pose_of(x);
        let mut sum_sq = 0.0;
        for (i, ((&pw, &uv), &sw)) in self
            .world
            .iter()
            .zip(self.image)
            .zip(&self.sqrt_w)
            .enumerate()
        {
            let proj = self.k.project(pose.transform_point(pw))?;
            let du = sw * (proj.x - uv.x);
            let dv = sw * (proj.y - uv.y);
            out[2 * i] = du;
            out[2 * i + 1] = dv;
            sum_sq += du.mul_add(du, dv * dv);
        }
        Some(sum_sq)
    }

    /// Central-difference Jacobian rows, one per residual.
    fn jacobian(&self, x: &State) -> Option<Vec<Vector6<f64>>> {
        const H_ROT: f64 = 1e-6; // radians
        let t_scale = x[3].abs().max(x[4].abs()).max(x[5].abs()).max(1.0);
        let h_trans = 1e-6 * t_scale;

        let m = 2 * self.world.len();
        let mut rows = vec![Vector6::zeros(); m];
        let mut plus = vec![0.0; m];
        let mut minus = vec![0.0; m];
        for c in 0..6 {
            let h = if c < 3 { H_ROT } else { h_trans };
            let mut xp = *x;
            let mut xm = *x;
            xp[c] += h;
            xm[c] -= h;
            self.residuals(&xp, &mut plus)?;
            self.residuals(&xm, &mut minus)?;
            for (row, (p, q)) in rows.iter_mut().zip(plus.iter().zip(&minus)) {
                row[c] = (p - q) / (2.0 * h);
            }
        }
        Some(rows)
    }
}

/// Normal-equations matrix `J^T W J` of the reprojection error at `pose`.
///
/// Returns `None` if a point projects behind the camera.
pub fn normal_matrix(
    world: &[DVec3],
    image: &[DVec2],
    weights: &[f64],
    k: &CameraIntrinsics,
    pose: &Pose,
) -> Result<Option<Matrix6<f64>>, PnPError> {
    check_inputs(world, image, weights, 1)?;
    let problem = Problem {
        world,
        image,
        sqrt_w: weights.iter().map(|w| w.sqrt()).collect(),
        k,
    };
    Ok(problem
        .jacobian(&state_of(pose))
        .map(|rows| rows.iter().fold(Matrix6::zeros(), |acc, r| acc + r * r.transpose())))
}

/// Refine a pose with Levenberg–Marquardt to minimize the weighted pixel reprojection error.
///
/// The parameterization is axis-angle plus translation. Steps that move a
/// point behind the camera are rejected.
pub fn refine_pose_lm(
    world: &[DVec3],
    image: &[DVec2],
    weights: &[f64],
    k: &CameraIntrinsics,
    initial: &Pose,
    params: &LMParams,
) -> Result<LMOutput, PnPError> {
    check_inputs(world, image, weights, 3)?;

    let problem = Problem {
        world,
        image,
        sqrt_w: weights.iter().map(|w| w.sqrt()).collect(),
        k,
    };
    let total_weight: f64 = weights.iter().sum();

    let n = world.len();
    let mut residuals = vec![0.0; 2 * n];
    let mut trial = vec![0.0; 2 * n];

    let mut x = state_of(initial);
    let mut err = problem
        .residuals(&x, &mut residuals)
        .ok_or(PnPError::DegenerateConfiguration(
            "initial pose places points behind the camera",
        ))?;

    let mut lambda = params.lambda_init;
    let mut iterations = 0;
    let mut converged = false;

    while iterations < params.max_iters {
        iterations += 1;
        if err <= f64::MIN_POSITIVE {
            converged = true;
            break;
        }

        let Some(rows) = problem.jacobian(&x) else {
            break;
        };
        let mut a = Matrix6::<f64>::zeros();
        let mut g = Vector6::<f64>::zeros();
        for (row, &r) in rows.iter().zip(&residuals) {
            a += row * row.transpose();
            g += row * r;
        }
        for d in 0..6 {
            a[(d, d)] += lambda * a[(d, d)].max(1e-12);
        }

        let Some(delta) = a.cholesky().map(|c| c.solve(&(-g))) else {
            lambda *= params.lambda_mul;
            continue;
        };

        let mut x_new = x;
        for (xi, di) in x_new.iter_mut().zip(delta.iter()) {
            *xi += di;
        }

        match problem.residuals(&x_new, &mut trial) {
            Some(err_new) if err_new < err => {
                let decrease = err - err_new;
                x = x_new;
                std::mem::swap(&mut residuals, &mut trial);
                err = err_new;
                lambda = (lambda / params.lambda_mul).max(1e-12);
                if decrease <= params.eps * err.max(1e-12) {
                    converged = true;
                    break;
                }
            }
            _ => {
                lambda *= params.lambda_mul;
                // no further progress possible
                if lambda > 1e16 {
                    converged = true;
                    break;
                }
            }
        }

        let x_norm = x.iter().map(|v| v * v).sum::<f64>().sqrt();
        if delta.norm() <= 1e-14 * (1.0 + x_norm) {
            converged = true;
            break;
        }
    }

    let rmse = if total_weight > 0.0 {
        (err / total_weight).sqrt()
    } else {
        f64::INFINITY
    };
    log::trace!("LM finished after {iterations} iterations, rmse {rmse:.4}px");

    Ok(LMOutput {
        pose: pose_of(&x),
        rmse,
        iterations,
        converged,
    })
}
