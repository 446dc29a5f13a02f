//! Efficient Perspective-n-Point (EPnP) solver
//! Paper: https://www.tugraz.at/fileadmin/user_upload/Institute/ICG/Images/team_lepetit/publications/lepetit_ijcv08.pdf
//! Reference: https://github.com/opencv/opencv/blob/4.x/modules/calib3d/src/epnp.cpp

use contourpose_geometry::linalg::{principal_axes, umeyama};
use contourpose_geometry::{CameraIntrinsics, Pose};
use glam::{DMat3, DVec2, DVec3};
use nalgebra::{DMatrix, DVector, Matrix4, SMatrix, SVector, Vector4};
use serde::{Deserialize, Serialize};

use crate::ops::{check_inputs, in_front, normalize_image, null_space, score_pose};
use crate::pnp::{NumericTol, PnPError, PnPResult, PnPSolver};

/// Marker type representing the Efficient PnP algorithm.
pub struct EPnP;

impl PnPSolver for EPnP {
    type Param = EPnPParams;

    fn solve(
        world: &[DVec3],
        image: &[DVec2],
        weights: &[f64],
        k: &CameraIntrinsics,
        params: &Self::Param,
    ) -> Result<PnPResult, PnPError> {
        solve_epnp(world, image, weights, k, params)
    }
}

/// Parameters controlling the EPnP solver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EPnPParams {
    /// Shared numeric tolerances.
    pub tol: NumericTol,
}

const CP_PAIRS: [(usize, usize); 6] = [(0, 1), (0, 2), (0, 3), (1, 2), (1, 3), (2, 3)];

/// Control points expressed as four 3-vectors per null-space vector.
type NullBasis = [[DVec3; 4]; 4];

/// Solve Perspective-n-Point with EPnP.
///
/// Each correspondence row of the linear system is scaled by the square root
/// of its weight. The best of the three beta approximations, each polished by
/// Gauss-Newton, is returned.
pub fn solve_epnp(
    world: &[DVec3],
    image: &[DVec2],
    weights: &[f64],
    k: &CameraIntrinsics,
    params: &EPnPParams,
) -> Result<PnPResult, PnPError> {
    check_inputs(world, image, weights, 4)?;

    let cw = select_control_points(world)?;
    let alphas = compute_barycentric(world, &cw, params.tol.eps);
    let normalized = normalize_image(image, k);
    let m = build_m(&alphas, &normalized, weights);

    let v = null_basis(&null_space(&m, 4)?);
    let l = build_l6x10(&v);
    let rho = rho_ctrlpts(&cw);
    let rho_vec = DVector::from_column_slice(&rho);

    let betas = [
        estimate_beta(&[0, 1, 3, 6], &l, &rho_vec, params.tol.svd),
        estimate_beta(&[0, 1, 2], &l, &rho_vec, params.tol.svd),
        estimate_beta(&[0, 1, 2, 3, 4], &l, &rho_vec, params.tol.svd),
    ];

    let mut best: Option<PnPResult> = None;
    for beta in betas.into_iter().flatten() {
        let beta = gauss_newton(beta, &v, &rho);
        let Some(pose) = pose_from_betas(&beta, &v, world, &alphas) else {
            continue;
        };
        let candidate = score_pose(world, image, weights, k, pose);
        if !candidate.reproj_rmse.is_finite() {
            continue;
        }
        match &best {
            Some(b) if b.reproj_rmse <= candidate.reproj_rmse => {}
            _ => best = Some(candidate),
        }
    }
    best.ok_or(PnPError::NoSolution)
}

/// Control points: the centroid plus one point along each principal axis.
fn select_control_points(world: &[DVec3]) -> Result<[DVec3; 4], PnPError> {
    let pa = principal_axes(world)
        .map_err(|_| PnPError::DegenerateConfiguration("empty point set"))?;
    if !(pa.sigmas[0] > 0.0) {
        return Err(PnPError::DegenerateConfiguration("all world points coincide"));
    }
    let mut cw = [pa.centroid; 4];
    for i in 0..3 {
        cw[i + 1] = pa.centroid + pa.axes[i] * pa.sigmas[i];
    }
    Ok(cw)
}

/// Barycentric coordinates of each world point with respect to the control points.
///
/// A degenerate control tetrahedron (planar or collinear input) is handled
/// with a pseudo-inverse, giving zero weight to the missing directions.
fn compute_barycentric(world: &[DVec3], cw: &[DVec3; 4], eps: f64) -> Vec<[f64; 4]> {
    let b = DMat3::from_cols(cw[1] - cw[0], cw[2] - cw[0], cw[3] - cw[0]);

    let b_inv = if b.determinant().abs() > eps {
        b.inverse()
    } else {
        let b_na = contourpose_geometry::linalg::dmat3_to_na(&b);
        match b_na.pseudo_inverse(eps) {
            Ok(p) => contourpose_geometry::linalg::na_to_dmat3(&p),
            Err(_) => DMat3::ZERO,
        }
    };

    world
        .iter()
        .map(|&p| {
            let l = b_inv * (p - cw[0]);
            [1.0 - (l.x + l.y + l.z), l.x, l.y, l.z]
        })
        .collect()
}

/// Construct the weighted 2N×12 design matrix **M** in normalized image coordinates.
fn build_m(alphas: &[[f64; 4]], normalized: &[DVec2], weights: &[f64]) -> DMatrix<f64> {
    let n = alphas.len();
    let mut m = DMatrix::<f64>::zeros(2 * n, 12);
    for (i, ((a, uv), &w)) in alphas.iter().zip(normalized).zip(weights).enumerate() {
        let sw = w.sqrt();
        for (j, &alpha) in a.iter().enumerate() {
            let base = 3 * j;
            m[(2 * i, base)] = sw * alpha;
            m[(2 * i, base + 2)] = -sw * alpha * uv.x;
            m[(2 * i + 1, base + 1)] = sw * alpha;
            m[(2 * i + 1, base + 2)] = -sw * alpha * uv.y;
        }
    }
    m
}

/// Split the null-space vectors into per-control-point blocks.
///
/// `v[0]` belongs to the smallest eigenvalue and pairs with `beta[0]`.
fn null_basis(vectors: &[DVector<f64>]) -> NullBasis {
    let mut v = [[DVec3::ZERO; 4]; 4];
    for (k, vec) in vectors.iter().take(4).enumerate() {
        for (c, block) in v[k].iter_mut().enumerate() {
            *block = DVec3::new(vec[3 * c], vec[3 * c + 1], vec[3 * c + 2]);
        }
    }
    v
}

/// Build the 6×10 matrix **L** with columns `[b11, b12, b22, b13, b23, b33, b14, b24, b34, b44]`.
fn build_l6x10(v: &NullBasis) -> [[f64; 10]; 6] {
    let mut l = [[0.0; 10]; 6];
    for (row, &(a, b)) in l.iter_mut().zip(CP_PAIRS.iter()) {
        let dv: [DVec3; 4] = std::array::from_fn(|k| v[k][a] - v[k][b]);
        *row = [
            dv[0].dot(dv[0]),
            2.0 * dv[0].dot(dv[1]),
            dv[1].dot(dv[1]),
            2.0 * dv[0].dot(dv[2]),
            2.0 * dv[1].dot(dv[2]),
            dv[2].dot(dv[2]),
            2.0 * dv[0].dot(dv[3]),
            2.0 * dv[1].dot(dv[3]),
            2.0 * dv[2].dot(dv[3]),
            dv[3].dot(dv[3]),
        ];
    }
    l
}

/// Compute the six squared distances (ρ vector) between the 4 control points.
fn rho_ctrlpts(cw: &[DVec3; 4]) -> [f64; 6] {
    CP_PAIRS.map(|(i, j)| cw[i].distance_squared(cw[j]))
}

/// Solve for an initial beta vector from a column subset of **L**.
fn estimate_beta(cols: &[usize], l: &[[f64; 10]; 6], rho: &DVector<f64>, tol: f64) -> Option<[f64; 4]> {
    let l_sub = DMatrix::<f64>::from_fn(6, cols.len(), |r, c| l[r][cols[c]]);
    let x = l_sub.svd(true, true).solve(rho, tol).ok()?;

    let mut beta = [0.0; 4];
    match cols.len() {
        // b11, b12, b13, b14
        4 => {
            if x[0] < 0.0 {
                let s = (-x[0]).sqrt();
                beta = [s, -x[1] / s, -x[2] / s, -x[3] / s];
            } else {
                let s = x[0].sqrt();
                if s == 0.0 {
                    return None;
                }
                beta = [s, x[1] / s, x[2] / s, x[3] / s];
            }
        }
        // b11, b12, b22
        3 => {
            if x[0] < 0.0 {
                beta[0] = (-x[0]).sqrt();
                beta[1] = if x[2] < 0.0 { (-x[2]).sqrt() } else { 0.0 };
            } else {
                beta[0] = x[0].sqrt();
                beta[1] = if x[2] > 0.0 { x[2].sqrt() } else { 0.0 };
            }
            if x[1] < 0.0 {
                beta[0] = -beta[0];
            }
        }
        // b11, b12, b22, b13, b23
        5 => {
            if x[0] < 0.0 {
                beta[0] = (-x[0]).sqrt();
                beta[1] = if x[2] < 0.0 { (-x[2]).sqrt() } else { 0.0 };
            } else {
                beta[0] = x[0].sqrt();
                beta[1] = if x[2] > 0.0 { x[2].sqrt() } else { 0.0 };
            }
            if x[1] < 0.0 {
                beta[0] = -beta[0];
            }
            if beta[0] == 0.0 {
                return None;
            }
            beta[2] = x[3] / beta[0];
        }
        _ => return None,
    }
    beta.iter().all(|b| b.is_finite()).then_some(beta)
}

/// Refine betas by Gauss-Newton on the control point distance constraints.
fn gauss_newton(beta_init: [f64; 4], v: &NullBasis, rho: &[f64; 6]) -> [f64; 4] {
    const MAX_ITERATIONS: usize = 10;
    const DAMPING: f64 = 1e-12;
    const STOP_EPS: f64 = 1e-12;

    let mut bet = Vector4::from(beta_init);
    for _ in 0..MAX_ITERATIONS {
        let mut f = SVector::<f64, 6>::zeros();
        let mut j = SMatrix::<f64, 6, 4>::zeros();

        for (r, &(a, b)) in CP_PAIRS.iter().enumerate() {
            let dv: [DVec3; 4] = std::array::from_fn(|k| v[k][a] - v[k][b]);
            let diff = (0..4).fold(DVec3::ZERO, |acc, k| acc + dv[k] * bet[k]);
            f[r] = diff.length_squared() - rho[r];
            for k in 0..4 {
                j[(r, k)] = 2.0 * diff.dot(dv[k]);
            }
        }

        let mut a: Matrix4<f64> = j.transpose() * j;
        for d in 0..4 {
            a[(d, d)] += DAMPING * (1.0 + a[(d, d)]);
        }
        let rhs: Vector4<f64> = j.transpose() * f;

        let Some(delta) = a.cholesky().map(|c| c.solve(&rhs)) else {
            break;
        };
        bet -= delta;
        if delta.norm() < STOP_EPS * (1.0 + bet.norm()) {
            break;
        }
    }
    [bet[0], bet[1], bet[2], bet[3]]
}

/// Recover the pose from betas by aligning the world points to their camera-frame reconstruction.
fn pose_from_betas(beta: &[f64; 4], v: &NullBasis, world: &[DVec3], alphas: &[[f64; 4]]) -> Option<Pose> {
    let cc: [DVec3; 4] =
        std::array::from_fn(|c| (0..4).fold(DVec3::ZERO, |acc, k| acc + v[k][c] * beta[k]));
    let mut pc: Vec<DVec3> = alphas
        .iter()
        .map(|a| (0..4).fold(DVec3::ZERO, |acc, j| acc + cc[j] * a[j]))
        .collect();

    // the null space is sign ambiguous
    let ahead = pc.iter().filter(|p| p.z > 0.0).count();
    if 2 * ahead < pc.len() {
        for p in &mut pc {
            *p = -*p;
        }
    }

    let pose = umeyama(world, &pc).ok()?;
    (pose.rotation.is_finite() && pose.translation.is_finite() && in_front(world, &pose))
        .then_some(pose)
}
