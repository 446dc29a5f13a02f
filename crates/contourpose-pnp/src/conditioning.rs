//! Detection of degenerate or poorly constrained pose problems.

use contourpose_geometry::linalg::principal_axes;
use contourpose_geometry::{CameraIntrinsics, Pose};
use glam::{DVec2, DVec3};
use nalgebra::{Matrix6, SymmetricEigen};
use serde::{Deserialize, Serialize};

use crate::pnp::PnPError;
use crate::refine::normal_matrix;

/// Parameters for the conditioning check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditioningParams {
    /// Principal spread ratio below which the 3D points count as collinear or coplanar.
    pub structure_eps: f64,
    /// Largest acceptable scaled condition number of `J^T W J`.
    pub max_condition: f64,
}

impl Default for ConditioningParams {
    fn default() -> Self {
        Self {
            structure_eps: 1e-3,
            max_condition: 1e8,
        }
    }
}

/// Reason a pose is reported with low confidence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Degeneracy {
    /// The 3D keypoints lie close to a line.
    Collinear {
        /// Ratio of the second to the first principal spread.
        ratio: f64,
    },
    /// The 3D keypoints lie close to a plane.
    Coplanar {
        /// Ratio of the third to the first principal spread.
        ratio: f64,
    },
    /// The refinement's normal equations are ill-conditioned.
    IllConditioned {
        /// Jacobi-scaled condition number.
        condition: f64,
    },
}

impl std::fmt::Display for Degeneracy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Degeneracy::Collinear { ratio } => write!(f, "collinear keypoints (ratio {ratio:.2e})"),
            Degeneracy::Coplanar { ratio } => write!(f, "coplanar keypoints (ratio {ratio:.2e})"),
            Degeneracy::IllConditioned { condition } => {
                write!(f, "ill-conditioned solve (condition {condition:.2e})")
            }
        }
    }
}

/// Classify the spatial structure of the 3D points.
pub fn structure_degeneracy(world: &[DVec3], eps: f64) -> Option<Degeneracy> {
    let pa = principal_axes(world).ok()?;
    if !(pa.sigmas[0] > 0.0) {
        return Some(Degeneracy::Collinear { ratio: 0.0 });
    }
    let collinear = pa.sigmas[1] / pa.sigmas[0];
    if collinear < eps {
        return Some(Degeneracy::Collinear { ratio: collinear });
    }
    let coplanar = pa.sigmas[2] / pa.sigmas[0];
    if coplanar < eps {
        return Some(Degeneracy::Coplanar { ratio: coplanar });
    }
    None
}

/// Condition number of `a` after symmetric Jacobi scaling `D^-1/2 A D^-1/2`.
///
/// Scaling removes the unit mismatch between rotation and translation.
/// Singular or indefinite matrices report infinity.
pub fn scaled_condition_number(a: &Matrix6<f64>) -> f64 {
    let d = a.diagonal();
    if !d.iter().all(|&v| v > 0.0 && v.is_finite()) {
        return f64::INFINITY;
    }
    let scaled = Matrix6::from_fn(|r, c| a[(r, c)] / (d[r] * d[c]).sqrt());
    let eigen = SymmetricEigen::new(scaled);
    let max = eigen.eigenvalues.max();
    let min = eigen.eigenvalues.min();
    if !(min > 0.0) {
        return f64::INFINITY;
    }
    max / min
}

/// Summary of the conditioning of a solved pose.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Conditioning {
    /// Scaled condition number of the normal equations at the solution.
    pub condition: f64,
    /// First degeneracy found, `None` for a well-posed problem.
    pub degeneracy: Option<Degeneracy>,
}

/// Check a solved pose for degenerate structure and ill-conditioning.
///
/// Structural degeneracy of the 3D points is reported first; otherwise the
/// condition number of `J^T W J` at `pose` is compared against the limit.
pub fn assess_conditioning(
    world: &[DVec3],
    image: &[DVec2],
    weights: &[f64],
    k: &CameraIntrinsics,
    pose: &Pose,
    params: &ConditioningParams,
) -> Result<Conditioning, PnPError> {
    let condition = normal_matrix(world, image, weights, k, pose)?
        .map(|a| scaled_condition_number(&a))
        .unwrap_or(f64::INFINITY);

    let degeneracy = structure_degeneracy(world, params.structure_eps).or_else(|| {
        (!(condition <= params.max_condition)).then_some(Degeneracy::IllConditioned { condition })
    });
    Ok(Conditioning {
        condition,
        degeneracy,
    })
}
