//! Refinement of a winning hypothesis into a keypoint with uncertainty.

use glam::{DMat2, DVec2};
use serde::{Deserialize, Serialize};

use crate::decoder::PixelVote;
use crate::voter::{collect_inliers, VotingHypothesis};

/// Parameters for keypoint refinement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregateParams {
    /// Rounds of least-squares refinement with inlier re-selection.
    pub refine_iterations: usize,
    /// Lower bound on the residual standard deviation, in pixels.
    pub min_sigma: f64,
    /// Relative determinant below which the normal matrix is treated as singular.
    pub singular_eps: f64,
}

impl Default for AggregateParams {
    fn default() -> Self {
        Self {
            refine_iterations: 3,
            min_sigma: 0.1,
            singular_eps: 1e-9,
        }
    }
}

/// Final 2D estimate of one keypoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint2D {
    /// Keypoint index, matching the object template ordering.
    pub index: usize,
    /// Refined image location in pixels.
    pub point: DVec2,
    /// Location uncertainty in square pixels.
    pub covariance: DMat2,
    /// Votes supporting the final location.
    pub inlier_count: usize,
    /// RMS perpendicular distance of the inlier rays, in pixels.
    pub spread: f64,
    /// Winning hypothesis before refinement.
    pub hypothesis: DVec2,
}

impl Keypoint2D {
    /// Scalar weight for the pose solver, the inverse of the mean variance.
    pub fn weight(&self) -> f64 {
        let mean_var = 0.5 * (self.covariance.x_axis.x + self.covariance.y_axis.y);
        1.0 / mean_var.max(1e-12)
    }
}

struct RaySystem {
    normal: DMat2,
    rhs: DVec2,
    total_weight: f64,
}

impl RaySystem {
    fn accumulate(votes: &[PixelVote], inliers: &[usize]) -> Self {
        let mut normal = DMat2::ZERO;
        let mut rhs = DVec2::ZERO;
        let mut total_weight = 0.0;
        for &i in inliers {
            let v = &votes[i];
            let d = v.direction;
            // projector onto the ray normal: I - d d^T
            let proj = DMat2::from_cols(
                DVec2::new(1.0 - d.x * d.x, -d.x * d.y),
                DVec2::new(-d.x * d.y, 1.0 - d.y * d.y),
            ) * v.weight;
            normal += proj;
            rhs += proj * v.position;
            total_weight += v.weight;
        }
        Self {
            normal,
            rhs,
            total_weight,
        }
    }

    fn is_singular(&self, eps: f64) -> bool {
        let trace = self.normal.x_axis.x + self.normal.y_axis.y;
        !(self.normal.determinant() > eps * trace * trace) || self.total_weight <= 0.0
    }

    fn solve(&self, eps: f64) -> Option<DVec2> {
        if self.is_singular(eps) {
            return None;
        }
        let p = self.normal.inverse() * self.rhs;
        p.is_finite().then_some(p)
    }
}

#[inline]
fn perpendicular(v: &PixelVote, point: DVec2) -> f64 {
    let o = point - v.position;
    v.direction.x * o.y - v.direction.y * o.x
}

/// Weighted RMS of the perpendicular ray residuals at `point`.
fn residual_rms(votes: &[PixelVote], inliers: &[usize], point: DVec2) -> f64 {
    let (sum_wr2, sum_w) = inliers.iter().fold((0.0, 0.0), |(acc, w), &i| {
        let r = perpendicular(&votes[i], point);
        (acc + votes[i].weight * r * r, w + votes[i].weight)
    });
    if sum_w > 0.0 {
        (sum_wr2 / sum_w).sqrt()
    } else {
        0.0
    }
}

/// Refine a winning hypothesis into a [`Keypoint2D`].
///
/// The point is the confidence-weighted least-squares intersection of the
/// inlier rays, re-selecting inliers around it for a few rounds. When all
/// inliers are parallel the sampled hypothesis is kept. Returns `None` for an
/// empty inlier set.
pub fn aggregate(
    index: usize,
    votes: &[PixelVote],
    hypothesis: &VotingHypothesis,
    inlier_tolerance: f64,
    params: &AggregateParams,
) -> Option<Keypoint2D> {
    if hypothesis.inliers.is_empty() {
        return None;
    }

    let mut point = hypothesis.point;
    let mut inliers = hypothesis.inliers.clone();

    for _ in 0..params.refine_iterations {
        let Some(refined) = RaySystem::accumulate(votes, &inliers).solve(params.singular_eps)
        else {
            break;
        };
        point = refined;

        let reselected = collect_inliers(votes, point, inlier_tolerance);
        if reselected.is_empty() || reselected == inliers {
            break;
        }
        inliers = reselected;
    }

    let spread = residual_rms(votes, &inliers, point);
    let sigma = spread.max(params.min_sigma);
    let system = RaySystem::accumulate(votes, &inliers);

    let covariance = if system.is_singular(params.singular_eps) {
        // no constraint along the common ray direction
        DMat2::from_diagonal(DVec2::splat(inlier_tolerance.max(sigma).powi(2)))
    } else {
        let mean_weight = system.total_weight / inliers.len() as f64;
        system.normal.inverse() * (sigma * sigma * mean_weight)
    };

    Some(Keypoint2D {
        index,
        point,
        covariance,
        inlier_count: inliers.len(),
        spread,
        hypothesis: hypothesis.point,
    })
}
