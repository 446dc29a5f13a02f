//! Error, result and solver trait of the weighted PnP solvers.

use contourpose_geometry::{CameraError, CameraIntrinsics, Pose};
use glam::{DVec2, DVec3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reasons a pose solve can fail.
#[derive(Debug, Error, PartialEq)]
pub enum PnPError {
    /// Too few correspondences for the solver.
    #[error("Need {required} correspondences, got {actual}")]
    InsufficientCorrespondences {
        /// Solver minimum.
        required: usize,
        /// Correspondences given.
        actual: usize,
    },

    /// Two input slices differ in length.
    #[error("{left_name} has {left_len} entries but {right_name} has {right_len}")]
    MismatchedArrayLengths {
        /// First slice.
        left_name: &'static str,
        /// Its length.
        left_len: usize,
        /// Second slice.
        right_name: &'static str,
        /// Its length.
        right_len: usize,
    },

    /// A coordinate is NaN or infinite.
    #[error("Non-finite value in {name} at index {index}")]
    NonFiniteInput {
        /// Label of the offending slice
        name: &'static str,
        /// Index of the offending element
        index: usize,
    },

    /// Weights must be finite and positive.
    #[error("Invalid weight {value} at index {index}")]
    InvalidWeight {
        /// Index of the offending weight
        index: usize,
        /// Weight value
        value: f64,
    },

    /// The point configuration is unsuitable for the chosen solver.
    #[error("Degenerate configuration: {0}")]
    DegenerateConfiguration(&'static str),

    /// Eigen or singular value decomposition failed
    #[error("Decomposition failed: {0}")]
    DecompositionFailed(&'static str),

    /// No candidate produced a finite pose
    #[error("No finite pose candidate")]
    NoSolution,

    /// Camera model error
    #[error(transparent)]
    Camera(#[from] CameraError),
}

impl PnPError {
    /// Whether the error comes from malformed input rather than from the
    /// geometry of the correspondences.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            PnPError::MismatchedArrayLengths { .. }
                | PnPError::NonFiniteInput { .. }
                | PnPError::InvalidWeight { .. }
                | PnPError::Camera(_)
        )
    }
}

/// Tolerances of the linear solvers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NumericTol {
    /// Tolerance for singular-value least-squares solves.
    pub svd: f64,
    /// Threshold for determinant / singular-value checks when deciding whether to fall back to a pseudo-inverse.
    pub eps: f64,
}

impl Default for NumericTol {
    fn default() -> Self {
        Self {
            svd: 1e-12,
            eps: 1e-12,
        }
    }
}

/// A solved pose and its fit.
///
/// The pose maps coordinates from the **object** frame to the **camera** frame.
#[derive(Debug, Clone, PartialEq)]
pub struct PnPResult {
    /// Estimated pose.
    pub pose: Pose,
    /// Weighted root-mean-square reprojection error in pixels.
    pub reproj_rmse: f64,
    /// Per-correspondence reprojection error in pixels.
    pub residuals: Vec<f64>,
    /// Refinement iterations, `None` for a purely linear solve.
    pub num_iterations: Option<usize>,
    /// Refinement convergence, `None` for a purely linear solve.
    pub converged: Option<bool>,
}

impl PnPResult {
    /// Rotation as an axis-angle vector.
    pub fn rvec(&self) -> DVec3 {
        self.pose.rvec()
    }
}

/// A pose solver over weighted 2D-3D correspondences.
pub trait PnPSolver {
    /// Tuning parameters.
    type Param;

    /// Solve for the object pose given weighted 2D-3D correspondences.
    ///
    /// # Arguments
    /// * `world` – 3-D coordinates in the object frame.
    /// * `image` – Corresponding undistorted pixel coordinates.
    /// * `weights` – Per-correspondence weights, same length as `world`.
    /// * `k` – Camera intrinsics.
    /// * `params` – Tuning parameters.
    fn solve(
        world: &[DVec3],
        image: &[DVec2],
        weights: &[f64],
        k: &CameraIntrinsics,
        params: &Self::Param,
    ) -> Result<PnPResult, PnPError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_input_classification() {
        let lengths = PnPError::MismatchedArrayLengths {
            left_name: "world",
            left_len: 4,
            right_name: "image",
            right_len: 5,
        };
        assert!(lengths.is_invalid_input());
        assert!(PnPError::InvalidWeight { index: 2, value: -1.0 }.is_invalid_input());
        assert!(PnPError::Camera(CameraError::InvalidIntrinsics("fx must be positive".into())).is_invalid_input());

        assert!(!PnPError::NoSolution.is_invalid_input());
        assert!(!PnPError::DegenerateConfiguration("collinear").is_invalid_input());
        assert!(!PnPError::DecompositionFailed("svd").is_invalid_input());
        assert!(!PnPError::InsufficientCorrespondences { required: 6, actual: 5 }.is_invalid_input());
    }
}
