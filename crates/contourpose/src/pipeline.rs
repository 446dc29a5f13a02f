use std::sync::Arc;

use contourpose_geometry::{CameraModel, Pose};
use contourpose_io::ObjectTemplate;
use contourpose_pnp::{assess_conditioning, solve_pnp, Degeneracy, PnPError, PnPMethod};
use contourpose_vote::{
    vote_channels, CropRegion, Keypoint2D, VectorField, VectorFieldSource,
};
use glam::{DVec2, DVec3};
use serde::{Deserialize, Serialize};

use crate::config::EstimatorConfig;
use crate::error::PoseError;

/// Fewest correspondences a perspective solve accepts.
pub const MIN_CORRESPONDENCES: usize = 4;

/// A solved pose with its fit statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseEstimate {
    /// Object-to-camera transform.
    pub pose: Pose,
    /// Weighted RMS reprojection error in pixels.
    pub reproj_rmse: f64,
    /// Scaled condition number of the refinement's normal equations.
    pub condition: f64,
    /// Refinement iterations, `None` when refinement was skipped or rejected.
    pub num_iterations: Option<usize>,
    /// Whether refinement converged.
    pub converged: Option<bool>,
}

/// Result of one pose estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PoseOutcome {
    /// Well-posed solve.
    Confident(PoseEstimate),
    /// Best-effort pose from a degenerate or ill-conditioned problem.
    LowConfidence {
        /// The best-effort estimate.
        estimate: PoseEstimate,
        /// What made the problem degenerate.
        reason: Degeneracy,
    },
    /// Too few keypoints to solve.
    Indeterminate {
        /// Keypoints that were present.
        available: usize,
    },
    /// Enough keypoints, but no solver produced a usable pose from them.
    Unsolved {
        /// Keypoints that were present.
        available: usize,
        /// Solver failure.
        reason: String,
    },
}

impl PoseOutcome {
    /// The estimate, if a pose was solved.
    pub fn estimate(&self) -> Option<&PoseEstimate> {
        match self {
            PoseOutcome::Confident(estimate) | PoseOutcome::LowConfidence { estimate, .. } => {
                Some(estimate)
            }
            PoseOutcome::Indeterminate { .. } | PoseOutcome::Unsolved { .. } => None,
        }
    }

    /// The pose, if one was solved.
    pub fn pose(&self) -> Option<&Pose> {
        self.estimate().map(|e| &e.pose)
    }

    /// Whether the pose was solved without a degeneracy flag.
    pub fn is_confident(&self) -> bool {
        matches!(self, PoseOutcome::Confident(_))
    }

    /// Whether the pose carries a degeneracy flag.
    pub fn is_low_confidence(&self) -> bool {
        matches!(self, PoseOutcome::LowConfidence { .. })
    }

    /// Whether too few keypoints were present.
    pub fn is_indeterminate(&self) -> bool {
        matches!(self, PoseOutcome::Indeterminate { .. })
    }

    /// Whether the solver failed on the present keypoints.
    pub fn is_unsolved(&self) -> bool {
        matches!(self, PoseOutcome::Unsolved { .. })
    }
}

/// What happened to one keypoint channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeypointDiagnostics {
    /// Keypoint index.
    pub index: usize,
    /// Pixels that survived decoding.
    pub num_votes: usize,
    /// Refined 2D keypoint, `None` when absent.
    pub keypoint: Option<Keypoint2D>,
    /// Reprojection error of this keypoint under the solved pose, in pixels.
    pub residual: Option<f64>,
}

/// Output of [`PoseEstimator::estimate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Estimation {
    /// Pose result.
    pub outcome: PoseOutcome,
    /// One entry per keypoint channel, in index order.
    pub keypoints: Vec<KeypointDiagnostics>,
}

/// Vector fields in, object pose out, for one object class and camera.
///
/// The template is shared read-only, so estimators for several cameras or
/// threads can hold the same [`Arc`].
#[derive(Debug, Clone)]
pub struct PoseEstimator {
    template: Arc<ObjectTemplate>,
    camera: CameraModel,
    config: EstimatorConfig,
}

impl PoseEstimator {
    /// Create an estimator, validating the camera.
    pub fn new(
        template: Arc<ObjectTemplate>,
        camera: CameraModel,
        config: EstimatorConfig,
    ) -> Result<Self, PoseError> {
        camera.validate()?;
        Ok(Self {
            template,
            camera,
            config,
        })
    }

    /// Object template.
    pub fn template(&self) -> &Arc<ObjectTemplate> {
        &self.template
    }

    /// Camera model.
    pub fn camera(&self) -> &CameraModel {
        &self.camera
    }

    /// Configuration.
    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// Estimate the pose from a prediction tensor with the configured seed.
    pub fn estimate(&self, field: &VectorField) -> Result<Estimation, PoseError> {
        self.estimate_with_seed(field, self.config.seed)
    }

    /// Request a field for `region` from `source` and estimate the pose.
    pub fn estimate_from_source<S: VectorFieldSource + ?Sized>(
        &self,
        source: &S,
        region: &CropRegion,
    ) -> Result<Estimation, PoseError> {
        let field = source.field(region)?;
        self.estimate(&field)
    }

    /// Estimate the pose from a prediction tensor.
    ///
    /// The same field and seed always produce the same result.
    pub fn estimate_with_seed(
        &self,
        field: &VectorField,
        seed: u64,
    ) -> Result<Estimation, PoseError> {
        if field.num_keypoints() != self.template.num_keypoints() {
            return Err(PoseError::KeypointCountMismatch {
                template: self.template.name.clone(),
                expected: self.template.num_keypoints(),
                field: field.num_keypoints(),
            });
        }

        let channels = vote_channels(field, &self.config.voting, seed)?;
        let present: Vec<Keypoint2D> = channels.iter().filter_map(|c| c.keypoint).collect();
        let outcome = self.solve_keypoints(&present)?;

        let mut residuals = vec![None; channels.len()];
        if let Some(pose) = outcome.pose() {
            for kp in &present {
                residuals[kp.index] = Some(self.reprojection_error(pose, kp));
            }
        }
        let keypoints = channels
            .into_iter()
            .zip(residuals)
            .map(|(c, residual)| KeypointDiagnostics {
                index: c.index,
                num_votes: c.num_votes,
                keypoint: c.keypoint,
                residual,
            })
            .collect();

        Ok(Estimation { outcome, keypoints })
    }

    /// Solve the pose from 2D keypoints matched to the template by index.
    ///
    /// Fewer than [`MIN_CORRESPONDENCES`] keypoints give
    /// [`PoseOutcome::Indeterminate`]. Solver failures caused by the keypoint
    /// geometry give [`PoseOutcome::Unsolved`]; only malformed input is an
    /// error. Each keypoint is weighted by the inverse of its variance.
    pub fn solve_keypoints(&self, keypoints: &[Keypoint2D]) -> Result<PoseOutcome, PoseError> {
        if keypoints.len() < MIN_CORRESPONDENCES {
            log::warn!(
                "{}: pose indeterminate, {} of {} keypoints present",
                self.template.name,
                keypoints.len(),
                self.template.num_keypoints()
            );
            return Ok(PoseOutcome::Indeterminate {
                available: keypoints.len(),
            });
        }

        let mut world = Vec::with_capacity(keypoints.len());
        let mut image = Vec::with_capacity(keypoints.len());
        let mut weights = Vec::with_capacity(keypoints.len());
        for kp in keypoints {
            world.push(self.template_point(kp.index)?);
            image.push(kp.point);
            weights.push(kp.weight());
        }

        // the solver and the conditioning check both see weights scaled to mean 1
        let mean_weight = weights.iter().sum::<f64>() / weights.len() as f64;
        if mean_weight.is_finite() && mean_weight > 0.0 {
            weights.iter_mut().for_each(|w| *w /= mean_weight);
        }

        let result = match solve_pnp(
            &world,
            &image,
            Some(&weights),
            &self.camera,
            &PnPMethod::Auto(self.config.pnp),
        ) {
            Ok(result) => result,
            Err(err) => return self.unsolved(keypoints.len(), err),
        };

        let undistorted;
        let observed: &[DVec2] = if self.camera.has_distortion() {
            undistorted = self.camera.undistort_points(&image);
            &undistorted
        } else {
            &image
        };
        let conditioning = match assess_conditioning(
            &world,
            observed,
            &weights,
            &self.camera.intrinsics,
            &result.pose,
            &self.config.conditioning,
        ) {
            Ok(conditioning) => conditioning,
            Err(err) => return self.unsolved(keypoints.len(), err),
        };

        let estimate = PoseEstimate {
            pose: result.pose,
            reproj_rmse: result.reproj_rmse,
            condition: conditioning.condition,
            num_iterations: result.num_iterations,
            converged: result.converged,
        };

        Ok(match conditioning.degeneracy {
            Some(reason) => {
                log::warn!(
                    "{}: low-confidence pose from {} keypoints, {reason}",
                    self.template.name,
                    keypoints.len()
                );
                PoseOutcome::LowConfidence { estimate, reason }
            }
            None => {
                log::debug!(
                    "{}: pose from {} keypoints, rmse {:.3}px, condition {:.2e}",
                    self.template.name,
                    keypoints.len(),
                    estimate.reproj_rmse,
                    estimate.condition
                );
                PoseOutcome::Confident(estimate)
            }
        })
    }

    fn unsolved(&self, available: usize, err: PnPError) -> Result<PoseOutcome, PoseError> {
        if err.is_invalid_input() {
            return Err(err.into());
        }
        log::warn!(
            "{}: no pose from {available} keypoints, {err}",
            self.template.name
        );
        Ok(PoseOutcome::Unsolved {
            available,
            reason: err.to_string(),
        })
    }

    fn template_point(&self, index: usize) -> Result<DVec3, PoseError> {
        self.template
            .keypoints
            .get(index)
            .copied()
            .ok_or(PoseError::KeypointOutOfRange {
                index,
                available: self.template.num_keypoints(),
            })
    }

    fn reprojection_error(&self, pose: &Pose, kp: &Keypoint2D) -> f64 {
        self.template
            .keypoints
            .get(kp.index)
            .and_then(|&p| self.camera.project(pose.transform_point(p)))
            .map_or(f64::INFINITY, |uv| uv.distance(kp.point))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contourpose_geometry::CameraIntrinsics;
    use glam::DMat2;

    fn estimator() -> PoseEstimator {
        let keypoints = vec![
            DVec3::new(-50.0, -40.0, -30.0),
            DVec3::new(50.0, -40.0, -30.0),
            DVec3::new(50.0, 40.0, -30.0),
            DVec3::new(-50.0, 40.0, -30.0),
            DVec3::new(-50.0, -40.0, 30.0),
            DVec3::new(50.0, -40.0, 30.0),
            DVec3::new(50.0, 40.0, 30.0),
            DVec3::new(-50.0, 40.0, 30.0),
        ];
        let template = ObjectTemplate::from_keypoints("box", keypoints, false).unwrap();
        let k = CameraIntrinsics::new(572.4114, 573.57043, 325.2611, 242.04899).unwrap();
        PoseEstimator::new(Arc::new(template), CameraModel::pinhole(k), EstimatorConfig::default())
            .unwrap()
    }

    fn observed(est: &PoseEstimator, pose: &Pose, indices: &[usize]) -> Vec<Keypoint2D> {
        indices
            .iter()
            .map(|&index| {
                let point = est
                    .camera()
                    .project(pose.transform_point(est.template().keypoints[index]))
                    .unwrap();
                Keypoint2D {
                    index,
                    point,
                    covariance: DMat2::IDENTITY * 0.25,
                    inlier_count: 50,
                    spread: 0.5,
                    hypothesis: point,
                }
            })
            .collect()
    }

    #[test]
    fn test_fewer_than_four_is_indeterminate() -> Result<(), PoseError> {
        let est = estimator();
        let pose = Pose::from_rvec(DVec3::new(0.1, 0.2, 0.3), DVec3::new(0.0, 0.0, 600.0));
        for n in 0..4 {
            let indices: Vec<usize> = (0..n).collect();
            let outcome = est.solve_keypoints(&observed(&est, &pose, &indices))?;
            assert_eq!(outcome, PoseOutcome::Indeterminate { available: n });
            assert!(outcome.pose().is_none());
        }
        Ok(())
    }

    #[test]
    fn test_exact_keypoints_confident() -> Result<(), PoseError> {
        let est = estimator();
        let pose = Pose::from_rvec(DVec3::new(0.4, -0.3, 0.2), DVec3::new(20.0, -15.0, 600.0));
        let outcome = est.solve_keypoints(&observed(&est, &pose, &[0, 1, 2, 3, 4, 5, 6, 7]))?;
        assert!(outcome.is_confident(), "{outcome:?}");
        let solved = outcome.pose().unwrap();
        assert!(solved.is_proper_rotation(1e-9));
        assert!(solved.translation.distance(pose.translation) < 1e-3);
        Ok(())
    }

    #[test]
    fn test_out_of_range_index() {
        let est = estimator();
        let pose = Pose::from_rvec(DVec3::ZERO, DVec3::new(0.0, 0.0, 600.0));
        let mut kps = observed(&est, &pose, &[0, 1, 2, 3]);
        kps[3].index = 8;
        assert!(matches!(
            est.solve_keypoints(&kps),
            Err(PoseError::KeypointOutOfRange { index: 8, available: 8 })
        ));
    }

    #[test]
    fn test_channel_count_mismatch() {
        let est = estimator();
        let field = VectorField::new(3, 2, 2, vec![0.0; 12], vec![0.0; 24]).unwrap();
        assert!(matches!(
            est.estimate(&field),
            Err(PoseError::KeypointCountMismatch { expected: 8, field: 3, .. })
        ));
    }

    #[test]
    fn test_solver_failure_is_unsolved() {
        let est = estimator();
        let outcome = est.unsolved(5, PnPError::NoSolution).unwrap();
        assert!(outcome.is_unsolved());
        assert!(outcome.pose().is_none());
        assert_eq!(
            outcome,
            PoseOutcome::Unsolved {
                available: 5,
                reason: PnPError::NoSolution.to_string(),
            }
        );
        assert!(est
            .unsolved(5, PnPError::DegenerateConfiguration("collinear"))
            .unwrap()
            .is_unsolved());

        let bad_weight = PnPError::InvalidWeight { index: 1, value: f64::NAN };
        let err = est.unsolved(5, bad_weight).unwrap_err();
        assert!(matches!(err, PoseError::Solver(PnPError::InvalidWeight { index: 1, .. })));
        assert_eq!(err.to_string(), "Pose solve failed: Invalid weight NaN at index 1");
    }

    #[test]
    fn test_scrambled_keypoints_give_outcome() -> Result<(), PoseError> {
        let est = estimator();
        let corners = [
            DVec2::new(0.0, 0.0),
            DVec2::new(640.0, 0.0),
            DVec2::new(640.0, 480.0),
            DVec2::new(0.0, 480.0),
            DVec2::new(320.0, 240.0),
        ];
        let kps: Vec<Keypoint2D> = [0, 3, 6, 1, 4]
            .into_iter()
            .zip(corners)
            .map(|(index, point)| Keypoint2D {
                index,
                point,
                covariance: DMat2::IDENTITY * 0.25,
                inlier_count: 50,
                spread: 0.5,
                hypothesis: point,
            })
            .collect();
        let outcome = est.solve_keypoints(&kps)?;
        if let Some(pose) = outcome.pose() {
            assert!(pose.is_proper_rotation(1e-6));
        }
        Ok(())
    }

    #[test]
    fn test_outcome_serializes_with_status() {
        let json = serde_json::to_value(PoseOutcome::Indeterminate { available: 2 }).unwrap();
        assert_eq!(json["status"], "indeterminate");
        assert_eq!(json["available"], 2);

        let json = serde_json::to_value(PoseOutcome::Unsolved {
            available: 6,
            reason: "No finite pose candidate".into(),
        })
        .unwrap();
        assert_eq!(json["status"], "unsolved");
        assert_eq!(json["reason"], "No finite pose candidate");
    }
}
