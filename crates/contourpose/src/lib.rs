#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! # contourpose
//!
//! Recovers the 6D pose of a known rigid object from dense per-pixel keypoint
//! direction predictions:
//!
//! 1. decode each keypoint channel into weighted rays ([`vote`])
//! 2. RANSAC-vote the ray intersection and refine it with a covariance
//! 3. solve a weighted PnP problem against the 3D keypoint template ([`pnp`])
//! 4. flag degenerate or ill-conditioned solves as low confidence
//!
//! [`metrics`] scores the poses against ground truth and [`io`] reads the
//! templates, cameras and evaluation data.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use contourpose::geometry::{CameraIntrinsics, CameraModel, Pose};
//! use contourpose::io::ObjectTemplate;
//! use contourpose::vote::{synthetic_field, SyntheticFieldParams};
//! use contourpose::{EstimatorConfig, PoseEstimator};
//! use glam::DVec3;
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let keypoints: Vec<DVec3> = (0..8)
//!     .map(|i| DVec3::new(
//!         if i & 1 == 0 { -50.0 } else { 50.0 },
//!         if i & 2 == 0 { -40.0 } else { 40.0 },
//!         if i & 4 == 0 { -30.0 } else { 30.0 },
//!     ))
//!     .collect();
//! let template = Arc::new(ObjectTemplate::from_keypoints("box", keypoints, false)?);
//! let camera = CameraModel::pinhole(CameraIntrinsics::new(572.4114, 573.57043, 325.2611, 242.04899)?);
//! let estimator = PoseEstimator::new(template.clone(), camera, EstimatorConfig::default())?;
//!
//! let truth = Pose::from_rvec(DVec3::new(0.3, -0.2, 0.1), DVec3::new(10.0, -5.0, 600.0));
//! let targets: Vec<_> = template
//!     .keypoints
//!     .iter()
//!     .map(|&p| camera.project(truth.transform_point(p)))
//!     .collect();
//! let mut rng = StdRng::seed_from_u64(0);
//! let field = synthetic_field(&targets, &SyntheticFieldParams::default(), &mut rng)?;
//!
//! let estimation = estimator.estimate(&field)?;
//! let pose = estimation.outcome.pose().expect("eight keypoints are enough");
//! assert!(pose.translation.distance(truth.translation) < 10.0);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod config;
mod error;
mod evaluation;
mod pipeline;

pub use config::EstimatorConfig;
pub use error::PoseError;
pub use evaluation::{EvaluationRun, FrameRecord};
pub use pipeline::{
    Estimation, KeypointDiagnostics, PoseEstimate, PoseEstimator, PoseOutcome, MIN_CORRESPONDENCES,
};

pub use contourpose_geometry as geometry;
pub use contourpose_io as io;
pub use contourpose_metrics as metrics;
pub use contourpose_pnp as pnp;
pub use contourpose_vote as vote;
