#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! # Pose accuracy metrics
//!
//! - **ADD / ADD-S**: mean model point distance, closest-point variant for symmetric objects
//! - **2D projection error**: mean pixel distance of the reprojected model points
//! - **Rotation / translation error**: geodesic angle in degrees, distance in millimeters
//! - **Reports**: [`MetricsAccumulator`] folds frames into a serializable [`EvaluationReport`]

/// Per-frame metrics.
pub mod frame;

mod model;

/// Evaluation accumulator and report.
pub mod report;

pub use frame::{
    add_error, adds_error, evaluate_pose, projection_error, rotation_error_deg, translation_error,
    FrameMetrics, MetricsParams,
};
pub use model::{object_diameter, MetricsError, ModelPoints};
pub use report::{EvaluationReport, MetricsAccumulator};
