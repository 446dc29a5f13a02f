//! Evaluation of estimated poses against ground truth.

use std::path::PathBuf;

use contourpose_geometry::Pose;
use contourpose_io::{read_field_dump, EvaluationManifest};
use contourpose_metrics::{evaluate_pose, EvaluationReport, FrameMetrics, MetricsAccumulator};
use contourpose_vote::VectorField;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::PoseError;
use crate::pipeline::{PoseEstimator, PoseOutcome};

/// Per-frame entry of an [`EvaluationRun`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
    /// Field dump the frame was read from, if any.
    pub field: Option<PathBuf>,
    /// Pose result.
    pub outcome: PoseOutcome,
    /// Metrics against ground truth, `None` when indeterminate.
    pub metrics: Option<FrameMetrics>,
}

/// Frame records plus their summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRun {
    /// Aggregate metrics.
    pub report: EvaluationReport,
    /// One record per frame, in input order.
    pub frames: Vec<FrameRecord>,
}

impl PoseEstimator {
    /// Estimate one frame and score it against `gt`.
    pub fn evaluate_frame(&self, field: &VectorField, gt: &Pose) -> Result<FrameRecord, PoseError> {
        let outcome = self.estimate(field)?.outcome;
        let metrics = outcome.pose().map(|pose| {
            evaluate_pose(
                pose,
                gt,
                &self.template().model,
                &self.template().keypoints,
                &self.camera().intrinsics,
                &self.config().metrics,
            )
        });
        Ok(FrameRecord {
            field: None,
            outcome,
            metrics,
        })
    }

    /// Evaluate in-memory frames in parallel.
    pub fn evaluate_frames(&self, frames: &[(VectorField, Pose)]) -> Result<EvaluationRun, PoseError> {
        let records = frames
            .par_iter()
            .map(|(field, gt)| self.evaluate_frame(field, gt))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(summarize(records))
    }

    /// Evaluate every frame of a manifest in parallel.
    pub fn evaluate_manifest(&self, manifest: &EvaluationManifest) -> Result<EvaluationRun, PoseError> {
        let records = manifest
            .frames
            .par_iter()
            .map(|frame| {
                let field = read_field_dump(&frame.field)?;
                let mut record = self.evaluate_frame(&field, &frame.pose())?;
                record.field = Some(frame.field.clone());
                Ok::<_, PoseError>(record)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(summarize(records))
    }
}

fn summarize(frames: Vec<FrameRecord>) -> EvaluationRun {
    let accumulator: MetricsAccumulator = frames
        .iter()
        .map(|f| f.metrics.map(|m| (m, f.outcome.is_low_confidence())))
        .collect();
    let report = accumulator.report();
    log::info!(
        "evaluated {} frames: ADD pass {:.3}, 2D pass {:.3}, {} indeterminate",
        report.frames,
        report.add_pass_rate,
        report.projection_pass_rate,
        report.indeterminate
    );
    EvaluationRun { report, frames }
}
