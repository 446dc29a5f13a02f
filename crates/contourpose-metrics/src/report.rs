//! Aggregation of per-frame metrics into an evaluation report.

use serde::{Deserialize, Serialize};

use crate::frame::FrameMetrics;

/// Summary over an evaluation run.
///
/// Pass rates are taken over every frame, so frames without a pose count as failures.
/// Mean errors are taken over the frames that produced a pose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    /// Frames seen.
    pub frames: usize,
    /// Frames that produced a pose.
    pub evaluated: usize,
    /// Frames that produced no pose, from too few keypoints or a failed solve.
    pub indeterminate: usize,
    /// Evaluated frames whose pose was flagged low-confidence.
    pub low_confidence: usize,
    /// Fraction of frames passing ADD (or ADD-S).
    pub add_pass_rate: f64,
    /// Fraction of frames passing the 2D projection threshold.
    pub projection_pass_rate: f64,
    /// Mean ADD in model units.
    pub mean_add: Option<f64>,
    /// Mean rotation error in degrees.
    pub mean_rotation_error_deg: Option<f64>,
    /// Mean translation error in millimeters.
    pub mean_translation_error_mm: Option<f64>,
}

/// Running totals for [`EvaluationReport`].
#[derive(Debug, Clone, Default)]
pub struct MetricsAccumulator {
    frames: usize,
    indeterminate: usize,
    low_confidence: usize,
    add_pass: usize,
    projection_pass: usize,
    add_sum: f64,
    rotation_sum: f64,
    translation_sum: f64,
}

impl MetricsAccumulator {
    /// Create an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a frame that produced a pose.
    pub fn record(&mut self, metrics: &FrameMetrics, low_confidence: bool) {
        self.frames += 1;
        self.low_confidence += usize::from(low_confidence);
        self.add_pass += usize::from(metrics.add_pass);
        self.projection_pass += usize::from(metrics.projection_pass);
        self.add_sum += metrics.add;
        self.rotation_sum += metrics.rotation_error_deg;
        self.translation_sum += metrics.translation_error_mm;
    }

    /// Add a frame that produced no pose.
    pub fn record_indeterminate(&mut self) {
        self.frames += 1;
        self.indeterminate += 1;
    }

    /// Combine totals from another accumulator.
    pub fn merge(mut self, other: Self) -> Self {
        self.frames += other.frames;
        self.indeterminate += other.indeterminate;
        self.low_confidence += other.low_confidence;
        self.add_pass += other.add_pass;
        self.projection_pass += other.projection_pass;
        self.add_sum += other.add_sum;
        self.rotation_sum += other.rotation_sum;
        self.translation_sum += other.translation_sum;
        self
    }

    /// Number of frames recorded so far.
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Summarize the recorded frames.
    pub fn report(&self) -> EvaluationReport {
        let evaluated = self.frames - self.indeterminate;
        let rate = |n: usize| {
            if self.frames == 0 {
                0.0
            } else {
                n as f64 / self.frames as f64
            }
        };
        let mean = |sum: f64| (evaluated > 0).then(|| sum / evaluated as f64);
        EvaluationReport {
            frames: self.frames,
            evaluated,
            indeterminate: self.indeterminate,
            low_confidence: self.low_confidence,
            add_pass_rate: rate(self.add_pass),
            projection_pass_rate: rate(self.projection_pass),
            mean_add: mean(self.add_sum),
            mean_rotation_error_deg: mean(self.rotation_sum),
            mean_translation_error_mm: mean(self.translation_sum),
        }
    }
}

impl std::iter::FromIterator<Option<(FrameMetrics, bool)>> for MetricsAccumulator {
    fn from_iter<I: IntoIterator<Item = Option<(FrameMetrics, bool)>>>(iter: I) -> Self {
        let mut acc = Self::new();
        for frame in iter {
            match frame {
                Some((m, low)) => acc.record(&m, low),
                None => acc.record_indeterminate(),
            }
        }
        acc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn frame(add: f64, pass: bool) -> FrameMetrics {
        FrameMetrics {
            add,
            add_pass: pass,
            projection_error_px: if pass { 1.0 } else { 9.0 },
            projection_pass: pass,
            rotation_error_deg: 2.0 * add,
            translation_error_mm: 10.0 * add,
        }
    }

    #[test]
    fn test_empty_report() {
        let report = MetricsAccumulator::new().report();
        assert_eq!(report.frames, 0);
        assert_eq!(report.add_pass_rate, 0.0);
        assert_eq!(report.mean_add, None);
    }

    #[test]
    fn test_indeterminate_counts_as_failure() {
        let mut acc = MetricsAccumulator::new();
        acc.record(&frame(1.0, true), false);
        acc.record(&frame(3.0, false), true);
        acc.record_indeterminate();
        acc.record_indeterminate();

        let report = acc.report();
        assert_eq!(report.frames, 4);
        assert_eq!(report.evaluated, 2);
        assert_eq!(report.indeterminate, 2);
        assert_eq!(report.low_confidence, 1);
        assert_relative_eq!(report.add_pass_rate, 0.25);
        assert_relative_eq!(report.projection_pass_rate, 0.25);
        assert_relative_eq!(report.mean_add.unwrap(), 2.0);
        assert_relative_eq!(report.mean_rotation_error_deg.unwrap(), 4.0);
        assert_relative_eq!(report.mean_translation_error_mm.unwrap(), 20.0);
    }

    #[test]
    fn test_merge_matches_sequential() {
        let frames = [Some((frame(1.0, true), false)), None, Some((frame(2.0, true), false))];
        let all: MetricsAccumulator = frames.iter().cloned().collect();
        let left: MetricsAccumulator = frames[..1].iter().cloned().collect();
        let right: MetricsAccumulator = frames[1..].iter().cloned().collect();
        assert_eq!(left.merge(right).report(), all.report());
    }
}
