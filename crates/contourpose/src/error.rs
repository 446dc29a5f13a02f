use contourpose_geometry::CameraError;
use contourpose_io::IoError;
use contourpose_metrics::MetricsError;
use contourpose_pnp::PnPError;
use contourpose_vote::FieldError;

/// Errors raised by the pose estimation pipeline.
///
/// Frames that simply lack evidence are not errors; they come back as
/// [`crate::PoseOutcome::Indeterminate`] or [`crate::PoseOutcome::Unsolved`].
#[derive(Debug, thiserror::Error)]
pub enum PoseError {
    /// The prediction tensor does not match the template.
    #[error("Field has {field} keypoint channels but template {template} has {expected}")]
    KeypointCountMismatch {
        /// Template name.
        template: String,
        /// Keypoints in the template.
        expected: usize,
        /// Channels in the field.
        field: usize,
    },

    /// A keypoint index has no template counterpart.
    #[error("Keypoint index {index} out of range for {available} template keypoints")]
    KeypointOutOfRange {
        /// Offending index.
        index: usize,
        /// Keypoints in the template.
        available: usize,
    },

    /// Invalid or unreadable prediction tensor.
    #[error(transparent)]
    Field(#[from] FieldError),

    /// The solver rejected its input.
    #[error("Pose solve failed: {0}")]
    Solver(#[from] PnPError),

    /// Invalid camera parameters.
    #[error(transparent)]
    Camera(#[from] CameraError),

    /// Invalid model data.
    #[error(transparent)]
    Metrics(#[from] MetricsError),

    /// Loading a file failed.
    #[error(transparent)]
    Io(#[from] IoError),
}
