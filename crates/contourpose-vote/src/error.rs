use thiserror::Error;

/// Errors raised while building or reading a vector field.
#[derive(Debug, Error, PartialEq)]
pub enum FieldError {
    /// A buffer does not hold the number of elements implied by the shape.
    #[error("{name} buffer has {actual} elements, expected {expected} for shape [{keypoints}, {height}, {width}]")]
    ShapeMismatch {
        /// Name of the offending buffer.
        name: &'static str,
        /// Expected number of elements.
        expected: usize,
        /// Actual number of elements.
        actual: usize,
        /// Number of keypoint channels.
        keypoints: usize,
        /// Field height.
        height: usize,
        /// Field width.
        width: usize,
    },

    /// The grid stride must be a finite positive number.
    #[error("Invalid field stride {0}")]
    InvalidStride(f64),

    /// The field origin must be finite.
    #[error("Invalid field origin ({0}, {1})")]
    InvalidOrigin(f64, f64),

    /// Requested keypoint channel does not exist.
    #[error("Keypoint channel {index} out of range, field has {available}")]
    ChannelOutOfRange {
        /// Requested channel.
        index: usize,
        /// Number of channels in the field.
        available: usize,
    },

    /// The field source could not produce a field for the region.
    #[error("Field source failed: {0}")]
    Source(String),
}
