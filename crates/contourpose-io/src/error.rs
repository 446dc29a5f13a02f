use std::path::PathBuf;

use contourpose_geometry::CameraError;
use contourpose_metrics::MetricsError;
use contourpose_vote::FieldError;

/// Error types for the PLY reader.
#[derive(Debug, thiserror::Error)]
pub enum PlyError {
    /// Failed to read the PLY file.
    #[error("Failed to read PLY file")]
    Io(#[from] std::io::Error),

    /// The header is missing or malformed.
    #[error("Invalid PLY header: {0}")]
    InvalidHeader(String),

    /// Encoding other than ascii or binary little endian.
    #[error("Unsupported PLY format {0}")]
    UnsupportedFormat(String),

    /// Property type name not recognized.
    #[error("Unsupported PLY property type {0}")]
    UnsupportedProperty(String),

    /// The vertex element lacks one of `x`, `y`, `z`.
    #[error("PLY vertex element has no {0} property")]
    MissingCoordinate(&'static str),

    /// A body value could not be parsed.
    #[error("Invalid PLY value {value:?} in element {element}")]
    InvalidValue {
        /// Element being read.
        element: String,
        /// Offending token.
        value: String,
    },

    /// The body ended before all declared elements were read.
    #[error("PLY body ended early in element {0}")]
    UnexpectedEof(String),
}

/// Error types for the contourpose loaders.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    /// File system failure, with the path involved.
    #[error("Failed to access {path}")]
    File {
        /// Path being read or written.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to read or write a stream.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Failed to parse JSON.
    #[error("Failed to parse JSON")]
    Json(#[from] serde_json::Error),

    /// Failed to read a PLY model.
    #[error(transparent)]
    Ply(#[from] PlyError),

    /// A keypoint template row is malformed.
    #[error("Invalid keypoint template at line {line}: {message}")]
    Template {
        /// 1-based line number.
        line: usize,
        /// What is wrong with the line.
        message: String,
    },

    /// A field dump is malformed.
    #[error("Invalid field dump: {0}")]
    FieldDump(String),

    /// Invalid field contents.
    #[error(transparent)]
    Field(#[from] FieldError),

    /// Invalid camera parameters.
    #[error(transparent)]
    Camera(#[from] CameraError),

    /// Invalid model points.
    #[error(transparent)]
    Model(#[from] MetricsError),
}

impl IoError {
    pub(crate) fn file(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> IoError {
        let path = path.into();
        move |source| IoError::File { path, source }
    }
}
