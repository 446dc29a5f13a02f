#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! # File formats
//!
//! - Keypoint templates: one `x y z` row per keypoint, `#` comments
//! - Model points: PLY vertex positions, ascii or binary little endian
//! - Cameras: JSON with a 3x3 `K` matrix and optional distortion
//! - Field dumps: raw prediction tensors, see [`dump`]
//! - Evaluation manifests: JSON list of field dumps with ground-truth poses

/// Camera JSON files.
pub mod camera;

pub mod dump;

mod error;

/// Evaluation manifests.
pub mod manifest;

/// PLY point reader.
pub mod ply;

/// Object templates.
pub mod template;

pub use camera::{parse_camera, read_camera, write_camera, CameraFile};
pub use dump::{decode_field, encode_field, read_field_dump, write_field_dump};
pub use error::{IoError, PlyError};
pub use manifest::{EvaluationManifest, ManifestFrame};
pub use ply::read_ply_points;
pub use template::{parse_keypoints, read_keypoints, ObjectTemplate};
