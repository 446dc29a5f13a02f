#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! # Geometry primitives
//!
//! Rigid poses, rotations, pinhole cameras with lens distortion and the small
//! linear algebra helpers used by the voting and pose solving crates. All types
//! are `f64` and built on [`glam`], with [`nalgebra`] used for decompositions.

/// Pinhole camera intrinsics and Brown-Conrady distortion.
pub mod camera;

/// Rigid alignment, principal axes and glam/nalgebra conversions.
pub mod linalg;

/// Rigid object-to-camera transforms.
pub mod pose;

/// Rotation group SO(3).
pub mod so3;

pub use camera::{CameraError, CameraIntrinsics, CameraModel, PolynomialDistortion};
pub use pose::Pose;
pub use so3::{relative_angle, SO3};

pub use glam::{DMat3, DVec2, DVec3};
