#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! # Keypoint voting
//!
//! Turns dense per-pixel keypoint direction predictions into 2D keypoints.
//!
//! ## Example
//!
//! ```rust
//! use contourpose_vote::{synthetic_field, vote_keypoints, SyntheticFieldParams, VotingParams};
//! use glam::DVec2;
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let mut rng = StdRng::seed_from_u64(0);
//! let target = DVec2::new(320.0, 240.0);
//! let field = synthetic_field(&[Some(target)], &SyntheticFieldParams::default(), &mut rng)?;
//!
//! let keypoints = vote_keypoints(&field, &VotingParams::default(), 42)?;
//! assert_eq!(keypoints.len(), 1);
//! assert!((keypoints[0].point - target).length() < 2.0);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

/// Least-squares refinement of a winning hypothesis.
pub mod aggregate;

/// Per-pixel decoding of a keypoint channel.
pub mod decoder;

mod error;
pub use error::FieldError;

/// Prediction tensor and the network boundary trait.
pub mod field;

/// Parallel voting over all keypoint channels.
pub mod keypoints;

/// Synthetic fields for tests, benchmarks and demos.
pub mod synthetic;

/// RANSAC ray-intersection voting.
pub mod voter;

pub use aggregate::{aggregate, AggregateParams, Keypoint2D};
pub use decoder::{decode_channel, DecoderParams, PixelVote};
pub use field::{CropRegion, FieldChannel, VectorField, VectorFieldSource};
pub use keypoints::{vote_channel, vote_channels, vote_keypoints, ChannelVotes, VotingParams};
pub use synthetic::{synthetic_field, SyntheticFieldParams};
pub use voter::{vote, VoteParams, VotingHypothesis};
