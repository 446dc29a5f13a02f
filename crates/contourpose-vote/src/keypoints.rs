use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::aggregate::{aggregate, AggregateParams, Keypoint2D};
use crate::decoder::{decode_channel, DecoderParams};
use crate::error::FieldError;
use crate::field::VectorField;
use crate::voter::{vote, VoteParams, VotingHypothesis};

/// Parameters for the decode, vote and aggregate stages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VotingParams {
    /// Decoder parameters.
    pub decoder: DecoderParams,
    /// Voter parameters.
    pub vote: VoteParams,
    /// Aggregator parameters.
    pub aggregate: AggregateParams,
}

/// Outcome of voting on one keypoint channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelVotes {
    /// Keypoint index.
    pub index: usize,
    /// Pixels that survived decoding.
    pub num_votes: usize,
    /// Winning hypothesis, `None` without evidence.
    pub hypothesis: Option<VotingHypothesis>,
    /// Refined keypoint, `None` without evidence.
    pub keypoint: Option<Keypoint2D>,
}

/// Seed of the random source used for keypoint `index`.
#[inline]
pub fn channel_seed(seed: u64, index: usize) -> u64 {
    seed.wrapping_add((index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

/// Decode, vote and aggregate a single keypoint channel.
pub fn vote_channel(
    field: &VectorField,
    index: usize,
    params: &VotingParams,
    seed: u64,
) -> Result<ChannelVotes, FieldError> {
    let channel = field.channel(index)?;
    let votes = decode_channel(&channel, &params.decoder);
    if votes.is_empty() {
        log::debug!("keypoint {index}: no pixel above confidence threshold");
    }

    let mut rng = StdRng::seed_from_u64(channel_seed(seed, index));
    let hypothesis = vote(&votes, &params.vote, &mut rng);
    let keypoint = hypothesis.as_ref().and_then(|h| {
        aggregate(
            index,
            &votes,
            h,
            params.vote.inlier_tolerance,
            &params.aggregate,
        )
    });

    match &keypoint {
        Some(kp) => log::debug!(
            "keypoint {index}: {} votes, {} inliers, spread {:.3}px",
            votes.len(),
            kp.inlier_count,
            kp.spread
        ),
        None => log::debug!("keypoint {index}: absent ({} votes)", votes.len()),
    }

    Ok(ChannelVotes {
        index,
        num_votes: votes.len(),
        hypothesis,
        keypoint,
    })
}

/// Vote on every channel in parallel.
///
/// Each channel gets its own random source derived from `seed`, so the result
/// does not depend on thread scheduling.
pub fn vote_channels(
    field: &VectorField,
    params: &VotingParams,
    seed: u64,
) -> Result<Vec<ChannelVotes>, FieldError> {
    (0..field.num_keypoints())
        .into_par_iter()
        .map(|k| vote_channel(field, k, params, seed))
        .collect()
}

/// Keypoints present in the field, ordered by index.
pub fn vote_keypoints(
    field: &VectorField,
    params: &VotingParams,
    seed: u64,
) -> Result<Vec<Keypoint2D>, FieldError> {
    Ok(vote_channels(field, params, seed)?
        .into_iter()
        .filter_map(|c| c.keypoint)
        .collect())
}
