use contourpose_geometry::DVec2;
use serde::{Deserialize, Serialize};

use crate::field::FieldChannel;

/// Parameters for decoding a keypoint channel into pixel votes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderParams {
    /// Pixels with a confidence below this value are discarded.
    pub confidence_threshold: f32,
    /// Raw directions shorter than this are discarded.
    pub min_direction_norm: f32,
}

impl Default for DecoderParams {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            min_direction_norm: 1e-6,
        }
    }
}

/// A single pixel's vote: a ray from `position` along `direction`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelVote {
    /// Pixel position in full-image coordinates.
    pub position: DVec2,
    /// Unit direction towards the keypoint.
    pub direction: DVec2,
    /// Confidence weight in `[0, 1]`.
    pub weight: f64,
}

/// Decode one keypoint channel into unit-direction pixel votes.
///
/// An empty result means the channel carries no evidence for its keypoint.
pub fn decode_channel(channel: &FieldChannel<'_>, params: &DecoderParams) -> Vec<PixelVote> {
    channel
        .confidence
        .iter()
        .zip(channel.directions.chunks_exact(2))
        .enumerate()
        .filter_map(|(i, (&conf, dir))| {
            if !conf.is_finite() || conf < params.confidence_threshold {
                return None;
            }
            let d = DVec2::new(dir[0] as f64, dir[1] as f64);
            let norm = d.length();
            if !norm.is_finite() || norm < params.min_direction_norm as f64 {
                return None;
            }
            Some(PixelVote {
                position: channel.position(i),
                direction: d / norm,
                weight: (conf as f64).clamp(0.0, 1.0),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::VectorField;
    use approx::assert_relative_eq;

    #[test]
    fn test_decode_threshold_and_normalize() {
        // 1 keypoint, 2x2 grid
        let conf = vec![0.9, 0.2, 0.5, 1.0];
        let dirs = vec![3.0, 4.0, 1.0, 0.0, 0.0, 0.0, 0.0, -2.0];
        let field = VectorField::new(1, 2, 2, conf, dirs)
            .unwrap()
            .with_placement(DVec2::new(10.0, 20.0), 4.0)
            .unwrap();
        let votes = decode_channel(&field.channel(0).unwrap(), &DecoderParams::default());

        // pixel 1 is below threshold, pixel 2 has a zero direction
        assert_eq!(votes.len(), 2);
        assert_eq!(votes[0].position, DVec2::new(10.0, 20.0));
        assert_relative_eq!(votes[0].direction.x, 0.6, epsilon = 1e-12);
        assert_relative_eq!(votes[0].direction.y, 0.8, epsilon = 1e-12);
        assert_relative_eq!(votes[0].weight, 0.9, epsilon = 1e-6);

        assert_eq!(votes[1].position, DVec2::new(14.0, 24.0));
        assert_eq!(votes[1].direction, DVec2::new(0.0, -1.0));
    }

    #[test]
    fn test_decode_no_evidence() {
        let field = VectorField::new(1, 2, 2, vec![0.1; 4], vec![1.0; 8]).unwrap();
        let votes = decode_channel(&field.channel(0).unwrap(), &DecoderParams::default());
        assert!(votes.is_empty());
    }

    #[test]
    fn test_decode_drops_non_finite() {
        let field = VectorField::new(1, 1, 2, vec![f32::NAN, 1.0], vec![1.0, 0.0, f32::INFINITY, 0.0])
            .unwrap();
        let votes = decode_channel(&field.channel(0).unwrap(), &DecoderParams::default());
        assert!(votes.is_empty());
    }
}
