use std::path::Path;

use contourpose_io::IoError;
use contourpose_metrics::MetricsParams;
use contourpose_pnp::{ConditioningParams, PnPParams};
use contourpose_vote::VotingParams;
use serde::{Deserialize, Serialize};

/// Every tunable of the pipeline.
///
/// All fields have defaults, so a JSON file only needs the values it overrides:
///
/// ```rust
/// use contourpose::EstimatorConfig;
///
/// let config = EstimatorConfig::from_json(r#"{ "voting": { "vote": { "iterations": 512 } }, "seed": 7 }"#)?;
/// assert_eq!(config.voting.vote.iterations, 512);
/// assert_eq!(config.voting.vote.inlier_tolerance, 3.0);
/// assert_eq!(config.seed, 7);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Decode, vote and aggregate parameters.
    pub voting: VotingParams,
    /// Linear solve and refinement parameters.
    pub pnp: PnPParams,
    /// Degeneracy thresholds for low-confidence reporting.
    pub conditioning: ConditioningParams,
    /// Evaluation thresholds.
    pub metrics: MetricsParams,
    /// Seed of the voting random source.
    pub seed: u64,
}

impl EstimatorConfig {
    /// Parse a configuration from JSON text.
    pub fn from_json(json: &str) -> Result<Self, IoError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| IoError::File {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_is_default() -> Result<(), IoError> {
        assert_eq!(EstimatorConfig::from_json("{}")?, EstimatorConfig::default());
        Ok(())
    }

    #[test]
    fn test_partial_override() -> Result<(), IoError> {
        let config = EstimatorConfig::from_json(
            r#"{
                "pnp": { "refine_lm": null, "planar_ratio": 0.1 },
                "metrics": { "projection_threshold_px": 2.0 }
            }"#,
        )?;
        assert_eq!(config.pnp.refine_lm, None);
        assert_eq!(config.pnp.planar_ratio, 0.1);
        assert_eq!(config.metrics.projection_threshold_px, 2.0);
        assert_eq!(config.metrics.add_diameter_fraction, 0.1);
        assert_eq!(config.voting, VotingParams::default());
        Ok(())
    }

    #[test]
    fn test_load_and_roundtrip() -> Result<(), IoError> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("config.json");
        let mut config = EstimatorConfig::default();
        config.seed = 99;
        config.voting.decoder.confidence_threshold = 0.7;
        std::fs::write(&path, serde_json::to_string_pretty(&config)?)?;
        assert_eq!(EstimatorConfig::load(&path)?, config);
        assert!(EstimatorConfig::load(dir.path().join("missing.json")).is_err());
        Ok(())
    }
}
