//! Synthetic vector fields for testing and benchmarking.

use glam::DVec2;
use rand::seq::index;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::FieldError;
use crate::field::VectorField;

/// Recipe for a synthetic field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticFieldParams {
    /// Grid height.
    pub height: usize,
    /// Grid width.
    pub width: usize,
    /// Image position of grid cell `(0, 0)`.
    pub origin: DVec2,
    /// Image pixels per grid cell.
    pub stride: f64,
    /// Confident pixels aimed at the keypoint.
    pub inliers: usize,
    /// Confident pixels with a random direction.
    pub outliers: usize,
    /// Radius in pixels of the disk each inlier is aimed into.
    pub aim_radius: f64,
}

impl Default for SyntheticFieldParams {
    fn default() -> Self {
        Self {
            height: 120,
            width: 160,
            origin: DVec2::ZERO,
            stride: 4.0,
            inliers: 50,
            outliers: 10,
            aim_radius: 2.0,
        }
    }
}

/// Build a field whose channel `k` votes for `targets[k]`.
///
/// A `None` target yields an empty channel.
pub fn synthetic_field<R: Rng + ?Sized>(
    targets: &[Option<DVec2>],
    params: &SyntheticFieldParams,
    rng: &mut R,
) -> Result<VectorField, FieldError> {
    let plane = params.height * params.width;
    let mut confidence = vec![0.0f32; targets.len() * plane];
    let mut directions = vec![0.0f32; targets.len() * plane * 2];

    for (k, target) in targets.iter().enumerate() {
        let Some(target) = *target else {
            continue;
        };
        let amount = (params.inliers + params.outliers).min(plane);
        let cells = index::sample(rng, plane, amount);

        for (n, cell) in cells.into_iter().enumerate() {
            let row = (cell / params.width) as f64;
            let col = (cell % params.width) as f64;
            let position = params.origin + DVec2::new(col, row) * params.stride;

            let direction = if n < params.inliers {
                let offset = DVec2::new(rng.random_range(-1.0..=1.0), rng.random_range(-1.0..=1.0))
                    .clamp_length_max(1.0)
                    * params.aim_radius;
                target + offset - position
            } else {
                let angle = rng.random_range(0.0..std::f64::consts::TAU);
                DVec2::new(angle.cos(), angle.sin())
            };

            let at = k * plane + cell;
            confidence[at] = rng.random_range(0.6f32..=1.0);
            directions[2 * at] = direction.x as f32;
            directions[2 * at + 1] = direction.y as f32;
        }
    }

    VectorField::new(
        targets.len(),
        params.height,
        params.width,
        confidence,
        directions,
    )?
    .with_placement(params.origin, params.stride)
}
