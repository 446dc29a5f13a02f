use glam::DVec3;
use rayon::prelude::*;
use thiserror::Error;

/// Errors raised when building evaluation data.
#[derive(Debug, Error, PartialEq)]
pub enum MetricsError {
    /// The model has no points.
    #[error("Model point set is empty")]
    EmptyModel,

    /// A model point is NaN or infinite.
    #[error("Non-finite model point at index {0}")]
    NonFinitePoint(usize),

    /// The object diameter must be finite and positive.
    #[error("Invalid object diameter {0}")]
    InvalidDiameter(f64),
}

/// Largest distance between any two points.
pub fn object_diameter(points: &[DVec3]) -> f64 {
    points
        .par_iter()
        .enumerate()
        .map(|(i, p)| {
            points[i + 1..]
                .iter()
                .map(|q| p.distance_squared(*q))
                .fold(0.0f64, f64::max)
        })
        .reduce(|| 0.0, f64::max)
        .sqrt()
}

/// Object model points used by the 3D metrics.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelPoints {
    points: Vec<DVec3>,
    diameter: f64,
    symmetric: bool,
}

impl ModelPoints {
    /// Build a model, computing the diameter from the points when not given.
    pub fn new(
        points: Vec<DVec3>,
        diameter: Option<f64>,
        symmetric: bool,
    ) -> Result<Self, MetricsError> {
        if points.is_empty() {
            return Err(MetricsError::EmptyModel);
        }
        if let Some(i) = points.iter().position(|p| !p.is_finite()) {
            return Err(MetricsError::NonFinitePoint(i));
        }
        let diameter = diameter.unwrap_or_else(|| object_diameter(&points));
        if !diameter.is_finite() || diameter <= 0.0 {
            return Err(MetricsError::InvalidDiameter(diameter));
        }
        Ok(Self {
            points,
            diameter,
            symmetric,
        })
    }

    /// Model points in object coordinates.
    pub fn points(&self) -> &[DVec3] {
        &self.points
    }

    /// Object diameter in model units.
    pub fn diameter(&self) -> f64 {
        self.diameter
    }

    /// Whether ADD-S is used instead of ADD.
    pub fn is_symmetric(&self) -> bool {
        self.symmetric
    }
}
