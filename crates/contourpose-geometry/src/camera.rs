//! Pinhole camera intrinsics with optional Brown-Conrady distortion.

use glam::{DVec2, DVec3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error types for camera operations.
#[derive(Debug, Error, PartialEq)]
pub enum CameraError {
    /// Invalid camera intrinsics matrix.
    #[error("Invalid camera intrinsics: {0}")]
    InvalidIntrinsics(String),

    /// Invalid distortion parameters.
    #[error("Invalid distortion parameters: {0}")]
    InvalidDistortion(String),
}

/// Result type for camera operations.
pub type CameraResult<T> = Result<T, CameraError>;

/// Intrinsic parameters of a pinhole camera, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    /// Focal length in x direction.
    pub fx: f64,
    /// Focal length in y direction.
    pub fy: f64,
    /// Principal point x coordinate.
    pub cx: f64,
    /// Principal point y coordinate.
    pub cy: f64,
}

impl CameraIntrinsics {
    /// Create validated camera intrinsics from focal lengths and principal point.
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> CameraResult<Self> {
        let intrinsics = Self { fx, fy, cx, cy };
        intrinsics.validate()?;
        Ok(intrinsics)
    }

    /// Create camera intrinsics from a row-major 3x3 intrinsics matrix.
    ///
    /// The matrix must have the form `[[fx, 0, cx], [0, fy, cy], [0, 0, 1]]`.
    pub fn from_matrix(k: &[[f64; 3]; 3]) -> CameraResult<Self> {
        const SKEW_TOL: f64 = 1e-9;
        if k[0][1].abs() > SKEW_TOL
            || k[1][0].abs() > SKEW_TOL
            || k[2][0].abs() > SKEW_TOL
            || k[2][1].abs() > SKEW_TOL
            || (k[2][2] - 1.0).abs() > SKEW_TOL
        {
            return Err(CameraError::InvalidIntrinsics(
                "matrix must have form [[fx, 0, cx], [0, fy, cy], [0, 0, 1]]".to_string(),
            ));
        }
        Self::new(k[0][0], k[1][1], k[0][2], k[1][2])
    }

    /// Row-major 3x3 intrinsics matrix.
    pub fn to_matrix(&self) -> [[f64; 3]; 3] {
        [
            [self.fx, 0.0, self.cx],
            [0.0, self.fy, self.cy],
            [0.0, 0.0, 1.0],
        ]
    }

    /// Check that all parameters are finite and the focal lengths positive.
    pub fn validate(&self) -> CameraResult<()> {
        if ![self.fx, self.fy, self.cx, self.cy]
            .iter()
            .all(|v| v.is_finite())
        {
            return Err(CameraError::InvalidIntrinsics(format!(
                "non-finite parameter in {self:?}"
            )));
        }
        if self.fx <= 0.0 || self.fy <= 0.0 {
            return Err(CameraError::InvalidIntrinsics(format!(
                "focal lengths must be positive, got fx={} fy={}",
                self.fx, self.fy
            )));
        }
        Ok(())
    }

    /// Project a camera-frame point to pixels. Returns `None` behind the camera.
    #[inline]
    pub fn project(&self, pc: DVec3) -> Option<DVec2> {
        if pc.z <= 0.0 {
            return None;
        }
        let inv_z = 1.0 / pc.z;
        Some(DVec2::new(
            self.fx * pc.x * inv_z + self.cx,
            self.fy * pc.y * inv_z + self.cy,
        ))
    }

    /// Pixel -> normalized image coordinates (`K^-1 * [u, v, 1]`).
    #[inline]
    pub fn normalize(&self, uv: DVec2) -> DVec2 {
        DVec2::new((uv.x - self.cx) / self.fx, (uv.y - self.cy) / self.fy)
    }

    /// Normalized image coordinates -> pixel.
    #[inline]
    pub fn denormalize(&self, xy: DVec2) -> DVec2 {
        DVec2::new(self.fx * xy.x + self.cx, self.fy * xy.y + self.cy)
    }
}

/// Polynomial distortion parameters using the Brown-Conrady model.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PolynomialDistortion {
    /// First radial coefficient.
    pub k1: f64,
    /// Second radial coefficient.
    pub k2: f64,
    /// Third radial coefficient.
    pub k3: f64,
    /// First rational denominator coefficient.
    pub k4: f64,
    /// Second rational denominator coefficient.
    pub k5: f64,
    /// Third rational denominator coefficient.
    pub k6: f64,
    /// First tangential coefficient.
    pub p1: f64,
    /// Second tangential coefficient.
    pub p2: f64,
}

impl PolynomialDistortion {
    /// Distortion with only the first two radial coefficients.
    pub fn radial(k1: f64, k2: f64) -> Self {
        Self {
            k1,
            k2,
            ..Default::default()
        }
    }

    /// Distortion with radial and tangential coefficients.
    pub fn radial_tangential(k1: f64, k2: f64, p1: f64, p2: f64) -> Self {
        Self {
            k1,
            k2,
            p1,
            p2,
            ..Default::default()
        }
    }

    /// Check if there is any distortion.
    pub fn has_distortion(&self) -> bool {
        [
            self.k1, self.k2, self.k3, self.k4, self.k5, self.k6, self.p1, self.p2,
        ]
        .iter()
        .any(|&c| c != 0.0)
    }

    /// Distort a normalized image point.
    #[inline]
    pub fn distort_normalized(&self, p: DVec2) -> DVec2 {
        let (x, y) = (p.x, p.y);
        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let r6 = r4 * r2;

        let kr = (1.0 + self.k1 * r2 + self.k2 * r4 + self.k3 * r6)
            / (1.0 + self.k4 * r2 + self.k5 * r4 + self.k6 * r6);

        let xy2 = 2.0 * x * y;
        DVec2::new(
            x * kr + self.p1 * xy2 + self.p2 * (r2 + 2.0 * x * x),
            y * kr + self.p1 * (r2 + 2.0 * y * y) + self.p2 * xy2,
        )
    }

    /// Invert [`Self::distort_normalized`] by fixed-point iteration.
    pub fn undistort_normalized(&self, distorted: DVec2) -> DVec2 {
        const MAX_ITERATIONS: usize = 20;
        const EPSILON: f64 = 1e-12;

        let mut p = distorted;
        for _ in 0..MAX_ITERATIONS {
            let delta = distorted - self.distort_normalized(p);
            p += delta;
            if delta.x.abs() < EPSILON && delta.y.abs() < EPSILON {
                break;
            }
        }
        p
    }
}

/// A complete camera model with intrinsics and optional distortion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraModel {
    /// Camera intrinsics.
    pub intrinsics: CameraIntrinsics,
    /// Distortion parameters, `None` for an ideal pinhole.
    #[serde(default)]
    pub distortion: Option<PolynomialDistortion>,
}

impl CameraModel {
    /// Camera model without distortion.
    pub fn pinhole(intrinsics: CameraIntrinsics) -> Self {
        Self {
            intrinsics,
            distortion: None,
        }
    }

    /// Camera model with distortion.
    pub fn with_distortion(intrinsics: CameraIntrinsics, distortion: PolynomialDistortion) -> Self {
        Self {
            intrinsics,
            distortion: Some(distortion),
        }
    }

    /// Whether the model carries non-zero distortion.
    pub fn has_distortion(&self) -> bool {
        self.distortion.is_some_and(|d| d.has_distortion())
    }

    /// Validate intrinsics and distortion coefficients.
    pub fn validate(&self) -> CameraResult<()> {
        self.intrinsics.validate()?;
        if let Some(d) = &self.distortion {
            let coeffs = [d.k1, d.k2, d.k3, d.k4, d.k5, d.k6, d.p1, d.p2];
            if !coeffs.iter().all(|c| c.is_finite()) {
                return Err(CameraError::InvalidDistortion(format!(
                    "non-finite coefficient in {d:?}"
                )));
            }
        }
        Ok(())
    }

    /// Project a camera-frame point to (distorted) pixels.
    pub fn project(&self, pc: DVec3) -> Option<DVec2> {
        if pc.z <= 0.0 {
            return None;
        }
        let xy = DVec2::new(pc.x / pc.z, pc.y / pc.z);
        let xy = match &self.distortion {
            Some(d) => d.distort_normalized(xy),
            None => xy,
        };
        Some(self.intrinsics.denormalize(xy))
    }

    /// Remove lens distortion from a pixel, returning an ideal pinhole pixel.
    pub fn undistort_point(&self, uv: DVec2) -> DVec2 {
        match &self.distortion {
            Some(d) if d.has_distortion() => {
                let xy = d.undistort_normalized(self.intrinsics.normalize(uv));
                self.intrinsics.denormalize(xy)
            }
            _ => uv,
        }
    }

    /// Remove lens distortion from a set of pixels.
    pub fn undistort_points(&self, points: &[DVec2]) -> Vec<DVec2> {
        points.iter().map(|&uv| self.undistort_point(uv)).collect()
    }
}
