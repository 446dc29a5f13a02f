use std::path::Path;

use contourpose_geometry::{CameraIntrinsics, CameraModel, PolynomialDistortion};
use serde::{Deserialize, Serialize};

use crate::error::IoError;

/// On-disk camera description: a 3x3 intrinsic matrix and optional distortion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraFile {
    /// Row-major intrinsic matrix.
    #[serde(alias = "K")]
    pub k: [[f64; 3]; 3],
    /// Polynomial distortion coefficients.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distortion: Option<PolynomialDistortion>,
}

impl CameraFile {
    /// Validate and convert to a camera model.
    pub fn into_model(self) -> Result<CameraModel, IoError> {
        let intrinsics = CameraIntrinsics::from_matrix(&self.k)?;
        let model = match self.distortion {
            Some(d) if d.has_distortion() => CameraModel::with_distortion(intrinsics, d),
            _ => CameraModel::pinhole(intrinsics),
        };
        model.validate()?;
        Ok(model)
    }
}

impl From<&CameraModel> for CameraFile {
    fn from(model: &CameraModel) -> Self {
        Self {
            k: model.intrinsics.to_matrix(),
            distortion: model.distortion,
        }
    }
}

/// Parse a camera from JSON text.
pub fn parse_camera(json: &str) -> Result<CameraModel, IoError> {
    serde_json::from_str::<CameraFile>(json)?.into_model()
}

/// Load a camera from a JSON file.
pub fn read_camera(path: impl AsRef<Path>) -> Result<CameraModel, IoError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(IoError::file(path))?;
    parse_camera(&text)
}

/// Write a camera as pretty-printed JSON.
pub fn write_camera(path: impl AsRef<Path>, camera: &CameraModel) -> Result<(), IoError> {
    let path = path.as_ref();
    let json = serde_json::to_string_pretty(&CameraFile::from(camera))?;
    std::fs::write(path, json).map_err(IoError::file(path))
}
