use std::io::BufRead;
use std::path::Path;

use contourpose_metrics::ModelPoints;
use glam::DVec3;

use crate::error::IoError;
use crate::ply::read_ply_points;

/// Parse keypoint rows of `x y z`, skipping blank lines and `#` comments.
pub fn parse_keypoints<R: BufRead>(reader: R) -> Result<Vec<DVec3>, IoError> {
    let mut keypoints = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let content = line.split('#').next().unwrap_or_default().trim();
        if content.is_empty() {
            continue;
        }
        let error = |message: String| IoError::Template {
            line: i + 1,
            message,
        };
        let values = content
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|t| !t.is_empty())
            .map(|t| t.parse::<f64>().map_err(|_| error(format!("invalid number {t:?}"))))
            .collect::<Result<Vec<_>, _>>()?;
        let [x, y, z] = values[..] else {
            return Err(error(format!("expected 3 values, found {}", values.len())));
        };
        let p = DVec3::new(x, y, z);
        if !p.is_finite() {
            return Err(error("non-finite coordinate".into()));
        }
        keypoints.push(p);
    }
    Ok(keypoints)
}

/// Load the 3D keypoints of an object from a text file.
pub fn read_keypoints(path: impl AsRef<Path>) -> Result<Vec<DVec3>, IoError> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(IoError::file(path))?;
    parse_keypoints(std::io::BufReader::new(file))
}

/// Fixed 3D data of one object class, shared read-only by every estimate.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectTemplate {
    /// Class name.
    pub name: String,
    /// 3D keypoints in object coordinates, in network channel order.
    pub keypoints: Vec<DVec3>,
    /// Model points for evaluation.
    pub model: ModelPoints,
}

impl ObjectTemplate {
    /// Build a template, checking that there is at least one keypoint.
    pub fn new(
        name: impl Into<String>,
        keypoints: Vec<DVec3>,
        model: ModelPoints,
    ) -> Result<Self, IoError> {
        if keypoints.is_empty() {
            return Err(IoError::Template {
                line: 0,
                message: "no keypoints".into(),
            });
        }
        Ok(Self {
            name: name.into(),
            keypoints,
            model,
        })
    }

    /// Template whose model points are the keypoints themselves.
    pub fn from_keypoints(
        name: impl Into<String>,
        keypoints: Vec<DVec3>,
        symmetric: bool,
    ) -> Result<Self, IoError> {
        let model = ModelPoints::new(keypoints.clone(), None, symmetric)?;
        Self::new(name, keypoints, model)
    }

    /// Load keypoints from text and model points from PLY.
    ///
    /// The class name is taken from the keypoint file stem.
    pub fn load(
        keypoints_path: impl AsRef<Path>,
        model_path: impl AsRef<Path>,
        diameter: Option<f64>,
        symmetric: bool,
    ) -> Result<Self, IoError> {
        let keypoints_path = keypoints_path.as_ref();
        let name = keypoints_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let keypoints = read_keypoints(keypoints_path)?;
        let points = read_ply_points(model_path)?;
        let model = ModelPoints::new(points, diameter, symmetric)?;
        log::debug!(
            "loaded template {name}: {} keypoints, {} model points, diameter {:.3}",
            keypoints.len(),
            model.points().len(),
            model.diameter()
        );
        Self::new(name, keypoints, model)
    }

    /// Number of keypoints `K`.
    pub fn num_keypoints(&self) -> usize {
        self.keypoints.len()
    }
}
