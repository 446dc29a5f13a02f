use std::path::{Path, PathBuf};

use contourpose_geometry::Pose;
use serde::{Deserialize, Serialize};

use crate::error::IoError;

/// One evaluation frame: a field dump and its ground-truth pose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestFrame {
    /// Field dump path. Relative paths are resolved against the manifest directory on load.
    pub field: PathBuf,
    /// Row-major ground-truth rotation.
    pub rotation: [[f64; 3]; 3],
    /// Ground-truth translation in model units.
    pub translation: [f64; 3],
}

impl ManifestFrame {
    /// Ground-truth pose of the frame.
    pub fn pose(&self) -> Pose {
        Pose::from_arrays(&self.rotation, &self.translation)
    }
}

/// List of frames for an evaluation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationManifest {
    /// Frames to evaluate, in order.
    pub frames: Vec<ManifestFrame>,
}

impl EvaluationManifest {
    /// Load a manifest, resolving relative field paths against its directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(IoError::file(path))?;
        let mut manifest: Self = serde_json::from_str(&text)?;
        let base = path.parent().unwrap_or(Path::new(""));
        for frame in &mut manifest.frames {
            if frame.field.is_relative() {
                frame.field = base.join(&frame.field);
            }
        }
        log::debug!("loaded manifest {} with {} frames", path.display(), manifest.frames.len());
        Ok(manifest)
    }

    /// Write the manifest as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), IoError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(IoError::file(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec3;

    #[test]
    fn test_manifest_paths_are_relative_to_file() -> Result<(), IoError> {
        let dir = tempfile::tempdir()?;
        std::fs::create_dir(dir.path().join("eval"))?;
        let path = dir.path().join("eval").join("manifest.json");
        std::fs::write(
            &path,
            r#"{ "frames": [
                { "field": "dumps/0000.cpvf",
                  "rotation": [[1, 0, 0], [0, 0, -1], [0, 1, 0]],
                  "translation": [10, -20, 650] },
                { "field": "/abs/0001.cpvf",
                  "rotation": [[1, 0, 0], [0, 1, 0], [0, 0, 1]],
                  "translation": [0, 0, 500] }
            ] }"#,
        )?;

        let manifest = EvaluationManifest::load(&path)?;
        assert_eq!(manifest.frames.len(), 2);
        assert_eq!(manifest.frames[0].field, dir.path().join("eval/dumps/0000.cpvf"));
        assert_eq!(manifest.frames[1].field, PathBuf::from("/abs/0001.cpvf"));

        let pose = manifest.frames[0].pose();
        assert_eq!(pose.translation, DVec3::new(10.0, -20.0, 650.0));
        // second row of R is (0, 0, -1)
        let p = pose.transform_point(DVec3::new(0.0, 0.0, 1.0));
        assert_eq!(p, DVec3::new(10.0, -21.0, 650.0));
        Ok(())
    }

    #[test]
    fn test_manifest_missing_file() {
        assert!(matches!(
            EvaluationManifest::load("/nonexistent/manifest.json"),
            Err(IoError::File { .. })
        ));
    }
}
