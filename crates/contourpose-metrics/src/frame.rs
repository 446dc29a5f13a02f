//! Per-frame pose accuracy metrics.

use contourpose_geometry::{relative_angle, CameraIntrinsics, Pose};
use glam::DVec3;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::model::ModelPoints;

/// Thresholds and unit conversion for the metrics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsParams {
    /// ADD passes below this fraction of the object diameter.
    pub add_diameter_fraction: f64,
    /// 2D projection error passes below this many pixels.
    pub projection_threshold_px: f64,
    /// Millimeters per model unit.
    pub units_to_mm: f64,
}

impl Default for MetricsParams {
    fn default() -> Self {
        Self {
            add_diameter_fraction: 0.1,
            projection_threshold_px: 5.0,
            units_to_mm: 1.0,
        }
    }
}

/// Mean distance between model points under the two poses.
pub fn add_error(pred: &Pose, gt: &Pose, points: &[DVec3]) -> f64 {
    if points.is_empty() {
        return 0.0;
    }
    let sum: f64 = points
        .par_iter()
        .map(|&p| pred.transform_point(p).distance(gt.transform_point(p)))
        .sum();
    sum / points.len() as f64
}

/// Mean closest-point distance, for objects with symmetries.
pub fn adds_error(pred: &Pose, gt: &Pose, points: &[DVec3]) -> f64 {
    if points.is_empty() {
        return 0.0;
    }
    let gt_points: Vec<DVec3> = points.iter().map(|&p| gt.transform_point(p)).collect();
    let sum: f64 = points
        .par_iter()
        .map(|&p| {
            let q = pred.transform_point(p);
            gt_points
                .iter()
                .map(|g| q.distance_squared(*g))
                .fold(f64::INFINITY, f64::min)
                .sqrt()
        })
        .sum();
    sum / points.len() as f64
}

/// Mean pixel distance between `points` projected under the two poses.
///
/// A point behind the camera under either pose makes the error infinite.
pub fn projection_error(pred: &Pose, gt: &Pose, points: &[DVec3], k: &CameraIntrinsics) -> f64 {
    if points.is_empty() {
        return 0.0;
    }
    let sum: f64 = points
        .par_iter()
        .map(|&p| {
            match (
                k.project(pred.transform_point(p)),
                k.project(gt.transform_point(p)),
            ) {
                (Some(a), Some(b)) => a.distance(b),
                _ => f64::INFINITY,
            }
        })
        .sum();
    sum / points.len() as f64
}

/// Angle of `R_pred^-1 * R_gt` in degrees.
pub fn rotation_error_deg(pred: &Pose, gt: &Pose) -> f64 {
    relative_angle(&pred.rotation, &gt.rotation).to_degrees()
}

/// Distance between the translations, in model units.
pub fn translation_error(pred: &Pose, gt: &Pose) -> f64 {
    pred.translation.distance(gt.translation)
}

/// All metrics for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameMetrics {
    /// ADD, or ADD-S for symmetric objects, in model units.
    pub add: f64,
    /// Whether ADD is below the diameter fraction.
    pub add_pass: bool,
    /// Mean 2D projection error of the 3D keypoints, in pixels.
    pub projection_error_px: f64,
    /// Whether the projection error is below the pixel threshold.
    pub projection_pass: bool,
    /// Rotation error in degrees.
    pub rotation_error_deg: f64,
    /// Translation error in millimeters.
    pub translation_error_mm: f64,
}

/// Compute every metric of `pred` against `gt`.
///
/// ADD uses the model points; the 2D projection error uses the 3D `keypoints`.
pub fn evaluate_pose(
    pred: &Pose,
    gt: &Pose,
    model: &ModelPoints,
    keypoints: &[DVec3],
    k: &CameraIntrinsics,
    params: &MetricsParams,
) -> FrameMetrics {
    let add = if model.is_symmetric() {
        adds_error(pred, gt, model.points())
    } else {
        add_error(pred, gt, model.points())
    };
    let projection_error_px = projection_error(pred, gt, keypoints, k);
    FrameMetrics {
        add,
        add_pass: add < params.add_diameter_fraction * model.diameter(),
        projection_error_px,
        projection_pass: projection_error_px < params.projection_threshold_px,
        rotation_error_deg: rotation_error_deg(pred, gt),
        translation_error_mm: translation_error(pred, gt) * params.units_to_mm,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn k() -> CameraIntrinsics {
        CameraIntrinsics::new(572.4114, 573.57043, 325.2611, 242.04899).unwrap()
    }

    fn box_points() -> Vec<DVec3> {
        let mut pts = Vec::new();
        for i in 0..5 {
            for j in 0..5 {
                for l in 0..3 {
                    pts.push(DVec3::new(i as f64 * 20.0 - 40.0, j as f64 * 15.0 - 30.0, l as f64 * 10.0 - 10.0));
                }
            }
        }
        pts
    }

    fn corners() -> Vec<DVec3> {
        (0..8)
            .map(|i| {
                DVec3::new(
                    if i & 1 == 0 { -40.0 } else { 40.0 },
                    if i & 2 == 0 { -30.0 } else { 30.0 },
                    if i & 4 == 0 { -10.0 } else { 10.0 },
                )
            })
            .collect()
    }

    #[test]
    fn test_identical_poses() {
        let pose = Pose::from_rvec(DVec3::new(0.3, -0.1, 0.7), DVec3::new(10.0, 5.0, 600.0));
        let model = ModelPoints::new(box_points(), None, false).unwrap();
        let m = evaluate_pose(&pose, &pose, &model, &corners(), &k(), &MetricsParams::default());
        assert_eq!(m.add, 0.0);
        assert_eq!(m.projection_error_px, 0.0);
        assert_eq!(m.translation_error_mm, 0.0);
        assert_relative_eq!(m.rotation_error_deg, 0.0, epsilon = 1e-6);
        assert!(m.add_pass);
        assert!(m.projection_pass);
    }

    #[test]
    fn test_pure_translation_offset() {
        let gt = Pose::from_rvec(DVec3::ZERO, DVec3::new(0.0, 0.0, 600.0));
        let pred = Pose::from_rvec(DVec3::ZERO, DVec3::new(3.0, 4.0, 600.0));
        let pts = box_points();
        assert_relative_eq!(add_error(&pred, &gt, &pts), 5.0, epsilon = 1e-12);
        assert_relative_eq!(translation_error(&pred, &gt), 5.0, epsilon = 1e-12);

        let params = MetricsParams {
            units_to_mm: 10.0,
            ..Default::default()
        };
        let model = ModelPoints::new(pts, None, false).unwrap();
        let m = evaluate_pose(&pred, &gt, &model, &corners(), &k(), &params);
        assert_relative_eq!(m.translation_error_mm, 50.0, epsilon = 1e-9);
    }

    #[test]
    fn test_rotation_error_degrees() {
        let gt = Pose::from_rvec(DVec3::new(0.0, 0.2, 0.0), DVec3::new(0.0, 0.0, 500.0));
        let pred = Pose::from_rvec(DVec3::new(0.0, 0.2 + 5f64.to_radians(), 0.0), gt.translation);
        assert_relative_eq!(rotation_error_deg(&pred, &gt), 5.0, epsilon = 1e-9);
    }

    #[test]
    fn test_adds_symmetric_flip() {
        // a box is symmetric under a half turn about z
        let pts = box_points();
        let gt = Pose::from_rvec(DVec3::ZERO, DVec3::new(0.0, 0.0, 600.0));
        let pred = Pose::from_rvec(DVec3::new(0.0, 0.0, std::f64::consts::PI), gt.translation);
        assert!(add_error(&pred, &gt, &pts) > 10.0);
        assert!(adds_error(&pred, &gt, &pts) < 1e-9);
    }

    #[test]
    fn test_projection_uses_keypoints() {
        // a far-off model point must not leak into the keypoint projection error
        let mut pts = box_points();
        pts.push(DVec3::new(0.0, 0.0, 400.0));
        let model = ModelPoints::new(pts, None, false).unwrap();
        let gt = Pose::from_rvec(DVec3::ZERO, DVec3::new(0.0, 0.0, 600.0));
        let pred = Pose::from_rvec(DVec3::new(0.0, 0.02, 0.0), gt.translation);

        let m = evaluate_pose(&pred, &gt, &model, &corners(), &k(), &MetricsParams::default());
        assert_relative_eq!(m.projection_error_px, projection_error(&pred, &gt, &corners(), &k()));
        assert!(m.projection_error_px != projection_error(&pred, &gt, model.points(), &k()));
    }

    #[test]
    fn test_projection_behind_camera() {
        let gt = Pose::from_rvec(DVec3::ZERO, DVec3::new(0.0, 0.0, 600.0));
        let pred = Pose::from_rvec(DVec3::ZERO, DVec3::new(0.0, 0.0, -600.0));
        let e = projection_error(&pred, &gt, &box_points(), &k());
        assert!(e.is_infinite());
    }
}
