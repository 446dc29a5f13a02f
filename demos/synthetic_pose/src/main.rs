use std::path::PathBuf;
use std::sync::Arc;

use argh::FromArgs;
use contourpose::geometry::{CameraIntrinsics, CameraModel, Pose};
use contourpose::io::{
    write_camera, write_field_dump, EvaluationManifest, ManifestFrame, ObjectTemplate,
};
use contourpose::metrics::evaluate_pose;
use contourpose::vote::{synthetic_field, SyntheticFieldParams};
use contourpose::{EstimatorConfig, PoseEstimator};
use glam::DVec3;
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Estimates the pose of a box from synthetic keypoint vector fields
#[derive(Debug, FromArgs)]
struct Args {
    /// random seed for the scene and the voting
    #[argh(option, short = 's', default = "0")]
    seed: u64,

    /// rays aimed at each keypoint
    #[argh(option, short = 'i', default = "50")]
    inliers: usize,

    /// rays with random directions per keypoint
    #[argh(option, short = 'o', default = "10")]
    outliers: usize,

    /// radius in pixels around the keypoint that inlier rays aim into
    #[argh(option, short = 'r', default = "2.0")]
    aim_radius: f64,

    /// number of frames to generate
    #[argh(option, short = 'n', default = "1")]
    frames: usize,

    /// optional JSON configuration file
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    /// write field dumps, camera, keypoints and manifest into this directory
    #[argh(option, short = 'd')]
    dump_dir: Option<PathBuf>,
}

/// Corners of a 100 x 80 x 70 mm box.
fn box_keypoints() -> Vec<DVec3> {
    (0..8)
        .map(|i| {
            DVec3::new(
                if i & 1 == 0 { -50.0 } else { 50.0 },
                if i & 2 == 0 { -40.0 } else { 40.0 },
                if i & 4 == 0 { -35.0 } else { 35.0 },
            )
        })
        .collect()
}

fn random_pose(rng: &mut StdRng) -> Pose {
    let axis = DVec3::new(
        rng.random_range(-1.0..1.0),
        rng.random_range(-1.0..1.0),
        rng.random_range(-1.0..1.0),
    )
    .normalize_or(DVec3::Z);
    let angle = rng.random_range(0.0..std::f64::consts::PI);
    let translation = DVec3::new(
        rng.random_range(-60.0..60.0),
        rng.random_range(-40.0..40.0),
        rng.random_range(500.0..900.0),
    );
    Pose::from_rvec(axis * angle, translation)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    let mut config = match &args.config {
        Some(path) => EstimatorConfig::load(path)?,
        None => EstimatorConfig::default(),
    };
    config.seed = args.seed;

    // LINEMOD intrinsics
    let camera =
        CameraModel::pinhole(CameraIntrinsics::new(572.4114, 573.57043, 325.2611, 242.04899)?);
    let template = Arc::new(ObjectTemplate::from_keypoints("box", box_keypoints(), false)?);
    let estimator = PoseEstimator::new(template.clone(), camera, config)?;

    let field_params = SyntheticFieldParams {
        inliers: args.inliers,
        outliers: args.outliers,
        aim_radius: args.aim_radius,
        ..Default::default()
    };

    if let Some(dir) = &args.dump_dir {
        std::fs::create_dir_all(dir)?;
        write_camera(dir.join("camera.json"), &camera)?;
        let rows: Vec<String> = template
            .keypoints
            .iter()
            .map(|p| format!("{} {} {}", p.x, p.y, p.z))
            .collect();
        std::fs::write(dir.join("box.txt"), rows.join("\n") + "\n")?;
    }

    let mut rng = StdRng::seed_from_u64(args.seed);
    let mut manifest = EvaluationManifest::default();
    for frame in 0..args.frames {
        let truth = random_pose(&mut rng);
        let targets: Vec<_> = template
            .keypoints
            .iter()
            .map(|&p| camera.project(truth.transform_point(p)))
            .collect();
        let field = synthetic_field(&targets, &field_params, &mut rng)?;

        let estimation = estimator.estimate(&field)?;
        let metrics = estimation.outcome.pose().map(|pose| {
            evaluate_pose(
                pose,
                &truth,
                &template.model,
                &template.keypoints,
                &camera.intrinsics,
                &config.metrics,
            )
        });
        match &metrics {
            Some(m) => log::info!(
                "frame {frame}: rotation error {:.3} deg, translation error {:.2} mm, ADD {:.2}",
                m.rotation_error_deg,
                m.translation_error_mm,
                m.add
            ),
            None => log::info!("frame {frame}: no pose"),
        }
        println!(
            "{}",
            serde_json::json!({
                "frame": frame,
                "truth": truth,
                "outcome": estimation.outcome,
                "metrics": metrics,
            })
        );

        if let Some(dir) = &args.dump_dir {
            let name = format!("{frame:04}.cpvf");
            write_field_dump(dir.join(&name), &field)?;
            manifest.frames.push(ManifestFrame {
                field: name.into(),
                rotation: truth.rotation_rows(),
                translation: truth.translation.to_array(),
            });
        }
    }

    if let Some(dir) = &args.dump_dir {
        manifest.save(dir.join("manifest.json"))?;
        log::info!("wrote {} frames to {}", manifest.frames.len(), dir.display());
    }

    Ok(())
}
