use std::path::PathBuf;
use std::sync::Arc;

use argh::FromArgs;
use contourpose::io::{read_camera, read_keypoints, EvaluationManifest, ObjectTemplate};
use contourpose::metrics::ModelPoints;
use contourpose::{EstimatorConfig, PoseEstimator};

/// Evaluates pose estimates over a manifest of field dumps
#[derive(Debug, FromArgs)]
struct Args {
    /// path to the evaluation manifest
    #[argh(positional)]
    manifest: PathBuf,

    /// camera JSON file
    #[argh(option, short = 'k')]
    camera: PathBuf,

    /// keypoint template text file
    #[argh(option, short = 'p')]
    keypoints: PathBuf,

    /// PLY model for the 3D metrics, defaults to the keypoints
    #[argh(option, short = 'm')]
    model: Option<PathBuf>,

    /// object diameter in model units, computed from the model when absent
    #[argh(option)]
    diameter: Option<f64>,

    /// use ADD-S for a symmetric object
    #[argh(switch)]
    symmetric: bool,

    /// optional JSON configuration file
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    /// write the report here instead of stdout
    #[argh(option, short = 'o')]
    output: Option<PathBuf>,

    /// include per-frame records in the output
    #[argh(switch, short = 'f')]
    frames: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    let config = match &args.config {
        Some(path) => EstimatorConfig::load(path)?,
        None => EstimatorConfig::default(),
    };
    let camera = read_camera(&args.camera)?;
    let template = match &args.model {
        Some(model) => ObjectTemplate::load(&args.keypoints, model, args.diameter, args.symmetric)?,
        None => {
            let name = args
                .keypoints
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let keypoints = read_keypoints(&args.keypoints)?;
            let model = ModelPoints::new(keypoints.clone(), args.diameter, args.symmetric)?;
            ObjectTemplate::new(name, keypoints, model)?
        }
    };
    let manifest = EvaluationManifest::load(&args.manifest)?;
    log::info!(
        "evaluating {} on {} frames",
        template.name,
        manifest.frames.len()
    );

    let estimator = PoseEstimator::new(Arc::new(template), camera, config)?;
    let run = estimator.evaluate_manifest(&manifest)?;

    let json = if args.frames {
        serde_json::to_string_pretty(&run)?
    } else {
        serde_json::to_string_pretty(&run.report)?
    };
    match &args.output {
        Some(path) => std::fs::write(path, json)?,
        None => println!("{json}"),
    }

    Ok(())
}
