use approx::assert_relative_eq;
use contourpose_geometry::{
    relative_angle, CameraIntrinsics, CameraModel, PolynomialDistortion, Pose,
};
use contourpose_pnp::{
    assess_conditioning, solve_pnp, ConditioningParams, Degeneracy, PnPError, PnPMethod,
};
use glam::{DVec2, DVec3};
use rand::{rngs::StdRng, Rng, SeedableRng};

fn linemod() -> CameraIntrinsics {
    CameraIntrinsics::new(572.4114, 573.57043, 325.2611, 242.04899).unwrap()
}

fn cube_keypoints() -> Vec<DVec3> {
    let mut pts = Vec::new();
    for &x in &[-45.0, 45.0] {
        for &y in &[-35.0, 35.0] {
            for &z in &[-25.0, 25.0] {
                pts.push(DVec3::new(x, y, z));
            }
        }
    }
    pts
}

fn random_pose(rng: &mut StdRng) -> Pose {
    let axis = DVec3::new(
        rng.random_range(-1.0..1.0),
        rng.random_range(-1.0..1.0),
        rng.random_range(-1.0..1.0),
    )
    .normalize_or(DVec3::Z);
    let angle = rng.random_range(0.0..std::f64::consts::PI * 0.9);
    Pose::from_rvec(
        axis * angle,
        DVec3::new(
            rng.random_range(-60.0..60.0),
            rng.random_range(-40.0..40.0),
            rng.random_range(450.0..900.0),
        ),
    )
}

fn project(camera: &CameraModel, world: &[DVec3], pose: &Pose) -> Vec<DVec2> {
    world
        .iter()
        .map(|&p| camera.project(pose.transform_point(p)).unwrap())
        .collect()
}

#[test]
fn solved_rotations_are_proper() -> Result<(), PnPError> {
    let camera = CameraModel::pinhole(linemod());
    let world = cube_keypoints();
    let mut rng = StdRng::seed_from_u64(2024);
    for _ in 0..25 {
        let pose = random_pose(&mut rng);
        let image: Vec<DVec2> = project(&camera, &world, &pose)
            .into_iter()
            .map(|uv| uv + DVec2::new(rng.random_range(-0.5..0.5), rng.random_range(-0.5..0.5)))
            .collect();
        for subset in [4usize, 5, 8] {
            let res = solve_pnp(
                &world[..subset],
                &image[..subset],
                None,
                &camera,
                &PnPMethod::Auto(Default::default()),
            )?;
            assert!(res.pose.is_proper_rotation(1e-9), "{:?}", res.pose);
        }
    }
    Ok(())
}

#[test]
fn reprojection_round_trip() -> Result<(), PnPError> {
    let camera = CameraModel::pinhole(linemod());
    let world = cube_keypoints();
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..10 {
        let pose = random_pose(&mut rng);
        let image = project(&camera, &world, &pose);
        let res = solve_pnp(&world, &image, None, &camera, &PnPMethod::Auto(Default::default()))?;
        for (&p, &uv) in world.iter().zip(&image) {
            let reproj = camera.project(res.pose.transform_point(p)).unwrap();
            assert!(reproj.distance(uv) < 1e-4);
        }
        assert!(relative_angle(&res.pose.rotation, &pose.rotation) < 1e-6);
        assert_relative_eq!(res.pose.translation.distance(pose.translation), 0.0, epsilon = 1e-3);
        assert_eq!(res.residuals.len(), world.len());
    }
    Ok(())
}

#[test]
fn distorted_observations() -> Result<(), PnPError> {
    let camera = CameraModel::with_distortion(
        linemod(),
        PolynomialDistortion::radial_tangential(-0.1, 0.03, 5e-4, -3e-4),
    );
    let world = cube_keypoints();
    let pose = Pose::from_rvec(DVec3::new(0.2, 0.6, -0.3), DVec3::new(-40.0, 30.0, 550.0));
    let image = project(&camera, &world, &pose);

    let res = solve_pnp(&world, &image, None, &camera, &PnPMethod::Auto(Default::default()))?;
    assert!(relative_angle(&res.pose.rotation, &pose.rotation) < 1e-5);
    assert!(res.pose.translation.distance(pose.translation) < 1e-2);
    Ok(())
}

#[test]
fn planar_keypoints_solve_and_flag() -> Result<(), PnPError> {
    let camera = CameraModel::pinhole(linemod());
    let world: Vec<DVec3> = cube_keypoints()
        .into_iter()
        .map(|p| DVec3::new(p.x + 0.3 * p.z, p.y, 0.0))
        .collect();
    let pose = Pose::from_rvec(DVec3::new(0.5, -0.3, 0.2), DVec3::new(10.0, 5.0, 600.0));
    let image = project(&camera, &world, &pose);

    let res = solve_pnp(&world, &image, None, &camera, &PnPMethod::Auto(Default::default()))?;
    assert!(res.reproj_rmse < 1e-3);
    assert!(relative_angle(&res.pose.rotation, &pose.rotation) < 1e-5);

    let weights = vec![1.0; world.len()];
    let cond = assess_conditioning(
        &world,
        &image,
        &weights,
        &camera.intrinsics,
        &res.pose,
        &ConditioningParams::default(),
    )?;
    assert!(matches!(cond.degeneracy, Some(Degeneracy::Coplanar { .. })));
    Ok(())
}

#[test]
fn well_posed_problem_is_not_flagged() -> Result<(), PnPError> {
    let camera = CameraModel::pinhole(linemod());
    let world = cube_keypoints();
    let pose = Pose::from_rvec(DVec3::new(0.1, 0.2, 0.3), DVec3::new(0.0, 0.0, 600.0));
    let image = project(&camera, &world, &pose);
    let weights = vec![1.0; world.len()];
    let cond = assess_conditioning(
        &world,
        &image,
        &weights,
        &camera.intrinsics,
        &pose,
        &ConditioningParams::default(),
    )?;
    assert!(cond.condition.is_finite());
    assert_eq!(cond.degeneracy, None);
    Ok(())
}

#[test]
fn too_few_pairs() {
    let camera = CameraModel::pinhole(linemod());
    let world = cube_keypoints();
    let image = vec![DVec2::new(320.0, 240.0); world.len()];
    for n in 0..4 {
        let err = solve_pnp(
            &world[..n],
            &image[..n],
            None,
            &camera,
            &PnPMethod::Auto(Default::default()),
        )
        .unwrap_err();
        assert_eq!(
            err,
            PnPError::InsufficientCorrespondences {
                required: 4,
                actual: n
            }
        );
    }
}
