use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use contourpose_geometry::{CameraIntrinsics, CameraModel, Pose};
use contourpose_pnp as cpnp;
use glam::{DVec2, DVec3};
use rand::{rngs::StdRng, Rng, SeedableRng};

type PnpDataset = (Vec<DVec3>, Vec<DVec2>, CameraModel);

fn generate_object_dataset(num_points: usize, noise_px: f64, seed: u64) -> PnpDataset {
    let k = CameraIntrinsics::new(572.4114, 573.57043, 325.2611, 242.04899).unwrap();
    let pose = Pose::from_rvec(DVec3::new(0.3, -0.5, 0.2), DVec3::new(20.0, -15.0, 650.0));

    let mut rng = StdRng::seed_from_u64(seed);
    let world: Vec<DVec3> = (0..num_points)
        .map(|_| {
            DVec3::new(
                rng.random_range(-60.0..60.0),
                rng.random_range(-60.0..60.0),
                rng.random_range(-40.0..40.0),
            )
        })
        .collect();
    let image = world
        .iter()
        .map(|&p| {
            let uv = k.project(pose.transform_point(p)).unwrap();
            uv + DVec2::new(
                rng.random_range(-noise_px..noise_px),
                rng.random_range(-noise_px..noise_px),
            )
        })
        .collect();
    (world, image, CameraModel::pinhole(k))
}

fn bench_methods(c: &mut Criterion) {
    let methods = [
        ("epnp", cpnp::PnPMethod::EPnPDefault),
        ("dlt", cpnp::PnPMethod::Dlt(Default::default())),
        ("auto", cpnp::PnPMethod::Auto(Default::default())),
    ];
    for (name, method) in &methods {
        let mut group = c.benchmark_group(format!("pnp_{name}"));
        for &n in &[8usize, 16, 64] {
            let (world, image, camera) = generate_object_dataset(n, 0.5, 42);
            group.throughput(Throughput::Elements(n as u64));
            group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
                b.iter(|| {
                    let res = cpnp::solve_pnp(&world, &image, None, &camera, method).unwrap();
                    std::hint::black_box(res);
                });
            });
        }
        group.finish();
    }
}

fn bench_conditioning(c: &mut Criterion) {
    let (world, image, camera) = generate_object_dataset(8, 0.5, 7);
    let res = cpnp::solve_pnp(&world, &image, None, &camera, &cpnp::PnPMethod::EPnPDefault).unwrap();
    let weights = vec![1.0; world.len()];
    c.bench_function("assess_conditioning_8", |b| {
        b.iter(|| {
            std::hint::black_box(
                cpnp::assess_conditioning(
                    &world,
                    &image,
                    &weights,
                    &camera.intrinsics,
                    &res.pose,
                    &Default::default(),
                )
                .unwrap(),
            )
        })
    });
}

criterion_group!(benches, bench_methods, bench_conditioning);
criterion_main!(benches);
