use contourpose_geometry::{CameraIntrinsics, Pose};
use glam::{DVec2, DVec3};
use nalgebra::{DMatrix, DVector, SymmetricEigen};

use crate::pnp::{PnPError, PnPResult};

/// Validate a weighted correspondence set.
pub(crate) fn check_inputs(
    world: &[DVec3],
    image: &[DVec2],
    weights: &[f64],
    required: usize,
) -> Result<(), PnPError> {
    if world.len() != image.len() {
        return Err(PnPError::MismatchedArrayLengths {
            left_name: "world points",
            left_len: world.len(),
            right_name: "image points",
            right_len: image.len(),
        });
    }
    if world.len() != weights.len() {
        return Err(PnPError::MismatchedArrayLengths {
            left_name: "world points",
            left_len: world.len(),
            right_name: "weights",
            right_len: weights.len(),
        });
    }
    if world.len() < required {
        return Err(PnPError::InsufficientCorrespondences {
            required,
            actual: world.len(),
        });
    }
    if let Some(index) = world.iter().position(|p| !p.is_finite()) {
        return Err(PnPError::NonFiniteInput {
            name: "world points",
            index,
        });
    }
    if let Some(index) = image.iter().position(|p| !p.is_finite()) {
        return Err(PnPError::NonFiniteInput {
            name: "image points",
            index,
        });
    }
    if let Some(index) = weights.iter().position(|w| !w.is_finite() || *w <= 0.0) {
        return Err(PnPError::InvalidWeight {
            index,
            value: weights[index],
        });
    }
    Ok(())
}

/// Pixel -> normalized image coordinates.
pub(crate) fn normalize_image(image: &[DVec2], k: &CameraIntrinsics) -> Vec<DVec2> {
    image.iter().map(|&uv| k.normalize(uv)).collect()
}

/// Reprojection error of each correspondence in pixels.
///
/// Points at or behind the camera report an infinite error.
pub fn reprojection_errors(
    world: &[DVec3],
    image: &[DVec2],
    pose: &Pose,
    k: &CameraIntrinsics,
) -> Vec<f64> {
    world
        .iter()
        .zip(image)
        .map(|(&pw, &uv)| match k.project(pose.transform_point(pw)) {
            Some(proj) => proj.distance(uv),
            None => f64::INFINITY,
        })
        .collect()
}

/// Weighted RMS of per-correspondence pixel errors.
pub fn weighted_rmse(errors: &[f64], weights: &[f64]) -> f64 {
    let (num, den) = errors
        .iter()
        .zip(weights)
        .fold((0.0, 0.0), |(num, den), (&e, &w)| (num + w * e * e, den + w));
    if den > 0.0 {
        (num / den).sqrt()
    } else {
        f64::INFINITY
    }
}

/// Package a pose as a solver result, scoring it against the correspondences.
pub(crate) fn score_pose(
    world: &[DVec3],
    image: &[DVec2],
    weights: &[f64],
    k: &CameraIntrinsics,
    pose: Pose,
) -> PnPResult {
    let residuals = reprojection_errors(world, image, &pose, k);
    let reproj_rmse = weighted_rmse(&residuals, weights);
    PnPResult {
        pose,
        reproj_rmse,
        residuals,
        num_iterations: None,
        converged: None,
    }
}

/// Eigenvectors of `a^T a` for the `count` smallest eigenvalues, ascending.
///
/// Unlike a thin SVD of `a` this also works when `a` has fewer rows than columns.
pub(crate) fn null_space(a: &DMatrix<f64>, count: usize) -> Result<Vec<DVector<f64>>, PnPError> {
    let ata = a.transpose() * a;
    if !ata.iter().all(|v| v.is_finite()) {
        return Err(PnPError::DecompositionFailed("non-finite design matrix"));
    }
    let eigen = SymmetricEigen::new(ata);
    let mut order: Vec<usize> = (0..eigen.eigenvalues.len()).collect();
    order.sort_by(|&i, &j| eigen.eigenvalues[i].total_cmp(&eigen.eigenvalues[j]));
    Ok(order
        .into_iter()
        .take(count)
        .map(|i| eigen.eigenvectors.column(i).into_owned())
        .collect())
}

/// Similarity normalization of 3D points: centroid to origin, mean distance `sqrt(3)`.
pub(crate) fn normalize_world(world: &[DVec3]) -> (Vec<DVec3>, DVec3, f64) {
    let c = contourpose_geometry::linalg::centroid(world);
    let mean_dist = world.iter().map(|p| p.distance(c)).sum::<f64>() / world.len().max(1) as f64;
    let s = if mean_dist > 0.0 {
        3f64.sqrt() / mean_dist
    } else {
        1.0
    };
    (world.iter().map(|&p| (p - c) * s).collect(), c, s)
}

/// Whether most points lie in front of the camera under `pose`.
pub(crate) fn in_front(world: &[DVec3], pose: &Pose) -> bool {
    let ahead = world
        .iter()
        .filter(|&&p| pose.transform_point(p).z > 0.0)
        .count();
    2 * ahead > world.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_check_inputs() {
        let w = [DVec3::ZERO; 4];
        let i = [DVec2::ZERO; 4];
        assert!(check_inputs(&w, &i, &[1.0; 4], 4).is_ok());
        assert_eq!(
            check_inputs(&w, &i[..3], &[1.0; 4], 4),
            Err(PnPError::MismatchedArrayLengths {
                left_name: "world points",
                left_len: 4,
                right_name: "image points",
                right_len: 3,
            })
        );
        assert_eq!(
            check_inputs(&w[..3], &i[..3], &[1.0; 3], 4),
            Err(PnPError::InsufficientCorrespondences {
                required: 4,
                actual: 3
            })
        );
        assert_eq!(
            check_inputs(&w, &i, &[1.0, 0.0, 1.0, 1.0], 4),
            Err(PnPError::InvalidWeight {
                index: 1,
                value: 0.0
            })
        );
        let mut bad = w;
        bad[2].y = f64::NAN;
        assert_eq!(
            check_inputs(&bad, &i, &[1.0; 4], 4),
            Err(PnPError::NonFiniteInput {
                name: "world points",
                index: 2
            })
        );
    }

    #[test]
    fn test_weighted_rmse() {
        assert_relative_eq!(weighted_rmse(&[1.0, 3.0], &[1.0, 1.0]), 5f64.sqrt());
        assert_relative_eq!(weighted_rmse(&[1.0, 3.0], &[3.0, 1.0]), 3f64.sqrt());
        assert!(weighted_rmse(&[], &[]).is_infinite());
    }

    #[test]
    fn test_null_space_wide_matrix() {
        // 2x3 matrix with null vector (1, 1, 1) / sqrt(3)
        let a = DMatrix::from_row_slice(2, 3, &[1.0, -1.0, 0.0, 0.0, 1.0, -1.0]);
        let ns = null_space(&a, 1).unwrap();
        let v = &ns[0];
        assert_relative_eq!(v[0].abs(), 1.0 / 3f64.sqrt(), epsilon = 1e-9);
        assert_relative_eq!(v[0], v[1], epsilon = 1e-9);
        assert_relative_eq!(v[1], v[2], epsilon = 1e-9);
    }

    #[test]
    fn test_normalize_world() {
        let pts = [
            DVec3::new(10.0, 0.0, 0.0),
            DVec3::new(-10.0, 0.0, 0.0),
            DVec3::new(0.0, 10.0, 5.0),
            DVec3::new(0.0, -10.0, -5.0),
        ];
        let (norm, c, s) = normalize_world(&pts);
        assert_relative_eq!(c.length(), 0.0);
        let mean = norm.iter().map(|p| p.length()).sum::<f64>() / 4.0;
        assert_relative_eq!(mean, 3f64.sqrt(), epsilon = 1e-12);
        assert!(s > 0.0);
    }
}
