//! Small dense linear algebra helpers shared by the solvers.

use glam::{DMat3, DVec3};
use nalgebra::{Matrix3, SymmetricEigen};
use thiserror::Error;

use crate::pose::Pose;

/// Error type for rigid alignment operations.
#[derive(Debug, Error, PartialEq)]
pub enum LinalgError {
    /// Source and destination arrays must have the same length.
    #[error("Source and destination arrays must have the same length ({src} != {dst})")]
    MismatchedInputLengths {
        /// Number of source points.
        src: usize,
        /// Number of destination points.
        dst: usize,
    },

    /// At least one point is required.
    #[error("Empty point set")]
    EmptyInput,

    /// SVD did not produce singular vectors.
    #[error("SVD decomposition failed")]
    SvdFailed,
}

/// glam (column-major) -> nalgebra.
#[inline]
pub fn dmat3_to_na(m: &DMat3) -> Matrix3<f64> {
    Matrix3::from_column_slice(&m.to_cols_array())
}

/// nalgebra -> glam (column-major).
#[inline]
pub fn na_to_dmat3(m: &Matrix3<f64>) -> DMat3 {
    DMat3::from_cols_slice(m.as_slice())
}

/// Outer product `a * b^T`.
#[inline]
pub fn outer(a: DVec3, b: DVec3) -> DMat3 {
    DMat3::from_cols(a * b.x, a * b.y, a * b.z)
}

/// Project a 3x3 matrix onto the closest proper rotation (Frobenius norm).
///
/// Returns `None` if the SVD fails or the input is not finite.
pub fn orthogonalize_rotation(m: &DMat3) -> Option<DMat3> {
    if !m.is_finite() {
        return None;
    }
    let svd = dmat3_to_na(m).svd(true, true);
    let u = svd.u?;
    let v_t = svd.v_t?;

    // the sign correction goes on the weakest direction
    let mut d = Matrix3::identity();
    if (u * v_t).determinant() < 0.0 {
        let imin = svd.singular_values.imin();
        d[(imin, imin)] = -1.0;
    }
    Some(na_to_dmat3(&(u * d * v_t)))
}

/// Mean of a set of points. Returns zero for an empty slice.
pub fn centroid(points: &[DVec3]) -> DVec3 {
    if points.is_empty() {
        return DVec3::ZERO;
    }
    points.iter().fold(DVec3::ZERO, |acc, &p| acc + p) / points.len() as f64
}

/// Apply a rigid transform to every point.
pub fn transform_points(pose: &Pose, points: &[DVec3]) -> Vec<DVec3> {
    points.iter().map(|&p| pose.transform_point(p)).collect()
}

/// Principal component decomposition of a point cloud.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrincipalAxes {
    /// Centroid of the points.
    pub centroid: DVec3,
    /// Unit axes sorted by decreasing spread.
    pub axes: [DVec3; 3],
    /// Standard deviation along each axis, sorted in decreasing order.
    pub sigmas: [f64; 3],
}

/// Compute the principal axes of a set of points.
pub fn principal_axes(points: &[DVec3]) -> Result<PrincipalAxes, LinalgError> {
    if points.is_empty() {
        return Err(LinalgError::EmptyInput);
    }
    let c = centroid(points);
    let cov = points.iter().fold(DMat3::ZERO, |acc, &p| {
        let d = p - c;
        acc + outer(d, d)
    }) * (1.0 / points.len() as f64);

    let eigen = SymmetricEigen::new(dmat3_to_na(&cov));
    let mut order = [0usize, 1, 2];
    order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));

    let mut axes = [DVec3::ZERO; 3];
    let mut sigmas = [0.0; 3];
    for (slot, &idx) in order.iter().enumerate() {
        let col = eigen.eigenvectors.column(idx);
        axes[slot] = DVec3::new(col[0], col[1], col[2]).normalize_or_zero();
        sigmas[slot] = eigen.eigenvalues[idx].max(0.0).sqrt();
    }
    Ok(PrincipalAxes {
        centroid: c,
        axes,
        sigmas,
    })
}

/// Umeyama/Kabsch rigid alignment without scale: finds `dst ~= R * src + t`.
pub fn umeyama(src: &[DVec3], dst: &[DVec3]) -> Result<Pose, LinalgError> {
    if src.len() != dst.len() {
        return Err(LinalgError::MismatchedInputLengths {
            src: src.len(),
            dst: dst.len(),
        });
    }
    if src.is_empty() {
        return Err(LinalgError::EmptyInput);
    }

    let mu_s = centroid(src);
    let mu_d = centroid(dst);

    // H = sum (dst_i - mu_d) (src_i - mu_s)^T
    let h = src
        .iter()
        .zip(dst)
        .fold(DMat3::ZERO, |acc, (&s, &d)| acc + outer(d - mu_d, s - mu_s));

    let svd = dmat3_to_na(&h).svd(true, true);
    let u = svd.u.ok_or(LinalgError::SvdFailed)?;
    let v_t = svd.v_t.ok_or(LinalgError::SvdFailed)?;

    let mut correction = Matrix3::identity();
    if (u * v_t).determinant() < 0.0 {
        let imin = svd.singular_values.imin();
        correction[(imin, imin)] = -1.0;
    }
    let r = na_to_dmat3(&(u * correction * v_t));
    Ok(Pose::new(r, mu_d - r * mu_s))
}
