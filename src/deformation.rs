//! Deformation gradient of a matched cloud and its polar decomposition.
//!
//! The gradient is the least-squares linear map carrying the ideal
//! template onto the rescaled observed cloud; with the precomputed
//! Moore-Penrose rows of the template it reduces to one outer-product
//! accumulation. The left polar decomposition `F = P · U` separates the
//! symmetric stretch `P` from the rotation `U`.

use nalgebra::{Matrix3, Vector3};

/// Deformation gradient `F` of a matched cloud, its per-axis residual, and
/// the left polar factors `F = P · U`.
#[derive(Debug, Clone, Copy)]
pub struct Deformation {
    pub gradient: Matrix3<f64>,
    /// Per-axis sums of squared fit residuals.
    pub residual: Vector3<f64>,
    /// Symmetric positive stretch.
    pub stretch: Matrix3<f64>,
    /// Orthogonal rotation part.
    pub rotation: Matrix3<f64>,
}

/// Fits `F` such that `F · ideal[i] ≈ observed[mapping[i]]`.
///
/// `observed` must be centred and rescaled to template units; `penrose`
/// holds the pseudo-inverse rows of the template.
pub fn deformation_gradient(
    ideal: &[Vector3<f64>],
    mapping: &[i8],
    observed: &[Vector3<f64>],
    penrose: &[Vector3<f64>],
) -> Deformation {
    let mut gradient = Matrix3::zeros();
    for (row, &m) in penrose.iter().zip(mapping) {
        gradient += observed[m as usize] * row.transpose();
    }

    let mut residual = Vector3::zeros();
    for (p, &m) in ideal.iter().zip(mapping) {
        let r = gradient * p - observed[m as usize];
        residual += r.component_mul(&r);
    }

    let (stretch, rotation) = left_polar_decomposition(&gradient);
    Deformation {
        gradient,
        residual,
        stretch,
        rotation,
    }
}

/// Left polar decomposition of a 3x3 matrix: `F = P · U` with `P`
/// symmetric positive semi-definite and `U` orthogonal.
pub fn left_polar_decomposition(f: &Matrix3<f64>) -> (Matrix3<f64>, Matrix3<f64>) {
    let svd = f.svd(true, true);
    let u = svd.u.expect("SVD of a 3x3 matrix always yields U");
    let v_t = svd.v_t.expect("SVD of a 3x3 matrix always yields Vᵀ");

    let rotation = u * v_t;
    let stretch = u * Matrix3::from_diagonal(&svd.singular_values) * u.transpose();
    (stretch, rotation)
}
