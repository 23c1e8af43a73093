//! Closed-form rigid alignment of a neighbour cloud onto a template.
//!
//! Implements the quaternion characteristic-polynomial method of Theobald
//! (Acta Cryst. A61, 478-480, 2005): the optimal rotation is the largest
//! eigenvector of the 4x4 key matrix built from the cross-correlation of
//! the two clouds. The largest eigenvalue is found by Newton iteration on
//! the characteristic quartic, seeded at its upper bound (G1 + G2) / 2,
//! and the eigenvector is extracted from the null space of K - λI.

use nalgebra::{Matrix3, Matrix4, Quaternion, Vector3};

use crate::quaternion;

const EVAL_EPS: f64 = 1e-11;
const EVEC_EPS: f64 = 1e-6;
const MAX_NEWTON: usize = 50;

/// Outcome of aligning a template onto an observed cloud under a fixed
/// neighbour-template correspondence.
#[derive(Debug, Clone, Copy)]
pub struct Alignment {
    /// Rotation carrying the template onto the observed cloud. Unit norm,
    /// sign not canonicalised.
    pub quaternion: Quaternion<f64>,
    /// Root-mean-square deviation in template units.
    pub rmsd: f64,
    /// Isotropic scale carrying the template shell onto the observed one.
    pub scale: f64,
}

/// Finds the rotation and scale minimising the deviation between the ideal
/// points and the observed cloud under the correspondence `mapping`.
///
/// `observed` must be centred on its barycentre. `g1` and `g2` are the
/// precomputed squared norms of the two clouds; they are shared across the
/// candidate correspondences of one hull.
pub fn align(
    ideal: &[Vector3<f64>],
    observed: &[Vector3<f64>],
    mapping: &[i8],
    g1: f64,
    g2: f64,
) -> Alignment {
    let num_points = ideal.len();

    let mut correlation = Matrix3::zeros();
    for (a, &m) in ideal.iter().zip(mapping) {
        correlation += a * observed[m as usize].transpose();
    }

    let key = key_matrix(&correlation);
    let eigenvalue = largest_eigenvalue(&key, &correlation, (g1 + g2) / 2.0);
    let q = extract_quaternion(&key, eigenvalue);

    let rotation = quaternion::to_rotation_matrix(&q);
    let mut k0 = 0.0;
    for (a, &m) in ideal.iter().zip(mapping) {
        k0 += (rotation * a).dot(&observed[m as usize]);
    }

    let inverse_scale = k0 / g2;
    Alignment {
        quaternion: q,
        rmsd: ((g1 - inverse_scale * k0).abs() / num_points as f64).sqrt(),
        scale: g2 / k0,
    }
}

/// The symmetric traceless key matrix of Horn's method: its largest
/// eigenvector is the optimal rotation quaternion, scalar part first.
fn key_matrix(m: &Matrix3<f64>) -> Matrix4<f64> {
    let (sxx, sxy, sxz) = (m[(0, 0)], m[(0, 1)], m[(0, 2)]);
    let (syx, syy, syz) = (m[(1, 0)], m[(1, 1)], m[(1, 2)]);
    let (szx, szy, szz) = (m[(2, 0)], m[(2, 1)], m[(2, 2)]);

    Matrix4::new(
        sxx + syy + szz,
        syz - szy,
        szx - sxz,
        sxy - syx,
        syz - szy,
        sxx - syy - szz,
        sxy + syx,
        szx + sxz,
        szx - sxz,
        sxy + syx,
        -sxx + syy - szz,
        syz + szy,
        sxy - syx,
        szx + sxz,
        syz + szy,
        -sxx - syy + szz,
    )
}

/// Newton iteration on the characteristic quartic of the key matrix,
/// starting from the upper bound `e0 >= λ_max`. Converges monotonically in
/// a handful of steps for the well-conditioned matrices seen here.
fn largest_eigenvalue(key: &Matrix4<f64>, correlation: &Matrix3<f64>, e0: f64) -> f64 {
    // λ⁴ + c2 λ² + c1 λ + c0, the cubic term vanishing with the trace
    let c2 = -2.0 * correlation.norm_squared();
    let c1 = -8.0 * correlation.determinant();
    let c0 = key.determinant();

    let mut eigenvalue = e0;
    for _ in 0..MAX_NEWTON {
        let previous = eigenvalue;
        let x2 = eigenvalue * eigenvalue;
        let b = (x2 + c2) * eigenvalue;
        let a = b + c1;
        let delta = (a * eigenvalue + c0) / (2.0 * x2 * eigenvalue + b + a);
        if !delta.is_finite() {
            break;
        }
        eigenvalue -= delta;
        if (eigenvalue - previous).abs() < EVAL_EPS * eigenvalue.abs() {
            break;
        }
    }
    eigenvalue
}

/// Null-space vector of `key - λI` via 4-dimensional cross products of its
/// rows, falling back across row triples when one degenerates. If every
/// candidate is numerically null the rotation is reported as identity.
fn extract_quaternion(key: &Matrix4<f64>, eigenvalue: f64) -> Quaternion<f64> {
    let shifted = key - Matrix4::identity() * eigenvalue;
    let rows: [[f64; 4]; 4] = [
        [shifted[(0, 0)], shifted[(0, 1)], shifted[(0, 2)], shifted[(0, 3)]],
        [shifted[(1, 0)], shifted[(1, 1)], shifted[(1, 2)], shifted[(1, 3)]],
        [shifted[(2, 0)], shifted[(2, 1)], shifted[(2, 2)], shifted[(2, 3)]],
        [shifted[(3, 0)], shifted[(3, 1)], shifted[(3, 2)], shifted[(3, 3)]],
    ];

    for omitted in [0, 1, 2, 3] {
        let mut triple = [[0.0; 4]; 3];
        let mut k = 0;
        for (i, row) in rows.iter().enumerate() {
            if i != omitted {
                triple[k] = *row;
                k += 1;
            }
        }
        let candidate = cross4(&triple[0], &triple[1], &triple[2]);
        let norm_squared: f64 = candidate.iter().map(|c| c * c).sum();
        if norm_squared > EVEC_EPS {
            let norm = norm_squared.sqrt();
            return Quaternion::new(
                candidate[0] / norm,
                candidate[1] / norm,
                candidate[2] / norm,
                candidate[3] / norm,
            );
        }
    }
    Quaternion::identity()
}

/// Generalised cross product: a vector orthogonal to three 4-vectors.
fn cross4(r0: &[f64; 4], r1: &[f64; 4], r2: &[f64; 4]) -> [f64; 4] {
    let minor = |a: usize, b: usize, c: usize| {
        r0[a] * (r1[b] * r2[c] - r1[c] * r2[b]) - r0[b] * (r1[a] * r2[c] - r1[c] * r2[a])
            + r0[c] * (r1[a] * r2[b] - r1[b] * r2[a])
    };
    [
        minor(1, 2, 3),
        -minor(0, 2, 3),
        minor(0, 1, 3),
        -minor(0, 1, 2),
    ]
}
