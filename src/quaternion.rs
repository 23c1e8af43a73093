//! Quaternion helpers for orientation post-processing.
//!
//! Rotations recovered by the alignment kernel are only defined up to the
//! point symmetry of the matched lattice. For the cubic structures this
//! module maps a quaternion into the fundamental zone of the 24-element
//! proper cubic rotation group and measures (dis)orientation angles under
//! that group.

use nalgebra::{Matrix3, Quaternion, Rotation3, UnitQuaternion};

const HALF_SQRT_2: f64 = std::f64::consts::FRAC_1_SQRT_2;

/// The 24 proper rotations of the cube as unit quaternions `(w, x, y, z)`.
pub const GENERATOR_CUBIC: [[f64; 4]; 24] = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
    [0.5, 0.5, 0.5, 0.5],
    [0.5, 0.5, -0.5, 0.5],
    [0.5, -0.5, 0.5, 0.5],
    [0.5, -0.5, -0.5, 0.5],
    [-0.5, 0.5, 0.5, 0.5],
    [-0.5, 0.5, -0.5, 0.5],
    [-0.5, -0.5, 0.5, 0.5],
    [-0.5, -0.5, -0.5, 0.5],
    [HALF_SQRT_2, HALF_SQRT_2, 0.0, 0.0],
    [HALF_SQRT_2, 0.0, HALF_SQRT_2, 0.0],
    [HALF_SQRT_2, 0.0, 0.0, HALF_SQRT_2],
    [-HALF_SQRT_2, HALF_SQRT_2, 0.0, 0.0],
    [-HALF_SQRT_2, 0.0, HALF_SQRT_2, 0.0],
    [-HALF_SQRT_2, 0.0, 0.0, HALF_SQRT_2],
    [0.0, HALF_SQRT_2, HALF_SQRT_2, 0.0],
    [0.0, HALF_SQRT_2, 0.0, HALF_SQRT_2],
    [0.0, 0.0, HALF_SQRT_2, HALF_SQRT_2],
    [0.0, -HALF_SQRT_2, HALF_SQRT_2, 0.0],
    [0.0, -HALF_SQRT_2, 0.0, HALF_SQRT_2],
    [0.0, 0.0, -HALF_SQRT_2, HALF_SQRT_2],
];

/// Returns the `i`-th cubic generator as a quaternion.
pub fn generator(i: usize) -> Quaternion<f64> {
    let [w, x, y, z] = GENERATOR_CUBIC[i];
    Quaternion::new(w, x, y, z)
}

/// Multiplies `q` by the cubic generator maximising `|⟨q, g⟩|`, then forces
/// the scalar part non-negative. Returns the index of the chosen generator.
///
/// Applying this twice is a no-op: once inside the fundamental zone, the
/// identity generator always wins.
pub fn rotate_into_cubic_fundamental_zone(q: &mut Quaternion<f64>) -> usize {
    let mut max = 0.0;
    let mut bi = 0;
    for (i, g) in GENERATOR_CUBIC.iter().enumerate() {
        let t = (q.w * g[0] - q.i * g[1] - q.j * g[2] - q.k * g[3]).abs();
        if t > max {
            max = t;
            bi = i;
        }
    }

    *q = *q * generator(bi);
    if q.w < 0.0 {
        *q = -*q;
    }
    bi
}

/// Rotates `r` by the `i`-th cubic generator.
pub fn map_cubic(r: &Quaternion<f64>, i: usize) -> Quaternion<f64> {
    r * generator(i)
}

/// Cosine of the misorientation angle between two unit quaternions.
pub fn quick_misorientation(q1: &Quaternion<f64>, q2: &Quaternion<f64>) -> f64 {
    let t = q1.coords.dot(&q2.coords).clamp(-1.0, 1.0);
    2.0 * t * t - 1.0
}

/// Misorientation angle between two unit quaternions, ignoring symmetry.
pub fn misorientation(q1: &Quaternion<f64>, q2: &Quaternion<f64>) -> f64 {
    quick_misorientation(q1, q2).acos()
}

/// Cosine of the smallest misorientation angle under cubic symmetry.
pub fn quick_disorientation(q1: &Quaternion<f64>, q2: &Quaternion<f64>) -> f64 {
    let dmax = (0..GENERATOR_CUBIC.len())
        .map(|i| quick_misorientation(&map_cubic(q1, i), q2))
        .fold(f64::MIN, f64::max);
    dmax.clamp(-1.0, 1.0)
}

/// Smallest misorientation angle between two orientations of a cubic
/// lattice, scanning all 24 generators.
pub fn disorientation(q1: &Quaternion<f64>, q2: &Quaternion<f64>) -> f64 {
    quick_disorientation(q1, q2).acos()
}

/// Rotation matrix of a unit quaternion.
pub fn to_rotation_matrix(q: &Quaternion<f64>) -> Matrix3<f64> {
    UnitQuaternion::from_quaternion(*q)
        .to_rotation_matrix()
        .into_inner()
}

/// Unit quaternion of a rotation matrix.
pub fn from_rotation_matrix(m: &Matrix3<f64>) -> Quaternion<f64> {
    UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(*m)).into_inner()
}
