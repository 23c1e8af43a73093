//! Small geometric helpers shared by the matching pipeline.

use nalgebra::Vector3;

/// Largest neighbour cloud handled on the hot path: the 14 neighbours of a
/// body-centred cubic site plus the central point.
pub const MAX_POINTS: usize = 15;

/// Subtracts the barycentre of `points` from every point.
///
/// The alignment kernel assumes both clouds are centred; the reference
/// templates are built centred, the observed cloud is centred here.
pub fn subtract_barycentre(points: &[Vector3<f64>], out: &mut [Vector3<f64>]) {
    let barycentre = points.iter().sum::<Vector3<f64>>() / points.len() as f64;
    for (o, p) in out.iter_mut().zip(points) {
        *o = p - barycentre;
    }
}

/// Scales a cloud so that its farthest point lies on the unit sphere.
///
/// The convex hull is computed on the scaled copy; scaling does not change
/// the hull combinatorics but keeps the tolerances of the hull absolute.
pub fn normalize_cloud(points: &[Vector3<f64>], out: &mut [Vector3<f64>]) {
    let max_norm = points
        .iter()
        .map(|p| p.norm())
        .fold(0.0f64, |acc, n| acc.max(n));
    let scale = if max_norm > 0.0 { 1.0 / max_norm } else { 1.0 };
    for (o, p) in out.iter_mut().zip(points) {
        *o = p * scale;
    }
}

/// Plane normal of the facet `(a, b, c)`, not normalised.
pub fn facet_normal(points: &[Vector3<f64>], facet: &[i8; 3]) -> Vector3<f64> {
    let a = points[facet[0] as usize];
    let b = points[facet[1] as usize];
    let c = points[facet[2] as usize];
    (b - a).cross(&(c - a))
}

/// Reorders a facet in place so that its normal points away from the origin.
///
/// The origin is the central point of the cloud, which lies inside the hull
/// of its neighbours.
pub fn orient_facet(points: &[Vector3<f64>], facet: &mut [i8; 3]) {
    let normal = facet_normal(points, facet);
    if normal.dot(&points[facet[0] as usize]) < 0.0 {
        facet.swap(1, 2);
    }
}
