//! Incremental convex hull of a neighbour cloud.
//!
//! The hull is built over the neighbours only: the central point sits at the
//! origin, inside the shell, and is never a hull vertex. Facets are reported
//! as ordered triples of *neighbour-local* indices (template slot minus one)
//! wound so that their normal points away from the origin.
//!
//! Points within `VISIBLE_EPS` of a facet plane are treated as visible. The
//! square faces of the ideal close-packed shells are exactly coplanar, and
//! without this slack the last vertex of each square would be dropped as
//! interior, leaving the hull short of facets.

use nalgebra::Vector3;
use thiserror::Error;

use crate::geometry;

/// Largest facet count of any reference structure (body-centred cubic).
pub const MAX_FACETS: usize = 24;

// scratch capacity; a 14-vertex hull never holds more than 24 live facets
const MAX_SLOTS: usize = 32;

const VISIBLE_EPS: f64 = 1e-8;
const VOLUME_EPS: f64 = 1e-8;
const AREA_EPS: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HullError {
    /// No four neighbours span a tetrahedron of usable volume.
    #[error("neighbour cloud is degenerate (collinear or coplanar)")]
    Degenerate,
    /// The hull closed with fewer facets than the template requires,
    /// typically because a neighbour fell inside the hull of the others.
    #[error("hull produced {got} facets where {expected} were expected")]
    TooFewFacets { expected: usize, got: usize },
    /// Numerical drift on near-coplanar regions yielded extra facets.
    #[error("hull produced {got} facets where only {expected} were expected")]
    TooManyFacets { expected: usize, got: usize },
}

#[derive(Clone, Copy)]
struct Facet {
    v: [usize; 3],
    normal: Vector3<f64>,
    alive: bool,
}

impl Facet {
    fn dead() -> Facet {
        Facet {
            v: [0; 3],
            normal: Vector3::zeros(),
            alive: false,
        }
    }

    // directed edges in winding order
    fn edges(&self) -> [(usize, usize); 3] {
        [
            (self.v[0], self.v[1]),
            (self.v[1], self.v[2]),
            (self.v[2], self.v[0]),
        ]
    }

    fn has_directed_edge(&self, u: usize, v: usize) -> bool {
        self.edges().iter().any(|&(a, b)| a == u && b == v)
    }
}

/// Computes the convex hull of `points[1..]` and writes exactly
/// `expected_facets` facets into `facets_out`.
///
/// `points[0]` is the central point and is skipped. Any other outcome than
/// exactly `expected_facets` facets is an error; the caller abandons the
/// template and moves on.
pub fn convex_hull(
    points: &[Vector3<f64>],
    expected_facets: usize,
    facets_out: &mut [[i8; 3]],
) -> Result<(), HullError> {
    let nbrs = &points[1..];
    let n = nbrs.len();

    let mut facets = [Facet::dead(); MAX_SLOTS];
    let mut len = 0;
    let mut inserted = [false; geometry::MAX_POINTS];

    let simplex = initial_simplex(nbrs)?;
    for &i in &simplex {
        inserted[i] = true;
    }
    let centroid = simplex.iter().map(|&i| nbrs[i]).sum::<Vector3<f64>>() / 4.0;
    for skip in 0..4 {
        let mut v = [0usize; 3];
        let mut k = 0;
        for (j, &i) in simplex.iter().enumerate() {
            if j != skip {
                v[k] = i;
                k += 1;
            }
        }
        let mut facet = make_facet(nbrs, v)?;
        if facet.normal.dot(&(nbrs[facet.v[0]] - centroid)) < 0.0 {
            facet.v.swap(1, 2);
            facet.normal = -facet.normal;
        }
        facets[len] = facet;
        len += 1;
    }

    for p_idx in 0..n {
        if inserted[p_idx] {
            continue;
        }
        inserted[p_idx] = true;
        insert_point(nbrs, p_idx, &mut facets, &mut len)?;
    }

    let got = facets[..len].iter().filter(|f| f.alive).count();
    if got < expected_facets {
        return Err(HullError::TooFewFacets {
            expected: expected_facets,
            got,
        });
    }
    if got > expected_facets {
        return Err(HullError::TooManyFacets {
            expected: expected_facets,
            got,
        });
    }

    let mut out = 0;
    for facet in facets[..len].iter().filter(|f| f.alive) {
        facets_out[out] = [facet.v[0] as i8, facet.v[1] as i8, facet.v[2] as i8];
        geometry::orient_facet(nbrs, &mut facets_out[out]);
        out += 1;
    }
    Ok(())
}

/// Picks four neighbours spanning a tetrahedron: the first point, the point
/// farthest from it, the point maximising the triangle area, and the point
/// maximising the tetrahedron volume.
fn initial_simplex(nbrs: &[Vector3<f64>]) -> Result<[usize; 4], HullError> {
    if nbrs.len() < 4 {
        return Err(HullError::Degenerate);
    }

    let i0 = 0;
    let mut i1 = 0;
    let mut best = 0.0;
    for (j, p) in nbrs.iter().enumerate() {
        let d = (p - nbrs[i0]).norm_squared();
        if d > best {
            best = d;
            i1 = j;
        }
    }

    let mut i2 = 0;
    let mut best = 0.0;
    for (j, p) in nbrs.iter().enumerate() {
        let area = (p - nbrs[i0]).cross(&(nbrs[i1] - nbrs[i0])).norm_squared();
        if area > best {
            best = area;
            i2 = j;
        }
    }

    let base = (nbrs[i1] - nbrs[i0]).cross(&(nbrs[i2] - nbrs[i0]));
    let mut i3 = 0;
    let mut best = 0.0;
    for (j, p) in nbrs.iter().enumerate() {
        let volume = base.dot(&(p - nbrs[i0])).abs();
        if volume > best {
            best = volume;
            i3 = j;
        }
    }

    if best < VOLUME_EPS {
        return Err(HullError::Degenerate);
    }
    Ok([i0, i1, i2, i3])
}

fn make_facet(nbrs: &[Vector3<f64>], v: [usize; 3]) -> Result<Facet, HullError> {
    let normal = (nbrs[v[1]] - nbrs[v[0]]).cross(&(nbrs[v[2]] - nbrs[v[0]]));
    let norm = normal.norm();
    if norm * norm < AREA_EPS {
        return Err(HullError::Degenerate);
    }
    Ok(Facet {
        v,
        normal: normal / norm,
        alive: true,
    })
}

fn insert_point(
    nbrs: &[Vector3<f64>],
    p_idx: usize,
    facets: &mut [Facet; MAX_SLOTS],
    len: &mut usize,
) -> Result<(), HullError> {
    let p = nbrs[p_idx];

    let mut visible = [false; MAX_SLOTS];
    let mut any_visible = false;
    for (slot, facet) in facets[..*len].iter().enumerate() {
        if !facet.alive {
            continue;
        }
        if facet.normal.dot(&(p - nbrs[facet.v[0]])) > -VISIBLE_EPS {
            visible[slot] = true;
            any_visible = true;
        }
    }
    // inside the current hull; the final facet count check reports this
    if !any_visible {
        return Ok(());
    }

    // the horizon is the set of directed edges of visible facets whose
    // opposite facet survives; stitching the new point to it keeps the
    // outward winding
    let mut fresh = [Facet::dead(); MAX_SLOTS];
    let mut num_fresh = 0;
    for slot in 0..*len {
        if !visible[slot] || !facets[slot].alive {
            continue;
        }
        for (u, v) in facets[slot].edges() {
            let mut opposite = None;
            for (other, facet) in facets[..*len].iter().enumerate() {
                if facet.alive && other != slot && facet.has_directed_edge(v, u) {
                    opposite = Some(other);
                    break;
                }
            }
            let opposite = opposite.ok_or(HullError::Degenerate)?;
            if visible[opposite] {
                continue;
            }
            if num_fresh == MAX_SLOTS {
                return Err(HullError::Degenerate);
            }
            fresh[num_fresh] = make_facet(nbrs, [u, v, p_idx])?;
            num_fresh += 1;
        }
    }

    for slot in 0..*len {
        if visible[slot] {
            facets[slot].alive = false;
        }
    }
    for facet in &fresh[..num_fresh] {
        let slot = match facets[..*len].iter().position(|f| !f.alive) {
            Some(slot) => slot,
            None if *len < MAX_SLOTS => {
                *len += 1;
                *len - 1
            }
            None => return Err(HullError::Degenerate),
        };
        facets[slot] = *facet;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn octahedron() -> Vec<Vector3<f64>> {
        vec![
            Vector3::zeros(),
            Vector3::new(0.0, 0.0, -1.0),
            Vector3::new(0.0, 0.0, 1.0),
            Vector3::new(0.0, -1.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
            Vector3::new(-1.0, 0.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
        ]
    }

    fn facet_degrees(facets: &[[i8; 3]], num_nodes: usize) -> Vec<usize> {
        let mut degree = vec![0; num_nodes];
        for f in facets {
            for &v in f {
                degree[v as usize] += 1;
            }
        }
        degree
    }

    #[test]
    fn octahedron_has_eight_facets() {
        let points = octahedron();
        let mut facets = [[0i8; 3]; 8];
        convex_hull(&points, 8, &mut facets).unwrap();

        assert!(facet_degrees(&facets, 6).iter().all(|&d| d == 4));
        for facet in &facets {
            let normal = crate::geometry::facet_normal(&points[1..], facet);
            assert!(normal.dot(&points[1 + facet[0] as usize]) > 0.0);
        }
    }

    #[test]
    fn cuboctahedron_has_twenty_facets() {
        // exactly coplanar square faces; exercises the visibility slack
        let s = std::f64::consts::FRAC_1_SQRT_2;
        let mut points = vec![Vector3::zeros()];
        for &(x, y, z) in &[
            (s, s, 0.0),
            (-s, -s, 0.0),
            (s, -s, 0.0),
            (-s, s, 0.0),
            (s, 0.0, s),
            (-s, 0.0, -s),
            (s, 0.0, -s),
            (-s, 0.0, s),
            (0.0, s, s),
            (0.0, -s, -s),
            (0.0, s, -s),
            (0.0, -s, s),
        ] {
            points.push(Vector3::new(x, y, z));
        }

        let mut facets = [[0i8; 3]; 20];
        convex_hull(&points, 20, &mut facets).unwrap();

        // every vertex belongs to at least two triangles and two squares
        assert!(facet_degrees(&facets, 12).iter().all(|&d| (4..=6).contains(&d)));
    }

    #[test]
    fn coplanar_cloud_is_degenerate() {
        let mut points = vec![Vector3::zeros()];
        for i in 0..6 {
            let angle = i as f64 * std::f64::consts::FRAC_PI_3;
            points.push(Vector3::new(angle.cos(), angle.sin(), 0.0));
        }
        let mut facets = [[0i8; 3]; 8];
        assert_eq!(
            convex_hull(&points, 8, &mut facets),
            Err(HullError::Degenerate)
        );
    }

    #[test]
    fn collinear_cloud_is_degenerate() {
        let mut points = vec![Vector3::zeros()];
        for i in 1..=6 {
            points.push(Vector3::new(i as f64 * 0.1, 0.0, 0.0));
        }
        let mut facets = [[0i8; 3]; 8];
        assert_eq!(
            convex_hull(&points, 8, &mut facets),
            Err(HullError::Degenerate)
        );
    }

    #[test]
    fn wrong_facet_count_is_reported() {
        // seven generic points on a sphere close with 2n - 4 = 10 facets
        let mut points = vec![Vector3::zeros()];
        for &(x, y, z) in &[
            (1.0, 0.02, 0.01),
            (-1.0, 0.03, -0.02),
            (0.01, 1.0, 0.04),
            (0.02, -1.0, 0.01),
            (0.03, 0.01, 1.0),
            (-0.02, 0.04, -1.0),
            (0.577, 0.577, 0.577),
        ] {
            points.push(Vector3::new(x, y, z));
        }
        let mut facets = [[0i8; 3]; MAX_FACETS];
        let result = convex_hull(&points, 8, &mut facets);
        assert_eq!(
            result,
            Err(HullError::TooManyFacets {
                expected: 8,
                got: 10
            })
        );
    }
}
