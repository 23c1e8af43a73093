//! Reference structures and their precomputed graph tables.
//!
//! Each supported lattice is described by an ideal neighbour shell, the
//! facet graphs its convex hull can assume, and alignment helper data. The
//! tables are process-wide: they are built exactly once behind a one-shot
//! guard and shared read-only by every matcher invocation afterwards.
//!
//! Ideal hulls are not always simplicial: the close-packed shells (FCC
//! cuboctahedron, HCP orthobicupola) have six exactly planar square faces,
//! and the BCC shell is a rhombic dodecahedron whose twelve faces are all
//! planar. An observed hull triangulates each planar face along either
//! diagonal depending on noise, so every combination (2^6 for the
//! close-packed shells, 2^12 for BCC) is enumerated here and deduplicated
//! by canonical hash. That enumeration is what makes the lookup robust
//! against the ambiguity; it is also where the BCC degree bound of 8 comes
//! from, an axis vertex picking up one extra edge per incident face split
//! along its axis-axis diagonal.

use itertools::Itertools;
use lazy_static::lazy_static;
use nalgebra::{Matrix3, Vector3};

use crate::canonical;
use crate::geometry::{self, MAX_POINTS};
use crate::quaternion;

/// The lattice types a neighbour cloud can be matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StructureType {
    /// Simple cubic: 6 neighbours, octahedral hull.
    Sc,
    /// Face-centred cubic: 12 neighbours, cuboctahedral hull.
    Fcc,
    /// Hexagonal close-packed: 12 neighbours, triangular orthobicupola hull.
    Hcp,
    /// Icosahedral coordination: 12 neighbours.
    Ico,
    /// Body-centred cubic: 8 + 6 neighbours over two shells.
    Bcc,
}

impl std::fmt::Display for StructureType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StructureType::Sc => "sc",
            StructureType::Fcc => "fcc",
            StructureType::Hcp => "hcp",
            StructureType::Ico => "ico",
            StructureType::Bcc => "bcc",
        };
        f.write_str(name)
    }
}

/// One facet graph a hull of this structure can assume.
pub struct ReferenceGraph {
    /// Facets over neighbour-local vertices, wound outward.
    pub facets: Vec<[i8; 3]>,
    /// Canonical labelling over `0..=num_nbrs`, fixing slot 0.
    pub canonical_labelling: [i8; MAX_POINTS],
    /// Hash of the canonical adjacency code.
    pub hash: u64,
    /// Offset of this graph's automorphisms in the shared table.
    pub automorphism_index: usize,
    pub num_automorphisms: usize,
}

/// An ideal neighbour shell plus everything derived from it.
pub struct ReferenceStructure {
    pub kind: StructureType,
    pub num_nbrs: usize,
    pub num_facets: usize,
    pub max_degree: i8,
    /// Ideal points, central point first, mean neighbour norm 1.
    pub points: Vec<Vector3<f64>>,
    /// Moore-Penrose helper rows `(Σ p pᵀ)⁻¹ · p` for the deformation fit.
    pub penrose: Vec<Vector3<f64>>,
    pub graphs: Vec<ReferenceGraph>,
    /// For cubic structures, row `i` is the template permutation undoing
    /// the `i`-th cubic generator; used after fundamental-zone reduction.
    pub cubic_mapping: Option<Vec<[i8; MAX_POINTS]>>,
}

/// The five reference structures and the shared automorphism table.
pub struct ReferenceTables {
    pub sc: ReferenceStructure,
    pub fcc: ReferenceStructure,
    pub hcp: ReferenceStructure,
    pub ico: ReferenceStructure,
    pub bcc: ReferenceStructure,
    /// Flat automorphism storage; graphs with identical automorphism lists
    /// share one run of this table.
    pub automorphisms: Vec<[i8; MAX_POINTS]>,
}

lazy_static! {
    /// Process-wide reference tables, built once on first use.
    pub static ref TABLES: ReferenceTables = ReferenceTables::build();
}

/// Forces construction of the reference tables.
///
/// Matching initialises the tables lazily on first use; call this from
/// startup code to pay the cost eagerly instead. Idempotent.
pub fn initialize() {
    lazy_static::initialize(&TABLES);
}

impl ReferenceTables {
    pub fn get(&self, kind: StructureType) -> &ReferenceStructure {
        match kind {
            StructureType::Sc => &self.sc,
            StructureType::Fcc => &self.fcc,
            StructureType::Hcp => &self.hcp,
            StructureType::Ico => &self.ico,
            StructureType::Bcc => &self.bcc,
        }
    }

    fn build() -> ReferenceTables {
        let mut automorphisms = Vec::new();
        let mut shared = Vec::new();

        let sc = build_structure(
            StructureType::Sc,
            sc_points(),
            vec![SC_FACETS.to_vec()],
            4,
            true,
            &mut automorphisms,
            &mut shared,
        );
        let fcc = build_structure(
            StructureType::Fcc,
            fcc_points(),
            triangulations(&FCC_TRIANGLES, &FCC_SQUARES),
            6,
            true,
            &mut automorphisms,
            &mut shared,
        );
        let hcp = build_structure(
            StructureType::Hcp,
            hcp_points(),
            triangulations(&HCP_TRIANGLES, &HCP_SQUARES),
            6,
            false,
            &mut automorphisms,
            &mut shared,
        );
        let ico = build_structure(
            StructureType::Ico,
            ico_points(),
            vec![ICO_FACETS.to_vec()],
            6,
            false,
            &mut automorphisms,
            &mut shared,
        );
        let bcc = build_structure(
            StructureType::Bcc,
            bcc_points(),
            triangulations(&[], &BCC_RHOMBI),
            8,
            true,
            &mut automorphisms,
            &mut shared,
        );

        ReferenceTables {
            sc,
            fcc,
            hcp,
            ico,
            bcc,
            automorphisms,
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn build_structure(
    kind: StructureType,
    points: Vec<Vector3<f64>>,
    candidates: Vec<Vec<[i8; 3]>>,
    max_degree: i8,
    cubic: bool,
    automorphisms: &mut Vec<[i8; MAX_POINTS]>,
    shared: &mut Vec<(usize, usize)>,
) -> ReferenceStructure {
    let num_nbrs = points.len() - 1;
    let num_facets = candidates[0].len();
    let nbrs = points[1..].to_vec();

    let mut graphs: Vec<ReferenceGraph> = Vec::new();
    for mut facets in candidates {
        for facet in &mut facets {
            geometry::orient_facet(&nbrs, facet);
        }

        let mut degree = [0i8; canonical::MAX_NODES];
        let top = canonical::graph_degree(&facets, num_nbrs, &mut degree);
        assert!(
            top <= max_degree,
            "{kind} reference graph exceeds its degree bound"
        );

        let (hash, canonical_labelling, autos) =
            canonical::canonical_form_with_automorphisms(&facets, num_nbrs, &degree);
        if graphs.iter().any(|g| g.hash == hash) {
            continue;
        }
        let automorphism_index = intern_automorphisms(automorphisms, shared, &autos);
        graphs.push(ReferenceGraph {
            facets,
            canonical_labelling,
            hash,
            automorphism_index,
            num_automorphisms: autos.len(),
        });
    }

    let penrose = penrose_rows(&points);
    let cubic_mapping = cubic.then(|| cubic_rows(&points));
    ReferenceStructure {
        kind,
        num_nbrs,
        num_facets,
        max_degree,
        points,
        penrose,
        graphs,
        cubic_mapping,
    }
}

/// Appends an automorphism list to the flat table, or returns the offset of
/// an identical run already stored.
fn intern_automorphisms(
    table: &mut Vec<[i8; MAX_POINTS]>,
    shared: &mut Vec<(usize, usize)>,
    autos: &[[i8; MAX_POINTS]],
) -> usize {
    for &(start, len) in shared.iter() {
        if len == autos.len() && table[start..start + len] == *autos {
            return start;
        }
    }
    let start = table.len();
    table.extend_from_slice(autos);
    shared.push((start, autos.len()));
    start
}

/// All triangulations of a facet list with planar square faces: each square
/// is split along either diagonal.
fn triangulations(triangles: &[[i8; 3]], squares: &[[i8; 4]]) -> Vec<Vec<[i8; 3]>> {
    (0..1u32 << squares.len())
        .map(|mask| {
            let mut facets = triangles.to_vec();
            for (i, q) in squares.iter().enumerate() {
                if mask & (1 << i) == 0 {
                    facets.push([q[0], q[1], q[2]]);
                    facets.push([q[0], q[2], q[3]]);
                } else {
                    facets.push([q[1], q[2], q[3]]);
                    facets.push([q[1], q[3], q[0]]);
                }
            }
            facets
        })
        .collect()
}

fn penrose_rows(points: &[Vector3<f64>]) -> Vec<Vector3<f64>> {
    let mut second_moment = Matrix3::zeros();
    for p in points {
        second_moment += p * p.transpose();
    }
    let inverse = second_moment
        .try_inverse()
        .expect("template second moment is singular");
    points.iter().map(|p| inverse * p).collect()
}

/// For each cubic generator, the inverse of the vertex permutation it
/// induces on the ideal points. Row 0 (the identity generator) is the
/// identity permutation.
fn cubic_rows(points: &[Vector3<f64>]) -> Vec<[i8; MAX_POINTS]> {
    (0..quaternion::GENERATOR_CUBIC.len())
        .map(|gi| {
            let rotation = quaternion::to_rotation_matrix(&quaternion::generator(gi));
            let mut row = [0i8; MAX_POINTS];
            for (i, p) in points.iter().enumerate() {
                let rotated = rotation * p;
                let (j, distance) = points
                    .iter()
                    .map(|q| (rotated - q).norm_squared())
                    .position_min_by(|a, b| a.partial_cmp(b).unwrap())
                    .map(|j| (j, (rotated - points[j]).norm_squared()))
                    .expect("template is not empty");
                assert!(
                    distance < 1e-9,
                    "cubic generator does not permute the template"
                );
                row[j] = i as i8;
            }
            row
        })
        .collect()
}

fn to_points(raw: &[[f64; 3]]) -> Vec<Vector3<f64>> {
    raw.iter().map(|&[x, y, z]| Vector3::new(x, y, z)).collect()
}

fn sc_points() -> Vec<Vector3<f64>> {
    to_points(&[
        [0.0, 0.0, 0.0],
        [0.0, 0.0, -1.0],
        [0.0, 0.0, 1.0],
        [0.0, -1.0, 0.0],
        [0.0, 1.0, 0.0],
        [-1.0, 0.0, 0.0],
        [1.0, 0.0, 0.0],
    ])
}

fn fcc_points() -> Vec<Vector3<f64>> {
    let s = std::f64::consts::FRAC_1_SQRT_2;
    to_points(&[
        [0.0, 0.0, 0.0],
        [s, s, 0.0],
        [-s, -s, 0.0],
        [s, -s, 0.0],
        [-s, s, 0.0],
        [s, 0.0, s],
        [-s, 0.0, -s],
        [s, 0.0, -s],
        [-s, 0.0, s],
        [0.0, s, s],
        [0.0, -s, -s],
        [0.0, s, -s],
        [0.0, -s, s],
    ])
}

fn hcp_points() -> Vec<Vector3<f64>> {
    let half_rt3 = 3.0f64.sqrt() / 2.0;
    let a = 0.5 / 3.0f64.sqrt();
    let b = 1.0 / 3.0f64.sqrt();
    let h = (2.0f64 / 3.0).sqrt();
    to_points(&[
        [0.0, 0.0, 0.0],
        [1.0, 0.0, 0.0],
        [0.5, half_rt3, 0.0],
        [-0.5, half_rt3, 0.0],
        [-1.0, 0.0, 0.0],
        [-0.5, -half_rt3, 0.0],
        [0.5, -half_rt3, 0.0],
        [0.5, a, h],
        [-0.5, a, h],
        [0.0, -b, h],
        [0.5, a, -h],
        [-0.5, a, -h],
        [0.0, -b, -h],
    ])
}

fn ico_points() -> Vec<Vector3<f64>> {
    let phi = (1.0 + 5.0f64.sqrt()) / 2.0;
    let s = 1.0 / (1.0 + phi * phi).sqrt();
    let p = phi * s;
    to_points(&[
        [0.0, 0.0, 0.0],
        [0.0, s, p],
        [0.0, s, -p],
        [0.0, -s, p],
        [0.0, -s, -p],
        [s, p, 0.0],
        [s, -p, 0.0],
        [-s, p, 0.0],
        [-s, -p, 0.0],
        [p, 0.0, s],
        [p, 0.0, -s],
        [-p, 0.0, s],
        [-p, 0.0, -s],
    ])
}

fn bcc_points() -> Vec<Vector3<f64>> {
    // two shells: 8 cube corners and 6 axis points, mean norm 1
    let first = 14.0 / (8.0 + 12.0 / 3.0f64.sqrt());
    let c = first / 3.0f64.sqrt();
    let a = 2.0 * c;
    to_points(&[
        [0.0, 0.0, 0.0],
        [c, c, c],
        [c, c, -c],
        [c, -c, c],
        [c, -c, -c],
        [-c, c, c],
        [-c, c, -c],
        [-c, -c, c],
        [-c, -c, -c],
        [a, 0.0, 0.0],
        [-a, 0.0, 0.0],
        [0.0, a, 0.0],
        [0.0, -a, 0.0],
        [0.0, 0.0, a],
        [0.0, 0.0, -a],
    ])
}

const SC_FACETS: [[i8; 3]; 8] = [
    [0, 2, 4],
    [0, 2, 5],
    [0, 3, 4],
    [0, 3, 5],
    [1, 2, 4],
    [1, 2, 5],
    [1, 3, 4],
    [1, 3, 5],
];

const FCC_TRIANGLES: [[i8; 3]; 8] = [
    [0, 4, 8],
    [0, 6, 10],
    [2, 4, 11],
    [2, 6, 9],
    [3, 7, 8],
    [3, 5, 10],
    [1, 7, 11],
    [1, 5, 9],
];

const FCC_SQUARES: [[i8; 4]; 6] = [
    [0, 4, 2, 6],
    [3, 7, 1, 5],
    [0, 8, 3, 10],
    [2, 11, 1, 9],
    [4, 8, 7, 11],
    [6, 10, 5, 9],
];

const HCP_TRIANGLES: [[i8; 3]; 8] = [
    [6, 7, 8],
    [9, 10, 11],
    [0, 1, 6],
    [2, 3, 7],
    [4, 5, 8],
    [0, 1, 9],
    [2, 3, 10],
    [4, 5, 11],
];

const HCP_SQUARES: [[i8; 4]; 6] = [
    [1, 2, 7, 6],
    [3, 4, 8, 7],
    [5, 0, 6, 8],
    [1, 2, 10, 9],
    [3, 4, 11, 10],
    [5, 0, 9, 11],
];

const ICO_FACETS: [[i8; 3]; 20] = [
    [0, 2, 8],
    [0, 8, 4],
    [0, 4, 6],
    [0, 6, 10],
    [0, 10, 2],
    [3, 1, 11],
    [3, 11, 7],
    [3, 7, 5],
    [3, 5, 9],
    [3, 9, 1],
    [1, 11, 6],
    [1, 6, 4],
    [1, 4, 9],
    [2, 10, 7],
    [2, 7, 5],
    [2, 5, 8],
    [4, 8, 9],
    [5, 9, 8],
    [6, 10, 11],
    [7, 11, 10],
];

// Rhombic faces of the BCC hull as 4-cycles [axis, corner, axis, corner]:
// every face joins two perpendicular axis vertices through the two cube
// corners they share.
const BCC_RHOMBI: [[i8; 4]; 12] = [
    [8, 0, 10, 1],
    [8, 2, 11, 3],
    [8, 0, 12, 2],
    [8, 1, 13, 3],
    [9, 4, 10, 5],
    [9, 6, 11, 7],
    [9, 4, 12, 6],
    [9, 5, 13, 7],
    [10, 0, 12, 4],
    [10, 1, 13, 5],
    [11, 2, 12, 6],
    [11, 3, 13, 7],
];
