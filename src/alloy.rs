//! Chemical-ordering classification downstream of a geometric match.
//!
//! Once a cloud is matched to FCC or BCC, the species of the mapped
//! neighbours distinguish the common ordered alloys from a pure crystal.
//! The geometric tests run on the ideal template positions, so they are
//! insensitive to which automorphism the matcher happened to select.

use nalgebra::Vector3;

const GEOM_EPS: f64 = 1e-3;

/// Chemical ordering of a matched cloud.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlloyType {
    /// No species supplied, no cubic match, or no recognised ordering.
    None,
    /// All sites carry the same species.
    Pure,
    /// L1₀ ordering (CuAu): alternating layers, the in-plane square of
    /// neighbours sharing the central species.
    L10,
    /// L1₂ majority site (the Cu site of Cu₃Au): four minority neighbours
    /// forming an in-plane square.
    L12Cu,
    /// L1₂ minority site (the Au site of Cu₃Au): all twelve neighbours of
    /// the majority species.
    L12Au,
    /// B2 ordering (CsCl): opposite species on the first shell, same
    /// species on the second.
    B2,
}

/// Classifies a matched FCC cloud.
///
/// `mapping` sends template slots to cloud slots and `numbers` holds the
/// species per cloud slot; `ideal` is the FCC template.
pub fn find_fcc_alloy_type(mapping: &[i8], numbers: &[i32], ideal: &[Vector3<f64>]) -> AlloyType {
    let central = numbers[mapping[0] as usize];
    let species = |slot: usize| numbers[mapping[slot] as usize];

    let like: Vec<usize> = (1..13).filter(|&i| species(i) == central).collect();
    let unlike: Vec<usize> = (1..13).filter(|&i| species(i) != central).collect();

    let uniform = |slots: &[usize]| slots.windows(2).all(|w| species(w[0]) == species(w[1]));

    match like.len() {
        12 => AlloyType::Pure,
        0 if uniform(&unlike) => AlloyType::L12Au,
        8 if uniform(&unlike) && is_axis_square(&unlike, ideal) => AlloyType::L12Cu,
        4 if uniform(&unlike) && is_axis_square(&like, ideal) => AlloyType::L10,
        _ => AlloyType::None,
    }
}

/// Classifies a matched BCC cloud. The first shell occupies template slots
/// 1..=8, the second shell slots 9..=14.
pub fn find_bcc_alloy_type(mapping: &[i8], numbers: &[i32]) -> AlloyType {
    let central = numbers[mapping[0] as usize];
    let species = |slot: usize| numbers[mapping[slot] as usize];

    if (1..15).all(|i| species(i) == central) {
        return AlloyType::Pure;
    }

    let first = species(1);
    let inner_uniform = (2..9).all(|i| species(i) == first);
    let outer_like = (9..15).all(|i| species(i) == central);
    if first != central && inner_uniform && outer_like {
        return AlloyType::B2;
    }
    AlloyType::None
}

/// True when the four template slots form two antipodal pairs spanning
/// orthogonal directions, i.e. the in-plane square of a layered cubic
/// ordering.
fn is_axis_square(slots: &[usize], ideal: &[Vector3<f64>]) -> bool {
    if slots.len() != 4 {
        return false;
    }
    let p0 = ideal[slots[0]];
    let mut partner = None;
    for &other in &slots[1..] {
        if (p0 + ideal[other]).norm() < GEOM_EPS {
            partner = Some(other);
        }
    }
    let Some(partner) = partner else {
        return false;
    };
    let (rest_a, rest_b): (usize, usize) = {
        let rest: Vec<usize> = slots[1..]
            .iter()
            .copied()
            .filter(|&s| s != partner)
            .collect();
        (rest[0], rest[1])
    };
    (ideal[rest_a] + ideal[rest_b]).norm() < GEOM_EPS
        && p0.dot(&ideal[rest_a]).abs() < GEOM_EPS
}
