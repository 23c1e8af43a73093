//! The matcher orchestrator.
//!
//! One invocation runs the full pipeline for every requested template:
//! convex hull, degree screen, canonical hash lookup, and one alignment per
//! automorphism of every matching reference graph. The lowest deviation
//! across all candidates wins; ties keep the earliest candidate in table
//! order, so identical inputs always produce identical output.

use bitflags::bitflags;
use nalgebra::{Point3, Quaternion, UnitQuaternion, Vector3};
use rayon::prelude::*;

use crate::alignment;
use crate::alloy::{self, AlloyType};
use crate::canonical;
use crate::convex_hull::{self, MAX_FACETS};
use crate::deformation::{self, Deformation};
use crate::geometry::{self, MAX_POINTS};
use crate::ordering::LocalHandle;
use crate::quaternion;
use crate::reference::{ReferenceStructure, StructureType, TABLES};

/// Largest accepted input cloud; the slack beyond [`MAX_POINTS`] leaves the
/// neighbour-ordering collaborator room to demote spurious neighbours.
pub const MAX_INPUT_POINTS: usize = 19;

bitflags! {
    /// Selection of templates to try.
    pub struct Templates: u32 {
        const SC = 0b00001;
        const FCC = 0b00010;
        const HCP = 0b00100;
        const ICO = 0b01000;
        const BCC = 0b10000;
    }
}

/// Polyhedral template matcher.
///
/// A plain configuration struct; one instance can serve any number of
/// threads as long as each thread brings its own [`LocalHandle`].
///
/// # Example
///
/// ```rust
/// use facette::{LocalHandle, Matcher, StructureType, Templates};
/// use nalgebra::Point3;
///
/// let mut handle = LocalHandle::new();
/// let matcher = Matcher {
///     templates: Templates::FCC | Templates::HCP,
///     ..Matcher::default()
/// };
///
/// // the thirteen points of an ideal FCC neighbourhood
/// let cloud: Vec<Point3<f64>> = facette::reference::TABLES
///     .fcc
///     .points
///     .iter()
///     .map(|p| Point3::from(*p))
///     .collect();
///
/// let result = matcher.index(&mut handle, &cloud, None);
/// assert_eq!(result.structure, Some(StructureType::Fcc));
/// assert!(result.rmsd < 1e-7);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Matcher {
    /// Templates to try; the best deviation across all of them wins.
    pub templates: Templates,
    /// Ask the handle's collaborator to reorder neighbours topologically
    /// before matching. Falls back to the input order on failure.
    pub topological_ordering: bool,
    /// Also fit the deformation gradient and its polar decomposition.
    pub deformation_gradient: bool,
}

impl Default for Matcher {
    fn default() -> Self {
        Matcher {
            templates: Templates::all(),
            topological_ordering: false,
            deformation_gradient: false,
        }
    }
}

/// Outcome of one matcher invocation.
#[derive(Debug, Clone)]
pub struct MatchResult {
    /// Matched lattice, or `None` if no template fit.
    pub structure: Option<StructureType>,
    /// Chemical ordering, when species were supplied and the match is FCC
    /// or BCC.
    pub alloy: AlloyType,
    /// Isotropic scale carrying the ideal template onto the observed
    /// cloud; positive for every match.
    pub scale: f64,
    /// Root-mean-square deviation in template units; `+∞` when unmatched.
    pub rmsd: f64,
    /// Rotation carrying the ideal template onto the observed cloud,
    /// reduced to the cubic fundamental zone for cubic matches.
    pub quaternion: UnitQuaternion<f64>,
    /// Permutation sending template slots to input cloud slots. Only the
    /// first `N + 1` entries are meaningful, and only for a match.
    pub mapping: [i8; MAX_POINTS],
    /// Deformation gradient, if requested and matched.
    pub deformation: Option<Deformation>,
}

impl MatchResult {
    fn no_match() -> Self {
        let mut mapping = [0i8; MAX_POINTS];
        for (i, slot) in mapping.iter_mut().enumerate() {
            *slot = i as i8;
        }
        MatchResult {
            structure: None,
            alloy: AlloyType::None,
            scale: 0.0,
            rmsd: f64::INFINITY,
            quaternion: UnitQuaternion::identity(),
            mapping,
            deformation: None,
        }
    }

    pub fn is_match(&self) -> bool {
        self.structure.is_some()
    }
}

struct Candidate {
    kind: Option<StructureType>,
    rmsd: f64,
    scale: f64,
    quaternion: Quaternion<f64>,
    mapping: [i8; MAX_POINTS],
}

impl Candidate {
    fn none() -> Self {
        Candidate {
            kind: None,
            rmsd: f64::INFINITY,
            scale: 0.0,
            quaternion: Quaternion::identity(),
            mapping: [0i8; MAX_POINTS],
        }
    }
}

impl Matcher {
    pub fn new() -> Self {
        Matcher::default()
    }

    /// Matches one neighbour cloud against the configured templates.
    ///
    /// `cloud` holds the central point first, then its neighbours; clouds
    /// longer than [`MAX_INPUT_POINTS`] are truncated. `species`, when
    /// supplied, must carry one entry per cloud point and enables alloy
    /// classification for cubic matches.
    ///
    /// Templates requiring more points than supplied are silently skipped;
    /// if every requested template is skipped or rejected, the sentinel
    /// result (`structure == None`, `rmsd == +∞`) is returned.
    pub fn index(
        &self,
        handle: &mut LocalHandle,
        cloud: &[Point3<f64>],
        species: Option<&[i32]>,
    ) -> MatchResult {
        let num_input = cloud.len().min(MAX_INPUT_POINTS);

        let mut ordering = [0i8; MAX_INPUT_POINTS];
        for (i, slot) in ordering.iter_mut().enumerate() {
            *slot = i as i8;
        }
        if self.topological_ordering {
            let mut raw = [Vector3::zeros(); MAX_INPUT_POINTS];
            for (slot, p) in raw.iter_mut().zip(cloud) {
                *slot = p.coords;
            }
            let mut normalized = [Vector3::zeros(); MAX_INPUT_POINTS];
            geometry::normalize_cloud(&raw[..num_input], &mut normalized[..num_input]);
            if let Err(err) = handle.order(&normalized[..num_input], &mut ordering[..num_input]) {
                tracing::debug!(error = %err, "neighbour ordering failed, keeping input order");
                for (i, slot) in ordering.iter_mut().enumerate() {
                    *slot = i as i8;
                }
            }
        }

        let num_points = num_input.min(MAX_POINTS);
        let mut points = [Vector3::zeros(); MAX_POINTS];
        let mut numbers = [0i32; MAX_POINTS];
        for i in 0..num_points {
            let from = ordering[i] as usize;
            points[i] = cloud[from].coords;
            if let Some(species) = species {
                numbers[i] = species[from];
            }
        }

        let mut ch_points = [Vector3::zeros(); MAX_POINTS];
        geometry::normalize_cloud(&points[..num_points], &mut ch_points[..num_points]);

        let mut best = Candidate::none();
        if self.templates.contains(Templates::SC) {
            self.match_single(&TABLES.sc, &ch_points, &points, num_points, &mut best);
        }
        if self
            .templates
            .intersects(Templates::FCC | Templates::HCP | Templates::ICO)
        {
            self.match_close_packed(&ch_points, &points, num_points, &mut best);
        }
        if self.templates.contains(Templates::BCC) {
            self.match_single(&TABLES.bcc, &ch_points, &points, num_points, &mut best);
        }

        let Some(kind) = best.kind else {
            return MatchResult::no_match();
        };
        let s = TABLES.get(kind);
        let m = s.num_nbrs + 1;
        tracing::debug!(template = %kind, rmsd = best.rmsd, "matched");

        let mut q = best.quaternion;
        if let Some(rows) = &s.cubic_mapping {
            let bi = quaternion::rotate_into_cubic_fundamental_zone(&mut q);
            let row = &rows[bi];
            let mut permuted = [0i8; MAX_POINTS];
            for i in 0..m {
                permuted[row[i] as usize] = best.mapping[i];
            }
            best.mapping[..m].copy_from_slice(&permuted[..m]);
        }

        let alloy = match (species, kind) {
            (Some(_), StructureType::Fcc) => {
                alloy::find_fcc_alloy_type(&best.mapping[..m], &numbers[..m], &s.points)
            }
            (Some(_), StructureType::Bcc) => {
                alloy::find_bcc_alloy_type(&best.mapping[..m], &numbers[..m])
            }
            _ => AlloyType::None,
        };

        let deformation = self.deformation_gradient.then(|| {
            let mut scaled = [Vector3::zeros(); MAX_POINTS];
            geometry::subtract_barycentre(&points[..m], &mut scaled[..m]);
            for p in &mut scaled[..m] {
                *p /= best.scale;
            }
            deformation::deformation_gradient(&s.points, &best.mapping[..m], &scaled, &s.penrose)
        });

        let mut mapping = [0i8; MAX_POINTS];
        for i in 0..m {
            mapping[i] = ordering[best.mapping[i] as usize];
        }

        MatchResult {
            structure: Some(kind),
            alloy,
            scale: best.scale,
            rmsd: best.rmsd,
            quaternion: UnitQuaternion::from_quaternion(q),
            mapping,
            deformation,
        }
    }

    /// Matches many clouds, one worker-local scratch handle per thread.
    ///
    /// Batch handles carry no ordering collaborator, so configurations
    /// requesting topological ordering fall back to the input order here.
    pub fn index_batch(&self, clouds: &[Vec<Point3<f64>>]) -> Vec<MatchResult> {
        clouds
            .par_iter()
            .map_init(LocalHandle::new, |handle, cloud| {
                self.index(handle, cloud, None)
            })
            .collect()
    }

    /// Hull, degree screen and graph lookup for a template with its own
    /// hull geometry (SC and BCC).
    fn match_single(
        &self,
        s: &ReferenceStructure,
        ch_points: &[Vector3<f64>; MAX_POINTS],
        points: &[Vector3<f64>; MAX_POINTS],
        num_points: usize,
        best: &mut Candidate,
    ) {
        let m = s.num_nbrs + 1;
        if num_points < m {
            tracing::trace!(template = %s.kind, "not enough points, template skipped");
            return;
        }

        let mut facets = [[0i8; 3]; MAX_FACETS];
        if let Err(err) = convex_hull::convex_hull(&ch_points[..m], s.num_facets, &mut facets) {
            tracing::trace!(template = %s.kind, error = %err, "hull rejected");
            return;
        }

        let mut degree = [0i8; canonical::MAX_NODES];
        let top = canonical::graph_degree(&facets[..s.num_facets], s.num_nbrs, &mut degree);
        if top > s.max_degree {
            tracing::trace!(template = %s.kind, degree = top, "degree bound exceeded");
            return;
        }
        if s.kind == StructureType::Sc && degree[..s.num_nbrs].iter().any(|&d| d != 4) {
            tracing::trace!("irregular degrees, sc rejected");
            return;
        }

        let mut normalized = [Vector3::zeros(); MAX_POINTS];
        geometry::subtract_barycentre(&points[..m], &mut normalized[..m]);

        let mut labelling = [0i8; MAX_POINTS];
        let hash = canonical::canonical_form(
            &facets[..s.num_facets],
            s.num_nbrs,
            &degree,
            &mut labelling,
        );
        tracing::trace!(template = %s.kind, hash = format_args!("{hash:#x}"), "hull canonicalised");
        check_graphs(s, hash, &labelling, &normalized[..m], best);
    }

    /// FCC, HCP and ICO share their hull geometry; one hull feeds every
    /// requested member of the cluster.
    fn match_close_packed(
        &self,
        ch_points: &[Vector3<f64>; MAX_POINTS],
        points: &[Vector3<f64>; MAX_POINTS],
        num_points: usize,
        best: &mut Candidate,
    ) {
        let s = &TABLES.fcc;
        let m = s.num_nbrs + 1;
        if num_points < m {
            tracing::trace!("not enough points, close-packed templates skipped");
            return;
        }

        let mut facets = [[0i8; 3]; MAX_FACETS];
        if let Err(err) = convex_hull::convex_hull(&ch_points[..m], s.num_facets, &mut facets) {
            tracing::trace!(error = %err, "hull rejected for the close-packed cluster");
            return;
        }

        let mut degree = [0i8; canonical::MAX_NODES];
        let top = canonical::graph_degree(&facets[..s.num_facets], s.num_nbrs, &mut degree);
        if top > s.max_degree {
            tracing::trace!(degree = top, "degree bound exceeded for the close-packed cluster");
            return;
        }

        let mut normalized = [Vector3::zeros(); MAX_POINTS];
        geometry::subtract_barycentre(&points[..m], &mut normalized[..m]);

        let mut labelling = [0i8; MAX_POINTS];
        let hash = canonical::canonical_form(
            &facets[..s.num_facets],
            s.num_nbrs,
            &degree,
            &mut labelling,
        );
        tracing::trace!(hash = format_args!("{hash:#x}"), "close-packed hull canonicalised");

        if self.templates.contains(Templates::FCC) {
            check_graphs(&TABLES.fcc, hash, &labelling, &normalized[..m], best);
        }
        if self.templates.contains(Templates::HCP) {
            check_graphs(&TABLES.hcp, hash, &labelling, &normalized[..m], best);
        }
        if self.templates.contains(Templates::ICO) {
            check_graphs(&TABLES.ico, hash, &labelling, &normalized[..m], best);
        }
    }
}

/// Aligns the cloud against every automorphism of every reference graph
/// whose hash matches, keeping the strictly best deviation.
fn check_graphs(
    s: &ReferenceStructure,
    hash: u64,
    labelling: &[i8; MAX_POINTS],
    normalized: &[Vector3<f64>],
    best: &mut Candidate,
) {
    let m = s.num_nbrs + 1;

    let mut inverse = [0i8; MAX_POINTS];
    for i in 0..m {
        inverse[labelling[i] as usize] = i as i8;
    }

    let g1: f64 = s.points.iter().map(|p| p.norm_squared()).sum();
    let g2: f64 = normalized.iter().map(|p| p.norm_squared()).sum();

    for graph in &s.graphs {
        if graph.hash != hash {
            continue;
        }
        for j in 0..graph.num_automorphisms {
            let auto = &TABLES.automorphisms[graph.automorphism_index + j];
            let mut mapping = [0i8; MAX_POINTS];
            for k in 0..m {
                mapping[auto[k] as usize] = inverse[graph.canonical_labelling[k] as usize];
            }

            let alignment = alignment::align(&s.points, normalized, &mapping[..m], g1, g2);
            if alignment.rmsd < best.rmsd
                && alignment.scale.is_finite()
                && alignment.scale > 0.0
            {
                *best = Candidate {
                    kind: Some(s.kind),
                    rmsd: alignment.rmsd,
                    scale: alignment.scale,
                    quaternion: alignment.quaternion,
                    mapping,
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_cloud(points: &[Vector3<f64>]) -> Vec<Point3<f64>> {
        points.iter().map(|p| Point3::from(*p)).collect()
    }

    #[test]
    fn too_few_points_is_a_clean_miss() {
        let mut handle = LocalHandle::new();
        let matcher = Matcher::default();

        let cloud = to_cloud(&TABLES.sc.points[..5]);
        let result = matcher.index(&mut handle, &cloud, None);
        assert!(!result.is_match());
        assert_eq!(result.rmsd, f64::INFINITY);
        assert_eq!(result.scale, 0.0);
    }

    #[test]
    fn sc_template_matches_itself() {
        let mut handle = LocalHandle::new();
        let matcher = Matcher {
            templates: Templates::SC,
            ..Matcher::default()
        };

        let cloud = to_cloud(&TABLES.sc.points);
        let result = matcher.index(&mut handle, &cloud, None);
        assert_eq!(result.structure, Some(StructureType::Sc));
        assert!(result.rmsd < 1e-7);
        assert!((result.scale - 1.0).abs() < 1e-7);
    }

    #[test]
    fn coplanar_cloud_is_a_clean_miss() {
        let mut handle = LocalHandle::new();
        let matcher = Matcher::default();

        let mut cloud = vec![Point3::origin()];
        for i in 0..12 {
            let angle = f64::from(i) * std::f64::consts::PI / 6.0;
            cloud.push(Point3::new(angle.cos(), angle.sin(), 0.0));
        }
        cloud.push(Point3::new(0.1, 0.0, 0.0));
        cloud.push(Point3::new(0.0, 0.1, 0.0));

        let result = matcher.index(&mut handle, &cloud, None);
        assert!(!result.is_match());
    }

    #[test]
    fn batch_agrees_with_single_calls() {
        let matcher = Matcher::default();
        let clouds = vec![
            to_cloud(&TABLES.fcc.points),
            to_cloud(&TABLES.bcc.points),
            to_cloud(&TABLES.hcp.points),
        ];

        let batch = matcher.index_batch(&clouds);
        assert_eq!(batch.len(), 3);
        assert_eq!(batch[0].structure, Some(StructureType::Fcc));
        assert_eq!(batch[1].structure, Some(StructureType::Bcc));
        assert_eq!(batch[2].structure, Some(StructureType::Hcp));

        let mut handle = LocalHandle::new();
        for (cloud, from_batch) in clouds.iter().zip(&batch) {
            let single = matcher.index(&mut handle, cloud, None);
            assert_eq!(single.structure, from_batch.structure);
            assert_eq!(single.mapping, from_batch.mapping);
            assert_eq!(single.rmsd.to_bits(), from_batch.rmsd.to_bits());
        }
    }
}
