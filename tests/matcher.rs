//! End-to-end matching scenarios.

use approx::assert_relative_eq;
use nalgebra::{Point3, Quaternion, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use facette::reference::TABLES;
use facette::{quaternion, LocalHandle, Matcher, AlloyType, StructureType, Templates};

fn to_cloud(points: &[Vector3<f64>]) -> Vec<Point3<f64>> {
    points.iter().map(|p| Point3::from(*p)).collect()
}

fn rotated_cloud(points: &[Vector3<f64>], q: &Quaternion<f64>) -> Vec<Point3<f64>> {
    let rotation = quaternion::to_rotation_matrix(q);
    points.iter().map(|p| Point3::from(rotation * p)).collect()
}

/// The returned transform must reproduce the centred observed cloud:
/// applying scale and rotation to the template and permuting by the
/// mapping leaves a total squared residual of (N + 1) · (scale · rmsd)².
fn assert_transform_reproduces_cloud(
    result: &facette::MatchResult,
    cloud: &[Point3<f64>],
    kind: StructureType,
) {
    let template = TABLES.get(kind);
    let m = template.num_nbrs + 1;

    let barycentre = cloud[..m]
        .iter()
        .map(|p| p.coords)
        .sum::<Vector3<f64>>()
        / m as f64;
    let rotation = result.quaternion.to_rotation_matrix();

    let mut residual = 0.0;
    for i in 0..m {
        let observed = cloud[result.mapping[i] as usize].coords - barycentre;
        let predicted = rotation * template.points[i] * result.scale;
        residual += (predicted - observed).norm_squared();
    }
    let expected = m as f64 * (result.scale * result.rmsd).powi(2);
    assert!(
        (residual - expected).abs() < 1e-9 + expected * 1e-6,
        "residual {residual} does not satisfy the rmsd law {expected}"
    );
}

fn assert_permutation(mapping: &[i8], len: usize) {
    let mut sorted: Vec<i8> = mapping[..len].to_vec();
    sorted.sort_unstable();
    let identity: Vec<i8> = (0..len as i8).collect();
    assert_eq!(sorted, identity, "mapping is not a permutation");
}

#[test]
fn ideal_fcc_matches_fcc() {
    let mut handle = LocalHandle::new();
    let matcher = Matcher {
        templates: Templates::FCC,
        ..Matcher::default()
    };

    let cloud = to_cloud(&TABLES.fcc.points);
    let result = matcher.index(&mut handle, &cloud, None);

    assert_eq!(result.structure, Some(StructureType::Fcc));
    assert!(result.rmsd < 1e-7);
    assert_relative_eq!(result.scale, 1.0, epsilon = 1e-7);
    assert_permutation(&result.mapping, 13);

    // identity rotation up to a cube symmetry
    let identity = Quaternion::identity();
    let q = result.quaternion.into_inner();
    assert!(quaternion::disorientation(&q, &identity) < 1e-6);

    assert_transform_reproduces_cloud(&result, &cloud, StructureType::Fcc);
}

#[test]
fn scaled_rotated_bcc_matches_bcc() {
    let mut handle = LocalHandle::new();
    let matcher = Matcher::default();

    let z90 = Quaternion::new(
        std::f64::consts::FRAC_1_SQRT_2,
        0.0,
        0.0,
        std::f64::consts::FRAC_1_SQRT_2,
    );
    let rotation = quaternion::to_rotation_matrix(&z90);
    let cloud: Vec<Point3<f64>> = TABLES
        .bcc
        .points
        .iter()
        .map(|p| Point3::from(rotation * (p * 2.0)))
        .collect();

    let result = matcher.index(&mut handle, &cloud, None);

    assert_eq!(result.structure, Some(StructureType::Bcc));
    assert_relative_eq!(result.scale, 2.0, epsilon = 1e-7);
    assert!(result.rmsd < 1e-7);

    let q = result.quaternion.into_inner();
    assert!(quaternion::disorientation(&q, &z90) < 1e-6);
    assert_transform_reproduces_cloud(&result, &cloud, StructureType::Bcc);
}

#[test]
fn ideal_hcp_beats_the_other_close_packed_templates() {
    let mut handle = LocalHandle::new();
    let matcher = Matcher {
        templates: Templates::FCC | Templates::HCP | Templates::ICO,
        ..Matcher::default()
    };

    let cloud = to_cloud(&TABLES.hcp.points);
    let result = matcher.index(&mut handle, &cloud, None);

    assert_eq!(result.structure, Some(StructureType::Hcp));
    assert!(result.rmsd < 1e-7);
    assert_transform_reproduces_cloud(&result, &cloud, StructureType::Hcp);
}

#[test]
fn ideal_ico_matches_ico() {
    let mut handle = LocalHandle::new();
    let matcher = Matcher::default();

    let cloud = to_cloud(&TABLES.ico.points);
    let result = matcher.index(&mut handle, &cloud, None);

    assert_eq!(result.structure, Some(StructureType::Ico));
    assert!(result.rmsd < 1e-7);
}

#[test]
fn perturbed_fcc_still_matches_with_a_small_deviation() {
    let mut handle = LocalHandle::new();
    let matcher = Matcher {
        templates: Templates::FCC,
        ..Matcher::default()
    };

    let mut cloud = to_cloud(&TABLES.fcc.points);
    cloud[1] += Vector3::new(0.05, 0.0, 0.0);
    let result = matcher.index(&mut handle, &cloud, None);

    assert_eq!(result.structure, Some(StructureType::Fcc));
    // about 0.05 / sqrt(12), spread over the cloud
    assert!(result.rmsd > 0.008 && result.rmsd < 0.02, "rmsd = {}", result.rmsd);
    assert_permutation(&result.mapping, 13);
    assert_transform_reproduces_cloud(&result, &cloud, StructureType::Fcc);
}

#[test]
fn random_cloud_matches_nothing_convincingly() {
    let mut handle = LocalHandle::new();
    let matcher = Matcher::default();

    let mut rng = StdRng::seed_from_u64(42);
    let mut cloud = vec![Point3::origin()];
    for _ in 0..14 {
        // uniform on the unit sphere
        let z: f64 = rng.gen_range(-1.0..1.0);
        let phi: f64 = rng.gen_range(0.0..std::f64::consts::TAU);
        let r = (1.0 - z * z).sqrt();
        cloud.push(Point3::new(r * phi.cos(), r * phi.sin(), z));
    }

    let result = matcher.index(&mut handle, &cloud, None);
    // a structureless cloud either fails the combinatorial screens
    // outright or survives them with a deviation no caller would accept
    assert!(
        !result.is_match() || result.rmsd > 0.15,
        "random cloud matched {:?} at rmsd {}",
        result.structure,
        result.rmsd
    );
}

#[test]
fn sc_has_no_alloy_classification() {
    let mut handle = LocalHandle::new();
    let matcher = Matcher {
        templates: Templates::SC,
        ..Matcher::default()
    };

    let cloud = to_cloud(&TABLES.sc.points);
    let species = [1i32, 2, 2, 2, 2, 2, 2];
    let result = matcher.index(&mut handle, &cloud, Some(&species));

    assert_eq!(result.structure, Some(StructureType::Sc));
    assert_eq!(result.alloy, AlloyType::None);
}

#[test]
fn b2_ordering_is_recognised() {
    let mut handle = LocalHandle::new();
    let matcher = Matcher::default();

    let cloud = to_cloud(&TABLES.bcc.points);
    let mut species = [1i32; 15];
    for slot in 1..=8 {
        species[slot] = 2;
    }
    let result = matcher.index(&mut handle, &cloud, Some(&species));

    assert_eq!(result.structure, Some(StructureType::Bcc));
    assert_eq!(result.alloy, AlloyType::B2);
}

#[test]
fn uniform_scaling_is_recovered_for_every_template() {
    let mut handle = LocalHandle::new();
    let matcher = Matcher::default();

    for (kind, template) in [
        (StructureType::Sc, &TABLES.sc),
        (StructureType::Fcc, &TABLES.fcc),
        (StructureType::Hcp, &TABLES.hcp),
        (StructureType::Ico, &TABLES.ico),
        (StructureType::Bcc, &TABLES.bcc),
    ] {
        let cloud: Vec<Point3<f64>> = template
            .points
            .iter()
            .map(|p| Point3::from(p * 3.0))
            .collect();
        let result = matcher.index(&mut handle, &cloud, None);

        assert_eq!(result.structure, Some(kind));
        assert_relative_eq!(result.scale, 3.0, epsilon = 1e-7);
        assert!(result.rmsd < 1e-7);
    }
}

#[test]
fn rotated_templates_keep_their_type() {
    let mut handle = LocalHandle::new();
    let matcher = Matcher::default();

    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..20 {
        let q = Quaternion::new(
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
        );
        if q.norm() < 0.1 {
            continue;
        }
        let q = q.normalize();

        for (kind, template) in [
            (StructureType::Sc, &TABLES.sc),
            (StructureType::Fcc, &TABLES.fcc),
            (StructureType::Hcp, &TABLES.hcp),
            (StructureType::Ico, &TABLES.ico),
            (StructureType::Bcc, &TABLES.bcc),
        ] {
            let cloud = rotated_cloud(&template.points, &q);
            let result = matcher.index(&mut handle, &cloud, None);

            assert_eq!(result.structure, Some(kind), "under rotation {q:?}");
            assert!(result.rmsd < 1e-6);
            assert_relative_eq!(result.quaternion.norm(), 1.0, epsilon = 1e-9);
            assert_permutation(&result.mapping, template.num_nbrs + 1);
            assert_transform_reproduces_cloud(&result, &cloud, kind);

            // cubic matches report the rotation inside the fundamental zone
            if matches!(
                kind,
                StructureType::Sc | StructureType::Fcc | StructureType::Bcc
            ) {
                let reported = result.quaternion.into_inner();
                assert!(
                    quaternion::disorientation(&reported, &q) < 1e-6,
                    "reported rotation disagrees with the applied one"
                );
            }
        }
    }
}

#[test]
fn automorphic_reorderings_of_a_template_match_exactly() {
    let mut handle = LocalHandle::new();
    let matcher = Matcher::default();

    for (kind, template) in [
        (StructureType::Sc, &TABLES.sc),
        (StructureType::Fcc, &TABLES.fcc),
        (StructureType::Bcc, &TABLES.bcc),
    ] {
        let m = template.num_nbrs + 1;
        let graph = &template.graphs[0];
        for j in 0..graph.num_automorphisms.min(8) {
            let auto = &TABLES.automorphisms[graph.automorphism_index + j];

            let mut permuted = vec![Point3::origin(); m];
            for i in 0..m {
                permuted[auto[i] as usize] = Point3::from(template.points[i]);
            }

            let result = matcher.index(&mut handle, &permuted, None);
            assert_eq!(result.structure, Some(kind));
            assert!(result.rmsd < 1e-9, "automorphism {j} of {kind}");
        }
    }
}
