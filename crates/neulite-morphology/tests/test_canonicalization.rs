// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Skeleton Canonicalization Integration Tests

Covers the full parse -> validate -> axon stub -> depth-first renumbering path:
- Canonical layout properties on randomly generated trees
- Idempotence when canonical output is fed back in
- Directory preparation (file naming, failure attribution)
*/

use neulite_morphology::{
    canonicalize_swc, format_swc, load_canonical, prepare_morphologies, CompartmentPoint,
    MorphologyError, Position, SectionType,
};
use proptest::prelude::*;

/// Random tree: a soma root, soma/dendrite points hanging off earlier
/// non-axon points, then an axon hanging off the soma or earlier axon points
fn arb_skeleton() -> impl Strategy<Value = Vec<CompartmentPoint>> {
    let coord = -200.0f64..200.0;
    let index = any::<prop::sample::Index>();
    let dendrites = prop::collection::vec(
        (index.clone(), 1i32..=4, coord.clone(), coord.clone(), coord.clone()),
        0..40,
    );
    let axon = prop::collection::vec((index, coord.clone(), coord.clone(), coord), 1..12);

    (dendrites, axon)
        .prop_map(|(dendrites, axon)| {
            let mut points = vec![CompartmentPoint {
                id: 0,
                section: SectionType::Soma,
                position: Position::new(0.0, 0.0, 0.0),
                radius: 5.0,
                parent: None,
            }];
            for (parent, code, x, y, z) in dendrites {
                // axon codes inside the dendritic part become basal
                let section = match SectionType::from_code(code) {
                    SectionType::Axon => SectionType::Basal,
                    other => other,
                };
                let id = points.len() as u32;
                points.push(CompartmentPoint {
                    id,
                    section,
                    position: Position::new(x, y, z),
                    radius: 1.0,
                    parent: Some(parent.index(points.len()) as u32),
                });
            }
            let mut axon_ids = vec![0u32];
            for (parent, x, y, z) in axon {
                let id = points.len() as u32;
                points.push(CompartmentPoint {
                    id,
                    section: SectionType::Axon,
                    position: Position::new(x, y, z),
                    radius: 0.8,
                    parent: Some(*parent.get(&axon_ids)),
                });
                axon_ids.push(id);
            }
            points
        })
        .prop_flat_map(|points| {
            // root row stays first so the file is read as zero-based
            let root = points[0];
            Just(points[1..].to_vec())
                .prop_shuffle()
                .prop_map(move |mut rest| {
                    rest.insert(0, root);
                    rest
                })
        })
}

proptest! {
    #[test]
    fn canonical_layout_holds_for_random_trees(points in arb_skeleton()) {
        let non_axon = points.iter().filter(|p| p.section != SectionType::Axon).count();
        let skeleton = canonicalize_swc(&format_swc(&points)).unwrap();

        prop_assert!(skeleton.verify().is_ok());
        prop_assert_eq!(skeleton.len(), non_axon + 2);
        prop_assert_eq!(skeleton.count_of(SectionType::Axon), 2);
        for (index, point) in skeleton.points().iter().enumerate() {
            prop_assert_eq!(point.id as usize, index);
            match point.parent {
                None => prop_assert_eq!(index, 0),
                Some(parent) => prop_assert!(parent < point.id),
            }
        }
    }

    #[test]
    fn canonicalization_is_idempotent(points in arb_skeleton()) {
        let first = canonicalize_swc(&format_swc(&points)).unwrap().to_swc_string();
        let second = canonicalize_swc(&first).unwrap().to_swc_string();
        prop_assert_eq!(first, second);
    }
}

#[test]
fn test_one_based_example_yields_six_rows() {
    let text = "\
#index type x y z radius parent
1 1 0.0 0.0 0.0 6.0 -1
2 2 0.0 -15.0 0.0 0.5 1
3 3 5.0 5.0 0.0 1.0 1
4 3 9.0 9.0 0.0 1.0 3
5 4 0.0 12.0 3.0 1.5 1
";
    let skeleton = canonicalize_swc(text).unwrap();
    assert_eq!(skeleton.len(), 6);
    let ids: Vec<u32> = skeleton.points().iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![0, 1, 2, 3, 4, 5]);

    let out = skeleton.to_swc_string();
    let mut lines = out.lines();
    assert_eq!(lines.next(), Some("#id type x y z r parent"));
    assert_eq!(lines.next(), Some("0 1 0.000000 0.000000 0.000000 6.000000 -1"));
    // stub runs straight down from the soma
    assert!(out.contains("0.000000 -30.000000 0.000000 0.500000"));
    assert!(out.contains("0.000000 -60.000000 0.000000 0.500000"));
}

#[test]
fn test_prepare_writes_converted_files_with_same_names() {
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();
    std::fs::write(
        src.path().join("b_cell.swc"),
        "1 1 0 0 0 5 -1\n2 2 0 -20 0 1 1\n3 3 10 0 0 1 1\n",
    )
    .unwrap();
    std::fs::write(
        src.path().join("a_cell.swc"),
        "0 1 0 0 0 5 -1\n1 2 20 0 0 1 0\n2 2 40 1 0 1 1\n",
    )
    .unwrap();
    std::fs::write(src.path().join("notes.txt"), "not a skeleton").unwrap();

    let out_dir = dst.path().join("swc");
    let summary = prepare_morphologies(src.path(), &out_dir).unwrap();
    let names: Vec<String> = summary
        .converted
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["a_cell.swc", "b_cell.swc"]);

    for path in &summary.converted {
        let skeleton = load_canonical(path).unwrap();
        skeleton.verify().unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), skeleton.to_swc_string());
    }
}

#[test]
fn test_prepare_fails_on_cell_without_axon() {
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();
    std::fs::write(src.path().join("no_axon.swc"), "0 1 0 0 0 5 -1\n1 3 1 0 0 1 0\n").unwrap();

    let err = prepare_morphologies(src.path(), dst.path()).unwrap_err();
    assert!(err.to_string().contains("no_axon.swc"));
    assert!(matches!(err.root_cause(), MorphologyError::Domain(_)));
}
