// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Connection Synthesis Integration Tests

Runs the full merge -> partition -> sample -> gather -> write path on local
clusters of different sizes, covering:
- Byte-identical output regardless of worker count
- Row filtering and ordering of the written table
- Empty and fully filtered population pairs (no file written)
- Partition and external sort properties
*/

use std::path::Path;

use neulite_connectome::{
    collate, connection_path, partition, partition_ranges, run_local, synthesize_connections,
    Cluster, DirectorySkeletonLoader, EdgeBucket, EdgeSortKey, NetworkDescription, SortOptions,
    SynthesisInput, SynthesisOptions, SynthesisSummary, CONNECTION_CSV_HEADER,
};
use neulite_morphology::{load_canonical, prepare_morphologies};
use proptest::prelude::*;

const PYRAMIDAL: &str = "\
# pyramidal
1 1 0 0 0 8 -1
2 1 0 4 0 6 1
3 2 0 -10 0 1 1
4 2 1 -25 0 1 3
5 3 12 0 0 1 1
6 3 20 3 0 1 5
7 3 28 5 0 1 6
8 4 0 20 0 2 2
9 4 0 40 1 2 8
";

const BASKET: &str = "\
0 1 0 0 0 6 -1
1 3 -8 0 0 1 0
2 3 -16 -2 0 1 1
3 3 8 0 0 1 0
4 2 0 -12 0 1 0
5 2 1 -24 0 1 4
";

struct Fixture {
    _dir: tempfile::TempDir,
    morphologies: std::path::PathBuf,
    converted: std::path::PathBuf,
    output: std::path::PathBuf,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let morphologies = dir.path().join("morphologies");
    let converted = dir.path().join("neulite").join("data");
    let output = dir.path().join("neulite");
    std::fs::create_dir_all(&morphologies).unwrap();
    std::fs::write(morphologies.join("pyr.swc"), PYRAMIDAL).unwrap();
    std::fs::write(morphologies.join("basket.swc"), BASKET).unwrap();
    prepare_morphologies(&morphologies, &converted).unwrap();
    Fixture {
        _dir: dir,
        morphologies,
        converted,
        output,
    }
}

fn network(dir: &Path) -> SynthesisInput {
    let description: NetworkDescription = serde_json::from_value(serde_json::json!({
        "nodes": [
            {"node_id": 0, "node_type_id": 100},
            {"node_id": 1, "node_type_id": 100},
            {"node_id": 2, "node_type_id": 100},
            {"node_id": 3, "node_type_id": 101},
            {"node_id": 4, "node_type_id": 101},
            {"node_id": 5, "node_type_id": 102},
            {"node_id": 6, "node_type_id": 103},
            {"node_id": 7, "node_type_id": 100}
        ],
        "node_types": [
            {"node_type_id": 100, "model_type": "biophysical", "morphology": "pyr.swc", "ei": "e"},
            {"node_type_id": 101, "model_type": "biophysical", "morphology": "basket.swc", "ei": "i"},
            {"node_type_id": 102, "model_type": "virtual"},
            {"node_type_id": 103, "model_type": "biophysical", "morphology": "absent.swc", "ei": "e"}
        ],
        "edge_types": [
            {"edge_type_id": 10, "syn_weight": 0.002, "target_sections": ["basal", "apical"],
             "delay": 1.5, "dynamics_params": {"tau1": 0.2, "tau2": 3.0, "erev": 0.0}},
            {"edge_type_id": 11, "syn_weight": 0.004, "target_sections": "['somatic']",
             "delay": 0.5, "dynamics_params": {"tau1": 0.5, "tau2": 8.0, "erev": -70.0}},
            {"edge_type_id": 12, "syn_weight": 0.001, "target_sections": ["axon", "basal"],
             "delay": 2.0}
        ],
        "edges": [
            {"source_population": "v1", "target_population": "v1",
             "source_node_ids": [0, 1, 2, 3, 5, 0, 3],
             "target_node_ids": [1, 2, 0, 7, 1, 6, 4],
             "edge_type_ids":   [10, 10, 10, 11, 10, 10, 11],
             "nsyns":           [3, 5, 2, 4, 2, 3, 6]},
            {"source_population": "lgn", "target_population": "v1",
             "source_node_ids": [5], "target_node_ids": [0],
             "edge_type_ids": [10], "nsyns": [1]},
            {"source_population": "v1", "target_population": "v1",
             "source_node_ids": [3, 7, 2], "target_node_ids": [7, 4, 3],
             "edge_type_ids": [12, 12, 10], "nsyns": [4, 2, 7]}
        ]
    }))
    .unwrap();
    description.resolve(dir).unwrap()
}

fn run(
    workers: usize,
    input: &SynthesisInput,
    options: &SynthesisOptions,
    loader: &DirectorySkeletonLoader,
) -> SynthesisSummary {
    let results = run_local(workers, |cluster| {
        let input = cluster.is_leader().then_some(input);
        synthesize_connections(cluster, input, options, loader)
    })
    .unwrap();
    assert!(results[1..].iter().all(Option::is_none));
    results.into_iter().next().flatten().unwrap()
}

#[test]
fn test_output_is_identical_for_any_worker_count() {
    let fx = fixture();
    let input = network(&fx.morphologies);
    let loader = DirectorySkeletonLoader::new(&fx.morphologies, Some(fx.converted.clone()));

    let mut outputs = Vec::new();
    for workers in 1..=5 {
        let mut options = SynthesisOptions::new("v1", "v1", fx.output.join(format!("w{}", workers)));
        options.seed = 2025;
        let summary = run(workers, &input, &options, &loader);
        assert_eq!(summary.workers, workers);
        assert_eq!(summary.edges, 10);
        let path = summary.output.unwrap();
        assert_eq!(path, connection_path(&options));
        outputs.push(std::fs::read(path).unwrap());
    }
    assert!(outputs.windows(2).all(|pair| pair[0] == pair[1]));

    let mut options = SynthesisOptions::new("v1", "v1", fx.output.join("reseeded"));
    options.seed = 2026;
    let reseeded = run(2, &input, &options, &loader);
    // same rows, possibly different compartments
    assert_eq!(reseeded.stats.kept, 33);
}

#[test]
fn test_written_rows_are_filtered_sorted_and_in_range() {
    let fx = fixture();
    let input = network(&fx.morphologies);
    let loader = DirectorySkeletonLoader::new(&fx.morphologies, Some(fx.converted.clone()));
    let mut options = SynthesisOptions::new("v1", "v1", &fx.output);
    options.seed = 9;

    let summary = run(3, &input, &options, &loader);
    // 3+5+2+4+2+3+6 + 4+2+7 synapses
    assert_eq!(summary.stats.synapses, 38);
    // source 5 is virtual
    assert_eq!(summary.stats.dropped_source, 2);
    // node 6 has an unloadable skeleton
    assert_eq!(summary.stats.dropped_unresolved, 3);
    // every target node is biophysical
    assert_eq!(summary.stats.dropped_target, 0);
    assert_eq!(summary.stats.kept, 38 - 2 - 3);

    let text = std::fs::read_to_string(summary.output.unwrap()).unwrap();
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some(CONNECTION_CSV_HEADER));

    let pyr = load_canonical(&fx.converted.join("pyr.swc")).unwrap();
    let basket = load_canonical(&fx.converted.join("basket.swc")).unwrap();
    let mut keys = Vec::new();
    for line in lines {
        let fields: Vec<&str> = line.split(',').collect();
        assert_eq!(fields.len(), 9);
        let pre: u64 = fields[0].parse().unwrap();
        let post: u64 = fields[1].parse().unwrap();
        let cid: usize = fields[2].parse().unwrap();
        let limit = if post == 3 || post == 4 { basket.len() } else { pyr.len() };
        assert!(cid < limit, "cid {} out of range for node {}", cid, post);
        let expected_ei = if pre == 3 || pre == 4 { "i" } else { "e" };
        assert_eq!(fields[8], expected_ei);
        keys.push((pre, post, cid));
    }
    assert_eq!(keys.len() as u64, summary.stats.kept);
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);
}

#[test]
fn test_empty_pair_writes_nothing() {
    let fx = fixture();
    let input = network(&fx.morphologies);
    let loader = DirectorySkeletonLoader::new(&fx.morphologies, Some(fx.converted.clone()));
    let options = SynthesisOptions::new("v1", "lgn", &fx.output);

    let summary = run(3, &input, &options, &loader);
    assert_eq!(summary.edges, 0);
    assert_eq!(summary.output, None);
    assert!(!connection_path(&options).exists());
}

#[test]
fn test_fully_filtered_pair_writes_nothing() {
    let fx = fixture();
    let input = network(&fx.morphologies);
    let loader = DirectorySkeletonLoader::new(&fx.morphologies, Some(fx.converted.clone()));
    let options = SynthesisOptions::new("lgn", "v1", &fx.output);

    let summary = run(2, &input, &options, &loader);
    assert_eq!(summary.edges, 1);
    assert_eq!(summary.stats.dropped_source, 1);
    assert_eq!(summary.output, None);
    assert!(!connection_path(&options).exists());
}

#[test]
fn test_raw_morphologies_are_canonicalized_when_not_converted() {
    let fx = fixture();
    let input = network(&fx.morphologies);
    let converted = DirectorySkeletonLoader::new(&fx.morphologies, Some(fx.converted.clone()));
    let raw_only = DirectorySkeletonLoader::new(&fx.morphologies, None);

    let mut a = SynthesisOptions::new("v1", "v1", fx.output.join("converted"));
    a.seed = 5;
    let mut b = SynthesisOptions::new("v1", "v1", fx.output.join("raw"));
    b.seed = 5;
    let from_converted = run(2, &input, &a, &converted).output.unwrap();
    let from_raw = run(2, &input, &b, &raw_only).output.unwrap();
    assert_eq!(std::fs::read(from_converted).unwrap(), std::fs::read(from_raw).unwrap());
}

fn arb_bucket() -> impl Strategy<Value = EdgeBucket> {
    prop::collection::vec((0u64..20, 0u64..20, 0u32..4, 1u32..5), 0..60).prop_map(|edges| EdgeBucket {
        source_population: "a".to_string(),
        target_population: "b".to_string(),
        source_node_ids: edges.iter().map(|e| e.0).collect(),
        target_node_ids: edges.iter().map(|e| e.1).collect(),
        edge_type_ids: edges.iter().map(|e| e.2).collect(),
        nsyns: edges.iter().map(|e| e.3).collect(),
        ..Default::default()
    })
}

proptest! {
    #[test]
    fn partition_sizes_differ_by_at_most_one(n in 0usize..500, workers in 1usize..17) {
        let rows: Vec<usize> = (0..n).collect();
        let slices = partition(rows.clone(), workers);
        prop_assert_eq!(slices.len(), workers);
        let sizes: Vec<usize> = slices.iter().map(Vec::len).collect();
        let max = sizes.iter().copied().max().unwrap_or(0);
        let min = sizes.iter().copied().min().unwrap_or(0);
        prop_assert!(max - min <= 1);
        prop_assert_eq!(slices.concat(), rows);

        let ranges = partition_ranges(n, workers);
        prop_assert_eq!(ranges.first().map_or(0, |r| r.start), 0);
        prop_assert_eq!(ranges.last().map_or(0, |r| r.end), n);
    }

    #[test]
    fn external_sort_matches_in_memory(buckets in prop::collection::vec(arb_bucket(), 1..4), run_len in 1usize..16) {
        let spill = tempfile::tempdir().unwrap();
        for key in [EdgeSortKey::TargetNodeId, EdgeSortKey::SourceNodeId, EdgeSortKey::EdgeTypeId] {
            let mut in_memory = collate(&buckets, "a", "b").unwrap();
            in_memory.sort(key, &SortOptions::default()).unwrap();
            let mut spilled = collate(&buckets, "a", "b").unwrap();
            spilled.sort(key, &SortOptions {
                max_in_memory_rows: run_len,
                spill_dir: Some(spill.path().to_path_buf()),
            }).unwrap();
            prop_assert_eq!(in_memory, spilled);
        }
    }
}
