// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Connection synthesis for one population pair
//!
//! Every rank calls [`synthesize_connections`] with the same options. The
//! leader additionally passes the [`SynthesisInput`]. Phases are separated
//! by barriers:
//!
//! 1. merge: the leader collates and sorts the edge table
//! 2. partition: the leader expands synapses, slices them and scatters the
//!    slices; catalogs are broadcast
//! 3. process: each rank resolves its slice
//! 4. gather: results return to the leader, which sorts and writes them

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::assembler::{
    assemble, check_edge_types, connection_file_name, emit_connections, expand_synapses,
    AssemblyStats, ConnectionRecord, SynapseRow,
};
use crate::catalog::{EdgeTypeCatalog, NodeCatalog};
use crate::cluster::{broadcast, Cluster};
use crate::collator::{collate, EdgeBucket, EdgeSortKey, SortOptions};
use crate::error::{ConnectomeError, Result};
use crate::partition::{gather, partition, scatter};
use crate::sampler::{CompartmentSampler, SkeletonLoader};

/// Leader-side input
#[derive(Debug, Clone, Default)]
pub struct SynthesisInput {
    pub nodes: NodeCatalog,
    pub edge_types: EdgeTypeCatalog,
    pub buckets: Vec<EdgeBucket>,
}

/// Options shared by all ranks
#[derive(Debug, Clone)]
pub struct SynthesisOptions {
    pub source_population: String,
    pub target_population: String,
    pub output_dir: PathBuf,
    pub sort_key: EdgeSortKey,
    pub sort: SortOptions,
    /// Must be identical on every rank
    pub seed: u64,
}

impl SynthesisOptions {
    pub fn new(
        source_population: impl Into<String>,
        target_population: impl Into<String>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source_population: source_population.into(),
            target_population: target_population.into(),
            output_dir: output_dir.into(),
            sort_key: EdgeSortKey::default(),
            sort: SortOptions::default(),
            seed: 0,
        }
    }
}

/// Leader's report for one population pair
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisSummary {
    pub source_population: String,
    pub target_population: String,
    pub edges: usize,
    pub workers: usize,
    pub stats: AssemblyStats,
    /// `None` when no row survived or there were no edges
    pub output: Option<PathBuf>,
}

#[derive(Serialize, Deserialize)]
struct Catalogs {
    nodes: NodeCatalog,
    edge_types: EdgeTypeCatalog,
}

/// Run synthesis for one population pair on every rank of `cluster`.
///
/// Returns the summary on the leader and `None` elsewhere. Any error aborts
/// the run; files on disk from an aborted run are not trustworthy.
pub fn synthesize_connections<C, L>(
    cluster: &C,
    input: Option<&SynthesisInput>,
    options: &SynthesisOptions,
    loader: &L,
) -> Result<Option<SynthesisSummary>>
where
    C: Cluster + ?Sized,
    L: SkeletonLoader + ?Sized,
{
    let leader = cluster.is_leader();
    let input = match (leader, input) {
        (true, Some(input)) => Some(input),
        (true, None) => {
            return Err(ConnectomeError::Distribution(
                "leader started synthesis without input".to_string(),
            ))
        }
        (false, _) => None,
    };
    let empty_summary = || SynthesisSummary {
        source_population: options.source_population.clone(),
        target_population: options.target_population.clone(),
        edges: 0,
        workers: cluster.size(),
        stats: AssemblyStats::default(),
        output: None,
    };

    cluster.barrier()?;

    // merge
    let table = match input {
        Some(input) => {
            let mut table = collate(&input.buckets, &options.source_population, &options.target_population)?;
            table.sort(options.sort_key, &options.sort)?;
            Some(table)
        }
        None => None,
    };
    let edges: u64 = broadcast(cluster, table.as_ref().map(|t| t.len() as u64))?;
    cluster.barrier()?;

    if edges == 0 {
        if leader {
            warn!(
                target: "neulite-connectome",
                "No edges for {} -> {}. Not saving.",
                options.source_population,
                options.target_population
            );
            return Ok(Some(empty_summary()));
        }
        return Ok(None);
    }

    // partition
    let slices = match (input, &table) {
        (Some(input), Some(table)) => {
            check_edge_types(table, &input.edge_types)?;
            let synapses = expand_synapses(table);
            info!(
                target: "neulite-connectome",
                "{} -> {}: {} edges expand to {} synapses over {} workers",
                options.source_population,
                options.target_population,
                table.len(),
                synapses.len(),
                cluster.size()
            );
            Some(partition(synapses, cluster.size()))
        }
        _ => None,
    };
    drop(table);
    let slice: Vec<SynapseRow> = scatter(cluster, slices)?;
    let catalogs: Catalogs = broadcast(
        cluster,
        input.map(|input| Catalogs {
            nodes: input.nodes.clone(),
            edge_types: input.edge_types.clone(),
        }),
    )?;
    cluster.barrier()?;

    // process
    let mut sampler = CompartmentSampler::new(&catalogs.nodes, loader);
    let (records, stats) = assemble(&slice, &catalogs.edge_types, &catalogs.nodes, &mut sampler, options.seed)?;
    info!(
        target: "neulite-connectome",
        "Rank {} resolved {} of {} synapses ({} skeletons loaded)",
        cluster.rank(),
        stats.kept,
        stats.synapses,
        sampler.cache().loads()
    );
    cluster.barrier()?;

    // gather
    let gathered: Option<Vec<(Vec<ConnectionRecord>, AssemblyStats)>> = gather(cluster, (records, stats))?;
    cluster.barrier()?;

    let Some(parts) = gathered else {
        return Ok(None);
    };
    let mut total = AssemblyStats::default();
    let mut all = Vec::with_capacity(parts.iter().map(|(r, _)| r.len()).sum());
    for (records, stats) in parts {
        total.merge(&stats);
        all.extend(records);
    }

    let output = emit_connections(
        &options.output_dir,
        &options.source_population,
        &options.target_population,
        all,
    )?;

    Ok(Some(SynthesisSummary {
        edges: edges as usize,
        stats: total,
        output,
        ..empty_summary()
    }))
}

/// Connection file path the pipeline writes for `options`
pub fn connection_path(options: &SynthesisOptions) -> PathBuf {
    options
        .output_dir
        .join(connection_file_name(&options.source_population, &options.target_population))
}
