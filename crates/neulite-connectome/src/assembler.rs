// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Connection assembly
//!
//! Edges are expanded into one [`SynapseRow`] per synapse, each tagged with
//! its global position in the expanded table. A worker turns its slice of
//! synapse rows into [`ConnectionRecord`]s: edge-type metadata, a sampled
//! target compartment and the presynaptic polarity. Rows whose compartment
//! cannot be resolved or whose endpoints are not connectable are dropped.
//!
//! The random generator of every synapse is seeded from the run seed and the
//! synapse's global index, so results do not depend on how rows were split
//! across workers.

use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use neulite_morphology::CompartmentId;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::catalog::{EdgeTypeCatalog, EdgeTypeId, NodeCatalog, NodeId, Polarity};
use crate::collator::EdgeTable;
use crate::error::{ConnectomeError, Result};
use crate::sampler::{CompartmentSampler, SkeletonLoader};

/// Header of connection files
pub const CONNECTION_CSV_HEADER: &str = "#pre nid,post nid,post cid,weight,tau_decay,tau_rise,erev,delay,e/i";

/// One synapse before compartment resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynapseRow {
    /// Position in the expanded table of the population pair
    pub index: u64,
    pub source: NodeId,
    pub target: NodeId,
    pub edge_type: EdgeTypeId,
}

/// One output row
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    pub pre: NodeId,
    pub post: NodeId,
    pub post_cid: CompartmentId,
    pub weight: f64,
    pub tau_decay: f64,
    pub tau_rise: f64,
    pub erev: f64,
    pub delay: i64,
    pub polarity: Polarity,
}

/// Row counts of one assembly pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssemblyStats {
    pub synapses: u64,
    pub kept: u64,
    /// Presynaptic node not connectable
    pub dropped_source: u64,
    /// Postsynaptic node not connectable
    pub dropped_target: u64,
    /// No compartment could be resolved
    pub dropped_unresolved: u64,
}

impl AssemblyStats {
    pub fn dropped(&self) -> u64 {
        self.dropped_source + self.dropped_target + self.dropped_unresolved
    }

    pub fn merge(&mut self, other: &AssemblyStats) {
        self.synapses += other.synapses;
        self.kept += other.kept;
        self.dropped_source += other.dropped_source;
        self.dropped_target += other.dropped_target;
        self.dropped_unresolved += other.dropped_unresolved;
    }
}

/// One row per synapse, `nsyns` rows per edge, in table order
pub fn expand_synapses(table: &EdgeTable) -> Vec<SynapseRow> {
    let mut rows = Vec::with_capacity(usize::try_from(table.total_synapses()).unwrap_or(0));
    for edge in &table.rows {
        for _ in 0..edge.nsyns {
            rows.push(SynapseRow {
                index: rows.len() as u64,
                source: edge.source,
                target: edge.target,
                edge_type: edge.edge_type,
            });
        }
    }
    rows
}

/// Fail when a row references an edge type missing from the catalog
pub fn check_edge_types(table: &EdgeTable, edge_types: &EdgeTypeCatalog) -> Result<()> {
    match table.rows.iter().find(|r| edge_types.get(r.edge_type).is_none()) {
        Some(row) => Err(ConnectomeError::Catalog(format!(
            "edge {} -> {} references unknown edge type {}",
            row.source, row.target, row.edge_type
        ))),
        None => Ok(()),
    }
}

/// Generator for one synapse; splitmix64 of the run seed and the synapse index
pub fn synapse_rng(seed: u64, index: u64) -> StdRng {
    let mut z = seed ^ index.wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    StdRng::seed_from_u64(z ^ (z >> 31))
}

/// Resolve a slice of synapse rows into connection records
pub fn assemble<L: SkeletonLoader + ?Sized>(
    rows: &[SynapseRow],
    edge_types: &EdgeTypeCatalog,
    nodes: &NodeCatalog,
    sampler: &mut CompartmentSampler<'_, L>,
    seed: u64,
) -> Result<(Vec<ConnectionRecord>, AssemblyStats)> {
    let mut stats = AssemblyStats {
        synapses: rows.len() as u64,
        ..Default::default()
    };
    let mut records = Vec::with_capacity(rows.len());

    for row in rows {
        let edge_type = edge_types.get(row.edge_type).ok_or_else(|| {
            ConnectomeError::Catalog(format!("unknown edge type {}", row.edge_type))
        })?;

        if !nodes.is_connectable(row.source) {
            stats.dropped_source += 1;
            continue;
        }
        if !nodes.is_connectable(row.target) {
            stats.dropped_target += 1;
            continue;
        }

        let mut rng = synapse_rng(seed, row.index);
        let post_cid = match sampler.sample(row.target, &edge_type.target_sections, &mut rng) {
            Ok(cid) => cid,
            Err(_) => {
                stats.dropped_unresolved += 1;
                continue;
            }
        };

        records.push(ConnectionRecord {
            pre: row.source,
            post: row.target,
            post_cid,
            weight: edge_type.weight,
            tau_decay: edge_type.tau_decay,
            tau_rise: edge_type.tau_rise,
            erev: edge_type.erev,
            delay: edge_type.delay,
            polarity: nodes.polarity(row.source),
        });
    }

    stats.kept = records.len() as u64;
    if stats.dropped() > 0 {
        info!(
            target: "neulite-connectome",
            "Filtering out {} of {} synapses",
            stats.dropped(),
            stats.synapses
        );
        debug!(
            target: "neulite-connectome",
            "  - non-connectable source: {}, non-connectable target: {}, unresolved compartment: {}",
            stats.dropped_source,
            stats.dropped_target,
            stats.dropped_unresolved
        );
    }
    Ok((records, stats))
}

/// Stable sort by (pre, post, post compartment)
pub fn sort_connections(records: &mut [ConnectionRecord]) {
    records.sort_by_key(|r| (r.pre, r.post, r.post_cid));
}

/// `<source>_<target>_connection.csv`
pub fn connection_file_name(source_population: &str, target_population: &str) -> String {
    format!("{}_{}_connection.csv", source_population, target_population)
}

/// Write records as CSV under [`CONNECTION_CSV_HEADER`]
pub fn write_connections(path: &Path, records: &[ConnectionRecord]) -> Result<()> {
    let file = File::create(path).map_err(|e| ConnectomeError::io(path, e))?;
    let mut out = BufWriter::new(file);
    write_rows(&mut out, records)
        .and_then(|_| out.flush())
        .map_err(|e| ConnectomeError::io(path, e))
}

fn write_rows<W: Write>(out: &mut W, records: &[ConnectionRecord]) -> std::io::Result<()> {
    writeln!(out, "{}", CONNECTION_CSV_HEADER)?;
    for r in records {
        writeln!(
            out,
            "{},{},{},{},{},{},{},{},{}",
            r.pre,
            r.post,
            r.post_cid,
            CsvFloat(r.weight),
            CsvFloat(r.tau_decay),
            CsvFloat(r.tau_rise),
            CsvFloat(r.erev),
            r.delay,
            r.polarity
        )?;
    }
    Ok(())
}

/// Shortest round-trip float text with a signed, two-digit minimum exponent
/// (`0.5`, `-70.0`, `5e-05`, `1e+16`)
struct CsvFloat(f64);

impl fmt::Display for CsvFloat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = format!("{:?}", self.0);
        match text.split_once('e') {
            None => f.write_str(&text),
            Some((mantissa, exponent)) => {
                let (sign, digits) = match exponent.strip_prefix('-') {
                    Some(digits) => ('-', digits),
                    None => ('+', exponent),
                };
                write!(f, "{}e{}{:0>2}", mantissa, sign, digits)
            }
        }
    }
}

/// Render records as CSV text
pub fn connections_to_csv(records: &[ConnectionRecord]) -> String {
    let mut buf = Vec::new();
    // writing into a Vec cannot fail
    let _ = write_rows(&mut buf, records);
    String::from_utf8_lossy(&buf).into_owned()
}

/// Sort `records` and write them to `<output_dir>/<source>_<target>_connection.csv`.
/// Nothing is written when `records` is empty.
pub fn emit_connections(
    output_dir: &Path,
    source_population: &str,
    target_population: &str,
    mut records: Vec<ConnectionRecord>,
) -> Result<Option<PathBuf>> {
    if records.is_empty() {
        info!(
            target: "neulite-connectome",
            "No valid edges to save for {} -> {}",
            source_population,
            target_population
        );
        return Ok(None);
    }
    sort_connections(&mut records);
    std::fs::create_dir_all(output_dir).map_err(|e| ConnectomeError::io(output_dir, e))?;
    let path = output_dir.join(connection_file_name(source_population, target_population));
    write_connections(&path, &records)?;
    info!(
        target: "neulite-connectome",
        "Created connection file: {} ({} rows)",
        path.display(),
        records.len()
    );
    Ok(Some(path))
}
