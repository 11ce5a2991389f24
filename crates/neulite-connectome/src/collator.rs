// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Edge collation
//!
//! Producers hand over edges as column buckets tagged with a source and
//! target population. [`collate`] merges the buckets of one population pair
//! into a single [`EdgeTable`]; every bucket fills its own pre-assigned,
//! disjoint range of rows, so the fill runs in parallel without locking.
//!
//! Sorting happens in memory when the table is small enough and otherwise
//! through sorted runs spilled to disk and merged back. Both paths are
//! stable and give the same order.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};
use std::fs::File;
use std::io::{BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::{EdgeTypeId, NodeId};
use crate::error::{ConnectomeError, Result};

/// Edges of one producer, as parallel columns
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgeBucket {
    pub source_population: String,
    pub target_population: String,
    pub source_node_ids: Vec<NodeId>,
    pub target_node_ids: Vec<NodeId>,
    pub edge_type_ids: Vec<EdgeTypeId>,
    /// Synapses per edge
    pub nsyns: Vec<u32>,
    /// Extra per-edge numeric columns by name
    #[serde(default)]
    pub properties: BTreeMap<String, Vec<f64>>,
}

impl EdgeBucket {
    pub fn len(&self) -> usize {
        self.source_node_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source_node_ids.is_empty()
    }

    fn matches(&self, source_population: &str, target_population: &str) -> bool {
        self.source_population == source_population && self.target_population == target_population
    }

    fn check_columns(&self) -> Result<()> {
        let n = self.len();
        let mut lengths = vec![
            ("target_node_ids", self.target_node_ids.len()),
            ("edge_type_ids", self.edge_type_ids.len()),
            ("nsyns", self.nsyns.len()),
        ];
        lengths.extend(self.properties.iter().map(|(name, col)| (name.as_str(), col.len())));
        for (name, len) in lengths {
            if len != n {
                return Err(ConnectomeError::Table(format!(
                    "{} -> {} bucket: column {} has {} rows, source_node_ids has {}",
                    self.source_population, self.target_population, name, len, n
                )));
            }
        }
        Ok(())
    }
}

/// One merged edge
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgeRow {
    pub source: NodeId,
    pub target: NodeId,
    pub edge_type: EdgeTypeId,
    pub nsyns: u32,
    /// Aligned with [`EdgeTable::property_names`]; NaN where the bucket had no such column
    pub properties: Vec<f64>,
}

/// Merged edges of one population pair
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgeTable {
    pub source_population: String,
    pub target_population: String,
    pub property_names: Vec<String>,
    pub rows: Vec<EdgeRow>,
}

impl EdgeTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Sum of `nsyns` over all rows
    pub fn total_synapses(&self) -> u64 {
        self.rows.iter().map(|r| u64::from(r.nsyns)).sum()
    }

    /// Column of a named property, if present
    pub fn property(&self, name: &str) -> Option<Vec<f64>> {
        let index = self.property_names.iter().position(|n| n == name)?;
        Some(self.rows.iter().map(|r| r.properties[index]).collect())
    }

    /// Sort rows by `key`, spilling to disk when the table exceeds
    /// `options.max_in_memory_rows`
    pub fn sort(&mut self, key: EdgeSortKey, options: &SortOptions) -> Result<()> {
        if key == EdgeSortKey::None || self.rows.len() < 2 {
            return Ok(());
        }
        if self.rows.len() <= options.max_in_memory_rows {
            self.rows.sort_by_key(|row| key.key(row));
        } else {
            let rows = std::mem::take(&mut self.rows);
            self.rows = external_sort(rows, key, options)?;
        }
        Ok(())
    }
}

/// Merge the buckets for `source_population -> target_population`.
///
/// Buckets keep their relative order and each one fills a contiguous range
/// of the result.
pub fn collate(buckets: &[EdgeBucket], source_population: &str, target_population: &str) -> Result<EdgeTable> {
    let matching: Vec<&EdgeBucket> = buckets
        .iter()
        .filter(|b| b.matches(source_population, target_population))
        .collect();
    for bucket in &matching {
        bucket.check_columns()?;
    }

    let property_names: Vec<String> = matching
        .iter()
        .flat_map(|b| b.properties.keys().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let total: usize = matching.iter().map(|b| b.len()).sum();
    let mut rows = vec![EdgeRow::default(); total];

    // disjoint chunk per bucket
    let mut chunks: Vec<&mut [EdgeRow]> = Vec::with_capacity(matching.len());
    let mut rest = rows.as_mut_slice();
    for bucket in &matching {
        let (chunk, tail) = std::mem::take(&mut rest).split_at_mut(bucket.len());
        chunks.push(chunk);
        rest = tail;
    }

    chunks
        .into_par_iter()
        .zip(matching.par_iter())
        .for_each(|(chunk, bucket)| fill_chunk(chunk, bucket, &property_names));

    debug!(
        target: "neulite-connectome",
        "Collated {} edges from {} buckets for {} -> {}",
        total,
        matching.len(),
        source_population,
        target_population
    );

    Ok(EdgeTable {
        source_population: source_population.to_string(),
        target_population: target_population.to_string(),
        property_names,
        rows,
    })
}

fn fill_chunk(chunk: &mut [EdgeRow], bucket: &EdgeBucket, property_names: &[String]) {
    let columns: Vec<Option<&Vec<f64>>> = property_names
        .iter()
        .map(|name| bucket.properties.get(name))
        .collect();
    for (i, row) in chunk.iter_mut().enumerate() {
        *row = EdgeRow {
            source: bucket.source_node_ids[i],
            target: bucket.target_node_ids[i],
            edge_type: bucket.edge_type_ids[i],
            nsyns: bucket.nsyns[i],
            properties: columns
                .iter()
                .map(|col| col.map_or(f64::NAN, |c| c[i]))
                .collect(),
        };
    }
}

/// Sort order of a merged table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EdgeSortKey {
    /// Target id, then source id
    #[default]
    TargetNodeId,
    /// Source id, then target id
    SourceNodeId,
    /// Edge type id, then target id, then source id
    EdgeTypeId,
    /// Keep collation order
    None,
}

impl EdgeSortKey {
    fn key(self, row: &EdgeRow) -> (u64, u64, u64) {
        match self {
            EdgeSortKey::TargetNodeId => (row.target, row.source, 0),
            EdgeSortKey::SourceNodeId => (row.source, row.target, 0),
            EdgeSortKey::EdgeTypeId => (u64::from(row.edge_type), row.target, row.source),
            EdgeSortKey::None => (0, 0, 0),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EdgeSortKey::TargetNodeId => "target_node_id",
            EdgeSortKey::SourceNodeId => "source_node_id",
            EdgeSortKey::EdgeTypeId => "edge_type_id",
            EdgeSortKey::None => "none",
        }
    }
}

impl FromStr for EdgeSortKey {
    type Err = ConnectomeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "target_node_id" => Ok(EdgeSortKey::TargetNodeId),
            "source_node_id" => Ok(EdgeSortKey::SourceNodeId),
            "edge_type_id" => Ok(EdgeSortKey::EdgeTypeId),
            "none" | "" => Ok(EdgeSortKey::None),
            other => Err(ConnectomeError::Table(format!("unknown sort key '{}'", other))),
        }
    }
}

/// Limits for [`EdgeTable::sort`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortOptions {
    /// Largest table sorted in memory; also the length of each spilled run
    pub max_in_memory_rows: usize,
    /// Directory for spilled runs, system temp dir when `None`
    pub spill_dir: Option<PathBuf>,
}

impl Default for SortOptions {
    fn default() -> Self {
        Self {
            max_in_memory_rows: 50_000_000,
            spill_dir: None,
        }
    }
}

struct SpilledRun {
    reader: BufReader<File>,
    remaining: usize,
}

impl SpilledRun {
    fn next_row(&mut self) -> Result<Option<EdgeRow>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;
        Ok(Some(bincode::deserialize_from(&mut self.reader)?))
    }
}

fn spill_file(spill_dir: Option<&Path>) -> Result<File> {
    match spill_dir {
        Some(dir) => tempfile::tempfile_in(dir).map_err(|e| ConnectomeError::io(dir, e)),
        None => tempfile::tempfile().map_err(|e| ConnectomeError::io(std::env::temp_dir(), e)),
    }
}

/// Stable sort through sorted runs on disk and a k-way merge.
///
/// Ties between runs resolve to the lower run index, and each run keeps
/// its input order, so the result equals a stable in-memory sort.
///
/// Only sort scratch space is bounded by `max_in_memory_rows`. The table
/// itself stays resident: the input until every run is spilled, then the
/// merged output, since the partitioner slices the whole sorted table.
fn external_sort(rows: Vec<EdgeRow>, key: EdgeSortKey, options: &SortOptions) -> Result<Vec<EdgeRow>> {
    let run_len = options.max_in_memory_rows.max(1);
    let total = rows.len();
    let spill_dir = options.spill_dir.as_deref();
    let spill_path = spill_dir.map_or_else(std::env::temp_dir, Path::to_path_buf);

    let mut runs = Vec::with_capacity(total.div_ceil(run_len));
    let mut rows = rows.into_iter();
    loop {
        let mut run: Vec<EdgeRow> = rows.by_ref().take(run_len).collect();
        if run.is_empty() {
            break;
        }
        run.sort_by_key(|row| key.key(row));

        let mut file = spill_file(spill_dir)?;
        {
            let mut writer = BufWriter::new(&mut file);
            for row in &run {
                bincode::serialize_into(&mut writer, row)?;
            }
            writer.flush().map_err(|e| ConnectomeError::io(&spill_path, e))?;
        }
        file.seek(SeekFrom::Start(0))
            .map_err(|e| ConnectomeError::io(&spill_path, e))?;
        runs.push(SpilledRun {
            reader: BufReader::new(file),
            remaining: run.len(),
        });
    }
    // release the input before the merged copy is allocated
    drop(rows);

    debug!(
        target: "neulite-connectome",
        "External sort: {} rows spilled into {} runs",
        total,
        runs.len()
    );

    let mut heads: Vec<Option<EdgeRow>> = Vec::with_capacity(runs.len());
    let mut heap = BinaryHeap::with_capacity(runs.len());
    for (index, run) in runs.iter_mut().enumerate() {
        let head = run.next_row()?;
        if let Some(row) = &head {
            heap.push(Reverse((key.key(row), index)));
        }
        heads.push(head);
    }

    let mut merged = Vec::with_capacity(total);
    while let Some(Reverse((_, index))) = heap.pop() {
        let next = runs[index].next_row()?;
        if let Some(row) = &next {
            heap.push(Reverse((key.key(row), index)));
        }
        if let Some(row) = std::mem::replace(&mut heads[index], next) {
            merged.push(row);
        }
    }

    Ok(merged)
}
