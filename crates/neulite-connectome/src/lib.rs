// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Neulite Connectome
//!
//! Distributed synthesis of per-synapse connection tables.
//!
//! ## Pipeline
//! - [`collate`] merges edge buckets of one population pair and sorts them
//! - [`partition`] and [`scatter`] hand contiguous synapse slices to ranks
//! - [`CompartmentSampler`] picks a target compartment per synapse from the
//!   canonical skeleton of the postsynaptic node
//! - [`assemble`] joins edge-type metadata and polarity, drops unusable rows
//! - [`synthesize_connections`] runs all of it across a [`Cluster`] and writes
//!   `<source>_<target>_connection.csv`
//!
//! ## Usage
//! ```ignore
//! use neulite_connectome::{run_local, synthesize_connections, DirectorySkeletonLoader};
//!
//! let loader = DirectorySkeletonLoader::new("components/morphologies", Some("neulite/data".into()));
//! run_local(4, |cluster| {
//!     let input = cluster.is_leader().then_some(&input);
//!     synthesize_connections(cluster, input, &options, &loader)
//! })?;
//! ```

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod assembler;
pub mod catalog;
pub mod cluster;
pub mod collator;
pub mod error;
pub mod network;
pub mod partition;
pub mod pipeline;
pub mod sampler;

pub use assembler::{
    assemble, connection_file_name, connections_to_csv, emit_connections, expand_synapses,
    sort_connections, synapse_rng, write_connections, AssemblyStats, ConnectionRecord, SynapseRow,
    CONNECTION_CSV_HEADER,
};
pub use catalog::{
    EdgeType, EdgeTypeCatalog, EdgeTypeId, EdgeTypeRecord, NodeCatalog, NodeId, NodeRecord,
    NodeTypeId, NodeTypeInfo, NodeTypeRecord, Polarity, TargetSection,
};
pub use cluster::{broadcast, recv, run_local, send, Cluster, LocalCluster, LEADER_RANK};
pub use collator::{collate, EdgeBucket, EdgeRow, EdgeSortKey, EdgeTable, SortOptions};
pub use error::{ConnectomeError, ResolutionError, Result};
pub use network::NetworkDescription;
pub use partition::{gather, partition, partition_ranges, scatter};
pub use pipeline::{connection_path, synthesize_connections, SynthesisInput, SynthesisOptions, SynthesisSummary};
pub use sampler::{CompartmentSampler, DirectorySkeletonLoader, SkeletonCache, SkeletonLoader};
