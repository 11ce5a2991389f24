// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration type definitions
//!
//! This module defines all configuration structs that map to sections in
//! `neulite_configuration.toml`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct NeuliteConfig {
    pub paths: PathsConfig,
    pub synthesis: SynthesisConfig,
    pub logging: LoggingConfig,
}

/// Input and output locations
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory holding the raw `*.swc` reconstructions
    pub morphologies_dir: PathBuf,
    /// Directory holding synapse dynamics JSON files referenced by edge types
    pub synaptic_models_dir: PathBuf,
    /// Root of all generated files
    pub output_dir: PathBuf,
    /// Sub-directory of `output_dir` receiving canonical skeletons
    pub swc_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            morphologies_dir: PathBuf::from("components/morphologies"),
            synaptic_models_dir: PathBuf::from("components/synaptic_models"),
            output_dir: PathBuf::from("neulite"),
            swc_dir: PathBuf::from("data"),
        }
    }
}

impl PathsConfig {
    /// Directory the prepare phase writes canonical skeletons to
    pub fn converted_swc_dir(&self) -> PathBuf {
        self.output_dir.join(&self.swc_dir)
    }
}

/// Connection synthesis settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Number of cooperating workers (ranks)
    pub workers: usize,
    /// Seed for compartment sampling; identical seeds give identical output
    pub seed: u64,
    /// Merged edge table ordering: target_node_id, source_node_id, edge_type_id or none
    pub sort_by: String,
    /// Largest edge table sorted in memory; larger tables are sorted through spill files
    pub max_in_memory_rows: usize,
    /// Where spill runs are written (system temp dir when unset)
    pub spill_dir: Option<PathBuf>,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            seed: 0,
            sort_by: "target_node_id".to_string(),
            max_in_memory_rows: 50_000_000,
            spill_dir: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level when no per-crate debug flag applies
    pub level: String,
    /// Console layout: text or compact
    pub format: String,
    /// Base directory for file logs (file-logging builds only)
    pub log_dir: PathBuf,
    /// Run folders older than this many days are removed
    pub retention_days: u64,
    /// Newest run folders kept
    pub retention_runs: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
            log_dir: PathBuf::from("./logs"),
            retention_days: 30,
            retention_runs: 10,
        }
    }
}
