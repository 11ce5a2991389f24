// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Neulite
//!
//! Network preparation for compartmental simulation.
//!
//! ## Phases
//! - **prepare**: every `*.swc` reconstruction is canonicalized (axon replaced
//!   by a two-point stub along its principal direction, points renumbered in
//!   depth-first order) and written to the converted skeleton directory
//! - **connect**: for each (source, target) population pair, edges are
//!   merged, expanded into synapses, spread over workers, resolved to target
//!   compartments and written as `<source>_<target>_connection.csv`
//!
//! ## Usage
//!
//! ```rust,no_run
//! use neulite::morphology::prepare_morphologies;
//! use std::path::Path;
//!
//! let summary = prepare_morphologies(
//!     Path::new("components/morphologies"),
//!     Path::new("neulite/data"),
//! )?;
//! println!("converted {} skeletons", summary.converted.len());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! The `neulite-build` binary wires both phases to `neulite_configuration.toml`.

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use neulite_config as config;
pub use neulite_connectome as connectome;
pub use neulite_morphology as morphology;
pub use neulite_observability as observability;

/// Console and file logging settings from the `[logging]` section
pub fn logging_settings(
    config: &neulite_config::NeuliteConfig,
) -> Result<neulite_observability::LoggingConfig, String> {
    let logging = &config.logging;
    Ok(neulite_observability::LoggingConfig {
        level: logging.level.clone(),
        format: logging.format.parse()?,
        log_dir: logging.log_dir.clone(),
        retention_days: logging.retention_days,
        retention_runs: logging.retention_runs,
    })
}

pub mod prelude {
    pub use neulite_config::{load_config, NeuliteConfig};
    pub use neulite_connectome::{
        run_local, synthesize_connections, Cluster, DirectorySkeletonLoader, NetworkDescription,
        SynthesisOptions, SynthesisSummary,
    };
    pub use neulite_morphology::{
        canonicalize_swc, load_canonical, prepare_morphologies, MorphologySkeleton, SectionType,
    };
}
