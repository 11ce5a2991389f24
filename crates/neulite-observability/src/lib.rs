// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # neulite-observability
//!
//! Logging initialisation shared by the neulite crates and tools, with
//! per-crate debug flag support.
//!
//! ## Features
//! - `file-logging`: JSON log files in a timestamped run folder

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod cli;
pub mod config;
pub mod init;

pub use cli::*;
pub use config::*;
pub use init::*;

/// Known neulite crate names for debug flags (the `target:` used in log macros)
pub const KNOWN_CRATES: &[&str] = &[
    "neulite-config",
    "neulite-morphology",
    "neulite-connectome",
    "neulite-build",
];
