// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration file loading with override support
//!
//! This module implements the 3-tier configuration loading system:
//! 1. TOML file (base defaults)
//! 2. Environment variables (runtime overrides)
//! 3. CLI arguments (explicit user overrides)

use crate::{ConfigError, ConfigResult, NeuliteConfig};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAME: &str = "neulite_configuration.toml";

/// Find the neulite configuration file
///
/// Search order:
/// 1. `NEULITE_CONFIG_PATH` environment variable
/// 2. Current working directory: `./neulite_configuration.toml`
/// 3. Up to 5 parent directories
///
/// # Errors
///
/// Returns `ConfigError::FileNotFound` if no config file is found in any location
pub fn find_config_file() -> ConfigResult<PathBuf> {
    if let Ok(env_path) = env::var("NEULITE_CONFIG_PATH") {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        } else {
            return Err(ConfigError::FileNotFound(format!(
                "Config file specified by NEULITE_CONFIG_PATH not found: {}",
                path.display()
            )));
        }
    }

    let mut search_paths = Vec::new();

    if let Ok(cwd) = env::current_dir() {
        search_paths.push(cwd.join(CONFIG_FILE_NAME));

        let mut current = cwd.clone();
        for _ in 0..5 {
            if let Some(parent) = current.parent() {
                search_paths.push(parent.join(CONFIG_FILE_NAME));
                current = parent.to_path_buf();
            }
        }
    }

    for path in &search_paths {
        if path.exists() {
            return Ok(path.clone());
        }
    }

    let search_list = search_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    Err(ConfigError::FileNotFound(format!(
        "neulite configuration file '{}' not found in any of these locations:\n{}\n\nSet NEULITE_CONFIG_PATH environment variable to specify custom location.",
        CONFIG_FILE_NAME, search_list
    )))
}

/// Load configuration from TOML file
///
/// # Arguments
///
/// * `config_path` - Optional path to config file. If `None`, will search for config file.
/// * `cli_args` - Optional CLI argument overrides
///
/// # Errors
///
/// Returns error if config file is not found or contains invalid TOML
pub fn load_config(
    config_path: Option<&Path>,
    cli_args: Option<&HashMap<String, String>>,
) -> ConfigResult<NeuliteConfig> {
    let config_file = if let Some(path) = config_path {
        path.to_path_buf()
    } else {
        find_config_file()?
    };

    let content = fs::read_to_string(&config_file)?;
    let mut config: NeuliteConfig = toml::from_str(&content)?;

    apply_environment_overrides(&mut config);

    if let Some(cli) = cli_args {
        apply_cli_overrides(&mut config, cli);
    }

    Ok(config)
}

/// Apply environment variable overrides to configuration
///
/// Supported environment variables:
/// - `NEULITE_MORPHOLOGIES_DIR` -> `paths.morphologies_dir`
/// - `NEULITE_OUTPUT_DIR` -> `paths.output_dir`
/// - `NEULITE_WORKERS` -> `synthesis.workers`
/// - `NEULITE_SEED` -> `synthesis.seed`
/// - `NEULITE_SORT_BY` -> `synthesis.sort_by`
/// - `NEULITE_LOG_LEVEL` -> `logging.level`
pub fn apply_environment_overrides(config: &mut NeuliteConfig) {
    if let Ok(value) = env::var("NEULITE_MORPHOLOGIES_DIR") {
        config.paths.morphologies_dir = PathBuf::from(value);
    }
    if let Ok(value) = env::var("NEULITE_OUTPUT_DIR") {
        config.paths.output_dir = PathBuf::from(value);
    }
    if let Ok(value) = env::var("NEULITE_WORKERS") {
        if let Ok(workers) = value.parse::<usize>() {
            config.synthesis.workers = workers;
        }
    }
    if let Ok(value) = env::var("NEULITE_SEED") {
        if let Ok(seed) = value.parse::<u64>() {
            config.synthesis.seed = seed;
        }
    }
    if let Ok(value) = env::var("NEULITE_SORT_BY") {
        config.synthesis.sort_by = value;
    }
    if let Ok(value) = env::var("NEULITE_LOG_LEVEL") {
        config.logging.level = value;
    }
}

/// Apply CLI argument overrides to configuration
///
/// # Arguments
///
/// * `config` - Configuration to modify
/// * `cli_args` - Map of CLI arguments (e.g., `{"workers": "4", "seed": "7"}`)
pub fn apply_cli_overrides(config: &mut NeuliteConfig, cli_args: &HashMap<String, String>) {
    if let Some(value) = cli_args.get("morphologies_dir") {
        config.paths.morphologies_dir = PathBuf::from(value);
    }
    if let Some(value) = cli_args.get("output_dir") {
        config.paths.output_dir = PathBuf::from(value);
    }
    if let Some(value) = cli_args.get("workers") {
        if let Ok(workers) = value.parse::<usize>() {
            config.synthesis.workers = workers;
        }
    }
    if let Some(value) = cli_args.get("seed") {
        if let Ok(seed) = value.parse::<u64>() {
            config.synthesis.seed = seed;
        }
    }
    if let Some(value) = cli_args.get("sort_by") {
        config.synthesis.sort_by = value.clone();
    }
    if let Some(value) = cli_args.get("log_level") {
        config.logging.level = value.clone();
    }
}
