// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration validation
//!
//! Ensures configuration values are consistent and within valid ranges
//! before any preparation or synthesis work starts.

use crate::{ConfigError, ConfigResult, NeuliteConfig};

/// Accepted values for `synthesis.sort_by`
pub const SORT_KEYS: &[&str] = &["target_node_id", "source_node_id", "edge_type_id", "none"];

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

const LOG_FORMATS: &[&str] = &["text", "compact"];

/// Validation errors that can occur during config validation
#[derive(Debug, Clone)]
pub enum ConfigValidationError {
    MissingRequired { field: String },
    InvalidValue { field: String, reason: String },
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingRequired { field } => {
                write!(f, "Missing required configuration: {}", field)
            }
            Self::InvalidValue { field, reason } => {
                write!(f, "Invalid configuration value for {}: {}", field, reason)
            }
        }
    }
}

/// Validate the complete configuration
///
/// # Errors
///
/// Returns `ConfigError::ValidationError` listing every problem found
pub fn validate_config(config: &NeuliteConfig) -> ConfigResult<()> {
    let mut errors = Vec::new();

    validate_required_fields(config, &mut errors);
    validate_value_ranges(config, &mut errors);

    if !errors.is_empty() {
        let error_messages = errors
            .iter()
            .map(|e| format!("  - {}", e))
            .collect::<Vec<_>>()
            .join("\n");

        return Err(ConfigError::ValidationError(format!(
            "Configuration validation failed:\n{}",
            error_messages
        )));
    }

    Ok(())
}

fn validate_required_fields(config: &NeuliteConfig, errors: &mut Vec<ConfigValidationError>) {
    if config.paths.output_dir.as_os_str().is_empty() {
        errors.push(ConfigValidationError::MissingRequired {
            field: "paths.output_dir".to_string(),
        });
    }
    if config.paths.swc_dir.as_os_str().is_empty() {
        errors.push(ConfigValidationError::MissingRequired {
            field: "paths.swc_dir".to_string(),
        });
    }
}

fn validate_value_ranges(config: &NeuliteConfig, errors: &mut Vec<ConfigValidationError>) {
    if config.synthesis.workers == 0 {
        errors.push(ConfigValidationError::InvalidValue {
            field: "synthesis.workers".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }

    if config.synthesis.max_in_memory_rows == 0 {
        errors.push(ConfigValidationError::InvalidValue {
            field: "synthesis.max_in_memory_rows".to_string(),
            reason: "must be positive".to_string(),
        });
    }

    if !SORT_KEYS.contains(&config.synthesis.sort_by.as_str()) {
        errors.push(ConfigValidationError::InvalidValue {
            field: "synthesis.sort_by".to_string(),
            reason: format!("must be one of {}", SORT_KEYS.join(", ")),
        });
    }

    if !LOG_LEVELS.contains(&config.logging.level.to_lowercase().as_str()) {
        errors.push(ConfigValidationError::InvalidValue {
            field: "logging.level".to_string(),
            reason: format!("must be one of {}", LOG_LEVELS.join(", ")),
        });
    }

    if !LOG_FORMATS.contains(&config.logging.format.to_lowercase().as_str()) {
        errors.push(ConfigValidationError::InvalidValue {
            field: "logging.format".to_string(),
            reason: format!("must be one of {}", LOG_FORMATS.join(", ")),
        });
    }

    if config.logging.retention_runs == 0 {
        errors.push(ConfigValidationError::InvalidValue {
            field: "logging.retention_runs".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
}
