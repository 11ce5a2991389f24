// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Error types for skeleton parsing and canonicalisation

use std::path::PathBuf;
use thiserror::Error;

/// Skeleton errors. All of them are fatal for the file being processed.
#[derive(Error, Debug)]
pub enum MorphologyError {
    /// Malformed row or field
    #[error("Format error at line {line}: {reason}")]
    Format { line: usize, reason: String },

    /// Tree invariant violated (missing/duplicate root, orphan, cycle, incomplete traversal)
    #[error("Topology error: {0}")]
    Topology(String),

    /// Geometry cannot be repaired (no axon, no soma, degenerate direction fit)
    #[error("Domain error: {0}")]
    Domain(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Any of the above, attributed to a specific skeleton file
    #[error("{path}: {source}")]
    InFile {
        path: PathBuf,
        #[source]
        source: Box<MorphologyError>,
    },
}

impl MorphologyError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MorphologyError::Io {
            path: path.into(),
            source,
        }
    }

    /// Attach the file the error came from
    pub fn in_file(self, path: impl Into<PathBuf>) -> Self {
        match self {
            MorphologyError::Io { .. } | MorphologyError::InFile { .. } => self,
            other => MorphologyError::InFile {
                path: path.into(),
                source: Box::new(other),
            },
        }
    }

    /// The underlying error with file attribution stripped
    pub fn root_cause(&self) -> &MorphologyError {
        match self {
            MorphologyError::InFile { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, MorphologyError>;
