// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Connection synthesis errors
//!
//! [`ConnectomeError`] aborts the run. [`ResolutionError`] only drops the
//! synapse it was raised for.

use neulite_morphology::MorphologyError;
use std::path::PathBuf;
use thiserror::Error;

use crate::catalog::{NodeId, NodeTypeId};

/// Fatal synthesis errors
#[derive(Error, Debug)]
pub enum ConnectomeError {
    /// Send, receive or barrier failure between workers
    #[error("Distribution error: {0}")]
    Distribution(String),

    /// A peer dropped its endpoints, usually because it failed first
    #[error("Distribution error: rank {rank} lost its connection to rank {peer}")]
    Disconnected { rank: usize, peer: usize },

    #[error("Distribution error: rank {rank} panicked: {message}")]
    Panicked { rank: usize, message: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Missing or malformed node/edge type metadata
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// Edge bucket columns that cannot be merged
    #[error("Edge table error: {0}")]
    Table(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Morphology(#[from] MorphologyError),
}

impl ConnectomeError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConnectomeError::Io {
            path: path.into(),
            source,
        }
    }

    /// Send, receive, barrier or worker failure
    pub fn is_distribution(&self) -> bool {
        matches!(
            self,
            ConnectomeError::Distribution(_)
                | ConnectomeError::Disconnected { .. }
                | ConnectomeError::Panicked { .. }
        )
    }

    /// Lower ranks first when several workers fail: a panic or a local
    /// failure explains the run, a lost peer only echoes it
    pub(crate) fn report_priority(&self) -> u8 {
        match self {
            ConnectomeError::Disconnected { .. } => 2,
            ConnectomeError::Distribution(_) => 1,
            _ => 0,
        }
    }
}

impl From<bincode::Error> for ConnectomeError {
    fn from(e: bincode::Error) -> Self {
        ConnectomeError::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ConnectomeError>;

/// Why no compartment could be chosen for a synapse
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolutionError {
    #[error("node {0} is not in the node catalog")]
    UnknownNode(NodeId),

    #[error("node type {0} is not in the node-type catalog")]
    UnknownNodeType(NodeTypeId),

    #[error("node type {0} has no morphology")]
    NoMorphology(NodeTypeId),

    #[error("morphology '{reference}' could not be loaded: {reason}")]
    Unloadable { reference: String, reason: String },

    #[error("morphology '{reference}' has no compartment in the target sections")]
    NoMatchingSection { reference: String },
}
