// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! JSON network description
//!
//! ```json
//! {
//!   "nodes": [{"node_id": 0, "node_type_id": 100}],
//!   "node_types": [{"node_type_id": 100, "model_type": "biophysical",
//!                   "morphology": "cell.swc", "ei": "e"}],
//!   "edge_types": [{"edge_type_id": 12, "syn_weight": 0.002,
//!                   "target_sections": ["basal"], "delay": 2.0,
//!                   "dynamics_params": "AMPA_ExcToExc.json"}],
//!   "edges": [{"source_population": "v1", "target_population": "v1",
//!              "source_node_ids": [0], "target_node_ids": [0],
//!              "edge_type_ids": [12], "nsyns": [3]}]
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::catalog::{EdgeTypeCatalog, EdgeTypeRecord, NodeCatalog, NodeRecord, NodeTypeRecord};
use crate::collator::EdgeBucket;
use crate::error::{ConnectomeError, Result};
use crate::pipeline::SynthesisInput;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkDescription {
    #[serde(default)]
    pub nodes: Vec<NodeRecord>,
    #[serde(default)]
    pub node_types: Vec<NodeTypeRecord>,
    #[serde(default)]
    pub edge_types: Vec<EdgeTypeRecord>,
    #[serde(default)]
    pub edges: Vec<EdgeBucket>,
}

impl NetworkDescription {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| ConnectomeError::io(path, e))?;
        serde_json::from_str(&text)
            .map_err(|e| ConnectomeError::Catalog(format!("{}: {}", path.display(), e)))
    }

    /// Distinct (source, target) population pairs in order of first appearance
    pub fn population_pairs(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = Vec::new();
        for bucket in &self.edges {
            let pair = (bucket.source_population.clone(), bucket.target_population.clone());
            if !pairs.contains(&pair) {
                pairs.push(pair);
            }
        }
        pairs
    }

    /// Resolve catalogs; dynamics files are read from `synaptic_models_dir`
    pub fn resolve(self, synaptic_models_dir: &Path) -> Result<SynthesisInput> {
        Ok(SynthesisInput {
            nodes: NodeCatalog::build(&self.nodes, &self.node_types)?,
            edge_types: EdgeTypeCatalog::build(&self.edge_types, synaptic_models_dir)?,
            buckets: self.edges,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_and_resolve() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("network.json");
        std::fs::write(
            &path,
            r#"{
                "nodes": [{"node_id": 0, "node_type_id": 1}, {"node_id": 1, "node_type_id": 1}],
                "node_types": [{"node_type_id": 1, "model_type": "biophysical", "morphology": "c.swc"}],
                "edge_types": [{"edge_type_id": 3, "syn_weight": 1.0, "delay": 1.0}],
                "edges": [
                    {"source_population": "a", "target_population": "b",
                     "source_node_ids": [0], "target_node_ids": [1], "edge_type_ids": [3], "nsyns": [2]},
                    {"source_population": "a", "target_population": "a",
                     "source_node_ids": [], "target_node_ids": [], "edge_type_ids": [], "nsyns": []},
                    {"source_population": "a", "target_population": "b",
                     "source_node_ids": [1], "target_node_ids": [0], "edge_type_ids": [3], "nsyns": [1]}
                ]
            }"#,
        )
        .unwrap();

        let network = NetworkDescription::load(&path).unwrap();
        assert_eq!(
            network.population_pairs(),
            vec![
                ("a".to_string(), "b".to_string()),
                ("a".to_string(), "a".to_string())
            ]
        );
        let input = network.resolve(dir.path()).unwrap();
        assert_eq!(input.nodes.node_count(), 2);
        assert_eq!(input.edge_types.len(), 1);
        assert_eq!(input.buckets.len(), 3);
    }

    #[test]
    fn test_invalid_json_is_catalog_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{\"nodes\": 3}").unwrap();
        assert!(matches!(
            NetworkDescription::load(&path),
            Err(ConnectomeError::Catalog(_))
        ));
    }
}
