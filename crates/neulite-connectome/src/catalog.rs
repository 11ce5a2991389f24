// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Node-type and edge-type catalogs
//!
//! Records come from the network builder as loosely typed JSON. The leader
//! resolves them once into [`NodeCatalog`] and [`EdgeTypeCatalog`], which are
//! then broadcast and only read by workers.

use ahash::AHashMap;
use neulite_morphology::SectionType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

use crate::error::{ConnectomeError, ResolutionError, Result};

pub type NodeId = u64;
pub type NodeTypeId = u32;
pub type EdgeTypeId = u32;

/// Model type whose nodes take part in synthesis
pub const CONNECTABLE_MODEL_TYPE: &str = "biophysical";

pub const DEFAULT_TAU1: f64 = 0.1;
pub const DEFAULT_TAU2: f64 = 1.7;
pub const DEFAULT_EREV: f64 = 0.0;

// ============================================================================
// Nodes
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub node_id: NodeId,
    pub node_type_id: NodeTypeId,
}

/// Node type as written by the network builder
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NodeTypeRecord {
    pub node_type_id: NodeTypeId,
    #[serde(default)]
    pub model_type: Option<String>,
    /// Skeleton file name, relative to the morphology directories
    #[serde(default)]
    pub morphology: Option<String>,
    /// `"e"` or `"i"`
    #[serde(default)]
    pub ei: Option<String>,
}

/// Excitatory/inhibitory tag of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Polarity {
    #[default]
    Excitatory,
    Inhibitory,
}

impl Polarity {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "e" => Some(Polarity::Excitatory),
            "i" => Some(Polarity::Inhibitory),
            _ => None,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Polarity::Excitatory => 'e',
            Polarity::Inhibitory => 'i',
        }
    }
}

impl fmt::Display for Polarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Resolved node type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeTypeInfo {
    pub connectable: bool,
    pub morphology: Option<String>,
    pub polarity: Polarity,
}

impl NodeTypeRecord {
    /// Resolve connectability and polarity; an `ei` outside `e`/`i` is
    /// reported and treated as excitatory
    pub fn resolve(&self) -> NodeTypeInfo {
        let polarity = match self.ei.as_deref() {
            None => Polarity::Excitatory,
            Some(value) => Polarity::parse(value).unwrap_or_else(|| {
                warn!(
                    target: "neulite-connectome",
                    "Unexpected ei value '{}' for node type {}, defaulting to 'e'",
                    value,
                    self.node_type_id
                );
                Polarity::Excitatory
            }),
        };
        NodeTypeInfo {
            connectable: self.model_type.as_deref() == Some(CONNECTABLE_MODEL_TYPE),
            morphology: self.morphology.clone().filter(|m| !m.is_empty()),
            polarity,
        }
    }
}

/// Node id to node type lookup plus resolved node types
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeCatalog {
    node_types: AHashMap<NodeTypeId, NodeTypeInfo>,
    node_type_of: AHashMap<NodeId, NodeTypeId>,
}

impl NodeCatalog {
    /// # Errors
    /// [`ConnectomeError::Catalog`] on a duplicate node id or node type id.
    pub fn build(nodes: &[NodeRecord], node_types: &[NodeTypeRecord]) -> Result<Self> {
        let mut catalog = NodeCatalog::default();
        for record in node_types {
            if catalog
                .node_types
                .insert(record.node_type_id, record.resolve())
                .is_some()
            {
                return Err(ConnectomeError::Catalog(format!(
                    "duplicate node type {}",
                    record.node_type_id
                )));
            }
        }
        for node in nodes {
            if catalog
                .node_type_of
                .insert(node.node_id, node.node_type_id)
                .is_some()
            {
                return Err(ConnectomeError::Catalog(format!("duplicate node {}", node.node_id)));
            }
        }
        debug!(
            target: "neulite-connectome",
            "Node catalog: {} nodes, {} node types",
            catalog.node_type_of.len(),
            catalog.node_types.len()
        );
        Ok(catalog)
    }

    pub fn node_count(&self) -> usize {
        self.node_type_of.len()
    }

    pub fn node_type_count(&self) -> usize {
        self.node_types.len()
    }

    pub fn node_type_info(&self, node_type_id: NodeTypeId) -> Option<&NodeTypeInfo> {
        self.node_types.get(&node_type_id)
    }

    /// Node type of `node`
    pub fn node_type(&self, node: NodeId) -> std::result::Result<(NodeTypeId, &NodeTypeInfo), ResolutionError> {
        let type_id = *self
            .node_type_of
            .get(&node)
            .ok_or(ResolutionError::UnknownNode(node))?;
        let info = self
            .node_types
            .get(&type_id)
            .ok_or(ResolutionError::UnknownNodeType(type_id))?;
        Ok((type_id, info))
    }

    /// Unknown nodes are never connectable
    pub fn is_connectable(&self, node: NodeId) -> bool {
        self.node_type(node).is_ok_and(|(_, info)| info.connectable)
    }

    /// Polarity of `node`'s type; excitatory when the node is unknown
    pub fn polarity(&self, node: NodeId) -> Polarity {
        self.node_type(node)
            .map(|(_, info)| info.polarity)
            .unwrap_or_default()
    }
}

// ============================================================================
// Edge types
// ============================================================================

/// One entry of a `target_sections` list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SectionEntry {
    Code(i32),
    Name(String),
}

/// `target_sections` as a JSON list or as list text such as `"['basal', 'apical']"`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetSectionsSpec {
    List(Vec<SectionEntry>),
    Text(String),
}

/// Synapse time constants and reversal potential; absent values take defaults
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SynapseDynamicsParams {
    #[serde(default)]
    pub tau1: Option<f64>,
    #[serde(default)]
    pub tau2: Option<f64>,
    #[serde(default)]
    pub erev: Option<f64>,
}

/// `dynamics_params` as a JSON file reference or an inline object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DynamicsSpec {
    File(String),
    Inline(SynapseDynamicsParams),
}

/// Edge type as written by the network builder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeTypeRecord {
    pub edge_type_id: EdgeTypeId,
    pub syn_weight: f64,
    #[serde(default)]
    pub target_sections: Option<TargetSectionsSpec>,
    pub delay: f64,
    #[serde(default)]
    pub dynamics_params: Option<DynamicsSpec>,
}

/// Section a synapse may attach to; names outside the fixed table match nothing
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetSection {
    Section(SectionType),
    Unknown(String),
}

impl TargetSection {
    pub fn from_entry(entry: &SectionEntry) -> Self {
        match entry {
            SectionEntry::Code(code) => TargetSection::Section(SectionType::from_code(*code)),
            SectionEntry::Name(name) => match SectionType::from_section_name(name) {
                Some(section) => TargetSection::Section(section),
                None => TargetSection::Unknown(name.clone()),
            },
        }
    }

    pub fn section(&self) -> Option<SectionType> {
        match self {
            TargetSection::Section(section) => Some(*section),
            TargetSection::Unknown(_) => None,
        }
    }
}

/// Parse list text (`['somatic', 'basal']`, `basal`, `NULL`)
pub fn parse_section_list(text: &str) -> Vec<SectionEntry> {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed == "NULL" {
        return Vec::new();
    }
    let inner = trimmed
        .strip_prefix('[')
        .and_then(|t| t.strip_suffix(']'))
        .unwrap_or(trimmed);
    inner
        .split(',')
        .map(|item| item.trim().trim_matches(|c| c == '\'' || c == '"').trim())
        .filter(|item| !item.is_empty())
        .map(|item| match item.parse::<i32>() {
            Ok(code) => SectionEntry::Code(code),
            Err(_) => SectionEntry::Name(item.to_string()),
        })
        .collect()
}

/// Resolved edge type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeType {
    pub edge_type_id: EdgeTypeId,
    pub weight: f64,
    pub target_sections: Vec<TargetSection>,
    /// Rounded half away from zero
    pub delay: i64,
    /// `tau1`
    pub tau_rise: f64,
    /// `tau2`
    pub tau_decay: f64,
    pub erev: f64,
}

impl EdgeType {
    /// Known section types among the targets
    pub fn section_types(&self) -> Vec<SectionType> {
        self.target_sections.iter().filter_map(TargetSection::section).collect()
    }
}

/// Delay in whole time steps; ties go away from zero
pub fn round_delay(delay: f64) -> i64 {
    delay.round() as i64
}

impl EdgeTypeRecord {
    /// Resolve sections, delay and synapse dynamics. Relative dynamics file
    /// names are looked up in `synaptic_models_dir`.
    pub fn resolve(&self, synaptic_models_dir: &Path) -> Result<EdgeType> {
        if !self.delay.is_finite() {
            return Err(ConnectomeError::Catalog(format!(
                "edge type {} has non-finite delay {}",
                self.edge_type_id, self.delay
            )));
        }
        let entries = match &self.target_sections {
            None => Vec::new(),
            Some(TargetSectionsSpec::List(entries)) => entries.clone(),
            Some(TargetSectionsSpec::Text(text)) => parse_section_list(text),
        };
        let params = resolve_dynamics(self.dynamics_params.as_ref(), synaptic_models_dir)?;

        Ok(EdgeType {
            edge_type_id: self.edge_type_id,
            weight: self.syn_weight,
            target_sections: entries.iter().map(TargetSection::from_entry).collect(),
            delay: round_delay(self.delay),
            tau_rise: params.tau1.unwrap_or(DEFAULT_TAU1),
            tau_decay: params.tau2.unwrap_or(DEFAULT_TAU2),
            erev: params.erev.unwrap_or(DEFAULT_EREV),
        })
    }
}

fn resolve_dynamics(spec: Option<&DynamicsSpec>, synaptic_models_dir: &Path) -> Result<SynapseDynamicsParams> {
    match spec {
        None => Ok(SynapseDynamicsParams::default()),
        Some(DynamicsSpec::Inline(params)) => Ok(*params),
        Some(DynamicsSpec::File(name)) if name.is_empty() => Ok(SynapseDynamicsParams::default()),
        Some(DynamicsSpec::File(name)) => {
            let path = synaptic_models_dir.join(name);
            let text = fs::read_to_string(&path).map_err(|e| ConnectomeError::io(&path, e))?;
            serde_json::from_str(&text).map_err(|e| {
                ConnectomeError::Catalog(format!(
                    "Failed to extract synapse parameters from {}: {}",
                    path.display(),
                    e
                ))
            })
        }
    }
}

/// Resolved edge types by id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgeTypeCatalog {
    types: AHashMap<EdgeTypeId, EdgeType>,
}

impl EdgeTypeCatalog {
    /// # Errors
    /// [`ConnectomeError::Catalog`] on a duplicate id or unreadable dynamics;
    /// [`ConnectomeError::Io`] when a dynamics file is missing.
    pub fn build(records: &[EdgeTypeRecord], synaptic_models_dir: &Path) -> Result<Self> {
        let mut types = AHashMap::with_capacity(records.len());
        for record in records {
            let edge_type = record.resolve(synaptic_models_dir)?;
            if types.insert(record.edge_type_id, edge_type).is_some() {
                return Err(ConnectomeError::Catalog(format!(
                    "duplicate edge type {}",
                    record.edge_type_id
                )));
            }
        }
        Ok(Self { types })
    }

    pub fn get(&self, edge_type_id: EdgeTypeId) -> Option<&EdgeType> {
        self.types.get(&edge_type_id)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge_type_json(value: serde_json::Value) -> EdgeTypeRecord {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_polarity_parse_and_coercion() {
        assert_eq!(Polarity::parse("i"), Some(Polarity::Inhibitory));
        assert_eq!(Polarity::parse("x"), None);

        let record = NodeTypeRecord {
            node_type_id: 4,
            model_type: Some("biophysical".to_string()),
            morphology: Some("cell.swc".to_string()),
            ei: Some("excitatory".to_string()),
        };
        let info = record.resolve();
        assert_eq!(info.polarity, Polarity::Excitatory);
        assert!(info.connectable);
    }

    #[test]
    fn test_node_catalog_lookups() {
        let catalog = NodeCatalog::build(
            &[
                NodeRecord { node_id: 0, node_type_id: 100 },
                NodeRecord { node_id: 1, node_type_id: 101 },
                NodeRecord { node_id: 2, node_type_id: 999 },
            ],
            &[
                NodeTypeRecord {
                    node_type_id: 100,
                    model_type: Some("biophysical".to_string()),
                    morphology: Some("a.swc".to_string()),
                    ei: Some("i".to_string()),
                },
                NodeTypeRecord {
                    node_type_id: 101,
                    model_type: Some("virtual".to_string()),
                    ..Default::default()
                },
            ],
        )
        .unwrap();

        assert!(catalog.is_connectable(0));
        assert!(!catalog.is_connectable(1));
        assert!(!catalog.is_connectable(2));
        assert!(!catalog.is_connectable(42));
        assert_eq!(catalog.polarity(0), Polarity::Inhibitory);
        assert_eq!(catalog.polarity(42), Polarity::Excitatory);
        assert_eq!(catalog.node_type(2).unwrap_err(), ResolutionError::UnknownNodeType(999));
        assert_eq!(catalog.node_type(42).unwrap_err(), ResolutionError::UnknownNode(42));
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let err = NodeCatalog::build(
            &[
                NodeRecord { node_id: 7, node_type_id: 1 },
                NodeRecord { node_id: 7, node_type_id: 1 },
            ],
            &[],
        )
        .unwrap_err();
        assert!(matches!(err, ConnectomeError::Catalog(_)));
    }

    #[test]
    fn test_section_list_text() {
        assert_eq!(
            parse_section_list("['somatic', \"basal\", 4]"),
            vec![
                SectionEntry::Name("somatic".to_string()),
                SectionEntry::Name("basal".to_string()),
                SectionEntry::Code(4),
            ]
        );
        assert!(parse_section_list("NULL").is_empty());
        assert_eq!(parse_section_list("apical"), vec![SectionEntry::Name("apical".to_string())]);
    }

    #[test]
    fn test_edge_type_defaults_and_rounding() {
        let dir = tempfile::tempdir().unwrap();
        let edge_type = edge_type_json(serde_json::json!({
            "edge_type_id": 12,
            "syn_weight": 0.0025,
            "target_sections": ["axon", "basal", "dendritic"],
            "delay": 2.5
        }))
        .resolve(dir.path())
        .unwrap();

        assert_eq!(edge_type.delay, 3);
        assert_eq!(edge_type.tau_rise, DEFAULT_TAU1);
        assert_eq!(edge_type.tau_decay, DEFAULT_TAU2);
        assert_eq!(edge_type.erev, DEFAULT_EREV);
        assert_eq!(
            edge_type.target_sections[2],
            TargetSection::Unknown("dendritic".to_string())
        );
        assert_eq!(edge_type.section_types(), vec![SectionType::Axon, SectionType::Basal]);
        assert_eq!(round_delay(-2.5), -3);
        assert_eq!(round_delay(1.49), 1);
    }

    #[test]
    fn test_non_finite_delay_rejected() {
        let dir = tempfile::tempdir().unwrap();
        for delay in [f64::NAN, f64::INFINITY] {
            let record = EdgeTypeRecord {
                edge_type_id: 4,
                syn_weight: 1.0,
                target_sections: None,
                delay,
                dynamics_params: None,
            };
            let err = record.resolve(dir.path()).unwrap_err();
            assert!(matches!(err, ConnectomeError::Catalog(_)));
            assert!(err.to_string().contains("edge type 4 has non-finite delay"));
        }
    }

    #[test]
    fn test_dynamics_from_inline_and_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("exp2syn.json"),
            r#"{"level_of_detail": "exp2syn", "tau1": 1.0, "tau2": 3, "erev": -70.0}"#,
        )
        .unwrap();

        let from_file = edge_type_json(serde_json::json!({
            "edge_type_id": 1, "syn_weight": 1.0, "delay": 1.0,
            "target_sections": "['somatic']",
            "dynamics_params": "exp2syn.json"
        }))
        .resolve(dir.path())
        .unwrap();
        assert_eq!((from_file.tau_rise, from_file.tau_decay, from_file.erev), (1.0, 3.0, -70.0));
        assert_eq!(from_file.section_types(), vec![SectionType::Soma]);

        let inline = edge_type_json(serde_json::json!({
            "edge_type_id": 2, "syn_weight": 1.0, "delay": 1.0,
            "dynamics_params": {"erev": -80.0}
        }))
        .resolve(dir.path())
        .unwrap();
        assert_eq!((inline.tau_rise, inline.tau_decay, inline.erev), (0.1, 1.7, -80.0));

        let missing = edge_type_json(serde_json::json!({
            "edge_type_id": 3, "syn_weight": 1.0, "delay": 1.0,
            "dynamics_params": "missing.json"
        }))
        .resolve(dir.path())
        .unwrap_err();
        assert!(matches!(missing, ConnectomeError::Io { .. }));
    }

    #[test]
    fn test_edge_type_catalog_rejects_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let record = edge_type_json(serde_json::json!({
            "edge_type_id": 5, "syn_weight": 1.0, "delay": 0.0
        }));
        let err = EdgeTypeCatalog::build(&[record.clone(), record], dir.path()).unwrap_err();
        assert!(matches!(err, ConnectomeError::Catalog(_)));
    }
}
