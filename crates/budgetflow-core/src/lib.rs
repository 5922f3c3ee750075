use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub mod error;
pub mod node_type;

pub use error::{EnumConversionError, ParameterError};
pub use node_type::{LAYER_COUNT, NodeType, RECIPIENT_LAYER};

/// Opaque key/value bag carried through the engine unmodified.
pub type Attributes = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeId(pub String);

impl EdgeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EdgeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

fn zero_if_null<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0))
}

/// A node of the raw budget flow graph, as produced by the ETL step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub id: NodeId,
    #[serde(default)]
    pub layer_index: u8,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(alias = "name")]
    pub display_name: String,
    /// Missing or null amounts deserialize as zero; they are floored at sizing time.
    #[serde(default, deserialize_with = "zero_if_null")]
    pub amount: f64,
    /// Owning ministry display name. Absent for cross-ministry recipients.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_key: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: Attributes,
}

impl GraphNode {
    pub fn new(
        id: impl Into<String>,
        node_type: NodeType,
        display_name: impl Into<String>,
        amount: f64,
    ) -> Self {
        Self {
            id: NodeId::new(id),
            layer_index: node_type.layer_index() as u8,
            node_type,
            display_name: display_name.into(),
            amount,
            owner_key: None,
            attributes: Attributes::new(),
        }
    }

    pub fn with_owner(mut self, owner_key: impl Into<String>) -> Self {
        self.owner_key = Some(owner_key.into());
        self
    }

    /// The layer the engine lays this node out in. The type tag is authoritative.
    pub fn layer(&self) -> usize {
        self.node_type.layer_index()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    pub id: EdgeId,
    pub source_id: NodeId,
    pub target_id: NodeId,
    #[serde(default, deserialize_with = "zero_if_null")]
    pub value: f64,
}

impl GraphEdge {
    pub fn new(
        id: impl Into<String>,
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        value: f64,
    ) -> Self {
        Self {
            id: EdgeId::new(id),
            source_id: NodeId::new(source_id),
            target_id: NodeId::new(target_id),
            value,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct InputMetadata {
    pub generated_at: Option<String>,
    pub fiscal_year: Option<u32>,
    pub source_files: Vec<String>,
}

/// The input document handed over by the ETL collaborator.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GraphDocument {
    pub metadata: InputMetadata,
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}
