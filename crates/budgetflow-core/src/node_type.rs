use crate::EnumConversionError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of fixed ranks in the budget flow graph.
pub const LAYER_COUNT: usize = 5;

/// Layer index of the recipient rank, the only rank that is never sectioned by owner.
pub const RECIPIENT_LAYER: usize = 4;

/// Closed tag for the five node ranks. Generic layout logic only uses the tag to
/// find a node's layer; display labelling belongs to the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum NodeType {
    Ministry,
    Bureau,
    Division,
    Project,
    Recipient,
}

impl NodeType {
    pub const ALL: [NodeType; LAYER_COUNT] = [
        NodeType::Ministry,
        NodeType::Bureau,
        NodeType::Division,
        NodeType::Project,
        NodeType::Recipient,
    ];

    pub fn layer_index(self) -> usize {
        self as usize
    }

    pub fn for_layer(layer: usize) -> Option<Self> {
        Self::ALL.get(layer).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NodeType::Ministry => "ministry",
            NodeType::Bureau => "bureau",
            NodeType::Division => "division",
            NodeType::Project => "project",
            NodeType::Recipient => "recipient",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<u8> for NodeType {
    type Error = EnumConversionError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(NodeType::Ministry),
            1 => Ok(NodeType::Bureau),
            2 => Ok(NodeType::Division),
            3 => Ok(NodeType::Project),
            4 => Ok(NodeType::Recipient),
            _ => Err(EnumConversionError::InvalidLayer(value)),
        }
    }
}
