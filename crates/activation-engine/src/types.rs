//! Core types for canvas graphs
//!
//! These types define the structure the host editor hands to the engine:
//! node snapshots, typed ports, the connections between them, and the
//! patches the engine writes back.

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;

/// Unique identifier for a node
pub type NodeId = String;

/// Unique identifier for a port
pub type PortId = String;

/// The data type of a port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortDataType {
    /// Text string
    String,
    /// Numeric value
    Number,
    /// Boolean value
    Boolean,
    /// JSON object
    Json,
    /// Ordered list
    Array,
    /// Arbitrary-precision integer
    BigInt,
    /// Floating point value
    Float,
    /// Accepts any type
    Any,
    /// Explicitly undefined
    Undefined,
    /// Symbol value
    Symbol,
    /// Explicit null
    Null,
}

impl PortDataType {
    /// Check if an output of this type can connect to an input of `other`
    pub fn is_compatible_with(&self, other: &PortDataType) -> bool {
        use PortDataType::*;

        if matches!(self, Any) || matches!(other, Any) {
            return true;
        }

        // Numeric family
        if matches!(
            (self, other),
            (Number, Float) | (Float, Number) | (Number, BigInt) | (BigInt, Number)
        ) {
            return true;
        }

        self == other
    }
}

/// Whether a port receives or emits data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortDirection {
    Input,
    Output,
}

/// Definition of a port (input or output)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortDefinition {
    /// Unique identifier for this port
    pub id: PortId,
    /// Human-readable label
    pub label: String,
    /// Data type of the port
    pub data_type: PortDataType,
    /// Input or output
    pub direction: PortDirection,
}

impl PortDefinition {
    /// Create an input port
    pub fn input(id: impl Into<String>, label: impl Into<String>, data_type: PortDataType) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            data_type,
            direction: PortDirection::Input,
        }
    }

    /// Create an output port
    pub fn output(
        id: impl Into<String>,
        label: impl Into<String>,
        data_type: PortDataType,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            data_type,
            direction: PortDirection::Output,
        }
    }
}

/// Activation category of a node type
///
/// Resolved once per node type by the registry, never by string matching
/// during evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Active while `triggered` is set
    Trigger,
    /// Timed oscillator, active during its on sub-phase
    Cyclic,
    /// JSON test node, active once its payload parsed cleanly
    JsonTest,
    /// Needs an active input and its own output
    Transform,
    /// Aggregator/sink showing upstream values
    ViewOutput,
    /// Creation and content nodes (the default)
    Content,
}

/// A directed link between two ports
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    /// Source node ID
    pub source: NodeId,
    /// Source port ID
    pub source_handle: PortId,
    /// Target node ID
    pub target: NodeId,
    /// Target port ID
    pub target_handle: PortId,
}

impl Connection {
    pub fn new(
        source: impl Into<String>,
        source_handle: impl Into<String>,
        target: impl Into<String>,
        target_handle: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            source_handle: source_handle.into(),
            target: target.into(),
            target_handle: target_handle.into(),
        }
    }

    /// Targets the reserved boolean gating port
    pub fn is_trigger(&self, config: &EngineConfig) -> bool {
        self.target_handle == config.trigger_handle
    }

    /// Targets the reserved JSON port
    pub fn is_auxiliary(&self, config: &EngineConfig) -> bool {
        self.target_handle == config.auxiliary_handle
    }
}

/// A node as seen by the engine during one evaluation pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSnapshot {
    /// Unique identifier for this node instance
    pub id: NodeId,
    /// Node type tag
    #[serde(rename = "type")]
    pub node_type: String,
    /// Free-form node data
    #[serde(default)]
    pub data: serde_json::Value,
}

impl NodeSnapshot {
    pub fn new(
        id: impl Into<String>,
        node_type: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            data,
        }
    }

    /// Read a field from the node's data
    pub fn field(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }
}

/// Read-only snapshot of the canvas supplied by the host
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasGraph {
    /// Nodes on the canvas
    pub nodes: Vec<NodeSnapshot>,
    /// Connections between node ports
    pub connections: Vec<Connection>,
}

impl CanvasGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Find a node by ID
    pub fn find_node(&self, id: &str) -> Option<&NodeSnapshot> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Find a node by ID (mutable)
    pub fn find_node_mut(&mut self, id: &str) -> Option<&mut NodeSnapshot> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    /// Get connections coming into a node
    pub fn incoming<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Connection> + 'a {
        self.connections.iter().filter(move |c| c.target == node_id)
    }

    /// Get connections going out of a node
    pub fn outgoing<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Connection> + 'a {
        self.connections.iter().filter(move |c| c.source == node_id)
    }

    /// Apply a patch to the node it names; returns false if the node is gone
    pub fn apply_patch(&mut self, patch: &NodePatch) -> bool {
        match self.find_node_mut(&patch.node_id) {
            Some(node) => {
                patch.apply_to(&mut node.data);
                true
            }
            None => false,
        }
    }
}

/// Field writes the engine makes to a single node's data
///
/// A patch only ever names one node; the engine never writes into a
/// neighbor while evaluating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePatch {
    /// Node whose data is updated
    pub node_id: NodeId,
    /// Fields to overwrite
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl NodePatch {
    /// Create an empty patch for a node
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            fields: serde_json::Map::new(),
        }
    }

    /// Set a field on the patch
    pub fn set(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    /// Fold another patch for the same node into this one
    pub fn merge(&mut self, other: NodePatch) {
        self.fields.extend(other.fields);
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Write the fields into node data, turning non-object data into an object
    pub fn apply_to(&self, data: &mut serde_json::Value) {
        if !data.is_object() {
            *data = serde_json::Value::Object(serde_json::Map::new());
        }
        if let Some(obj) = data.as_object_mut() {
            for (key, value) in &self.fields {
                obj.insert(key.clone(), value.clone());
            }
        }
    }
}
