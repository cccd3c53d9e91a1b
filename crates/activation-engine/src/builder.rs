//! Fluent builder for canvas snapshots
//!
//! Hosts normally hand the engine the snapshot their editor already has;
//! the builder is for constructing graphs programmatically.

use serde_json::Value;

use crate::config::EngineConfig;
use crate::types::{CanvasGraph, Connection, NodeSnapshot};

/// Fluent builder for constructing canvas graphs
///
/// # Example
///
/// ```ignore
/// let graph = CanvasBuilder::new()
///     .add_node("input-1", "text-input")
///     .with_data(serde_json::json!({"text": "Hello"}))
///     .add_node("output-1", "view-output")
///     .connect("input-1", "text", "output-1", "value")
///     .build();
/// ```
pub struct CanvasBuilder {
    trigger_handle: String,
    auxiliary_handle: String,
    nodes: Vec<NodeSnapshot>,
    connections: Vec<Connection>,
}

impl CanvasBuilder {
    /// Create a builder using the default reserved handles
    pub fn new() -> Self {
        Self::with_config(&EngineConfig::default())
    }

    /// Create a builder using the reserved handles of `config`
    pub fn with_config(config: &EngineConfig) -> Self {
        Self {
            trigger_handle: config.trigger_handle.clone(),
            auxiliary_handle: config.auxiliary_handle.clone(),
            nodes: Vec::new(),
            connections: Vec::new(),
        }
    }

    /// Add a node with empty data
    pub fn add_node(mut self, id: impl Into<String>, node_type: impl Into<String>) -> Self {
        self.nodes.push(NodeSnapshot::new(id, node_type, Value::Object(Default::default())));
        self
    }

    /// Set data on the most recently added node
    ///
    /// Must be called immediately after `add_node`.
    pub fn with_data(mut self, data: Value) -> Self {
        if let Some(node) = self.nodes.last_mut() {
            node.data = data;
        }
        self
    }

    /// Connect two ports
    pub fn connect(
        mut self,
        source: impl Into<String>,
        source_handle: impl Into<String>,
        target: impl Into<String>,
        target_handle: impl Into<String>,
    ) -> Self {
        self.connections
            .push(Connection::new(source, source_handle, target, target_handle));
        self
    }

    /// Connect into the target's trigger port
    pub fn connect_trigger(
        self,
        source: impl Into<String>,
        source_handle: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        let handle = self.trigger_handle.clone();
        self.connect(source, source_handle, target, handle)
    }

    /// Connect into the target's auxiliary port
    pub fn connect_auxiliary(
        self,
        source: impl Into<String>,
        source_handle: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        let handle = self.auxiliary_handle.clone();
        self.connect(source, source_handle, target, handle)
    }

    pub fn build(self) -> CanvasGraph {
        CanvasGraph {
            nodes: self.nodes,
            connections: self.connections,
        }
    }
}

impl Default for CanvasBuilder {
    fn default() -> Self {
        Self::new()
    }
}
