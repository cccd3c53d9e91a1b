//! Node descriptor trait and metadata types
//!
//! Node implementations describe themselves (ports, activation category,
//! whether they surface injected errors) through `DescribesNode`, and
//! register that description at link time with `inventory`:
//!
//! ```ignore
//! inventory::submit!(activation_engine::DescriptorFn(MyNode::descriptor));
//! ```

use serde::{Deserialize, Serialize};

use crate::types::{NodeKind, PortDefinition};

/// Trait for node types that can describe their metadata
pub trait DescribesNode {
    /// Get the static metadata for this node type
    fn descriptor() -> NodeDescriptor
    where
        Self: Sized;
}

/// Complete metadata for a node type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDescriptor {
    /// Unique type identifier (e.g., "cycle-pulse")
    pub node_type: String,
    /// Activation category, fixed at registration
    pub kind: NodeKind,
    /// Human-readable label
    pub label: String,
    /// Description of what the node does
    pub description: String,
    /// Input port definitions
    pub inputs: Vec<PortDefinition>,
    /// Output port definitions
    pub outputs: Vec<PortDefinition>,
    /// Ports are derived from node data and supplied by the host
    #[serde(default)]
    pub dynamic_ports: bool,
    /// Surfaces errors injected over the auxiliary channel
    #[serde(default)]
    pub accepts_error_injection: bool,
}

impl NodeDescriptor {
    /// Create a descriptor with no ports
    pub fn new(node_type: impl Into<String>, kind: NodeKind, label: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
            kind,
            label: label.into(),
            description: String::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            dynamic_ports: false,
            accepts_error_injection: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_input(mut self, port: PortDefinition) -> Self {
        self.inputs.push(port);
        self
    }

    pub fn with_output(mut self, port: PortDefinition) -> Self {
        self.outputs.push(port);
        self
    }

    /// Mark the node's ports as host-supplied
    pub fn dynamic(mut self) -> Self {
        self.dynamic_ports = true;
        self
    }

    /// Mark the node as a consumer of injected errors
    pub fn error_consumer(mut self) -> Self {
        self.accepts_error_injection = true;
        self
    }

    /// Look up an input port by id
    pub fn input(&self, port_id: &str) -> Option<&PortDefinition> {
        self.inputs.iter().find(|p| p.id == port_id)
    }

    /// Look up an output port by id
    pub fn output(&self, port_id: &str) -> Option<&PortDefinition> {
        self.outputs.iter().find(|p| p.id == port_id)
    }
}

/// Link-time registration of a node descriptor
pub struct DescriptorFn(pub fn() -> NodeDescriptor);

inventory::collect!(DescriptorFn);
