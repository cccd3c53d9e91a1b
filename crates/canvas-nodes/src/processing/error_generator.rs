//! Error Generator Node
//!
//! Publishes a fault object on its output. Consumers connected through
//! their auxiliary `json` port show the fault as their own error state
//! until the generator clears it.

use activation_engine::{
    DescribesNode, NodeDescriptor, NodeKind, NodePatch, PortDataType, PortDefinition,
};
use serde_json::json;

/// Error Generator Node
///
/// # Data
/// - `output` - `{isErrorState, errorType, error}`
pub struct ErrorGeneratorNode;

impl ErrorGeneratorNode {
    /// Port ID for the fault output
    pub const PORT_OUTPUT: &'static str = "output";

    /// Start emitting a fault
    pub fn raise(node_id: &str, error_type: &str, message: &str) -> NodePatch {
        NodePatch::new(node_id).set(
            "output",
            json!({"isErrorState": true, "errorType": error_type, "error": message}),
        )
    }

    /// Stop emitting a fault
    pub fn clear(node_id: &str) -> NodePatch {
        NodePatch::new(node_id).set("output", json!({"isErrorState": false}))
    }
}

impl DescribesNode for ErrorGeneratorNode {
    fn descriptor() -> NodeDescriptor {
        NodeDescriptor::new("error-generator", NodeKind::Content, "Error Generator")
            .with_description("Injects errors into connected nodes")
            .with_output(PortDefinition::output(Self::PORT_OUTPUT, "Error", PortDataType::Json))
    }
}

inventory::submit!(activation_engine::DescriptorFn(ErrorGeneratorNode::descriptor));
