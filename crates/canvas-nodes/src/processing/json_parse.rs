//! JSON Parse Node
//!
//! Parses the text on its input into structured JSON.

use activation_engine::{
    DescribesNode, NodeDescriptor, NodeKind, NodePatch, PortDataType, PortDefinition,
};
use serde_json::Value;

/// JSON Parse Node
///
/// # Data
/// - `output` - the parsed value, null when parsing failed
/// - `error` - the parse error, if any
pub struct JsonParseNode;

impl JsonParseNode {
    /// Port ID for the text input
    pub const PORT_INPUT: &'static str = "input";
    /// Port ID for the parsed output
    pub const PORT_OUTPUT: &'static str = "output";

    /// Parse `input` and produce the output write
    pub fn run(node_id: &str, input: &str) -> NodePatch {
        match serde_json::from_str::<Value>(input) {
            Ok(parsed) => NodePatch::new(node_id)
                .set("output", parsed)
                .set("error", Value::Null),
            Err(e) => NodePatch::new(node_id)
                .set("output", Value::Null)
                .set("error", e.to_string()),
        }
    }
}

impl DescribesNode for JsonParseNode {
    fn descriptor() -> NodeDescriptor {
        NodeDescriptor::new("json-parse", NodeKind::Transform, "JSON Parse")
            .with_description("Parses text into JSON")
            .with_input(PortDefinition::input(Self::PORT_INPUT, "Text", PortDataType::String))
            .with_output(PortDefinition::output(Self::PORT_OUTPUT, "JSON", PortDataType::Json))
    }
}

inventory::submit!(activation_engine::DescriptorFn(JsonParseNode::descriptor));
