//! View Output Node
//!
//! Collects values from everything connected to it and displays them.
//! It is active only while at least one displayed value has content.

use activation_engine::{
    DescribesNode, NodeDescriptor, NodeKind, NodePatch, PortDataType, PortDefinition,
};
use serde_json::{json, Value};

/// View Output Node
///
/// # Data
/// - `displayedValues` - `[{source, content}]`, one entry per upstream
pub struct ViewOutputNode;

impl ViewOutputNode {
    /// Port ID for displayed values
    pub const PORT_VALUE: &'static str = "value";
    /// Port ID for injected errors
    pub const PORT_JSON: &'static str = "json";

    /// Replace the displayed values
    pub fn display<'a>(
        node_id: &str,
        values: impl IntoIterator<Item = (&'a str, Value)>,
    ) -> NodePatch {
        let displayed: Vec<Value> = values
            .into_iter()
            .map(|(source, content)| json!({"source": source, "content": content}))
            .collect();
        NodePatch::new(node_id).set("displayedValues", displayed)
    }
}

impl DescribesNode for ViewOutputNode {
    fn descriptor() -> NodeDescriptor {
        NodeDescriptor::new("view-output", NodeKind::ViewOutput, "View Output")
            .with_description("Displays upstream values")
            .with_input(PortDefinition::input(Self::PORT_VALUE, "Value", PortDataType::Any))
            .with_input(PortDefinition::input(Self::PORT_JSON, "Errors", PortDataType::Json))
            .error_consumer()
    }
}

inventory::submit!(activation_engine::DescriptorFn(ViewOutputNode::descriptor));

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let patch = ViewOutputNode::display("v", [("a", json!("hi")), ("b", json!(3))]);
        let values = patch.fields["displayedValues"].as_array().unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values[0]["source"], "a");
        assert_eq!(values[1]["content"], 3);
    }
}
