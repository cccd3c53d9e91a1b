//! Text Transform Node
//!
//! Applies a string transformation to its input. Like every transform it
//! only counts as active once it has produced a non-empty `output`.

use activation_engine::{
    DescribesNode, NodeDescriptor, NodeKind, NodePatch, PortDataType, PortDefinition,
};
use serde::{Deserialize, Serialize};

/// Transformation applied by the node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformMode {
    #[default]
    Uppercase,
    Lowercase,
    Trim,
    Reverse,
}

impl TransformMode {
    pub fn apply(&self, input: &str) -> String {
        match self {
            Self::Uppercase => input.to_uppercase(),
            Self::Lowercase => input.to_lowercase(),
            Self::Trim => input.trim().to_string(),
            Self::Reverse => input.chars().rev().collect(),
        }
    }
}

/// Text Transform Node
///
/// # Data
/// - `mode` - one of `uppercase`, `lowercase`, `trim`, `reverse`
/// - `output` - the transformed text
pub struct TextTransformNode;

impl TextTransformNode {
    /// Port ID for the text input
    pub const PORT_INPUT: &'static str = "input";
    /// Port ID for the transformed output
    pub const PORT_OUTPUT: &'static str = "output";

    /// Transform `input` and produce the output write
    pub fn run(node_id: &str, mode: TransformMode, input: &str) -> NodePatch {
        NodePatch::new(node_id).set("output", mode.apply(input))
    }
}

impl DescribesNode for TextTransformNode {
    fn descriptor() -> NodeDescriptor {
        NodeDescriptor::new("text-transform", NodeKind::Transform, "Text Transform")
            .with_description("Transforms text from its input")
            .with_input(PortDefinition::input(Self::PORT_INPUT, "Input", PortDataType::String))
            .with_output(PortDefinition::output(Self::PORT_OUTPUT, "Output", PortDataType::String))
    }
}

inventory::submit!(activation_engine::DescriptorFn(TextTransformNode::descriptor));
