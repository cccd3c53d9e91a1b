//! Text Input Node
//!
//! Holds text typed by the user. Active whenever its text is non-empty.

use activation_engine::{DescribesNode, NodeDescriptor, NodeKind, PortDataType, PortDefinition};

/// Text Input Node
///
/// # Data
/// - `text` - the entered text
pub struct TextInputNode;

impl TextInputNode {
    /// Port ID for the text output
    pub const PORT_TEXT: &'static str = "text";
}

impl DescribesNode for TextInputNode {
    fn descriptor() -> NodeDescriptor {
        NodeDescriptor::new("text-input", NodeKind::Content, "Text Input")
            .with_description("Provides user-entered text")
            .with_output(PortDefinition::output(Self::PORT_TEXT, "Text", PortDataType::String))
    }
}

inventory::submit!(activation_engine::DescriptorFn(TextInputNode::descriptor));
