//! Manual Trigger Node
//!
//! A button on the canvas. While `triggered` is set it gates open every
//! node connected to its output through a trigger port.

use activation_engine::{
    DescribesNode, NodeDescriptor, NodeKind, NodePatch, PortDataType, PortDefinition,
};

/// Manual Trigger Node
///
/// # Data
/// - `triggered` - whether the trigger is currently firing
pub struct ManualTriggerNode;

impl ManualTriggerNode {
    /// Port ID for the boolean output
    pub const PORT_OUT: &'static str = "out";

    /// Patch that fires or releases the trigger
    pub fn set_triggered(node_id: &str, triggered: bool) -> NodePatch {
        NodePatch::new(node_id).set("triggered", triggered)
    }
}

impl DescribesNode for ManualTriggerNode {
    fn descriptor() -> NodeDescriptor {
        NodeDescriptor::new("manual-trigger", NodeKind::Trigger, "Manual Trigger")
            .with_description("Fires a boolean signal on demand")
            .with_output(PortDefinition::output(Self::PORT_OUT, "Triggered", PortDataType::Boolean))
    }
}

inventory::submit!(activation_engine::DescriptorFn(ManualTriggerNode::descriptor));
