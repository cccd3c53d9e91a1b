//! Input nodes
//!
//! Nodes that hold user-entered values or fire on demand.

mod manual_trigger;
mod text_input;

pub use json_test::JsonTestNode;
pub use manual_trigger::ManualTriggerNode;
pub use text_input::TextInputNode;
