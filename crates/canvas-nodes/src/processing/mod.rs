//! Processing nodes
//!
//! Nodes that transform upstream data or emit faults.

mod error_generator;
mod json_parse;
mod text_transform;

pub use error_generator::ErrorGeneratorNode;
pub use json_parse::JsonParseNode;
pub use text_transform::{TextTransformNode, TransformMode};
