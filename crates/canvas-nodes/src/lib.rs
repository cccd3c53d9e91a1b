//! Canvas Nodes
//!
//! Built-in node types for the activation engine. Each node describes its
//! ports and activation category and registers that description at link
//! time, so `NodeRegistry::with_builtins()` picks it up.
//!
//! # Categories
//!
//! - **Input**: Nodes that hold user-entered values or fire manually
//! - **Control**: Timed nodes that drive other nodes
//! - **Processing**: Nodes that transform upstream data or emit faults
//! - **Output**: Nodes that display upstream results

pub mod control;
pub mod input;
pub mod output;
pub mod processing;

// Re-export all nodes for convenience
pub use control::*;
pub use input::*;
pub use output::*;
pub use processing::*;
