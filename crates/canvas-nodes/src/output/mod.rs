//! Output nodes
//!
//! Nodes that display upstream results.

mod data_table;
mod view_output;

pub use data_table::DataTableNode;
pub use view_output::ViewOutputNode;
