//! Data Table Node
//!
//! A table whose columns are configured by the user. Each column becomes
//! an input port, so its ports live in the node's data rather than in the
//! descriptor; validation reads them through
//! [`DataDeclaredPorts`](activation_engine::DataDeclaredPorts).

use activation_engine::{
    DescribesNode, NodeDescriptor, NodeKind, NodePatch, PortDataType, PortDefinition,
};

/// Data Table Node
///
/// # Data
/// - `inputs` - one port definition per column
pub struct DataTableNode;

impl DataTableNode {
    /// Port definitions for a set of column names
    pub fn columns<'a>(node_id: &str, names: impl IntoIterator<Item = &'a str>) -> NodePatch {
        let ports: Vec<PortDefinition> = names
            .into_iter()
            .map(|name| PortDefinition::input(name, name, PortDataType::Any))
            .collect();
        match serde_json::to_value(&ports) {
            Ok(value) => NodePatch::new(node_id).set("inputs", value),
            Err(e) => {
                log::warn!("Could not serialize columns for '{}': {}", node_id, e);
                NodePatch::new(node_id)
            }
        }
    }
}

impl DescribesNode for DataTableNode {
    fn descriptor() -> NodeDescriptor {
        NodeDescriptor::new("data-table", NodeKind::Content, "Data Table")
            .with_description("Tabulates values from user-defined columns")
            .dynamic()
    }
}

inventory::submit!(activation_engine::DescriptorFn(DataTableNode::descriptor));

#[cfg(test)]
mod tests {
    use super::*;
    use activation_engine::{
        validate_connection, CanvasBuilder, DataDeclaredPorts, NodeRegistry, NoDynamicPorts,
    };
    use serde_json::json;

    #[test]
    fn test_columns_become_ports() {
        let mut table = json!({});
        DataTableNode::columns("t", ["name", "score"]).apply_to(&mut table);

        let graph = CanvasBuilder::new()
            .add_node("in", "text-input")
            .add_node("t", "data-table")
            .with_data(table)
            .connect("in", "text", "t", "score")
            .build();
        let registry = NodeRegistry::with_builtins();

        let connection = &graph.connections[0];
        assert!(validate_connection(&registry, &graph, connection, &DataDeclaredPorts).is_ok());
        assert!(validate_connection(&registry, &graph, connection, &NoDynamicPorts).is_err());
    }
}
