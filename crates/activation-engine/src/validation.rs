//! Connection validation
//!
//! The predicate the editor consults while the user drags a link between
//! two ports. Both nodes must exist, both ports must exist on their
//! nodes, and the source's output type must be compatible with the
//! target's input type.
//!
//! Activation itself never validates; it trusts whatever graph the host
//! supplies.

use serde_json::Value;

use crate::error::{ActivationError, Result};
use crate::registry::NodeRegistry;
use crate::types::{
    CanvasGraph, Connection, NodeSnapshot, PortDataType, PortDefinition, PortDirection,
};

/// Source of ports for node types whose ports depend on their data
pub trait DynamicPortSupplier {
    /// Ports the node currently exposes in one direction
    fn ports(&self, node: &NodeSnapshot, direction: PortDirection) -> Vec<PortDefinition>;
}

/// No node has dynamic ports
pub struct NoDynamicPorts;

impl DynamicPortSupplier for NoDynamicPorts {
    fn ports(&self, _node: &NodeSnapshot, _direction: PortDirection) -> Vec<PortDefinition> {
        Vec::new()
    }
}

/// Ports declared in node data under `inputs` and `outputs`
pub struct DataDeclaredPorts;

impl DynamicPortSupplier for DataDeclaredPorts {
    fn ports(&self, node: &NodeSnapshot, direction: PortDirection) -> Vec<PortDefinition> {
        let key = match direction {
            PortDirection::Input => "inputs",
            PortDirection::Output => "outputs",
        };
        let Some(declared) = node.field(key) else {
            return Vec::new();
        };

        match serde_json::from_value::<Vec<PortDefinition>>(declared.clone()) {
            Ok(ports) => ports
                .into_iter()
                .map(|port| PortDefinition { direction, ..port })
                .collect(),
            Err(e) => {
                log::debug!("Ignoring unreadable {} on '{}': {}", key, node.id, e);
                Vec::new()
            }
        }
    }
}

/// Look up the port a connection end refers to
///
/// Unregistered node types are accepted with an untyped port, since hosts
/// may place nodes the registry has never seen.
pub fn resolve_port(
    registry: &NodeRegistry,
    node: &NodeSnapshot,
    port_id: &str,
    direction: PortDirection,
    dynamic_ports: &dyn DynamicPortSupplier,
) -> Result<PortDefinition> {
    let Some(descriptor) = registry.get(&node.node_type) else {
        return Ok(PortDefinition {
            id: port_id.to_string(),
            label: port_id.to_string(),
            data_type: PortDataType::Any,
            direction,
        });
    };

    let declared = match direction {
        PortDirection::Input => descriptor.input(port_id),
        PortDirection::Output => descriptor.output(port_id),
    };
    if let Some(port) = declared {
        return Ok(port.clone());
    }

    if descriptor.dynamic_ports {
        if let Some(port) = dynamic_ports
            .ports(node, direction)
            .into_iter()
            .find(|p| p.id == port_id)
        {
            return Ok(port);
        }
    }

    Err(ActivationError::UnknownPort {
        node_id: node.id.clone(),
        port_id: port_id.to_string(),
        direction: direction_name(direction).to_string(),
    })
}

/// Check whether a connection may be drawn
pub fn validate_connection(
    registry: &NodeRegistry,
    graph: &CanvasGraph,
    connection: &Connection,
    dynamic_ports: &dyn DynamicPortSupplier,
) -> Result<()> {
    let source = graph
        .find_node(&connection.source)
        .ok_or_else(|| ActivationError::UnknownNode(connection.source.clone()))?;
    let target = graph
        .find_node(&connection.target)
        .ok_or_else(|| ActivationError::UnknownNode(connection.target.clone()))?;

    let output = resolve_port(
        registry,
        source,
        &connection.source_handle,
        PortDirection::Output,
        dynamic_ports,
    )?;
    let input = resolve_port(
        registry,
        target,
        &connection.target_handle,
        PortDirection::Input,
        dynamic_ports,
    )?;

    if !output.data_type.is_compatible_with(&input.data_type) {
        return Err(ActivationError::IncompatiblePorts {
            source_type: type_name(output.data_type),
            target_type: type_name(input.data_type),
        });
    }
    Ok(())
}

/// Validate every connection on the canvas, collecting all problems
pub fn validate_canvas(
    registry: &NodeRegistry,
    graph: &CanvasGraph,
    dynamic_ports: &dyn DynamicPortSupplier,
) -> Vec<ActivationError> {
    graph
        .connections
        .iter()
        .filter_map(|c| validate_connection(registry, graph, c, dynamic_ports).err())
        .collect()
}

fn direction_name(direction: PortDirection) -> &'static str {
    match direction {
        PortDirection::Input => "input",
        PortDirection::Output => "output",
    }
}

fn type_name(data_type: PortDataType) -> String {
    match serde_json::to_value(data_type) {
        Ok(Value::String(name)) => name,
        _ => format!("{:?}", data_type),
    }
}
