//! Connection queries
//!
//! Slices of the host's connection list by role. Trigger connections gate
//! activation; auxiliary connections carry structured data and injected
//! errors and never count towards head/downstream classification.
//!
//! The engine trusts that the supplied graph is already type-valid; see
//! [`validation`](crate::validation) for the predicate the editor consults
//! when a link is drawn.

use std::collections::HashSet;

use crate::config::EngineConfig;
use crate::types::{Connection, NodeSnapshot};

/// All connections targeting a node
pub fn input_connections<'a>(connections: &'a [Connection], node_id: &str) -> Vec<&'a Connection> {
    connections.iter().filter(|c| c.target == node_id).collect()
}

/// Connections targeting a node, excluding the auxiliary port
pub fn non_auxiliary_input_connections<'a>(
    connections: &'a [Connection],
    node_id: &str,
    config: &EngineConfig,
) -> Vec<&'a Connection> {
    connections
        .iter()
        .filter(|c| c.target == node_id && !c.is_auxiliary(config))
        .collect()
}

/// Connections targeting the node's trigger port
pub fn trigger_connections<'a>(
    connections: &'a [Connection],
    node_id: &str,
    config: &EngineConfig,
) -> Vec<&'a Connection> {
    connections
        .iter()
        .filter(|c| c.target == node_id && c.is_trigger(config))
        .collect()
}

/// Connections targeting the node's auxiliary port
pub fn auxiliary_input_connections<'a>(
    connections: &'a [Connection],
    node_id: &str,
    config: &EngineConfig,
) -> Vec<&'a Connection> {
    connections
        .iter()
        .filter(|c| c.target == node_id && c.is_auxiliary(config))
        .collect()
}

/// Nodes that feed at least one connection, in node order
pub fn source_nodes<'a>(
    connections: &[Connection],
    all_nodes: &'a [NodeSnapshot],
) -> Vec<&'a NodeSnapshot> {
    let sources: HashSet<&str> = connections.iter().map(|c| c.source.as_str()).collect();
    all_nodes
        .iter()
        .filter(|n| sources.contains(n.id.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Vec<Connection> {
        vec![
            Connection::new("a", "text", "c", "input"),
            Connection::new("t", "out", "c", "trigger"),
            Connection::new("e", "error", "c", "json"),
            Connection::new("a", "text", "d", "input"),
        ]
    }

    #[test]
    fn test_input_slices() {
        let config = EngineConfig::default();
        let connections = sample();

        assert_eq!(input_connections(&connections, "c").len(), 3);
        assert_eq!(non_auxiliary_input_connections(&connections, "c", &config).len(), 2);
        assert_eq!(trigger_connections(&connections, "c", &config).len(), 1);
        assert_eq!(auxiliary_input_connections(&connections, "c", &config).len(), 1);
        assert!(input_connections(&connections, "a").is_empty());
    }

    #[test]
    fn test_source_nodes_deduplicated() {
        let nodes = vec![
            NodeSnapshot::new("a", "text-input", json!({})),
            NodeSnapshot::new("c", "view-output", json!({})),
            NodeSnapshot::new("t", "manual-trigger", json!({})),
        ];
        let ids: Vec<&str> = source_nodes(&sample(), &nodes)
            .iter()
            .map(|n| n.id.as_str())
            .collect();
        assert_eq!(ids, vec!["a", "t"]);
    }
}
