//! Head/downstream classification

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::connections::non_auxiliary_input_connections;
use crate::types::Connection;

/// Which algorithm decided a node's activation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationSource {
    /// No gating inputs; evaluated as a data source
    Head,
    /// Evaluated relative to upstream activity
    Downstream,
}

impl ActivationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Head => "head",
            Self::Downstream => "downstream",
        }
    }
}

/// A node is a head iff it has no non-auxiliary inputs
///
/// Nodes wired only through the auxiliary port are still heads.
pub fn is_head_node(connections: &[Connection], node_id: &str, config: &EngineConfig) -> bool {
    non_auxiliary_input_connections(connections, node_id, config).is_empty()
}

/// Classify a node as head or downstream
pub fn classify(
    connections: &[Connection],
    node_id: &str,
    config: &EngineConfig,
) -> ActivationSource {
    if is_head_node(connections, node_id, config) {
        ActivationSource::Head
    } else {
        ActivationSource::Downstream
    }
}
