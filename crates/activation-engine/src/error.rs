//! Error types for the activation engine

use thiserror::Error;

/// Result type alias using ActivationError
pub type Result<T> = std::result::Result<T, ActivationError>;

/// Errors that can occur in the activation engine
///
/// None of these escape a per-node evaluation: the engine converts them
/// into an inactive result at the node boundary.
#[derive(Debug, Error)]
pub enum ActivationError {
    /// Node data has a shape the evaluator cannot read
    #[error("Malformed data on node '{node_id}': {reason}")]
    MalformedData { node_id: String, reason: String },

    /// Oscillator settings are out of range
    #[error("Invalid oscillator configuration for '{node_id}': {reason}")]
    InvalidOscillator { node_id: String, reason: String },

    /// Oscillators need a tokio runtime to schedule their timers
    #[error("No async runtime available to start oscillator '{0}'")]
    NoRuntime(String),

    /// A connection references a node that is not in the graph
    #[error("Unknown node: {0}")]
    UnknownNode(String),

    /// A connection references a port the node does not expose
    #[error("Node '{node_id}' has no {direction} port '{port_id}'")]
    UnknownPort {
        node_id: String,
        port_id: String,
        direction: String,
    },

    /// The two ends of a connection carry incompatible data types
    #[error("Incompatible port types: {source_type} -> {target_type}")]
    IncompatiblePorts {
        source_type: String,
        target_type: String,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ActivationError {
    /// Create a malformed data error with a message
    pub fn malformed(node_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedData {
            node_id: node_id.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid oscillator error with a message
    pub fn invalid_oscillator(node_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidOscillator {
            node_id: node_id.into(),
            reason: reason.into(),
        }
    }
}
