//! Error propagation channel
//!
//! A second signal path beside activation. Generator nodes publish a fault
//! object on their output; consumers connected to it through the auxiliary
//! port surface that fault as their own error state and drop it again when
//! the source clears or the connection goes away.
//!
//! Injected errors are data. They never feed into activation and never
//! travel through the primary connections.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::EngineConfig;
use crate::connections::auxiliary_input_connections;
use crate::registry::NodeRegistry;
use crate::types::{CanvasGraph, NodeId, NodePatch, NodeSnapshot};

/// Error type used when a payload names none
pub const DEFAULT_ERROR_TYPE: &str = "error";

/// Field recording who wrote a node's error state
pub const ERROR_SOURCE_FIELD: &str = "errorSource";
/// `errorSource` value for errors injected over the auxiliary channel
pub const AUXILIARY_ERROR_SOURCE: &str = "auxiliary";

/// A fault received over the auxiliary channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InjectedError {
    pub error_type: String,
    pub error: String,
}

/// What a consumer should do with its error fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorUpdate {
    /// Enter (or change) the error state
    Inject(InjectedError),
    /// Leave a previously injected error state
    Clear,
    /// Nothing to write
    Unchanged,
}

impl ErrorUpdate {
    /// Error fields to write into the consumer's own data
    pub fn to_patch(&self, node_id: &str) -> Option<NodePatch> {
        match self {
            Self::Inject(injected) => Some(
                NodePatch::new(node_id)
                    .set("isErrorState", true)
                    .set("errorType", injected.error_type.as_str())
                    .set("error", injected.error.as_str())
                    .set(ERROR_SOURCE_FIELD, AUXILIARY_ERROR_SOURCE),
            ),
            Self::Clear => Some(
                NodePatch::new(node_id)
                    .set("isErrorState", false)
                    .set("errorType", Value::Null)
                    .set("error", Value::Null)
                    .set(ERROR_SOURCE_FIELD, Value::Null),
            ),
            Self::Unchanged => None,
        }
    }
}

/// Read a fault out of a source node's data
///
/// The fault lives in the source's `output` object when it has one,
/// otherwise directly in its data.
pub fn read_payload(source_data: &Value) -> Option<InjectedError> {
    let payload = match source_data.get("output") {
        Some(output @ Value::Object(_)) => output,
        _ => source_data,
    };

    if payload.get("isErrorState") != Some(&Value::Bool(true)) {
        return None;
    }
    let error = payload.get("error").and_then(Value::as_str).filter(|e| !e.is_empty())?;
    let error_type = payload
        .get("errorType")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .unwrap_or(DEFAULT_ERROR_TYPE);

    Some(InjectedError {
        error_type: error_type.to_string(),
        error: error.to_string(),
    })
}

/// Whether a node's data shows an error the auxiliary channel owns
///
/// On consumer nodes the error fields belong to this channel unless
/// another writer tagged them with a different `errorSource`. The data is
/// the record of truth, so an error restored with the canvas is still
/// recognised after the engine restarts.
pub fn shows_injected_error(node: &NodeSnapshot) -> bool {
    if node.field("isErrorState") != Some(&Value::Bool(true)) {
        return false;
    }
    match node.field(ERROR_SOURCE_FIELD) {
        None | Some(Value::Null) => true,
        Some(source) => source.as_str() == Some(AUXILIARY_ERROR_SOURCE),
    }
}

/// Tracks the errors each consumer is currently showing
pub struct ErrorChannel {
    observed: Mutex<HashMap<NodeId, InjectedError>>,
}

impl ErrorChannel {
    pub fn new() -> Self {
        Self {
            observed: Mutex::new(HashMap::new()),
        }
    }

    /// Decide the error update for one node
    ///
    /// The first auxiliary source carrying a fault wins. When none does,
    /// an error this channel injected is cleared, whether it was observed
    /// in this session or only recorded in the node's data.
    pub fn evaluate(
        &self,
        node: &NodeSnapshot,
        graph: &CanvasGraph,
        config: &EngineConfig,
        registry: &NodeRegistry,
    ) -> ErrorUpdate {
        if !registry.accepts_error_injection(&node.node_type, config) {
            return ErrorUpdate::Unchanged;
        }

        let incoming = auxiliary_input_connections(&graph.connections, &node.id, config);
        let fault = incoming
            .iter()
            .filter_map(|c| graph.find_node(&c.source))
            .find_map(|source| read_payload(&source.data));

        let mut observed = self.observed.lock();
        match fault {
            Some(injected) => {
                let showing = node.field(ERROR_SOURCE_FIELD).and_then(Value::as_str)
                    == Some(AUXILIARY_ERROR_SOURCE)
                    && node.field("error").and_then(Value::as_str) == Some(injected.error.as_str())
                    && node.field("errorType").and_then(Value::as_str)
                        == Some(injected.error_type.as_str());
                if showing && shows_injected_error(node) {
                    observed.insert(node.id.clone(), injected);
                    return ErrorUpdate::Unchanged;
                }
                log::debug!(
                    "Injecting {} error into '{}': {}",
                    injected.error_type,
                    node.id,
                    injected.error
                );
                observed.insert(node.id.clone(), injected.clone());
                ErrorUpdate::Inject(injected)
            }
            None => {
                let tracked = observed.remove(&node.id).is_some();
                if tracked || shows_injected_error(node) {
                    log::debug!("Clearing injected error on '{}'", node.id);
                    ErrorUpdate::Clear
                } else {
                    ErrorUpdate::Unchanged
                }
            }
        }
    }

    /// The error a consumer is currently showing, if any
    pub fn observed(&self, node_id: &str) -> Option<InjectedError> {
        self.observed.lock().get(node_id).cloned()
    }

    /// Drop tracking for a removed node
    pub fn forget(&self, node_id: &str) -> bool {
        self.observed.lock().remove(node_id).is_some()
    }
}

impl Default for ErrorChannel {
    fn default() -> Self {
        Self::new()
    }
}
