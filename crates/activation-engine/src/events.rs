//! Event types for streaming engine output
//!
//! Events are sent from the engine to the host (or any consumer) to report
//! activation changes, oscillator transitions, injected errors and the
//! node data writes that go with them.

use serde::{Deserialize, Serialize};

use crate::classifier::ActivationSource;
use crate::types::NodePatch;

/// Trait for sending engine events
///
/// This abstracts over the transport mechanism (UI channel, mpsc, etc.)
/// allowing the engine to be used in different contexts. Oscillator timers
/// call `send` from their own tasks, so implementations must not block for
/// long.
pub trait EventSink: Send + Sync {
    /// Send an event
    ///
    /// Returns an error if the event could not be sent (e.g., channel closed)
    fn send(&self, event: EngineEvent) -> Result<(), EventError>;
}

/// Error when sending events fails
#[derive(Debug, Clone)]
pub struct EventError {
    pub message: String,
}

impl std::fmt::Display for EventError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Event error: {}", self.message)
    }
}

impl std::error::Error for EventError {}

impl EventError {
    pub fn channel_closed() -> Self {
        Self {
            message: "Channel closed".to_string(),
        }
    }
}

/// Why an oscillator stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Explicit stop from the host or user
    Manual,
    /// Start signal went low
    InputReleased,
    /// Cycle budget exhausted
    Completed,
    /// Replaced by a new run for the same node
    Restarted,
    /// The node was deleted
    NodeRemoved,
    /// Evaluation of the node failed
    Fault,
}

/// Events emitted by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EngineEvent {
    /// Fields written into a node's data
    #[serde(rename_all = "camelCase")]
    NodeDataPatched { patch: NodePatch },

    /// A node's derived activation flipped
    #[serde(rename_all = "camelCase")]
    ActivationChanged {
        node_id: String,
        is_active: bool,
        source: ActivationSource,
    },

    /// Evaluating a node failed; it was forced inactive
    #[serde(rename_all = "camelCase")]
    EvaluationFault { node_id: String, error: String },

    /// An oscillator run began
    #[serde(rename_all = "camelCase")]
    OscillatorStarted { node_id: String, run_id: String },

    /// Progress sample during the waiting phase
    #[serde(rename_all = "camelCase")]
    OscillatorProgress { node_id: String, progress: f64 },

    /// Waiting elapsed; the node is pulsing
    #[serde(rename_all = "camelCase")]
    PulseStarted { node_id: String, cycle_count: u32 },

    /// The pulse ended
    #[serde(rename_all = "camelCase")]
    PulseEnded { node_id: String, cycle_count: u32 },

    /// An oscillator run ended
    #[serde(rename_all = "camelCase")]
    OscillatorStopped {
        node_id: String,
        reason: StopReason,
        cycle_count: u32,
    },

    /// An error arrived over a node's auxiliary channel
    #[serde(rename_all = "camelCase")]
    ErrorInjected {
        node_id: String,
        error_type: String,
        error: String,
    },

    /// A previously injected error was cleared
    #[serde(rename_all = "camelCase")]
    ErrorCleared { node_id: String },

    /// Stale cache entries were evicted
    #[serde(rename_all = "camelCase")]
    CacheSwept { evicted: usize, remaining: usize },
}

impl EngineEvent {
    /// Create a data patch event
    pub fn patched(patch: NodePatch) -> Self {
        Self::NodeDataPatched { patch }
    }

    /// Node the event concerns, if any
    pub fn node_id(&self) -> Option<&str> {
        match self {
            Self::NodeDataPatched { patch } => Some(&patch.node_id),
            Self::ActivationChanged { node_id, .. }
            | Self::EvaluationFault { node_id, .. }
            | Self::OscillatorStarted { node_id, .. }
            | Self::OscillatorProgress { node_id, .. }
            | Self::PulseStarted { node_id, .. }
            | Self::PulseEnded { node_id, .. }
            | Self::OscillatorStopped { node_id, .. }
            | Self::ErrorInjected { node_id, .. }
            | Self::ErrorCleared { node_id } => Some(node_id),
            Self::CacheSwept { .. } => None,
        }
    }
}

/// A no-op event sink that discards all events
///
/// Useful for testing or when events aren't needed.
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn send(&self, _event: EngineEvent) -> Result<(), EventError> {
        Ok(())
    }
}

/// A vector-based event sink that collects events
///
/// Useful for testing to verify events were emitted correctly.
pub struct VecEventSink {
    events: parking_lot::Mutex<Vec<EngineEvent>>,
}

impl VecEventSink {
    pub fn new() -> Self {
        Self {
            events: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Get all collected events
    pub fn events(&self) -> Vec<EngineEvent> {
        self.events.lock().clone()
    }

    /// Events concerning one node
    pub fn events_for(&self, node_id: &str) -> Vec<EngineEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.node_id() == Some(node_id))
            .cloned()
            .collect()
    }

    /// Clear all collected events
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl Default for VecEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for VecEventSink {
    fn send(&self, event: EngineEvent) -> Result<(), EventError> {
        self.events.lock().push(event);
        Ok(())
    }
}

/// Send an event, logging instead of failing when the sink is gone
pub(crate) fn emit(sink: &dyn EventSink, event: EngineEvent) {
    if let Err(e) = sink.send(event) {
        log::debug!("Dropped engine event: {}", e);
    }
}
