//! Activation Engine - activation and propagation rules for node canvases
//!
//! This crate decides, for every node on an editor canvas, whether it
//! currently carries meaningful output. It supports:
//!
//! - Head/downstream classification from the connection list
//! - Category-specific activation rules with trigger gating
//! - A structural activation cache with fast deactivation
//! - Timed cycle/pulse oscillators driven by tokio tasks
//! - An auxiliary channel that injects errors into consumer nodes
//!
//! # Architecture
//!
//! - `ActivationEvaluator`: the per-node rules engine
//! - `ActivationCache`: process-wide memo of evaluator results
//! - `OscillatorArena`: owner of every running oscillator
//! - `ErrorChannel`: injected error tracking
//! - `ActivationEngine`: coalesces changes into ticks and ties it together
//! - `EventSink`: generic event streaming (not tied to any UI)
//!
//! # Example
//!
//! ```ignore
//! use activation_engine::{
//!     ActivationEngine, CanvasBuilder, EngineConfig, NodeRegistry, NullEventSink,
//! };
//!
//! let engine = ActivationEngine::new(
//!     EngineConfig::default(),
//!     NodeRegistry::with_builtins(),
//!     std::sync::Arc::new(NullEventSink),
//! );
//! let mut graph = CanvasBuilder::new()
//!     .add_node("in", "text-input")
//!     .with_data(serde_json::json!({"text": "hello"}))
//!     .add_node("out", "view-output")
//!     .connect("in", "text", "out", "value")
//!     .build();
//!
//! engine.mark_all_dirty();
//! engine.run_tick(&graph).apply_to(&mut graph);
//! ```

pub mod builder;
pub mod cache;
pub mod classifier;
pub mod coalescer;
pub mod config;
pub mod connections;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod error_channel;
pub mod evaluator;
pub mod events;
pub mod oscillator;
pub mod registry;
pub mod truthy;
pub mod types;
pub mod validation;

// Re-export key types
pub use builder::CanvasBuilder;
pub use cache::{ActivationCache, CacheEntry, CacheKeyKind, CacheStats};
pub use classifier::{classify, is_head_node, ActivationSource};
pub use coalescer::TickCoalescer;
pub use config::EngineConfig;
pub use descriptor::{DescribesNode, DescriptorFn, NodeDescriptor};
pub use engine::{ActivationEngine, ActivationReport, TickOutcome};
pub use error::{ActivationError, Result};
pub use error_channel::{ErrorChannel, ErrorUpdate, InjectedError};
pub use evaluator::{ActivationEvaluator, Evaluation};
pub use events::{EngineEvent, EventError, EventSink, NullEventSink, StopReason, VecEventSink};
pub use oscillator::{
    InputOutcome, OscillatorArena, OscillatorConfig, OscillatorPhase, OscillatorState,
};
pub use registry::NodeRegistry;
pub use types::{
    CanvasGraph, Connection, NodeId, NodeKind, NodePatch, NodeSnapshot, PortDataType,
    PortDefinition, PortDirection, PortId,
};
pub use validation::{
    validate_canvas, validate_connection, DataDeclaredPorts, DynamicPortSupplier, NoDynamicPorts,
};

