//! Batch activation engine
//!
//! Ties the evaluator, cache, oscillators and error channel together
//! behind the interface the host talks to. The host marks nodes dirty as
//! the canvas changes and calls [`ActivationEngine::run_tick`] once per
//! frame with the current snapshot; the engine evaluates each dirty node
//! once and hands back the field writes to apply.
//!
//! # Key Concepts
//!
//! - **Read-only snapshot**: a tick never sees its own writes, so feedback
//!   loops settle over successive ticks instead of recursing
//! - **Node-local writes**: every patch names the node it was computed for
//! - **Contained faults**: a node that fails to evaluate reads as inactive
//!   and the rest of the batch carries on
//! - **Follow-up ticks**: when a node's activation flips, its dependents
//!   are queued for the next tick

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cache::ActivationCache;
use crate::classifier::{classify, ActivationSource};
use crate::coalescer::TickCoalescer;
use crate::config::EngineConfig;
use crate::connections::trigger_connections;
use crate::error::{ActivationError, Result};
use crate::error_channel::{ErrorChannel, ErrorUpdate};
use crate::evaluator::{is_source_active, ActivationEvaluator};
use crate::events::{emit, EngineEvent, EventError, EventSink};
use crate::oscillator::{InputOutcome, OscillatorArena, OscillatorConfig};
use crate::registry::NodeRegistry;
use crate::truthy::flag;
use crate::types::{CanvasGraph, NodeKind, NodePatch, NodeSnapshot};

/// Data field that starts a cyclic node while true
pub const RUN_FLAG_FIELD: &str = "run";

/// Activation result handed back to the host for one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationReport {
    pub node_id: String,
    pub calculated_is_active: bool,
    pub is_head_node: bool,
    pub activation_source: ActivationSource,
}

/// Everything one tick produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickOutcome {
    /// One report per evaluated node, in canvas order
    pub reports: Vec<ActivationReport>,
    /// At most one patch per node
    pub patches: Vec<NodePatch>,
}

impl TickOutcome {
    pub fn report(&self, node_id: &str) -> Option<&ActivationReport> {
        self.reports.iter().find(|r| r.node_id == node_id)
    }

    pub fn patch(&self, node_id: &str) -> Option<&NodePatch> {
        self.patches.iter().find(|p| p.node_id == node_id)
    }

    /// Apply every patch to the snapshot the host keeps
    pub fn apply_to(&self, graph: &mut CanvasGraph) {
        for patch in &self.patches {
            graph.apply_patch(patch);
        }
    }
}

/// Forwards oscillator output and queues the written node for a tick
struct DirtyMarkingSink {
    inner: Arc<dyn EventSink>,
    dirty: Arc<TickCoalescer>,
}

impl EventSink for DirtyMarkingSink {
    fn send(&self, event: EngineEvent) -> std::result::Result<(), EventError> {
        if let EngineEvent::NodeDataPatched { patch } = &event {
            self.dirty.mark(&patch.node_id);
        }
        self.inner.send(event)
    }
}

/// The activation engine
pub struct ActivationEngine {
    config: EngineConfig,
    registry: NodeRegistry,
    cache: Arc<ActivationCache>,
    oscillators: OscillatorArena,
    errors: ErrorChannel,
    sink: Arc<dyn EventSink>,
    dirty: Arc<TickCoalescer>,
    ticks: AtomicU64,
}

impl ActivationEngine {
    /// Create an engine with a private cache
    pub fn new(config: EngineConfig, registry: NodeRegistry, sink: Arc<dyn EventSink>) -> Self {
        let cache = Arc::new(ActivationCache::new(&config));
        Self::with_cache(config, registry, cache, sink)
    }

    /// Create an engine sharing an existing cache
    pub fn with_cache(
        config: EngineConfig,
        registry: NodeRegistry,
        cache: Arc<ActivationCache>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let dirty = Arc::new(TickCoalescer::new());
        let oscillator_sink = Arc::new(DirtyMarkingSink {
            inner: Arc::clone(&sink),
            dirty: Arc::clone(&dirty),
        });

        Self {
            config,
            registry,
            cache,
            oscillators: OscillatorArena::new(oscillator_sink),
            errors: ErrorChannel::new(),
            sink,
            dirty,
            ticks: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &ActivationCache {
        &self.cache
    }

    pub fn oscillators(&self) -> &OscillatorArena {
        &self.oscillators
    }

    pub fn errors(&self) -> &ErrorChannel {
        &self.errors
    }

    fn evaluator(&self) -> ActivationEvaluator<'_> {
        ActivationEvaluator::new(&self.config, &self.registry, &self.cache)
            .with_oscillators(&self.oscillators)
    }

    /// Evaluate one node right away, outside the tick cycle
    pub fn evaluate_node(
        &self,
        graph: &CanvasGraph,
        node_id: &str,
        bypass_cache: bool,
    ) -> Result<ActivationReport> {
        let node = graph
            .find_node(node_id)
            .ok_or_else(|| ActivationError::UnknownNode(node_id.to_string()))?;
        Ok(self.evaluate_contained(&self.evaluator(), graph, node, bypass_cache))
    }

    /// Queue a node for the next tick
    pub fn mark_dirty(&self, node_id: &str) {
        self.dirty.mark(node_id);
    }

    /// Queue a node whose data changed, together with the nodes it feeds
    pub fn mark_changed(&self, graph: &CanvasGraph, node_id: &str) {
        self.dirty.mark(node_id);
        for connection in graph.outgoing(node_id) {
            self.dirty.mark(&connection.target);
        }
    }

    /// Queue every node, e.g. after loading a canvas or changing connections
    pub fn mark_all_dirty(&self) {
        self.dirty.mark_all();
    }

    /// Whether a tick has work to do
    pub fn has_pending(&self) -> bool {
        self.dirty.is_pending()
    }

    /// Evaluate every dirty node once against the snapshot
    pub fn run_tick(&self, graph: &CanvasGraph) -> TickOutcome {
        let batch = self.dirty.drain();
        let mut outcome = TickOutcome::default();
        if batch.is_empty() {
            self.maybe_sweep();
            return outcome;
        }

        let evaluator = self.evaluator();
        for node in graph.nodes.iter().filter(|n| batch.contains(&n.id)) {
            let mut patch = NodePatch::new(&node.id);

            if self.registry.kind_of(&node.node_type, &self.config) == NodeKind::Cyclic {
                self.drive_oscillator(&evaluator, graph, node);
            }

            let report = self.evaluate_contained(&evaluator, graph, node, false);
            if report.calculated_is_active != flag(&node.data, "isActive") {
                patch = patch.set("isActive", report.calculated_is_active);
                emit(
                    self.sink.as_ref(),
                    EngineEvent::ActivationChanged {
                        node_id: node.id.clone(),
                        is_active: report.calculated_is_active,
                        source: report.activation_source,
                    },
                );
                // Dependents read this node's stored flag, so they settle next tick
                for connection in graph.outgoing(&node.id) {
                    self.dirty.mark(&connection.target);
                }
            }

            let update = self.errors.evaluate(node, graph, &self.config, &self.registry);
            match &update {
                ErrorUpdate::Inject(injected) => emit(
                    self.sink.as_ref(),
                    EngineEvent::ErrorInjected {
                        node_id: node.id.clone(),
                        error_type: injected.error_type.clone(),
                        error: injected.error.clone(),
                    },
                ),
                ErrorUpdate::Clear => emit(
                    self.sink.as_ref(),
                    EngineEvent::ErrorCleared {
                        node_id: node.id.clone(),
                    },
                ),
                ErrorUpdate::Unchanged => {}
            }
            if let Some(error_patch) = update.to_patch(&node.id) {
                patch.merge(error_patch);
            }

            outcome.reports.push(report);
            if !patch.is_empty() {
                emit(self.sink.as_ref(), EngineEvent::patched(patch.clone()));
                outcome.patches.push(patch);
            }
        }

        log::debug!(
            "Tick evaluated {} nodes, {} patches",
            outcome.reports.len(),
            outcome.patches.len()
        );
        self.maybe_sweep();
        outcome
    }

    /// Evaluate with faults folded into an inactive report
    fn evaluate_contained(
        &self,
        evaluator: &ActivationEvaluator<'_>,
        graph: &CanvasGraph,
        node: &NodeSnapshot,
        bypass_cache: bool,
    ) -> ActivationReport {
        let result = evaluator.try_evaluate(
            &node.node_type,
            &node.data,
            &graph.connections,
            &graph.nodes,
            &node.id,
            bypass_cache,
        );

        match result {
            Ok(evaluation) => ActivationReport {
                node_id: node.id.clone(),
                calculated_is_active: evaluation.is_active,
                is_head_node: evaluation.source == ActivationSource::Head,
                activation_source: evaluation.source,
            },
            Err(e) => {
                evaluator.contain_fault(&node.id, &e);
                emit(
                    self.sink.as_ref(),
                    EngineEvent::EvaluationFault {
                        node_id: node.id.clone(),
                        error: e.to_string(),
                    },
                );
                let source = classify(&graph.connections, &node.id, &self.config);
                ActivationReport {
                    node_id: node.id.clone(),
                    calculated_is_active: false,
                    is_head_node: source == ActivationSource::Head,
                    activation_source: source,
                }
            }
        }
    }

    /// Feed a cyclic node's trigger input and run flag to its oscillator
    fn drive_oscillator(
        &self,
        evaluator: &ActivationEvaluator<'_>,
        graph: &CanvasGraph,
        node: &NodeSnapshot,
    ) {
        let trigger_active = trigger_connections(&graph.connections, &node.id, &self.config)
            .iter()
            .filter_map(|c| graph.find_node(&c.source))
            .any(|source| is_source_active(&source.data));
        let run_flag = flag(&node.data, RUN_FLAG_FIELD);

        let config = match OscillatorConfig::from_node_data(
            &node.id,
            &node.data,
            self.config.progress_sample_interval(),
        ) {
            Ok(config) => config,
            Err(e) => {
                if trigger_active || run_flag || self.oscillators.is_running(&node.id) {
                    evaluator.contain_fault(&node.id, &e);
                    emit(
                        self.sink.as_ref(),
                        EngineEvent::EvaluationFault {
                            node_id: node.id.clone(),
                            error: e.to_string(),
                        },
                    );
                }
                return;
            }
        };

        match self
            .oscillators
            .observe_inputs(&node.id, &config, trigger_active, run_flag)
        {
            Ok(InputOutcome::Started(run_id)) => {
                log::debug!("Oscillator {} started by input (run {})", node.id, run_id)
            }
            Ok(InputOutcome::Stopped) => log::debug!("Oscillator {} stopped by input", node.id),
            Ok(InputOutcome::Unchanged) => {}
            Err(e) => log::warn!("Could not drive oscillator '{}': {}", node.id, e),
        }
    }

    fn maybe_sweep(&self) {
        let every = self.config.cache_sweep_every_ticks;
        let tick = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;
        if every > 0 && tick % every == 0 {
            self.sweep_cache();
        }
    }

    /// Evict stale cache entries now
    pub fn sweep_cache(&self) -> usize {
        let evicted = self.cache.sweep(Instant::now());
        let remaining = self.cache.len();
        log::debug!("Cache sweep evicted {} entries, {} remaining", evicted, remaining);
        emit(self.sink.as_ref(), EngineEvent::CacheSwept { evicted, remaining });
        evicted
    }

    /// Forget everything held for a deleted node
    ///
    /// `graph` is the snapshot that still contains the node. Stops its
    /// oscillator, drops its downstream cache entries, its observed error
    /// and any pending tick, then queues the nodes it fed so that activation
    /// and injected errors they received from it are re-read next tick.
    /// Returns whether an oscillator was running.
    pub fn remove_node(&self, graph: &CanvasGraph, node_id: &str) -> bool {
        let stopped = self.cleanup_on_node_removal(node_id);
        for connection in graph.outgoing(node_id) {
            if connection.target != node_id {
                self.dirty.mark(&connection.target);
            }
        }
        stopped
    }

    /// Host hook for node deletion
    ///
    /// Releases the node's own state only. Nodes it fed are not queued;
    /// call [`ActivationEngine::remove_node`] or mark them changed.
    pub fn cleanup_on_node_removal(&self, node_id: &str) -> bool {
        let stopped = self.oscillators.cleanup_on_node_removal(node_id);
        let evicted = self.cache.invalidate_node(node_id);
        self.errors.forget(node_id);
        self.dirty.forget(node_id);
        log::debug!(
            "Removed node {} (oscillator stopped: {}, cache entries evicted: {})",
            node_id,
            stopped,
            evicted
        );
        stopped
    }

    /// Start an unbounded oscillator with explicit timings in milliseconds
    pub fn start_oscillator(
        &self,
        node_id: &str,
        cycle_duration_ms: u64,
        pulse_duration_ms: u64,
    ) -> Result<Uuid> {
        let config = OscillatorConfig::new(
            Duration::from_millis(cycle_duration_ms),
            Duration::from_millis(pulse_duration_ms),
            self.config.progress_sample_interval(),
        );
        self.oscillators.start(node_id, config)
    }

    /// Start an oscillator from a full config
    pub fn start_oscillator_with(&self, node_id: &str, config: OscillatorConfig) -> Result<Uuid> {
        self.oscillators.start(node_id, config)
    }

    /// Stop a node's oscillator; a no-op when it is not running
    pub fn stop_oscillator(&self, node_id: &str) -> bool {
        self.oscillators.stop(node_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::VecEventSink;
    use crate::types::Connection;
    use serde_json::json;

    fn engine() -> (Arc<VecEventSink>, ActivationEngine) {
        let sink = Arc::new(VecEventSink::new());
        let engine =
            ActivationEngine::new(EngineConfig::default(), NodeRegistry::new(), sink.clone());
        (sink, engine)
    }

    fn chain() -> CanvasGraph {
        let mut graph = CanvasGraph::new();
        graph.nodes.push(NodeSnapshot::new("src", "text-input", json!({"text": "hi"})));
        graph.nodes.push(NodeSnapshot::new("mid", "text-display", json!({})));
        graph.nodes.push(NodeSnapshot::new("end", "text-display", json!({})));
        graph.connections.push(Connection::new("src", "text", "mid", "input"));
        graph.connections.push(Connection::new("mid", "text", "end", "input"));
        graph
    }

    #[test]
    fn test_clean_engine_does_nothing() {
        let (_, engine) = engine();
        let outcome = engine.run_tick(&chain());
        assert!(outcome.reports.is_empty());
        assert!(outcome.patches.is_empty());
    }

    #[test]
    fn test_activation_settles_over_ticks() {
        let (sink, engine) = engine();
        let mut graph = chain();
        engine.mark_all_dirty();

        let first = engine.run_tick(&graph);
        assert_eq!(first.reports.len(), 3);
        assert!(first.report("src").unwrap().calculated_is_active);
        assert!(first.report("src").unwrap().is_head_node);
        // mid reads src's text directly; end waits for mid's stored flag
        assert!(first.report("mid").unwrap().calculated_is_active);
        assert!(!first.report("end").unwrap().calculated_is_active);
        first.apply_to(&mut graph);

        assert!(engine.has_pending());
        let second = engine.run_tick(&graph);
        assert!(second.report("end").unwrap().calculated_is_active);
        second.apply_to(&mut graph);

        let third = engine.run_tick(&graph);
        assert!(third.patches.is_empty());
        assert!(!engine.has_pending());

        let changed = sink
            .events()
            .iter()
            .filter(|e| matches!(e, EngineEvent::ActivationChanged { .. }))
            .count();
        assert_eq!(changed, 3);
    }

    #[test]
    fn test_patches_only_touch_evaluated_node() {
        let (_, engine) = engine();
        let graph = chain();
        engine.mark_dirty("mid");

        let outcome = engine.run_tick(&graph);
        assert_eq!(outcome.reports.len(), 1);
        assert!(outcome.patches.iter().all(|p| p.node_id == "mid"));
    }

    #[test]
    fn test_fault_does_not_abort_batch() {
        let (sink, engine) = engine();
        let mut graph = chain();
        graph.nodes[1].data = json!("garbage");
        engine.mark_all_dirty();

        let outcome = engine.run_tick(&graph);
        assert_eq!(outcome.reports.len(), 3);
        assert!(!outcome.report("mid").unwrap().calculated_is_active);
        assert!(outcome.report("src").unwrap().calculated_is_active);
        assert!(sink
            .events_for("mid")
            .iter()
            .any(|e| matches!(e, EngineEvent::EvaluationFault { .. })));
    }

    #[test]
    fn test_mark_changed_queues_dependents() {
        let (_, engine) = engine();
        let graph = chain();
        engine.mark_changed(&graph, "src");

        let outcome = engine.run_tick(&graph);
        let ids: Vec<&str> = outcome.reports.iter().map(|r| r.node_id.as_str()).collect();
        assert_eq!(ids, vec!["src", "mid"]);
    }

    #[test]
    fn test_evaluate_node_unknown() {
        let (_, engine) = engine();
        let result = engine.evaluate_node(&chain(), "ghost", true);
        assert!(matches!(result, Err(ActivationError::UnknownNode(_))));
    }

    #[test]
    fn test_error_patch_merges_with_activation() {
        let (sink, engine) = engine();
        let mut graph = CanvasGraph::new();
        graph.nodes.push(NodeSnapshot::new(
            "gen",
            "error-generator",
            json!({"output": {"isErrorState": true, "error": "boom", "errorType": "network"}}),
        ));
        graph.nodes.push(NodeSnapshot::new("view", "view-output", json!({})));
        graph.connections.push(Connection::new("gen", "output", "view", "json"));
        engine.mark_dirty("view");

        let outcome = engine.run_tick(&graph);
        let patch = outcome.patch("view").unwrap();
        assert_eq!(patch.fields["isErrorState"], true);
        assert_eq!(patch.fields["errorType"], "network");
        assert!(outcome.report("view").unwrap().is_head_node);
        assert!(sink
            .events_for("view")
            .iter()
            .any(|e| matches!(e, EngineEvent::ErrorInjected { .. })));
    }

    #[test]
    fn test_periodic_sweep() {
        let sink = Arc::new(VecEventSink::new());
        let config = EngineConfig {
            cache_sweep_every_ticks: 2,
            ..EngineConfig::default()
        };
        let engine = ActivationEngine::new(config, NodeRegistry::new(), sink.clone());

        engine.run_tick(&chain());
        engine.run_tick(&chain());
        assert!(sink
            .events()
            .iter()
            .any(|e| matches!(e, EngineEvent::CacheSwept { .. })));
    }

    #[test]
    fn test_remove_node_drops_state() {
        let (_, engine) = engine();
        let graph = chain();
        engine.evaluate_node(&graph, "mid", false).unwrap();
        assert_eq!(engine.cache().len(), 1);

        engine.mark_dirty("mid");
        assert!(!engine.cleanup_on_node_removal("mid"));
        assert!(engine.cache().is_empty());
        assert!(!engine.has_pending());
    }

    #[test]
    fn test_remove_node_queues_targets() {
        let (_, engine) = engine();
        let mut graph = chain();
        engine.mark_all_dirty();
        engine.run_tick(&graph).apply_to(&mut graph);
        engine.run_tick(&graph).apply_to(&mut graph);
        assert_eq!(graph.find_node("end").unwrap().data["isActive"], true);

        engine.mark_dirty("mid");
        assert!(!engine.remove_node(&graph, "mid"));
        graph.nodes.retain(|n| n.id != "mid");
        graph.connections.retain(|c| c.source != "mid" && c.target != "mid");

        let outcome = engine.run_tick(&graph);
        assert_eq!(outcome.reports.len(), 1);
        assert!(!outcome.report("end").unwrap().calculated_is_active);
        assert_eq!(outcome.patch("end").unwrap().fields["isActive"], false);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_flag_drives_oscillator() {
        let (_, engine) = engine();
        let mut graph = CanvasGraph::new();
        graph.nodes.push(NodeSnapshot::new(
            "osc",
            "cycle-pulse",
            json!({"cycleDuration": 100, "pulseDuration": 50, "infinite": true, "run": true}),
        ));

        engine.mark_dirty("osc");
        engine.run_tick(&graph);
        assert!(engine.oscillators().is_running("osc"));

        // Oscillator writes queue the node for the next tick
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(engine.has_pending());

        graph.nodes[0].data["run"] = json!(false);
        engine.mark_dirty("osc");
        engine.run_tick(&graph);
        assert!(!engine.oscillators().is_running("osc"));
    }
}
