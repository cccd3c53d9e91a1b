//! End-to-end activation behavior through `ActivationEngine`

use std::sync::Arc;

use activation_engine::{
    is_head_node, ActivationCache, ActivationEngine, ActivationSource, CanvasBuilder, CanvasGraph,
    Connection, EngineConfig, EngineEvent, NodeRegistry, NodeSnapshot, VecEventSink,
};
use serde_json::json;
use tokio_test::assert_ok;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn engine() -> (Arc<VecEventSink>, ActivationEngine) {
    init_logging();
    let sink = Arc::new(VecEventSink::new());
    let engine = ActivationEngine::new(EngineConfig::default(), NodeRegistry::new(), sink.clone());
    (sink, engine)
}

fn is_active(engine: &ActivationEngine, graph: &CanvasGraph, node_id: &str, bypass: bool) -> bool {
    assert_ok!(engine.evaluate_node(graph, node_id, bypass)).calculated_is_active
}

/// Run ticks until nothing is pending, applying every patch
fn settle(engine: &ActivationEngine, graph: &mut CanvasGraph) -> usize {
    let mut ticks = 0;
    while engine.has_pending() {
        engine.run_tick(graph).apply_to(graph);
        ticks += 1;
        assert!(ticks < 50, "graph did not settle");
    }
    ticks
}

#[test]
fn head_classification_ignores_auxiliary_inputs() {
    let config = EngineConfig::default();
    let mut connections: Vec<Connection> = Vec::new();
    assert!(is_head_node(&connections, "n", &config));

    connections.push(Connection::new("g", "output", "n", "json"));
    assert!(is_head_node(&connections, "n", &config));

    connections.push(Connection::new("a", "text", "n", "input"));
    assert!(!is_head_node(&connections, "n", &config));
}

#[test]
fn content_head_activation_boundaries() {
    let (_, engine) = engine();
    let graph = CanvasBuilder::new()
        .add_node("hello", "text-input")
        .with_data(json!({"text": "hello"}))
        .add_node("empty", "text-input")
        .with_data(json!({"text": ""}))
        .add_node("zero", "text-input")
        .with_data(json!({"value": 0}))
        .build();

    assert!(is_active(&engine, &graph, "hello", true));
    assert!(!is_active(&engine, &graph, "empty", true));
    // Zero is defined, non-null and not an empty string
    assert!(is_active(&engine, &graph, "zero", true));

    let report = assert_ok!(engine.evaluate_node(&graph, "hello", true));
    assert!(report.is_head_node);
    assert_eq!(report.activation_source, ActivationSource::Head);
}

#[test]
fn trigger_gating_holds_until_trigger_fires() {
    let (_, engine) = engine();
    let mut graph = CanvasBuilder::new()
        .add_node("src", "text-input")
        .with_data(json!({"text": "data", "isActive": true}))
        .add_node("gate", "manual-trigger")
        .with_data(json!({"triggered": false}))
        .add_node("sink", "text-display")
        .connect("src", "text", "sink", "input")
        .connect_trigger("gate", "out", "sink")
        .build();

    assert!(!is_active(&engine, &graph, "sink", true));

    graph.find_node_mut("gate").unwrap().data["triggered"] = json!(true);
    assert!(is_active(&engine, &graph, "sink", true));
}

#[test]
fn cached_true_never_outlives_its_upstream() {
    let (_, engine) = engine();
    let mut graph = CanvasBuilder::new()
        .add_node("src", "text-input")
        .with_data(json!({"text": "on"}))
        .add_node("sink", "text-display")
        .connect("src", "text", "sink", "input")
        .build();

    assert!(is_active(&engine, &graph, "sink", false));
    assert!(is_active(&engine, &graph, "sink", false));

    graph.find_node_mut("src").unwrap().data["text"] = json!("");
    assert!(!is_active(&engine, &graph, "sink", false));
}

#[test]
fn stale_cache_entry_is_bypassed() {
    init_logging();
    let config = EngineConfig::default();
    let cache = Arc::new(ActivationCache::new(&config));
    let engine = ActivationEngine::with_cache(
        config,
        NodeRegistry::new(),
        cache.clone(),
        Arc::new(VecEventSink::new()),
    );

    let graph = CanvasBuilder::new()
        .add_node("src", "text-input")
        .with_data(json!({"text": ""}))
        .add_node("sink", "text-display")
        .connect("src", "text", "sink", "input")
        .build();

    // A wrong positive left under the key the sink evaluates against
    let sink_node = graph.find_node("sink").unwrap();
    let inputs: Vec<&Connection> = graph.connections.iter().collect();
    let sources: Vec<&NodeSnapshot> = graph.nodes.iter().filter(|n| n.id == "src").collect();
    let key =
        ActivationCache::downstream_key("sink", "text-display", &sink_node.data, &inputs, &sources);
    cache.set(&key, true);

    assert!(!is_active(&engine, &graph, "sink", false));
    assert_eq!(cache.get(&key).map(|e| e.result), Some(false));
    assert_eq!(cache.stats().bypasses, 1);
}

#[test]
fn error_channel_is_independent_of_activation() {
    let (sink, engine) = engine();
    let mut graph = CanvasBuilder::new()
        .add_node("src", "text-input")
        .with_data(json!({"text": "value"}))
        .add_node("gen", "error-generator")
        .with_data(json!({"output": {"isErrorState": false}}))
        .add_node("view", "view-output")
        .with_data(json!({"displayedValues": [{"source": "src", "content": "value"}]}))
        .connect("src", "text", "view", "value")
        .connect_auxiliary("gen", "output", "view")
        .build();

    engine.mark_all_dirty();
    settle(&engine, &mut graph);
    let view = graph.find_node("view").unwrap();
    assert_eq!(view.data["isActive"], true);
    assert!(view.data.get("isErrorState").is_none());

    graph.find_node_mut("gen").unwrap().data =
        json!({"output": {"isErrorState": true, "error": "upstream failed"}});
    engine.mark_changed(&graph, "gen");
    settle(&engine, &mut graph);
    let view = graph.find_node("view").unwrap();
    assert_eq!(view.data["isActive"], true);
    assert_eq!(view.data["isErrorState"], true);
    assert_eq!(view.data["errorType"], "error");
    assert_eq!(view.data["error"], "upstream failed");

    graph.find_node_mut("gen").unwrap().data = json!({"output": {"isErrorState": false}});
    engine.mark_changed(&graph, "gen");
    settle(&engine, &mut graph);
    let view = graph.find_node("view").unwrap();
    assert_eq!(view.data["isActive"], true);
    assert_eq!(view.data["isErrorState"], false);
    assert!(view.data["error"].is_null());

    let kinds: Vec<&str> = sink
        .events_for("view")
        .iter()
        .filter_map(|e| match e {
            EngineEvent::ErrorInjected { .. } => Some("injected"),
            EngineEvent::ErrorCleared { .. } => Some("cleared"),
            _ => None,
        })
        .collect();
    assert_eq!(kinds, vec!["injected", "cleared"]);
}

#[test]
fn feedback_loops_settle() {
    let (_, engine) = engine();
    let mut graph = CanvasBuilder::new()
        .add_node("seed", "text-input")
        .with_data(json!({"text": "x"}))
        .add_node("a", "text-display")
        .add_node("b", "text-display")
        .connect("seed", "text", "a", "input")
        .connect("a", "out", "b", "input")
        .connect("b", "out", "a", "loop")
        .build();

    engine.mark_all_dirty();
    settle(&engine, &mut graph);
    assert_eq!(graph.find_node("a").unwrap().data["isActive"], true);
    assert_eq!(graph.find_node("b").unwrap().data["isActive"], true);

    // Removing the seed leaves a loop that keeps itself alive on stored flags
    graph.find_node_mut("seed").unwrap().data["text"] = json!("");
    engine.mark_changed(&graph, "seed");
    settle(&engine, &mut graph);
    assert_eq!(graph.find_node("seed").unwrap().data["isActive"], false);
    assert_eq!(graph.find_node("a").unwrap().data["isActive"], true);
}

#[test]
fn malformed_node_is_contained() {
    let (sink, engine) = engine();
    let mut graph = CanvasBuilder::new()
        .add_node("src", "text-input")
        .with_data(json!({"text": "ok"}))
        .add_node("broken", "view-output")
        .with_data(json!({"displayedValues": {"not": "an array"}}))
        .add_node("fine", "text-display")
        .connect("src", "text", "broken", "value")
        .connect("src", "text", "fine", "input")
        .build();

    engine.mark_all_dirty();
    let outcome = engine.run_tick(&graph);
    outcome.apply_to(&mut graph);

    assert_eq!(outcome.reports.len(), 3);
    assert!(!outcome.report("broken").unwrap().calculated_is_active);
    assert!(outcome.report("fine").unwrap().calculated_is_active);
    assert!(sink
        .events_for("broken")
        .iter()
        .any(|e| matches!(e, EngineEvent::EvaluationFault { .. })));
}

#[test]
fn restored_error_state_clears_on_fresh_engine() {
    let (sink, engine) = engine();
    let mut graph = CanvasBuilder::new()
        .add_node("gen", "error-generator")
        .with_data(json!({"output": {"isErrorState": false}}))
        .add_node("view", "view-output")
        .with_data(json!({"isErrorState": true, "errorType": "error", "error": "boom"}))
        .connect_auxiliary("gen", "output", "view")
        .build();

    engine.mark_all_dirty();
    settle(&engine, &mut graph);
    let view = graph.find_node("view").unwrap();
    assert_eq!(view.data["isErrorState"], false);
    assert!(view.data["error"].is_null());
    assert!(sink
        .events_for("view")
        .iter()
        .any(|e| matches!(e, EngineEvent::ErrorCleared { .. })));

    // Same again with the auxiliary connection already gone
    let (_, restarted) = self::engine();
    graph.find_node_mut("view").unwrap().data =
        json!({"isErrorState": true, "error": "boom", "errorSource": "auxiliary"});
    graph.connections.clear();
    restarted.mark_all_dirty();
    settle(&restarted, &mut graph);
    assert_eq!(graph.find_node("view").unwrap().data["isErrorState"], false);
}

#[test]
fn removing_error_source_clears_consumer() {
    let (_, engine) = engine();
    let mut graph = CanvasBuilder::new()
        .add_node("gen", "error-generator")
        .with_data(json!({"output": {"isErrorState": true, "error": "upstream failed"}}))
        .add_node("view", "view-output")
        .connect_auxiliary("gen", "output", "view")
        .build();

    engine.mark_all_dirty();
    settle(&engine, &mut graph);
    assert_eq!(graph.find_node("view").unwrap().data["isErrorState"], true);

    engine.remove_node(&graph, "gen");
    graph.nodes.retain(|n| n.id != "gen");
    graph.connections.clear();
    assert!(engine.has_pending());
    settle(&engine, &mut graph);

    let view = graph.find_node("view").unwrap();
    assert_eq!(view.data["isErrorState"], false);
    assert!(engine.errors().observed("view").is_none());
}
