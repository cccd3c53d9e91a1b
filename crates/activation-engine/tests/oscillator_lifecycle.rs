//! Oscillator lifecycle through `ActivationEngine`

use std::sync::Arc;
use std::time::Duration;

use activation_engine::{
    ActivationEngine, CanvasBuilder, CanvasGraph, EngineConfig, EngineEvent, NodeRegistry,
    OscillatorConfig, StopReason, VecEventSink,
};
use serde_json::json;
use tokio_test::{assert_err, assert_ok};

fn engine() -> (Arc<VecEventSink>, ActivationEngine) {
    let _ = env_logger::builder().is_test(true).try_init();
    let sink = Arc::new(VecEventSink::new());
    let engine = ActivationEngine::new(EngineConfig::default(), NodeRegistry::new(), sink.clone());
    (sink, engine)
}

fn pulses(sink: &VecEventSink, node_id: &str) -> Vec<u32> {
    sink.events_for(node_id)
        .iter()
        .filter_map(|e| match e {
            EngineEvent::PulseStarted { cycle_count, .. } => Some(*cycle_count),
            _ => None,
        })
        .collect()
}

/// Apply every oscillator write the sink has seen so far
fn replay_patches(sink: &VecEventSink, graph: &mut CanvasGraph) {
    for event in sink.events() {
        if let EngineEvent::NodeDataPatched { patch } = event {
            graph.apply_patch(&patch);
        }
    }
}

#[tokio::test(start_paused = true)]
async fn finite_oscillator_fires_exact_budget() {
    let (sink, engine) = engine();
    let config = OscillatorConfig::new(
        Duration::from_millis(100),
        Duration::from_millis(50),
        engine.config().progress_sample_interval(),
    )
    .with_max_cycles(2);

    assert_ok!(engine.start_oscillator_with("osc", config));
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(pulses(&sink, "osc"), vec![1, 2]);
    assert!(!engine.oscillators().is_running("osc"));
    let state = engine.oscillators().state("osc").unwrap();
    assert!(!state.is_on);
    assert_eq!(state.cycle_count, 2);
}

#[tokio::test(start_paused = true)]
async fn stop_mid_cycle_freezes_cycle_count() {
    let (sink, engine) = engine();
    assert_ok!(engine.start_oscillator("osc", 100, 50));

    tokio::time::sleep(Duration::from_millis(260)).await;
    let before = pulses(&sink, "osc");
    assert_eq!(before, vec![1, 2]);

    assert!(engine.stop_oscillator("osc"));
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(pulses(&sink, "osc"), before);
    assert_eq!(engine.oscillators().state("osc").unwrap().cycle_count, 2);
}

#[tokio::test(start_paused = true)]
async fn stop_twice_is_a_no_op() {
    let (sink, engine) = engine();
    assert_ok!(engine.start_oscillator("osc", 100, 50));

    assert!(engine.stop_oscillator("osc"));
    let events = sink.events().len();
    assert!(!engine.stop_oscillator("osc"));
    assert_eq!(sink.events().len(), events);
}

#[tokio::test(start_paused = true)]
async fn invalid_timings_are_rejected() {
    let (_, engine) = engine();
    assert_err!(engine.start_oscillator("osc", 0, 50));
    assert!(!engine.oscillators().is_running("osc"));
}

#[tokio::test(start_paused = true)]
async fn trigger_edge_starts_and_release_stops() {
    let (sink, engine) = engine();
    let mut graph = CanvasBuilder::new()
        .add_node("button", "manual-trigger")
        .with_data(json!({"triggered": false}))
        .add_node("osc", "cycle-pulse")
        .with_data(json!({"cycleDuration": 100, "pulseDuration": 50, "infinite": true}))
        .connect_trigger("button", "out", "osc")
        .build();

    engine.mark_all_dirty();
    engine.run_tick(&graph).apply_to(&mut graph);
    assert!(!engine.oscillators().is_running("osc"));

    graph.find_node_mut("button").unwrap().data["triggered"] = json!(true);
    engine.mark_changed(&graph, "button");
    engine.run_tick(&graph).apply_to(&mut graph);
    assert!(engine.oscillators().is_running("osc"));

    tokio::time::sleep(Duration::from_millis(120)).await;
    replay_patches(&sink, &mut graph);
    let osc = graph.find_node("osc").unwrap();
    assert_eq!(osc.data["isOn"], true);
    assert_eq!(osc.data["pulsing"], true);
    assert_eq!(osc.data["cycleCount"], 1);

    // The button's stored flag drops one tick after its trigger does
    graph.find_node_mut("button").unwrap().data["triggered"] = json!(false);
    engine.mark_changed(&graph, "button");
    let mut ticks = 0;
    while engine.has_pending() && ticks < 10 {
        engine.run_tick(&graph).apply_to(&mut graph);
        ticks += 1;
    }
    assert!(!engine.oscillators().is_running("osc"));
    assert!(sink.events_for("osc").iter().any(|e| matches!(
        e,
        EngineEvent::OscillatorStopped { reason: StopReason::InputReleased, .. }
    )));
}

#[tokio::test(start_paused = true)]
async fn removing_a_node_silences_its_timers() {
    let (sink, engine) = engine();
    assert_ok!(engine.start_oscillator("osc", 100, 50));
    tokio::time::sleep(Duration::from_millis(30)).await;

    assert!(engine.cleanup_on_node_removal("osc"));
    let events = sink.events().len();
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(sink.events().len(), events);
    assert!(engine.oscillators().state("osc").is_none());
}

#[tokio::test(start_paused = true)]
async fn oscillator_head_activation_follows_pulse() {
    let (sink, engine) = engine();
    let mut graph = CanvasBuilder::new()
        .add_node("osc", "cycle-pulse")
        .with_data(json!({"cycleDuration": 100, "pulseDuration": 50, "infinite": true}))
        .build();

    assert_ok!(engine.start_oscillator("osc", 100, 50));

    // Waiting phase
    tokio::time::sleep(Duration::from_millis(60)).await;
    replay_patches(&sink, &mut graph);
    assert!(!assert_ok!(engine.evaluate_node(&graph, "osc", true)).calculated_is_active);

    // Pulsing phase
    tokio::time::sleep(Duration::from_millis(60)).await;
    replay_patches(&sink, &mut graph);
    assert!(assert_ok!(engine.evaluate_node(&graph, "osc", true)).calculated_is_active);
}

#[tokio::test(start_paused = true)]
async fn evaluation_fault_stops_running_oscillator() {
    let (sink, engine) = engine();
    let mut graph = CanvasBuilder::new()
        .add_node("osc", "cycle-pulse")
        .with_data(json!({"cycleDuration": 100, "pulseDuration": 50, "infinite": true}))
        .build();

    assert_ok!(engine.start_oscillator("osc", 100, 50));
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(engine.oscillators().is_running("osc"));

    graph.find_node_mut("osc").unwrap().data = json!(["not", "an", "object"]);
    engine.mark_dirty("osc");
    let outcome = engine.run_tick(&graph);
    assert!(!outcome.report("osc").unwrap().calculated_is_active);

    assert!(!engine.oscillators().is_running("osc"));
    let events = sink.events_for("osc");
    assert!(events.iter().any(|e| matches!(
        e,
        EngineEvent::OscillatorStopped { reason: StopReason::Fault, .. }
    )));
    assert!(events
        .iter()
        .any(|e| matches!(e, EngineEvent::EvaluationFault { .. })));

    // No late ticks from the faulted run
    let seen = sink.events().len();
    tokio::time::sleep(Duration::from_secs(1)).await;
    let late = sink.events()[seen..]
        .iter()
        .filter(|e| {
            matches!(
                e,
                EngineEvent::PulseStarted { .. } | EngineEvent::OscillatorProgress { .. }
            )
        })
        .count();
    assert_eq!(late, 0);
}
