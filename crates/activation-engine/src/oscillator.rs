//! Cycle/pulse oscillator state machine
//!
//! Timed nodes alternate between a waiting phase, during which progress
//! is sampled towards `cycle_duration`, and a pulsing phase that lasts
//! `pulse_duration` and marks the node's on sub-phase.
//!
//! ```text
//! Idle -> Waiting -> Pulsing -> Waiting ... -> Idle
//! ```
//!
//! Every running node owns one tokio task. The `OscillatorArena` owns
//! those tasks keyed by node id; it is an explicit value the engine holds,
//! not a module-level registry. Each run carries a token, and a task only
//! publishes while its token is still the arena's current one for that
//! node. Stopping removes the token and aborts the task under the same
//! lock, so a cancelled run can never emit a late tick.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use uuid::Uuid;

use crate::error::{ActivationError, Result};
use crate::events::{emit, EngineEvent, EventSink, StopReason};
use crate::types::{NodeId, NodePatch};

/// Default waiting duration when node data does not specify one
pub const DEFAULT_CYCLE_MS: u64 = 1000;
/// Default pulse duration when node data does not specify one
pub const DEFAULT_PULSE_MS: u64 = 200;

/// Timing for one oscillator run
#[derive(Debug, Clone, PartialEq)]
pub struct OscillatorConfig {
    /// Length of the waiting phase
    pub cycle_duration: Duration,
    /// Length of the pulsing phase
    pub pulse_duration: Duration,
    /// Pulses before returning to idle (ignored when infinite)
    pub max_cycles: u32,
    /// Run until stopped
    pub infinite: bool,
    /// Progress sampling interval during the waiting phase
    pub sample_interval: Duration,
}

/// Oscillator settings as stored in node data
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct OscillatorSettings {
    cycle_duration: u64,
    pulse_duration: u64,
    max_cycles: u32,
    infinite: bool,
}

impl Default for OscillatorSettings {
    fn default() -> Self {
        Self {
            cycle_duration: DEFAULT_CYCLE_MS,
            pulse_duration: DEFAULT_PULSE_MS,
            max_cycles: 1,
            infinite: false,
        }
    }
}

impl OscillatorConfig {
    /// An unbounded oscillator
    pub fn new(
        cycle_duration: Duration,
        pulse_duration: Duration,
        sample_interval: Duration,
    ) -> Self {
        Self {
            cycle_duration,
            pulse_duration,
            max_cycles: 1,
            infinite: true,
            sample_interval,
        }
    }

    /// Stop after `max_cycles` pulses
    pub fn with_max_cycles(mut self, max_cycles: u32) -> Self {
        self.max_cycles = max_cycles;
        self.infinite = false;
        self
    }

    /// Read settings from node data (`cycleDuration`, `pulseDuration` in ms,
    /// `maxCycles`, `infinite`)
    pub fn from_node_data(
        node_id: &str,
        data: &serde_json::Value,
        sample_interval: Duration,
    ) -> Result<Self> {
        let settings: OscillatorSettings = if data.is_null() {
            OscillatorSettings::default()
        } else {
            serde_json::from_value(data.clone())
                .map_err(|e| ActivationError::invalid_oscillator(node_id, e.to_string()))?
        };

        let config = Self {
            cycle_duration: Duration::from_millis(settings.cycle_duration),
            pulse_duration: Duration::from_millis(settings.pulse_duration),
            max_cycles: settings.max_cycles,
            infinite: settings.infinite,
            sample_interval,
        };
        config.validate(node_id)?;
        Ok(config)
    }

    /// Check that the timing can drive a finite, non-spinning timer chain
    pub fn validate(&self, node_id: &str) -> Result<()> {
        let problem = if self.cycle_duration.is_zero() {
            "cycle duration must be positive"
        } else if self.pulse_duration.is_zero() {
            "pulse duration must be positive"
        } else if self.sample_interval.is_zero() {
            "sample interval must be positive"
        } else if !self.infinite && self.max_cycles == 0 {
            "max cycles must be at least 1"
        } else {
            return Ok(());
        };
        Err(ActivationError::invalid_oscillator(node_id, problem))
    }

    fn exhausted(&self, cycle_count: u32) -> bool {
        !self.infinite && cycle_count >= self.max_cycles
    }
}

/// Oscillator phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OscillatorPhase {
    Idle,
    Waiting,
    Pulsing,
}

/// Published oscillator state
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OscillatorState {
    pub phase: OscillatorPhase,
    pub is_on: bool,
    pub pulsing: bool,
    pub triggered: bool,
    /// Waiting progress in 0..=1, five decimal places
    pub progress: f64,
    pub cycle_count: u32,
}

impl OscillatorState {
    pub fn idle(cycle_count: u32) -> Self {
        Self {
            phase: OscillatorPhase::Idle,
            is_on: false,
            pulsing: false,
            triggered: false,
            progress: 0.0,
            cycle_count,
        }
    }

    pub fn waiting(progress: f64, cycle_count: u32) -> Self {
        Self {
            phase: OscillatorPhase::Waiting,
            is_on: true,
            pulsing: false,
            triggered: false,
            progress: round_progress(progress),
            cycle_count,
        }
    }

    pub fn pulsing(cycle_count: u32) -> Self {
        Self {
            phase: OscillatorPhase::Pulsing,
            is_on: true,
            pulsing: true,
            triggered: true,
            progress: 1.0,
            cycle_count,
        }
    }

    /// Node data fields for this state
    ///
    /// `phase` is written as a boolean: true while in the on sub-phase.
    pub fn to_patch(&self, node_id: &str) -> NodePatch {
        NodePatch::new(node_id)
            .set("isOn", self.is_on)
            .set("phase", self.phase == OscillatorPhase::Pulsing)
            .set("pulsing", self.pulsing)
            .set("triggered", self.triggered)
            .set("progress", self.progress)
            .set("cycleCount", self.cycle_count)
    }
}

/// Round progress to five decimal places and clamp into 0..=1
pub fn round_progress(progress: f64) -> f64 {
    let clamped = progress.clamp(0.0, 1.0);
    (clamped * 100_000.0).round() / 100_000.0
}

/// Result of feeding start/stop signals to the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputOutcome {
    Started(Uuid),
    Stopped,
    Unchanged,
}

struct Run {
    run_id: Uuid,
    task: Option<JoinHandle<()>>,
}

/// Last observed start signals for a node
#[derive(Debug, Clone, Copy, Default)]
struct InputLatch {
    trigger: bool,
    run_flag: bool,
}

#[derive(Default)]
struct ArenaState {
    runs: HashMap<NodeId, Run>,
    states: HashMap<NodeId, OscillatorState>,
    latches: HashMap<NodeId, InputLatch>,
}

struct Shared {
    state: Mutex<ArenaState>,
    sink: Arc<dyn EventSink>,
}

impl Shared {
    /// Publish on behalf of a run; a no-op once the run is no longer current
    fn publish(
        &self,
        node_id: &str,
        run_id: Uuid,
        state: OscillatorState,
        events: Vec<EngineEvent>,
    ) -> bool {
        {
            let mut arena = self.state.lock();
            let current = arena.runs.get(node_id).map(|r| r.run_id);
            if current != Some(run_id) {
                log::trace!("Oscillator {}: ignoring tick from retired run {}", node_id, run_id);
                return false;
            }
            arena.states.insert(node_id.to_string(), state);
        }
        self.dispatch(with_state(node_id, &state, events));
        true
    }

    /// Retire a run that reached its cycle budget
    fn complete(&self, node_id: &str, run_id: Uuid, cycle_count: u32) {
        let idle = OscillatorState::idle(cycle_count);
        {
            let mut arena = self.state.lock();
            if arena.runs.get(node_id).map(|r| r.run_id) != Some(run_id) {
                return;
            }
            arena.runs.remove(node_id);
            arena.states.insert(node_id.to_string(), idle);
        }
        self.dispatch(with_state(
            node_id,
            &idle,
            vec![
                EngineEvent::PulseEnded {
                    node_id: node_id.to_string(),
                    cycle_count,
                },
                EngineEvent::OscillatorStopped {
                    node_id: node_id.to_string(),
                    reason: StopReason::Completed,
                    cycle_count,
                },
            ],
        ));
        log::debug!("Oscillator {}: completed after {} cycles", node_id, cycle_count);
    }

    /// Send events to the sink; never called with the arena locked
    fn dispatch(&self, events: Vec<EngineEvent>) {
        for event in events {
            emit(self.sink.as_ref(), event);
        }
    }
}

/// `events` followed by the node data write for `state`
fn with_state(
    node_id: &str,
    state: &OscillatorState,
    mut events: Vec<EngineEvent>,
) -> Vec<EngineEvent> {
    events.push(EngineEvent::patched(state.to_patch(node_id)));
    events
}

/// Retire a node's run under the arena lock, returning the events to send
fn stop_locked(
    arena: &mut ArenaState,
    node_id: &str,
    reason: StopReason,
) -> Option<Vec<EngineEvent>> {
    let run = arena.runs.remove(node_id)?;
    if let Some(task) = run.task {
        task.abort();
    }

    let cycle_count = arena.states.get(node_id).map(|s| s.cycle_count).unwrap_or(0);
    let idle = OscillatorState::idle(cycle_count);
    arena.states.insert(node_id.to_string(), idle);
    log::debug!("Oscillator {}: stopped ({:?})", node_id, reason);
    Some(with_state(
        node_id,
        &idle,
        vec![EngineEvent::OscillatorStopped {
            node_id: node_id.to_string(),
            reason,
            cycle_count,
        }],
    ))
}

/// Owner of every running oscillator, keyed by node id
pub struct OscillatorArena {
    shared: Arc<Shared>,
}

impl OscillatorArena {
    /// Create an arena publishing to `sink`
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(ArenaState::default()),
                sink,
            }),
        }
    }

    /// Start an oscillator, stopping any run already active for the node
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, node_id: &str, config: OscillatorConfig) -> Result<Uuid> {
        config.validate(node_id)?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| ActivationError::NoRuntime(node_id.to_string()))?;

        let run_id = Uuid::new_v4();
        let mut events = {
            let mut arena = self.shared.state.lock();
            let events =
                stop_locked(&mut arena, node_id, StopReason::Restarted).unwrap_or_default();
            arena.runs.insert(node_id.to_string(), Run { run_id, task: None });
            // The task cannot publish before the lock is released
            let task = runtime.spawn(run_oscillator(
                Arc::clone(&self.shared),
                node_id.to_string(),
                run_id,
                config,
            ));
            if let Some(run) = arena.runs.get_mut(node_id) {
                run.task = Some(task);
            }
            events
        };

        events.push(EngineEvent::OscillatorStarted {
            node_id: node_id.to_string(),
            run_id: run_id.to_string(),
        });
        self.shared.dispatch(events);
        log::debug!("Oscillator {}: started run {}", node_id, run_id);
        Ok(run_id)
    }

    /// Stop a node's oscillator; returns false if it was not running
    pub fn stop(&self, node_id: &str) -> bool {
        self.stop_with(node_id, StopReason::Manual)
    }

    /// Stop with an explicit reason
    pub fn stop_with(&self, node_id: &str, reason: StopReason) -> bool {
        let stopped = stop_locked(&mut self.shared.state.lock(), node_id, reason);
        match stopped {
            Some(events) => {
                self.shared.dispatch(events);
                true
            }
            None => false,
        }
    }

    /// Stop every running oscillator
    pub fn stop_all(&self) -> usize {
        let batches: Vec<Vec<EngineEvent>> = {
            let mut arena = self.shared.state.lock();
            let ids: Vec<NodeId> = arena.runs.keys().cloned().collect();
            ids.iter()
                .filter_map(|id| stop_locked(&mut arena, id, StopReason::Manual))
                .collect()
        };
        let stopped = batches.len();
        for events in batches {
            self.shared.dispatch(events);
        }
        stopped
    }

    /// Hook for node deletion: stop the oscillator and forget the node
    pub fn cleanup_on_node_removal(&self, node_id: &str) -> bool {
        let stopped = {
            let mut arena = self.shared.state.lock();
            let stopped = stop_locked(&mut arena, node_id, StopReason::NodeRemoved);
            arena.states.remove(node_id);
            arena.latches.remove(node_id);
            stopped
        };
        match stopped {
            Some(events) => {
                self.shared.dispatch(events);
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self, node_id: &str) -> bool {
        self.shared.state.lock().runs.contains_key(node_id)
    }

    /// Last published state; idle nodes that never ran return None
    pub fn state(&self, node_id: &str) -> Option<OscillatorState> {
        self.shared.state.lock().states.get(node_id).copied()
    }

    pub fn running_count(&self) -> usize {
        self.shared.state.lock().runs.len()
    }

    /// Feed the node's current start signals
    ///
    /// A false to true edge on the trigger input or the run flag starts an
    /// idle oscillator; a true to false edge stops a running one.
    pub fn observe_inputs(
        &self,
        node_id: &str,
        config: &OscillatorConfig,
        trigger_active: bool,
        run_flag: bool,
    ) -> Result<InputOutcome> {
        let (rising, falling) = {
            let mut arena = self.shared.state.lock();
            let latch = arena.latches.entry(node_id.to_string()).or_default();
            let rising = (trigger_active && !latch.trigger) || (run_flag && !latch.run_flag);
            let falling = (!trigger_active && latch.trigger) || (!run_flag && latch.run_flag);
            *latch = InputLatch {
                trigger: trigger_active,
                run_flag,
            };
            (rising, falling)
        };

        let running = self.is_running(node_id);
        if rising && !running {
            return self.start(node_id, config.clone()).map(InputOutcome::Started);
        }
        if falling && running && !trigger_active && !run_flag {
            self.stop_with(node_id, StopReason::InputReleased);
            return Ok(InputOutcome::Stopped);
        }
        Ok(InputOutcome::Unchanged)
    }
}

impl Drop for OscillatorArena {
    fn drop(&mut self) {
        let mut arena = self.shared.state.lock();
        for (_, run) in arena.runs.drain() {
            if let Some(task) = run.task {
                task.abort();
            }
        }
    }
}

/// Drive one run until it completes or is aborted
async fn run_oscillator(
    shared: Arc<Shared>,
    node_id: NodeId,
    run_id: Uuid,
    config: OscillatorConfig,
) {
    let mut cycle_count: u32 = 0;

    loop {
        let mut entering = Vec::new();
        if cycle_count > 0 {
            entering.push(EngineEvent::PulseEnded {
                node_id: node_id.clone(),
                cycle_count,
            });
        }
        if !shared.publish(&node_id, run_id, OscillatorState::waiting(0.0, cycle_count), entering) {
            return;
        }

        let started = Instant::now();
        let deadline = tokio::time::sleep(config.cycle_duration);
        tokio::pin!(deadline);
        let mut sampler =
            tokio::time::interval_at(started + config.sample_interval, config.sample_interval);
        sampler.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = &mut deadline => break,
                _ = sampler.tick() => {
                    let progress =
                        started.elapsed().as_secs_f64() / config.cycle_duration.as_secs_f64();
                    let state = OscillatorState::waiting(progress, cycle_count);
                    let event = EngineEvent::OscillatorProgress {
                        node_id: node_id.clone(),
                        progress: state.progress,
                    };
                    if !shared.publish(&node_id, run_id, state, vec![event]) {
                        return;
                    }
                }
            }
        }

        cycle_count += 1;
        let pulse = EngineEvent::PulseStarted {
            node_id: node_id.clone(),
            cycle_count,
        };
        if !shared.publish(&node_id, run_id, OscillatorState::pulsing(cycle_count), vec![pulse]) {
            return;
        }

        tokio::time::sleep(config.pulse_duration).await;

        if config.exhausted(cycle_count) {
            shared.complete(&node_id, run_id, cycle_count);
            return;
        }
    }
}
