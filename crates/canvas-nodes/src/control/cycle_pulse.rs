//! Cycle Pulse Node
//!
//! An oscillator. Once started (by the user, a trigger input going high,
//! or its `run` flag being set) it waits `cycleDuration` ms, pulses for
//! `pulseDuration` ms, and repeats until `maxCycles` pulses have fired or
//! forever when `infinite` is set. The engine's oscillator arena writes
//! `isOn`, `phase`, `pulsing`, `triggered`, `progress` and `cycleCount`
//! back into the node's data.

use activation_engine::oscillator::{DEFAULT_CYCLE_MS, DEFAULT_PULSE_MS};
use activation_engine::{DescribesNode, NodeDescriptor, NodeKind, PortDataType, PortDefinition};
use serde_json::{json, Value};

/// Cycle Pulse Node
///
/// # Inputs
/// - `trigger` - starts the oscillator on a rising edge
///
/// # Outputs
/// - `pulse` - high during each pulse
pub struct CyclePulseNode;

impl CyclePulseNode {
    /// Port ID for the start trigger
    pub const PORT_TRIGGER: &'static str = "trigger";
    /// Port ID for the pulse output
    pub const PORT_PULSE: &'static str = "pulse";

    /// Data for a freshly placed node
    pub fn initial_data() -> Value {
        json!({
            "cycleDuration": DEFAULT_CYCLE_MS,
            "pulseDuration": DEFAULT_PULSE_MS,
            "maxCycles": 1,
            "infinite": false,
            "run": false,
            "isOn": false,
            "pulsing": false,
            "triggered": false,
            "progress": 0.0,
            "cycleCount": 0,
        })
    }
}

impl DescribesNode for CyclePulseNode {
    fn descriptor() -> NodeDescriptor {
        NodeDescriptor::new("cycle-pulse", NodeKind::Cyclic, "Cycle Pulse")
            .with_description("Emits a timed pulse on a fixed cycle")
            .with_input(PortDefinition::input(Self::PORT_TRIGGER, "Start", PortDataType::Boolean))
            .with_output(PortDefinition::output(Self::PORT_PULSE, "Pulse", PortDataType::Boolean))
    }
}

inventory::submit!(activation_engine::DescriptorFn(CyclePulseNode::descriptor));
