//! Control nodes
//!
//! Timed nodes that drive the rest of the canvas.

mod cycle_pulse;

pub use cycle_pulse::CyclePulseNode;
