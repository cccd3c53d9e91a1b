//! Configuration for the activation engine
//!
//! Reserved port ids, category patterns and timing knobs. Hosts usually
//! load this once at startup (it deserializes from camelCase JSON) and
//! hand it to [`ActivationEngine::new`](crate::ActivationEngine::new).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Default values used when a field is absent from the config
pub mod defaults {
    /// Target handle of trigger (boolean gating) connections
    pub const TRIGGER_HANDLE: &str = "trigger";
    /// Target handle of auxiliary (JSON / error channel) connections
    pub const AUXILIARY_HANDLE: &str = "json";
    /// Substring identifying trigger node types
    pub const TRIGGER_PATTERN: &str = "trigger";
    /// Substring identifying cyclic (oscillator) node types
    pub const CYCLE_PATTERN: &str = "cycle";
    /// Type tag of the aggregator/sink node
    pub const VIEW_OUTPUT_TYPE: &str = "view-output";
    /// Type tag of the structured-input test node
    pub const JSON_TEST_TYPE: &str = "json-test";
    /// Substrings identifying transformation node types
    pub const TRANSFORM_PATTERNS: &[&str] = &[
        "transform", "convert", "parse", "format", "filter", "extract", "split", "merge",
    ];
    /// Node types that surface injected errors
    pub const ERROR_INJECTION_TYPES: &[&str] = &["view-output", "json-test", "text-display"];
    /// Oscillator progress sampling interval
    pub const PROGRESS_SAMPLE_MS: u64 = 50;
    /// Upper bound on cached activation results
    pub const CACHE_MAX_ENTRIES: usize = 4096;
    /// Cache entries untouched for this long are swept
    pub const CACHE_STALE_AFTER_MS: u64 = 60_000;
    /// Ticks between automatic cache sweeps
    pub const CACHE_SWEEP_EVERY_TICKS: u64 = 256;
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Target port id that marks a connection as a trigger connection
    pub trigger_handle: String,
    /// Target port id that marks a connection as auxiliary
    pub auxiliary_handle: String,
    /// Node types containing this substring resolve to the trigger category
    pub trigger_pattern: String,
    /// Node types containing this substring resolve to the cyclic category
    pub cycle_pattern: String,
    /// Node types containing any of these substrings are transformations
    pub transform_patterns: Vec<String>,
    /// Exact type tag of the aggregator/sink node
    pub view_output_type: String,
    /// Exact type tag of the JSON test node
    pub json_test_type: String,
    /// Node types that accept injected errors over the auxiliary channel
    pub error_injection_types: Vec<String>,
    /// Oscillator progress sampling interval in milliseconds
    pub progress_sample_ms: u64,
    /// Maximum number of cached activation results
    pub cache_max_entries: usize,
    /// Age in milliseconds after which an untouched cache entry is swept
    pub cache_stale_after_ms: u64,
    /// Run a cache sweep every this many ticks (0 disables automatic sweeps)
    pub cache_sweep_every_ticks: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            trigger_handle: defaults::TRIGGER_HANDLE.to_string(),
            auxiliary_handle: defaults::AUXILIARY_HANDLE.to_string(),
            trigger_pattern: defaults::TRIGGER_PATTERN.to_string(),
            cycle_pattern: defaults::CYCLE_PATTERN.to_string(),
            transform_patterns: defaults::TRANSFORM_PATTERNS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            view_output_type: defaults::VIEW_OUTPUT_TYPE.to_string(),
            json_test_type: defaults::JSON_TEST_TYPE.to_string(),
            error_injection_types: defaults::ERROR_INJECTION_TYPES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            progress_sample_ms: defaults::PROGRESS_SAMPLE_MS,
            cache_max_entries: defaults::CACHE_MAX_ENTRIES,
            cache_stale_after_ms: defaults::CACHE_STALE_AFTER_MS,
            cache_sweep_every_ticks: defaults::CACHE_SWEEP_EVERY_TICKS,
        }
    }
}

impl EngineConfig {
    /// Parse a config from camelCase JSON; missing fields take defaults
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Progress sampling interval as a Duration (never zero)
    pub fn progress_sample_interval(&self) -> Duration {
        Duration::from_millis(self.progress_sample_ms.max(1))
    }

    /// Staleness threshold for cache sweeps
    pub fn cache_stale_after(&self) -> Duration {
        Duration::from_millis(self.cache_stale_after_ms)
    }

    /// Whether a node type surfaces injected errors
    pub fn accepts_error_injection(&self, node_type: &str) -> bool {
        self.error_injection_types.iter().any(|t| t == node_type)
    }
}
