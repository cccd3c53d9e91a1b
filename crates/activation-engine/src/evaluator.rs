//! Activation evaluator
//!
//! Decides whether a node currently has meaningful, propagatable output.
//! Head nodes are judged on their own data by category; downstream nodes
//! need an active upstream source, pass trigger gating, and then meet
//! their category's own requirement.
//!
//! Evaluation reads a read-only snapshot of the neighbors' data and never
//! re-evaluates a neighbor, so feedback loops cannot recurse.

use serde_json::Value;

use crate::cache::ActivationCache;
use crate::classifier::{is_head_node, ActivationSource};
use crate::config::EngineConfig;
use crate::connections::{non_auxiliary_input_connections, trigger_connections};
use crate::error::{ActivationError, Result};
use crate::events::StopReason;
use crate::oscillator::OscillatorArena;
use crate::registry::NodeRegistry;
use crate::truthy::{
    flag, has_meaningful_output, is_meaningful, is_meaningful_content, UPSTREAM_VALUE_FIELDS,
};
use crate::types::{Connection, NodeKind, NodeSnapshot};

/// Outcome of one node evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub is_active: bool,
    pub source: ActivationSource,
    /// Served from the cache without recomputing
    pub from_cache: bool,
    /// A cached `true` was discarded by the fast-deactivation re-check
    pub bypassed: bool,
}

/// Whether a node, seen as an upstream source, is producing
pub fn is_source_active(data: &Value) -> bool {
    flag(data, "isActive")
        || flag(data, "triggered")
        || UPSTREAM_VALUE_FIELDS.iter().any(|key| is_meaningful(data.get(*key)))
}

/// Rules engine computing per-node activation
pub struct ActivationEvaluator<'a> {
    config: &'a EngineConfig,
    registry: &'a NodeRegistry,
    cache: &'a ActivationCache,
    oscillators: Option<&'a OscillatorArena>,
}

impl<'a> ActivationEvaluator<'a> {
    pub fn new(
        config: &'a EngineConfig,
        registry: &'a NodeRegistry,
        cache: &'a ActivationCache,
    ) -> Self {
        Self {
            config,
            registry,
            cache,
            oscillators: None,
        }
    }

    /// Tear down this arena's oscillator when a node's evaluation fails
    pub fn with_oscillators(mut self, oscillators: &'a OscillatorArena) -> Self {
        self.oscillators = Some(oscillators);
        self
    }

    /// Evaluate a node; failures are contained and read as inactive
    pub fn evaluate(
        &self,
        node_type: &str,
        node_data: &Value,
        connections: &[Connection],
        all_nodes: &[NodeSnapshot],
        node_id: &str,
        bypass_cache: bool,
    ) -> bool {
        match self.try_evaluate(
            node_type,
            node_data,
            connections,
            all_nodes,
            node_id,
            bypass_cache,
        ) {
            Ok(evaluation) => evaluation.is_active,
            Err(e) => {
                self.contain_fault(node_id, &e);
                false
            }
        }
    }

    /// Log a failed evaluation and stop the node's oscillator
    pub fn contain_fault(&self, node_id: &str, error: &ActivationError) {
        log::warn!("Activation evaluation failed for '{}': {}", node_id, error);
        if let Some(oscillators) = self.oscillators {
            oscillators.stop_with(node_id, StopReason::Fault);
        }
    }

    /// Evaluate a node, surfacing failures to the caller
    pub fn try_evaluate(
        &self,
        node_type: &str,
        node_data: &Value,
        connections: &[Connection],
        all_nodes: &[NodeSnapshot],
        node_id: &str,
        bypass_cache: bool,
    ) -> Result<Evaluation> {
        ensure_readable(node_id, node_data)?;
        let kind = self.registry.kind_of(node_type, self.config);

        if is_head_node(connections, node_id, self.config) {
            let key = ActivationCache::head_key(node_type, node_data);
            let head = || self.determine_head_node_state(kind, node_id, node_data);
            // The head rules are already cheap enough to serve as their own re-check
            let (is_active, from_cache, bypassed) =
                self.through_cache(&key, bypass_cache, head, head)?;
            return Ok(Evaluation {
                is_active,
                source: ActivationSource::Head,
                from_cache,
                bypassed,
            });
        }

        let inputs = non_auxiliary_input_connections(connections, node_id, self.config);
        let sources: Vec<&NodeSnapshot> = inputs
            .iter()
            .filter_map(|c| find_node(all_nodes, &c.source))
            .collect();
        let key = ActivationCache::downstream_key(node_id, node_type, node_data, &inputs, &sources);

        let (is_active, from_cache, bypassed) = self.through_cache(
            &key,
            bypass_cache,
            || Ok(self.upstream_gate(node_id, connections, all_nodes)),
            || {
                self.determine_downstream_node_state(
                    kind,
                    node_id,
                    node_data,
                    connections,
                    all_nodes,
                )
            },
        )?;
        Ok(Evaluation {
            is_active,
            source: ActivationSource::Downstream,
            from_cache,
            bypassed,
        })
    }

    /// Activation of a node with no gating inputs
    pub fn determine_head_node_state(
        &self,
        kind: NodeKind,
        node_id: &str,
        data: &Value,
    ) -> Result<bool> {
        ensure_readable(node_id, data)?;

        let active = match kind {
            NodeKind::Trigger => flag(data, "triggered"),
            NodeKind::Cyclic => {
                flag(data, "isOn")
                    && (flag(data, "triggered") || flag(data, "phase") || flag(data, "pulsing"))
            }
            _ if data.get("isManuallyActivated").is_some() => flag(data, "isManuallyActivated"),
            NodeKind::JsonTest => {
                // A missing parseError means parsing has not settled yet
                // Any parsed value counts, including an empty string
                !matches!(data.get("parsedJson"), None | Some(Value::Null))
                    && data.get("parseError") == Some(&Value::Null)
            }
            _ => has_meaningful_output(data),
        };
        Ok(active)
    }

    /// Activation of a node fed by upstream connections
    pub fn determine_downstream_node_state(
        &self,
        kind: NodeKind,
        node_id: &str,
        data: &Value,
        connections: &[Connection],
        all_nodes: &[NodeSnapshot],
    ) -> Result<bool> {
        ensure_readable(node_id, data)?;

        if !self.upstream_gate(node_id, connections, all_nodes) {
            return Ok(false);
        }

        match kind {
            NodeKind::Transform => Ok(has_meaningful_output(data)),
            NodeKind::ViewOutput => displays_content(node_id, data),
            _ => Ok(true),
        }
    }

    /// Steps shared by every downstream node: an active input, then trigger gating
    fn upstream_gate(
        &self,
        node_id: &str,
        connections: &[Connection],
        all_nodes: &[NodeSnapshot],
    ) -> bool {
        let has_active_input = non_auxiliary_input_connections(connections, node_id, self.config)
            .iter()
            .any(|c| source_is_active(all_nodes, &c.source));
        if !has_active_input {
            return false;
        }

        let triggers = trigger_connections(connections, node_id, self.config);
        triggers.is_empty() || triggers.iter().any(|c| source_is_active(all_nodes, &c.source))
    }

    /// Serve from the cache unless bypassed, re-checking cached `true` results
    fn through_cache(
        &self,
        key: &str,
        bypass_requested: bool,
        recheck: impl Fn() -> Result<bool>,
        full: impl Fn() -> Result<bool>,
    ) -> Result<(bool, bool, bool)> {
        let entry = self.cache.get(key);

        let mut bypass = bypass_requested;
        let mut deactivated = false;
        let cached_true = entry.as_ref().is_some_and(|e| e.result);
        if !bypass && cached_true && !recheck()? {
            log::trace!("Cache bypass for '{}': cached true, re-check false", key);
            self.cache.record_bypass();
            bypass = true;
            deactivated = true;
        }

        if let Some(cached) = entry.filter(|e| self.cache.is_valid(Some(e), bypass)) {
            return Ok((cached.result, true, false));
        }

        let result = full()?;
        // Every fresh result replaces the entry, including a bypassed false
        self.cache.set(key, result);
        Ok((result, false, deactivated))
    }
}

fn find_node<'n>(all_nodes: &'n [NodeSnapshot], node_id: &str) -> Option<&'n NodeSnapshot> {
    all_nodes.iter().find(|n| n.id == node_id)
}

fn source_is_active(all_nodes: &[NodeSnapshot], source_id: &str) -> bool {
    find_node(all_nodes, source_id)
        .map(|n| is_source_active(&n.data))
        .unwrap_or(false)
}

/// Node data must be an object (or absent)
fn ensure_readable(node_id: &str, data: &Value) -> Result<()> {
    match data {
        Value::Object(_) | Value::Null => Ok(()),
        other => Err(ActivationError::malformed(
            node_id,
            format!("expected an object, found {}", json_type_name(other)),
        )),
    }
}

/// At least one displayed value carries real content
fn displays_content(node_id: &str, data: &Value) -> Result<bool> {
    match data.get("displayedValues") {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Array(values)) => Ok(values
            .iter()
            .filter_map(|v| v.get("content"))
            .any(is_meaningful_content)),
        Some(other) => Err(ActivationError::malformed(
            node_id,
            format!("displayedValues must be an array, found {}", json_type_name(other)),
        )),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
