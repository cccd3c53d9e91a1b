//! Node type registry
//!
//! Maps node type strings to descriptors and resolves each type's
//! activation category once. Types that were never registered (plugins,
//! host-defined nodes) fall back to pattern resolution against the engine
//! config; the result is memoized so evaluation never string-matches.
//!
//! ```ignore
//! let registry = NodeRegistry::with_builtins();
//! let kind = registry.kind_of("cycle-pulse", &config);
//! ```

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::config::EngineConfig;
use crate::descriptor::{DescriptorFn, NodeDescriptor};
use crate::types::NodeKind;

/// Registry of node types and their activation categories
pub struct NodeRegistry {
    entries: HashMap<String, NodeDescriptor>,
    /// Categories resolved by pattern for unregistered types
    resolved: RwLock<HashMap<String, NodeKind>>,
}

impl NodeRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            resolved: RwLock::new(HashMap::new()),
        }
    }

    /// Create a registry holding every descriptor submitted via `inventory`
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for DescriptorFn(describe) in inventory::iter::<DescriptorFn> {
            registry.register(describe());
        }
        registry
    }

    /// Register a node type
    pub fn register(&mut self, descriptor: NodeDescriptor) {
        self.resolved.get_mut().remove(&descriptor.node_type);
        self.entries.insert(descriptor.node_type.clone(), descriptor);
    }

    /// Get the descriptor for a node type
    pub fn get(&self, node_type: &str) -> Option<&NodeDescriptor> {
        self.entries.get(node_type)
    }

    /// Check if a node type is registered
    pub fn has_node_type(&self, node_type: &str) -> bool {
        self.entries.contains_key(node_type)
    }

    /// List all registered node type strings
    pub fn node_types(&self) -> Vec<&str> {
        self.entries.keys().map(|s| s.as_str()).collect()
    }

    /// Get all registered descriptors
    pub fn all(&self) -> Vec<&NodeDescriptor> {
        self.entries.values().collect()
    }

    /// Merge another registry into this one
    ///
    /// Entries from `other` override entries in `self` if they share the same node_type.
    pub fn merge(&mut self, other: NodeRegistry) {
        for (_, descriptor) in other.entries {
            self.register(descriptor);
        }
    }

    /// Activation category of a node type
    pub fn kind_of(&self, node_type: &str, config: &EngineConfig) -> NodeKind {
        if let Some(descriptor) = self.entries.get(node_type) {
            return descriptor.kind;
        }
        if let Some(kind) = self.resolved.read().get(node_type) {
            return *kind;
        }

        let kind = resolve_kind(node_type, config);
        log::trace!("Resolved unregistered node type '{}' as {:?}", node_type, kind);
        self.resolved.write().insert(node_type.to_string(), kind);
        kind
    }

    /// Whether a node type surfaces injected errors
    ///
    /// Registered descriptors decide for themselves; otherwise the config
    /// allow-list applies.
    pub fn accepts_error_injection(&self, node_type: &str, config: &EngineConfig) -> bool {
        match self.entries.get(node_type) {
            Some(descriptor) if descriptor.accepts_error_injection => true,
            _ => config.accepts_error_injection(node_type),
        }
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve a category from the type name alone
pub fn resolve_kind(node_type: &str, config: &EngineConfig) -> NodeKind {
    let lowered = node_type.to_ascii_lowercase();

    if node_type == config.view_output_type {
        NodeKind::ViewOutput
    } else if node_type == config.json_test_type {
        NodeKind::JsonTest
    } else if lowered.contains(&config.trigger_pattern) {
        NodeKind::Trigger
    } else if lowered.contains(&config.cycle_pattern) {
        NodeKind::Cyclic
    } else if config
        .transform_patterns
        .iter()
        .any(|pattern| lowered.contains(pattern.as_str()))
    {
        NodeKind::Transform
    } else {
        NodeKind::Content
    }
}
