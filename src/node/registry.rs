//! Node type registry
//!
//! Maps node type keys (`"message"`, `"if"`, ...) to constructors. The registry
//! is populated once at startup, then shared read-only behind an `Arc`.
//!
//! ```ignore
//! let mut registry = NodeRegistry::new();
//! nodes::register_builtin_nodes(&mut registry);
//! registry.register_node::<MyNode>("my_node");
//! let registry = Arc::new(registry);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::{BuildNode, NodeRef};
use crate::error::{FlowError, Result};
use crate::expression::FilterRegistry;

/// Inputs handed to a node constructor
#[derive(Debug, Clone, Copy)]
pub struct NodeInit<'a> {
    pub name: &'a str,
    pub params: &'a Map<String, Value>,
    pub filters: &'a Arc<FilterRegistry>,
}

pub type NodeConstructor = Arc<dyn Fn(&NodeInit<'_>) -> Result<NodeRef> + Send + Sync>;

/// Registry of node types and the filters their expressions compile against
pub struct NodeRegistry {
    constructors: HashMap<String, NodeConstructor>,
    filters: Arc<FilterRegistry>,
}

impl fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRegistry")
            .field("node_types", &self.node_types())
            .field("filters", &self.filters)
            .finish()
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeRegistry {
    /// Create an empty registry using the built-in filters
    pub fn new() -> Self {
        Self::with_filters(Arc::new(FilterRegistry::builtin()))
    }

    /// Create an empty registry using a caller-supplied filter registry
    pub fn with_filters(filters: Arc<FilterRegistry>) -> Self {
        Self {
            constructors: HashMap::new(),
            filters,
        }
    }

    /// Create a registry holding every built-in node type
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        crate::nodes::register_builtin_nodes(&mut registry);
        registry
    }

    /// Register a constructor under a key, replacing any previous entry
    pub fn register<F>(&mut self, key: impl Into<String>, constructor: F)
    where
        F: Fn(&NodeInit<'_>) -> Result<NodeRef> + Send + Sync + 'static,
    {
        let key = key.into();
        if self.constructors.contains_key(&key) {
            warn!(node_type = %key, "node type is already registered, replacing");
        } else {
            debug!(node_type = %key, "node type registered");
        }
        self.constructors.insert(key, Arc::new(constructor));
    }

    /// Register a node type implementing [`BuildNode`]
    pub fn register_node<T: BuildNode>(&mut self, key: impl Into<String>) {
        self.register(key, |init: &NodeInit<'_>| {
            let node: NodeRef = Arc::new(T::build(init)?);
            Ok(node)
        });
    }

    /// Construct a node of type `key`
    pub fn create(&self, key: &str, name: &str, params: &Map<String, Value>) -> Result<NodeRef> {
        let constructor = self
            .constructors
            .get(key)
            .ok_or_else(|| FlowError::UnknownNodeType(key.to_string()))?;

        constructor(&NodeInit {
            name,
            params,
            filters: &self.filters,
        })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.constructors.contains_key(key)
    }

    /// Registered keys, sorted
    pub fn node_types(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    pub fn filters(&self) -> &Arc<FilterRegistry> {
        &self.filters
    }
}
