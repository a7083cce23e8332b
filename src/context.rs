//! Variable scopes and the per-activation execution context
//!
//! Three scopes are visible to every node:
//! - macros: read-only, set once per run
//! - flowdata: per activation, each key may be written once
//! - blackboard: shared by every flow of a run, freely overwritten
//!
//! The [`Context`] carrying them is passed explicitly through `Node::run`.
//! Concurrent branches get a forked context that shares macros and blackboard
//! but owns its flowdata.

use std::sync::{Arc, PoisonError, RwLock};

use serde_json::{Map, Value};

use crate::error::{FlowError, Result};

/* ===================== FlowData ===================== */

/// Write-once mapping for passing values between nodes within one activation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowData {
    data: Map<String, Value>,
}

impl FlowData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a key; writing a key twice is an error
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Result<()> {
        let key = key.into();
        if self.data.contains_key(&key) {
            return Err(FlowError::DuplicateKey(key));
        }
        self.data.insert(key, value);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn to_map(&self) -> Map<String, Value> {
        self.data.clone()
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.data
    }

    /// Fold another scope in, its keys winning on conflict; used when
    /// re-basing after a concurrent fan-out rather than as a node write
    pub fn merge(&mut self, other: FlowData) {
        for (k, v) in other.data {
            self.data.insert(k, v);
        }
    }
}

impl From<Map<String, Value>> for FlowData {
    fn from(data: Map<String, Value>) -> Self {
        Self { data }
    }
}

/* ===================== Blackboard ===================== */

/// Shared, overwritable mapping; clones share the same storage
#[derive(Debug, Clone, Default)]
pub struct Blackboard {
    data: Arc<RwLock<Map<String, Value>>>,
}

impl Blackboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Set a key, replacing any previous value
    pub fn insert(&self, key: impl Into<String>, value: Value) {
        self.data
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value);
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.data.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the current contents
    pub fn snapshot(&self) -> Map<String, Value> {
        self.data.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl From<Map<String, Value>> for Blackboard {
    fn from(data: Map<String, Value>) -> Self {
        Self {
            data: Arc::new(RwLock::new(data)),
        }
    }
}

/* ===================== Macros ===================== */

/// Read-only run-wide values
#[derive(Debug, Clone)]
pub struct Macros {
    data: Arc<Value>,
}

impl Default for Macros {
    fn default() -> Self {
        Self {
            data: Arc::new(Value::Object(Map::new())),
        }
    }
}

impl Macros {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// The macros as a mapping value, as seen by `macro` in expressions
    pub fn as_value(&self) -> &Value {
        &self.data
    }

    /// New macros with `overrides` applied on top
    pub fn with_overrides<I, K>(&self, overrides: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut map = match self.data.as_ref() {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        for (k, v) in overrides {
            map.insert(k.into(), v);
        }
        Self::from(map)
    }
}

impl From<Map<String, Value>> for Macros {
    fn from(data: Map<String, Value>) -> Self {
        Self {
            data: Arc::new(Value::Object(data)),
        }
    }
}

/* ===================== Context ===================== */

/// Scopes and identity of the running activation
#[derive(Debug, Clone, Default)]
pub struct Context {
    pub macros: Macros,
    pub blackboard: Blackboard,
    pub flowdata: FlowData,
    /// Name of the running flow
    pub flow: Option<String>,
    /// Name of the running node
    pub node: Option<String>,
    /// Log a scope snapshot after every node
    pub debug: bool,
}

impl Context {
    pub fn new(macros: Macros, blackboard: Blackboard) -> Self {
        Self {
            macros,
            blackboard,
            ..Self::default()
        }
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Branch context sharing macros and blackboard, with its own flowdata
    pub fn fork(&self, flowdata: FlowData) -> Self {
        Self {
            macros: self.macros.clone(),
            blackboard: self.blackboard.clone(),
            flowdata,
            flow: self.flow.clone(),
            node: self.node.clone(),
            debug: self.debug,
        }
    }

    /// Start a fresh activation
    pub fn reset_flowdata(&mut self) {
        self.flowdata = FlowData::new();
    }

    /// Replace the flowdata, returning the previous scope
    pub fn rebase(&mut self, flowdata: FlowData) -> FlowData {
        std::mem::replace(&mut self.flowdata, flowdata)
    }
}
