//! Test helpers shared by node, flow and loader tests
//!
//! `test.addnode` adds `a + b` into flowdata (or the blackboard with `out_bb`),
//! `test.count` counts its activations on the blackboard.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::context::{Blackboard, Context, Macros};
use crate::error::{FlowError, Result};
use crate::expression::value;
use crate::node::{ArgSpecs, ArgType, BuildNode, Node, NodeCore, NodeInit, NodeRef, NodeRegistry, Params};

#[derive(Debug)]
pub struct AddNode {
    core: NodeCore,
}

impl BuildNode for AddNode {
    fn arg_specs() -> ArgSpecs {
        ArgSpecs::new()
            .required("a", ArgType::Any)
            .required("b", ArgType::Any)
            .optional("out_bb", ArgType::Bool, Value::Bool(false))
    }

    fn build(init: &NodeInit<'_>) -> Result<Self> {
        Ok(Self {
            core: NodeCore::new(init, Self::arg_specs())?,
        })
    }
}

#[async_trait]
impl Node for AddNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    async fn process(&self, params: &Params, ctx: &mut Context) -> Result<()> {
        let sum = value::add(params.value("a"), params.value("b"))
            .map_err(|e| FlowError::invalid_value(self.name(), e.to_string()))?;
        if params.flag("out_bb") {
            ctx.blackboard.insert(self.name(), sum);
            Ok(())
        } else {
            ctx.flowdata.insert(self.name(), sum)
        }
    }
}

/// Increments `bb.count` and marks `fd.seen` on every activation
#[derive(Debug)]
pub struct CountNode {
    core: NodeCore,
}

impl BuildNode for CountNode {
    fn arg_specs() -> ArgSpecs {
        ArgSpecs::new()
    }

    fn build(init: &NodeInit<'_>) -> Result<Self> {
        Ok(Self {
            core: NodeCore::new(init, Self::arg_specs())?,
        })
    }
}

#[async_trait]
impl Node for CountNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    async fn process(&self, _params: &Params, ctx: &mut Context) -> Result<()> {
        let count = ctx
            .blackboard
            .get("count")
            .and_then(|v| v.as_i64())
            .unwrap_or(0);
        ctx.blackboard.insert("count", Value::from(count + 1));
        ctx.flowdata.insert("seen", Value::Bool(true))
    }
}

pub fn to_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => panic!("expected an object, got {}", other),
    }
}

/// Built-in node types plus `test.addnode` and `test.count`
pub fn test_registry() -> Arc<NodeRegistry> {
    let mut registry = NodeRegistry::builtin();
    registry.register_node::<AddNode>("test.addnode");
    registry.register_node::<CountNode>("test.count");
    Arc::new(registry)
}

/// Construct a node, panicking on construction errors
pub fn create(registry: &NodeRegistry, key: &str, name: &str, params: Value) -> NodeRef {
    registry
        .create(key, name, &to_map(params))
        .unwrap_or_else(|e| panic!("create {} '{}' failed: {}", key, name, e))
}

/// Construct a node, returning the construction error
pub fn create_err(registry: &NodeRegistry, key: &str, name: &str, params: Value) -> FlowError {
    match registry.create(key, name, &to_map(params)) {
        Ok(node) => panic!("expected {} '{}' to fail, got a node", key, node.name()),
        Err(e) => e,
    }
}

pub fn ctx() -> Context {
    Context::new(Macros::new(), Blackboard::new())
}

pub fn ctx_with_macros(macros: Value) -> Context {
    Context::new(Macros::from(to_map(macros)), Blackboard::new())
}
