//! Nested loops over lists and mappings: `for_list` and `for_dict`
//!
//! `lists` is either a list of loop levels (each a list or a mapping) or a
//! single level. Every combination binds `item{depth}` for list levels and
//! `item{depth}_key` / `item{depth}_val` for mapping levels, then evaluates
//! the node's bare expressions with those bindings. Combinations for which
//! `filter` is truthy are skipped.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::context::Context;
use crate::error::{FlowError, Result};
use crate::expression::{value, Expression, ExpressionCache};
use crate::node::{ArgSpecs, ArgType, BuildNode, Node, NodeCore, NodeInit, Params};

/// Split `lists` into loop levels; an empty list has none
pub fn loop_levels<'a>(node: &str, lists: &'a Value) -> Result<&'a [Value]> {
    match lists {
        Value::Array(levels) => match levels.first() {
            None => Ok(&[]),
            Some(Value::Array(_) | Value::Object(_)) => Ok(levels.as_slice()),
            Some(_) => Ok(std::slice::from_ref(lists)),
        },
        Value::Object(_) => Ok(std::slice::from_ref(lists)),
        other => Err(FlowError::invalid_value(
            node,
            format!("lists must be a list or dict, got {}", value::type_name(other)),
        )),
    }
}

/// Visit every combination of the loop levels with its bindings
pub fn walk<F>(node: &str, levels: &[Value], visit: &mut F) -> Result<()>
where
    F: FnMut(&Map<String, Value>) -> Result<()>,
{
    if levels.is_empty() {
        return Ok(());
    }
    walk_level(node, levels, 0, &mut Map::new(), visit)
}

fn walk_level<F>(
    node: &str,
    levels: &[Value],
    depth: usize,
    bindings: &mut Map<String, Value>,
    visit: &mut F,
) -> Result<()>
where
    F: FnMut(&Map<String, Value>) -> Result<()>,
{
    let Some(level) = levels.get(depth) else {
        return visit(bindings);
    };

    match level {
        Value::Array(items) => {
            for item in items {
                bindings.insert(format!("item{}", depth), item.clone());
                walk_level(node, levels, depth + 1, bindings, visit)?;
            }
        }
        Value::Object(entries) => {
            for (k, v) in entries {
                bindings.insert(format!("item{}_key", depth), Value::String(k.clone()));
                bindings.insert(format!("item{}_val", depth), v.clone());
                walk_level(node, levels, depth + 1, bindings, visit)?;
            }
        }
        other => {
            return Err(FlowError::invalid_value(
                node,
                format!(
                    "loop level {} must be a list or dict, got {}",
                    depth,
                    value::type_name(other)
                ),
            ))
        }
    }
    Ok(())
}

/// Shared state of both loop nodes
#[derive(Debug)]
struct LoopCore {
    core: NodeCore,
    inline: ExpressionCache,
}

impl LoopCore {
    fn new(init: &NodeInit<'_>, specs: ArgSpecs) -> Result<Self> {
        Ok(Self {
            core: NodeCore::new(init, specs)?,
            inline: ExpressionCache::new(init.filters),
        })
    }

    fn compile(&self, source: &Value) -> Result<Arc<Expression>> {
        self.inline.inline(source).map_err(|source| FlowError::Expression {
            node: self.core.name().to_string(),
            source,
        })
    }

    fn filter(&self, params: &Params) -> Result<Option<Arc<Expression>>> {
        match params.value("filter") {
            Value::Null => Ok(None),
            source => self.compile(source).map(Some),
        }
    }

    fn eval(
        &self,
        param: &str,
        expr: &Expression,
        ctx: &Context,
        bindings: &Map<String, Value>,
    ) -> Result<Value> {
        expr.fetch_with(ctx, bindings).map_err(|source| FlowError::Eval {
            node: self.core.name().to_string(),
            param: param.to_string(),
            source,
        })
    }

    /// Walk the combinations that pass the filter
    fn for_each<F>(&self, params: &Params, ctx: &Context, mut visit: F) -> Result<()>
    where
        F: FnMut(&Map<String, Value>) -> Result<()>,
    {
        let filter = self.filter(params)?;
        let levels = loop_levels(self.core.name(), params.value("lists"))?;

        walk(self.core.name(), levels, &mut |bindings: &Map<String, Value>| {
            if let Some(filter) = &filter {
                if value::is_truthy(&self.eval("filter", filter, ctx, bindings)?) {
                    return Ok(());
                }
            }
            visit(bindings)
        })
    }
}

/* ===================== for_list ===================== */

/// Collects `expression` for every combination into a list
#[derive(Debug)]
pub struct ForListNode {
    inner: LoopCore,
}

impl BuildNode for ForListNode {
    fn arg_specs() -> ArgSpecs {
        ArgSpecs::new()
            .required("lists", ArgType::Any)
            .required("expression", ArgType::Expression)
            .optional("filter", ArgType::Expression, Value::Null)
            .with_output()
    }

    fn build(init: &NodeInit<'_>) -> Result<Self> {
        Ok(Self {
            inner: LoopCore::new(init, Self::arg_specs())?,
        })
    }
}

#[async_trait]
impl Node for ForListNode {
    fn core(&self) -> &NodeCore {
        &self.inner.core
    }

    async fn process(&self, params: &Params, ctx: &mut Context) -> Result<()> {
        if loop_levels(self.name(), params.value("lists"))?.is_empty() {
            return Ok(());
        }

        let expression = self.inner.compile(params.value("expression"))?;
        let scopes: &Context = ctx;
        let mut results = Vec::new();
        self.inner.for_each(params, scopes, |bindings: &Map<String, Value>| {
            results.push(self.inner.eval("expression", &expression, scopes, bindings)?);
            Ok(())
        })?;

        self.inner.core.output(params, ctx, Value::Array(results))
    }
}

/* ===================== for_dict ===================== */

/// Collects `key: val` for every combination into a mapping
#[derive(Debug)]
pub struct ForDictNode {
    inner: LoopCore,
}

impl BuildNode for ForDictNode {
    fn arg_specs() -> ArgSpecs {
        ArgSpecs::new()
            .required("lists", ArgType::Any)
            .required("key", ArgType::Expression)
            .required("val", ArgType::Expression)
            .optional("filter", ArgType::Expression, Value::Null)
            .with_output()
    }

    fn build(init: &NodeInit<'_>) -> Result<Self> {
        Ok(Self {
            inner: LoopCore::new(init, Self::arg_specs())?,
        })
    }
}

#[async_trait]
impl Node for ForDictNode {
    fn core(&self) -> &NodeCore {
        &self.inner.core
    }

    async fn process(&self, params: &Params, ctx: &mut Context) -> Result<()> {
        if loop_levels(self.name(), params.value("lists"))?.is_empty() {
            return Ok(());
        }

        let key = self.inner.compile(params.value("key"))?;
        let val = self.inner.compile(params.value("val"))?;
        let scopes: &Context = ctx;
        let mut results = Map::new();
        self.inner.for_each(params, scopes, |bindings: &Map<String, Value>| {
            let k = self.inner.eval("key", &key, scopes, bindings)?;
            let v = self.inner.eval("val", &val, scopes, bindings)?;
            results.insert(value::to_display_string(&k), v);
            Ok(())
        })?;

        self.inner.core.output(params, ctx, Value::Object(results))
    }
}
