//! Value-shaping plugins: `concat` and `mutate`

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::context::Context;
use crate::error::{FlowError, Result};
use crate::expression::value;
use crate::node::{ArgSpecs, ArgType, BuildNode, Node, NodeCore, NodeInit, Params};

/* ===================== concat ===================== */

/// Joins strings, broadcasting a string over a list and zipping two lists
#[derive(Debug)]
pub struct ConcatNode {
    core: NodeCore,
}

/// `first + second` with list broadcasting. Two lists are zipped to the
/// shorter length.
pub fn concat(node: &str, first: &Value, second: &Value) -> Result<Value> {
    let join = |a: &Value, b: &Value| {
        value::add(a, b).map_err(|e| FlowError::invalid_value(node, format!("cannot concat: {}", e)))
    };

    match (first, second) {
        (Value::Array(a), Value::Array(b)) => a
            .iter()
            .zip(b)
            .map(|(x, y)| join(x, y))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        (Value::Array(a), s @ Value::String(_)) => a
            .iter()
            .map(|x| join(x, s))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        (s @ Value::String(_), Value::Array(b)) => b
            .iter()
            .map(|y| join(s, y))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        (Value::String(_), Value::String(_)) => join(first, second),
        (a, b) => Err(FlowError::invalid_value(
            node,
            format!(
                "concat expects strings or lists of strings, got {} and {}",
                value::type_name(a),
                value::type_name(b)
            ),
        )),
    }
}

impl BuildNode for ConcatNode {
    fn arg_specs() -> ArgSpecs {
        ArgSpecs::new()
            .required("first", ArgType::Any)
            .required("second", ArgType::Any)
            .with_output()
    }

    fn build(init: &NodeInit<'_>) -> Result<Self> {
        Ok(Self {
            core: NodeCore::new(init, Self::arg_specs())?,
        })
    }
}

#[async_trait]
impl Node for ConcatNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    async fn process(&self, params: &Params, ctx: &mut Context) -> Result<()> {
        let joined = concat(self.name(), params.value("first"), params.value("second"))?;
        self.core.output(params, ctx, joined)
    }
}

/* ===================== mutate ===================== */

/// Copies and splits fields of a mapping (or of every mapping in a list)
#[derive(Debug)]
pub struct MutateNode {
    core: NodeCore,
}

/// Apply `copy` (`{src: dst}`) then `split` (`{field: separator}`) to a copy
/// of `target`
pub fn mutate(
    node: &str,
    target: &Value,
    copy: &Map<String, Value>,
    split: &Map<String, Value>,
) -> Result<Value> {
    let mut target = target.clone();
    mutate_in_place(node, &mut target, copy, split)?;
    Ok(target)
}

fn mutate_in_place(
    node: &str,
    target: &mut Value,
    copy: &Map<String, Value>,
    split: &Map<String, Value>,
) -> Result<()> {
    match target {
        Value::Array(items) => items
            .iter_mut()
            .try_for_each(|item| mutate_in_place(node, item, copy, split)),
        Value::Object(fields) => {
            copy_fields(node, fields, copy)?;
            split_fields(node, fields, split)
        }
        other => Err(FlowError::invalid_value(
            node,
            format!(
                "mutate target must be a dict or a list of dicts, got {}",
                value::type_name(other)
            ),
        )),
    }
}

fn copy_fields(node: &str, fields: &mut Map<String, Value>, copy: &Map<String, Value>) -> Result<()> {
    for (src, dst) in copy {
        let v = fields
            .get(src)
            .cloned()
            .ok_or_else(|| FlowError::invalid_value(node, format!("field '{}' not found", src)))?;
        fields.insert(value::to_display_string(dst), v);
    }
    Ok(())
}

fn split_fields(node: &str, fields: &mut Map<String, Value>, split: &Map<String, Value>) -> Result<()> {
    for (field, sep) in split {
        let Value::String(sep) = sep else {
            return Err(FlowError::invalid_value(
                node,
                format!("separator of '{}' must be a string", field),
            ));
        };
        if sep.is_empty() {
            return Err(FlowError::invalid_value(
                node,
                format!("separator of '{}' is empty", field),
            ));
        }

        let parts = match fields.get(field) {
            Some(Value::String(text)) => text
                .split(sep.as_str())
                .map(|part| Value::String(part.to_string()))
                .collect(),
            Some(other) => {
                return Err(FlowError::invalid_value(
                    node,
                    format!("field '{}' must be a string to split, got {}", field, value::type_name(other)),
                ))
            }
            None => {
                return Err(FlowError::invalid_value(
                    node,
                    format!("field '{}' not found", field),
                ))
            }
        };
        fields.insert(field.clone(), Value::Array(parts));
    }
    Ok(())
}

impl BuildNode for MutateNode {
    fn arg_specs() -> ArgSpecs {
        ArgSpecs::new()
            .required("target", ArgType::Any)
            .optional("copy", ArgType::Dict, Value::Object(Map::new()))
            .optional("split", ArgType::Dict, Value::Object(Map::new()))
            .with_output()
    }

    fn build(init: &NodeInit<'_>) -> Result<Self> {
        Ok(Self {
            core: NodeCore::new(init, Self::arg_specs())?,
        })
    }
}

#[async_trait]
impl Node for MutateNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    async fn process(&self, params: &Params, ctx: &mut Context) -> Result<()> {
        let mutated = mutate(
            self.name(),
            params.value("target"),
            params.dict("copy")?,
            params.dict("split")?,
        )?;
        self.core.output(params, ctx, mutated)
    }
}
