//! Test helpers for expression tests
//!
//! Common fixtures for compiling templates and evaluating them against a context

use std::sync::Arc;

use serde_json::{json, Map, Value};

use crate::context::{Blackboard, Context, FlowData, Macros};
use crate::expression::{
    parser, EvalError, Expression, ExpressionError, FilterRegistry, Template,
};

pub fn to_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {}", other),
    }
}

/// Context with the scopes used throughout the expression tests:
/// `bb = {bb1: "foo", dict: {foo: "bar"}}`, `fd = {fd1: "bar"}`, `macro = {mc1: "foobar"}`
pub fn fixture_context() -> Context {
    let mut ctx = Context::new(
        Macros::from(to_map(json!({"mc1": "foobar"}))),
        Blackboard::from(to_map(json!({"bb1": "foo", "dict": {"foo": "bar"}}))),
    );
    ctx.flowdata = FlowData::from(to_map(json!({"fd1": "bar"})));
    ctx
}

pub fn builtin_filters() -> Arc<FilterRegistry> {
    Arc::new(FilterRegistry::builtin())
}

pub fn compile(source: &str) -> Result<Expression, ExpressionError> {
    Expression::parse(source, &builtin_filters())
}

/// Compile and fetch against the fixture context, panicking on any error
pub fn eval_source(source: &str) -> Value {
    let expr = compile(source).unwrap_or_else(|e| panic!("compile '{}' failed: {}", source, e));
    expr.fetch(&fixture_context())
        .unwrap_or_else(|e| panic!("fetch '{}' failed: {}", source, e))
}

/// Compile and fetch against the fixture context, returning the evaluation error
pub fn eval_error(source: &str) -> EvalError {
    let expr = compile(source).unwrap_or_else(|e| panic!("compile '{}' failed: {}", source, e));
    match expr.fetch(&fixture_context()) {
        Ok(v) => panic!("expected '{}' to fail, got {}", source, v),
        Err(e) => e,
    }
}

/// Parse a template and push it through a JSON round trip
pub fn parse_roundtrip(source: &str) -> Template {
    let template = parser::parse_template(source).expect("Parse template failed");
    let json = serde_json::to_string(&template).expect("Template serialization failed");
    let restored: Template = serde_json::from_str(&json).expect("Template deserialization failed");
    assert_eq!(template, restored);
    restored
}
