//! Expression evaluation against a variable scope

use std::borrow::Cow;
use std::collections::HashMap;

use serde_json::{Map, Value};
use thiserror::Error;

use super::ast::{BinaryOp, Expr, Segment, Template, UnaryOp};
use super::filters::{FilterError, FilterRegistry};
use super::value;

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("variable not found: {0}")]
    UnknownVariable(String),

    #[error("{0} is not a valid filter")]
    UnknownFilter(String),

    #[error("filter '{name}' failed: {source}")]
    Filter {
        name: String,
        #[source]
        source: FilterError,
    },

    #[error("key {0} not found")]
    KeyNotFound(String),

    #[error("index {0} out of range")]
    IndexOutOfRange(i64),

    #[error("{0} indices must be integers, not {1}")]
    InvalidIndex(&'static str, &'static str),

    #[error("'{0}' object is not subscriptable")]
    NotSubscriptable(&'static str),

    #[error("argument of type '{0}' is not iterable")]
    NotIterable(&'static str),

    #[error("unsupported operand type(s) for {op}: '{left}' and '{right}'")]
    UnsupportedOperands {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },

    #[error("bad operand type for {op}: '{operand}'")]
    BadOperand {
        op: &'static str,
        operand: &'static str,
    },

    #[error("{0}")]
    TypeError(String),

    #[error("division by zero")]
    ZeroDivision,

    #[error("integer overflow")]
    Overflow,

    #[error("float result is not finite")]
    NonFiniteFloat,
}

pub type EvalResult<T> = Result<T, EvalError>;

/* ===================== Scope ===================== */

/// Name bindings visible to an expression
#[derive(Debug, Default)]
pub struct Scope<'a> {
    vars: HashMap<String, Cow<'a, Value>>,
}

impl<'a> Scope<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), Cow::Owned(value));
    }

    pub fn bind_ref(&mut self, name: impl Into<String>, value: &'a Value) {
        self.vars.insert(name.into(), Cow::Borrowed(value));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name).map(|v| v.as_ref())
    }
}

impl<'a> From<&'a Map<String, Value>> for Scope<'a> {
    fn from(map: &'a Map<String, Value>) -> Self {
        let mut scope = Scope::new();
        for (k, v) in map {
            scope.bind_ref(k.clone(), v);
        }
        scope
    }
}

/* ===================== Template Rendering ===================== */

/// Render a template: a lone expression keeps its native value, anything
/// else is concatenated as text
pub fn render(template: &Template, scope: &Scope, filters: &FilterRegistry) -> EvalResult<Value> {
    match template.segments.as_slice() {
        [] => Ok(Value::String(String::new())),
        [Segment::Expr { expr, .. }] => Ok(eval_expr(expr, scope, filters)?.into_owned()),
        segments => {
            let mut out = String::new();
            for segment in segments {
                match segment {
                    Segment::Text { v, .. } => out.push_str(v),
                    Segment::Expr { expr, .. } => {
                        let v = eval_expr(expr, scope, filters)?;
                        out.push_str(&value::to_display_string(&v));
                    }
                }
            }
            Ok(Value::String(out))
        }
    }
}

/* ===================== Expression Evaluation ===================== */

/// Evaluate an expression, borrowing from the scope where possible
pub fn eval_expr<'s>(
    expr: &Expr,
    scope: &'s Scope,
    filters: &FilterRegistry,
) -> EvalResult<Cow<'s, Value>> {
    match expr {
        Expr::LitNull { .. } => Ok(Cow::Owned(Value::Null)),

        Expr::LitBool { v, .. } => Ok(Cow::Owned(Value::Bool(*v))),

        Expr::LitInt { v, .. } => Ok(Cow::Owned(Value::from(*v))),

        Expr::LitFloat { v, .. } => value::float_value(*v).map(Cow::Owned),

        Expr::LitStr { v, .. } => Ok(Cow::Owned(Value::String(v.clone()))),

        Expr::LitList { elements, .. } => {
            let items = elements
                .iter()
                .map(|e| eval_expr(e, scope, filters).map(Cow::into_owned))
                .collect::<EvalResult<Vec<_>>>()?;
            Ok(Cow::Owned(Value::Array(items)))
        }

        Expr::LitDict { entries, .. } => {
            let mut map = Map::new();
            for (key, e) in entries {
                map.insert(key.clone(), eval_expr(e, scope, filters)?.into_owned());
            }
            Ok(Cow::Owned(Value::Object(map)))
        }

        Expr::Ident { name, .. } => scope
            .vars
            .get(name)
            .map(|v| Cow::Borrowed(v.as_ref()))
            .ok_or_else(|| EvalError::UnknownVariable(name.clone())),

        Expr::Unary { op, operand, .. } => {
            let v = eval_expr(operand, scope, filters)?;
            match op {
                UnaryOp::Not => Ok(Cow::Owned(Value::Bool(!value::is_truthy(&v)))),
                UnaryOp::Neg => value::negate(&v).map(Cow::Owned),
            }
        }

        Expr::Binary {
            op, left, right, ..
        } => {
            // Operands are evaluated eagerly; and/or return the deciding operand
            let l = eval_expr(left, scope, filters)?;
            let r = eval_expr(right, scope, filters)?;
            match op {
                BinaryOp::Or => Ok(if value::is_truthy(&l) { l } else { r }),
                BinaryOp::And => Ok(if value::is_truthy(&l) { r } else { l }),
                _ => eval_binary(*op, &l, &r).map(Cow::Owned),
            }
        }

        Expr::Index { object, index, .. } => {
            let obj = eval_expr(object, scope, filters)?;
            let idx = eval_expr(index, scope, filters)?;
            match obj {
                Cow::Borrowed(container) => value::get_item(container, &idx),
                Cow::Owned(container) => {
                    value::get_item(&container, &idx).map(|v| Cow::Owned(v.into_owned()))
                }
            }
        }

        Expr::Slice {
            object,
            lower,
            upper,
            ..
        } => {
            let obj = eval_expr(object, scope, filters)?;
            let lower = lower
                .as_deref()
                .map(|e| eval_expr(e, scope, filters))
                .transpose()?;
            let upper = upper
                .as_deref()
                .map(|e| eval_expr(e, scope, filters))
                .transpose()?;
            value::get_slice(&obj, lower.as_deref(), upper.as_deref()).map(Cow::Owned)
        }

        Expr::Filter {
            value: piped,
            name,
            args,
            ..
        } => {
            let filter = filters
                .get(name)
                .ok_or_else(|| EvalError::UnknownFilter(name.clone()))?;

            // Parenthesized arguments first, piped value last
            let mut call_args = args
                .iter()
                .map(|e| eval_expr(e, scope, filters).map(Cow::into_owned))
                .collect::<EvalResult<Vec<_>>>()?;
            call_args.push(eval_expr(piped, scope, filters)?.into_owned());

            filter(&call_args)
                .map(Cow::Owned)
                .map_err(|source| EvalError::Filter {
                    name: name.clone(),
                    source,
                })
        }
    }
}

fn eval_binary(op: BinaryOp, l: &Value, r: &Value) -> EvalResult<Value> {
    let symbol = op.symbol();
    match op {
        BinaryOp::Add => value::add(l, r),
        BinaryOp::Sub => value::sub(l, r),
        BinaryOp::Mul => value::mul(l, r),
        BinaryOp::Div => value::div(l, r),
        BinaryOp::FloorDiv => value::floor_div(l, r),
        BinaryOp::Mod => value::modulo(l, r),
        BinaryOp::Eq => Ok(Value::Bool(value::values_equal(l, r))),
        BinaryOp::Ne => Ok(Value::Bool(!value::values_equal(l, r))),
        BinaryOp::Lt => Ok(Value::Bool(value::compare(l, r, symbol)?.is_lt())),
        BinaryOp::Gt => Ok(Value::Bool(value::compare(l, r, symbol)?.is_gt())),
        BinaryOp::Le => Ok(Value::Bool(value::compare(l, r, symbol)?.is_le())),
        BinaryOp::Ge => Ok(Value::Bool(value::compare(l, r, symbol)?.is_ge())),
        BinaryOp::In => value::contains(r, l).map(Value::Bool),
        BinaryOp::NotIn => value::contains(r, l).map(|found| Value::Bool(!found)),
        BinaryOp::Is => Ok(Value::Bool(value::is_identical(l, r))),
        BinaryOp::IsNot => Ok(Value::Bool(!value::is_identical(l, r))),
        BinaryOp::Or | BinaryOp::And => Err(EvalError::TypeError(format!(
            "'{}' is not an arithmetic operator",
            symbol
        ))),
    }
}
