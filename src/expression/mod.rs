//! Expression/template engine
//!
//! A parameter source is compiled once into an [`Expression`]. Plain text passes
//! through, `{{ expr }}` segments are evaluated against the `bb`, `fd` and `macro`
//! scopes plus any caller bindings. Sources that reference no variables are folded
//! to a constant at compile time.

pub mod ast;
pub mod eval;
pub mod filters;
pub mod parser;
pub mod value;

#[cfg(test)]
mod tests;

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::{Map, Value};
use thiserror::Error;

use crate::context::Context;

pub use ast::Template;
pub use eval::{EvalError, EvalResult, Scope};
pub use filters::{FilterError, FilterFn, FilterRegistry};
pub use parser::ParseError;

/// Names always offered to expressions
pub const BLACKBOARD_VAR: &str = "bb";
pub const FLOWDATA_VAR: &str = "fd";
pub const MACRO_VAR: &str = "macro";

#[derive(Debug, Error)]
pub enum ExpressionError {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("{0} is not a valid filter")]
    UnknownFilter(String),

    #[error(transparent)]
    Eval(#[from] EvalError),
}

/* ===================== Expression ===================== */

#[derive(Debug, Clone)]
enum Compiled {
    /// Literal value, text-only source, or folded constant expression
    Constant(Value),
    Dynamic {
        template: Arc<Template>,
        variables: Arc<BTreeSet<String>>,
        filters: Arc<FilterRegistry>,
    },
}

/// A compiled parameter source
#[derive(Debug, Clone)]
pub struct Expression {
    source: Value,
    compiled: Compiled,
}

impl Expression {
    /// Compile any source value; only strings are parsed
    pub fn compile(source: &Value, filters: &Arc<FilterRegistry>) -> Result<Self, ExpressionError> {
        match source {
            Value::String(text) => Self::parse(text, filters),
            other => Ok(Self::constant(other.clone())),
        }
    }

    /// Compile a template string
    pub fn parse(source: &str, filters: &Arc<FilterRegistry>) -> Result<Self, ExpressionError> {
        let template = parser::parse_template(source)?;

        if let Some(unknown) = template
            .filters()
            .into_iter()
            .find(|name| !filters.contains(name))
        {
            return Err(ExpressionError::UnknownFilter(unknown));
        }

        let variables = template.variables();
        let compiled = if variables.is_empty() {
            Compiled::Constant(eval::render(&template, &Scope::new(), filters)?)
        } else {
            Compiled::Dynamic {
                template: Arc::new(template),
                variables: Arc::new(variables),
                filters: Arc::clone(filters),
            }
        };

        Ok(Self {
            source: Value::String(source.to_string()),
            compiled,
        })
    }

    /// Wrap an already-resolved value
    pub fn constant(value: Value) -> Self {
        Self {
            source: value.clone(),
            compiled: Compiled::Constant(value),
        }
    }

    pub fn source(&self) -> &Value {
        &self.source
    }

    pub fn is_constant(&self) -> bool {
        matches!(self.compiled, Compiled::Constant(_))
    }

    /// Variable names the expression reads
    pub fn variables(&self) -> BTreeSet<String> {
        match &self.compiled {
            Compiled::Constant(_) => BTreeSet::new(),
            Compiled::Dynamic { variables, .. } => variables.as_ref().clone(),
        }
    }

    /// Evaluate against an explicit scope
    pub fn evaluate(&self, scope: &Scope) -> EvalResult<Value> {
        match &self.compiled {
            Compiled::Constant(v) => Ok(v.clone()),
            Compiled::Dynamic {
                template, filters, ..
            } => eval::render(template, scope, filters),
        }
    }

    /// Evaluate against the live context scopes
    pub fn fetch(&self, ctx: &Context) -> EvalResult<Value> {
        self.fetch_with(ctx, &Map::new())
    }

    /// Evaluate against the live context scopes; `extend` bindings shadow the
    /// ambient names
    pub fn fetch_with(&self, ctx: &Context, extend: &Map<String, Value>) -> EvalResult<Value> {
        let variables = match &self.compiled {
            Compiled::Constant(v) => return Ok(v.clone()),
            Compiled::Dynamic { variables, .. } => variables,
        };

        // Only snapshot the ambient scopes the expression actually reads
        let mut scope = Scope::new();
        for name in variables.iter() {
            if let Some(v) = extend.get(name) {
                scope.bind_ref(name.clone(), v);
                continue;
            }
            match name.as_str() {
                BLACKBOARD_VAR => scope.bind(BLACKBOARD_VAR, Value::Object(ctx.blackboard.snapshot())),
                FLOWDATA_VAR => scope.bind(FLOWDATA_VAR, Value::Object(ctx.flowdata.to_map())),
                MACRO_VAR => scope.bind_ref(MACRO_VAR, ctx.macros.as_value()),
                // Left unbound: evaluation reports the unknown variable
                _ => {}
            }
        }

        self.evaluate(&scope)
    }
}

/* ===================== Inline Expression Cache ===================== */

/// Default number of distinct sources an [`ExpressionCache`] keeps
pub const INLINE_CACHE_CAPACITY: usize = 64;

/// Compiles bare expressions (written without braces, e.g. an `if` condition)
/// once per distinct source
///
/// Holds at most `capacity` compilations. Sources seen once the cache is full
/// are compiled on every call.
#[derive(Debug)]
pub struct ExpressionCache {
    filters: Arc<FilterRegistry>,
    capacity: usize,
    compiled: Mutex<HashMap<String, Arc<Expression>>>,
}

impl ExpressionCache {
    pub fn new(filters: &Arc<FilterRegistry>) -> Self {
        Self::with_capacity(filters, INLINE_CACHE_CAPACITY)
    }

    pub fn with_capacity(filters: &Arc<FilterRegistry>, capacity: usize) -> Self {
        Self {
            filters: Arc::clone(filters),
            capacity,
            compiled: Mutex::new(HashMap::new()),
        }
    }

    /// Compile `{{ source }}`, reusing an earlier compilation of the same text
    pub fn inline(&self, source: &Value) -> Result<Arc<Expression>, ExpressionError> {
        let text = value::to_display_string(source);
        let mut compiled = self.compiled.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(expr) = compiled.get(&text) {
            return Ok(Arc::clone(expr));
        }

        let expr = Arc::new(Expression::parse(&format!("{{{{{}}}}}", text), &self.filters)?);
        if compiled.len() < self.capacity {
            compiled.insert(text, Arc::clone(&expr));
        }
        Ok(expr)
    }

    /// Number of cached compilations
    pub fn len(&self) -> usize {
        self.compiled.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
