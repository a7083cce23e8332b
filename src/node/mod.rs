//! Node contract
//!
//! Every step of a flow is a [`Node`]. A node type declares its parameters as
//! [`ArgSpecs`]; construction compiles one [`Expression`] per declared parameter
//! and every activation resolves them into a fresh [`Params`] map before
//! `process` runs.
//!
//! ```ignore
//! #[async_trait]
//! impl Node for MessageNode {
//!     fn core(&self) -> &NodeCore { &self.core }
//!
//!     async fn process(&self, params: &Params, ctx: &mut Context) -> Result<()> {
//!         self.core.output(params, ctx, params.value("msg").clone())
//!     }
//! }
//! ```

pub mod registry;

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, debug_span, warn, Instrument};

use crate::context::Context;
use crate::error::{FlowError, Result};
use crate::expression::{value, Expression};

pub use registry::{NodeConstructor, NodeInit, NodeRegistry};

/// Shared handle to a constructed node
pub type NodeRef = Arc<dyn Node>;

/// Output capability parameters
pub const OUT_BB: &str = "out_bb";
pub const OUT_FIELD: &str = "out_field";

static NULL: Value = Value::Null;

/* ===================== Argument Specification ===================== */

/// Type tag of a declared parameter. Only used for documentation; values are
/// checked by the node reading them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    Any,
    Str,
    Int,
    Float,
    Bool,
    List,
    Dict,
    /// Expression source written without braces
    Expression,
    Path,
}

impl ArgType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArgType::Any => "any",
            ArgType::Str => "str",
            ArgType::Int => "int",
            ArgType::Float => "float",
            ArgType::Bool => "bool",
            ArgType::List => "list",
            ArgType::Dict => "dict",
            ArgType::Expression => "expression",
            ArgType::Path => "path",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArgSpec {
    pub name: String,
    pub arg_type: ArgType,
    pub required: bool,
    /// Used when an optional parameter is omitted
    pub default: Value,
}

/// Ordered parameter declarations of a node type
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArgSpecs {
    specs: Vec<ArgSpec>,
}

impl ArgSpecs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self, name: impl Into<String>, arg_type: ArgType) -> Self {
        self.push(ArgSpec {
            name: name.into(),
            arg_type,
            required: true,
            default: Value::Null,
        });
        self
    }

    pub fn optional(mut self, name: impl Into<String>, arg_type: ArgType, default: Value) -> Self {
        self.push(ArgSpec {
            name: name.into(),
            arg_type,
            required: false,
            default,
        });
        self
    }

    /// Opt into output routing: adds `out_bb` (default false) and
    /// `out_field` (default none)
    pub fn with_output(self) -> Self {
        self.optional(OUT_BB, ArgType::Bool, Value::Bool(false))
            .optional(OUT_FIELD, ArgType::Str, Value::Null)
    }

    pub fn has_output(&self) -> bool {
        self.get(OUT_BB).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&ArgSpec> {
        self.specs.iter().find(|spec| spec.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ArgSpec> {
        self.specs.iter()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    // Redeclaring a parameter replaces it in place
    fn push(&mut self, spec: ArgSpec) {
        match self.specs.iter_mut().find(|s| s.name == spec.name) {
            Some(existing) => *existing = spec,
            None => self.specs.push(spec),
        }
    }
}

/* ===================== Resolved Parameters ===================== */

/// Parameter values resolved for one activation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    node: String,
    values: Map<String, Value>,
}

impl Params {
    pub fn new(node: impl Into<String>, values: Map<String, Value>) -> Self {
        Self {
            node: node.into(),
            values,
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Value of a declared parameter, `null` if absent
    pub fn value(&self, name: &str) -> &Value {
        self.values.get(name).unwrap_or(&NULL)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Truthiness of a parameter
    pub fn flag(&self, name: &str) -> bool {
        value::is_truthy(self.value(name))
    }

    pub fn str(&self, name: &str) -> Result<&str> {
        self.value(name)
            .as_str()
            .ok_or_else(|| self.type_error(name, "a string"))
    }

    pub fn i64(&self, name: &str) -> Result<i64> {
        match value::as_num(self.value(name)) {
            Some(value::Num::Int(i)) => Ok(i),
            _ => Err(self.type_error(name, "an integer")),
        }
    }

    pub fn f64(&self, name: &str) -> Result<f64> {
        value::as_num(self.value(name))
            .map(value::Num::as_f64)
            .ok_or_else(|| self.type_error(name, "a number"))
    }

    pub fn list(&self, name: &str) -> Result<&Vec<Value>> {
        self.value(name)
            .as_array()
            .ok_or_else(|| self.type_error(name, "a list"))
    }

    pub fn dict(&self, name: &str) -> Result<&Map<String, Value>> {
        self.value(name)
            .as_object()
            .ok_or_else(|| self.type_error(name, "a dict"))
    }

    fn type_error(&self, name: &str, expected: &str) -> FlowError {
        FlowError::invalid_parameter(
            &self.node,
            name,
            format!(
                "must be {}, got {}",
                expected,
                value::type_name(self.value(name))
            ),
        )
    }
}

/* ===================== Child Slots ===================== */

/// A single attachable child
#[derive(Default)]
pub struct ChildSlot {
    node: RwLock<Option<NodeRef>>,
}

impl ChildSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<NodeRef> {
        self.node
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Attach a child, replacing any previous one
    pub fn set(&self, child: NodeRef) {
        *self.node.write().unwrap_or_else(PoisonError::into_inner) = Some(child);
    }

    pub fn is_set(&self) -> bool {
        self.node
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Run the attached child, if any
    pub async fn run(&self, ctx: &mut Context) -> Result<()> {
        // Clone the handle out so the lock is not held across the await
        let child = self.get();
        match child {
            Some(child) => child.run(ctx).await,
            None => Ok(()),
        }
    }
}

impl fmt::Debug for ChildSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(child) => write!(f, "Some({})", child.name()),
            None => write!(f, "None"),
        }
    }
}

/* ===================== Node Core ===================== */

/// State shared by every node type: identity, compiled parameters and the
/// default child
pub struct NodeCore {
    name: String,
    specs: ArgSpecs,
    vars: Vec<(String, Expression)>,
    child: ChildSlot,
}

impl fmt::Debug for NodeCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<&str> = self.vars.iter().map(|(name, _)| name.as_str()).collect();
        f.debug_struct("NodeCore")
            .field("name", &self.name)
            .field("params", &params)
            .field("child", &self.child)
            .finish()
    }
}

impl NodeCore {
    /// Compile the declared parameters from the raw parameter mapping
    pub fn new(init: &NodeInit<'_>, specs: ArgSpecs) -> Result<Self> {
        let mut vars = Vec::with_capacity(specs.len());

        for spec in specs.iter() {
            let expr = match init.params.get(&spec.name) {
                Some(source) => Expression::compile(source, init.filters).map_err(|source| {
                    FlowError::Compile {
                        node: init.name.to_string(),
                        param: spec.name.clone(),
                        source,
                    }
                })?,
                None if spec.required => {
                    return Err(FlowError::MissingParameter {
                        node: init.name.to_string(),
                        param: spec.name.clone(),
                    })
                }
                None => Expression::constant(spec.default.clone()),
            };
            vars.push((spec.name.clone(), expr));
        }

        for key in init.params.keys() {
            if specs.get(key).is_none() {
                warn!(node = %init.name, param = %key, "unknown parameter is ignored");
            }
        }

        Ok(Self {
            name: init.name.to_string(),
            specs,
            vars,
            child: ChildSlot::new(),
        })
    }

    /// Core of a node without parameters
    pub fn bare(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            specs: ArgSpecs::new(),
            vars: Vec::new(),
            child: ChildSlot::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn specs(&self) -> &ArgSpecs {
        &self.specs
    }

    /// Compiled expression of a declared parameter
    pub fn expression(&self, name: &str) -> Option<&Expression> {
        self.vars
            .iter()
            .find(|(param, _)| param == name)
            .map(|(_, expr)| expr)
    }

    /// Resolve every declared parameter against the live scopes
    pub fn fetch_params(&self, ctx: &Context) -> Result<Params> {
        let mut values = Map::new();
        for (param, expr) in &self.vars {
            let value = expr.fetch(ctx).map_err(|source| FlowError::Eval {
                node: self.name.clone(),
                param: param.clone(),
                source,
            })?;
            values.insert(param.clone(), value);
        }
        Ok(Params::new(self.name.clone(), values))
    }

    /// Route a result to flowdata (or the blackboard when `out_bb` is set)
    /// under the node name or the `out_field` override
    pub fn output(&self, params: &Params, ctx: &mut Context, value: Value) -> Result<()> {
        if !self.specs.has_output() {
            warn!(node = %self.name, "node has no output parameters, output ignored");
            return Ok(());
        }

        let field = match params.get(OUT_FIELD) {
            Some(field) if value::is_truthy(field) => value::to_display_string(field),
            _ => self.name.clone(),
        };

        if params.flag(OUT_BB) {
            ctx.blackboard.insert(field, value);
            Ok(())
        } else {
            ctx.flowdata.insert(field, value)
        }
    }

    pub fn child(&self) -> &ChildSlot {
        &self.child
    }

    pub async fn run_child(&self, ctx: &mut Context) -> Result<()> {
        self.child.run(ctx).await
    }
}

/* ===================== Node Trait ===================== */

#[async_trait]
pub trait Node: Send + Sync {
    fn core(&self) -> &NodeCore;

    fn name(&self) -> &str {
        self.core().name()
    }

    /// Node behavior for one activation
    async fn process(&self, params: &Params, ctx: &mut Context) -> Result<()>;

    /// Attach a child. Plain nodes only have the default slot.
    fn add_child(&self, child: NodeRef, slot: Option<&str>) {
        match slot {
            None => self.core().child().set(child),
            Some(slot) => {
                warn!(node = %self.name(), slot, child = %child.name(), "invalid child slot, ignored")
            }
        }
    }

    /// Run this node, then its default child
    async fn run(&self, ctx: &mut Context) -> Result<()> {
        self.run_self(ctx).await?;
        self.core().run_child(ctx).await
    }

    /// Mark the node current, resolve its parameters and process
    async fn run_self(&self, ctx: &mut Context) -> Result<()> {
        let core = self.core();
        ctx.node = Some(core.name().to_string());

        let span = debug_span!("node", name = %core.name());
        async {
            let params = core.fetch_params(ctx)?;
            self.process(&params, ctx).await?;
            if ctx.debug {
                debug!(
                    flowdata = ?ctx.flowdata.as_map(),
                    blackboard = ?ctx.blackboard.snapshot(),
                    "node processed"
                );
            }
            Ok::<(), FlowError>(())
        }
        .instrument(span)
        .await
    }
}

/// Node types constructible from a registry entry
pub trait BuildNode: Node + Sized + 'static {
    /// Parameter declarations of the node type
    fn arg_specs() -> ArgSpecs;

    fn build(init: &NodeInit<'_>) -> Result<Self>;
}
