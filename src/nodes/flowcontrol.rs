//! Flow-control nodes: `if`, `foreach` and `dispatch`
//!
//! These nodes own extra child slots besides the default child and decide
//! which of them run, and on which flowdata.

use std::fmt;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use futures::future::try_join_all;
use serde_json::Value;
use tracing::{debug, warn};

use super::Mode;
use crate::context::{Context, FlowData};
use crate::error::{FlowError, Result};
use crate::expression::{value, ExpressionCache};
use crate::node::{ArgSpecs, ArgType, BuildNode, ChildSlot, Node, NodeCore, NodeInit, NodeRef, Params};

pub const CHILD_IF: &str = "child_if";
pub const CHILD_ELSE: &str = "child_else";
pub const CHILD_FOR: &str = "child_for";
pub const TARGETS: &str = "targets";

/* ===================== if ===================== */

/// Runs `child_if` when `condition` holds, otherwise `child_else`
#[derive(Debug)]
pub struct IfNode {
    core: NodeCore,
    inline: ExpressionCache,
    child_if: ChildSlot,
    child_else: ChildSlot,
}

impl BuildNode for IfNode {
    fn arg_specs() -> ArgSpecs {
        ArgSpecs::new().required("condition", ArgType::Expression)
    }

    fn build(init: &NodeInit<'_>) -> Result<Self> {
        Ok(Self {
            core: NodeCore::new(init, Self::arg_specs())?,
            inline: ExpressionCache::new(init.filters),
            child_if: ChildSlot::new(),
            child_else: ChildSlot::new(),
        })
    }
}

#[async_trait]
impl Node for IfNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn add_child(&self, child: NodeRef, slot: Option<&str>) {
        match slot {
            None => self.core.child().set(child),
            Some(CHILD_IF) => self.child_if.set(child),
            Some(CHILD_ELSE) => self.child_else.set(child),
            Some(slot) => {
                warn!(node = %self.name(), slot, child = %child.name(), "invalid child slot, ignored")
            }
        }
    }

    async fn process(&self, params: &Params, ctx: &mut Context) -> Result<()> {
        let condition = self
            .inline
            .inline(params.value("condition"))
            .map_err(|source| FlowError::Expression {
                node: self.name().to_string(),
                source,
            })?;
        let holds = condition.fetch(ctx).map_err(|source| FlowError::Eval {
            node: self.name().to_string(),
            param: "condition".to_string(),
            source,
        })?;

        if value::is_truthy(&holds) && self.child_if.is_set() {
            debug!(node = %self.name(), "condition holds");
            self.child_if.run(ctx).await
        } else if self.child_else.is_set() {
            debug!(node = %self.name(), "running else branch");
            self.child_else.run(ctx).await
        } else {
            Ok(())
        }
    }
}

/* ===================== foreach ===================== */

/// Runs `child_for` once per element of `items`, each on its own flowdata
#[derive(Debug)]
pub struct ForeachNode {
    core: NodeCore,
    child_for: ChildSlot,
}

impl ForeachNode {
    /// Flowdata of every iteration: the pre-loop snapshot plus the binding
    fn seeds(&self, items: &Value, item_name: &str, snapshot: &FlowData) -> Result<Vec<FlowData>> {
        let seed = |bindings: Vec<(String, Value)>| -> Result<FlowData> {
            let mut flowdata = snapshot.clone();
            for (k, v) in bindings {
                flowdata.insert(k, v)?;
            }
            Ok(flowdata)
        };

        match items {
            Value::Array(items) => items
                .iter()
                .map(|item| seed(vec![(item_name.to_string(), item.clone())]))
                .collect(),
            Value::Object(entries) => entries
                .iter()
                .map(|(k, v)| {
                    seed(vec![
                        (format!("{}_key", item_name), Value::String(k.clone())),
                        (format!("{}_val", item_name), v.clone()),
                    ])
                })
                .collect(),
            other => Err(FlowError::invalid_value(
                self.name(),
                format!("items must be a list or dict, got {}", value::type_name(other)),
            )),
        }
    }
}

impl BuildNode for ForeachNode {
    fn arg_specs() -> ArgSpecs {
        ArgSpecs::new()
            .required("items", ArgType::Any)
            .optional("item_name", ArgType::Str, Value::String("item".to_string()))
            .optional("mode", ArgType::Str, Value::String(Mode::Sequential.as_str().to_string()))
    }

    fn build(init: &NodeInit<'_>) -> Result<Self> {
        Ok(Self {
            core: NodeCore::new(init, Self::arg_specs())?,
            child_for: ChildSlot::new(),
        })
    }
}

#[async_trait]
impl Node for ForeachNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn add_child(&self, child: NodeRef, slot: Option<&str>) {
        match slot {
            None => self.core.child().set(child),
            Some(CHILD_FOR) => self.child_for.set(child),
            Some(slot) => {
                warn!(node = %self.name(), slot, child = %child.name(), "invalid child slot, ignored")
            }
        }
    }

    async fn process(&self, params: &Params, ctx: &mut Context) -> Result<()> {
        let mode = Mode::from_params(params, self.name())?;
        let seeds = self.seeds(params.value("items"), params.str("item_name")?, &ctx.flowdata)?;

        let Some(child) = self.child_for.get() else {
            warn!(node = %self.name(), "no {} attached, nothing to run", CHILD_FOR);
            return Ok(());
        };

        // Each iteration runs on a fork, so the caller's flowdata stays the
        // pre-loop snapshot
        match mode {
            Mode::Sequential => {
                for flowdata in seeds {
                    let mut branch = ctx.fork(flowdata);
                    child.run(&mut branch).await?;
                }
            }
            Mode::Concurrent => {
                let mut branches: Vec<Context> =
                    seeds.into_iter().map(|flowdata| ctx.fork(flowdata)).collect();
                try_join_all(branches.iter_mut().map(|branch| child.run(branch))).await?;
            }
        }
        Ok(())
    }
}

/* ===================== dispatch ===================== */

/// Targets of a dispatch node, in registration order
#[derive(Default)]
struct DispatchTargets {
    nodes: RwLock<Vec<NodeRef>>,
}

impl DispatchTargets {
    fn push(&self, node: NodeRef) {
        self.nodes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(node);
    }

    fn snapshot(&self) -> Vec<NodeRef> {
        self.nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl fmt::Debug for DispatchTargets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.snapshot().iter().map(|node| node.name().to_string()))
            .finish()
    }
}

/// Runs every attached target, in order or as a concurrent group
#[derive(Debug)]
pub struct DispatchNode {
    core: NodeCore,
    targets: DispatchTargets,
}

impl DispatchNode {
    /// Names of the attached targets, in registration order
    pub fn target_names(&self) -> Vec<String> {
        self.targets
            .snapshot()
            .iter()
            .map(|node| node.name().to_string())
            .collect()
    }
}

impl BuildNode for DispatchNode {
    fn arg_specs() -> ArgSpecs {
        ArgSpecs::new().optional("mode", ArgType::Str, Value::String(Mode::Sequential.as_str().to_string()))
    }

    fn build(init: &NodeInit<'_>) -> Result<Self> {
        Ok(Self {
            core: NodeCore::new(init, Self::arg_specs())?,
            targets: DispatchTargets::default(),
        })
    }
}

#[async_trait]
impl Node for DispatchNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn add_child(&self, child: NodeRef, slot: Option<&str>) {
        match slot {
            None => self.core.child().set(child),
            Some(TARGETS) => self.targets.push(child),
            Some(slot) => {
                warn!(node = %self.name(), slot, child = %child.name(), "invalid child slot, ignored")
            }
        }
    }

    async fn process(&self, params: &Params, ctx: &mut Context) -> Result<()> {
        let mode = Mode::from_params(params, self.name())?;
        let targets = self.targets.snapshot();
        if targets.is_empty() {
            warn!(node = %self.name(), "no dispatch targets attached");
            return Ok(());
        }

        match mode {
            Mode::Sequential => {
                for target in &targets {
                    target.run(ctx).await?;
                }
            }
            Mode::Concurrent => {
                let mut branches: Vec<Context> = targets
                    .iter()
                    .map(|_| ctx.fork(ctx.flowdata.clone()))
                    .collect();
                try_join_all(
                    targets
                        .iter()
                        .zip(branches.iter_mut())
                        .map(|(target, branch)| target.run(branch)),
                )
                .await?;

                // Later targets win on conflicting keys
                for branch in branches {
                    ctx.flowdata.merge(branch.flowdata);
                }
            }
        }
        Ok(())
    }
}
