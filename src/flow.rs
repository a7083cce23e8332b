//! Flow and flows composition
//!
//! A [`Flow`] is a tree of nodes hanging off a synthetic `root`. [`Flows`]
//! groups flows (and nested groups) to run one after another or concurrently.
//! Concurrent members each get a forked context: the blackboard and macros are
//! shared, flowdata is not.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures::future::{try_join_all, BoxFuture, FutureExt};
use serde_json::{Map, Value};
use tracing::{debug, info_span, warn, Instrument};

use crate::context::{Context, FlowData};
use crate::error::{FlowError, Result};
use crate::node::{NodeRef, NodeRegistry};
use crate::nodes::RootNode;

/// Name of the synthetic first node
pub const ROOT: &str = "root";

/* ===================== Flow ===================== */

pub struct Flow {
    name: Option<String>,
    registry: Arc<NodeRegistry>,
    root: NodeRef,
    nodes: HashMap<String, NodeRef>,
}

impl fmt::Debug for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut nodes: Vec<&str> = self.nodes.keys().map(String::as_str).collect();
        nodes.sort_unstable();
        f.debug_struct("Flow")
            .field("name", &self.name)
            .field("nodes", &nodes)
            .finish()
    }
}

impl Flow {
    pub fn new(name: Option<String>, registry: Arc<NodeRegistry>) -> Self {
        let root: NodeRef = Arc::new(RootNode::new(ROOT));
        let mut nodes = HashMap::new();
        nodes.insert(ROOT.to_string(), Arc::clone(&root));
        Self {
            name,
            registry,
            root,
            nodes,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn node(&self, name: &str) -> Option<&NodeRef> {
        self.nodes.get(name)
    }

    /// Number of nodes, root included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Construct a node and attach it under `parent`
    ///
    /// `parent` names a node (default child) or `node.slot` (named slot). A
    /// name already present in the flow is ignored with a warning.
    pub fn create_node(
        &mut self,
        node_type: &str,
        parent: Option<&str>,
        name: &str,
        params: &Map<String, Value>,
    ) -> Result<()> {
        if self.nodes.contains_key(name) {
            warn!(flow = ?self.name, node = %name, "node already exists, ignored");
            return Ok(());
        }

        let target = match parent {
            Some(parent) if !parent.is_empty() => Some(self.resolve_parent(name, parent)?),
            _ => None,
        };

        let node = self.registry.create(node_type, name, params)?;
        self.nodes.insert(name.to_string(), Arc::clone(&node));

        if let Some((parent, slot)) = target {
            debug!(node = %name, parent = %parent.name(), slot = ?slot, "attaching node");
            parent.add_child(node, slot.as_deref());
        }
        Ok(())
    }

    fn resolve_parent(&self, name: &str, parent: &str) -> Result<(NodeRef, Option<String>)> {
        if let Some(node) = self.nodes.get(parent) {
            return Ok((Arc::clone(node), None));
        }
        if let Some((node, slot)) = parent.rsplit_once('.') {
            if let Some(node) = self.nodes.get(node) {
                return Ok((Arc::clone(node), Some(slot.to_string())));
            }
        }
        Err(FlowError::UnknownParent {
            node: name.to_string(),
            parent: parent.to_string(),
        })
    }

    /// Run the flow once from its root
    pub async fn run(&self, ctx: &mut Context) -> Result<()> {
        ctx.flow = self.name.clone();
        let span = info_span!("flow", name = self.name.as_deref().unwrap_or("-"));

        let result = async {
            debug!("flow started");
            self.root.run(ctx).await?;
            debug!("flow finished");
            Ok::<(), FlowError>(())
        }
        .instrument(span)
        .await;

        ctx.node = None;
        result
    }
}

/* ===================== Flows ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowsKind {
    Sequential,
    Concurrent,
}

#[derive(Debug)]
pub enum FlowsMember {
    Flow(Flow),
    Flows(Flows),
}

impl FlowsMember {
    pub fn run<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, Result<()>> {
        match self {
            FlowsMember::Flow(flow) => flow.run(ctx).boxed(),
            FlowsMember::Flows(flows) => flows.run(ctx),
        }
    }
}

impl From<Flow> for FlowsMember {
    fn from(flow: Flow) -> Self {
        FlowsMember::Flow(flow)
    }
}

impl From<Flows> for FlowsMember {
    fn from(flows: Flows) -> Self {
        FlowsMember::Flows(flows)
    }
}

/// Ordered group of flows
#[derive(Debug)]
pub struct Flows {
    kind: FlowsKind,
    members: Vec<FlowsMember>,
}

impl Flows {
    pub fn new(kind: FlowsKind) -> Self {
        Self {
            kind,
            members: Vec::new(),
        }
    }

    pub fn sequential() -> Self {
        Self::new(FlowsKind::Sequential)
    }

    pub fn concurrent() -> Self {
        Self::new(FlowsKind::Concurrent)
    }

    pub fn push(&mut self, member: impl Into<FlowsMember>) {
        self.members.push(member.into());
    }

    pub fn kind(&self) -> FlowsKind {
        self.kind
    }

    pub fn members(&self) -> &[FlowsMember] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Run every member; sequential members share `ctx`, concurrent members
    /// run on forks and all must succeed
    pub fn run<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, Result<()>> {
        async move {
            match self.kind {
                FlowsKind::Sequential => {
                    for member in &self.members {
                        member.run(ctx).await?;
                    }
                }
                FlowsKind::Concurrent => {
                    let mut branches: Vec<Context> = self
                        .members
                        .iter()
                        .map(|_| ctx.fork(FlowData::new()))
                        .collect();
                    try_join_all(
                        self.members
                            .iter()
                            .zip(branches.iter_mut())
                            .map(|(member, branch)| member.run(branch)),
                    )
                    .await?;
                }
            }
            Ok(())
        }
        .boxed()
    }
}

impl Default for Flows {
    fn default() -> Self {
        Self::sequential()
    }
}
