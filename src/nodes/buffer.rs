//! Batching node
//!
//! Items accumulate across activations. A batch is flushed to the child when
//! it reaches `size`, or `timeout` seconds after its first item arrived,
//! whichever comes first. A flush runs the child on flowdata holding only
//! `{<node name>: [items...]}`. A failed flush on timeout is returned by the
//! next activation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::context::{Context, FlowData};
use crate::error::{FlowError, Result};
use crate::expression::value;
use crate::node::{ArgSpecs, ArgType, BuildNode, ChildSlot, Node, NodeCore, NodeInit, NodeRef, Params};

#[derive(Debug, Default)]
struct BufferState {
    items: Vec<Value>,
    timer: Option<JoinHandle<()>>,
    /// Bumped on every flush; a timer armed in an earlier cycle never flushes
    cycle: u64,
    /// Failure of a timeout flush, reported by the next activation
    failed: Option<FlowError>,
}

/// State shared with the timeout task
#[derive(Debug)]
struct BufferShared {
    name: String,
    child: ChildSlot,
    state: Mutex<BufferState>,
}

impl BufferShared {
    async fn flush(&self, state: &mut BufferState, ctx: &mut Context) -> Result<()> {
        let items = std::mem::take(&mut state.items);
        state.cycle += 1;
        debug!(node = %self.name, count = items.len(), "flushing buffer");

        let mut flowdata = FlowData::new();
        flowdata.insert(self.name.clone(), Value::Array(items))?;
        ctx.rebase(flowdata);
        self.child.run(ctx).await
    }

    /// Arm the timeout of the current cycle
    fn schedule(self: &Arc<Self>, cycle: u64, timeout: Duration, mut ctx: Context) -> JoinHandle<()> {
        let shared = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;

            let mut state = shared.state.lock().await;
            if state.cycle != cycle {
                return;
            }
            // This task is the pending timer; drop its own handle without aborting
            state.timer = None;
            if state.items.is_empty() {
                return;
            }
            if let Err(e) = shared.flush(&mut state, &mut ctx).await {
                error!(node = %shared.name, error = %e, "buffer flush on timeout failed");
                state.failed = Some(e);
            }
        })
    }
}

#[derive(Debug)]
pub struct BufferNode {
    core: NodeCore,
    shared: Arc<BufferShared>,
}

impl BufferNode {
    /// Number of items waiting for the next flush
    pub async fn pending(&self) -> usize {
        self.shared.state.lock().await.items.len()
    }

    fn timeout(&self, params: &Params) -> Result<Duration> {
        let secs = params.f64("timeout")?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            FlowError::invalid_parameter(
                self.name(),
                "timeout",
                "must be a non-negative number of seconds within range",
            )
        })
    }
}

impl Drop for BufferNode {
    fn drop(&mut self) {
        if let Ok(mut state) = self.shared.state.try_lock() {
            if let Some(timer) = state.timer.take() {
                timer.abort();
            }
        }
    }
}

impl BuildNode for BufferNode {
    fn arg_specs() -> ArgSpecs {
        ArgSpecs::new()
            .optional("size", ArgType::Int, Value::from(50))
            .optional("timeout", ArgType::Float, Value::from(5.0))
            .required("input", ArgType::Any)
            .optional("flatten", ArgType::Bool, Value::Bool(false))
    }

    fn build(init: &NodeInit<'_>) -> Result<Self> {
        Ok(Self {
            core: NodeCore::new(init, Self::arg_specs())?,
            shared: Arc::new(BufferShared {
                name: init.name.to_string(),
                child: ChildSlot::new(),
                state: Mutex::new(BufferState::default()),
            }),
        })
    }
}

#[async_trait]
impl Node for BufferNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn add_child(&self, child: NodeRef, slot: Option<&str>) {
        match slot {
            None => self.shared.child.set(child),
            Some(slot) => {
                warn!(node = %self.name(), slot, child = %child.name(), "invalid child slot, ignored")
            }
        }
    }

    async fn process(&self, params: &Params, ctx: &mut Context) -> Result<()> {
        let size = params.i64("size")?;
        let timeout = self.timeout(params)?;
        let input = params.value("input");

        let mut state = self.shared.state.lock().await;
        if let Some(e) = state.failed.take() {
            return Err(e);
        }
        if params.flag("flatten") {
            match input {
                Value::Array(items) => state.items.extend(items.iter().cloned()),
                other => {
                    return Err(FlowError::invalid_parameter(
                        self.name(),
                        "input",
                        format!("must be a list when flatten is set, got {}", value::type_name(other)),
                    ))
                }
            }
        } else {
            state.items.push(input.clone());
        }

        if i64::try_from(state.items.len()).unwrap_or(i64::MAX) >= size {
            if let Some(timer) = state.timer.take() {
                timer.abort();
            }
            self.shared.flush(&mut state, ctx).await
        } else {
            if state.timer.is_none() {
                let cycle = state.cycle;
                state.timer = Some(self.shared.schedule(cycle, timeout, ctx.fork(FlowData::new())));
            }
            Ok(())
        }
    }

    /// Children run only on flush
    async fn run(&self, ctx: &mut Context) -> Result<()> {
        self.run_self(ctx).await
    }
}
