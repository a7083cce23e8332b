//! Synthetic first node of every flow

use async_trait::async_trait;

use crate::context::Context;
use crate::error::Result;
use crate::node::{ArgSpecs, BuildNode, Node, NodeCore, NodeInit, Params};

/// Starts a fresh activation by resetting flowdata
#[derive(Debug)]
pub struct RootNode {
    core: NodeCore,
}

impl RootNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            core: NodeCore::bare(name),
        }
    }
}

impl BuildNode for RootNode {
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
impl Node for RootNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    async fn process(&self, _params: &Params, ctx: &mut Context) -> Result<()> {
        ctx.reset_flowdata();
        Ok(())
    }
}
