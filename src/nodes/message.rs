use async_trait::async_trait;

use crate::context::Context;
use crate::error::Result;
use crate::node::{ArgSpecs, ArgType, BuildNode, Node, NodeCore, NodeInit, Params};

/// Outputs `msg` as is
#[derive(Debug)]
pub struct MessageNode {
    core: NodeCore,
}

impl BuildNode for MessageNode {
    fn arg_specs() -> ArgSpecs {
        ArgSpecs::new().required("msg", ArgType::Any).with_output()
    }

    fn build(init: &NodeInit<'_>) -> Result<Self> {
        Ok(Self {
            core: NodeCore::new(init, Self::arg_specs())?,
        })
    }
}

#[async_trait]
impl Node for MessageNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    async fn process(&self, params: &Params, ctx: &mut Context) -> Result<()> {
        self.core.output(params, ctx, params.value("msg").clone())
    }
}
