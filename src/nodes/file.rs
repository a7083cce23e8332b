//! File output

use async_trait::async_trait;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use crate::context::Context;
use crate::error::Result;
use crate::expression::value;
use crate::node::{ArgSpecs, ArgType, BuildNode, Node, NodeCore, NodeInit, Params};

/// Appends `src` as one line to the file at `path`, creating it if needed
#[derive(Debug)]
pub struct OutFileNode {
    core: NodeCore,
}

impl BuildNode for OutFileNode {
    fn arg_specs() -> ArgSpecs {
        ArgSpecs::new()
            .required("path", ArgType::Path)
            .required("src", ArgType::Any)
            .with_output()
    }

    fn build(init: &NodeInit<'_>) -> Result<Self> {
        Ok(Self {
            core: NodeCore::new(init, Self::arg_specs())?,
        })
    }
}

#[async_trait]
impl Node for OutFileNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    async fn process(&self, params: &Params, _ctx: &mut Context) -> Result<()> {
        let path = params.str("path")?;
        let mut line = value::to_display_string(params.value("src"));
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
