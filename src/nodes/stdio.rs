//! Console output

use std::io::Write;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::Context;
use crate::error::Result;
use crate::expression::value;
use crate::node::{ArgSpecs, ArgType, BuildNode, Node, NodeCore, NodeInit, Params};

/// Prints `src`, or the whole flowdata when `src` is omitted
#[derive(Debug)]
pub struct StdoutNode {
    core: NodeCore,
}

/// Text printed for a value: pretty JSON or the plain display form
pub fn render(src: &Value, pretty: bool) -> String {
    if pretty {
        serde_json::to_string_pretty(src).unwrap_or_else(|_| value::to_display_string(src))
    } else {
        value::to_display_string(src)
    }
}

impl BuildNode for StdoutNode {
    fn arg_specs() -> ArgSpecs {
        ArgSpecs::new()
            .optional("src", ArgType::Any, Value::Null)
            .optional("pretty", ArgType::Bool, Value::Bool(false))
    }

    fn build(init: &NodeInit<'_>) -> Result<Self> {
        Ok(Self {
            core: NodeCore::new(init, Self::arg_specs())?,
        })
    }
}

#[async_trait]
impl Node for StdoutNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    async fn process(&self, params: &Params, ctx: &mut Context) -> Result<()> {
        let text = match params.value("src") {
            Value::Null => render(&Value::Object(ctx.flowdata.to_map()), params.flag("pretty")),
            src => render(src, params.flag("pretty")),
        };

        let mut out = std::io::stdout().lock();
        writeln!(out, "{}", text)?;
        Ok(())
    }
}
