//! Built-in node types
//!
//! Plugin nodes (`message`, `concat`, `for_list`, ...) produce values, trigger
//! nodes (`interval`, `scheduler`) drive their children from a timing loop,
//! and flow-control nodes (`if`, `foreach`, `dispatch`, `buffer`) decide which
//! children run and on which flowdata.

pub mod buffer;
pub mod file;
pub mod flowcontrol;
pub mod itemloop;
pub mod message;
pub mod root;
pub mod stdio;
pub mod timer;
pub mod transforms;

use std::str::FromStr;

use crate::error::{FlowError, Result};
use crate::node::{NodeRegistry, Params};

pub use buffer::BufferNode;
pub use file::OutFileNode;
pub use flowcontrol::{DispatchNode, ForeachNode, IfNode};
pub use itemloop::{ForDictNode, ForListNode};
pub use message::MessageNode;
pub use root::RootNode;
pub use stdio::StdoutNode;
pub use timer::{IntervalNode, SchedulerNode};
pub use transforms::{ConcatNode, MutateNode};

/// Register every built-in node type
pub fn register_builtin_nodes(registry: &mut NodeRegistry) {
    registry.register_node::<RootNode>("root");
    registry.register_node::<MessageNode>("message");
    registry.register_node::<StdoutNode>("stdout");
    registry.register_node::<ConcatNode>("concat");
    registry.register_node::<MutateNode>("mutate");
    registry.register_node::<ForListNode>("for_list");
    registry.register_node::<ForDictNode>("for_dict");
    registry.register_node::<IntervalNode>("interval");
    registry.register_node::<SchedulerNode>("scheduler");
    registry.register_node::<OutFileNode>("out_file");
    registry.register_node::<IfNode>("if");
    registry.register_node::<ForeachNode>("foreach");
    registry.register_node::<DispatchNode>("dispatch");
    registry.register_node::<BufferNode>("buffer");
}

/// How a fan-out node runs its children
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Sequential,
    Concurrent,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Sequential => "sequential",
            Mode::Concurrent => "concurrent",
        }
    }

    /// Read the `mode` parameter of a node
    pub(crate) fn from_params(params: &Params, node: &str) -> Result<Self> {
        let mode = params.str("mode")?;
        mode.parse().map_err(|msg: String| FlowError::invalid_value(node, msg))
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "sequential" => Ok(Mode::Sequential),
            "concurrent" => Ok(Mode::Concurrent),
            other => Err(format!(
                "invalid mode '{}', expected 'sequential' or 'concurrent'",
                other
            )),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests;
