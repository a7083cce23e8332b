pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod expression;
pub mod flow;
pub mod loader;
pub mod logging;
pub mod node;
pub mod nodes;

// Re-export main types
pub use context::{Blackboard, Context, FlowData, Macros};
pub use error::{FlowError, Result};
pub use expression::{Expression, FilterRegistry};
pub use flow::{Flow, Flows, FlowsKind, FlowsMember};
pub use loader::{load_flow_file, parse_flow_file, FlowFile};
pub use node::{Node, NodeRef, NodeRegistry};
