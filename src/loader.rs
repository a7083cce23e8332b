//! Flow file loader
//!
//! A flow file is a YAML mapping with exactly one of:
//!
//! ```yaml
//! flow:            # a single flow
//!   - message:
//!       msg: hello
//! sequential:      # or a group, members run one after another
//!   flows:
//!     - flow: [...]
//!     - concurrent:
//!         flows: [...]
//! ```
//!
//! plus an optional `macros:` mapping. Each node entry is a single-key mapping
//! `type: {params}`; `name` defaults to the type and `parent` to the previous
//! node of the same flow (`root` for the first).

use std::path::Path;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::context::{Blackboard, Context, Macros};
use crate::error::{FlowError, Result};
use crate::expression::value;
use crate::flow::{Flow, Flows, FlowsKind, ROOT};
use crate::node::NodeRegistry;

const FLOW: &str = "flow";
const SEQUENTIAL: &str = "sequential";
const CONCURRENT: &str = "concurrent";
const FLOWS: &str = "flows";
const MACROS: &str = "macros";

/// A loaded flow file
#[derive(Debug)]
pub struct FlowFile {
    pub flows: Flows,
    pub macros: Macros,
}

impl FlowFile {
    /// Fresh context seeded with the file's macros
    pub fn context(&self) -> Context {
        Context::new(self.macros.clone(), Blackboard::new())
    }
}

/// Read and build a flow file
pub fn load_flow_file(path: impl AsRef<Path>, registry: &Arc<NodeRegistry>) -> Result<FlowFile> {
    let path = path.as_ref();
    info!(path = %path.display(), "loading flow file");
    let text = std::fs::read_to_string(path)?;
    parse_flow_file(&text, registry)
}

/// Build a flow file from YAML text
pub fn parse_flow_file(yaml: &str, registry: &Arc<NodeRegistry>) -> Result<FlowFile> {
    let doc: Value = serde_yaml::from_str(yaml)?;
    let Value::Object(doc) = doc else {
        return Err(FlowError::Load(format!(
            "top level must be a mapping, got {}",
            value::type_name(&doc)
        )));
    };

    let macros = match doc.get(MACROS) {
        None | Some(Value::Null) => Macros::new(),
        Some(Value::Object(map)) => Macros::from(map.clone()),
        Some(other) => {
            return Err(FlowError::Load(format!(
                "'{}' must be a mapping, got {}",
                MACROS,
                value::type_name(other)
            )))
        }
    };

    let defined: Vec<&str> = [FLOW, SEQUENTIAL, CONCURRENT]
        .into_iter()
        .filter(|key| doc.contains_key(*key))
        .collect();

    let flows = match defined.as_slice() {
        [] => {
            return Err(FlowError::Load(format!(
                "no flow defined, expected '{}', '{}' or '{}'",
                FLOW, SEQUENTIAL, CONCURRENT
            )))
        }
        [FLOW] => {
            let mut flows = Flows::sequential();
            flows.push(build_flow(&doc, registry)?);
            flows
        }
        [SEQUENTIAL] => build_group(FlowsKind::Sequential, &doc[SEQUENTIAL], registry)?,
        [CONCURRENT] => build_group(FlowsKind::Concurrent, &doc[CONCURRENT], registry)?,
        _ => {
            return Err(FlowError::Load(format!(
                "only one top-level flow may be defined, found {}",
                defined.join(", ")
            )))
        }
    };

    Ok(FlowFile { flows, macros })
}

fn build_group(kind: FlowsKind, config: &Value, registry: &Arc<NodeRegistry>) -> Result<Flows> {
    let members = config
        .get(FLOWS)
        .and_then(Value::as_array)
        .ok_or_else(|| FlowError::Load(format!("a flow group needs a '{}' list", FLOWS)))?;

    let mut flows = Flows::new(kind);
    for member in members {
        let Some(member) = member.as_object() else {
            warn!(member = %member, "flow group member is not a mapping, skipped");
            continue;
        };

        if member.contains_key(FLOW) {
            flows.push(build_flow(member, registry)?);
        } else if let Some(group) = member.get(SEQUENTIAL) {
            flows.push(build_group(FlowsKind::Sequential, group, registry)?);
        } else if let Some(group) = member.get(CONCURRENT) {
            flows.push(build_group(FlowsKind::Concurrent, group, registry)?);
        } else {
            let keys: Vec<&String> = member.keys().collect();
            warn!(keys = ?keys, "unrecognised flow group member, skipped");
        }
    }
    Ok(flows)
}

fn build_flow(config: &Map<String, Value>, registry: &Arc<NodeRegistry>) -> Result<Flow> {
    let name = match config.get("name") {
        None | Some(Value::Null) => None,
        Some(name) => Some(value::to_display_string(name)),
    };
    let entries = config
        .get(FLOW)
        .and_then(Value::as_array)
        .ok_or_else(|| FlowError::Load(format!("'{}' must be a list of nodes", FLOW)))?;

    let mut flow = Flow::new(name, Arc::clone(registry));
    let mut previous = ROOT.to_string();

    for entry in entries {
        let (node_type, mut params) = node_entry(entry)?;
        let node_name = match params.remove("name") {
            None | Some(Value::Null) => node_type.to_string(),
            Some(name) => value::to_display_string(&name),
        };
        let parent = match params.remove("parent") {
            None | Some(Value::Null) => previous.clone(),
            Some(parent) => value::to_display_string(&parent),
        };

        debug!(node_type, node = %node_name, parent = %parent, "creating node");
        flow.create_node(node_type, Some(&parent), &node_name, &params)?;
        previous = node_name;
    }
    Ok(flow)
}

/// Split a `type: {params}` entry
fn node_entry(entry: &Value) -> Result<(&str, Map<String, Value>)> {
    let entry = entry
        .as_object()
        .filter(|entry| entry.len() == 1)
        .ok_or_else(|| {
            FlowError::Load(format!(
                "node entry must be a mapping with a single node type, got {}",
                entry
            ))
        })?;

    let Some((node_type, params)) = entry.iter().next() else {
        return Err(FlowError::Load("empty node entry".to_string()));
    };
    let params = match params {
        Value::Null => Map::new(),
        Value::Object(params) => params.clone(),
        other => {
            return Err(FlowError::Load(format!(
                "parameters of '{}' must be a mapping, got {}",
                node_type,
                value::type_name(other)
            )))
        }
    };
    Ok((node_type.as_str(), params))
}

#[cfg(test)]
mod tests;
