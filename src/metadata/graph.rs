/// Graph Interpreter
///
/// Reads the embedded node graph and reports which nodes carry an explicit
/// `is_intermediate` flag. It never classifies on its own.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// One node of the embedded graph, reduced to what comparison needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphNode {
    pub node_type: Option<String>,
    pub is_intermediate: Option<bool>,
}

/// Per-flag node counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GraphFlags {
    pub nodes: usize,
    pub intermediate_nodes: usize,
    pub final_nodes: usize,
}

impl GraphFlags {
    /// Any node explicitly marked `is_intermediate: true`
    pub fn any_intermediate(&self) -> bool {
        self.intermediate_nodes > 0
    }

    /// Any node explicitly marked `is_intermediate: false`
    pub fn any_final(&self) -> bool {
        self.final_nodes > 0
    }
}

/// Parse the graph's `nodes` into a map keyed by node id.
///
/// InvokeAI writes `nodes` as an object keyed by id; an array of nodes with an `id`
/// field is accepted too. Returns `None` for malformed JSON or a missing `nodes` field.
pub fn parse_nodes(json: &str) -> Option<BTreeMap<String, GraphNode>> {
    let graph: Value = serde_json::from_str(json).ok()?;

    let nodes = match graph.get("nodes")? {
        Value::Object(map) => map
            .iter()
            .map(|(id, node)| (id.clone(), summarize(node)))
            .collect(),
        Value::Array(list) => list
            .iter()
            .enumerate()
            .map(|(index, node)| {
                let id = node
                    .get("id")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| index.to_string());
                (id, summarize(node))
            })
            .collect(),
        _ => return None,
    };

    Some(nodes)
}

fn summarize(node: &Value) -> GraphNode {
    GraphNode {
        node_type: node.get("type").and_then(Value::as_str).map(str::to_string),
        is_intermediate: node.get("is_intermediate").and_then(Value::as_bool),
    }
}

/// Count flagged nodes. Malformed input yields all-zero flags.
pub fn interpret(json: &str) -> GraphFlags {
    parse_nodes(json).map(|nodes| flags_of(&nodes)).unwrap_or_default()
}

pub fn flags_of(nodes: &BTreeMap<String, GraphNode>) -> GraphFlags {
    let mut flags = GraphFlags {
        nodes: nodes.len(),
        ..GraphFlags::default()
    };
    for node in nodes.values() {
        match node.is_intermediate {
            Some(true) => flags.intermediate_nodes += 1,
            Some(false) => flags.final_nodes += 1,
            None => {}
        }
    }
    flags
}
