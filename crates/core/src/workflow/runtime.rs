//! Pure routing decisions for a running instance.
//!
//! The API layer owns persistence and locking; these functions only decide
//! where an instance goes next given its snapshot and variables.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::error::CoreError;
use crate::status::{ApprovalPolicy, NodeKind};
use crate::workflow::expression::Condition;
use crate::workflow::node::FlowNode;

/// Upper bound on pass-through hops while settling; a published definition
/// is acyclic, so hitting it means the snapshot is corrupt.
const MAX_SETTLE_STEPS: usize = 256;

/// Read-only view over a snapshot's nodes, indexed by code.
#[derive(Debug)]
pub struct FlowGraph<'a> {
    nodes: &'a [FlowNode],
    by_code: HashMap<&'a str, usize>,
}

impl<'a> FlowGraph<'a> {
    pub fn new(nodes: &'a [FlowNode]) -> Self {
        let by_code = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.code.as_str(), i))
            .collect();
        Self { nodes, by_code }
    }

    pub fn node(&self, code: &str) -> Result<&'a FlowNode, CoreError> {
        self.by_code
            .get(code)
            .map(|&i| &self.nodes[i])
            .ok_or_else(|| {
                CoreError::BadDefinition(format!("Node '{code}' does not exist in the definition"))
            })
    }

    pub fn start(&self) -> Result<&'a FlowNode, CoreError> {
        self.nodes
            .iter()
            .find(|n| n.kind == NodeKind::Start)
            .ok_or_else(|| CoreError::BadDefinition("Definition has no start node".to_string()))
    }
}

/// Pick the first outgoing edge whose condition holds.
pub fn choose_next<'a>(node: &'a FlowNode, vars: &Map<String, Value>) -> Result<&'a str, CoreError> {
    for next_ref in &node.next_refs {
        if Condition::parse(&next_ref.condition)?.evaluate(vars) {
            return Ok(next_ref.next.as_str());
        }
    }
    Err(CoreError::BadDefinition(format!(
        "No branch of node '{}' matches the instance variables",
        node.code
    )))
}

/// Walk from `code` through start and condition nodes until reaching a node
/// that needs work (approval) or finishes the instance (end).
pub fn settle<'a>(
    graph: &FlowGraph<'a>,
    code: &str,
    vars: &Map<String, Value>,
) -> Result<&'a FlowNode, CoreError> {
    let mut current = graph.node(code)?;
    for _ in 0..MAX_SETTLE_STEPS {
        match current.kind {
            NodeKind::Approval | NodeKind::End => return Ok(current),
            NodeKind::Start | NodeKind::Condition => {
                let next = choose_next(current, vars)?;
                current = graph.node(next)?;
            }
            NodeKind::Parallel | NodeKind::Join => {
                return Err(CoreError::Unsupported(format!(
                    "Node '{}' is a {} node; parallel and join nodes are not supported",
                    current.code, current.kind
                )));
            }
        }
    }
    Err(CoreError::BadDefinition(format!(
        "Routing from node '{code}' did not settle; the definition contains a loop"
    )))
}

/// The node an approval node hands over to once satisfied.
pub fn successor_of_approval(node: &FlowNode) -> Result<&str, CoreError> {
    node.next_refs
        .first()
        .map(|r| r.next.as_str())
        .ok_or_else(|| {
            CoreError::BadDefinition(format!("Approval node '{}' has no successor", node.code))
        })
}

/// Whether an approval node is done given the tasks recorded on it.
///
/// `approved` counts completed tasks and `pending` counts tasks still open.
/// Transferred tasks count as neither; their replacement carries the vote.
pub fn node_satisfied(policy: ApprovalPolicy, approved: i64, pending: i64) -> bool {
    match policy {
        ApprovalPolicy::AllOf => pending == 0 && approved > 0,
        ApprovalPolicy::AnyOf => approved >= 1,
    }
}
