//! Compilation of approval flows into linear workflow definitions.
//!
//! An approval flow is an ordered list of approval steps. Publishing it
//! produces `start -> step_1 -> ... -> step_n -> end`, which the workflow
//! engine then runs like any other definition.

use crate::error::CoreError;
use crate::status::{ApprovalPolicy, NodeKind};
use crate::workflow::assignment::AssignmentRule;
use crate::workflow::node::{FlowNode, NextRef};

pub const START_CODE: &str = "start";
pub const END_CODE: &str = "end";

/// Prefix of workflow type codes created for approval types.
pub const WORKFLOW_TYPE_PREFIX: &str = "approval:";

/// One configured approval step, as stored on an approval node.
#[derive(Debug, Clone, PartialEq)]
pub struct ApprovalStep {
    pub node_id: i64,
    pub name: String,
    pub sort_order: i32,
    pub assignment: AssignmentRule,
    pub policy: ApprovalPolicy,
    pub timeout_hours: Option<i32>,
}

/// Workflow node code assigned to an approval node.
pub fn step_code(node_id: i64) -> String {
    format!("step_{node_id}")
}

/// Workflow type code backing an approval type.
pub fn workflow_type_code(approval_type_code: &str) -> String {
    format!("{WORKFLOW_TYPE_PREFIX}{approval_type_code}")
}

/// Build the linear node list for a flow; steps are ordered by
/// `(sort_order, node_id)`.
pub fn compile_linear_flow(steps: &[ApprovalStep]) -> Result<Vec<FlowNode>, CoreError> {
    if steps.is_empty() {
        return Err(CoreError::BadDefinition(
            "Approval flow has no approval nodes".to_string(),
        ));
    }

    let mut ordered: Vec<&ApprovalStep> = steps.iter().collect();
    ordered.sort_by_key(|s| (s.sort_order, s.node_id));

    let codes: Vec<String> = ordered.iter().map(|s| step_code(s.node_id)).collect();
    let mut nodes = Vec::with_capacity(ordered.len() + 2);
    nodes.push(
        FlowNode::new(START_CODE, "Start", NodeKind::Start)
            .with_next(NextRef::to(codes[0].clone()))
            .with_order(0),
    );

    for (i, step) in ordered.iter().enumerate() {
        if step.assignment.is_empty() {
            return Err(CoreError::BadDefinition(format!(
                "Approval node '{}' has an empty assignment rule",
                step.name
            )));
        }
        let next = codes.get(i + 1).map(String::as_str).unwrap_or(END_CODE);
        let mut node = FlowNode::new(codes[i].clone(), step.name.clone(), NodeKind::Approval)
            .with_next(NextRef::to(next))
            .with_assignment(step.assignment.clone())
            .with_policy(step.policy)
            .with_order(i as i32 + 1);
        node.timeout_hours = step.timeout_hours;
        nodes.push(node);
    }

    nodes.push(
        FlowNode::new(END_CODE, "End", NodeKind::End).with_order(ordered.len() as i32 + 1),
    );
    Ok(nodes)
}
