//! Flow node shape shared by the definition manager and the runtime.

use serde::{Deserialize, Serialize};

use crate::status::{ApprovalPolicy, NodeKind};
use crate::workflow::assignment::AssignmentRule;

/// An outgoing edge: taken when `condition` holds over the instance variables.
///
/// An empty condition (or `default`) always holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextRef {
    #[serde(default)]
    pub condition: String,
    pub next: String,
}

impl NextRef {
    /// Unconditional edge to `next`.
    pub fn to(next: impl Into<String>) -> Self {
        Self {
            condition: String::new(),
            next: next.into(),
        }
    }

    /// Conditional edge to `next`.
    pub fn when(condition: impl Into<String>, next: impl Into<String>) -> Self {
        Self {
            condition: condition.into(),
            next: next.into(),
        }
    }
}

/// A node of a definition graph, as snapshotted into a running instance.
///
/// `code` is unique within one definition and is what tasks and instances
/// reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowNode {
    pub code: String,
    pub name: String,
    pub kind: NodeKind,
    #[serde(default)]
    pub sort_order: i32,
    #[serde(default)]
    pub next_refs: Vec<NextRef>,
    #[serde(default)]
    pub assignment: Option<AssignmentRule>,
    #[serde(default = "default_policy")]
    pub policy: ApprovalPolicy,
    /// Stored and echoed; no timer evaluates it.
    #[serde(default)]
    pub timeout_hours: Option<i32>,
}

fn default_policy() -> ApprovalPolicy {
    ApprovalPolicy::AllOf
}

impl FlowNode {
    /// A node with no edges, no rule and the all-of policy.
    pub fn new(code: impl Into<String>, name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            kind,
            sort_order: 0,
            next_refs: Vec::new(),
            assignment: None,
            policy: ApprovalPolicy::AllOf,
            timeout_hours: None,
        }
    }

    pub fn with_next(mut self, next_ref: NextRef) -> Self {
        self.next_refs.push(next_ref);
        self
    }

    pub fn with_assignment(mut self, rule: AssignmentRule) -> Self {
        self.assignment = Some(rule);
        self
    }

    pub fn with_policy(mut self, policy: ApprovalPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_order(mut self, sort_order: i32) -> Self {
        self.sort_order = sort_order;
        self
    }
}

/// The frozen copy of a definition stored on each instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefinitionSnapshot {
    pub definition_id: crate::types::DbId,
    pub version: i32,
    pub nodes: Vec<FlowNode>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_json_uses_numeric_kinds() {
        let node = FlowNode::new("approve", "Manager", NodeKind::Approval)
            .with_next(NextRef::to("end"))
            .with_assignment(AssignmentRule::InitiatorManager);
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["kind"], 2);
        assert_eq!(json["policy"], 1);
        assert_eq!(json["next_refs"][0]["next"], "end");
        assert_eq!(json["assignment"]["kind"], "initiator_manager");
    }

    #[test]
    fn missing_optional_fields_take_defaults() {
        let node: FlowNode =
            serde_json::from_value(serde_json::json!({"code": "e", "name": "End", "kind": 6}))
                .unwrap();
        assert_eq!(node.kind, NodeKind::End);
        assert_eq!(node.policy, ApprovalPolicy::AllOf);
        assert!(node.next_refs.is_empty());
        assert!(node.assignment.is_none());
    }
}
