//! Workflow engine models: types, definitions, nodes, instances, tasks.
//!
//! Status columns are raw SMALLINT ids; the matching enums live in
//! `oa_core::status`.

use oa_core::error::CoreError;
use oa_core::status::{ApprovalPolicy, NodeKind, StatusId};
use oa_core::types::{DbId, Timestamp};
use oa_core::workflow::assignment::AssignmentRule;
use oa_core::workflow::node::{DefinitionSnapshot, FlowNode, NextRef};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::types::Json;
use sqlx::FromRow;
use oa_core::workflow::expression::MAX_CONDITION_LEN;
use validator::{Validate, ValidationError};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WorkflowType {
    pub id: DbId,
    pub name: String,
    pub code: String,
    pub description: Option<String>,
    pub status: StatusId,
    pub version: i32,
    pub created_by: Option<DbId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateWorkflowType {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(min = 1, max = 100))]
    pub code: String,
    pub description: Option<String>,
    pub status: Option<StatusId>,
}

/// `version` must match the stored row.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateWorkflowType {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<StatusId>,
    pub version: i32,
}

// ---------------------------------------------------------------------------
// Definitions
// ---------------------------------------------------------------------------

/// A versioned definition. `version` is the definition's own version
/// number; `lock_version` is the optimistic-lock counter.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WorkflowDefinition {
    pub id: DbId,
    pub type_id: DbId,
    pub name: String,
    pub description: Option<String>,
    pub version: i32,
    pub status: StatusId,
    pub lock_version: i32,
    pub created_by: Option<DbId>,
    pub published_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateWorkflowDefinition {
    pub type_id: DbId,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateWorkflowDefinition {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub description: Option<String>,
    pub lock_version: i32,
}

/// Filters for `GET /workflows/definitions`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DefinitionFilter {
    pub type_id: Option<DbId>,
    pub status: Option<StatusId>,
    pub name: Option<String>,
}

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WorkflowNode {
    pub id: DbId,
    pub definition_id: DbId,
    pub code: String,
    pub name: String,
    pub kind: StatusId,
    pub sort_order: i32,
    pub next_refs: Json<Vec<NextRef>>,
    pub assignment: Option<Json<AssignmentRule>>,
    pub policy: StatusId,
    pub timeout_hours: Option<i32>,
    pub version: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl WorkflowNode {
    /// Convert the row into the engine's node shape.
    pub fn to_flow_node(&self) -> Result<FlowNode, CoreError> {
        Ok(FlowNode {
            code: self.code.clone(),
            name: self.name.clone(),
            kind: NodeKind::parse(self.kind)?,
            sort_order: self.sort_order,
            next_refs: self.next_refs.0.clone(),
            assignment: self.assignment.as_ref().map(|a| a.0.clone()),
            policy: ApprovalPolicy::parse(self.policy)?,
            timeout_hours: self.timeout_hours,
        })
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateWorkflowNode {
    pub definition_id: DbId,
    #[validate(length(min = 1, max = 64))]
    pub code: String,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub kind: StatusId,
    #[serde(default)]
    pub sort_order: i32,
    #[serde(default)]
    #[validate(custom(function = "validate_next_refs"))]
    pub next_refs: Vec<NextRef>,
    pub assignment: Option<AssignmentRule>,
    pub policy: Option<StatusId>,
    #[validate(range(min = 1))]
    pub timeout_hours: Option<i32>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateWorkflowNode {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub kind: Option<StatusId>,
    pub sort_order: Option<i32>,
    #[validate(custom(function = "validate_next_refs"))]
    pub next_refs: Option<Vec<NextRef>>,
    pub assignment: Option<AssignmentRule>,
    pub policy: Option<StatusId>,
    #[validate(range(min = 1))]
    pub timeout_hours: Option<i32>,
    pub version: i32,
}

/// Edge conditions are parsed at publish time; reject oversized text up front.
fn validate_next_refs(refs: &Vec<NextRef>) -> Result<(), ValidationError> {
    if refs
        .iter()
        .any(|r| r.condition.chars().count() > MAX_CONDITION_LEN)
    {
        let mut err = ValidationError::new("condition_too_long");
        err.message = Some(
            format!("Edge conditions must be at most {MAX_CONDITION_LEN} characters").into(),
        );
        return Err(err);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Instances
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WorkflowInstance {
    pub id: DbId,
    pub definition_id: DbId,
    pub definition_version: i32,
    pub definition_snapshot: Json<DefinitionSnapshot>,
    pub business_key: Option<String>,
    pub initiator_id: DbId,
    pub current_node_code: String,
    pub status: StatusId,
    pub variables: Json<Map<String, Value>>,
    pub version: i32,
    pub started_at: Timestamp,
    pub completed_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Values for a freshly started instance.
#[derive(Debug, Clone)]
pub struct NewInstance {
    pub definition_id: DbId,
    pub definition_version: i32,
    pub snapshot: DefinitionSnapshot,
    pub business_key: Option<String>,
    pub initiator_id: DbId,
    pub current_node_code: String,
    pub variables: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InstanceFilter {
    pub definition_id: Option<DbId>,
    pub initiator_id: Option<DbId>,
    pub status: Option<StatusId>,
    pub business_key: Option<String>,
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WorkflowTask {
    pub id: DbId,
    pub instance_id: DbId,
    pub node_code: String,
    pub node_name: String,
    pub assignee_id: DbId,
    pub status: StatusId,
    pub action: StatusId,
    pub comment: Option<String>,
    pub transferred_from: Option<DbId>,
    pub completed_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Values for a new pending task.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub instance_id: DbId,
    pub node_code: String,
    pub node_name: String,
    pub assignee_id: DbId,
    pub transferred_from: Option<DbId>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskFilter {
    pub assignee_id: Option<DbId>,
    pub instance_id: Option<DbId>,
    pub status: Option<StatusId>,
}

/// Per-node tallies used to decide whether an approval node is satisfied.
#[derive(Debug, Clone, Copy, Default, FromRow)]
pub struct NodeTaskCounts {
    pub approved: i64,
    pub pending: i64,
}
