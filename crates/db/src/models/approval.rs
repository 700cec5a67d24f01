//! Approval facade models: approval types, flows, nodes and records.

use oa_core::status::StatusId;
use oa_core::types::{DbId, Timestamp};
use oa_core::workflow::assignment::AssignmentRule;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::types::Json;
use sqlx::FromRow;
use validator::Validate;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ApprovalType {
    pub id: DbId,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub status: StatusId,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateApprovalType {
    #[validate(length(min = 1, max = 64))]
    pub code: String,
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub description: Option<String>,
}

/// A flow is a named, ordered list of approval nodes. Publishing compiles it
/// into a workflow definition referenced by `workflow_definition_id`.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ApprovalFlow {
    pub id: DbId,
    pub type_id: DbId,
    pub name: String,
    pub description: Option<String>,
    pub status: StatusId,
    pub workflow_definition_id: Option<DbId>,
    pub created_by: Option<DbId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateApprovalFlow {
    pub type_id: DbId,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ApprovalNode {
    pub id: DbId,
    pub flow_id: DbId,
    pub name: String,
    pub sort_order: i32,
    pub assignment: Json<AssignmentRule>,
    pub policy: StatusId,
    pub timeout_hours: Option<i32>,
    /// Code of the compiled workflow node; set on publish.
    pub workflow_node_code: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateApprovalNode {
    pub flow_id: DbId,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[serde(default)]
    pub sort_order: i32,
    pub assignment: AssignmentRule,
    pub policy: Option<StatusId>,
    #[validate(range(min = 1))]
    pub timeout_hours: Option<i32>,
}

/// A submitted request running through a compiled flow. `status` mirrors
/// the workflow instance status.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ApprovalRecord {
    pub id: DbId,
    pub flow_id: DbId,
    pub title: String,
    pub applicant_id: DbId,
    pub form_data: Json<Map<String, Value>>,
    pub workflow_instance_id: Option<DbId>,
    pub status: StatusId,
    pub version: i32,
    pub completed_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateApprovalRecord {
    pub flow_id: DbId,
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[serde(default)]
    pub form_data: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordFilter {
    pub flow_id: Option<DbId>,
    pub applicant_id: Option<DbId>,
    pub status: Option<StatusId>,
}
