//! Approval facade over the workflow engine.
//!
//! An approval flow is compiled into a linear workflow definition on
//! publish; each approval record is backed by one workflow instance whose
//! status the record mirrors. Decisions on a record are routed to the
//! caller's pending task at the mapped workflow node.

use oa_core::approval::{compile_linear_flow, step_code, workflow_type_code, ApprovalStep};
use oa_core::error::CoreError;
use oa_core::permissions;
use oa_core::status::{
    ApprovalPolicy, DefinitionStatus, InstanceStatus, TaskAction, WorkflowTypeStatus,
};
use oa_core::types::DbId;
use oa_db::models::approval::{
    ApprovalFlow, ApprovalNode, ApprovalRecord, CreateApprovalFlow, CreateApprovalNode,
    CreateApprovalRecord,
};
use oa_db::models::workflow::{CreateWorkflowType, WorkflowTask};
use oa_db::repositories::{
    ApprovalFlowRepo, ApprovalNodeRepo, ApprovalRecordRepo, ApprovalTypeRepo,
    WorkflowDefinitionRepo, WorkflowInstanceRepo, WorkflowNodeRepo, WorkflowTaskRepo,
    WorkflowTypeRepo,
};
use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;

use super::{definitions, dispatcher, invalid_state, not_found, runtime};
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;

/// A record with the task history of its instance.
#[derive(Debug, Serialize)]
pub struct RecordDetail {
    #[serde(flatten)]
    pub record: ApprovalRecord,
    pub tasks: Vec<WorkflowTask>,
}

pub async fn create_flow(
    pool: &PgPool,
    input: &CreateApprovalFlow,
    created_by: DbId,
) -> AppResult<ApprovalFlow> {
    ApprovalTypeRepo::find_by_id(pool, input.type_id)
        .await?
        .ok_or_else(|| not_found("ApprovalType", input.type_id))?;
    Ok(ApprovalFlowRepo::create(pool, input, created_by).await?)
}

/// Add a step to a flow. Takes effect the next time the flow is published.
pub async fn add_node(pool: &PgPool, input: &CreateApprovalNode) -> AppResult<ApprovalNode> {
    let policy = match input.policy {
        Some(id) => ApprovalPolicy::parse(id)?,
        None => ApprovalPolicy::AllOf,
    };
    if input.assignment.is_empty() {
        return Err(AppError::Core(CoreError::Validation(
            "Assignment rule must name at least one user".to_string(),
        )));
    }
    let flow = ApprovalFlowRepo::find_by_id(pool, input.flow_id)
        .await?
        .ok_or_else(|| not_found("ApprovalFlow", input.flow_id))?;
    if DefinitionStatus::parse(flow.status)? == DefinitionStatus::Disabled {
        return Err(invalid_state(format!("Approval flow {} is disabled", flow.id)));
    }
    Ok(ApprovalNodeRepo::create(pool, input, policy.id()).await?)
}

/// Compile the flow's nodes into a new workflow definition version and
/// publish it under the `approval:<type code>` workflow type.
///
/// Republishing a published flow creates the next definition version and
/// retires the previous one; running records keep their snapshot.
pub async fn publish_flow(
    pool: &PgPool,
    flow_id: DbId,
    actor_id: DbId,
) -> AppResult<ApprovalFlow> {
    let mut tx = pool.begin().await?;
    let flow = ApprovalFlowRepo::find_for_update(&mut *tx, flow_id)
        .await?
        .ok_or_else(|| not_found("ApprovalFlow", flow_id))?;
    if DefinitionStatus::parse(flow.status)? == DefinitionStatus::Disabled {
        return Err(invalid_state(format!("Approval flow {flow_id} is disabled")));
    }
    let approval_type = ApprovalTypeRepo::find_by_id(&mut *tx, flow.type_id)
        .await?
        .ok_or_else(|| not_found("ApprovalType", flow.type_id))?;

    let nodes = ApprovalNodeRepo::list_for_flow(&mut *tx, flow_id).await?;
    let steps = nodes
        .iter()
        .map(|n| {
            Ok(ApprovalStep {
                node_id: n.id,
                name: n.name.clone(),
                sort_order: n.sort_order,
                assignment: n.assignment.0.clone(),
                policy: ApprovalPolicy::parse(n.policy)?,
                timeout_hours: n.timeout_hours,
            })
        })
        .collect::<Result<Vec<_>, CoreError>>()?;
    let flow_nodes = compile_linear_flow(&steps)?;

    let type_code = workflow_type_code(&approval_type.code);
    let wf_type = match WorkflowTypeRepo::find_by_code(&mut *tx, &type_code).await? {
        Some(existing) => existing,
        None => {
            WorkflowTypeRepo::create(
                &mut *tx,
                &CreateWorkflowType {
                    name: approval_type.name.clone(),
                    code: type_code.clone(),
                    description: approval_type.description.clone(),
                    status: None,
                },
                WorkflowTypeStatus::Enabled.id(),
                Some(actor_id),
            )
            .await?
        }
    };

    let draft = WorkflowDefinitionRepo::create_draft(
        &mut *tx,
        wf_type.id,
        &flow.name,
        flow.description.as_deref(),
        Some(actor_id),
    )
    .await?;
    for node in &flow_nodes {
        WorkflowNodeRepo::insert_flow_node(&mut *tx, draft.id, node).await?;
    }
    let definition = definitions::publish_in_tx(&mut *tx, draft.id).await?;

    for step in &steps {
        let code = step_code(step.node_id);
        ApprovalNodeRepo::set_workflow_node_code(&mut *tx, step.node_id, &code).await?;
    }
    let published = ApprovalFlowRepo::mark_published(&mut *tx, flow_id, definition.id).await?;
    tx.commit().await?;

    tracing::info!(
        flow_id,
        definition_id = definition.id,
        version = definition.version,
        steps = steps.len(),
        "Approval flow published",
    );
    Ok(published)
}

/// Submit a record and start its workflow instance.
///
/// The instance variables are the form data plus `applicant_id`.
pub async fn create_record(
    pool: &PgPool,
    input: &CreateApprovalRecord,
    applicant_id: DbId,
) -> AppResult<ApprovalRecord> {
    let mut tx = pool.begin().await?;
    let flow = ApprovalFlowRepo::find_by_id(&mut *tx, input.flow_id)
        .await?
        .ok_or_else(|| not_found("ApprovalFlow", input.flow_id))?;
    let definition_id = match (DefinitionStatus::parse(flow.status)?, flow.workflow_definition_id)
    {
        (DefinitionStatus::Published, Some(id)) => id,
        (status, _) => {
            return Err(invalid_state(format!(
                "Approval flow {} is {status}; only published flows accept records",
                flow.id
            )))
        }
    };

    let record = ApprovalRecordRepo::insert(&mut *tx, input, applicant_id).await?;

    let mut variables = input.form_data.clone();
    variables.insert("applicant_id".to_string(), Value::from(applicant_id));
    let instance = runtime::start_in_tx(
        &mut *tx,
        definition_id,
        applicant_id,
        Some(format!("approval_record:{}", record.id)),
        variables,
    )
    .await?;

    ApprovalRecordRepo::attach_instance(&mut *tx, record.id, instance.id).await?;
    let status = InstanceStatus::parse(instance.status)?;
    ApprovalRecordRepo::mirror_instance_status(&mut *tx, instance.id, status).await?;
    let record = ApprovalRecordRepo::find_by_id(&mut *tx, record.id)
        .await?
        .ok_or_else(|| not_found("ApprovalRecord", record.id))?;
    tx.commit().await?;

    tracing::info!(
        record_id = record.id,
        instance_id = instance.id,
        applicant_id,
        "Approval record submitted",
    );
    Ok(record)
}

/// Approve or reject the step `node_id` of a record on behalf of `approver_id`.
///
/// The step must be the one the record is currently waiting at and the
/// approver must hold a pending task there.
pub async fn decide(
    pool: &PgPool,
    record_id: DbId,
    node_id: DbId,
    approver_id: DbId,
    action: TaskAction,
    comment: Option<&str>,
) -> AppResult<ApprovalRecord> {
    let mut tx = pool.begin().await?;
    // Lock order is instance first; the record is only written by the mirror.
    let record = ApprovalRecordRepo::find_by_id(&mut *tx, record_id)
        .await?
        .ok_or_else(|| not_found("ApprovalRecord", record_id))?;
    let instance_id = record
        .workflow_instance_id
        .ok_or_else(|| invalid_state(format!("Approval record {record_id} has no instance")))?;

    let node = ApprovalNodeRepo::find_by_id(&mut *tx, node_id)
        .await?
        .ok_or_else(|| not_found("ApprovalNode", node_id))?;
    if node.flow_id != record.flow_id {
        return Err(AppError::Core(CoreError::Validation(format!(
            "Approval node {node_id} does not belong to this record's flow"
        ))));
    }
    let code = node.workflow_node_code.ok_or_else(|| {
        invalid_state(format!(
            "Approval node {node_id} was added after the flow was published"
        ))
    })?;

    let instance = WorkflowInstanceRepo::find_for_update(&mut *tx, instance_id)
        .await?
        .ok_or_else(|| not_found("WorkflowInstance", instance_id))?;
    let status = InstanceStatus::parse(instance.status)?;
    if status != InstanceStatus::Running {
        return Err(invalid_state(format!("Approval record {record_id} is {status}")));
    }
    if instance.current_node_code != code {
        return Err(invalid_state(format!(
            "Approval node {node_id} is not the current step of record {record_id}"
        )));
    }

    let task = WorkflowTaskRepo::find_pending(&mut *tx, instance_id, &code, approver_id)
        .await?
        .ok_or_else(|| {
            AppError::Core(CoreError::Forbidden(format!(
                "You have no pending task on approval node {node_id}"
            )))
        })?;
    dispatcher::handle_in_tx(&mut *tx, task.id, action, comment, approver_id).await?;

    let record = ApprovalRecordRepo::find_by_id(&mut *tx, record_id)
        .await?
        .ok_or_else(|| not_found("ApprovalRecord", record_id))?;
    tx.commit().await?;
    Ok(record)
}

/// A record with its task history. Visible to the applicant, to anyone
/// holding a task on it, and to holders of `approval:flow:manage`.
pub async fn record_detail(
    pool: &PgPool,
    record_id: DbId,
    user: &AuthUser,
) -> AppResult<RecordDetail> {
    let record = ApprovalRecordRepo::find_by_id(pool, record_id)
        .await?
        .ok_or_else(|| not_found("ApprovalRecord", record_id))?;
    let tasks = match record.workflow_instance_id {
        Some(instance_id) => WorkflowTaskRepo::list_for_instance(pool, instance_id).await?,
        None => Vec::new(),
    };
    let visible = record.applicant_id == user.user_id
        || user.has(permissions::APPROVAL_FLOW_MANAGE)
        || tasks.iter().any(|t| t.assignee_id == user.user_id);
    if !visible {
        return Err(AppError::Core(CoreError::Forbidden(format!(
            "Approval record {record_id} is not visible to you"
        ))));
    }
    Ok(RecordDetail { record, tasks })
}
