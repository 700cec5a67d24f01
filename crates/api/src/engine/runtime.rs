//! Instance runtime: start, advance, cancel.
//!
//! Every mutation runs with the instance row locked (`FOR UPDATE`), so two
//! requests touching the same instance serialize and the second sees the
//! state the first committed. Routing decisions come from
//! `oa_core::workflow::runtime` over the instance's definition snapshot.

use oa_core::error::CoreError;
use oa_core::permissions;
use oa_core::status::{DefinitionStatus, InstanceStatus, NodeKind, WorkflowTypeStatus};
use oa_core::types::DbId;
use oa_core::workflow::assignment::{resolve_assignees, AssignmentContext};
use oa_core::workflow::node::DefinitionSnapshot;
use oa_core::workflow::runtime::{settle, FlowGraph};
use oa_db::models::workflow::{NewInstance, NewTask, WorkflowInstance, WorkflowTask};
use oa_db::org_directory::PgOrgDirectory;
use oa_db::repositories::{
    ApprovalRecordRepo, WorkflowDefinitionRepo, WorkflowInstanceRepo, WorkflowTaskRepo,
    WorkflowTypeRepo,
};
use serde_json::{Map, Value};
use sqlx::{PgConnection, PgPool};

use super::definitions::load_flow_nodes;
use super::{invalid_state, not_found, stale};
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;

/// `None` when the caller may see every instance, otherwise the user id
/// that instance listings are restricted to.
pub fn visibility(user: &AuthUser) -> Option<DbId> {
    if user.has(permissions::WORKFLOW_INSTANCE_VIEW) {
        None
    } else {
        Some(user.user_id)
    }
}

fn status_of(instance: &WorkflowInstance) -> AppResult<InstanceStatus> {
    Ok(InstanceStatus::parse(instance.status)?)
}

fn ensure_running(instance: &WorkflowInstance) -> AppResult<()> {
    let status = status_of(instance)?;
    if status != InstanceStatus::Running {
        return Err(invalid_state(format!(
            "Instance {} is {status}",
            instance.id
        )));
    }
    Ok(())
}

pub async fn start(
    pool: &PgPool,
    definition_id: DbId,
    initiator_id: DbId,
    business_key: Option<String>,
    variables: Map<String, Value>,
) -> AppResult<WorkflowInstance> {
    let mut tx = pool.begin().await?;
    let instance =
        start_in_tx(&mut *tx, definition_id, initiator_id, business_key, variables).await?;
    tx.commit().await?;
    Ok(instance)
}

/// Snapshot the published definition into a new instance and run it to
/// its first approval node (or straight to completion).
pub async fn start_in_tx(
    conn: &mut PgConnection,
    definition_id: DbId,
    initiator_id: DbId,
    business_key: Option<String>,
    variables: Map<String, Value>,
) -> AppResult<WorkflowInstance> {
    // Shared lock: publish/disable of this row wait until we commit.
    let def = WorkflowDefinitionRepo::find_for_share(&mut *conn, definition_id)
        .await?
        .ok_or_else(|| not_found("WorkflowDefinition", definition_id))?;
    let status = DefinitionStatus::parse(def.status)?;
    if status != DefinitionStatus::Published {
        return Err(invalid_state(format!(
            "Definition {definition_id} is {status}; only published definitions can be started"
        )));
    }
    if let Some(wf_type) = WorkflowTypeRepo::find_by_id(&mut *conn, def.type_id).await? {
        if WorkflowTypeStatus::parse(wf_type.status)? == WorkflowTypeStatus::Disabled {
            return Err(invalid_state(format!(
                "Workflow type '{}' is disabled",
                wf_type.code
            )));
        }
    }

    let nodes = load_flow_nodes(conn, definition_id).await?;
    let start_code = FlowGraph::new(&nodes).start()?.code.clone();

    let instance = WorkflowInstanceRepo::insert(
        &mut *conn,
        &NewInstance {
            definition_id,
            definition_version: def.version,
            snapshot: DefinitionSnapshot {
                definition_id,
                version: def.version,
                nodes,
            },
            business_key,
            initiator_id,
            current_node_code: start_code.clone(),
            variables,
        },
    )
    .await?;

    tracing::info!(
        instance_id = instance.id,
        definition_id,
        version = def.version,
        initiator_id,
        "Workflow instance started",
    );

    advance(conn, instance, &start_code).await
}

/// Route the instance from `from_code` to the next node that needs work.
///
/// Start and condition nodes are passed through. Reaching an end node
/// completes the instance; reaching an approval node resolves its
/// assignees and creates one pending task each.
pub async fn advance(
    conn: &mut PgConnection,
    instance: WorkflowInstance,
    from_code: &str,
) -> AppResult<WorkflowInstance> {
    let graph = FlowGraph::new(&instance.definition_snapshot.0.nodes);
    let target = settle(&graph, from_code, &instance.variables.0)?.clone();

    match target.kind {
        NodeKind::End => finish(conn, instance.id, &target.code, InstanceStatus::Completed).await,
        NodeKind::Approval => {
            let rule = target.assignment.as_ref().ok_or_else(|| {
                CoreError::BadDefinition(format!(
                    "Approval node '{}' has no assignment rule",
                    target.code
                ))
            })?;
            let ctx = AssignmentContext {
                initiator_id: instance.initiator_id,
                variables: &instance.variables.0,
            };
            let assignees = {
                let mut directory = PgOrgDirectory::new(&mut *conn);
                resolve_assignees(rule, ctx, &mut directory).await?
            };

            for &assignee_id in &assignees {
                WorkflowTaskRepo::insert(
                    &mut *conn,
                    &NewTask {
                        instance_id: instance.id,
                        node_code: target.code.clone(),
                        node_name: target.name.clone(),
                        assignee_id,
                        transferred_from: None,
                    },
                )
                .await?;
            }

            let moved = WorkflowInstanceRepo::move_to(
                &mut *conn,
                instance.id,
                &target.code,
                InstanceStatus::Running,
            )
            .await?;
            tracing::info!(
                instance_id = moved.id,
                node = %target.code,
                assignees = ?assignees,
                "Instance waiting on approval node",
            );
            Ok(moved)
        }
        other => Err(CoreError::Internal(format!(
            "Routing settled on a {other} node '{}'",
            target.code
        ))
        .into()),
    }
}

/// Move the instance into a terminal status and mirror it onto any
/// approval record that tracks the instance.
pub(crate) async fn finish(
    conn: &mut PgConnection,
    instance_id: DbId,
    node_code: &str,
    status: InstanceStatus,
) -> AppResult<WorkflowInstance> {
    let done = WorkflowInstanceRepo::move_to(&mut *conn, instance_id, node_code, status).await?;
    ApprovalRecordRepo::mirror_instance_status(&mut *conn, instance_id, status).await?;
    tracing::info!(instance_id, node = %node_code, status = %status, "Workflow instance finished");
    Ok(done)
}

/// Cancel a running instance and every task still pending on it.
///
/// Allowed for the initiator and for holders of `workflow:instance:cancel`.
pub async fn cancel(pool: &PgPool, id: DbId, actor: &AuthUser) -> AppResult<WorkflowInstance> {
    let mut tx = pool.begin().await?;
    let instance = WorkflowInstanceRepo::find_for_update(&mut *tx, id)
        .await?
        .ok_or_else(|| not_found("WorkflowInstance", id))?;
    if instance.initiator_id != actor.user_id {
        actor.require(permissions::WORKFLOW_INSTANCE_CANCEL)?;
    }
    ensure_running(&instance)?;

    let cancelled_tasks = WorkflowTaskRepo::cancel_pending_for_instance(&mut *tx, id).await?;
    let cancelled = finish(
        &mut *tx,
        id,
        &instance.current_node_code,
        InstanceStatus::Cancelled,
    )
    .await?;
    tx.commit().await?;

    tracing::info!(
        instance_id = id,
        actor_id = actor.user_id,
        cancelled_tasks,
        "Workflow instance cancelled",
    );
    Ok(cancelled)
}

/// Fetch an instance the caller is allowed to see: holders of
/// `workflow:instance:view`, the initiator, or anyone holding a task on it.
pub async fn visible_instance(
    pool: &PgPool,
    id: DbId,
    user: &AuthUser,
) -> AppResult<WorkflowInstance> {
    let instance = WorkflowInstanceRepo::find_by_id(pool, id)
        .await?
        .ok_or_else(|| not_found("WorkflowInstance", id))?;
    if visibility(user).is_none() || instance.initiator_id == user.user_id {
        return Ok(instance);
    }
    let tasks = WorkflowTaskRepo::list_for_instance(pool, id).await?;
    if tasks.iter().any(|t| t.assignee_id == user.user_id) {
        Ok(instance)
    } else {
        Err(AppError::Core(CoreError::Forbidden(format!(
            "Instance {id} is not visible to you"
        ))))
    }
}

pub async fn task_history(
    pool: &PgPool,
    id: DbId,
    user: &AuthUser,
) -> AppResult<Vec<WorkflowTask>> {
    visible_instance(pool, id, user).await?;
    Ok(WorkflowTaskRepo::list_for_instance(pool, id).await?)
}

/// Replace `business_key` and/or `variables` of a running instance.
///
/// Only the initiator may edit; `version` must match the stored row.
pub async fn update_data(
    pool: &PgPool,
    id: DbId,
    actor: &AuthUser,
    version: i32,
    business_key: Option<&str>,
    variables: Option<&Map<String, Value>>,
) -> AppResult<WorkflowInstance> {
    let instance = WorkflowInstanceRepo::find_by_id(pool, id)
        .await?
        .ok_or_else(|| not_found("WorkflowInstance", id))?;
    if instance.initiator_id != actor.user_id {
        return Err(AppError::Core(CoreError::Forbidden(
            "Only the initiator can edit an instance".to_string(),
        )));
    }
    ensure_running(&instance)?;
    WorkflowInstanceRepo::update_data(pool, id, version, business_key, variables)
        .await?
        .ok_or_else(|| stale("WorkflowInstance", id))
}

/// Soft-delete a finished instance; running instances must be cancelled first.
pub async fn delete(pool: &PgPool, id: DbId) -> AppResult<()> {
    if WorkflowInstanceRepo::soft_delete_terminal(pool, id).await? {
        tracing::info!(instance_id = id, "Workflow instance deleted");
        return Ok(());
    }
    let instance = WorkflowInstanceRepo::find_by_id(pool, id)
        .await?
        .ok_or_else(|| not_found("WorkflowInstance", id))?;
    Err(AppError::Core(CoreError::Conflict(format!(
        "Instance {} is {} and cannot be deleted",
        instance.id,
        status_of(&instance)?
    ))))
}
