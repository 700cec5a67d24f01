//! Task dispatcher: approve/reject, transfer, add-sign and comments.
//!
//! Lock order is instance row first, then task row, matching the runtime,
//! so concurrent decisions on sibling tasks of one instance serialize.

use oa_core::error::CoreError;
use oa_core::permissions;
use oa_core::status::{InstanceStatus, NodeKind, TaskAction, WorkflowTaskStatus};
use oa_core::types::DbId;
use oa_core::workflow::assignment::OrgDirectory;
use oa_core::workflow::runtime::{node_satisfied, successor_of_approval, FlowGraph};
use oa_db::models::workflow::{NewTask, WorkflowInstance, WorkflowTask};
use oa_db::org_directory::PgOrgDirectory;
use oa_db::repositories::{WorkflowInstanceRepo, WorkflowTaskRepo};
use serde::Serialize;
use sqlx::{PgConnection, PgPool};

use super::runtime::{advance, finish};
use super::{invalid_state, not_found, stale};
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;

/// The decided task and the instance as it stands afterwards.
#[derive(Debug, Serialize)]
pub struct HandleOutcome {
    pub task: WorkflowTask,
    pub instance: WorkflowInstance,
}

/// Lock the task's instance, then the task itself, and check that the task
/// is pending on the node the running instance is waiting at.
async fn lock_pending(
    conn: &mut PgConnection,
    task_id: DbId,
) -> AppResult<(WorkflowTask, WorkflowInstance)> {
    let task = WorkflowTaskRepo::find_by_id(&mut *conn, task_id)
        .await?
        .ok_or_else(|| not_found("WorkflowTask", task_id))?;
    let instance = WorkflowInstanceRepo::find_for_update(&mut *conn, task.instance_id)
        .await?
        .ok_or_else(|| not_found("WorkflowInstance", task.instance_id))?;
    let task = WorkflowTaskRepo::find_for_update(&mut *conn, task_id)
        .await?
        .ok_or_else(|| not_found("WorkflowTask", task_id))?;
    Ok((task, instance))
}

fn ensure_actionable(task: &WorkflowTask, instance: &WorkflowInstance) -> AppResult<()> {
    let task_status = WorkflowTaskStatus::parse(task.status)?;
    if task_status != WorkflowTaskStatus::Pending {
        return Err(invalid_state(format!("Task {} is {task_status}", task.id)));
    }
    let instance_status = InstanceStatus::parse(instance.status)?;
    if instance_status != InstanceStatus::Running {
        return Err(invalid_state(format!(
            "Instance {} is {instance_status}",
            instance.id
        )));
    }
    if task.node_code != instance.current_node_code {
        return Err(invalid_state(format!(
            "Task {} belongs to node '{}' but the instance is at '{}'",
            task.id, task.node_code, instance.current_node_code
        )));
    }
    Ok(())
}

async fn ensure_active_user(conn: &mut PgConnection, user_id: DbId) -> AppResult<()> {
    let mut directory = PgOrgDirectory::new(conn);
    if directory.active_users(&[user_id]).await?.is_empty() {
        return Err(AppError::Core(CoreError::Validation(format!(
            "User {user_id} does not exist or is inactive"
        ))));
    }
    Ok(())
}

pub async fn handle(
    pool: &PgPool,
    task_id: DbId,
    action: TaskAction,
    comment: Option<&str>,
    actor_id: DbId,
) -> AppResult<HandleOutcome> {
    let mut tx = pool.begin().await?;
    let outcome = handle_in_tx(&mut *tx, task_id, action, comment, actor_id).await?;
    tx.commit().await?;
    Ok(outcome)
}

/// Record the assignee's decision and move the instance on.
///
/// A rejection ends the instance as rejected and cancels every other
/// pending task. An approval advances the instance once the node's policy
/// is satisfied; under any-of the node's leftover tasks are cancelled.
pub async fn handle_in_tx(
    conn: &mut PgConnection,
    task_id: DbId,
    action: TaskAction,
    comment: Option<&str>,
    actor_id: DbId,
) -> AppResult<HandleOutcome> {
    if !matches!(action, TaskAction::Approve | TaskAction::Reject) {
        return Err(AppError::Core(CoreError::Validation(format!(
            "Invalid task action {}. Must be one of: 1=approve, 2=reject",
            action.id()
        ))));
    }

    let (task, instance) = lock_pending(conn, task_id).await?;
    // A transferred task no longer belongs to its original assignee.
    if task.assignee_id != actor_id
        || WorkflowTaskStatus::from_id(task.status) == Some(WorkflowTaskStatus::Transferred)
    {
        return Err(AppError::Core(CoreError::Forbidden(format!(
            "Task {task_id} is not assigned to you"
        ))));
    }
    ensure_actionable(&task, &instance)?;

    let task = WorkflowTaskRepo::complete(
        &mut *conn,
        task_id,
        WorkflowTaskStatus::Completed,
        action,
        comment,
    )
    .await?
    .ok_or_else(|| stale("WorkflowTask", task_id))?;

    tracing::info!(
        task_id,
        instance_id = instance.id,
        node = %task.node_code,
        actor_id,
        action = %action,
        "Task handled",
    );

    if action == TaskAction::Reject {
        let cancelled =
            WorkflowTaskRepo::cancel_pending_for_instance(&mut *conn, instance.id).await?;
        let instance = finish(
            conn,
            instance.id,
            &instance.current_node_code,
            InstanceStatus::Rejected,
        )
        .await?;
        tracing::info!(instance_id = instance.id, cancelled, "Instance rejected");
        return Ok(HandleOutcome { task, instance });
    }

    let node = FlowGraph::new(&instance.definition_snapshot.0.nodes)
        .node(&task.node_code)?
        .clone();
    let counts = WorkflowTaskRepo::node_counts(&mut *conn, instance.id, &node.code).await?;
    if !node_satisfied(node.policy, counts.approved, counts.pending) {
        tracing::debug!(
            instance_id = instance.id,
            node = %node.code,
            approved = counts.approved,
            pending = counts.pending,
            "Approval node still waiting",
        );
        return Ok(HandleOutcome { task, instance });
    }

    let leftover =
        WorkflowTaskRepo::cancel_pending_for_node(&mut *conn, instance.id, &node.code).await?;
    if leftover > 0 {
        tracing::info!(
            instance_id = instance.id,
            node = %node.code,
            leftover,
            "Cancelled remaining tasks on satisfied node",
        );
    }
    let next = successor_of_approval(&node)?;
    let instance = advance(conn, instance, next).await?;
    Ok(HandleOutcome { task, instance })
}

/// Hand a pending task to someone else.
///
/// The current assignee may transfer their own task; holders of
/// `workflow:task:transfer` may transfer anyone's. The old task is marked
/// transferred and a new pending task is created for the new assignee on
/// the same node.
pub async fn transfer(
    pool: &PgPool,
    task_id: DbId,
    new_assignee: DbId,
    actor: &AuthUser,
) -> AppResult<WorkflowTask> {
    let mut tx = pool.begin().await?;
    let (task, instance) = lock_pending(&mut *tx, task_id).await?;
    if task.assignee_id != actor.user_id {
        actor.require(permissions::WORKFLOW_TASK_TRANSFER)?;
    }
    ensure_actionable(&task, &instance)?;
    if new_assignee == task.assignee_id {
        return Err(AppError::Core(CoreError::Validation(
            "Task is already assigned to that user".to_string(),
        )));
    }
    ensure_active_user(&mut *tx, new_assignee).await?;

    WorkflowTaskRepo::complete(
        &mut *tx,
        task_id,
        WorkflowTaskStatus::Transferred,
        TaskAction::Transfer,
        None,
    )
    .await?
    .ok_or_else(|| stale("WorkflowTask", task_id))?;

    let created = WorkflowTaskRepo::insert(
        &mut *tx,
        &NewTask {
            instance_id: task.instance_id,
            node_code: task.node_code.clone(),
            node_name: task.node_name.clone(),
            assignee_id: new_assignee,
            transferred_from: Some(task.id),
        },
    )
    .await?;
    tx.commit().await?;

    tracing::info!(
        task_id,
        new_task_id = created.id,
        from = task.assignee_id,
        to = new_assignee,
        actor_id = actor.user_id,
        "Task transferred",
    );
    Ok(created)
}

/// Add an extra assignee to the approval node an instance is waiting at.
pub async fn add_assignee(
    pool: &PgPool,
    instance_id: DbId,
    assignee_id: DbId,
    actor_id: DbId,
) -> AppResult<WorkflowTask> {
    let mut tx = pool.begin().await?;
    let instance = WorkflowInstanceRepo::find_for_update(&mut *tx, instance_id)
        .await?
        .ok_or_else(|| not_found("WorkflowInstance", instance_id))?;
    let status = InstanceStatus::parse(instance.status)?;
    if status != InstanceStatus::Running {
        return Err(invalid_state(format!("Instance {instance_id} is {status}")));
    }
    let node = FlowGraph::new(&instance.definition_snapshot.0.nodes)
        .node(&instance.current_node_code)?
        .clone();
    if node.kind != NodeKind::Approval {
        return Err(invalid_state(format!(
            "Instance {instance_id} is not waiting at an approval node"
        )));
    }
    ensure_active_user(&mut *tx, assignee_id).await?;

    let task = WorkflowTaskRepo::insert(
        &mut *tx,
        &NewTask {
            instance_id,
            node_code: node.code.clone(),
            node_name: node.name.clone(),
            assignee_id,
            transferred_from: None,
        },
    )
    .await?;
    tx.commit().await?;

    tracing::info!(
        instance_id,
        task_id = task.id,
        node = %node.code,
        assignee_id,
        actor_id,
        "Assignee added to approval node",
    );
    Ok(task)
}

/// Edit the comment on a pending task; only its assignee may.
pub async fn update_comment(
    pool: &PgPool,
    task_id: DbId,
    actor_id: DbId,
    comment: &str,
) -> AppResult<WorkflowTask> {
    if let Some(task) = WorkflowTaskRepo::update_comment(pool, task_id, actor_id, comment).await? {
        return Ok(task);
    }
    let task = WorkflowTaskRepo::find_by_id(pool, task_id)
        .await?
        .ok_or_else(|| not_found("WorkflowTask", task_id))?;
    if task.assignee_id != actor_id {
        return Err(AppError::Core(CoreError::Forbidden(format!(
            "Task {task_id} is not assigned to you"
        ))));
    }
    Err(invalid_state(format!(
        "Task {task_id} is {} and can no longer be edited",
        WorkflowTaskStatus::parse(task.status)?
    )))
}

/// Soft-delete a finished task; pending tasks are refused.
pub async fn delete(pool: &PgPool, task_id: DbId) -> AppResult<()> {
    if WorkflowTaskRepo::soft_delete_terminal(pool, task_id).await? {
        return Ok(());
    }
    WorkflowTaskRepo::find_by_id(pool, task_id)
        .await?
        .ok_or_else(|| not_found("WorkflowTask", task_id))?;
    Err(AppError::Core(CoreError::Conflict(format!(
        "Task {task_id} is still pending and cannot be deleted"
    ))))
}
