//! Handlers for workflow instances and tasks.
//!
//! Listing is scoped: callers without `workflow:instance:view` only see
//! instances they initiated or hold a task on, and only their own tasks.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use oa_core::error::CoreError;
use oa_core::permissions;
use oa_core::status::TaskAction;
use oa_core::types::DbId;
use oa_db::models::workflow::{InstanceFilter, TaskFilter, WorkflowInstance, WorkflowTask};
use oa_db::repositories::{WorkflowInstanceRepo, WorkflowTaskRepo};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::engine::dispatcher::{self, HandleOutcome};
use crate::engine::{self, runtime};
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::middleware::rbac::{Require, WorkflowInstanceStart, WorkflowTaskCreate};
use crate::query::PageParams;
use crate::response::{DataResponse, PageResponse};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct StartInstanceRequest {
    pub definition_id: DbId,
    pub business_key: Option<String>,
    #[serde(default)]
    pub variables: Map<String, Value>,
}

/// Body of `PUT /workflows/instances/{id}`.
#[derive(Debug, Deserialize)]
pub struct UpdateInstanceRequest {
    pub business_key: Option<String>,
    pub variables: Option<Map<String, Value>>,
    pub version: i32,
}

/// Body of `POST /workflows/tasks`: add an assignee to the node the
/// instance is waiting at.
#[derive(Debug, Deserialize)]
pub struct AddAssigneeRequest {
    pub instance_id: DbId,
    pub assignee_id: DbId,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTaskRequest {
    pub comment: String,
}

/// `action` is the wire id: 1 approve, 2 reject.
#[derive(Debug, Deserialize)]
pub struct HandleTaskRequest {
    pub action: i16,
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TransferTaskRequest {
    pub assignee_id: DbId,
}

// ---------------------------------------------------------------------------
// Instances
// ---------------------------------------------------------------------------

/// GET /api/workflows/instances
pub async fn list_instances(
    State(state): State<AppState>,
    user: AuthUser,
    Query(filter): Query<InstanceFilter>,
    Query(page): Query<PageParams>,
) -> AppResult<Json<PageResponse<WorkflowInstance>>> {
    let visible_to = runtime::visibility(&user);
    let (limit, offset) = page.limit_offset();
    let data = WorkflowInstanceRepo::list(&state.pool, &filter, visible_to, limit, offset).await?;
    let total = WorkflowInstanceRepo::count(&state.pool, &filter, visible_to).await?;
    Ok(Json(PageResponse { data, total }))
}

/// POST /api/workflows/instances
pub async fn start_instance(
    State(state): State<AppState>,
    Require(user, _): Require<WorkflowInstanceStart>,
    Json(input): Json<StartInstanceRequest>,
) -> AppResult<(StatusCode, Json<WorkflowInstance>)> {
    let instance = runtime::start(
        &state.pool,
        input.definition_id,
        user.user_id,
        input.business_key,
        input.variables,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(instance)))
}

/// GET /api/workflows/instances/{id}
pub async fn get_instance(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<DbId>,
) -> AppResult<Json<WorkflowInstance>> {
    Ok(Json(runtime::visible_instance(&state.pool, id, &user).await?))
}

/// PUT /api/workflows/instances/{id}
pub async fn update_instance(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<DbId>,
    Json(input): Json<UpdateInstanceRequest>,
) -> AppResult<Json<WorkflowInstance>> {
    let instance = runtime::update_data(
        &state.pool,
        id,
        &user,
        input.version,
        input.business_key.as_deref(),
        input.variables.as_ref(),
    )
    .await?;
    Ok(Json(instance))
}

/// DELETE /api/workflows/instances/{id}
pub async fn delete_instance(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<DbId>,
) -> AppResult<StatusCode> {
    user.require(permissions::WORKFLOW_INSTANCE_CANCEL)?;
    runtime::delete(&state.pool, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/workflows/instances/{id}/cancel
pub async fn cancel_instance(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<DbId>,
) -> AppResult<Json<WorkflowInstance>> {
    Ok(Json(runtime::cancel(&state.pool, id, &user).await?))
}

/// GET /api/workflows/instances/{id}/tasks
///
/// Full task history in creation order.
pub async fn instance_tasks(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Vec<WorkflowTask>>>> {
    let tasks = runtime::task_history(&state.pool, id, &user).await?;
    Ok(Json(DataResponse { data: tasks }))
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// GET /api/workflows/tasks
pub async fn list_tasks(
    State(state): State<AppState>,
    user: AuthUser,
    Query(mut filter): Query<TaskFilter>,
    Query(page): Query<PageParams>,
) -> AppResult<Json<PageResponse<WorkflowTask>>> {
    if let Some(own) = runtime::visibility(&user) {
        filter.assignee_id = Some(own);
    }
    let (limit, offset) = page.limit_offset();
    let data = WorkflowTaskRepo::list(&state.pool, &filter, limit, offset).await?;
    let total = WorkflowTaskRepo::count(&state.pool, &filter).await?;
    Ok(Json(PageResponse { data, total }))
}

/// GET /api/workflows/tasks/mine
///
/// The caller's pending tasks.
pub async fn my_tasks(
    State(state): State<AppState>,
    user: AuthUser,
    Query(page): Query<PageParams>,
) -> AppResult<Json<PageResponse<WorkflowTask>>> {
    let filter = TaskFilter {
        assignee_id: Some(user.user_id),
        instance_id: None,
        status: Some(oa_core::status::WorkflowTaskStatus::Pending.id()),
    };
    let (limit, offset) = page.limit_offset();
    let data = WorkflowTaskRepo::list(&state.pool, &filter, limit, offset).await?;
    let total = WorkflowTaskRepo::count(&state.pool, &filter).await?;
    Ok(Json(PageResponse { data, total }))
}

/// POST /api/workflows/tasks
pub async fn add_assignee(
    State(state): State<AppState>,
    Require(user, _): Require<WorkflowTaskCreate>,
    Json(input): Json<AddAssigneeRequest>,
) -> AppResult<(StatusCode, Json<WorkflowTask>)> {
    let task = dispatcher::add_assignee(
        &state.pool,
        input.instance_id,
        input.assignee_id,
        user.user_id,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(task)))
}

/// GET /api/workflows/tasks/{id}
pub async fn get_task(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<DbId>,
) -> AppResult<Json<WorkflowTask>> {
    let task = WorkflowTaskRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| engine::not_found("WorkflowTask", id))?;
    if task.assignee_id != user.user_id {
        runtime::visible_instance(&state.pool, task.instance_id, &user).await?;
    }
    Ok(Json(task))
}

/// PUT /api/workflows/tasks/{id}
pub async fn update_task(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<DbId>,
    Json(input): Json<UpdateTaskRequest>,
) -> AppResult<Json<WorkflowTask>> {
    let task = dispatcher::update_comment(&state.pool, id, user.user_id, &input.comment).await?;
    Ok(Json(task))
}

/// DELETE /api/workflows/tasks/{id}
pub async fn delete_task(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<DbId>,
) -> AppResult<StatusCode> {
    user.require(permissions::WORKFLOW_INSTANCE_CANCEL)?;
    dispatcher::delete(&state.pool, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/workflows/tasks/{id}/handle
pub async fn handle_task(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<DbId>,
    Json(input): Json<HandleTaskRequest>,
) -> AppResult<Json<HandleOutcome>> {
    let action = TaskAction::parse(input.action)?;
    if !matches!(action, TaskAction::Approve | TaskAction::Reject) {
        return Err(AppError::Core(CoreError::Validation(format!(
            "action must be 1 (approve) or 2 (reject), got {}",
            input.action
        ))));
    }
    let outcome = dispatcher::handle(
        &state.pool,
        id,
        action,
        input.comment.as_deref(),
        user.user_id,
    )
    .await?;
    Ok(Json(outcome))
}

/// PUT /api/workflows/tasks/{id}/transfer
pub async fn transfer_task(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<DbId>,
    Json(input): Json<TransferTaskRequest>,
) -> AppResult<Json<WorkflowTask>> {
    let task = dispatcher::transfer(&state.pool, id, input.assignee_id, &user).await?;
    Ok(Json(task))
}
