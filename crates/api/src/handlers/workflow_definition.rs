//! Handlers for workflow types, definitions and their nodes.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use oa_core::error::CoreError;
use oa_core::status::WorkflowTypeStatus;
use oa_core::types::DbId;
use oa_db::models::workflow::{
    CreateWorkflowDefinition, CreateWorkflowNode, CreateWorkflowType, DefinitionFilter,
    UpdateWorkflowDefinition, UpdateWorkflowNode, UpdateWorkflowType, WorkflowDefinition,
    WorkflowNode, WorkflowType,
};
use oa_db::repositories::{WorkflowDefinitionRepo, WorkflowNodeRepo, WorkflowTypeRepo};
use serde::Deserialize;
use validator::Validate;

use crate::engine::{self, definitions};
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::middleware::rbac::{
    Require, WorkflowDefinitionManage, WorkflowDefinitionPublish, WorkflowTypeManage,
};
use crate::query::PageParams;
use crate::response::{DataResponse, PageResponse};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct TypeFilter {
    pub status: Option<i16>,
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// GET /api/workflows/types
pub async fn list_types(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(filter): Query<TypeFilter>,
    Query(page): Query<PageParams>,
) -> AppResult<Json<PageResponse<WorkflowType>>> {
    if let Some(status) = filter.status {
        WorkflowTypeStatus::parse(status)?;
    }
    let (limit, offset) = page.limit_offset();
    let data = WorkflowTypeRepo::list(&state.pool, filter.status, limit, offset).await?;
    let total = WorkflowTypeRepo::count(&state.pool, filter.status).await?;
    Ok(Json(PageResponse { data, total }))
}

/// POST /api/workflows/types
pub async fn create_type(
    State(state): State<AppState>,
    Require(user, _): Require<WorkflowTypeManage>,
    Json(input): Json<CreateWorkflowType>,
) -> AppResult<(StatusCode, Json<WorkflowType>)> {
    input.validate()?;
    let status = match input.status {
        Some(id) => WorkflowTypeStatus::parse(id)?,
        None => WorkflowTypeStatus::Enabled,
    };
    let wf_type =
        WorkflowTypeRepo::create(&state.pool, &input, status.id(), Some(user.user_id)).await?;
    Ok((StatusCode::CREATED, Json(wf_type)))
}

/// GET /api/workflows/types/{id}
pub async fn get_type(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<DbId>,
) -> AppResult<Json<WorkflowType>> {
    let wf_type = WorkflowTypeRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| engine::not_found("WorkflowType", id))?;
    Ok(Json(wf_type))
}

/// PUT /api/workflows/types/{id}
pub async fn update_type(
    State(state): State<AppState>,
    Require(_user, _): Require<WorkflowTypeManage>,
    Path(id): Path<DbId>,
    Json(input): Json<UpdateWorkflowType>,
) -> AppResult<Json<WorkflowType>> {
    input.validate()?;
    if let Some(status) = input.status {
        WorkflowTypeStatus::parse(status)?;
    }
    if let Some(updated) = WorkflowTypeRepo::update(&state.pool, id, &input).await? {
        return Ok(Json(updated));
    }
    WorkflowTypeRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| engine::not_found("WorkflowType", id))?;
    Err(engine::stale("WorkflowType", id))
}

/// DELETE /api/workflows/types/{id}
///
/// Refused while any definition still references the type.
pub async fn delete_type(
    State(state): State<AppState>,
    Require(_user, _): Require<WorkflowTypeManage>,
    Path(id): Path<DbId>,
) -> AppResult<StatusCode> {
    if WorkflowTypeRepo::has_definitions(&state.pool, id).await? {
        return Err(AppError::Core(CoreError::Conflict(format!(
            "Workflow type {id} still has definitions"
        ))));
    }
    if !WorkflowTypeRepo::soft_delete(&state.pool, id).await? {
        return Err(engine::not_found("WorkflowType", id));
    }
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Definitions
// ---------------------------------------------------------------------------

/// GET /api/workflows/definitions
pub async fn list_definitions(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(filter): Query<DefinitionFilter>,
    Query(page): Query<PageParams>,
) -> AppResult<Json<PageResponse<WorkflowDefinition>>> {
    let (limit, offset) = page.limit_offset();
    let data = WorkflowDefinitionRepo::list(&state.pool, &filter, limit, offset).await?;
    let total = WorkflowDefinitionRepo::count(&state.pool, &filter).await?;
    Ok(Json(PageResponse { data, total }))
}

/// POST /api/workflows/definitions
///
/// A name already used under the type gets the next version number.
pub async fn create_definition(
    State(state): State<AppState>,
    Require(user, _): Require<WorkflowDefinitionManage>,
    Json(input): Json<CreateWorkflowDefinition>,
) -> AppResult<(StatusCode, Json<WorkflowDefinition>)> {
    input.validate()?;
    let def = definitions::create_definition(
        &state.pool,
        input.type_id,
        &input.name,
        input.description.as_deref(),
        user.user_id,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(def)))
}

/// GET /api/workflows/definitions/{id}
pub async fn get_definition(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<DbId>,
) -> AppResult<Json<WorkflowDefinition>> {
    let def = WorkflowDefinitionRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| engine::not_found("WorkflowDefinition", id))?;
    Ok(Json(def))
}

/// PUT /api/workflows/definitions/{id}
pub async fn update_definition(
    State(state): State<AppState>,
    Require(_user, _): Require<WorkflowDefinitionManage>,
    Path(id): Path<DbId>,
    Json(input): Json<UpdateWorkflowDefinition>,
) -> AppResult<Json<WorkflowDefinition>> {
    input.validate()?;
    Ok(Json(definitions::update_definition(&state.pool, id, &input).await?))
}

/// DELETE /api/workflows/definitions/{id}
pub async fn delete_definition(
    State(state): State<AppState>,
    Require(_user, _): Require<WorkflowDefinitionManage>,
    Path(id): Path<DbId>,
) -> AppResult<StatusCode> {
    definitions::delete_definition(&state.pool, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/workflows/definitions/{id}/publish
pub async fn publish_definition(
    State(state): State<AppState>,
    Require(_user, _): Require<WorkflowDefinitionPublish>,
    Path(id): Path<DbId>,
) -> AppResult<Json<WorkflowDefinition>> {
    Ok(Json(definitions::publish(&state.pool, id).await?))
}

/// PUT /api/workflows/definitions/{id}/disable
pub async fn disable_definition(
    State(state): State<AppState>,
    Require(_user, _): Require<WorkflowDefinitionPublish>,
    Path(id): Path<DbId>,
) -> AppResult<Json<WorkflowDefinition>> {
    Ok(Json(definitions::disable(&state.pool, id).await?))
}

/// POST /api/workflows/definitions/{id}/versions
pub async fn new_version(
    State(state): State<AppState>,
    Require(user, _): Require<WorkflowDefinitionManage>,
    Path(id): Path<DbId>,
) -> AppResult<(StatusCode, Json<WorkflowDefinition>)> {
    let draft = definitions::new_version(&state.pool, id, user.user_id).await?;
    Ok((StatusCode::CREATED, Json(draft)))
}

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

/// GET /api/workflows/definitions/{id}/nodes
pub async fn list_nodes(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(definition_id): Path<DbId>,
) -> AppResult<Json<DataResponse<Vec<WorkflowNode>>>> {
    WorkflowDefinitionRepo::find_by_id(&state.pool, definition_id)
        .await?
        .ok_or_else(|| engine::not_found("WorkflowDefinition", definition_id))?;
    let nodes = WorkflowNodeRepo::list_for_definition(&state.pool, definition_id).await?;
    Ok(Json(DataResponse { data: nodes }))
}

/// POST /api/workflows/nodes
pub async fn create_node(
    State(state): State<AppState>,
    Require(_user, _): Require<WorkflowDefinitionManage>,
    Json(input): Json<CreateWorkflowNode>,
) -> AppResult<(StatusCode, Json<WorkflowNode>)> {
    input.validate()?;
    let node = definitions::add_node(&state.pool, &input).await?;
    Ok((StatusCode::CREATED, Json(node)))
}

/// GET /api/workflows/nodes/{id}
pub async fn get_node(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<DbId>,
) -> AppResult<Json<WorkflowNode>> {
    let node = WorkflowNodeRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| engine::not_found("WorkflowNode", id))?;
    Ok(Json(node))
}

/// PUT /api/workflows/nodes/{id}
pub async fn update_node(
    State(state): State<AppState>,
    Require(_user, _): Require<WorkflowDefinitionManage>,
    Path(id): Path<DbId>,
    Json(input): Json<UpdateWorkflowNode>,
) -> AppResult<Json<WorkflowNode>> {
    input.validate()?;
    Ok(Json(definitions::update_node(&state.pool, id, &input).await?))
}

/// DELETE /api/workflows/nodes/{id}
pub async fn delete_node(
    State(state): State<AppState>,
    Require(_user, _): Require<WorkflowDefinitionManage>,
    Path(id): Path<DbId>,
) -> AppResult<StatusCode> {
    definitions::delete_node(&state.pool, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
