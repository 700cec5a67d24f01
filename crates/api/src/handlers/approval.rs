//! Handlers for the `/approvals` resource.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use oa_core::permissions;
use oa_core::status::TaskAction;
use oa_core::types::DbId;
use oa_db::models::approval::{
    ApprovalFlow, ApprovalNode, ApprovalRecord, ApprovalType, CreateApprovalFlow,
    CreateApprovalNode, CreateApprovalRecord, CreateApprovalType, RecordFilter,
};
use oa_db::repositories::{ApprovalFlowRepo, ApprovalNodeRepo, ApprovalRecordRepo, ApprovalTypeRepo};
use serde::Deserialize;
use validator::Validate;

use crate::engine::approval::{self, RecordDetail};
use crate::engine;
use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::middleware::rbac::{ApprovalFlowManage, ApprovalRecordCreate, Require};
use crate::query::PageParams;
use crate::response::{DataResponse, PageResponse};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct FlowQuery {
    pub type_id: Option<DbId>,
}

#[derive(Debug, Deserialize)]
pub struct NodeQuery {
    pub flow_id: DbId,
}

/// Body of the approve and reject endpoints.
#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    pub node_id: DbId,
    pub comment: Option<String>,
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// GET /api/approvals/types
pub async fn list_types(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(page): Query<PageParams>,
) -> AppResult<Json<PageResponse<ApprovalType>>> {
    let (limit, offset) = page.limit_offset();
    let data = ApprovalTypeRepo::list(&state.pool, limit, offset).await?;
    let total = ApprovalTypeRepo::count(&state.pool).await?;
    Ok(Json(PageResponse { data, total }))
}

/// POST /api/approvals/types
pub async fn create_type(
    State(state): State<AppState>,
    Require(_user, _): Require<ApprovalFlowManage>,
    Json(input): Json<CreateApprovalType>,
) -> AppResult<(StatusCode, Json<ApprovalType>)> {
    input.validate()?;
    let created = ApprovalTypeRepo::create(&state.pool, &input).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

// ---------------------------------------------------------------------------
// Flows
// ---------------------------------------------------------------------------

/// GET /api/approvals/flows
pub async fn list_flows(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(filter): Query<FlowQuery>,
    Query(page): Query<PageParams>,
) -> AppResult<Json<PageResponse<ApprovalFlow>>> {
    let (limit, offset) = page.limit_offset();
    let data = ApprovalFlowRepo::list(&state.pool, filter.type_id, limit, offset).await?;
    let total = ApprovalFlowRepo::count(&state.pool, filter.type_id).await?;
    Ok(Json(PageResponse { data, total }))
}

/// POST /api/approvals/flows
pub async fn create_flow(
    State(state): State<AppState>,
    Require(user, _): Require<ApprovalFlowManage>,
    Json(input): Json<CreateApprovalFlow>,
) -> AppResult<(StatusCode, Json<ApprovalFlow>)> {
    input.validate()?;
    let flow = approval::create_flow(&state.pool, &input, user.user_id).await?;
    Ok((StatusCode::CREATED, Json(flow)))
}

/// GET /api/approvals/flows/{id}
pub async fn get_flow(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<DbId>,
) -> AppResult<Json<ApprovalFlow>> {
    let flow = ApprovalFlowRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| engine::not_found("ApprovalFlow", id))?;
    Ok(Json(flow))
}

/// PUT /api/approvals/flows/{id}/publish
///
/// Compiles the flow's nodes into a linear workflow definition and
/// publishes it.
pub async fn publish_flow(
    State(state): State<AppState>,
    Require(user, _): Require<ApprovalFlowManage>,
    Path(id): Path<DbId>,
) -> AppResult<Json<ApprovalFlow>> {
    Ok(Json(approval::publish_flow(&state.pool, id, user.user_id).await?))
}

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

/// GET /api/approvals/nodes?flow_id=
pub async fn list_nodes(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(query): Query<NodeQuery>,
) -> AppResult<Json<DataResponse<Vec<ApprovalNode>>>> {
    let nodes = ApprovalNodeRepo::list_for_flow(&state.pool, query.flow_id).await?;
    Ok(Json(DataResponse { data: nodes }))
}

/// POST /api/approvals/nodes
pub async fn create_node(
    State(state): State<AppState>,
    Require(_user, _): Require<ApprovalFlowManage>,
    Json(input): Json<CreateApprovalNode>,
) -> AppResult<(StatusCode, Json<ApprovalNode>)> {
    input.validate()?;
    let node = approval::add_node(&state.pool, &input).await?;
    Ok((StatusCode::CREATED, Json(node)))
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// GET /api/approvals/records
///
/// Without `approval:flow:manage` only the caller's own records are listed.
pub async fn list_records(
    State(state): State<AppState>,
    user: AuthUser,
    Query(mut filter): Query<RecordFilter>,
    Query(page): Query<PageParams>,
) -> AppResult<Json<PageResponse<ApprovalRecord>>> {
    if !user.has(permissions::APPROVAL_FLOW_MANAGE) {
        filter.applicant_id = Some(user.user_id);
    }
    let (limit, offset) = page.limit_offset();
    let data = ApprovalRecordRepo::list(&state.pool, &filter, limit, offset).await?;
    let total = ApprovalRecordRepo::count(&state.pool, &filter).await?;
    Ok(Json(PageResponse { data, total }))
}

/// POST /api/approvals/records
pub async fn create_record(
    State(state): State<AppState>,
    Require(user, _): Require<ApprovalRecordCreate>,
    Json(input): Json<CreateApprovalRecord>,
) -> AppResult<(StatusCode, Json<ApprovalRecord>)> {
    input.validate()?;
    let record = approval::create_record(&state.pool, &input, user.user_id).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /api/approvals/records/{id}
pub async fn get_record(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<DbId>,
) -> AppResult<Json<RecordDetail>> {
    Ok(Json(approval::record_detail(&state.pool, id, &user).await?))
}

/// PUT /api/approvals/records/{id}/approve
pub async fn approve_record(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<DbId>,
    Json(input): Json<DecisionRequest>,
) -> AppResult<Json<ApprovalRecord>> {
    decide(&state, &user, id, input, TaskAction::Approve).await
}

/// PUT /api/approvals/records/{id}/reject
pub async fn reject_record(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<DbId>,
    Json(input): Json<DecisionRequest>,
) -> AppResult<Json<ApprovalRecord>> {
    decide(&state, &user, id, input, TaskAction::Reject).await
}

async fn decide(
    state: &AppState,
    user: &AuthUser,
    record_id: DbId,
    input: DecisionRequest,
    action: TaskAction,
) -> AppResult<Json<ApprovalRecord>> {
    let record = approval::decide(
        &state.pool,
        record_id,
        input.node_id,
        user.user_id,
        action,
        input.comment.as_deref(),
    )
    .await?;
    Ok(Json(record))
}

/// GET /api/approvals/pending
///
/// Records waiting on a decision from the caller.
pub async fn pending(
    State(state): State<AppState>,
    user: AuthUser,
    Query(page): Query<PageParams>,
) -> AppResult<Json<PageResponse<ApprovalRecord>>> {
    let (limit, offset) = page.limit_offset();
    let data =
        ApprovalRecordRepo::list_pending_for_user(&state.pool, user.user_id, limit, offset).await?;
    let total = ApprovalRecordRepo::count_pending_for_user(&state.pool, user.user_id).await?;
    Ok(Json(PageResponse { data, total }))
}
