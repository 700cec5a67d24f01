//! Handlers for the `/meeting` resource: rooms, reservations, maintenance
//! windows and minutes.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use oa_core::status::{MaintenanceStatus, RoomStatus};
use oa_core::types::DbId;
use oa_db::models::meeting::{
    CreateMaintenance, CreateMeetingRoom, CreateMinutes, CreateReservation, MeetingMinutes,
    MeetingReservation, MeetingRoom, ReservationFilter, RoomMaintenance, UpdateMeetingRoom,
    UpdateMinutes,
};
use oa_db::repositories::{MaintenanceRepo, MeetingRoomRepo, MinutesRepo, ReservationRepo};
use serde::Deserialize;
use validator::Validate;

use crate::engine::{self, meeting};
use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::middleware::rbac::{
    MeetingMaintenanceManage, MeetingMinutesWrite, MeetingReservationApprove,
    MeetingReservationCreate, MeetingRoomCreate, MeetingRoomDelete, MeetingRoomUpdate, Require,
};
use crate::query::PageParams;
use crate::response::PageResponse;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct RoomQuery {
    pub status: Option<i16>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MaintenanceQuery {
    pub room_id: Option<DbId>,
    pub status: Option<i16>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MinutesQuery {
    pub reservation_id: Option<DbId>,
}

/// Body of reject and cancel; `{}` when no reason is given.
#[derive(Debug, Default, Deserialize)]
pub struct ReasonRequest {
    pub reason: Option<String>,
}

// ---------------------------------------------------------------------------
// Rooms
// ---------------------------------------------------------------------------

/// GET /api/meeting/rooms
pub async fn list_rooms(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(filter): Query<RoomQuery>,
    Query(page): Query<PageParams>,
) -> AppResult<Json<PageResponse<MeetingRoom>>> {
    if let Some(status) = filter.status {
        RoomStatus::parse(status)?;
    }
    let (limit, offset) = page.limit_offset();
    let data = MeetingRoomRepo::list(&state.pool, filter.status, limit, offset).await?;
    let total = MeetingRoomRepo::count(&state.pool, filter.status).await?;
    Ok(Json(PageResponse { data, total }))
}

/// POST /api/meeting/rooms
pub async fn create_room(
    State(state): State<AppState>,
    Require(user, _): Require<MeetingRoomCreate>,
    Json(input): Json<CreateMeetingRoom>,
) -> AppResult<(StatusCode, Json<MeetingRoom>)> {
    input.validate()?;
    let room = MeetingRoomRepo::create(&state.pool, &input).await?;
    tracing::info!(room_id = room.id, created_by = user.user_id, "Meeting room created");
    Ok((StatusCode::CREATED, Json(room)))
}

/// GET /api/meeting/rooms/{id}
pub async fn get_room(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<DbId>,
) -> AppResult<Json<MeetingRoom>> {
    let room = MeetingRoomRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| engine::not_found("MeetingRoom", id))?;
    Ok(Json(room))
}

/// PUT /api/meeting/rooms/{id}
pub async fn update_room(
    State(state): State<AppState>,
    Require(_user, _): Require<MeetingRoomUpdate>,
    Path(id): Path<DbId>,
    Json(input): Json<UpdateMeetingRoom>,
) -> AppResult<Json<MeetingRoom>> {
    input.validate()?;
    Ok(Json(meeting::update_room(&state.pool, id, &input).await?))
}

/// DELETE /api/meeting/rooms/{id}
pub async fn delete_room(
    State(state): State<AppState>,
    Require(_user, _): Require<MeetingRoomDelete>,
    Path(id): Path<DbId>,
) -> AppResult<StatusCode> {
    meeting::delete_room(&state.pool, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Reservations
// ---------------------------------------------------------------------------

/// GET /api/meeting/reservations
///
/// Filters: `room_id`, `organizer_id`, `status`, and a `from`/`to` window.
pub async fn list_reservations(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(filter): Query<ReservationFilter>,
    Query(page): Query<PageParams>,
) -> AppResult<Json<PageResponse<MeetingReservation>>> {
    let (limit, offset) = page.limit_offset();
    let data = ReservationRepo::list(&state.pool, &filter, limit, offset).await?;
    let total = ReservationRepo::count(&state.pool, &filter).await?;
    Ok(Json(PageResponse { data, total }))
}

/// POST /api/meeting/reservations
pub async fn create_reservation(
    State(state): State<AppState>,
    Require(user, _): Require<MeetingReservationCreate>,
    Json(input): Json<CreateReservation>,
) -> AppResult<(StatusCode, Json<MeetingReservation>)> {
    input.validate()?;
    let reservation =
        meeting::create_reservation(&state.pool, &input, user.user_id, &state.config.meeting)
            .await?;
    Ok((StatusCode::CREATED, Json(reservation)))
}

/// GET /api/meeting/reservations/{id}
pub async fn get_reservation(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<DbId>,
) -> AppResult<Json<MeetingReservation>> {
    let reservation = ReservationRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| engine::not_found("MeetingReservation", id))?;
    Ok(Json(reservation))
}

/// PUT /api/meeting/reservations/{id}/approve
pub async fn approve_reservation(
    State(state): State<AppState>,
    Require(user, _): Require<MeetingReservationApprove>,
    Path(id): Path<DbId>,
) -> AppResult<Json<MeetingReservation>> {
    Ok(Json(meeting::approve(&state.pool, id, user.user_id).await?))
}

/// PUT /api/meeting/reservations/{id}/reject
pub async fn reject_reservation(
    State(state): State<AppState>,
    Require(user, _): Require<MeetingReservationApprove>,
    Path(id): Path<DbId>,
    Json(input): Json<ReasonRequest>,
) -> AppResult<Json<MeetingReservation>> {
    Ok(Json(
        meeting::reject(&state.pool, id, user.user_id, input.reason.as_deref()).await?,
    ))
}

/// PUT /api/meeting/reservations/{id}/cancel
pub async fn cancel_reservation(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<DbId>,
    Json(input): Json<ReasonRequest>,
) -> AppResult<Json<MeetingReservation>> {
    Ok(Json(
        meeting::cancel(&state.pool, id, &user, input.reason.as_deref()).await?,
    ))
}

/// PUT /api/meeting/reservations/{id}/check-in
pub async fn check_in(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<DbId>,
) -> AppResult<Json<MeetingReservation>> {
    let reservation =
        meeting::check_in(&state.pool, id, user.user_id, Utc::now(), &state.config.meeting)
            .await?;
    Ok(Json(reservation))
}

/// PUT /api/meeting/reservations/{id}/check-out
pub async fn check_out(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<DbId>,
) -> AppResult<Json<MeetingReservation>> {
    Ok(Json(meeting::check_out(&state.pool, id, user.user_id).await?))
}

// ---------------------------------------------------------------------------
// Maintenance
// ---------------------------------------------------------------------------

/// GET /api/meeting/maintenance
pub async fn list_maintenance(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(filter): Query<MaintenanceQuery>,
    Query(page): Query<PageParams>,
) -> AppResult<Json<PageResponse<RoomMaintenance>>> {
    if let Some(status) = filter.status {
        MaintenanceStatus::parse(status)?;
    }
    let (limit, offset) = page.limit_offset();
    let data =
        MaintenanceRepo::list(&state.pool, filter.room_id, filter.status, limit, offset).await?;
    let total = MaintenanceRepo::count(&state.pool, filter.room_id, filter.status).await?;
    Ok(Json(PageResponse { data, total }))
}

/// POST /api/meeting/maintenance
pub async fn create_maintenance(
    State(state): State<AppState>,
    Require(user, _): Require<MeetingMaintenanceManage>,
    Json(input): Json<CreateMaintenance>,
) -> AppResult<(StatusCode, Json<RoomMaintenance>)> {
    input.validate()?;
    let window = meeting::create_maintenance(&state.pool, &input, user.user_id).await?;
    Ok((StatusCode::CREATED, Json(window)))
}

/// GET /api/meeting/maintenance/{id}
pub async fn get_maintenance(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<DbId>,
) -> AppResult<Json<RoomMaintenance>> {
    let window = MaintenanceRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| engine::not_found("RoomMaintenance", id))?;
    Ok(Json(window))
}

/// PUT /api/meeting/maintenance/{id}/start
pub async fn start_maintenance(
    State(state): State<AppState>,
    Require(_user, _): Require<MeetingMaintenanceManage>,
    Path(id): Path<DbId>,
) -> AppResult<Json<RoomMaintenance>> {
    Ok(Json(meeting::start_maintenance(&state.pool, id).await?))
}

/// PUT /api/meeting/maintenance/{id}/complete
pub async fn complete_maintenance(
    State(state): State<AppState>,
    Require(_user, _): Require<MeetingMaintenanceManage>,
    Path(id): Path<DbId>,
) -> AppResult<Json<RoomMaintenance>> {
    Ok(Json(meeting::complete_maintenance(&state.pool, id).await?))
}

// ---------------------------------------------------------------------------
// Minutes
// ---------------------------------------------------------------------------

/// GET /api/meeting/minutes
pub async fn list_minutes(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(filter): Query<MinutesQuery>,
    Query(page): Query<PageParams>,
) -> AppResult<Json<PageResponse<MeetingMinutes>>> {
    let (limit, offset) = page.limit_offset();
    let data = MinutesRepo::list(&state.pool, filter.reservation_id, limit, offset).await?;
    let total = MinutesRepo::count(&state.pool, filter.reservation_id).await?;
    Ok(Json(PageResponse { data, total }))
}

/// POST /api/meeting/minutes
pub async fn create_minutes(
    State(state): State<AppState>,
    Require(user, _): Require<MeetingMinutesWrite>,
    Json(input): Json<CreateMinutes>,
) -> AppResult<(StatusCode, Json<MeetingMinutes>)> {
    input.validate()?;
    let minutes = meeting::create_minutes(&state.pool, &input, user.user_id).await?;
    Ok((StatusCode::CREATED, Json(minutes)))
}

/// GET /api/meeting/minutes/{id}
pub async fn get_minutes(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<DbId>,
) -> AppResult<Json<MeetingMinutes>> {
    let minutes = MinutesRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| engine::not_found("MeetingMinutes", id))?;
    Ok(Json(minutes))
}

/// PUT /api/meeting/minutes/{id}
pub async fn update_minutes(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<DbId>,
    Json(input): Json<UpdateMinutes>,
) -> AppResult<Json<MeetingMinutes>> {
    input.validate()?;
    Ok(Json(
        meeting::update_minutes(&state.pool, id, &input, user.user_id).await?,
    ))
}

/// DELETE /api/meeting/minutes/{id}
pub async fn delete_minutes(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<DbId>,
) -> AppResult<StatusCode> {
    meeting::delete_minutes(&state.pool, id, user.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
