//! Meeting room booking and maintenance.
//!
//! Anything that can make a room's time slot occupied (approving a
//! reservation, starting maintenance) locks the room row first and only
//! then runs the overlap queries, so two such transactions on one room
//! serialize and the no-overlap invariant holds.

use oa_core::error::CoreError;
use oa_core::meeting::{
    ensure_room_bookable, maintenance_transition, reservation_transition, validate_check_in_window,
    validate_time_range, validate_title, ReservationEvent,
};
use oa_core::permissions;
use oa_core::status::{MaintenanceStatus, ReservationStatus, RoomStatus};
use oa_core::types::{DbId, Timestamp};
use oa_db::models::meeting::{
    CreateMaintenance, CreateMinutes, CreateReservation, MeetingMinutes, MeetingReservation,
    MeetingRoom, RoomMaintenance, UpdateMeetingRoom, UpdateMinutes,
};
use oa_db::repositories::{MaintenanceRepo, MeetingRoomRepo, MinutesRepo, ReservationRepo};
use sqlx::{PgConnection, PgPool};

use super::{not_found, stale};
use crate::config::MeetingConfig;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;

fn conflict(msg: String) -> AppError {
    AppError::Core(CoreError::Conflict(msg))
}

fn forbidden(msg: &str) -> AppError {
    AppError::Core(CoreError::Forbidden(msg.to_string()))
}

fn reservation_status(r: &MeetingReservation) -> AppResult<ReservationStatus> {
    Ok(ReservationStatus::parse(r.status)?)
}

/// Refuse a booking of `[start_at, end_at)` unless the room is available,
/// no approved or checked-in reservation overlaps it, and no maintenance
/// window in progress overlaps it. The caller holds the room lock.
async fn ensure_slot_free(
    conn: &mut PgConnection,
    room: &MeetingRoom,
    start_at: Timestamp,
    end_at: Timestamp,
    exclude_reservation: Option<DbId>,
) -> AppResult<()> {
    ensure_room_bookable(RoomStatus::parse(room.status)?)?;
    let overlapping = ReservationRepo::find_occupying_overlap(
        &mut *conn,
        room.id,
        start_at,
        end_at,
        exclude_reservation,
    )
    .await?;
    if let Some(other) = overlapping {
        return Err(conflict(format!(
            "Room {} is already booked from {} to {} by reservation {}",
            room.id,
            other.start_at.to_rfc3339(),
            other.end_at.to_rfc3339(),
            other.id
        )));
    }
    if let Some(window) =
        MaintenanceRepo::find_in_progress_overlap(&mut *conn, room.id, start_at, end_at).await?
    {
        return Err(conflict(format!(
            "Room {} is under maintenance until {} (maintenance {})",
            room.id,
            window.end_at.to_rfc3339(),
            window.id
        )));
    }
    Ok(())
}

async fn lock_room(conn: &mut PgConnection, room_id: DbId) -> AppResult<MeetingRoom> {
    MeetingRoomRepo::find_for_update(&mut *conn, room_id)
        .await?
        .ok_or_else(|| not_found("MeetingRoom", room_id))
}

// ---------------------------------------------------------------------------
// Rooms
// ---------------------------------------------------------------------------

pub async fn update_room(
    pool: &PgPool,
    id: DbId,
    input: &UpdateMeetingRoom,
) -> AppResult<MeetingRoom> {
    if let Some(status) = input.status {
        RoomStatus::parse(status)?;
    }
    if let Some(room) = MeetingRoomRepo::update(pool, id, input).await? {
        tracing::info!(room_id = id, version = room.version, "Meeting room updated");
        return Ok(room);
    }
    MeetingRoomRepo::find_by_id(pool, id)
        .await?
        .ok_or_else(|| not_found("MeetingRoom", id))?;
    Err(stale("MeetingRoom", id))
}

/// Soft-delete a room that has no pending or upcoming bookings.
pub async fn delete_room(pool: &PgPool, id: DbId) -> AppResult<()> {
    let mut tx = pool.begin().await?;
    lock_room(&mut *tx, id).await?;
    if MeetingRoomRepo::has_open_reservations(&mut *tx, id).await? {
        return Err(conflict(format!(
            "Room {id} still has pending or upcoming reservations"
        )));
    }
    MeetingRoomRepo::soft_delete(&mut *tx, id).await?;
    tx.commit().await?;
    tracing::info!(room_id = id, "Meeting room deleted");
    Ok(())
}

// ---------------------------------------------------------------------------
// Reservations
// ---------------------------------------------------------------------------

/// Book a room. The reservation starts pending, or approved straight away
/// when auto-approval is configured (running the same conflict check as
/// [`approve`]).
pub async fn create_reservation(
    pool: &PgPool,
    input: &CreateReservation,
    organizer_id: DbId,
    config: &MeetingConfig,
) -> AppResult<MeetingReservation> {
    validate_title(&input.title)?;
    validate_time_range(input.start_at, input.end_at)?;

    let mut tx = pool.begin().await?;
    let status = if config.auto_approve {
        let room = lock_room(&mut *tx, input.room_id).await?;
        ensure_slot_free(&mut *tx, &room, input.start_at, input.end_at, None).await?;
        ReservationStatus::Approved
    } else {
        let room = MeetingRoomRepo::find_by_id(&mut *tx, input.room_id)
            .await?
            .ok_or_else(|| not_found("MeetingRoom", input.room_id))?;
        // A maintaining room still takes requests; approval runs the slot check.
        if RoomStatus::parse(room.status)? == RoomStatus::Disabled {
            return Err(conflict(format!("Room {} is disabled", room.id)));
        }
        ReservationStatus::Pending
    };
    let reservation = ReservationRepo::insert(&mut *tx, input, organizer_id, status).await?;
    tx.commit().await?;

    tracing::info!(
        reservation_id = reservation.id,
        room_id = reservation.room_id,
        organizer_id,
        status = %status,
        "Reservation created",
    );
    Ok(reservation)
}

pub async fn approve(
    pool: &PgPool,
    id: DbId,
    approver_id: DbId,
) -> AppResult<MeetingReservation> {
    let mut tx = pool.begin().await?;
    let current = ReservationRepo::find_by_id(&mut *tx, id)
        .await?
        .ok_or_else(|| not_found("MeetingReservation", id))?;
    reservation_transition(reservation_status(&current)?, ReservationEvent::Approve)?;

    let room = lock_room(&mut *tx, current.room_id).await?;
    // Re-read under the room lock; a concurrent cancel may have landed.
    let current = ReservationRepo::find_for_update(&mut *tx, id)
        .await?
        .ok_or_else(|| not_found("MeetingReservation", id))?;
    let from = reservation_status(&current)?;
    reservation_transition(from, ReservationEvent::Approve)?;
    ensure_slot_free(&mut *tx, &room, current.start_at, current.end_at, Some(id)).await?;

    let approved = ReservationRepo::approve(&mut *tx, id, from, approver_id)
        .await?
        .ok_or_else(|| stale("MeetingReservation", id))?;
    tx.commit().await?;

    tracing::info!(reservation_id = id, room_id = room.id, approver_id, "Reservation approved");
    Ok(approved)
}

pub async fn reject(
    pool: &PgPool,
    id: DbId,
    approver_id: DbId,
    reason: Option<&str>,
) -> AppResult<MeetingReservation> {
    let current = ReservationRepo::find_by_id(pool, id)
        .await?
        .ok_or_else(|| not_found("MeetingReservation", id))?;
    let from = reservation_status(&current)?;
    reservation_transition(from, ReservationEvent::Reject)?;
    let rejected = ReservationRepo::reject(pool, id, from, approver_id, reason)
        .await?
        .ok_or_else(|| stale("MeetingReservation", id))?;
    tracing::info!(reservation_id = id, approver_id, "Reservation rejected");
    Ok(rejected)
}

/// Cancel a pending or approved reservation. The organizer may cancel their
/// own; holders of `meeting:reservation:approve` may cancel any.
pub async fn cancel(
    pool: &PgPool,
    id: DbId,
    actor: &AuthUser,
    reason: Option<&str>,
) -> AppResult<MeetingReservation> {
    let current = ReservationRepo::find_by_id(pool, id)
        .await?
        .ok_or_else(|| not_found("MeetingReservation", id))?;
    if current.organizer_id != actor.user_id {
        actor.require(permissions::MEETING_RESERVATION_APPROVE)?;
    }
    let from = reservation_status(&current)?;
    reservation_transition(from, ReservationEvent::Cancel)?;
    let cancelled = ReservationRepo::cancel(pool, id, from, reason)
        .await?
        .ok_or_else(|| stale("MeetingReservation", id))?;
    tracing::info!(reservation_id = id, actor_id = actor.user_id, "Reservation cancelled");
    Ok(cancelled)
}

fn ensure_participant(r: &MeetingReservation, user_id: DbId) -> AppResult<()> {
    if r.organizer_id == user_id || r.attendees.0.contains(&user_id) {
        Ok(())
    } else {
        Err(forbidden("Only the organizer or an attendee can do that"))
    }
}

pub async fn check_in(
    pool: &PgPool,
    id: DbId,
    actor_id: DbId,
    now: Timestamp,
    config: &MeetingConfig,
) -> AppResult<MeetingReservation> {
    let current = ReservationRepo::find_by_id(pool, id)
        .await?
        .ok_or_else(|| not_found("MeetingReservation", id))?;
    ensure_participant(&current, actor_id)?;
    let from = reservation_status(&current)?;
    reservation_transition(from, ReservationEvent::CheckIn)?;
    validate_check_in_window(now, current.start_at, current.end_at, config.checkin_early_mins)?;
    let checked_in = ReservationRepo::check_in(pool, id, from)
        .await?
        .ok_or_else(|| stale("MeetingReservation", id))?;
    tracing::info!(reservation_id = id, actor_id, "Reservation checked in");
    Ok(checked_in)
}

pub async fn check_out(pool: &PgPool, id: DbId, actor_id: DbId) -> AppResult<MeetingReservation> {
    let current = ReservationRepo::find_by_id(pool, id)
        .await?
        .ok_or_else(|| not_found("MeetingReservation", id))?;
    ensure_participant(&current, actor_id)?;
    let from = reservation_status(&current)?;
    reservation_transition(from, ReservationEvent::CheckOut)?;
    let checked_out = ReservationRepo::check_out(pool, id, from)
        .await?
        .ok_or_else(|| stale("MeetingReservation", id))?;
    tracing::info!(reservation_id = id, actor_id, "Reservation checked out");
    Ok(checked_out)
}

// ---------------------------------------------------------------------------
// Maintenance
// ---------------------------------------------------------------------------

pub async fn create_maintenance(
    pool: &PgPool,
    input: &CreateMaintenance,
    created_by: DbId,
) -> AppResult<RoomMaintenance> {
    validate_time_range(input.start_at, input.end_at)?;
    MeetingRoomRepo::find_by_id(pool, input.room_id)
        .await?
        .ok_or_else(|| not_found("MeetingRoom", input.room_id))?;
    let window = MaintenanceRepo::create(pool, input, created_by).await?;
    tracing::info!(maintenance_id = window.id, room_id = window.room_id, "Maintenance planned");
    Ok(window)
}

/// Begin a planned window. Refused while an approved or checked-in
/// reservation overlaps it; on success the room is marked maintaining.
pub async fn start_maintenance(pool: &PgPool, id: DbId) -> AppResult<RoomMaintenance> {
    let mut tx = pool.begin().await?;
    let window = MaintenanceRepo::find_by_id(&mut *tx, id)
        .await?
        .ok_or_else(|| not_found("RoomMaintenance", id))?;
    let from = MaintenanceStatus::parse(window.status)?;
    maintenance_transition(from, MaintenanceStatus::InProgress)?;

    let room = lock_room(&mut *tx, window.room_id).await?;
    if let Some(booking) = ReservationRepo::find_occupying_overlap(
        &mut *tx,
        room.id,
        window.start_at,
        window.end_at,
        None,
    )
    .await?
    {
        return Err(conflict(format!(
            "Reservation {} occupies room {} during the maintenance window",
            booking.id, room.id
        )));
    }

    let started = MaintenanceRepo::transition(&mut *tx, id, from, MaintenanceStatus::InProgress)
        .await?
        .ok_or_else(|| stale("RoomMaintenance", id))?;
    if RoomStatus::parse(room.status)? == RoomStatus::Available {
        MeetingRoomRepo::set_status(&mut *tx, room.id, RoomStatus::Maintaining).await?;
    }
    tx.commit().await?;

    tracing::info!(maintenance_id = id, room_id = room.id, "Maintenance started");
    Ok(started)
}

/// Finish an in-progress window. The room goes back to available once no
/// other window on it is still in progress.
pub async fn complete_maintenance(pool: &PgPool, id: DbId) -> AppResult<RoomMaintenance> {
    let mut tx = pool.begin().await?;
    let window = MaintenanceRepo::find_by_id(&mut *tx, id)
        .await?
        .ok_or_else(|| not_found("RoomMaintenance", id))?;
    let from = MaintenanceStatus::parse(window.status)?;
    maintenance_transition(from, MaintenanceStatus::Completed)?;

    let room = lock_room(&mut *tx, window.room_id).await?;
    let completed = MaintenanceRepo::transition(&mut *tx, id, from, MaintenanceStatus::Completed)
        .await?
        .ok_or_else(|| stale("RoomMaintenance", id))?;
    let restore = RoomStatus::parse(room.status)? == RoomStatus::Maintaining
        && !MaintenanceRepo::has_other_in_progress(&mut *tx, room.id, id).await?;
    if restore {
        MeetingRoomRepo::set_status(&mut *tx, room.id, RoomStatus::Available).await?;
    }
    tx.commit().await?;

    tracing::info!(
        maintenance_id = id,
        room_id = room.id,
        restored = restore,
        "Maintenance completed",
    );
    Ok(completed)
}

// ---------------------------------------------------------------------------
// Minutes
// ---------------------------------------------------------------------------

/// Minutes can be attached once a meeting is approved or has taken place.
pub async fn create_minutes(
    pool: &PgPool,
    input: &CreateMinutes,
    author_id: DbId,
) -> AppResult<MeetingMinutes> {
    let reservation = ReservationRepo::find_by_id(pool, input.reservation_id)
        .await?
        .ok_or_else(|| not_found("MeetingReservation", input.reservation_id))?;
    let status = reservation_status(&reservation)?;
    if !matches!(
        status,
        ReservationStatus::Approved | ReservationStatus::CheckedIn | ReservationStatus::CheckedOut
    ) {
        return Err(AppError::Core(CoreError::InvalidState(format!(
            "Cannot write minutes for a reservation that is {status}"
        ))));
    }
    Ok(MinutesRepo::create(pool, input, author_id).await?)
}

async fn authored_minutes(pool: &PgPool, id: DbId, user_id: DbId) -> AppResult<MeetingMinutes> {
    let minutes = MinutesRepo::find_by_id(pool, id)
        .await?
        .ok_or_else(|| not_found("MeetingMinutes", id))?;
    if minutes.author_id != user_id {
        return Err(forbidden("Only the author can change these minutes"));
    }
    Ok(minutes)
}

pub async fn update_minutes(
    pool: &PgPool,
    id: DbId,
    input: &UpdateMinutes,
    user_id: DbId,
) -> AppResult<MeetingMinutes> {
    authored_minutes(pool, id, user_id).await?;
    MinutesRepo::update(pool, id, input)
        .await?
        .ok_or_else(|| stale("MeetingMinutes", id))
}

pub async fn delete_minutes(pool: &PgPool, id: DbId, user_id: DbId) -> AppResult<()> {
    authored_minutes(pool, id, user_id).await?;
    MinutesRepo::soft_delete(pool, id).await?;
    Ok(())
}
