//! Repositories for meeting rooms, reservations, maintenance and minutes.
//!
//! Lifecycle updates are guarded by the expected `from` status so a stale
//! caller updates nothing and gets `None` back.

use oa_core::meeting::OCCUPYING_STATUSES;
use oa_core::status::{MaintenanceStatus, ReservationStatus, RoomStatus, StatusId};
use oa_core::types::{DbId, Timestamp};
use sqlx::types::Json;
use sqlx::PgExecutor;

use crate::models::meeting::{
    CreateMaintenance, CreateMeetingRoom, CreateMinutes, CreateReservation, MeetingMinutes,
    MeetingReservation, MeetingRoom, ReservationFilter, RoomMaintenance, UpdateMeetingRoom,
    UpdateMinutes,
};

const ROOM_COLUMNS: &str =
    "id, name, capacity, location, equipment, status, version, created_at, updated_at";

const RESERVATION_COLUMNS: &str = "id, room_id, organizer_id, title, description, start_at, \
                                    end_at, attendees, status, approver_id, reject_reason, \
                                    cancel_reason, checked_in_at, checked_out_at, version, \
                                    created_at, updated_at";

const MAINTENANCE_COLUMNS: &str = "id, room_id, reason, start_at, end_at, status, created_by, \
                                    started_at, completed_at, version, created_at, updated_at";

const MINUTES_COLUMNS: &str =
    "id, reservation_id, author_id, title, content, version, created_at, updated_at";

fn occupying_ids() -> Vec<StatusId> {
    OCCUPYING_STATUSES.iter().map(|s| s.id()).collect()
}

// ---------------------------------------------------------------------------
// Rooms
// ---------------------------------------------------------------------------

pub struct MeetingRoomRepo;

impl MeetingRoomRepo {
    pub async fn create<'e, E: PgExecutor<'e>>(
        executor: E,
        input: &CreateMeetingRoom,
    ) -> Result<MeetingRoom, sqlx::Error> {
        let query = format!(
            "INSERT INTO meeting_rooms (name, capacity, location, equipment)
             VALUES ($1, $2, $3, $4)
             RETURNING {ROOM_COLUMNS}"
        );
        sqlx::query_as::<_, MeetingRoom>(&query)
            .bind(&input.name)
            .bind(input.capacity)
            .bind(&input.location)
            .bind(&input.equipment)
            .fetch_one(executor)
            .await
    }

    pub async fn find_by_id<'e, E: PgExecutor<'e>>(
        executor: E,
        id: DbId,
    ) -> Result<Option<MeetingRoom>, sqlx::Error> {
        let query =
            format!("SELECT {ROOM_COLUMNS} FROM meeting_rooms WHERE id = $1 AND deleted_at IS NULL");
        sqlx::query_as::<_, MeetingRoom>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Lock the room row. Every booking decision on a room holds this lock
    /// while it runs its overlap checks.
    pub async fn find_for_update<'e, E: PgExecutor<'e>>(
        executor: E,
        id: DbId,
    ) -> Result<Option<MeetingRoom>, sqlx::Error> {
        let query = format!(
            "SELECT {ROOM_COLUMNS} FROM meeting_rooms
             WHERE id = $1 AND deleted_at IS NULL
             FOR UPDATE"
        );
        sqlx::query_as::<_, MeetingRoom>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    pub async fn list<'e, E: PgExecutor<'e>>(
        executor: E,
        status: Option<StatusId>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<MeetingRoom>, sqlx::Error> {
        let query = format!(
            "SELECT {ROOM_COLUMNS} FROM meeting_rooms
             WHERE deleted_at IS NULL AND ($1::SMALLINT IS NULL OR status = $1)
             ORDER BY id
             LIMIT $2 OFFSET $3"
        );
        sqlx::query_as::<_, MeetingRoom>(&query)
            .bind(status)
            .bind(limit)
            .bind(offset)
            .fetch_all(executor)
            .await
    }

    pub async fn count<'e, E: PgExecutor<'e>>(
        executor: E,
        status: Option<StatusId>,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM meeting_rooms
             WHERE deleted_at IS NULL AND ($1::SMALLINT IS NULL OR status = $1)",
        )
        .bind(status)
        .fetch_one(executor)
        .await
    }

    /// Partial update guarded by `input.version`. `None` means the row is
    /// gone or the version moved on.
    pub async fn update<'e, E: PgExecutor<'e>>(
        executor: E,
        id: DbId,
        input: &UpdateMeetingRoom,
    ) -> Result<Option<MeetingRoom>, sqlx::Error> {
        let query = format!(
            "UPDATE meeting_rooms SET
                name = COALESCE($3, name),
                capacity = COALESCE($4, capacity),
                location = COALESCE($5, location),
                equipment = COALESCE($6, equipment),
                status = COALESCE($7, status),
                version = version + 1
             WHERE id = $1 AND version = $2 AND deleted_at IS NULL
             RETURNING {ROOM_COLUMNS}"
        );
        sqlx::query_as::<_, MeetingRoom>(&query)
            .bind(id)
            .bind(input.version)
            .bind(&input.name)
            .bind(input.capacity)
            .bind(&input.location)
            .bind(&input.equipment)
            .bind(input.status)
            .fetch_optional(executor)
            .await
    }

    pub async fn set_status<'e, E: PgExecutor<'e>>(
        executor: E,
        id: DbId,
        status: RoomStatus,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE meeting_rooms SET status = $2, version = version + 1
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(status.id())
        .execute(executor)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn soft_delete<'e, E: PgExecutor<'e>>(
        executor: E,
        id: DbId,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE meeting_rooms SET deleted_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Whether the room has reservations that still occupy or may occupy it.
    pub async fn has_open_reservations<'e, E: PgExecutor<'e>>(
        executor: E,
        id: DbId,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT EXISTS(
                SELECT 1 FROM meeting_reservations
                WHERE room_id = $1 AND status = ANY($2) AND end_at > NOW())",
        )
        .bind(id)
        .bind(vec![
            ReservationStatus::Pending.id(),
            ReservationStatus::Approved.id(),
            ReservationStatus::CheckedIn.id(),
        ])
        .fetch_one(executor)
        .await
    }
}

// ---------------------------------------------------------------------------
// Reservations
// ---------------------------------------------------------------------------

pub struct ReservationRepo;

impl ReservationRepo {
    pub async fn insert<'e, E: PgExecutor<'e>>(
        executor: E,
        input: &CreateReservation,
        organizer_id: DbId,
        status: ReservationStatus,
    ) -> Result<MeetingReservation, sqlx::Error> {
        let query = format!(
            "INSERT INTO meeting_reservations
                (room_id, organizer_id, title, description, start_at, end_at, attendees, status)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {RESERVATION_COLUMNS}"
        );
        sqlx::query_as::<_, MeetingReservation>(&query)
            .bind(input.room_id)
            .bind(organizer_id)
            .bind(input.title.trim())
            .bind(&input.description)
            .bind(input.start_at)
            .bind(input.end_at)
            .bind(Json(&input.attendees))
            .bind(status.id())
            .fetch_one(executor)
            .await
    }

    pub async fn find_by_id<'e, E: PgExecutor<'e>>(
        executor: E,
        id: DbId,
    ) -> Result<Option<MeetingReservation>, sqlx::Error> {
        let query = format!("SELECT {RESERVATION_COLUMNS} FROM meeting_reservations WHERE id = $1");
        sqlx::query_as::<_, MeetingReservation>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    pub async fn find_for_update<'e, E: PgExecutor<'e>>(
        executor: E,
        id: DbId,
    ) -> Result<Option<MeetingReservation>, sqlx::Error> {
        let query = format!(
            "SELECT {RESERVATION_COLUMNS} FROM meeting_reservations WHERE id = $1 FOR UPDATE"
        );
        sqlx::query_as::<_, MeetingReservation>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    pub async fn list<'e, E: PgExecutor<'e>>(
        executor: E,
        filter: &ReservationFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<MeetingReservation>, sqlx::Error> {
        let query = format!(
            "SELECT {RESERVATION_COLUMNS} FROM meeting_reservations
             WHERE ($1::BIGINT IS NULL OR room_id = $1)
               AND ($2::BIGINT IS NULL OR organizer_id = $2)
               AND ($3::SMALLINT IS NULL OR status = $3)
               AND ($4::TIMESTAMPTZ IS NULL OR end_at > $4)
               AND ($5::TIMESTAMPTZ IS NULL OR start_at < $5)
             ORDER BY start_at, id
             LIMIT $6 OFFSET $7"
        );
        sqlx::query_as::<_, MeetingReservation>(&query)
            .bind(filter.room_id)
            .bind(filter.organizer_id)
            .bind(filter.status)
            .bind(filter.from)
            .bind(filter.to)
            .bind(limit)
            .bind(offset)
            .fetch_all(executor)
            .await
    }

    pub async fn count<'e, E: PgExecutor<'e>>(
        executor: E,
        filter: &ReservationFilter,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM meeting_reservations
             WHERE ($1::BIGINT IS NULL OR room_id = $1)
               AND ($2::BIGINT IS NULL OR organizer_id = $2)
               AND ($3::SMALLINT IS NULL OR status = $3)
               AND ($4::TIMESTAMPTZ IS NULL OR end_at > $4)
               AND ($5::TIMESTAMPTZ IS NULL OR start_at < $5)",
        )
        .bind(filter.room_id)
        .bind(filter.organizer_id)
        .bind(filter.status)
        .bind(filter.from)
        .bind(filter.to)
        .fetch_one(executor)
        .await
    }

    /// First approved or checked-in reservation on `room_id` overlapping
    /// `[start_at, end_at)`, other than `exclude_id`.
    pub async fn find_occupying_overlap<'e, E: PgExecutor<'e>>(
        executor: E,
        room_id: DbId,
        start_at: Timestamp,
        end_at: Timestamp,
        exclude_id: Option<DbId>,
    ) -> Result<Option<MeetingReservation>, sqlx::Error> {
        let query = format!(
            "SELECT {RESERVATION_COLUMNS} FROM meeting_reservations
             WHERE room_id = $1
               AND status = ANY($2)
               AND start_at < $4 AND $3 < end_at
               AND ($5::BIGINT IS NULL OR id <> $5)
             ORDER BY start_at, id
             LIMIT 1"
        );
        sqlx::query_as::<_, MeetingReservation>(&query)
            .bind(room_id)
            .bind(occupying_ids())
            .bind(start_at)
            .bind(end_at)
            .bind(exclude_id)
            .fetch_optional(executor)
            .await
    }

    /// `pending -> approved`, recording the approver.
    pub async fn approve<'e, E: PgExecutor<'e>>(
        executor: E,
        id: DbId,
        from: ReservationStatus,
        approver_id: DbId,
    ) -> Result<Option<MeetingReservation>, sqlx::Error> {
        let query = format!(
            "UPDATE meeting_reservations SET
                status = $3, approver_id = $4, version = version + 1
             WHERE id = $1 AND status = $2
             RETURNING {RESERVATION_COLUMNS}"
        );
        sqlx::query_as::<_, MeetingReservation>(&query)
            .bind(id)
            .bind(from.id())
            .bind(ReservationStatus::Approved.id())
            .bind(approver_id)
            .fetch_optional(executor)
            .await
    }

    pub async fn reject<'e, E: PgExecutor<'e>>(
        executor: E,
        id: DbId,
        from: ReservationStatus,
        approver_id: DbId,
        reason: Option<&str>,
    ) -> Result<Option<MeetingReservation>, sqlx::Error> {
        let query = format!(
            "UPDATE meeting_reservations SET
                status = $3, approver_id = $4, reject_reason = $5, version = version + 1
             WHERE id = $1 AND status = $2
             RETURNING {RESERVATION_COLUMNS}"
        );
        sqlx::query_as::<_, MeetingReservation>(&query)
            .bind(id)
            .bind(from.id())
            .bind(ReservationStatus::Rejected.id())
            .bind(approver_id)
            .bind(reason)
            .fetch_optional(executor)
            .await
    }

    pub async fn cancel<'e, E: PgExecutor<'e>>(
        executor: E,
        id: DbId,
        from: ReservationStatus,
        reason: Option<&str>,
    ) -> Result<Option<MeetingReservation>, sqlx::Error> {
        let query = format!(
            "UPDATE meeting_reservations SET
                status = $3, cancel_reason = $4, version = version + 1
             WHERE id = $1 AND status = $2
             RETURNING {RESERVATION_COLUMNS}"
        );
        sqlx::query_as::<_, MeetingReservation>(&query)
            .bind(id)
            .bind(from.id())
            .bind(ReservationStatus::Cancelled.id())
            .bind(reason)
            .fetch_optional(executor)
            .await
    }

    pub async fn check_in<'e, E: PgExecutor<'e>>(
        executor: E,
        id: DbId,
        from: ReservationStatus,
    ) -> Result<Option<MeetingReservation>, sqlx::Error> {
        let query = format!(
            "UPDATE meeting_reservations SET
                status = $3, checked_in_at = NOW(), version = version + 1
             WHERE id = $1 AND status = $2
             RETURNING {RESERVATION_COLUMNS}"
        );
        sqlx::query_as::<_, MeetingReservation>(&query)
            .bind(id)
            .bind(from.id())
            .bind(ReservationStatus::CheckedIn.id())
            .fetch_optional(executor)
            .await
    }

    pub async fn check_out<'e, E: PgExecutor<'e>>(
        executor: E,
        id: DbId,
        from: ReservationStatus,
    ) -> Result<Option<MeetingReservation>, sqlx::Error> {
        let query = format!(
            "UPDATE meeting_reservations SET
                status = $3, checked_out_at = NOW(), version = version + 1
             WHERE id = $1 AND status = $2
             RETURNING {RESERVATION_COLUMNS}"
        );
        sqlx::query_as::<_, MeetingReservation>(&query)
            .bind(id)
            .bind(from.id())
            .bind(ReservationStatus::CheckedOut.id())
            .fetch_optional(executor)
            .await
    }
}

// ---------------------------------------------------------------------------
// Maintenance
// ---------------------------------------------------------------------------

pub struct MaintenanceRepo;

impl MaintenanceRepo {
    pub async fn create<'e, E: PgExecutor<'e>>(
        executor: E,
        input: &CreateMaintenance,
        created_by: DbId,
    ) -> Result<RoomMaintenance, sqlx::Error> {
        let query = format!(
            "INSERT INTO meeting_room_maintenance (room_id, reason, start_at, end_at, created_by)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {MAINTENANCE_COLUMNS}"
        );
        sqlx::query_as::<_, RoomMaintenance>(&query)
            .bind(input.room_id)
            .bind(&input.reason)
            .bind(input.start_at)
            .bind(input.end_at)
            .bind(created_by)
            .fetch_one(executor)
            .await
    }

    pub async fn find_by_id<'e, E: PgExecutor<'e>>(
        executor: E,
        id: DbId,
    ) -> Result<Option<RoomMaintenance>, sqlx::Error> {
        let query =
            format!("SELECT {MAINTENANCE_COLUMNS} FROM meeting_room_maintenance WHERE id = $1");
        sqlx::query_as::<_, RoomMaintenance>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    pub async fn list<'e, E: PgExecutor<'e>>(
        executor: E,
        room_id: Option<DbId>,
        status: Option<StatusId>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<RoomMaintenance>, sqlx::Error> {
        let query = format!(
            "SELECT {MAINTENANCE_COLUMNS} FROM meeting_room_maintenance
             WHERE ($1::BIGINT IS NULL OR room_id = $1)
               AND ($2::SMALLINT IS NULL OR status = $2)
             ORDER BY start_at DESC, id DESC
             LIMIT $3 OFFSET $4"
        );
        sqlx::query_as::<_, RoomMaintenance>(&query)
            .bind(room_id)
            .bind(status)
            .bind(limit)
            .bind(offset)
            .fetch_all(executor)
            .await
    }

    pub async fn count<'e, E: PgExecutor<'e>>(
        executor: E,
        room_id: Option<DbId>,
        status: Option<StatusId>,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM meeting_room_maintenance
             WHERE ($1::BIGINT IS NULL OR room_id = $1)
               AND ($2::SMALLINT IS NULL OR status = $2)",
        )
        .bind(room_id)
        .bind(status)
        .fetch_one(executor)
        .await
    }

    /// First in-progress window on `room_id` overlapping `[start_at, end_at)`.
    pub async fn find_in_progress_overlap<'e, E: PgExecutor<'e>>(
        executor: E,
        room_id: DbId,
        start_at: Timestamp,
        end_at: Timestamp,
    ) -> Result<Option<RoomMaintenance>, sqlx::Error> {
        let query = format!(
            "SELECT {MAINTENANCE_COLUMNS} FROM meeting_room_maintenance
             WHERE room_id = $1 AND status = $2 AND start_at < $4 AND $3 < end_at
             ORDER BY start_at, id
             LIMIT 1"
        );
        sqlx::query_as::<_, RoomMaintenance>(&query)
            .bind(room_id)
            .bind(MaintenanceStatus::InProgress.id())
            .bind(start_at)
            .bind(end_at)
            .fetch_optional(executor)
            .await
    }

    /// Whether any other window on the room is still in progress.
    pub async fn has_other_in_progress<'e, E: PgExecutor<'e>>(
        executor: E,
        room_id: DbId,
        exclude_id: DbId,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT EXISTS(
                SELECT 1 FROM meeting_room_maintenance
                WHERE room_id = $1 AND status = $2 AND id <> $3)",
        )
        .bind(room_id)
        .bind(MaintenanceStatus::InProgress.id())
        .bind(exclude_id)
        .fetch_one(executor)
        .await
    }

    /// Move a window from `from` to `to`, stamping `started_at` or
    /// `completed_at` as appropriate.
    pub async fn transition<'e, E: PgExecutor<'e>>(
        executor: E,
        id: DbId,
        from: MaintenanceStatus,
        to: MaintenanceStatus,
    ) -> Result<Option<RoomMaintenance>, sqlx::Error> {
        let query = format!(
            "UPDATE meeting_room_maintenance SET
                status = $3,
                started_at = CASE WHEN $3 = $4 THEN NOW() ELSE started_at END,
                completed_at = CASE WHEN $3 = $5 THEN NOW() ELSE completed_at END,
                version = version + 1
             WHERE id = $1 AND status = $2
             RETURNING {MAINTENANCE_COLUMNS}"
        );
        sqlx::query_as::<_, RoomMaintenance>(&query)
            .bind(id)
            .bind(from.id())
            .bind(to.id())
            .bind(MaintenanceStatus::InProgress.id())
            .bind(MaintenanceStatus::Completed.id())
            .fetch_optional(executor)
            .await
    }
}

// ---------------------------------------------------------------------------
// Minutes
// ---------------------------------------------------------------------------

pub struct MinutesRepo;

impl MinutesRepo {
    pub async fn create<'e, E: PgExecutor<'e>>(
        executor: E,
        input: &CreateMinutes,
        author_id: DbId,
    ) -> Result<MeetingMinutes, sqlx::Error> {
        let query = format!(
            "INSERT INTO meeting_minutes (reservation_id, author_id, title, content)
             VALUES ($1, $2, $3, $4)
             RETURNING {MINUTES_COLUMNS}"
        );
        sqlx::query_as::<_, MeetingMinutes>(&query)
            .bind(input.reservation_id)
            .bind(author_id)
            .bind(&input.title)
            .bind(&input.content)
            .fetch_one(executor)
            .await
    }

    pub async fn find_by_id<'e, E: PgExecutor<'e>>(
        executor: E,
        id: DbId,
    ) -> Result<Option<MeetingMinutes>, sqlx::Error> {
        let query = format!(
            "SELECT {MINUTES_COLUMNS} FROM meeting_minutes WHERE id = $1 AND deleted_at IS NULL"
        );
        sqlx::query_as::<_, MeetingMinutes>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    pub async fn list<'e, E: PgExecutor<'e>>(
        executor: E,
        reservation_id: Option<DbId>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<MeetingMinutes>, sqlx::Error> {
        let query = format!(
            "SELECT {MINUTES_COLUMNS} FROM meeting_minutes
             WHERE deleted_at IS NULL AND ($1::BIGINT IS NULL OR reservation_id = $1)
             ORDER BY id DESC
             LIMIT $2 OFFSET $3"
        );
        sqlx::query_as::<_, MeetingMinutes>(&query)
            .bind(reservation_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(executor)
            .await
    }

    pub async fn count<'e, E: PgExecutor<'e>>(
        executor: E,
        reservation_id: Option<DbId>,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM meeting_minutes
             WHERE deleted_at IS NULL AND ($1::BIGINT IS NULL OR reservation_id = $1)",
        )
        .bind(reservation_id)
        .fetch_one(executor)
        .await
    }

    pub async fn update<'e, E: PgExecutor<'e>>(
        executor: E,
        id: DbId,
        input: &UpdateMinutes,
    ) -> Result<Option<MeetingMinutes>, sqlx::Error> {
        let query = format!(
            "UPDATE meeting_minutes SET
                title = COALESCE($3, title),
                content = COALESCE($4, content),
                version = version + 1
             WHERE id = $1 AND version = $2 AND deleted_at IS NULL
             RETURNING {MINUTES_COLUMNS}"
        );
        sqlx::query_as::<_, MeetingMinutes>(&query)
            .bind(id)
            .bind(input.version)
            .bind(&input.title)
            .bind(&input.content)
            .fetch_optional(executor)
            .await
    }

    pub async fn soft_delete<'e, E: PgExecutor<'e>>(
        executor: E,
        id: DbId,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE meeting_minutes SET deleted_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
