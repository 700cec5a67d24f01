//! Meeting room, reservation, maintenance and minutes models.

use oa_core::status::StatusId;
use oa_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use validator::Validate;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct MeetingRoom {
    pub id: DbId,
    pub name: String,
    pub capacity: i32,
    pub location: String,
    pub equipment: Option<String>,
    pub status: StatusId,
    pub version: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateMeetingRoom {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(range(min = 1, max = 10000))]
    pub capacity: i32,
    #[serde(default)]
    pub location: String,
    pub equipment: Option<String>,
}

/// Partial update; `version` must match the stored row.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateMeetingRoom {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    #[validate(range(min = 1, max = 10000))]
    pub capacity: Option<i32>,
    pub location: Option<String>,
    pub equipment: Option<String>,
    pub status: Option<StatusId>,
    pub version: i32,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct MeetingReservation {
    pub id: DbId,
    pub room_id: DbId,
    pub organizer_id: DbId,
    pub title: String,
    pub description: Option<String>,
    pub start_at: Timestamp,
    pub end_at: Timestamp,
    pub attendees: Json<Vec<DbId>>,
    pub status: StatusId,
    pub approver_id: Option<DbId>,
    pub reject_reason: Option<String>,
    pub cancel_reason: Option<String>,
    pub checked_in_at: Option<Timestamp>,
    pub checked_out_at: Option<Timestamp>,
    pub version: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateReservation {
    pub room_id: DbId,
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    pub description: Option<String>,
    pub start_at: Timestamp,
    pub end_at: Timestamp,
    #[serde(default)]
    pub attendees: Vec<DbId>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReservationFilter {
    pub room_id: Option<DbId>,
    pub organizer_id: Option<DbId>,
    pub status: Option<StatusId>,
    pub from: Option<Timestamp>,
    pub to: Option<Timestamp>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RoomMaintenance {
    pub id: DbId,
    pub room_id: DbId,
    pub reason: String,
    pub start_at: Timestamp,
    pub end_at: Timestamp,
    pub status: StatusId,
    pub created_by: Option<DbId>,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub version: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateMaintenance {
    pub room_id: DbId,
    #[validate(length(max = 500))]
    #[serde(default)]
    pub reason: String,
    pub start_at: Timestamp,
    pub end_at: Timestamp,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct MeetingMinutes {
    pub id: DbId,
    pub reservation_id: DbId,
    pub author_id: DbId,
    pub title: String,
    pub content: String,
    pub version: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateMinutes {
    pub reservation_id: DbId,
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(min = 1))]
    pub content: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateMinutes {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[validate(length(min = 1))]
    pub content: Option<String>,
    pub version: i32,
}
