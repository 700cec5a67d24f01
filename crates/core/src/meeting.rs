//! Meeting reservation and maintenance state machines and booking rules.
//!
//! Slot overlap is checked in SQL (`ReservationRepo::find_occupying_overlap`)
//! under the room lock, with half-open `[start_at, end_at)` intervals.

use chrono::Duration;

use crate::error::CoreError;
use crate::status::{MaintenanceStatus, ReservationStatus, RoomStatus};
use crate::types::Timestamp;

/// Default minutes before `start_at` at which check-in opens.
pub const DEFAULT_CHECKIN_EARLY_MINS: i64 = 15;

/// Maximum length of a reservation title.
pub const MAX_TITLE_LEN: usize = 200;

/// Reservation statuses that hold a room's time slot.
pub const OCCUPYING_STATUSES: &[ReservationStatus] =
    &[ReservationStatus::Approved, ReservationStatus::CheckedIn];

/// Events driving a reservation through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationEvent {
    Approve,
    Reject,
    Cancel,
    CheckIn,
    CheckOut,
}

impl ReservationEvent {
    pub fn name(self) -> &'static str {
        match self {
            ReservationEvent::Approve => "approve",
            ReservationEvent::Reject => "reject",
            ReservationEvent::Cancel => "cancel",
            ReservationEvent::CheckIn => "check_in",
            ReservationEvent::CheckOut => "check_out",
        }
    }
}

/// Apply `event` to a reservation in `from`, returning the new status.
pub fn reservation_transition(
    from: ReservationStatus,
    event: ReservationEvent,
) -> Result<ReservationStatus, CoreError> {
    use ReservationEvent as E;
    use ReservationStatus as S;

    match (from, event) {
        (S::Pending, E::Approve) => Ok(S::Approved),
        (S::Pending, E::Reject) => Ok(S::Rejected),
        (S::Pending, E::Cancel) | (S::Approved, E::Cancel) => Ok(S::Cancelled),
        (S::Approved, E::CheckIn) => Ok(S::CheckedIn),
        (S::CheckedIn, E::CheckOut) => Ok(S::CheckedOut),
        _ => Err(CoreError::InvalidState(format!(
            "Cannot {} a reservation that is {}",
            event.name(),
            from
        ))),
    }
}

/// Advance a maintenance window one step: planned -> in_progress -> completed.
pub fn maintenance_transition(
    from: MaintenanceStatus,
    to: MaintenanceStatus,
) -> Result<MaintenanceStatus, CoreError> {
    match (from, to) {
        (MaintenanceStatus::Planned, MaintenanceStatus::InProgress)
        | (MaintenanceStatus::InProgress, MaintenanceStatus::Completed) => Ok(to),
        _ => Err(CoreError::InvalidState(format!(
            "Cannot move maintenance from {from} to {to}"
        ))),
    }
}

/// A booking or maintenance window must end strictly after it starts.
pub fn validate_time_range(start_at: Timestamp, end_at: Timestamp) -> Result<(), CoreError> {
    if end_at <= start_at {
        return Err(CoreError::Validation(
            "end_at must be after start_at".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_title(title: &str) -> Result<(), CoreError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(CoreError::Validation("Title must not be empty".to_string()));
    }
    if trimmed.chars().count() > MAX_TITLE_LEN {
        return Err(CoreError::Validation(format!(
            "Title must be at most {MAX_TITLE_LEN} characters"
        )));
    }
    Ok(())
}

/// Check-in is open from `start_at - early_mins` until `end_at` inclusive.
pub fn validate_check_in_window(
    now: Timestamp,
    start_at: Timestamp,
    end_at: Timestamp,
    early_mins: i64,
) -> Result<(), CoreError> {
    let opens_at = start_at - Duration::minutes(early_mins);
    if now < opens_at {
        return Err(CoreError::InvalidState(format!(
            "Check-in opens at {}",
            opens_at.to_rfc3339()
        )));
    }
    if now > end_at {
        return Err(CoreError::InvalidState(
            "The reservation has already ended".to_string(),
        ));
    }
    Ok(())
}

/// Only an available room can take new bookings.
pub fn ensure_room_bookable(status: RoomStatus) -> Result<(), CoreError> {
    match status {
        RoomStatus::Available => Ok(()),
        other => Err(CoreError::Conflict(format!(
            "Meeting room is {other} and cannot be booked"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::{TimeZone, Utc};

    fn at(hour: u32, minute: u32) -> Timestamp {
        Utc.with_ymd_and_hms(2026, 3, 2, hour, minute, 0).unwrap()
    }

    const EVENTS: [ReservationEvent; 5] = [
        ReservationEvent::Approve,
        ReservationEvent::Reject,
        ReservationEvent::Cancel,
        ReservationEvent::CheckIn,
        ReservationEvent::CheckOut,
    ];

    #[test]
    fn happy_path() {
        let approved =
            reservation_transition(ReservationStatus::Pending, ReservationEvent::Approve).unwrap();
        let checked_in = reservation_transition(approved, ReservationEvent::CheckIn).unwrap();
        let done = reservation_transition(checked_in, ReservationEvent::CheckOut).unwrap();
        assert_eq!(done, ReservationStatus::CheckedOut);
    }

    #[test]
    fn approved_can_still_be_cancelled() {
        assert_eq!(
            reservation_transition(ReservationStatus::Approved, ReservationEvent::Cancel).unwrap(),
            ReservationStatus::Cancelled
        );
    }

    #[test]
    fn check_out_requires_check_in() {
        assert_matches!(
            reservation_transition(ReservationStatus::Approved, ReservationEvent::CheckOut),
            Err(CoreError::InvalidState(_))
        );
    }

    #[test]
    fn terminal_states_accept_nothing() {
        for from in [
            ReservationStatus::Rejected,
            ReservationStatus::Cancelled,
            ReservationStatus::CheckedOut,
        ] {
            for event in EVENTS {
                assert!(
                    reservation_transition(from, event).is_err(),
                    "{from} accepted {}",
                    event.name()
                );
            }
        }
    }

    #[test]
    fn lifecycle_is_monotone() {
        // Walking any allowed transition never lands on a state that can
        // lead back to the source.
        fn reachable(from: ReservationStatus) -> Vec<ReservationStatus> {
            let mut out = Vec::new();
            let mut stack = vec![from];
            while let Some(s) = stack.pop() {
                for event in EVENTS {
                    if let Ok(next) = reservation_transition(s, event) {
                        if !out.contains(&next) {
                            out.push(next);
                            stack.push(next);
                        }
                    }
                }
            }
            out
        }
        for &status in ReservationStatus::ALL {
            assert!(!reachable(status).contains(&status), "{status} is on a cycle");
        }
    }

    #[test]
    fn maintenance_moves_forward_only() {
        assert!(maintenance_transition(MaintenanceStatus::Planned, MaintenanceStatus::InProgress).is_ok());
        assert!(maintenance_transition(MaintenanceStatus::InProgress, MaintenanceStatus::Completed).is_ok());
        assert_matches!(
            maintenance_transition(MaintenanceStatus::Planned, MaintenanceStatus::Completed),
            Err(CoreError::InvalidState(_))
        );
        assert_matches!(
            maintenance_transition(MaintenanceStatus::Completed, MaintenanceStatus::InProgress),
            Err(CoreError::InvalidState(_))
        );
    }

    #[test]
    fn empty_or_inverted_range_is_rejected() {
        assert!(validate_time_range(at(10, 0), at(11, 0)).is_ok());
        assert_matches!(validate_time_range(at(10, 0), at(10, 0)), Err(CoreError::Validation(_)));
        assert_matches!(validate_time_range(at(11, 0), at(10, 0)), Err(CoreError::Validation(_)));
    }

    #[test]
    fn check_in_window_bounds() {
        let (start, end) = (at(10, 0), at(11, 0));
        assert!(validate_check_in_window(at(9, 45), start, end, 15).is_ok());
        assert!(validate_check_in_window(at(11, 0), start, end, 15).is_ok());
        assert_matches!(
            validate_check_in_window(at(9, 44), start, end, 15),
            Err(CoreError::InvalidState(_))
        );
        assert_matches!(
            validate_check_in_window(at(11, 1), start, end, 15),
            Err(CoreError::InvalidState(_))
        );
    }

    #[test]
    fn title_rules() {
        assert!(validate_title("Weekly sync").is_ok());
        assert!(validate_title("   ").is_err());
        assert!(validate_title(&"x".repeat(MAX_TITLE_LEN + 1)).is_err());
    }

    #[test]
    fn only_available_rooms_are_bookable() {
        assert!(ensure_room_bookable(RoomStatus::Available).is_ok());
        assert_matches!(ensure_room_bookable(RoomStatus::Maintaining), Err(CoreError::Conflict(_)));
        assert_matches!(ensure_room_bookable(RoomStatus::Disabled), Err(CoreError::Conflict(_)));
    }
}
