//! Route definitions for the `/meeting` resource.

use axum::routing::{get, put};
use axum::Router;

use crate::handlers::meeting;
use crate::state::AppState;

/// Routes mounted at `/meeting`.
///
/// ```text
/// GET|POST        /rooms
/// GET|PUT|DELETE  /rooms/{id}
/// GET|POST        /reservations
/// GET             /reservations/{id}
/// PUT             /reservations/{id}/approve
/// PUT             /reservations/{id}/reject
/// PUT             /reservations/{id}/cancel
/// PUT             /reservations/{id}/check-in
/// PUT             /reservations/{id}/check-out
/// GET|POST        /maintenance
/// GET             /maintenance/{id}
/// PUT             /maintenance/{id}/start
/// PUT             /maintenance/{id}/complete
/// GET|POST        /minutes
/// GET|PUT|DELETE  /minutes/{id}
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/rooms", get(meeting::list_rooms).post(meeting::create_room))
        .route(
            "/rooms/{id}",
            get(meeting::get_room)
                .put(meeting::update_room)
                .delete(meeting::delete_room),
        )
        .route(
            "/reservations",
            get(meeting::list_reservations).post(meeting::create_reservation),
        )
        .route("/reservations/{id}", get(meeting::get_reservation))
        .route(
            "/reservations/{id}/approve",
            put(meeting::approve_reservation),
        )
        .route("/reservations/{id}/reject", put(meeting::reject_reservation))
        .route("/reservations/{id}/cancel", put(meeting::cancel_reservation))
        .route("/reservations/{id}/check-in", put(meeting::check_in))
        .route("/reservations/{id}/check-out", put(meeting::check_out))
        .route(
            "/maintenance",
            get(meeting::list_maintenance).post(meeting::create_maintenance),
        )
        .route("/maintenance/{id}", get(meeting::get_maintenance))
        .route("/maintenance/{id}/start", put(meeting::start_maintenance))
        .route(
            "/maintenance/{id}/complete",
            put(meeting::complete_maintenance),
        )
        .route(
            "/minutes",
            get(meeting::list_minutes).post(meeting::create_minutes),
        )
        .route(
            "/minutes/{id}",
            get(meeting::get_minutes)
                .put(meeting::update_minutes)
                .delete(meeting::delete_minutes),
        )
}
