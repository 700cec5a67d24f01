//! Route definitions for the `/approvals` resource.

use axum::routing::{get, put};
use axum::Router;

use crate::handlers::approval;
use crate::state::AppState;

/// Routes mounted at `/approvals`.
///
/// ```text
/// GET|POST  /types
/// GET|POST  /flows
/// GET       /flows/{id}
/// PUT       /flows/{id}/publish
/// GET|POST  /nodes                 (GET takes ?flow_id=)
/// GET|POST  /records
/// GET       /records/{id}          record with task history
/// PUT       /records/{id}/approve
/// PUT       /records/{id}/reject
/// GET       /pending
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/types",
            get(approval::list_types).post(approval::create_type),
        )
        .route(
            "/flows",
            get(approval::list_flows).post(approval::create_flow),
        )
        .route("/flows/{id}", get(approval::get_flow))
        .route("/flows/{id}/publish", put(approval::publish_flow))
        .route(
            "/nodes",
            get(approval::list_nodes).post(approval::create_node),
        )
        .route(
            "/records",
            get(approval::list_records).post(approval::create_record),
        )
        .route("/records/{id}", get(approval::get_record))
        .route("/records/{id}/approve", put(approval::approve_record))
        .route("/records/{id}/reject", put(approval::reject_record))
        .route("/pending", get(approval::pending))
}
