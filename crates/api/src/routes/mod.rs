pub mod admin;
pub mod approval;
pub mod auth;
pub mod health;
pub mod meeting;
pub mod workflow;

use axum::Router;

use crate::state::AppState;

/// Build the `/api` route tree.
///
/// ```text
/// /auth/*          login, refresh, logout, profile, password
/// /admin/*         users, roles, permissions, departments
/// /workflows/*     types, definitions, nodes, instances, tasks
/// /approvals/*     approval types, flows, nodes, records, pending
/// /meeting/*       rooms, reservations, maintenance, minutes
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/admin", admin::router())
        .nest("/workflows", workflow::router())
        .nest("/approvals", approval::router())
        .nest("/meeting", meeting::router())
}
