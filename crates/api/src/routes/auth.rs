//! Route definitions for the `/auth` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::auth;
use crate::state::AppState;

/// Routes mounted at `/auth`.
///
/// ```text
/// POST /login            -> login
/// POST /refresh          -> refresh
/// POST /logout           -> logout (requires auth)
/// GET  /user-info        -> user_info
/// GET  /permissions      -> permissions
/// POST /change-password  -> change_password
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", post(auth::login))
        .route("/refresh", post(auth::refresh))
        .route("/logout", post(auth::logout))
        .route("/user-info", get(auth::user_info))
        .route("/permissions", get(auth::permissions))
        .route("/change-password", post(auth::change_password))
}
