//! Route definitions for the `/admin` resource.

use axum::routing::{get, put};
use axum::Router;

use crate::handlers::admin;
use crate::state::AppState;

/// Routes mounted at `/admin`.
///
/// Permissions are enforced by handler extractors.
///
/// ```text
/// GET    /users                    -> list_users
/// POST   /users                    -> create_user
/// GET    /users/{id}               -> get_user
/// PUT    /users/{id}               -> update_user
/// DELETE /users/{id}               -> deactivate_user
/// PUT    /users/{id}/roles         -> set_user_roles
/// GET    /roles                    -> list_roles
/// POST   /roles                    -> create_role
/// GET    /roles/{id}/permissions   -> role_permissions
/// PUT    /roles/{id}/permissions   -> set_role_permissions
/// GET    /permissions              -> list_permissions
/// GET    /departments              -> list_departments
/// POST   /departments              -> create_department
/// PUT    /departments/{id}         -> update_department
/// DELETE /departments/{id}         -> delete_department
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", get(admin::list_users).post(admin::create_user))
        .route(
            "/users/{id}",
            get(admin::get_user)
                .put(admin::update_user)
                .delete(admin::deactivate_user),
        )
        .route("/users/{id}/roles", put(admin::set_user_roles))
        .route("/roles", get(admin::list_roles).post(admin::create_role))
        .route(
            "/roles/{id}/permissions",
            get(admin::role_permissions).put(admin::set_role_permissions),
        )
        .route("/permissions", get(admin::list_permissions))
        .route(
            "/departments",
            get(admin::list_departments).post(admin::create_department),
        )
        .route(
            "/departments/{id}",
            put(admin::update_department).delete(admin::delete_department),
        )
}
