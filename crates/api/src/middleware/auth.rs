//! Bearer-token identity extractor.

use std::collections::HashSet;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use oa_core::error::CoreError;
use oa_core::permissions;
use oa_core::types::DbId;
use oa_db::repositories::PermissionRepo;

use crate::auth::jwt::validate_token;
use crate::error::AppError;
use crate::state::AppState;

/// The caller of the current request.
///
/// Built from the `Authorization: Bearer <token>` header plus one query for
/// the permission tags granted through the user's roles. A missing or bad
/// token is 401; there is no anonymous fallback.
///
/// ```ignore
/// async fn cancel(user: AuthUser, Path(id): Path<DbId>) -> AppResult<StatusCode> {
///     user.require(permissions::WORKFLOW_INSTANCE_CANCEL)?;
///     // ...
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: DbId,
    pub username: String,
    pub permissions: HashSet<String>,
}

impl AuthUser {
    /// Fail with 403 unless the caller holds `tag`.
    pub fn require(&self, tag: &str) -> Result<(), AppError> {
        permissions::require(&self.permissions, tag).map_err(AppError::Core)
    }

    pub fn has(&self, tag: &str) -> bool {
        self.permissions.contains(tag)
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                AppError::Core(CoreError::Unauthorized(
                    "Missing Authorization header".into(),
                ))
            })?;

        let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
            AppError::Core(CoreError::Unauthorized(
                "Invalid Authorization format. Expected: Bearer <token>".into(),
            ))
        })?;

        let claims = validate_token(token, &state.config.jwt).map_err(|_| {
            AppError::Core(CoreError::Unauthorized("Invalid or expired token".into()))
        })?;

        let tags = PermissionRepo::tags_for_user(&state.pool, claims.sub).await?;

        Ok(AuthUser {
            user_id: claims.sub,
            username: claims.username,
            permissions: tags.into_iter().collect(),
        })
    }
}
