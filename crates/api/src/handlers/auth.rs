//! Handlers for `/auth`: login, token refresh, logout, profile and password.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use oa_core::error::CoreError;
use oa_core::types::DbId;
use oa_db::models::session::{NewSession, RefreshOutcome};
use oa_db::models::user::{User, UserResponse};
use oa_db::repositories::{RoleRepo, SessionRepo, UserRepo};
use serde::{Deserialize, Serialize};

use crate::auth::jwt::{generate_access_token, generate_refresh_token, hash_refresh_token};
use crate::auth::password::{hash_password, validate_password_strength, verify_password};
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// Consecutive failed logins before the account is locked.
const MAX_FAILED_ATTEMPTS: i32 = 5;

const LOCK_DURATION_MINS: i64 = 15;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

/// Returned by login and refresh.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    pub user: UserResponse,
}

fn invalid_credentials() -> AppError {
    AppError::Core(CoreError::Unauthorized(
        "Invalid username or password".into(),
    ))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(input): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let user = UserRepo::find_by_username(&state.pool, input.username.trim())
        .await?
        .ok_or_else(invalid_credentials)?;

    if !user.is_active {
        return Err(AppError::Core(CoreError::Forbidden(
            "Account is deactivated".into(),
        )));
    }
    if let Some(locked_until) = user.locked_until {
        if locked_until > Utc::now() {
            return Err(AppError::Core(CoreError::Forbidden(
                "Account is temporarily locked. Try again later.".into(),
            )));
        }
    }

    let valid = verify_password(&input.password, &user.password_hash)
        .map_err(|e| AppError::InternalError(format!("Password verification error: {e}")))?;
    if !valid {
        UserRepo::increment_failed_login(&state.pool, user.id).await?;
        if user.failed_login_count + 1 >= MAX_FAILED_ATTEMPTS {
            let until = Utc::now() + chrono::Duration::minutes(LOCK_DURATION_MINS);
            UserRepo::lock_account(&state.pool, user.id, until).await?;
            tracing::warn!(user_id = user.id, "Account locked after repeated failed logins");
        }
        return Err(invalid_credentials());
    }

    UserRepo::record_successful_login(&state.pool, user.id).await?;
    tracing::info!(user_id = user.id, "User logged in");
    Ok(Json(issue_tokens(&state, &user, None).await?))
}

/// POST /api/auth/refresh
///
/// Rotates the refresh token: the presented one is spent and a new pair is
/// issued. Presenting an already spent token revokes every session of its
/// owner, since either the client or an attacker holds a stolen copy.
pub async fn refresh(
    State(state): State<AppState>,
    Json(input): Json<RefreshRequest>,
) -> AppResult<Json<AuthResponse>> {
    let hash = hash_refresh_token(&input.refresh_token);
    let (session_id, user_id) = match SessionRepo::consume(&state.pool, &hash).await? {
        RefreshOutcome::Rotated {
            session_id,
            user_id,
        } => (session_id, user_id),
        RefreshOutcome::Replayed { user_id } => {
            let revoked = SessionRepo::revoke_all_for_user(&state.pool, user_id).await?;
            tracing::warn!(user_id, revoked_sessions = revoked, "Refresh token replayed");
            return Err(invalid_refresh_token());
        }
        RefreshOutcome::Rejected => return Err(invalid_refresh_token()),
    };

    let user = UserRepo::find_by_id(&state.pool, user_id)
        .await?
        .ok_or_else(|| AppError::Core(CoreError::Unauthorized("User no longer exists".into())))?;
    if !user.is_active {
        return Err(AppError::Core(CoreError::Forbidden(
            "Account is deactivated".into(),
        )));
    }

    Ok(Json(issue_tokens(&state, &user, Some(session_id)).await?))
}

fn invalid_refresh_token() -> AppError {
    AppError::Core(CoreError::Unauthorized(
        "Invalid or expired refresh token".into(),
    ))
}

/// POST /api/auth/logout
///
/// Revokes every refresh session of the caller.
pub async fn logout(State(state): State<AppState>, user: AuthUser) -> AppResult<StatusCode> {
    SessionRepo::revoke_all_for_user(&state.pool, user.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/auth/user-info
pub async fn user_info(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<DataResponse<UserResponse>>> {
    let row = load_user(&state, user.user_id).await?;
    let roles = RoleRepo::codes_for_user(&state.pool, row.id).await?;
    Ok(Json(DataResponse {
        data: UserResponse::from_user(&row, roles),
    }))
}

/// GET /api/auth/permissions
pub async fn permissions(user: AuthUser) -> Json<DataResponse<Vec<String>>> {
    let mut tags: Vec<String> = user.permissions.into_iter().collect();
    tags.sort();
    Json(DataResponse { data: tags })
}

/// POST /api/auth/change-password
///
/// Also revokes all refresh sessions, so other devices must log in again.
pub async fn change_password(
    State(state): State<AppState>,
    user: AuthUser,
    Json(input): Json<ChangePasswordRequest>,
) -> AppResult<StatusCode> {
    let row = load_user(&state, user.user_id).await?;
    let valid = verify_password(&input.old_password, &row.password_hash)
        .map_err(|e| AppError::InternalError(format!("Password verification error: {e}")))?;
    if !valid {
        return Err(AppError::Core(CoreError::Validation(
            "Current password is incorrect".into(),
        )));
    }
    validate_password_strength(&input.new_password)?;

    let hash = hash_password(&input.new_password)
        .map_err(|e| AppError::InternalError(format!("Password hashing error: {e}")))?;
    UserRepo::update_password(&state.pool, row.id, &hash).await?;
    let revoked = SessionRepo::revoke_all_for_user(&state.pool, row.id).await?;
    tracing::info!(user_id = row.id, revoked_sessions = revoked, "Password changed");
    Ok(StatusCode::NO_CONTENT)
}

async fn load_user(state: &AppState, id: DbId) -> AppResult<User> {
    UserRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound { entity: "User", id }))
}

/// Issue an access token plus a refresh session, optionally succeeding
/// `rotated_from`.
async fn issue_tokens(
    state: &AppState,
    user: &User,
    rotated_from: Option<DbId>,
) -> AppResult<AuthResponse> {
    let token = generate_access_token(user.id, &user.username, &state.config.jwt)
        .map_err(|e| AppError::InternalError(format!("Token generation error: {e}")))?;

    let (refresh_plaintext, refresh_hash) = generate_refresh_token();
    let expires_at =
        Utc::now() + chrono::Duration::days(state.config.jwt.refresh_token_expiry_days);
    SessionRepo::open(
        &state.pool,
        &NewSession {
            user_id: user.id,
            refresh_token_hash: refresh_hash,
            expires_at,
            rotated_from,
        },
    )
    .await?;

    let roles = RoleRepo::codes_for_user(&state.pool, user.id).await?;
    Ok(AuthResponse {
        token,
        refresh_token: refresh_plaintext,
        expires_in: state.config.jwt.access_expiry_secs(),
        user: UserResponse::from_user(user, roles),
    })
}
