//! Startup provisioning of the initial administrator.

use oa_core::roles::ROLE_ADMIN;
use oa_db::models::user::CreateUser;
use oa_db::repositories::{RoleRepo, UserRepo};
use sqlx::PgPool;

use crate::auth::password::{hash_password, validate_password_strength};
use crate::config::BootstrapAdmin;
use crate::error::{AppError, AppResult};

/// Create the configured admin user and grant it the `admin` role, unless a
/// user with that name already exists. Returns whether a user was created.
pub async fn ensure_admin(pool: &PgPool, admin: &BootstrapAdmin) -> AppResult<bool> {
    if UserRepo::find_by_username(pool, &admin.username)
        .await?
        .is_some()
    {
        return Ok(false);
    }
    validate_password_strength(&admin.password)?;
    let password_hash = hash_password(&admin.password)
        .map_err(|e| AppError::InternalError(format!("Password hashing error: {e}")))?;

    let user = UserRepo::create(
        pool,
        &CreateUser {
            username: admin.username.clone(),
            email: format!("{}@localhost", admin.username),
            display_name: Some("Administrator".to_string()),
            password_hash,
            department_id: None,
            manager_id: None,
        },
    )
    .await?;

    let role = RoleRepo::find_by_code(pool, ROLE_ADMIN)
        .await?
        .ok_or_else(|| AppError::InternalError("Seed role 'admin' is missing".into()))?;
    RoleRepo::assign_to_user(pool, user.id, role.id).await?;

    tracing::info!(user_id = user.id, username = %user.username, "Bootstrap admin created");
    Ok(true)
}
