//! Handlers for the `/admin` resource: users, roles, permissions and
//! departments.
//!
//! Each group is guarded by its own `system:*:manage` permission.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use oa_core::error::CoreError;
use oa_core::types::DbId;
use oa_db::models::department::{CreateDepartment, Department, UpdateDepartment};
use oa_db::models::role::{CreateRole, Permission, Role};
use oa_db::models::user::{CreateUser, UpdateUser, User, UserResponse};
use oa_db::repositories::{DepartmentRepo, PermissionRepo, RoleRepo, SessionRepo, UserRepo};
use serde::Deserialize;

use crate::auth::password::{hash_password, validate_password_strength};
use crate::error::{AppError, AppResult};
use crate::middleware::rbac::{Require, SystemDepartmentManage, SystemRoleManage, SystemUserManage};
use crate::query::PageParams;
use crate::response::{DataResponse, PageResponse};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

/// Request body for `POST /admin/users`.
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    pub display_name: Option<String>,
    pub password: String,
    pub department_id: Option<DbId>,
    pub manager_id: Option<DbId>,
    #[serde(default)]
    pub role_ids: Vec<DbId>,
}

#[derive(Debug, Deserialize)]
pub struct SetRolesRequest {
    pub role_ids: Vec<DbId>,
}

#[derive(Debug, Deserialize)]
pub struct SetPermissionsRequest {
    pub permission_ids: Vec<DbId>,
}

fn required(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Core(CoreError::Validation(format!(
            "{field} must not be empty"
        ))));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

/// POST /api/admin/users
pub async fn create_user(
    State(state): State<AppState>,
    Require(admin, _): Require<SystemUserManage>,
    Json(input): Json<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<UserResponse>)> {
    required("username", &input.username)?;
    if !input.email.contains('@') {
        return Err(AppError::Core(CoreError::Validation(
            "email is not a valid address".into(),
        )));
    }
    validate_password_strength(&input.password)?;

    let password_hash = hash_password(&input.password)
        .map_err(|e| AppError::InternalError(format!("Password hashing error: {e}")))?;

    let user = UserRepo::create(
        &state.pool,
        &CreateUser {
            username: input.username.trim().to_string(),
            email: input.email,
            display_name: input.display_name,
            password_hash,
            department_id: input.department_id,
            manager_id: input.manager_id,
        },
    )
    .await?;
    if !input.role_ids.is_empty() {
        RoleRepo::set_user_roles(&state.pool, user.id, &input.role_ids).await?;
    }

    tracing::info!(user_id = user.id, created_by = admin.user_id, "User created");
    Ok((StatusCode::CREATED, Json(user_to_response(&state, &user).await?)))
}

/// GET /api/admin/users
pub async fn list_users(
    State(state): State<AppState>,
    Require(_admin, _): Require<SystemUserManage>,
    Query(page): Query<PageParams>,
) -> AppResult<Json<PageResponse<UserResponse>>> {
    let (limit, offset) = page.limit_offset();
    let users = UserRepo::list(&state.pool, limit, offset).await?;
    let total = UserRepo::count(&state.pool).await?;

    let mut data = Vec::with_capacity(users.len());
    for user in &users {
        data.push(user_to_response(&state, user).await?);
    }
    Ok(Json(PageResponse { data, total }))
}

/// GET /api/admin/users/{id}
pub async fn get_user(
    State(state): State<AppState>,
    Require(_admin, _): Require<SystemUserManage>,
    Path(id): Path<DbId>,
) -> AppResult<Json<UserResponse>> {
    let user = UserRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound { entity: "User", id }))?;
    Ok(Json(user_to_response(&state, &user).await?))
}

/// PUT /api/admin/users/{id}
///
/// Profile fields only; passwords change through `/auth/change-password`.
pub async fn update_user(
    State(state): State<AppState>,
    Require(_admin, _): Require<SystemUserManage>,
    Path(id): Path<DbId>,
    Json(input): Json<UpdateUser>,
) -> AppResult<Json<UserResponse>> {
    let user = UserRepo::update(&state.pool, id, &input)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound { entity: "User", id }))?;
    if input.is_active == Some(false) {
        SessionRepo::revoke_all_for_user(&state.pool, id).await?;
    }
    Ok(Json(user_to_response(&state, &user).await?))
}

/// DELETE /api/admin/users/{id}
///
/// Users are never removed; this deactivates the account and revokes its
/// sessions.
pub async fn deactivate_user(
    State(state): State<AppState>,
    Require(admin, _): Require<SystemUserManage>,
    Path(id): Path<DbId>,
) -> AppResult<StatusCode> {
    if id == admin.user_id {
        return Err(AppError::Core(CoreError::Validation(
            "You cannot deactivate your own account".into(),
        )));
    }
    if !UserRepo::deactivate(&state.pool, id).await? {
        return Err(AppError::Core(CoreError::NotFound { entity: "User", id }));
    }
    SessionRepo::revoke_all_for_user(&state.pool, id).await?;
    tracing::info!(user_id = id, deactivated_by = admin.user_id, "User deactivated");
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/admin/users/{id}/roles
pub async fn set_user_roles(
    State(state): State<AppState>,
    Require(_admin, _): Require<SystemUserManage>,
    Path(id): Path<DbId>,
    Json(input): Json<SetRolesRequest>,
) -> AppResult<Json<UserResponse>> {
    let user = UserRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound { entity: "User", id }))?;
    RoleRepo::set_user_roles(&state.pool, id, &input.role_ids).await?;
    Ok(Json(user_to_response(&state, &user).await?))
}

async fn user_to_response(state: &AppState, user: &User) -> AppResult<UserResponse> {
    let roles = RoleRepo::codes_for_user(&state.pool, user.id).await?;
    Ok(UserResponse::from_user(user, roles))
}

// ---------------------------------------------------------------------------
// Roles and permissions
// ---------------------------------------------------------------------------

/// GET /api/admin/roles
pub async fn list_roles(
    State(state): State<AppState>,
    Require(_admin, _): Require<SystemRoleManage>,
) -> AppResult<Json<DataResponse<Vec<Role>>>> {
    let roles = RoleRepo::list(&state.pool).await?;
    Ok(Json(DataResponse { data: roles }))
}

/// POST /api/admin/roles
pub async fn create_role(
    State(state): State<AppState>,
    Require(_admin, _): Require<SystemRoleManage>,
    Json(input): Json<CreateRole>,
) -> AppResult<(StatusCode, Json<Role>)> {
    required("code", &input.code)?;
    required("name", &input.name)?;
    let role = RoleRepo::create(&state.pool, &input).await?;
    Ok((StatusCode::CREATED, Json(role)))
}

/// GET /api/admin/roles/{id}/permissions
pub async fn role_permissions(
    State(state): State<AppState>,
    Require(_admin, _): Require<SystemRoleManage>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Vec<Permission>>>> {
    RoleRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound { entity: "Role", id }))?;
    let perms = PermissionRepo::list_for_role(&state.pool, id).await?;
    Ok(Json(DataResponse { data: perms }))
}

/// PUT /api/admin/roles/{id}/permissions
///
/// Replaces the role's permission set.
pub async fn set_role_permissions(
    State(state): State<AppState>,
    Require(admin, _): Require<SystemRoleManage>,
    Path(id): Path<DbId>,
    Json(input): Json<SetPermissionsRequest>,
) -> AppResult<Json<DataResponse<Vec<Permission>>>> {
    RoleRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound { entity: "Role", id }))?;
    RoleRepo::set_permissions(&state.pool, id, &input.permission_ids).await?;
    tracing::info!(role_id = id, changed_by = admin.user_id, "Role permissions replaced");

    let perms = PermissionRepo::list_for_role(&state.pool, id).await?;
    Ok(Json(DataResponse { data: perms }))
}

/// GET /api/admin/permissions
pub async fn list_permissions(
    State(state): State<AppState>,
    Require(_admin, _): Require<SystemRoleManage>,
) -> AppResult<Json<DataResponse<Vec<Permission>>>> {
    let perms = PermissionRepo::list(&state.pool).await?;
    Ok(Json(DataResponse { data: perms }))
}

// ---------------------------------------------------------------------------
// Departments
// ---------------------------------------------------------------------------

/// GET /api/admin/departments
pub async fn list_departments(
    State(state): State<AppState>,
    Require(_admin, _): Require<SystemDepartmentManage>,
) -> AppResult<Json<DataResponse<Vec<Department>>>> {
    let departments = DepartmentRepo::list(&state.pool).await?;
    Ok(Json(DataResponse { data: departments }))
}

/// POST /api/admin/departments
pub async fn create_department(
    State(state): State<AppState>,
    Require(_admin, _): Require<SystemDepartmentManage>,
    Json(input): Json<CreateDepartment>,
) -> AppResult<(StatusCode, Json<Department>)> {
    required("name", &input.name)?;
    let department = DepartmentRepo::create(&state.pool, &input).await?;
    Ok((StatusCode::CREATED, Json(department)))
}

/// PUT /api/admin/departments/{id}
pub async fn update_department(
    State(state): State<AppState>,
    Require(_admin, _): Require<SystemDepartmentManage>,
    Path(id): Path<DbId>,
    Json(input): Json<UpdateDepartment>,
) -> AppResult<Json<Department>> {
    if input.parent_id == Some(id) {
        return Err(AppError::Core(CoreError::Validation(
            "A department cannot be its own parent".into(),
        )));
    }
    let department = DepartmentRepo::update(&state.pool, id, &input)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Department",
            id,
        }))?;
    Ok(Json(department))
}

/// DELETE /api/admin/departments/{id}
pub async fn delete_department(
    State(state): State<AppState>,
    Require(_admin, _): Require<SystemDepartmentManage>,
    Path(id): Path<DbId>,
) -> AppResult<StatusCode> {
    if !DepartmentRepo::soft_delete(&state.pool, id).await? {
        return Err(AppError::Core(CoreError::NotFound {
            entity: "Department",
            id,
        }));
    }
    Ok(StatusCode::NO_CONTENT)
}
