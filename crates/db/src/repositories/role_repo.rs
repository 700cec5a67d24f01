//! Repository for `roles`, `permissions` and their assignment tables.

use oa_core::types::DbId;
use sqlx::PgPool;

use crate::models::role::{CreateRole, Permission, Role};

const COLUMNS: &str = "id, code, name, description, created_at, updated_at";
const PERMISSION_COLUMNS: &str = "id, tag, name, created_at";

pub struct RoleRepo;

impl RoleRepo {
    pub async fn create(pool: &PgPool, input: &CreateRole) -> Result<Role, sqlx::Error> {
        let query = format!(
            "INSERT INTO roles (code, name, description) VALUES ($1, $2, $3) RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Role>(&query)
            .bind(&input.code)
            .bind(&input.name)
            .bind(&input.description)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Role>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM roles WHERE id = $1");
        sqlx::query_as::<_, Role>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_code(pool: &PgPool, code: &str) -> Result<Option<Role>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM roles WHERE code = $1");
        sqlx::query_as::<_, Role>(&query)
            .bind(code)
            .fetch_optional(pool)
            .await
    }

    pub async fn list(pool: &PgPool) -> Result<Vec<Role>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM roles ORDER BY id");
        sqlx::query_as::<_, Role>(&query).fetch_all(pool).await
    }

    /// Role codes held by a user, ordered by code.
    pub async fn codes_for_user(pool: &PgPool, user_id: DbId) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT r.code FROM roles r
             JOIN user_roles ur ON ur.role_id = r.id
             WHERE ur.user_id = $1
             ORDER BY r.code",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    /// Replace a user's roles atomically.
    pub async fn set_user_roles(
        pool: &PgPool,
        user_id: DbId,
        role_ids: &[DbId],
    ) -> Result<(), sqlx::Error> {
        let mut tx = pool.begin().await?;
        sqlx::query("DELETE FROM user_roles WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO user_roles (user_id, role_id)
             SELECT $1, UNNEST($2::BIGINT[])
             ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(role_ids)
        .execute(&mut *tx)
        .await?;
        tx.commit().await
    }

    /// Grant a single role; no-op when already held.
    pub async fn assign_to_user(
        pool: &PgPool,
        user_id: DbId,
        role_id: DbId,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT INTO user_roles (user_id, role_id) VALUES ($1, $2) ON CONFLICT DO NOTHING")
            .bind(user_id)
            .bind(role_id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Replace a role's permissions atomically.
    pub async fn set_permissions(
        pool: &PgPool,
        role_id: DbId,
        permission_ids: &[DbId],
    ) -> Result<(), sqlx::Error> {
        let mut tx = pool.begin().await?;
        sqlx::query("DELETE FROM role_permissions WHERE role_id = $1")
            .bind(role_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO role_permissions (role_id, permission_id)
             SELECT $1, UNNEST($2::BIGINT[])
             ON CONFLICT DO NOTHING",
        )
        .bind(role_id)
        .bind(permission_ids)
        .execute(&mut *tx)
        .await?;
        tx.commit().await
    }
}

pub struct PermissionRepo;

impl PermissionRepo {
    pub async fn list(pool: &PgPool) -> Result<Vec<Permission>, sqlx::Error> {
        let query = format!("SELECT {PERMISSION_COLUMNS} FROM permissions ORDER BY tag");
        sqlx::query_as::<_, Permission>(&query).fetch_all(pool).await
    }

    pub async fn list_for_role(pool: &PgPool, role_id: DbId) -> Result<Vec<Permission>, sqlx::Error> {
        let query = format!(
            "SELECT p.id, p.tag, p.name, p.created_at FROM permissions p
             JOIN role_permissions rp ON rp.permission_id = p.id
             WHERE rp.role_id = $1
             ORDER BY p.tag"
        );
        sqlx::query_as::<_, Permission>(&query)
            .bind(role_id)
            .fetch_all(pool)
            .await
    }

    /// Every permission tag granted to a user through any of their roles.
    /// Deactivated users hold nothing.
    pub async fn tags_for_user(pool: &PgPool, user_id: DbId) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT DISTINCT p.tag FROM permissions p
             JOIN role_permissions rp ON rp.permission_id = p.id
             JOIN user_roles ur ON ur.role_id = rp.role_id
             JOIN users u ON u.id = ur.user_id
             WHERE ur.user_id = $1 AND u.is_active
             ORDER BY p.tag",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }
}
