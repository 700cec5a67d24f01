//! Repository for the `departments` table.

use oa_core::types::DbId;
use sqlx::PgPool;

use crate::models::department::{CreateDepartment, Department, UpdateDepartment};

const COLUMNS: &str = "id, name, parent_id, head_user_id, created_at, updated_at";

pub struct DepartmentRepo;

impl DepartmentRepo {
    pub async fn create(pool: &PgPool, input: &CreateDepartment) -> Result<Department, sqlx::Error> {
        let query = format!(
            "INSERT INTO departments (name, parent_id, head_user_id)
             VALUES ($1, $2, $3)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Department>(&query)
            .bind(&input.name)
            .bind(input.parent_id)
            .bind(input.head_user_id)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Department>, sqlx::Error> {
        let query =
            format!("SELECT {COLUMNS} FROM departments WHERE id = $1 AND deleted_at IS NULL");
        sqlx::query_as::<_, Department>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list(pool: &PgPool) -> Result<Vec<Department>, sqlx::Error> {
        let query =
            format!("SELECT {COLUMNS} FROM departments WHERE deleted_at IS NULL ORDER BY name");
        sqlx::query_as::<_, Department>(&query).fetch_all(pool).await
    }

    pub async fn update(
        pool: &PgPool,
        id: DbId,
        input: &UpdateDepartment,
    ) -> Result<Option<Department>, sqlx::Error> {
        let query = format!(
            "UPDATE departments SET
                name = COALESCE($2, name),
                parent_id = COALESCE($3, parent_id),
                head_user_id = COALESCE($4, head_user_id)
             WHERE id = $1 AND deleted_at IS NULL
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Department>(&query)
            .bind(id)
            .bind(&input.name)
            .bind(input.parent_id)
            .bind(input.head_user_id)
            .fetch_optional(pool)
            .await
    }

    /// Soft-delete a department. Returns `true` if the row was marked.
    pub async fn soft_delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE departments SET deleted_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
