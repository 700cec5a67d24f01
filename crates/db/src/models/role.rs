//! Role and permission models.

use oa_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A role row from the `roles` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Role {
    pub id: DbId,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A permission row; `tag` is the string checked by the authorization guard.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Permission {
    pub id: DbId,
    pub tag: String,
    pub name: String,
    pub created_at: Timestamp,
}

/// DTO for creating a role.
#[derive(Debug, Deserialize)]
pub struct CreateRole {
    pub code: String,
    pub name: String,
    pub description: Option<String>,
}
