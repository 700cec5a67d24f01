//! Department model and DTOs.

use oa_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Department {
    pub id: DbId,
    pub name: String,
    pub parent_id: Option<DbId>,
    pub head_user_id: Option<DbId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Deserialize)]
pub struct CreateDepartment {
    pub name: String,
    pub parent_id: Option<DbId>,
    pub head_user_id: Option<DbId>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateDepartment {
    pub name: Option<String>,
    pub parent_id: Option<DbId>,
    pub head_user_id: Option<DbId>,
}
