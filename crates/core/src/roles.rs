//! Well-known role codes.
//!
//! These must match the seed data in `20260301000002_create_rbac_tables.sql`.

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_EMPLOYEE: &str = "employee";
