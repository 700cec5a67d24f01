//! Request handlers, one module per resource group.
//!
//! Handlers extract identity and input, delegate to the engine services or
//! straight to a repository for plain reads, and map errors via
//! [`AppError`](crate::error::AppError).

pub mod admin;
pub mod approval;
pub mod auth;
pub mod meeting;
pub mod workflow_definition;
pub mod workflow_instance;
