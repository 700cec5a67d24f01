//! Domain logic for the OA backend.
//!
//! This crate has zero internal dependencies: it holds the error taxonomy,
//! status encodings, permission tags, and the pure parts of the workflow
//! engine and meeting reservation state machine so they can be unit-tested
//! without a database.

pub mod approval;
pub mod error;
pub mod meeting;
pub mod paging;
pub mod permissions;
pub mod roles;
pub mod status;
pub mod types;
pub mod workflow;
