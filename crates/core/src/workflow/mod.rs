//! Workflow engine: pure logic.
//!
//! - [`node`] -- the node shape stored in definitions and instance snapshots.
//! - [`expression`] -- the condition-expression language used on branches.
//! - [`graph`] -- publish-time validation of a definition graph.
//! - [`assignment`] -- assignment rules and their resolution to user ids.
//! - [`runtime`] -- stepping rules the instance runtime applies.

pub mod assignment;
pub mod expression;
pub mod graph;
pub mod node;
pub mod runtime;
