//! Core identifier types for the amber-relay workflow engine.
//!
//! This crate provides the strongly-typed identifiers shared by the other
//! workspace crates: generated execution ids and the string ids authored in
//! workflow configurations.

pub mod id;

pub use id::{EdgeId, ExecutionId, NodeId, ParseIdError, WorkflowId};
