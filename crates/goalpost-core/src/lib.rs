//! # Goalpost Core
//!
//! Core primitives and types for delivery goals.
//!
//! This crate provides the fundamental building blocks:
//! - [`GoalRecord`] - One delivery goal for one push
//! - [`GoalSet`] - The rollup of all goals of a push
//! - [`GoalState`] / [`GoalSetState`] - Lifecycle states and transition rules
//! - [`GoalError`] - Error types

pub mod error;
pub mod goal;
pub mod goal_set;
pub mod state;
pub mod types;

// Re-exports for convenience
pub use error::{GoalError, Result};
pub use goal::{GoalRecord, GoalRecordBuilder, Provenance};
pub use goal_set::GoalSet;
pub use state::{GoalSetState, GoalState};
pub use types::*;
