//! # Goalpost Store
//!
//! Goal record storage. Every implementation enforces the optimistic
//! concurrency contract: `save` accepts a record only if its `version`
//! matches the stored one, and persists it with `version + 1`.

pub mod query;
pub mod store;

pub use query::{GoalQuery, GoalSetQuery};
pub use store::{GoalStore, InMemoryGoalStore};
