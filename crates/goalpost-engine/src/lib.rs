//! # Goalpost Engine
//!
//! Goal lifecycle for source-control pushes: state transitions with
//! provenance, goal set rollup, completion dispatch, cancellation of goals
//! superseded by a later push and admission of goal sets under a
//! concurrency policy.

pub mod admission;
pub mod aggregate;
pub mod cancel;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod execute;
pub mod machine;
pub mod provenance;
pub mod token;

#[cfg(test)]
mod testing;

pub use admission::{queue_phase, Admission, AdmissionController};
pub use aggregate::{rollup, rollup_states};
pub use cancel::{
    CancellableGoals, CancellationCoordinator, CancellationFailure, CancellationResult,
    GoalDefinition, GoalFilter,
};
pub use config::{AdmissionPolicy, EngineConfig};
pub use dispatch::{
    CompletionDispatcher, DispatchReport, GoalCompletion, GoalCompletionListener, TracingListener,
};
pub use engine::GoalEngine;
pub use execute::{ExecuteGoalResult, GoalExecutor, GoalRunner};
pub use machine::{GoalStateMachine, GoalUpdate};
pub use provenance::{ActorContext, ProvenanceTracker};
pub use token::{CancellationRegistry, CancellationToken};
