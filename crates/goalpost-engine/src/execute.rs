//! Goal execution.
//!
//! The runner drives one goal through an executor: it marks the goal as
//! in process, hands the executor a cancellation token, and records the
//! outcome as the goal's next state.

use std::sync::Arc;

use async_trait::async_trait;
use goalpost_core::{GoalError, GoalKey, GoalRecord, GoalState, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::machine::{GoalStateMachine, GoalUpdate};
use crate::provenance::ProvenanceTracker;
use crate::token::{CancellationRegistry, CancellationToken};

/// What an executor reports back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteGoalResult {
    /// Exit code; anything but 0 fails the goal.
    pub code: i32,

    /// Explicit next state, overriding the default outcome.
    #[serde(default)]
    pub state: Option<GoalState>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub phase: Option<String>,

    #[serde(default)]
    pub data: Option<String>,
}

impl ExecuteGoalResult {
    pub fn success() -> Self {
        Self::default()
    }

    pub fn code(code: i32) -> Self {
        Self {
            code,
            ..Default::default()
        }
    }
}

/// Performs the work of a goal.
///
/// Implementations should watch `token` and return early once it is
/// cancelled; the runner discards their result in that case.
#[async_trait]
pub trait GoalExecutor: Send + Sync {
    async fn execute(
        &self,
        goal: &GoalRecord,
        token: CancellationToken,
    ) -> Result<ExecuteGoalResult>;
}

/// Runs goals through executors and records their outcome.
pub struct GoalRunner {
    machine: Arc<GoalStateMachine>,
    tracker: ProvenanceTracker,
    tokens: Arc<CancellationRegistry>,
}

impl GoalRunner {
    pub fn new(
        machine: Arc<GoalStateMachine>,
        tracker: ProvenanceTracker,
        tokens: Arc<CancellationRegistry>,
    ) -> Self {
        Self {
            machine,
            tracker,
            tokens,
        }
    }

    pub fn tokens(&self) -> &Arc<CancellationRegistry> {
        &self.tokens
    }

    /// Execute `goal` and return it in the state the execution left it in.
    pub async fn run(&self, goal: &GoalRecord, executor: &dyn GoalExecutor) -> Result<GoalRecord> {
        let actor = self.tracker.system();
        let started = if goal.state == GoalState::InProcess {
            goal.clone()
        } else {
            self.machine
                .transition(goal, GoalState::InProcess, &actor)
                .await?
        };

        let key = started.key();
        let token = self.tokens.register(&key).await;
        let outcome = executor.execute(&started, token.clone()).await;
        self.tokens.release(&key).await;

        if token.is_cancelled() {
            info!("Goal {} was canceled while executing", key);
            return self.reload(&key).await;
        }

        let finished = match outcome {
            Err(e) => {
                let message = match e {
                    GoalError::Executor { message, .. } => message,
                    other => other.to_string(),
                };
                self.machine.fail(&started, message, &actor).await
            }
            Ok(result) => {
                let explicit = result.code == 0 && result.state.is_some();
                let target = if result.code != 0 {
                    GoalState::Failure
                } else if let Some(state) = result.state {
                    state
                } else if started.approval_required {
                    GoalState::WaitingForApproval
                } else {
                    GoalState::Success
                };
                let update = GoalUpdate {
                    description: result.description,
                    phase: result.phase,
                    url: result.url,
                    data: result.data,
                    error: (result.code != 0)
                        .then(|| format!("Goal execution exited with code {}", result.code)),
                };
                match self
                    .machine
                    .transition_with(&started, target, &actor, update)
                    .await
                {
                    Err(e @ GoalError::InvalidTransition { .. }) if explicit => {
                        warn!("Executor reported an unreachable state for {}: {}", key, e);
                        let message = format!("Executor reported {}: {}", target, e);
                        self.machine.fail(&started, message, &actor).await
                    }
                    other => other,
                }
            }
        };

        match finished {
            Err(e @ GoalError::StaleVersion { .. }) => {
                let stored = self.reload(&key).await?;
                if stored.state.is_terminal() {
                    debug!("Goal {} settled as {} during execution", key, stored.state);
                    Ok(stored)
                } else {
                    Err(e)
                }
            }
            other => other,
        }
    }

    async fn reload(&self, key: &GoalKey) -> Result<GoalRecord> {
        self.machine
            .store()
            .get(key)
            .await?
            .ok_or_else(|| GoalError::goal_not_found(key))
    }
}
