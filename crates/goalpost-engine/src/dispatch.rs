//! Completion dispatch.
//!
//! After every goal transition the dispatcher recomputes the rollup of the
//! goal's set and persists it when it changed. A changed rollup caused by a
//! terminal or waiting goal is also announced to the registered listeners.
//! Listener errors are logged and collected; they never undo the persisted
//! rollup and never keep the remaining listeners from running.

use std::sync::Arc;

use async_trait::async_trait;
use goalpost_core::{
    GoalError, GoalRecord, GoalSet, GoalSetId, GoalSetState, Result,
};
use goalpost_store::{GoalQuery, GoalStore};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::admission::AdmissionController;
use crate::aggregate::rollup;

/// What listeners receive when a goal set's rollup changes.
#[derive(Debug, Clone, Serialize)]
pub struct GoalCompletion {
    /// The goal whose transition caused the change.
    pub completed_goal: GoalRecord,

    /// Every goal of the goal set, as read for the rollup.
    pub all_goals: Vec<GoalRecord>,

    /// The new rollup.
    pub new_state: GoalSetState,
}

/// Trait for receiving goal set state changes (notifications, output
/// ingestion, ...).
#[async_trait]
pub trait GoalCompletionListener: Send + Sync {
    /// Name used when reporting failures.
    fn name(&self) -> &str;

    /// Handle a completion. Errors are logged and do not stop the system.
    async fn notify(&self, completion: &GoalCompletion) -> Result<()>;
}

/// Logs completions (always-on listener).
pub struct TracingListener;

#[async_trait]
impl GoalCompletionListener for TracingListener {
    fn name(&self) -> &str {
        "tracing"
    }

    async fn notify(&self, completion: &GoalCompletion) -> Result<()> {
        let goal = &completion.completed_goal;
        info!(
            goal_set_id = %goal.goal_set_id,
            repo = %goal.repo,
            sha = %goal.sha,
            goals = completion.all_goals.len(),
            "Goal set is now {} after {} became {}",
            completion.new_state,
            goal.unique_name,
            goal.state
        );
        Ok(())
    }
}

/// Outcome of one dispatch.
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    pub goal_set_id: GoalSetId,

    /// Rollup stored before this dispatch.
    pub previous_state: Option<GoalSetState>,

    /// Rollup computed by this dispatch.
    pub new_state: Option<GoalSetState>,

    /// Whether the goal set record was written.
    pub changed: bool,

    /// Whether listeners were called.
    pub notified: bool,

    /// Failures of individual listeners.
    pub listener_errors: Vec<GoalError>,

    /// Queued goal sets admitted because this goal set settled.
    pub admitted: Vec<GoalSetId>,
}

/// Recomputes goal set rollups and notifies listeners.
pub struct CompletionDispatcher {
    store: Arc<dyn GoalStore>,
    listeners: Vec<Arc<dyn GoalCompletionListener>>,
    admission: Option<Arc<AdmissionController>>,
}

impl CompletionDispatcher {
    /// Create a dispatcher with no listeners.
    pub fn new(store: Arc<dyn GoalStore>) -> Self {
        Self {
            store,
            listeners: Vec::new(),
            admission: None,
        }
    }

    /// Add a listener; listeners run in the order they were added.
    pub fn with_listener(mut self, listener: Arc<dyn GoalCompletionListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn with_listeners(
        mut self,
        listeners: impl IntoIterator<Item = Arc<dyn GoalCompletionListener>>,
    ) -> Self {
        self.listeners.extend(listeners);
        self
    }

    /// Re-evaluate admission whenever a goal set settles.
    pub fn with_admission(mut self, admission: Arc<AdmissionController>) -> Self {
        self.admission = Some(admission);
        self
    }

    /// Recompute the rollup of `goal`'s goal set.
    pub async fn dispatch(&self, goal: &GoalRecord) -> Result<DispatchReport> {
        let goal_set_id = goal.goal_set_id.clone();
        let all_goals = self
            .store
            .find(&GoalQuery::goal_set(goal_set_id.clone()))
            .await?;
        let new_state = rollup(&all_goals).ok_or_else(|| GoalError::StateError {
            message: format!("Goal set {} has no goals", goal_set_id),
        })?;

        let stored = self.store.find_goal_set(&goal_set_id).await?;
        let previous_state = stored.as_ref().map(|goal_set| goal_set.state);
        let mut report = DispatchReport {
            goal_set_id: goal_set_id.clone(),
            previous_state,
            new_state: Some(new_state),
            ..Default::default()
        };

        if previous_state == Some(new_state) {
            debug!("Goal set {} unchanged ({})", goal_set_id, new_state);
            return Ok(report);
        }

        let goal_set = match stored {
            Some(goal_set) => goal_set.with_state(new_state),
            None => GoalSet::for_goal(goal, new_state).ok_or_else(|| GoalError::GoalInvalid {
                message: format!("Goal {} has no provenance", goal.key()),
            })?,
        };
        let registration = goal_set.registration.clone();
        self.store.save_goal_set(goal_set).await?;
        report.changed = true;

        info!(
            "Goal set {} {} -> {}",
            goal_set_id,
            previous_state.map_or("none", |s| s.as_str()),
            new_state
        );

        if !goal.state.triggers_completion() {
            return Ok(report);
        }

        let completion = GoalCompletion {
            completed_goal: goal.clone(),
            all_goals,
            new_state,
        };
        report.notified = true;
        for listener in &self.listeners {
            if let Err(e) = listener.notify(&completion).await {
                warn!("Listener {} failed for goal set {}: {}", listener.name(), goal_set_id, e);
                report.listener_errors.push(GoalError::Listener {
                    listener: listener.name().to_string(),
                    message: e.to_string(),
                });
            }
        }

        if new_state.is_terminal() {
            if let Some(admission) = &self.admission {
                if admission.registration() == &registration {
                    match admission.reevaluate().await {
                        Ok(admitted) => report.admitted = admitted,
                        Err(e) => {
                            warn!("Admission re-evaluation after {} failed: {}", goal_set_id, e)
                        }
                    }
                }
            }
        }

        Ok(report)
    }
}
