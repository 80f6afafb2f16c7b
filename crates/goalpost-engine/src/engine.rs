//! The goal engine: every component wired over one store.

use std::collections::HashSet;
use std::sync::Arc;

use goalpost_core::{
    GoalError, GoalKey, GoalRecord, GoalSet, GoalSetId, GoalState, Push, Result,
};
use goalpost_store::{GoalQuery, GoalStore};
use tracing::info;

use crate::admission::{Admission, AdmissionController};
use crate::aggregate::rollup;
use crate::cancel::{CancellableGoals, CancellationCoordinator, CancellationResult};
use crate::config::EngineConfig;
use crate::dispatch::{CompletionDispatcher, GoalCompletionListener};
use crate::execute::{GoalExecutor, GoalRunner};
use crate::machine::{GoalStateMachine, GoalUpdate};
use crate::provenance::{ActorContext, ProvenanceTracker};
use crate::token::CancellationRegistry;

/// Entry point for planning, driving and cancelling delivery goals.
pub struct GoalEngine {
    config: EngineConfig,
    store: Arc<dyn GoalStore>,
    tracker: ProvenanceTracker,
    machine: Arc<GoalStateMachine>,
    admission: Arc<AdmissionController>,
    coordinator: CancellationCoordinator,
    runner: GoalRunner,
}

impl GoalEngine {
    /// Wire an engine over `store`. Listeners run in the given order.
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn GoalStore>,
        listeners: Vec<Arc<dyn GoalCompletionListener>>,
    ) -> Result<Self> {
        config.validate()?;
        let tracker = ProvenanceTracker::from_config(&config);
        let tokens = Arc::new(CancellationRegistry::new());

        let admission = Arc::new(AdmissionController::new(
            store.clone(),
            tracker.clone(),
            config.admission,
        ));
        let dispatcher = Arc::new(
            CompletionDispatcher::new(store.clone())
                .with_listeners(listeners)
                .with_admission(admission.clone()),
        );
        let machine = Arc::new(
            GoalStateMachine::new(store.clone(), tracker.clone()).with_dispatcher(dispatcher),
        );
        let coordinator = CancellationCoordinator::new(
            machine.clone(),
            tracker.clone(),
            CancellableGoals::from_names(config.cancellable.as_deref()),
        )
        .with_tokens(tokens.clone());
        let runner = GoalRunner::new(machine.clone(), tracker.clone(), tokens);

        info!(
            "Goal engine {} {} ready for registration {}",
            config.name,
            config.version,
            tracker.registration()
        );

        Ok(Self {
            config,
            store,
            tracker,
            machine,
            admission,
            coordinator,
            runner,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn GoalStore> {
        &self.store
    }

    pub fn tracker(&self) -> &ProvenanceTracker {
        &self.tracker
    }

    pub fn machine(&self) -> &Arc<GoalStateMachine> {
        &self.machine
    }

    pub fn tokens(&self) -> &Arc<CancellationRegistry> {
        self.runner.tokens()
    }

    /// Persist the goals planned for one push and record the goal set.
    pub async fn plan_goal_set(&self, goals: Vec<GoalRecord>) -> Result<GoalSet> {
        let Some(first) = goals.first() else {
            return Err(GoalError::GoalInvalid {
                message: "A goal set needs at least one goal".to_string(),
            });
        };
        let goal_set_id = first.goal_set_id.clone();

        let mut names = HashSet::new();
        for goal in &goals {
            if goal.goal_set_id != goal_set_id {
                return Err(GoalError::GoalInvalid {
                    message: format!(
                        "Goal {} does not belong to goal set {}",
                        goal.key(),
                        goal_set_id
                    ),
                });
            }
            if !names.insert(goal.unique_name.as_str()) {
                return Err(GoalError::GoalInvalid {
                    message: format!(
                        "Duplicate goal {} in goal set {}",
                        goal.unique_name, goal_set_id
                    ),
                });
            }
            if !goal.state.is_valid_initial() {
                return Err(GoalError::GoalInvalid {
                    message: format!("Goal {} cannot be planned as {}", goal.key(), goal.state),
                });
            }
        }
        if self.store.find_goal_set(&goal_set_id).await?.is_some() {
            return Err(GoalError::GoalInvalid {
                message: format!("Goal set {} already exists", goal_set_id),
            });
        }

        let mut stored = Vec::with_capacity(goals.len());
        for goal in goals {
            stored.push(self.store.save(goal).await?);
        }

        let state = rollup(&stored).ok_or_else(|| GoalError::StateError {
            message: format!("Goal set {} has no goals", goal_set_id),
        })?;
        let goal_set =
            GoalSet::for_goal(&stored[0], state).ok_or_else(|| GoalError::GoalInvalid {
                message: format!("Goal {} has no provenance", stored[0].key()),
            })?;
        self.store.save_goal_set(goal_set.clone()).await?;

        info!(
            "Planned goal set {} with {} goal(s) for {} {} ({})",
            goal_set_id,
            stored.len(),
            goal_set.repo,
            goal_set.branch,
            goal_set.sha
        );
        Ok(goal_set)
    }

    pub async fn goal(&self, key: &GoalKey) -> Result<GoalRecord> {
        self.store
            .get(key)
            .await?
            .ok_or_else(|| GoalError::goal_not_found(key))
    }

    pub async fn goals(&self, goal_set_id: &GoalSetId) -> Result<Vec<GoalRecord>> {
        self.store.find(&GoalQuery::goal_set(goal_set_id.clone())).await
    }

    pub async fn goal_set(&self, goal_set_id: &GoalSetId) -> Result<GoalSet> {
        self.store
            .find_goal_set(goal_set_id)
            .await?
            .ok_or_else(|| GoalError::NotFound {
                resource_type: "goal_set".to_string(),
                id: goal_set_id.to_string(),
            })
    }

    /// Every persisted version of a goal, oldest first.
    pub async fn history(&self, key: &GoalKey) -> Result<Vec<GoalRecord>> {
        let history = self.store.history(key).await?;
        if history.is_empty() {
            return Err(GoalError::goal_not_found(key));
        }
        Ok(history)
    }

    /// Cancel the goals superseded by `push`.
    pub async fn on_push(&self, push: &Push) -> Result<CancellationResult> {
        self.coordinator.cancel_superseded_goals(push).await
    }

    /// Move a goal to `target`, provided it is still at `version`.
    pub async fn transition(
        &self,
        key: &GoalKey,
        version: u64,
        target: GoalState,
        context: &ActorContext,
        update: GoalUpdate,
    ) -> Result<GoalRecord> {
        let goal = self.goal(key).await?;
        if goal.version != version {
            return Err(GoalError::StaleVersion {
                key: key.clone(),
                expected: version,
                actual: goal.version,
            });
        }
        let actor = self.tracker.actor(context);
        self.machine
            .transition_with(&goal, target, &actor, update)
            .await
    }

    /// Whether the goal set may start now.
    pub async fn admit(&self, goal_set_id: &GoalSetId) -> Result<Admission> {
        self.admission.admit(goal_set_id).await
    }

    /// Execute a goal through `executor`.
    pub async fn run(&self, key: &GoalKey, executor: &dyn GoalExecutor) -> Result<GoalRecord> {
        let goal = self.goal(key).await?;
        self.runner.run(&goal, executor).await
    }
}
