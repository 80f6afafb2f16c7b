//! Admission of goal sets under a concurrency policy.
//!
//! Decisions are advisory: the controller never blocks. A goal set that may
//! not run yet is marked by a queue position in the phase of its current
//! goal (`at 1`, `at 2`, ...); the goal's state is left alone.

use std::sync::Arc;

use goalpost_core::{GoalError, GoalRecord, GoalSet, GoalSetId, Registration, Result};
use goalpost_store::{GoalQuery, GoalSetQuery, GoalStore};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::AdmissionPolicy;
use crate::provenance::ProvenanceTracker;

/// Admission decision for one goal set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Admission {
    pub goal_set_id: GoalSetId,

    /// Whether the goal set may start its goals now.
    pub proceed: bool,

    /// One-based queue position when queued; `None` when admitted or when
    /// the goal set was not among the inspected active goal sets.
    pub position: Option<usize>,
}

/// Queue phase text for a one-based queue position.
pub fn queue_phase(position: usize) -> String {
    format!("at {}", position)
}

fn is_queue_phase(phase: &str) -> bool {
    phase
        .strip_prefix("at ")
        .map_or(false, |n| n.parse::<usize>().is_ok())
}

/// Limits how many goal sets of one registration run at the same time.
pub struct AdmissionController {
    store: Arc<dyn GoalStore>,
    tracker: ProvenanceTracker,
    policy: AdmissionPolicy,
}

impl AdmissionController {
    pub fn new(
        store: Arc<dyn GoalStore>,
        tracker: ProvenanceTracker,
        policy: AdmissionPolicy,
    ) -> Self {
        Self {
            store,
            tracker,
            policy,
        }
    }

    pub fn registration(&self) -> &Registration {
        self.tracker.registration()
    }

    pub fn policy(&self) -> AdmissionPolicy {
        self.policy
    }

    /// Decide whether `goal_set_id` may proceed.
    pub async fn admit(&self, goal_set_id: &GoalSetId) -> Result<Admission> {
        let active = self.active_goal_sets().await?;
        let index = active
            .iter()
            .position(|goal_set| &goal_set.goal_set_id == goal_set_id);

        let (admission, _) = self.decide(goal_set_id, index).await?;
        Ok(admission)
    }

    /// Re-run admission for every active goal set of this registration.
    ///
    /// Returns the goal sets that were queued and may now proceed.
    pub async fn reevaluate(&self) -> Result<Vec<GoalSetId>> {
        let active = self.active_goal_sets().await?;
        let mut admitted = Vec::new();

        for (index, goal_set) in active.iter().enumerate() {
            let (admission, phase_changed) = self.decide(&goal_set.goal_set_id, Some(index)).await?;
            if admission.proceed && phase_changed {
                info!("Goal set {} admitted from queue", goal_set.goal_set_id);
                admitted.push(goal_set.goal_set_id.clone());
            }
        }

        Ok(admitted)
    }

    async fn active_goal_sets(&self) -> Result<Vec<GoalSet>> {
        let query = GoalSetQuery::active(self.registration().clone(), self.policy.fetch);
        self.store.find_goal_sets(&query).await
    }

    async fn decide(
        &self,
        goal_set_id: &GoalSetId,
        index: Option<usize>,
    ) -> Result<(Admission, bool)> {
        match index {
            Some(index) if index < self.policy.concurrent => {
                let changed = self.mark(goal_set_id, None).await?;
                Ok((
                    Admission {
                        goal_set_id: goal_set_id.clone(),
                        proceed: true,
                        position: None,
                    },
                    changed,
                ))
            }
            Some(index) => {
                let position = index + 1 - self.policy.concurrent;
                let changed = self.mark(goal_set_id, Some(queue_phase(position))).await?;
                debug!("Goal set {} queued at {}", goal_set_id, position);
                Ok((
                    Admission {
                        goal_set_id: goal_set_id.clone(),
                        proceed: false,
                        position: Some(position),
                    },
                    changed,
                ))
            }
            None => {
                debug!(
                    "Goal set {} is not among the first {} active goal sets of {}",
                    goal_set_id,
                    self.policy.fetch,
                    self.registration()
                );
                Ok((
                    Admission {
                        goal_set_id: goal_set_id.clone(),
                        proceed: false,
                        position: None,
                    },
                    false,
                ))
            }
        }
    }

    /// Write `phase` onto the goal set's current goal.
    ///
    /// Clearing (`None`) only removes a queue phase, never a phase set by an
    /// executor. Returns whether the goal was written.
    async fn mark(&self, goal_set_id: &GoalSetId, phase: Option<String>) -> Result<bool> {
        let Some(goal) = self.current_goal(goal_set_id).await? else {
            return Ok(false);
        };

        let unchanged = match (&phase, &goal.phase) {
            (Some(wanted), Some(current)) => wanted == current,
            (None, Some(current)) => !is_queue_phase(current),
            (None, None) => true,
            (Some(_), None) => false,
        };
        if unchanged {
            return Ok(false);
        }

        let key = goal.key();
        let mut next = goal;
        next.phase = phase;
        self.tracker.append(&mut next, &self.tracker.system());

        match self.store.save(next).await {
            Ok(_) => Ok(true),
            Err(GoalError::StaleVersion { .. }) => {
                debug!("Goal {} changed while updating its queue phase", key);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Earliest goal of the set that is not terminal.
    async fn current_goal(&self, goal_set_id: &GoalSetId) -> Result<Option<GoalRecord>> {
        let goals = self
            .store
            .find(&GoalQuery::goal_set(goal_set_id.clone()))
            .await?;
        Ok(goals.into_iter().find(|goal| !goal.state.is_terminal()))
    }
}
