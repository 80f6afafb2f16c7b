//! Cancellation of goals superseded by a later push.
//!
//! When a branch receives a new push, the goals still pending for the
//! previous branch tip are canceled. Only goals created by this
//! registration (or by the registration this process is a sub-job of) are
//! touched.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use futures::future::join_all;
use goalpost_core::{GoalError, GoalKey, GoalRecord, GoalSetId, Push, Result};
use goalpost_store::GoalQuery;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::machine::GoalStateMachine;
use crate::provenance::{ActorContext, ProvenanceTracker};
use crate::token::CancellationRegistry;

/// Predicate over goal records.
pub type GoalPredicate = Arc<dyn Fn(&GoalRecord) -> bool + Send + Sync>;

/// A goal that may be canceled, identified by its unique name.
#[derive(Clone)]
pub struct GoalDefinition {
    pub unique_name: String,
    predicate: Option<GoalPredicate>,
}

impl GoalDefinition {
    pub fn new(unique_name: impl Into<String>) -> Self {
        Self {
            unique_name: unique_name.into(),
            predicate: None,
        }
    }

    /// Further restrict which goals of this name are cancellable.
    pub fn with_predicate(
        mut self,
        predicate: impl Fn(&GoalRecord) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    pub fn matches(&self, goal: &GoalRecord) -> bool {
        goal.unique_name == self.unique_name
            && self.predicate.as_ref().map_or(true, |p| p(goal))
    }
}

impl fmt::Debug for GoalDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoalDefinition")
            .field("unique_name", &self.unique_name)
            .field("predicate", &self.predicate.is_some())
            .finish()
    }
}

/// Which goals a later push may cancel.
#[derive(Debug, Clone)]
pub enum CancellableGoals {
    All,
    Only(Vec<GoalDefinition>),
}

impl CancellableGoals {
    /// `None` means every goal.
    pub fn from_names(names: Option<&[String]>) -> Self {
        match names {
            None => CancellableGoals::All,
            Some(names) => {
                CancellableGoals::Only(names.iter().map(GoalDefinition::new).collect())
            }
        }
    }

    pub fn matches(&self, goal: &GoalRecord) -> bool {
        match self {
            CancellableGoals::All => true,
            CancellableGoals::Only(definitions) => definitions.iter().any(|d| d.matches(goal)),
        }
    }
}

/// State filter applied to cancellation candidates.
#[derive(Clone)]
pub struct GoalFilter(GoalPredicate);

impl GoalFilter {
    pub fn new(predicate: impl Fn(&GoalRecord) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(predicate))
    }

    pub fn matches(&self, goal: &GoalRecord) -> bool {
        (self.0)(goal)
    }
}

impl Default for GoalFilter {
    fn default() -> Self {
        Self::new(|goal| goal.state.is_cancellable_by_default())
    }
}

/// A goal that matched but could not be canceled.
#[derive(Debug, Clone, Serialize)]
pub struct CancellationFailure {
    pub key: GoalKey,
    pub message: String,
}

/// Outcome of canceling superseded goals.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CancellationResult {
    /// Goal sets with at least one canceled goal.
    pub goal_set_ids: BTreeSet<GoalSetId>,

    pub canceled: Vec<GoalKey>,

    pub failed: Vec<CancellationFailure>,
}

impl CancellationResult {
    /// True when no goal was canceled.
    pub fn is_noop(&self) -> bool {
        self.goal_set_ids.is_empty()
    }
}

/// Cancels goals of the previous push on the same branch.
pub struct CancellationCoordinator {
    machine: Arc<GoalStateMachine>,
    tracker: ProvenanceTracker,
    cancellable: CancellableGoals,
    filter: GoalFilter,
    tokens: Option<Arc<CancellationRegistry>>,
}

impl CancellationCoordinator {
    pub fn new(
        machine: Arc<GoalStateMachine>,
        tracker: ProvenanceTracker,
        cancellable: CancellableGoals,
    ) -> Self {
        Self {
            machine,
            tracker,
            cancellable,
            filter: GoalFilter::default(),
            tokens: None,
        }
    }

    pub fn with_filter(mut self, filter: GoalFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Signal running executors of canceled goals through `tokens`.
    pub fn with_tokens(mut self, tokens: Arc<CancellationRegistry>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    /// Cancel the still-pending goals planned for `push.before`.
    pub async fn cancel_superseded_goals(&self, push: &Push) -> Result<CancellationResult> {
        let mut result = CancellationResult::default();

        let Some(before) = &push.before else {
            debug!("Push {} on {} has no previous tip, nothing to cancel", push.sha, push.branch);
            return Ok(result);
        };

        let query = GoalQuery::commit(push.repo.clone(), push.branch.clone(), before.sha.clone());
        let candidates: Vec<GoalRecord> = self
            .machine
            .store()
            .find(&query)
            .await?
            .into_iter()
            .filter(|goal| self.cancellable.matches(goal) && self.filter.matches(goal))
            .filter(|goal| match self.check_ownership(goal) {
                Ok(()) => true,
                Err(e) => {
                    debug!("Skipping cancellation: {}", e);
                    false
                }
            })
            .collect();

        if candidates.is_empty() {
            debug!("No cancellable goals for {} on {}", before.sha, push.branch);
            return Ok(result);
        }

        let actor = self.tracker.actor(&ActorContext::default());
        let outcomes = join_all(
            candidates
                .iter()
                .map(|goal| self.machine.cancel(goal, &actor)),
        )
        .await;

        for (goal, outcome) in candidates.iter().zip(outcomes) {
            let key = goal.key();
            match outcome {
                Ok(_) => {
                    if let Some(tokens) = &self.tokens {
                        tokens.signal(&key).await;
                    }
                    result.goal_set_ids.insert(key.goal_set_id.clone());
                    result.canceled.push(key);
                }
                Err(e) => {
                    warn!("Failed to cancel goal {}: {}", key, e);
                    result.failed.push(CancellationFailure {
                        key,
                        message: e.to_string(),
                    });
                }
            }
        }

        info!(
            "Canceled {} goal(s) in {} goal set(s) superseded by {}",
            result.canceled.len(),
            result.goal_set_ids.len(),
            push.sha
        );

        Ok(result)
    }

    fn check_ownership(&self, goal: &GoalRecord) -> Result<()> {
        let registration = self.tracker.registration();
        match goal.owner() {
            Some(owner) if registration.may_act_for(owner) => Ok(()),
            owner => Err(GoalError::UnownedCancellation {
                key: goal.key(),
                owner: owner.map_or_else(|| "<none>".to_string(), |o| o.to_string()),
                registration: registration.to_string(),
            }),
        }
    }
}
