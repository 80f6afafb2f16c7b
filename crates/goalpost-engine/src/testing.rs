//! Fixtures shared by the engine's unit tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use goalpost_core::{
    GoalError, GoalRecord, GoalSetId, GoalState, RepoRef, Registration, Result,
};
use goalpost_store::{GoalStore, InMemoryGoalStore};

use crate::dispatch::{GoalCompletion, GoalCompletionListener};
use crate::provenance::ProvenanceTracker;

pub(crate) fn tracker(registration: &str) -> ProvenanceTracker {
    ProvenanceTracker::new("goalpost", Registration::from(registration), "0.1.0")
}

pub(crate) fn store() -> Arc<dyn GoalStore> {
    Arc::new(InMemoryGoalStore::new())
}

pub(crate) fn repo() -> RepoRef {
    RepoRef::new("acme", "shop")
}

/// A goal created by `registration`, not yet persisted.
pub(crate) fn goal(
    registration: &str,
    goal_set: &str,
    unique_name: &str,
    sha: &str,
    state: GoalState,
) -> GoalRecord {
    GoalRecord::builder(GoalSetId::from(goal_set), unique_name)
        .commit(repo(), "main", sha)
        .state(state)
        .build(tracker(registration).system())
        .unwrap()
}

/// Persist a goal and return the stored version.
pub(crate) async fn saved(store: &Arc<dyn GoalStore>, goal: GoalRecord) -> GoalRecord {
    store.save(goal).await.unwrap()
}

/// Listener that records every completion it sees.
#[derive(Default)]
pub(crate) struct RecordingListener {
    pub(crate) seen: Mutex<Vec<GoalCompletion>>,
}

impl RecordingListener {
    pub(crate) fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

#[async_trait]
impl GoalCompletionListener for RecordingListener {
    fn name(&self) -> &str {
        "recording"
    }

    async fn notify(&self, completion: &GoalCompletion) -> Result<()> {
        self.seen.lock().unwrap().push(completion.clone());
        Ok(())
    }
}

/// Listener that always fails.
pub(crate) struct FailingListener;

#[async_trait]
impl GoalCompletionListener for FailingListener {
    fn name(&self) -> &str {
        "failing"
    }

    async fn notify(&self, _completion: &GoalCompletion) -> Result<()> {
        Err(GoalError::Internal("chat service unavailable".to_string()))
    }
}
