//! Goal state machine.
//!
//! Validates a requested state change against the goal's current state,
//! appends provenance and persists through the [`GoalStore`], whose `save`
//! rejects writes based on a stale version. Every stored transition is
//! handed to the [`CompletionDispatcher`], which keeps the goal set rollup
//! current and notifies listeners for completion-class states.

use std::sync::Arc;

use goalpost_core::{GoalError, GoalRecord, GoalState, Provenance, Result};
use goalpost_store::GoalStore;
use tracing::{error, info};

use crate::dispatch::CompletionDispatcher;
use crate::provenance::ProvenanceTracker;

/// Optional fields written together with a state change.
#[derive(Debug, Clone, Default)]
pub struct GoalUpdate {
    /// Replaces the default description for the target state.
    pub description: Option<String>,
    pub phase: Option<String>,
    pub url: Option<String>,
    pub data: Option<String>,
    pub error: Option<String>,
}

impl GoalUpdate {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransitionKind {
    Regular,
    CancellationOverride,
}

/// Applies state transitions to single goals.
pub struct GoalStateMachine {
    store: Arc<dyn GoalStore>,
    tracker: ProvenanceTracker,
    dispatcher: Option<Arc<CompletionDispatcher>>,
}

impl GoalStateMachine {
    pub fn new(store: Arc<dyn GoalStore>, tracker: ProvenanceTracker) -> Self {
        Self {
            store,
            tracker,
            dispatcher: None,
        }
    }

    /// Hand every stored transition to `dispatcher`.
    pub fn with_dispatcher(mut self, dispatcher: Arc<CompletionDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn store(&self) -> &Arc<dyn GoalStore> {
        &self.store
    }

    /// Move `goal` to `target` on behalf of `actor`.
    ///
    /// `goal` must carry the version the caller last read; the stored goal
    /// is returned with its version bumped.
    pub async fn transition(
        &self,
        goal: &GoalRecord,
        target: GoalState,
        actor: &Provenance,
    ) -> Result<GoalRecord> {
        self.transition_with(goal, target, actor, GoalUpdate::default())
            .await
    }

    /// Like [`transition`](Self::transition), writing `update` along with the state.
    pub async fn transition_with(
        &self,
        goal: &GoalRecord,
        target: GoalState,
        actor: &Provenance,
        update: GoalUpdate,
    ) -> Result<GoalRecord> {
        self.apply(goal, target, actor, update, TransitionKind::Regular)
            .await
    }

    /// Record an executor error and fail the goal.
    pub async fn fail(
        &self,
        goal: &GoalRecord,
        message: impl Into<String>,
        actor: &Provenance,
    ) -> Result<GoalRecord> {
        self.transition_with(goal, GoalState::Failure, actor, GoalUpdate::error(message))
            .await
    }

    /// Cancel a superseded goal. Valid from every state except canceled.
    pub(crate) async fn cancel(&self, goal: &GoalRecord, actor: &Provenance) -> Result<GoalRecord> {
        self.apply(
            goal,
            GoalState::Canceled,
            actor,
            GoalUpdate::default(),
            TransitionKind::CancellationOverride,
        )
        .await
    }

    async fn apply(
        &self,
        goal: &GoalRecord,
        target: GoalState,
        actor: &Provenance,
        update: GoalUpdate,
        kind: TransitionKind,
    ) -> Result<GoalRecord> {
        check_transition(goal, target, kind)?;

        let mut next = goal.clone();
        let entry = self.tracker.append(&mut next, actor);
        next.state = target;
        next.description = update
            .description
            .unwrap_or_else(|| target.describe(&next.name));
        next.phase = update.phase;
        if update.url.is_some() {
            next.url = update.url;
        }
        if update.data.is_some() {
            next.data = update.data;
        }
        if update.error.is_some() {
            next.error = update.error;
        }
        match target {
            GoalState::Approved => {
                next.approval = Some(entry);
                next.approval_required = false;
            }
            GoalState::PreApproved => {
                next.pre_approval = Some(entry);
                next.pre_approval_required = false;
            }
            _ => {}
        }

        let saved = self.store.save(next).await?;
        info!(
            "Goal {} {} -> {} (version {})",
            saved.key(),
            goal.state,
            saved.state,
            saved.version
        );

        if let Some(dispatcher) = &self.dispatcher {
            if let Err(e) = dispatcher.dispatch(&saved).await {
                error!("Completion dispatch failed for goal {}: {}", saved.key(), e);
            }
        }

        Ok(saved)
    }
}

fn check_transition(goal: &GoalRecord, target: GoalState, kind: TransitionKind) -> Result<()> {
    let invalid = |reason: &str| {
        Err(GoalError::InvalidTransition {
            key: goal.key(),
            from: goal.state.to_string(),
            to: target.to_string(),
            reason: reason.to_string(),
        })
    };

    if kind == TransitionKind::CancellationOverride {
        if goal.state == GoalState::Canceled {
            return invalid("goal is already canceled");
        }
        return Ok(());
    }

    if goal.state.is_terminal() {
        return invalid("goal is in a terminal state");
    }
    if target == GoalState::Canceled {
        return invalid("goals are only canceled when superseded by a later push");
    }
    if target == GoalState::Approved && !goal.approval_required {
        return invalid("goal does not require approval");
    }
    if target == GoalState::PreApproved && !goal.pre_approval_required {
        return invalid("goal does not require pre-approval");
    }
    if !goal.state.can_transition_to(target) {
        return invalid("transition is not allowed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{goal, saved, store, tracker, FailingListener, RecordingListener};
    use goalpost_core::{GoalSetId, GoalSetState};

    fn machine(store: Arc<dyn GoalStore>) -> GoalStateMachine {
        GoalStateMachine::new(store, tracker("team-a"))
    }

    #[tokio::test]
    async fn test_version_increments_by_one_per_transition() {
        let store = store();
        let machine = machine(store.clone());
        let actor = tracker("team-a").system();

        let g = saved(&store, goal("team-a", "gs-1", "build", "aaa", GoalState::Planned)).await;
        assert_eq!(g.version, 1);

        let g = machine.transition(&g, GoalState::Requested, &actor).await.unwrap();
        assert_eq!(g.version, 2);
        let g = machine.transition(&g, GoalState::InProcess, &actor).await.unwrap();
        assert_eq!(g.version, 3);
        let g = machine.transition(&g, GoalState::Success, &actor).await.unwrap();
        assert_eq!(g.version, 4);
        assert_eq!(g.provenance.len(), 4);
        assert_eq!(g.description, "Completed: build");
    }

    #[tokio::test]
    async fn test_stale_version_leaves_stored_goal_unchanged() {
        let store = store();
        let machine = machine(store.clone());
        let actor = tracker("team-a").system();

        let original = goal("team-a", "gs-1", "build", "aaa", GoalState::Planned);
        let original = saved(&store, original).await;
        machine
            .transition(&original, GoalState::InProcess, &actor)
            .await
            .unwrap();

        let err = machine
            .transition(&original, GoalState::Skipped, &actor)
            .await
            .unwrap_err();
        assert!(matches!(err, GoalError::StaleVersion { expected: 1, actual: 2, .. }));

        let stored = store.get(&original.key()).await.unwrap().unwrap();
        assert_eq!(stored.state, GoalState::InProcess);
        assert_eq!(stored.version, 2);
    }

    #[tokio::test]
    async fn test_terminal_goal_cannot_reopen() {
        let store = store();
        let machine = machine(store.clone());
        let actor = tracker("team-a").system();

        let g = saved(&store, goal("team-a", "gs-1", "build", "aaa", GoalState::InProcess)).await;
        let g = machine.transition(&g, GoalState::Success, &actor).await.unwrap();

        let err = machine
            .transition(&g, GoalState::InProcess, &actor)
            .await
            .unwrap_err();
        assert!(matches!(err, GoalError::InvalidTransition { .. }));
        assert_eq!(store.get(&g.key()).await.unwrap().unwrap().version, g.version);
    }

    #[tokio::test]
    async fn test_regular_transition_cannot_cancel() {
        let store = store();
        let machine = machine(store.clone());
        let actor = tracker("team-a").system();

        let g = saved(&store, goal("team-a", "gs-1", "build", "aaa", GoalState::Planned)).await;
        let err = machine
            .transition(&g, GoalState::Canceled, &actor)
            .await
            .unwrap_err();
        assert!(matches!(err, GoalError::InvalidTransition { .. }));

        let canceled = machine.cancel(&g, &actor).await.unwrap();
        assert_eq!(canceled.state, GoalState::Canceled);
        assert_eq!(canceled.description, "Canceled build");
        assert!(machine.cancel(&canceled, &actor).await.is_err());
    }

    #[tokio::test]
    async fn test_approval_records_approver() {
        let store = store();
        let machine = machine(store.clone());
        let approver = tracker("team-a").actor(&crate::ActorContext::user("alice"));

        let mut g = goal("team-a", "gs-1", "deploy", "aaa", GoalState::InProcess);
        g.approval_required = true;
        let g = saved(&store, g).await;

        let g = machine
            .transition(&g, GoalState::WaitingForApproval, &approver)
            .await
            .unwrap();
        let g = machine.transition(&g, GoalState::Approved, &approver).await.unwrap();

        assert!(!g.approval_required);
        assert_eq!(
            g.approval.as_ref().and_then(|p| p.user_id.as_deref()),
            Some("alice")
        );
    }

    #[tokio::test]
    async fn test_approval_requires_flag() {
        let store = store();
        let machine = machine(store.clone());
        let actor = tracker("team-a").system();

        let g = goal("team-a", "gs-1", "deploy", "aaa", GoalState::WaitingForApproval);
        let g = saved(&store, g).await;
        assert!(machine.transition(&g, GoalState::Approved, &actor).await.is_err());

        let g = saved(&store, goal("team-a", "gs-1", "start", "aaa", GoalState::Requested)).await;
        assert!(machine.transition(&g, GoalState::PreApproved, &actor).await.is_err());
    }

    #[tokio::test]
    async fn test_pre_approval_clears_flag() {
        let store = store();
        let machine = machine(store.clone());
        let actor = tracker("team-a").actor(&crate::ActorContext::user("bob"));

        let mut g = goal("team-a", "gs-1", "deploy", "aaa", GoalState::Requested);
        g.pre_approval_required = true;
        let g = saved(&store, g).await;

        let g = machine
            .transition(&g, GoalState::WaitingForPreApproval, &actor)
            .await
            .unwrap();
        let g = machine.transition(&g, GoalState::PreApproved, &actor).await.unwrap();
        assert!(!g.pre_approval_required);
        assert!(g.pre_approval.is_some());
    }

    #[tokio::test]
    async fn test_fail_records_error() {
        let store = store();
        let machine = machine(store.clone());
        let actor = tracker("team-a").system();

        let g = saved(&store, goal("team-a", "gs-1", "build", "aaa", GoalState::InProcess)).await;
        let g = machine.fail(&g, "compiler crashed", &actor).await.unwrap();
        assert_eq!(g.state, GoalState::Failure);
        assert_eq!(g.error.as_deref(), Some("compiler crashed"));
    }

    #[tokio::test]
    async fn test_completion_transitions_are_dispatched() {
        let store = store();
        let recording = Arc::new(RecordingListener::default());
        let dispatcher = Arc::new(
            CompletionDispatcher::new(store.clone())
                .with_listener(Arc::new(FailingListener))
                .with_listener(recording.clone()),
        );
        let machine = machine(store.clone()).with_dispatcher(dispatcher);
        let actor = tracker("team-a").system();

        let g = saved(&store, goal("team-a", "gs-1", "build", "aaa", GoalState::Planned)).await;
        let g = machine.transition(&g, GoalState::InProcess, &actor).await.unwrap();
        assert_eq!(recording.calls(), 0);

        let g = machine.transition(&g, GoalState::Success, &actor).await.unwrap();
        assert_eq!(g.version, 3);
        assert_eq!(recording.calls(), 1);

        let goal_set = store
            .find_goal_set(&GoalSetId::from("gs-1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(goal_set.state, GoalSetState::Success);
    }

    async fn goal_set_state(store: &Arc<dyn GoalStore>) -> Option<GoalSetState> {
        store
            .find_goal_set(&GoalSetId::from("gs-1"))
            .await
            .unwrap()
            .map(|goal_set| goal_set.state)
    }

    #[tokio::test]
    async fn test_goal_set_follows_approval_round_trip() {
        let store = store();
        let recording = Arc::new(RecordingListener::default());
        let dispatcher =
            Arc::new(CompletionDispatcher::new(store.clone()).with_listener(recording.clone()));
        let machine = machine(store.clone()).with_dispatcher(dispatcher);
        let approver = tracker("team-a").actor(&crate::ActorContext::user("alice"));

        let mut g = goal("team-a", "gs-1", "deploy", "aaa", GoalState::InProcess);
        g.approval_required = true;
        let g = saved(&store, g).await;

        let g = machine
            .transition(&g, GoalState::WaitingForApproval, &approver)
            .await
            .unwrap();
        assert_eq!(goal_set_state(&store).await, Some(GoalSetState::WaitingForApproval));
        assert_eq!(recording.calls(), 1);

        let g = machine.transition(&g, GoalState::Approved, &approver).await.unwrap();
        let g = machine.transition(&g, GoalState::InProcess, &approver).await.unwrap();
        assert_eq!(g.version, 4);
        assert_eq!(goal_set_state(&store).await, Some(GoalSetState::InProcess));
        assert_eq!(recording.calls(), 1);

        machine.transition(&g, GoalState::Success, &approver).await.unwrap();
        assert_eq!(goal_set_state(&store).await, Some(GoalSetState::Success));
        assert_eq!(recording.calls(), 2);
    }
}
