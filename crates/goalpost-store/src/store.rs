//! Goal store implementations.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use goalpost_core::{GoalError, GoalKey, GoalRecord, GoalSet, GoalSetId, Result};
use tokio::sync::RwLock;

use crate::query::{GoalQuery, GoalSetQuery};

/// Trait for goal stores.
#[async_trait]
pub trait GoalStore: Send + Sync {
    /// Find the current version of every goal matching the query,
    /// oldest goal first.
    async fn find(&self, query: &GoalQuery) -> Result<Vec<GoalRecord>>;

    /// Get the current version of one goal.
    async fn get(&self, key: &GoalKey) -> Result<Option<GoalRecord>>;

    /// Persist a goal.
    ///
    /// The record's `version` must equal the stored version (0 for a goal
    /// that was never saved); the goal is stored and returned with
    /// `version + 1`. A mismatch fails with [`GoalError::StaleVersion`]
    /// and leaves the stored goal untouched.
    async fn save(&self, goal: GoalRecord) -> Result<GoalRecord>;

    /// Every persisted version of a goal, oldest first.
    async fn history(&self, key: &GoalKey) -> Result<Vec<GoalRecord>>;

    /// Get a goal set rollup record.
    async fn find_goal_set(&self, goal_set_id: &GoalSetId) -> Result<Option<GoalSet>>;

    /// Insert or replace a goal set rollup record.
    async fn save_goal_set(&self, goal_set: GoalSet) -> Result<()>;

    /// Find goal sets matching the query in creation order.
    async fn find_goal_sets(&self, query: &GoalSetQuery) -> Result<Vec<GoalSet>>;
}

/// In-memory implementation of GoalStore.
pub struct InMemoryGoalStore {
    /// Goal storage: key -> list of versions (append-only, latest last).
    goals: Arc<RwLock<HashMap<GoalKey, Vec<GoalRecord>>>>,

    /// Goal set rollups.
    goal_sets: Arc<RwLock<GoalSetTable>>,
}

#[derive(Default)]
struct GoalSetTable {
    by_id: HashMap<GoalSetId, GoalSet>,
    /// Insertion order, which is creation order.
    order: Vec<GoalSetId>,
}

impl InMemoryGoalStore {
    /// Create a new in-memory goal store.
    pub fn new() -> Self {
        Self {
            goals: Arc::new(RwLock::new(HashMap::new())),
            goal_sets: Arc::new(RwLock::new(GoalSetTable::default())),
        }
    }
}

impl Default for InMemoryGoalStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GoalStore for InMemoryGoalStore {
    async fn find(&self, query: &GoalQuery) -> Result<Vec<GoalRecord>> {
        let goals = self.goals.read().await;

        let mut found: Vec<GoalRecord> = goals
            .values()
            .filter_map(|versions| versions.last())
            .filter(|goal| query.matches(goal))
            .cloned()
            .collect();
        found.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.goal_set_id.cmp(&b.goal_set_id))
                .then_with(|| a.unique_name.cmp(&b.unique_name))
        });

        Ok(found)
    }

    async fn get(&self, key: &GoalKey) -> Result<Option<GoalRecord>> {
        let goals = self.goals.read().await;
        Ok(goals.get(key).and_then(|versions| versions.last()).cloned())
    }

    async fn save(&self, mut goal: GoalRecord) -> Result<GoalRecord> {
        if goal.provenance.is_empty() {
            return Err(GoalError::GoalInvalid {
                message: format!("Goal {} has no provenance", goal.key()),
            });
        }

        let key = goal.key();
        let mut goals = self.goals.write().await;

        let stored = goals
            .get(&key)
            .and_then(|versions| versions.last())
            .map(|g| g.version)
            .unwrap_or(0);
        if goal.version != stored {
            return Err(GoalError::StaleVersion {
                key,
                expected: goal.version,
                actual: stored,
            });
        }

        goal.version = stored + 1;
        goals.entry(key.clone()).or_default().push(goal.clone());

        tracing::debug!("Saved goal {} at version {} ({})", key, goal.version, goal.state);

        Ok(goal)
    }

    async fn history(&self, key: &GoalKey) -> Result<Vec<GoalRecord>> {
        let goals = self.goals.read().await;
        Ok(goals.get(key).cloned().unwrap_or_default())
    }

    async fn find_goal_set(&self, goal_set_id: &GoalSetId) -> Result<Option<GoalSet>> {
        let table = self.goal_sets.read().await;
        Ok(table.by_id.get(goal_set_id).cloned())
    }

    async fn save_goal_set(&self, goal_set: GoalSet) -> Result<()> {
        let mut table = self.goal_sets.write().await;
        let id = goal_set.goal_set_id.clone();

        if table.by_id.insert(id.clone(), goal_set).is_none() {
            table.order.push(id);
        }

        Ok(())
    }

    async fn find_goal_sets(&self, query: &GoalSetQuery) -> Result<Vec<GoalSet>> {
        let table = self.goal_sets.read().await;
        let limit = query.limit.unwrap_or(usize::MAX);

        Ok(table
            .order
            .iter()
            .filter_map(|id| table.by_id.get(id))
            .filter(|goal_set| query.matches(goal_set))
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use goalpost_core::{GoalSetState, GoalState, Provenance, RepoRef, Registration};

    fn provenance(registration: &str) -> Provenance {
        Provenance {
            name: "goalpost".to_string(),
            registration: Registration::from(registration),
            version: "0.1.0".to_string(),
            correlation_id: "corr".to_string(),
            ts: Utc::now(),
            channel_id: None,
            user_id: None,
        }
    }

    fn goal(goal_set: &str, unique_name: &str) -> GoalRecord {
        GoalRecord::builder(GoalSetId::from(goal_set), unique_name)
            .commit(RepoRef::new("acme", "shop"), "main", "aaa")
            .build(provenance("team-a"))
            .unwrap()
    }

    #[tokio::test]
    async fn test_save_and_get() {
        let store = InMemoryGoalStore::new();

        let saved = store.save(goal("gs-1", "build")).await.unwrap();
        assert_eq!(saved.version, 1);

        let loaded = store.get(&saved.key()).await.unwrap().unwrap();
        assert_eq!(loaded, saved);
    }

    #[tokio::test]
    async fn test_versioning() {
        let store = InMemoryGoalStore::new();

        let v1 = store.save(goal("gs-1", "build")).await.unwrap();
        let mut next = v1.clone();
        next.state = GoalState::InProcess;
        let v2 = store.save(next).await.unwrap();

        assert_eq!(v2.version, v1.version + 1);
        assert_eq!(store.history(&v2.key()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_stale_write_rejected() {
        let store = InMemoryGoalStore::new();

        let v1 = store.save(goal("gs-1", "build")).await.unwrap();
        let mut winner = v1.clone();
        winner.state = GoalState::InProcess;
        store.save(winner).await.unwrap();

        let mut loser = v1.clone();
        loser.state = GoalState::Skipped;
        let err = store.save(loser).await.unwrap_err();
        assert!(matches!(
            err,
            GoalError::StaleVersion { expected: 1, actual: 2, .. }
        ));

        let current = store.get(&v1.key()).await.unwrap().unwrap();
        assert_eq!(current.state, GoalState::InProcess);
        assert_eq!(current.version, 2);
    }

    #[tokio::test]
    async fn test_duplicate_create_rejected() {
        let store = InMemoryGoalStore::new();

        store.save(goal("gs-1", "build")).await.unwrap();
        let result = store.save(goal("gs-1", "build")).await;
        assert!(matches!(result, Err(GoalError::StaleVersion { .. })));
    }

    #[tokio::test]
    async fn test_find_by_goal_set() {
        let store = InMemoryGoalStore::new();

        store.save(goal("gs-1", "build")).await.unwrap();
        store.save(goal("gs-1", "test")).await.unwrap();
        store.save(goal("gs-2", "build")).await.unwrap();

        let found = store
            .find(&GoalQuery::goal_set(GoalSetId::from("gs-1")))
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|g| g.version == 1));
    }

    #[tokio::test]
    async fn test_goal_sets_in_creation_order() {
        let store = InMemoryGoalStore::new();

        for (id, state) in [
            ("gs-1", GoalSetState::InProcess),
            ("gs-2", GoalSetState::Success),
            ("gs-3", GoalSetState::WaitingForApproval),
        ] {
            let goal_set = GoalSet::for_goal(&goal(id, "build"), state).unwrap();
            store.save_goal_set(goal_set).await.unwrap();
        }

        // Replacing a goal set keeps its position.
        let first = store
            .find_goal_set(&GoalSetId::from("gs-1"))
            .await
            .unwrap()
            .unwrap();
        store
            .save_goal_set(first.with_state(GoalSetState::WaitingForPreApproval))
            .await
            .unwrap();

        let active = store
            .find_goal_sets(&GoalSetQuery::active(Registration::from("team-a"), 10))
            .await
            .unwrap();
        let ids: Vec<&str> = active.iter().map(|g| g.goal_set_id.as_str()).collect();
        assert_eq!(ids, vec!["gs-1", "gs-3"]);

        let limited = store
            .find_goal_sets(&GoalSetQuery::active(Registration::from("team-a"), 1))
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);

        let other = store
            .find_goal_sets(&GoalSetQuery::active(Registration::from("team-b"), 10))
            .await
            .unwrap();
        assert!(other.is_empty());
    }
}
