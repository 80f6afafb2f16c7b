//! Goal set rollup records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::goal::GoalRecord;
use crate::state::GoalSetState;
use crate::types::{GoalSetId, RepoRef, Registration};

/// All goals created for one push, summarized by a derived state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalSet {
    /// Identifier shared by the member goals.
    pub goal_set_id: GoalSetId,

    /// Rollup of the member goal states.
    pub state: GoalSetState,

    /// Registration that planned the goal set.
    pub registration: Registration,

    /// Commit the goal set was planned for.
    pub sha: String,

    /// Branch the commit was pushed to.
    pub branch: String,

    /// Repository of the commit.
    pub repo: RepoRef,

    /// When the goal set was planned; defines admission order.
    pub created_at: DateTime<Utc>,

    /// When the rollup was last written.
    pub ts: DateTime<Utc>,
}

impl GoalSet {
    /// Describe the goal set a goal belongs to.
    ///
    /// Returns `None` for a goal without provenance, which cannot be
    /// attributed to a registration.
    pub fn for_goal(goal: &GoalRecord, state: GoalSetState) -> Option<Self> {
        let registration = goal.owner()?.clone();
        Some(Self {
            goal_set_id: goal.goal_set_id.clone(),
            state,
            registration,
            sha: goal.sha.clone(),
            branch: goal.branch.clone(),
            repo: goal.repo.clone(),
            created_at: goal.created_at(),
            ts: Utc::now(),
        })
    }

    /// Replace the rollup state.
    pub fn with_state(mut self, state: GoalSetState) -> Self {
        self.state = state;
        self.ts = Utc::now();
        self
    }
}
