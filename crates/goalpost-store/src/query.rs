//! Query filters for goals and goal sets.

use goalpost_core::{GoalRecord, GoalSet, GoalSetId, GoalState, RepoRef, Registration};
use serde::{Deserialize, Serialize};

/// Filter for goal lookups. Unset fields match anything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GoalQuery {
    pub goal_set_id: Option<GoalSetId>,
    pub unique_name: Option<String>,
    pub sha: Option<String>,
    pub branch: Option<String>,
    pub repo: Option<RepoRef>,

    /// Restrict to goals in one of these states.
    pub states: Option<Vec<GoalState>>,
}

impl GoalQuery {
    /// All goals of one goal set.
    pub fn goal_set(goal_set_id: GoalSetId) -> Self {
        Self {
            goal_set_id: Some(goal_set_id),
            ..Default::default()
        }
    }

    /// All goals planned for one commit on one branch.
    pub fn commit(repo: RepoRef, branch: impl Into<String>, sha: impl Into<String>) -> Self {
        Self {
            repo: Some(repo),
            branch: Some(branch.into()),
            sha: Some(sha.into()),
            ..Default::default()
        }
    }

    pub fn unique_name(mut self, unique_name: impl Into<String>) -> Self {
        self.unique_name = Some(unique_name.into());
        self
    }

    pub fn states(mut self, states: Vec<GoalState>) -> Self {
        self.states = Some(states);
        self
    }

    /// Check if a goal matches this query.
    pub fn matches(&self, goal: &GoalRecord) -> bool {
        if let Some(ref id) = self.goal_set_id {
            if &goal.goal_set_id != id {
                return false;
            }
        }
        if let Some(ref name) = self.unique_name {
            if &goal.unique_name != name {
                return false;
            }
        }
        if let Some(ref sha) = self.sha {
            if &goal.sha != sha {
                return false;
            }
        }
        if let Some(ref branch) = self.branch {
            if &goal.branch != branch {
                return false;
            }
        }
        if let Some(ref repo) = self.repo {
            if goal.repo.owner != repo.owner || goal.repo.name != repo.name {
                return false;
            }
        }
        if let Some(ref states) = self.states {
            if !states.contains(&goal.state) {
                return false;
            }
        }
        true
    }
}

/// Filter for goal set lookups.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GoalSetQuery {
    pub registration: Option<Registration>,

    /// Only goal sets whose rollup is not terminal.
    pub active_only: bool,

    /// Maximum number of goal sets returned.
    pub limit: Option<usize>,
}

impl GoalSetQuery {
    /// Active goal sets of a registration, oldest first.
    pub fn active(registration: Registration, limit: usize) -> Self {
        Self {
            registration: Some(registration),
            active_only: true,
            limit: Some(limit),
        }
    }

    /// Check if a goal set matches this query (ignores `limit`).
    pub fn matches(&self, goal_set: &GoalSet) -> bool {
        if let Some(ref registration) = self.registration {
            if &goal_set.registration != registration {
                return false;
            }
        }
        !(self.active_only && goal_set.state.is_terminal())
    }
}
