//! Goal records and their audit trail.
//!
//! A [`GoalRecord`] is one unit of delivery work (build, test, deploy,
//! approval gate) for one push. Records are never deleted: superseded goals
//! are marked canceled, and every persisted mutation appends a
//! [`Provenance`] entry and bumps `version` by exactly one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{GoalError, Result};
use crate::state::GoalState;
use crate::types::{GoalKey, GoalSetId, RepoRef, Registration};

/// Audit entry identifying who made a change, from where, and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    /// Name of the delivery machine that made the change.
    pub name: String,

    /// Process instance that made the change.
    pub registration: Registration,

    /// Software version of the delivery machine.
    pub version: String,

    /// Correlates the change with the inbound event that caused it.
    pub correlation_id: String,

    /// When the change was made.
    pub ts: DateTime<Utc>,

    /// Chat channel the change was issued from, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,

    /// User who issued the change, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// One goal of one push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalRecord {
    /// Goal set (push) this goal belongs to.
    pub goal_set_id: GoalSetId,

    /// Stable name, unique within the goal set.
    pub unique_name: String,

    /// Display name.
    pub name: String,

    /// Ordering namespace, e.g. staging or production.
    pub environment: String,

    /// Commit the goal runs against.
    pub sha: String,

    /// Branch the commit was pushed to.
    pub branch: String,

    /// Repository the commit belongs to.
    pub repo: RepoRef,

    /// Current lifecycle state.
    pub state: GoalState,

    /// Free-text sub-status, e.g. a queue position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,

    /// Human-readable description of the current state.
    pub description: String,

    /// Link to executor output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Optimistic concurrency version; 0 until first persisted.
    pub version: u64,

    /// Timestamp of the last mutation.
    pub ts: DateTime<Utc>,

    /// Whether the goal may be retried after failing.
    pub retry_feasible: bool,

    /// Whether the goal needs approval after its work completes.
    pub approval_required: bool,

    /// Whether the goal needs approval before its work starts.
    pub pre_approval_required: bool,

    /// Last approval, if granted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval: Option<Provenance>,

    /// Last pre-approval, if granted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_approval: Option<Provenance>,

    /// Append-only audit trail; the first entry is the creator.
    pub provenance: Vec<Provenance>,

    /// Opaque payload executors use to pass structured results forward.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,

    /// Error reported by the executor, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GoalRecord {
    /// Start building a goal for the given goal set.
    pub fn builder(goal_set_id: GoalSetId, unique_name: impl Into<String>) -> GoalRecordBuilder {
        GoalRecordBuilder::new(goal_set_id, unique_name)
    }

    /// The identity of this goal.
    pub fn key(&self) -> GoalKey {
        GoalKey::new(self.goal_set_id.clone(), self.unique_name.clone())
    }

    /// Registration that created the goal.
    pub fn owner(&self) -> Option<&Registration> {
        self.provenance.first().map(|p| &p.registration)
    }

    /// When the goal was created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.provenance.first().map(|p| p.ts).unwrap_or(self.ts)
    }

    /// Append an audit entry and stamp the mutation time.
    pub fn record(&mut self, provenance: Provenance) {
        self.ts = provenance.ts;
        self.provenance.push(provenance);
    }
}

/// Builder for creating goal records with a fluent API.
#[derive(Debug)]
pub struct GoalRecordBuilder {
    goal_set_id: GoalSetId,
    unique_name: String,
    name: Option<String>,
    environment: String,
    sha: Option<String>,
    branch: Option<String>,
    repo: Option<RepoRef>,
    state: GoalState,
    retry_feasible: bool,
    approval_required: bool,
    pre_approval_required: bool,
    data: Option<String>,
}

impl GoalRecordBuilder {
    fn new(goal_set_id: GoalSetId, unique_name: impl Into<String>) -> Self {
        Self {
            goal_set_id,
            unique_name: unique_name.into(),
            name: None,
            environment: String::new(),
            sha: None,
            branch: None,
            repo: None,
            state: GoalState::Planned,
            retry_feasible: false,
            approval_required: false,
            pre_approval_required: false,
            data: None,
        }
    }

    /// Set the display name (defaults to the unique name).
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the environment.
    pub fn environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    /// Set the commit, branch and repository the goal runs against.
    pub fn commit(
        mut self,
        repo: RepoRef,
        branch: impl Into<String>,
        sha: impl Into<String>,
    ) -> Self {
        self.repo = Some(repo);
        self.branch = Some(branch.into());
        self.sha = Some(sha.into());
        self
    }

    /// Set the initial state (defaults to planned).
    pub fn state(mut self, state: GoalState) -> Self {
        self.state = state;
        self
    }

    pub fn retry_feasible(mut self, retry_feasible: bool) -> Self {
        self.retry_feasible = retry_feasible;
        self
    }

    pub fn approval_required(mut self, required: bool) -> Self {
        self.approval_required = required;
        self
    }

    pub fn pre_approval_required(mut self, required: bool) -> Self {
        self.pre_approval_required = required;
        self
    }

    /// Set the opaque executor payload.
    pub fn data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Build the goal, recording `creator` as its first provenance entry.
    pub fn build(self, creator: Provenance) -> Result<GoalRecord> {
        if self.unique_name.trim().is_empty() {
            return Err(GoalError::GoalInvalid {
                message: "Goal unique name is required".to_string(),
            });
        }
        let (repo, branch, sha) = match (self.repo, self.branch, self.sha) {
            (Some(repo), Some(branch), Some(sha)) if !sha.is_empty() => (repo, branch, sha),
            _ => {
                return Err(GoalError::GoalInvalid {
                    message: format!("Goal {} requires a commit", self.unique_name),
                })
            }
        };

        let name = self.name.unwrap_or_else(|| self.unique_name.clone());
        Ok(GoalRecord {
            goal_set_id: self.goal_set_id,
            description: self.state.describe(&name),
            unique_name: self.unique_name,
            name,
            environment: self.environment,
            sha,
            branch,
            repo,
            state: self.state,
            phase: None,
            url: None,
            version: 0,
            ts: creator.ts,
            retry_feasible: self.retry_feasible,
            approval_required: self.approval_required,
            pre_approval_required: self.pre_approval_required,
            approval: None,
            pre_approval: None,
            provenance: vec![creator],
            data: self.data,
            error: None,
        })
    }
}
