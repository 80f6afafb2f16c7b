//! Common identifiers and push context used across Goalpost.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier shared by every goal planned for one push.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GoalSetId(String);

impl GoalSetId {
    /// Generate a fresh goal set id.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for GoalSetId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for GoalSetId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for GoalSetId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for GoalSetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of a goal record: unique within a workspace.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GoalKey {
    /// The goal set the goal belongs to.
    pub goal_set_id: GoalSetId,

    /// Stable name of the goal within its set, kept across retries.
    pub unique_name: String,
}

impl GoalKey {
    pub fn new(goal_set_id: GoalSetId, unique_name: impl Into<String>) -> Self {
        Self {
            goal_set_id,
            unique_name: unique_name.into(),
        }
    }
}

impl fmt::Display for GoalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.goal_set_id, self.unique_name)
    }
}

/// Reference to a source repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoRef {
    /// Repository owner or organization.
    pub owner: String,

    /// Repository name.
    pub name: String,

    /// Source-control provider the repository lives on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            provider_id: None,
        }
    }

    /// Set the provider id.
    pub fn with_provider(mut self, provider_id: impl Into<String>) -> Self {
        self.provider_id = Some(provider_id.into());
        self
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Identity of a delivery-machine process instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Registration(String);

/// Suffix used by sub-job processes spawned from a registration.
const JOB_SUFFIX: &str = "-job";

impl Registration {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this registration may act on goals owned by `owner`.
    ///
    /// A registration acts for itself, and a sub-job of `owner`
    /// (`<owner>-job` or `<owner>-job-<n>`) acts for its parent.
    pub fn may_act_for(&self, owner: &Registration) -> bool {
        if self.0 == owner.0 {
            return true;
        }
        match self.0.strip_prefix(owner.as_str()) {
            Some(rest) => rest == JOB_SUFFIX || rest.starts_with("-job-"),
            None => false,
        }
    }
}

impl From<&str> for Registration {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The branch tip prior to a push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRef {
    pub sha: String,
}

/// A push to a branch, as seen by the cancellation path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Push {
    /// Branch the push landed on.
    pub branch: String,

    /// Repository pushed to.
    pub repo: RepoRef,

    /// New branch tip.
    pub sha: String,

    /// Previous branch tip; absent for the first push on a new branch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<CommitRef>,
}

impl Push {
    pub fn new(repo: RepoRef, branch: impl Into<String>, sha: impl Into<String>) -> Self {
        Self {
            branch: branch.into(),
            repo,
            sha: sha.into(),
            before: None,
        }
    }

    /// Set the previous branch tip.
    pub fn after(mut self, before_sha: impl Into<String>) -> Self {
        self.before = Some(CommitRef {
            sha: before_sha.into(),
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_owner_and_sub_jobs() {
        let owner = Registration::from("team-a");
        assert!(Registration::from("team-a").may_act_for(&owner));
        assert!(Registration::from("team-a-job").may_act_for(&owner));
        assert!(Registration::from("team-a-job-7").may_act_for(&owner));
        assert!(!Registration::from("team-b").may_act_for(&owner));
        assert!(!Registration::from("team-a-jobless").may_act_for(&owner));
        assert!(!Registration::from("team").may_act_for(&owner));
    }

    #[test]
    fn test_goal_key_display() {
        let key = GoalKey::new(GoalSetId::from("abc"), "deploy-staging");
        assert_eq!(key.to_string(), "abc/deploy-staging");
    }

    #[test]
    fn test_push_serialization_omits_missing_before() {
        let push = Push::new(RepoRef::new("acme", "shop"), "main", "aaa");
        let json = serde_json::to_value(&push).unwrap();
        assert!(json.get("before").is_none());

        let push = push.after("000");
        let json = serde_json::to_value(&push).unwrap();
        assert_eq!(json["before"]["sha"], "000");
    }
}
