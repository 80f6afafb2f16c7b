//! Provenance tracking for goal mutations.

use chrono::Utc;
use goalpost_core::{GoalRecord, Provenance, Registration};
use uuid::Uuid;

use crate::config::EngineConfig;

/// Who triggered a mutation, as reported by the inbound event.
#[derive(Debug, Clone, Default)]
pub struct ActorContext {
    pub correlation_id: Option<String>,
    pub channel_id: Option<String>,
    pub user_id: Option<String>,
}

impl ActorContext {
    /// A user-issued action, e.g. an approval command.
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Default::default()
        }
    }

    pub fn correlated(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }
}

/// Builds provenance entries for this process and appends them to goals.
#[derive(Debug, Clone)]
pub struct ProvenanceTracker {
    name: String,
    registration: Registration,
    version: String,
}

impl ProvenanceTracker {
    pub fn new(
        name: impl Into<String>,
        registration: Registration,
        version: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            registration,
            version: version.into(),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.name.clone(), config.registration(), config.version.clone())
    }

    pub fn registration(&self) -> &Registration {
        &self.registration
    }

    /// Same process, acting under another registration.
    pub fn with_registration(&self, registration: Registration) -> Self {
        Self {
            registration,
            ..self.clone()
        }
    }

    /// Provenance for an action taken on behalf of `context`.
    pub fn actor(&self, context: &ActorContext) -> Provenance {
        Provenance {
            name: self.name.clone(),
            registration: self.registration.clone(),
            version: self.version.clone(),
            correlation_id: context
                .correlation_id
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            ts: Utc::now(),
            channel_id: context.channel_id.clone(),
            user_id: context.user_id.clone(),
        }
    }

    /// Provenance for an action this process takes on its own.
    pub fn system(&self) -> Provenance {
        self.actor(&ActorContext::default())
    }

    /// Append `actor` to the goal's audit trail, stamped with the current time.
    pub fn append(&self, goal: &mut GoalRecord, actor: &Provenance) -> Provenance {
        let mut entry = actor.clone();
        entry.ts = Utc::now();
        goal.record(entry.clone());
        entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use goalpost_core::{GoalSetId, RepoRef};

    #[test]
    fn test_actor_keeps_correlation_id() {
        let tracker = ProvenanceTracker::new("goalpost", Registration::from("team-a"), "1.0.0");
        let actor = tracker.actor(&ActorContext::user("alice").correlated("corr-42"));

        assert_eq!(actor.correlation_id, "corr-42");
        assert_eq!(actor.user_id.as_deref(), Some("alice"));
        assert_eq!(actor.registration, Registration::from("team-a"));
    }

    #[test]
    fn test_system_actor_gets_fresh_correlation_id() {
        let tracker = ProvenanceTracker::new("goalpost", Registration::from("team-a"), "1.0.0");
        assert_ne!(tracker.system().correlation_id, tracker.system().correlation_id);
    }

    #[test]
    fn test_append_stamps_goal() {
        let tracker = ProvenanceTracker::new("goalpost", Registration::from("team-a"), "1.0.0");
        let mut goal = GoalRecord::builder(GoalSetId::from("gs-1"), "build")
            .commit(RepoRef::new("acme", "shop"), "main", "aaa")
            .build(tracker.system())
            .unwrap();

        let entry = tracker.append(&mut goal, &tracker.system());
        assert_eq!(goal.provenance.len(), 2);
        assert_eq!(goal.ts, entry.ts);
    }
}
