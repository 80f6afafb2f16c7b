//! Engine configuration.

use goalpost_core::{GoalError, Registration, Result};
use serde::{Deserialize, Serialize};

/// Throttle for concurrently running goal sets of one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionPolicy {
    /// Maximum number of active goal sets inspected per decision.
    pub fetch: usize,

    /// Maximum number of goal sets allowed to run at the same time.
    pub concurrent: usize,
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        Self {
            fetch: 50,
            concurrent: 2,
        }
    }
}

/// Configuration for the goal engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Name of this delivery machine, recorded in provenance.
    pub name: String,

    /// Software version recorded in provenance.
    pub version: String,

    /// Registration of this process instance.
    pub registration: String,

    /// Admission throttle.
    pub admission: AdmissionPolicy,

    /// Unique names of goals a later push may cancel (None = all goals).
    pub cancellable: Option<Vec<String>>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: "goalpost".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            registration: "goalpost".to_string(),
            admission: AdmissionPolicy::default(),
            cancellable: None,
        }
    }
}

impl EngineConfig {
    pub fn registration(&self) -> Registration {
        Registration::new(self.registration.clone())
    }

    /// Check the configuration for values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.registration.trim().is_empty() {
            return Err(GoalError::InvalidConfig(
                "registration must not be empty".to_string(),
            ));
        }
        if self.admission.concurrent == 0 {
            return Err(GoalError::InvalidConfig(
                "admission.concurrent must be at least 1".to_string(),
            ));
        }
        if self.admission.fetch < self.admission.concurrent {
            return Err(GoalError::InvalidConfig(format!(
                "admission.fetch ({}) must not be smaller than admission.concurrent ({})",
                self.admission.fetch, self.admission.concurrent
            )));
        }
        Ok(())
    }
}
