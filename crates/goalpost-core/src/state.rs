//! Goal and goal set lifecycle states.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a single goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalState {
    /// Planned for a push, not yet requested.
    Planned,
    /// Ready to be picked up by an executor.
    Requested,
    /// Needs a pre-approval before it may start.
    WaitingForPreApproval,
    /// Pre-approval granted.
    PreApproved,
    /// An executor is working on the goal.
    InProcess,
    /// Work finished, approval needed before the goal counts as done.
    WaitingForApproval,
    /// Approval granted.
    Approved,
    /// Completed successfully.
    Success,
    /// Completed with a failure.
    Failure,
    /// Not applicable to this push.
    Skipped,
    /// Superseded by a later push.
    Canceled,
    /// Halted before completion.
    Stopped,
}

impl GoalState {
    /// All states, in lifecycle order.
    pub const ALL: [GoalState; 12] = [
        GoalState::Planned,
        GoalState::Requested,
        GoalState::WaitingForPreApproval,
        GoalState::PreApproved,
        GoalState::InProcess,
        GoalState::WaitingForApproval,
        GoalState::Approved,
        GoalState::Success,
        GoalState::Failure,
        GoalState::Skipped,
        GoalState::Canceled,
        GoalState::Stopped,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GoalState::Planned => "planned",
            GoalState::Requested => "requested",
            GoalState::WaitingForPreApproval => "waiting_for_pre_approval",
            GoalState::PreApproved => "pre_approved",
            GoalState::InProcess => "in_process",
            GoalState::WaitingForApproval => "waiting_for_approval",
            GoalState::Approved => "approved",
            GoalState::Success => "success",
            GoalState::Failure => "failure",
            GoalState::Skipped => "skipped",
            GoalState::Canceled => "canceled",
            GoalState::Stopped => "stopped",
        }
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            GoalState::Success
                | GoalState::Failure
                | GoalState::Skipped
                | GoalState::Canceled
                | GoalState::Stopped
        )
    }

    /// Returns true if the goal still has work ahead of it and is not
    /// blocked on an approval.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            GoalState::InProcess
                | GoalState::Planned
                | GoalState::Requested
                | GoalState::PreApproved
                | GoalState::Approved
        )
    }

    /// Returns true if reaching this state must trigger completion dispatch.
    pub fn triggers_completion(&self) -> bool {
        self.is_terminal()
            || matches!(
                self,
                GoalState::WaitingForApproval | GoalState::WaitingForPreApproval
            )
    }

    /// Returns true if a newly planned goal may start in this state.
    ///
    /// Approved states need an approval record, which only a transition
    /// writes.
    pub fn is_valid_initial(&self) -> bool {
        !self.is_terminal() && !matches!(self, GoalState::Approved | GoalState::PreApproved)
    }

    /// States a superseded goal may be canceled from, unless configured otherwise.
    pub fn is_cancellable_by_default(&self) -> bool {
        matches!(
            self,
            GoalState::InProcess
                | GoalState::Planned
                | GoalState::Requested
                | GoalState::WaitingForPreApproval
                | GoalState::PreApproved
        )
    }

    /// Check whether a regular transition from this state to `next` is valid.
    ///
    /// Terminal states accept nothing and `Canceled` is never a regular
    /// target; both are reserved for the cancellation override.
    pub fn can_transition_to(&self, next: GoalState) -> bool {
        use GoalState::*;

        if self.is_terminal() || next == Canceled {
            return false;
        }
        if matches!(next, Failure | Stopped) {
            return true;
        }

        matches!(
            (self, next),
            (Planned, Requested)
                | (Planned, WaitingForPreApproval)
                | (Planned, PreApproved)
                | (Planned, InProcess)
                | (Planned, Skipped)
                | (Requested, WaitingForPreApproval)
                | (Requested, PreApproved)
                | (Requested, InProcess)
                | (Requested, Skipped)
                | (WaitingForPreApproval, PreApproved)
                | (PreApproved, Requested)
                | (PreApproved, InProcess)
                | (InProcess, Success)
                | (InProcess, WaitingForApproval)
                | (InProcess, Skipped)
                | (WaitingForApproval, Approved)
                | (Approved, Requested)
                | (Approved, InProcess)
                | (Approved, Success)
        )
    }

    /// Human-readable description for a goal entering this state.
    pub fn describe(&self, goal_name: &str) -> String {
        match self {
            GoalState::Planned => format!("Planned: {}", goal_name),
            GoalState::Requested => format!("Ready: {}", goal_name),
            GoalState::WaitingForPreApproval => format!("Start required: {}", goal_name),
            GoalState::PreApproved => format!("Start approved: {}", goal_name),
            GoalState::InProcess => format!("Working: {}", goal_name),
            GoalState::WaitingForApproval => format!("Approval required: {}", goal_name),
            GoalState::Approved => format!("Approved: {}", goal_name),
            GoalState::Success => format!("Completed: {}", goal_name),
            GoalState::Failure => format!("Failed: {}", goal_name),
            GoalState::Skipped => format!("Skipped: {}", goal_name),
            GoalState::Canceled => format!("Canceled {}", goal_name),
            GoalState::Stopped => format!("Stopped: {}", goal_name),
        }
    }
}

impl fmt::Display for GoalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate state of a goal set, derived from its goals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalSetState {
    /// At least one goal still has work ahead of it.
    InProcess,
    /// A goal is blocked on pre-approval.
    WaitingForPreApproval,
    /// A goal is blocked on approval.
    WaitingForApproval,
    /// Every goal settled and none failed.
    Success,
    /// At least one goal failed.
    Failure,
}

impl GoalSetState {
    pub fn as_str(&self) -> &'static str {
        match self {
            GoalSetState::InProcess => "in_process",
            GoalSetState::WaitingForPreApproval => "waiting_for_pre_approval",
            GoalSetState::WaitingForApproval => "waiting_for_approval",
            GoalSetState::Success => "success",
            GoalSetState::Failure => "failure",
        }
    }

    /// Returns true once the goal set no longer occupies an admission slot.
    pub fn is_terminal(&self) -> bool {
        matches!(self, GoalSetState::Success | GoalSetState::Failure)
    }
}

impl fmt::Display for GoalSetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_goal_state_terminal() {
        assert!(GoalState::Success.is_terminal());
        assert!(GoalState::Canceled.is_terminal());
        assert!(GoalState::Stopped.is_terminal());
        assert!(!GoalState::InProcess.is_terminal());
        assert!(!GoalState::WaitingForApproval.is_terminal());
    }

    #[test]
    fn test_serde_uses_snake_case() {
        let json = serde_json::to_string(&GoalState::WaitingForPreApproval).unwrap();
        assert_eq!(json, "\"waiting_for_pre_approval\"");
        for state in GoalState::ALL {
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(json, format!("\"{}\"", state.as_str()));
        }
    }

    #[test]
    fn test_terminal_states_accept_no_regular_transition() {
        for from in GoalState::ALL.iter().filter(|s| s.is_terminal()) {
            for to in GoalState::ALL {
                assert!(!from.can_transition_to(to), "{} -> {}", from, to);
            }
        }
    }

    #[test]
    fn test_canceled_is_never_a_regular_target() {
        for from in GoalState::ALL {
            assert!(!from.can_transition_to(GoalState::Canceled));
        }
    }

    #[test]
    fn test_main_lifecycle_path() {
        assert!(GoalState::Planned.can_transition_to(GoalState::Requested));
        assert!(GoalState::Requested.can_transition_to(GoalState::WaitingForPreApproval));
        assert!(GoalState::WaitingForPreApproval.can_transition_to(GoalState::PreApproved));
        assert!(GoalState::PreApproved.can_transition_to(GoalState::InProcess));
        assert!(GoalState::InProcess.can_transition_to(GoalState::WaitingForApproval));
        assert!(GoalState::WaitingForApproval.can_transition_to(GoalState::Approved));
        assert!(GoalState::Approved.can_transition_to(GoalState::Success));
        assert!(!GoalState::WaitingForApproval.can_transition_to(GoalState::Success));
        assert!(!GoalState::InProcess.can_transition_to(GoalState::Planned));
        assert!(GoalState::InProcess.can_transition_to(GoalState::Skipped));
    }

    #[test]
    fn test_completion_triggers() {
        assert!(GoalState::WaitingForApproval.triggers_completion());
        assert!(GoalState::WaitingForPreApproval.triggers_completion());
        assert!(GoalState::Skipped.triggers_completion());
        assert!(!GoalState::InProcess.triggers_completion());
        assert!(!GoalState::Approved.triggers_completion());
    }

    #[test]
    fn test_valid_initial_states() {
        assert!(GoalState::Planned.is_valid_initial());
        assert!(GoalState::InProcess.is_valid_initial());
        assert!(GoalState::WaitingForApproval.is_valid_initial());
        assert!(!GoalState::Approved.is_valid_initial());
        assert!(!GoalState::PreApproved.is_valid_initial());
        assert!(!GoalState::Canceled.is_valid_initial());
        assert!(!GoalState::Success.is_valid_initial());
    }

    #[test]
    fn test_cancel_description() {
        assert_eq!(GoalState::Canceled.describe("build"), "Canceled build");
    }
}
