//! Goal set rollup.

use goalpost_core::{GoalRecord, GoalSetState, GoalState};

/// Derive a goal set's state from its goals.
///
/// Returns `None` for an empty slice; every non-empty slice has exactly one
/// rollup state.
pub fn rollup(goals: &[GoalRecord]) -> Option<GoalSetState> {
    rollup_states(goals.iter().map(|goal| goal.state))
}

/// Derive a goal set's state from its goal states.
///
/// Precedence, first match wins: failure, waiting for approval, waiting for
/// pre-approval, any active goal (in process), otherwise success.
pub fn rollup_states<I>(states: I) -> Option<GoalSetState>
where
    I: IntoIterator<Item = GoalState>,
{
    let mut any = false;
    let mut waiting_for_approval = false;
    let mut waiting_for_pre_approval = false;
    let mut active = false;

    for state in states {
        any = true;
        match state {
            GoalState::Failure => return Some(GoalSetState::Failure),
            GoalState::WaitingForApproval => waiting_for_approval = true,
            GoalState::WaitingForPreApproval => waiting_for_pre_approval = true,
            s if s.is_active() => active = true,
            _ => {}
        }
    }

    if !any {
        None
    } else if waiting_for_approval {
        Some(GoalSetState::WaitingForApproval)
    } else if waiting_for_pre_approval {
        Some(GoalSetState::WaitingForPreApproval)
    } else if active {
        Some(GoalSetState::InProcess)
    } else {
        Some(GoalSetState::Success)
    }
}
