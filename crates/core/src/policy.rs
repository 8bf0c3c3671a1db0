//! Escalation/fallback policy. These checks are node-agnostic and run in
//! the turn processor around every dispatch, so no node has to duplicate
//! attempt-limit logic and no call can loop indefinitely.

use crate::domain::call::CallState;
use crate::nodes::handlers::{enter_escalation, enter_voicemail};
use crate::nodes::states::NodeOutcome;

pub const DEFAULT_CLARIFICATION_THRESHOLD: u32 = 3;

/// Checked before classification and dispatch: once clarification attempts
/// have hit the threshold, the very next turn is routed to escalation no
/// matter what the model would have made of the utterance.
pub fn clarification_exhausted(state: &CallState, threshold: u32) -> bool {
    state.clarification_attempts >= threshold
}

/// Applied to whatever a node handler returned, before anything is spoken
/// or persisted. When negotiation attempts are exhausted and the latest
/// quote still breaches its ceiling, the node's own transition and reply
/// are replaced with the escalation hand-off.
pub fn apply(outcome: NodeOutcome) -> NodeOutcome {
    if outcome.state.status.is_terminal() {
        return outcome;
    }
    if outcome.state.negotiation_attempts >= outcome.state.max_negotiation_attempts
        && outcome.state.over_budget_part().is_some()
    {
        return enter_escalation(outcome.state);
    }
    outcome
}

/// Transport-level voicemail detection bypasses whatever node was active.
pub fn force_voicemail(state: CallState) -> NodeOutcome {
    enter_voicemail(state)
}

pub fn force_escalation(state: CallState) -> NodeOutcome {
    enter_escalation(state)
}
