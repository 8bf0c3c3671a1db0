use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::call::CallState;
use crate::domain::quote::PartQuote;

/// The conversation states of an outbound supplier call. Every variant has
/// exactly one handler function and the turn processor dispatches on this
/// enum, so adding a state is a compile-visible change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallNode {
    Greeting,
    QuoteRequest,
    Negotiate,
    Confirmation,
    HumanEscalation,
    Voicemail,
}

impl CallNode {
    /// Terminal nodes speak once on entry and never process another turn.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmation | Self::HumanEscalation | Self::Voicemail)
    }
}

/// The classified intent of one supplier utterance. Produced by the model
/// classifier or, when that fails or times out, by the keyword fallback.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnSignal {
    /// Agreement, acknowledgement, or "this is parts".
    Affirmative,
    /// Refusal or a statement that something cannot be done.
    Negative,
    /// The utterance carries price/availability content for extraction.
    QuoteInfo,
    /// The supplier asked to deal with a human instead of the agent.
    RequestHuman,
    /// The supplier offered to transfer the call.
    TransferOffer,
    /// Voicemail greeting phrasing detected in the utterance itself.
    Voicemail,
    /// No actionable signal could be derived.
    Unintelligible,
}

/// Per-turn input handed to a node handler: the classified signal, any
/// quotes already extracted from the utterance, and the timestamp the
/// processor assigned to this turn. Handlers never read the wall clock.
#[derive(Clone, Debug)]
pub struct TurnContext {
    pub signal: TurnSignal,
    pub extracted: Vec<PartQuote>,
    pub now: DateTime<Utc>,
}

impl TurnContext {
    pub fn new(signal: TurnSignal, extracted: Vec<PartQuote>, now: DateTime<Utc>) -> Self {
        Self { signal, extracted, now }
    }

    pub fn signal_only(signal: TurnSignal, now: DateTime<Utc>) -> Self {
        Self::new(signal, Vec::new(), now)
    }
}

/// Result of one node handler invocation. `lines` are the AI replies for
/// this turn; the processor appends them to the history only after the
/// escalation policy has had the chance to override the transition, which
/// keeps the history append-only even when an override replaces the reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeOutcome {
    pub state: CallState,
    pub lines: Vec<String>,
}

impl NodeOutcome {
    pub fn new(state: CallState, lines: Vec<String>) -> Self {
        Self { state, lines }
    }

    pub fn single(state: CallState, line: String) -> Self {
        Self { state, lines: vec![line] }
    }
}
