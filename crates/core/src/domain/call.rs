use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::part::PartRequest;
use crate::domain::quote::PartQuote;
use crate::errors::DomainError;
use crate::nodes::states::CallNode;

pub const DEFAULT_MAX_NEGOTIATION_ATTEMPTS: u32 = 2;

pub const OUTCOME_QUOTES_CONFIRMED: &str = "QUOTES_CONFIRMED";
pub const OUTCOME_VOICEMAIL_LEFT: &str = "VOICEMAIL_LEFT";
pub const OUTCOME_ESCALATED: &str = "ESCALATED_TO_HUMAN";
pub const OUTCOME_CALL_ENDED: &str = "CALL_ENDED_EARLY";

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallId(pub String);

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Ai,
    Supplier,
}

/// One line of the call transcript. The history is append-only; it is the
/// audit trail and the only context the language model ever sees.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub speaker: Speaker,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    InProgress,
    Completed,
    Failed,
    Escalated,
}

impl CallStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextAction {
    #[default]
    None,
    HumanFollowup,
    EmailFallback,
}

/// Initial context delivered with the `call_started` webhook event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallInit {
    pub call_id: CallId,
    pub quote_request_id: String,
    pub supplier_id: String,
    pub supplier_name: String,
    pub supplier_phone: String,
    pub organization_id: String,
    pub caller_id: String,
    pub caller_team: String,
    pub callback_number: String,
    pub parts: Vec<PartRequest>,
    pub custom_context: Option<String>,
    pub custom_instructions: Option<String>,
    pub max_negotiation_attempts: Option<u32>,
}

/// The full externalized record of one outbound call. Every webhook turn
/// loads this from the state store, mutates it exactly once, and persists
/// it back under a compare-and-set version check.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallState {
    pub call_id: CallId,
    pub quote_request_id: String,
    pub supplier_id: String,
    pub supplier_name: String,
    pub supplier_phone: String,
    pub organization_id: String,
    pub caller_id: String,
    pub caller_team: String,
    pub callback_number: String,
    pub parts: Vec<PartRequest>,
    pub custom_context: Option<String>,
    pub custom_instructions: Option<String>,
    pub current_node: CallNode,
    pub conversation_history: Vec<ConversationTurn>,
    pub negotiation_attempts: u32,
    pub max_negotiation_attempts: u32,
    pub clarification_attempts: u32,
    pub needs_transfer: bool,
    pub needs_human_escalation: bool,
    pub quotes: Vec<PartQuote>,
    pub status: CallStatus,
    pub outcome: Option<String>,
    pub next_action: NextAction,
    /// Store version for optimistic concurrency. 0 until the first put.
    pub version: u64,
}

impl CallState {
    pub fn from_init(init: CallInit) -> Self {
        Self {
            call_id: init.call_id,
            quote_request_id: init.quote_request_id,
            supplier_id: init.supplier_id,
            supplier_name: init.supplier_name,
            supplier_phone: init.supplier_phone,
            organization_id: init.organization_id,
            caller_id: init.caller_id,
            caller_team: init.caller_team,
            callback_number: init.callback_number,
            parts: init.parts,
            custom_context: init.custom_context,
            custom_instructions: init.custom_instructions,
            current_node: CallNode::Greeting,
            conversation_history: Vec::new(),
            negotiation_attempts: 0,
            max_negotiation_attempts: init
                .max_negotiation_attempts
                .unwrap_or(DEFAULT_MAX_NEGOTIATION_ATTEMPTS),
            clarification_attempts: 0,
            needs_transfer: false,
            needs_human_escalation: false,
            quotes: Vec::new(),
            status: CallStatus::InProgress,
            outcome: None,
            next_action: NextAction::None,
            version: 0,
        }
    }

    pub fn push_ai(&mut self, text: impl Into<String>, at: DateTime<Utc>) {
        self.conversation_history.push(ConversationTurn {
            speaker: Speaker::Ai,
            text: text.into(),
            timestamp: at,
        });
    }

    pub fn push_supplier(&mut self, text: impl Into<String>, at: DateTime<Utc>) {
        self.conversation_history.push(ConversationTurn {
            speaker: Speaker::Supplier,
            text: text.into(),
            timestamp: at,
        });
    }

    pub fn last_ai_line(&self) -> Option<&str> {
        self.conversation_history
            .iter()
            .rev()
            .find(|turn| turn.speaker == Speaker::Ai)
            .map(|turn| turn.text.as_str())
    }

    pub fn part(&self, part_number: &str) -> Option<&PartRequest> {
        self.parts.iter().find(|part| part.part_number == part_number)
    }

    pub fn quote_for(&self, part_number: &str) -> Option<&PartQuote> {
        self.quotes.iter().find(|quote| quote.part_number == part_number)
    }

    /// Records or replaces the quote for a part. Quotes must reference a
    /// part from the original request; anything else is rejected.
    pub fn record_quote(&mut self, quote: PartQuote) -> Result<(), DomainError> {
        if self.part(&quote.part_number).is_none() {
            return Err(DomainError::UnknownPart { part_number: quote.part_number });
        }
        match self.quotes.iter_mut().find(|q| q.part_number == quote.part_number) {
            Some(existing) => *existing = quote,
            None => self.quotes.push(quote),
        }
        Ok(())
    }

    /// The part currently under discussion: the first part, in request
    /// order, that has no recorded quote. A part with any quote (even an
    /// unavailable one) is never asked about again.
    pub fn next_unquoted_part(&self) -> Option<&PartRequest> {
        self.parts.iter().find(|part| self.quote_for(&part.part_number).is_none())
    }

    pub fn all_parts_quoted(&self) -> bool {
        self.next_unquoted_part().is_none()
    }

    /// The first quoted part whose recorded price still exceeds its budget
    /// ceiling. While this is non-empty the call has an open negotiation.
    pub fn over_budget_part(&self) -> Option<(&PartRequest, &PartQuote)> {
        self.parts.iter().find_map(|part| {
            let quote = self.quote_for(&part.part_number)?;
            let price = quote.price_cents?;
            part.exceeds_budget(price).then_some((part, quote))
        })
    }
}

/// Read-only completion snapshot handed to the persistence collaborator
/// once a call reaches a terminal status. The engine never writes the
/// durable record itself.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRecord {
    pub call_id: CallId,
    pub quote_request_id: String,
    pub supplier_id: String,
    pub organization_id: String,
    pub transcript: Vec<ConversationTurn>,
    pub quotes: Vec<PartQuote>,
    pub status: CallStatus,
    pub outcome: Option<String>,
    pub next_action: NextAction,
}

impl CallRecord {
    pub fn from_state(state: &CallState) -> Self {
        Self {
            call_id: state.call_id.clone(),
            quote_request_id: state.quote_request_id.clone(),
            supplier_id: state.supplier_id.clone(),
            organization_id: state.organization_id.clone(),
            transcript: state.conversation_history.clone(),
            quotes: state.quotes.clone(),
            status: state.status,
            outcome: state.outcome.clone(),
            next_action: state.next_action,
        }
    }
}
