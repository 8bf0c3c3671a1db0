//! Per-turn orchestration. Each webhook event loads the call state, runs
//! classification/extraction, dispatches exactly one node handler, applies
//! the escalation policy, and persists the result under a compare-and-set
//! version check. A lost race means another delivery of the same event
//! already won; the loser replays the stored reply instead of mutating.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use partline_core::domain::call::OUTCOME_CALL_ENDED;
use partline_core::nodes::script;
use partline_core::{
    dispatch, policy, AppConfig, CallId, CallInit, CallNode, CallRecord, CallState, CallStatus,
    DomainError, NextAction, TurnContext, TurnSignal,
};
use partline_store::{StateStore, StoreError};

use crate::classify::TurnClassifier;
use crate::extract::QuoteExtractor;
use crate::llm::LlmClient;

/// Webhook events delivered by the telephony platform.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CallEvent {
    CallStarted { init: CallInit },
    SupplierTurn { call_id: CallId, text: String },
    VoicemailDetected { call_id: CallId },
    CallEnded { call_id: CallId },
}

/// What the agent says next. `end_call` tells the telephony layer to hang
/// up after speaking the lines.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnReply {
    pub lines: Vec<String>,
    pub end_call: bool,
}

impl TurnReply {
    fn speak(lines: Vec<String>, end_call: bool) -> Self {
        Self { lines, end_call }
    }

    fn silent_hangup() -> Self {
        Self { lines: Vec::new(), end_call: true }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no call state for {0}")]
    UnknownCall(CallId),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct TurnProcessor<S: StateStore> {
    store: S,
    classifier: TurnClassifier,
    extractor: QuoteExtractor,
    default_max_negotiation_attempts: u32,
    clarification_threshold: u32,
}

impl<S: StateStore> TurnProcessor<S> {
    pub fn new(store: S, llm: Arc<dyn LlmClient>, config: &AppConfig) -> Self {
        let timeout = Duration::from_millis(config.llm.timeout_ms);
        Self {
            store,
            classifier: TurnClassifier::new(Arc::clone(&llm), timeout),
            extractor: QuoteExtractor::new(llm, timeout),
            default_max_negotiation_attempts: config.call.max_negotiation_attempts,
            clarification_threshold: config.call.clarification_threshold,
        }
    }

    pub async fn handle_event(&self, event: CallEvent) -> Result<TurnReply, EngineError> {
        match event {
            CallEvent::CallStarted { init } => self.handle_started(init).await,
            CallEvent::SupplierTurn { call_id, text } => self.handle_turn(&call_id, &text).await,
            CallEvent::VoicemailDetected { call_id } => self.handle_voicemail(&call_id).await,
            CallEvent::CallEnded { call_id } => self.handle_ended(&call_id).await,
        }
    }

    async fn handle_started(&self, mut init: CallInit) -> Result<TurnReply, EngineError> {
        if init.max_negotiation_attempts.is_none() {
            init.max_negotiation_attempts = Some(self.default_max_negotiation_attempts);
        }
        let call_id = init.call_id.clone();

        if let Some(existing) = self.store.get(&call_id).await? {
            warn!(
                event_name = "call.duplicate_start",
                call_id = %call_id,
                "call_started for a known call, replaying"
            );
            return Ok(replay_reply(&existing));
        }

        let mut state = CallState::from_init(init);
        let opener = script::opener(&state);
        state.push_ai(opener.clone(), Utc::now());

        match self.store.put(&state, 0).await {
            Ok(_) => {
                info!(
                    event_name = "call.started",
                    call_id = %call_id,
                    supplier = %state.supplier_name,
                    parts = state.parts.len(),
                    "outbound call initialized"
                );
                Ok(TurnReply::speak(vec![opener], false))
            }
            Err(StoreError::Conflict { .. }) => {
                // a concurrent duplicate delivery won the insert
                let existing = self
                    .store
                    .get(&call_id)
                    .await?
                    .ok_or_else(|| EngineError::UnknownCall(call_id.clone()))?;
                Ok(replay_reply(&existing))
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn handle_turn(&self, call_id: &CallId, text: &str) -> Result<TurnReply, EngineError> {
        let mut state = self
            .store
            .get(call_id)
            .await?
            .ok_or_else(|| EngineError::UnknownCall(call_id.clone()))?;

        if state.status.is_terminal() {
            info!(
                event_name = "call.turn_after_terminal",
                call_id = %call_id,
                status = ?state.status,
                "replaying last line for a finished call"
            );
            return Ok(replay_reply(&state));
        }

        let base_version = state.version;
        let now = Utc::now();
        state.push_supplier(text, now);

        // The clarification gate runs before classification so the
        // override cannot be talked out of by a confident model.
        let outcome = if policy::clarification_exhausted(&state, self.clarification_threshold) {
            info!(
                event_name = "call.clarification_exhausted",
                call_id = %call_id,
                attempts = state.clarification_attempts,
                "escalating after repeated misunderstandings"
            );
            policy::force_escalation(state)
        } else {
            let signal = self.classifier.classify(text, &state).await;
            let extracted = if signal == TurnSignal::QuoteInfo {
                let current = match state.current_node {
                    CallNode::Negotiate => state.over_budget_part().map(|(part, _)| part.clone()),
                    _ => state.next_unquoted_part().cloned(),
                };
                self.extractor.extract(text, &state.parts, current.as_ref()).await
            } else {
                Vec::new()
            };
            let ctx = TurnContext::new(signal, extracted, now);
            policy::apply(dispatch(state, &ctx)?)
        };

        let mut next = outcome.state;
        for line in &outcome.lines {
            next.push_ai(line.clone(), now);
        }

        match self.store.put(&next, base_version).await {
            Ok(_) => {
                info!(
                    event_name = "call.turn",
                    call_id = %call_id,
                    node = ?next.current_node,
                    status = ?next.status,
                    quotes = next.quotes.len(),
                    "turn processed"
                );
                let end_call = next.status.is_terminal();
                Ok(TurnReply::speak(outcome.lines, end_call))
            }
            Err(StoreError::Conflict { .. }) => {
                warn!(
                    event_name = "call.turn_conflict",
                    call_id = %call_id,
                    base_version,
                    "dropping duplicate turn, replaying the stored reply"
                );
                let current = self
                    .store
                    .get(call_id)
                    .await?
                    .ok_or_else(|| EngineError::UnknownCall(call_id.clone()))?;
                Ok(replay_reply(&current))
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Transport-level voicemail detection. Bypasses whatever node was
    /// active: the call leaves one message and ends with an email fallback.
    async fn handle_voicemail(&self, call_id: &CallId) -> Result<TurnReply, EngineError> {
        let state = self
            .store
            .get(call_id)
            .await?
            .ok_or_else(|| EngineError::UnknownCall(call_id.clone()))?;
        if state.status.is_terminal() {
            return Ok(TurnReply::silent_hangup());
        }

        let base_version = state.version;
        let now = Utc::now();
        let outcome = policy::force_voicemail(state);
        let mut next = outcome.state;
        for line in &outcome.lines {
            next.push_ai(line.clone(), now);
        }

        match self.store.put(&next, base_version).await {
            Ok(_) => {
                info!(
                    event_name = "call.voicemail",
                    call_id = %call_id,
                    "leaving voicemail and scheduling email fallback"
                );
                Ok(TurnReply::speak(outcome.lines, true))
            }
            Err(StoreError::Conflict { .. }) => Ok(TurnReply::silent_hangup()),
            Err(error) => Err(error.into()),
        }
    }

    /// The telephony side ended the call (hangup or drop). A call still in
    /// progress is marked failed so the email fallback can pick it up.
    async fn handle_ended(&self, call_id: &CallId) -> Result<TurnReply, EngineError> {
        let mut state = self
            .store
            .get(call_id)
            .await?
            .ok_or_else(|| EngineError::UnknownCall(call_id.clone()))?;
        if state.status.is_terminal() {
            return Ok(TurnReply::silent_hangup());
        }

        let base_version = state.version;
        state.status = CallStatus::Failed;
        state.outcome = Some(OUTCOME_CALL_ENDED.to_string());
        state.next_action = NextAction::EmailFallback;

        match self.store.put(&state, base_version).await {
            Ok(_) => {
                warn!(
                    event_name = "call.ended_early",
                    call_id = %call_id,
                    node = ?state.current_node,
                    quotes = state.quotes.len(),
                    "call ended before confirmation"
                );
                Ok(TurnReply::silent_hangup())
            }
            Err(StoreError::Conflict { .. }) => Ok(TurnReply::silent_hangup()),
            Err(error) => Err(error.into()),
        }
    }

    /// Completion snapshot for the persistence collaborator. `None` until
    /// the call reaches a terminal status.
    pub async fn completion_record(
        &self,
        call_id: &CallId,
    ) -> Result<Option<CallRecord>, EngineError> {
        Ok(self
            .store
            .get(call_id)
            .await?
            .filter(|state| state.status.is_terminal())
            .map(|state| CallRecord::from_state(&state)))
    }
}

/// Idempotent response for duplicate or late deliveries: repeat the last
/// agent line without touching the stored state. For a finished call the
/// reply also instructs a hangup.
fn replay_reply(state: &CallState) -> TurnReply {
    TurnReply::speak(
        state.last_ai_line().map(str::to_string).into_iter().collect(),
        state.status.is_terminal(),
    )
}
