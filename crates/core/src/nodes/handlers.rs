//! One handler per conversation state. Handlers are pure transformations:
//! `CallState` plus a classified turn in, `NodeOutcome` out. Attempt-limit
//! enforcement lives in the policy layer, not here.

use crate::domain::call::{
    CallState, CallStatus, NextAction, OUTCOME_ESCALATED, OUTCOME_QUOTES_CONFIRMED,
    OUTCOME_VOICEMAIL_LEFT,
};
use crate::domain::quote::PartQuote;
use crate::errors::DomainError;
use crate::nodes::script;
use crate::nodes::states::{CallNode, NodeOutcome, TurnContext, TurnSignal};

/// Routes a turn to the handler for the call's current node. Exactly one
/// handler runs per turn. Terminal nodes accept no further turns; the
/// processor's status guard makes reaching them here an invariant breach.
pub fn dispatch(state: CallState, ctx: &TurnContext) -> Result<NodeOutcome, DomainError> {
    match state.current_node {
        CallNode::Greeting => greeting(state, ctx),
        CallNode::QuoteRequest => quote_request(state, ctx),
        CallNode::Negotiate => negotiate(state, ctx),
        node @ (CallNode::Confirmation | CallNode::HumanEscalation | CallNode::Voicemail) => {
            Err(DomainError::TerminalNode { node })
        }
    }
}

fn greeting(mut state: CallState, ctx: &TurnContext) -> Result<NodeOutcome, DomainError> {
    match ctx.signal {
        TurnSignal::Affirmative => Ok(advance(state, Vec::new())),
        TurnSignal::QuoteInfo => {
            // The supplier jumped straight to quoting; hand the same turn
            // to the quote-request handler so nothing is lost.
            state.current_node = CallNode::QuoteRequest;
            quote_request(state, ctx)
        }
        TurnSignal::TransferOffer => {
            state.needs_transfer = true;
            Ok(NodeOutcome::single(state, script::hold_for_transfer()))
        }
        TurnSignal::RequestHuman => Ok(enter_escalation(state)),
        TurnSignal::Voicemail => Ok(enter_voicemail(state)),
        TurnSignal::Negative | TurnSignal::Unintelligible => {
            state.clarification_attempts += 1;
            Ok(NodeOutcome::single(state, script::greeting_reprompt()))
        }
    }
}

fn quote_request(mut state: CallState, ctx: &TurnContext) -> Result<NodeOutcome, DomainError> {
    if !ctx.extracted.is_empty() {
        for quote in &ctx.extracted {
            state.record_quote(quote.clone())?;
        }
        // A recorded price above its ceiling opens a negotiation.
        if let Some((part, quote)) = state.over_budget_part() {
            let line = script::negotiate_prompt(
                part,
                quote.price_cents.unwrap_or_default(),
                part.budget_max_cents.unwrap_or_default(),
            );
            state.current_node = CallNode::Negotiate;
            state.negotiation_attempts += 1;
            return Ok(NodeOutcome::single(state, line));
        }
        return Ok(advance(state, Vec::new()));
    }

    let pending = state.next_unquoted_part().map(|part| part.part_number.clone());
    match (ctx.signal, pending) {
        (TurnSignal::Negative, Some(part_number)) => {
            state.record_quote(PartQuote::unavailable(&part_number))?;
            let ack = state
                .part(&part_number)
                .map(script::acknowledge_unavailable)
                .unwrap_or_default();
            Ok(advance(state, vec![ack]))
        }
        (TurnSignal::RequestHuman, _) => Ok(enter_escalation(state)),
        (TurnSignal::Voicemail, _) => Ok(enter_voicemail(state)),
        (TurnSignal::TransferOffer, _) => {
            state.needs_transfer = true;
            Ok(NodeOutcome::single(state, script::hold_for_transfer()))
        }
        (TurnSignal::Affirmative, Some(_)) => {
            // "sure, one second" — repeat the pending ask without penalty.
            let line = state.next_unquoted_part().map(script::part_prompt).unwrap_or_default();
            Ok(NodeOutcome::single(state, line))
        }
        (_, Some(_)) => {
            state.clarification_attempts += 1;
            let line = state.next_unquoted_part().map(script::part_reprompt).unwrap_or_default();
            Ok(NodeOutcome::single(state, line))
        }
        (_, None) => Ok(advance(state, Vec::new())),
    }
}

fn negotiate(mut state: CallState, ctx: &TurnContext) -> Result<NodeOutcome, DomainError> {
    for quote in &ctx.extracted {
        state.record_quote(quote.clone())?;
    }

    if let Some((part, quote)) = state.over_budget_part() {
        match ctx.signal {
            TurnSignal::Affirmative => {
                // The supplier agreed to our figure; the ceiling becomes
                // the recorded price.
                let budget = part.budget_max_cents.unwrap_or_default();
                let ack = script::accept_at_budget(part, budget);
                let mut accepted = quote.clone();
                accepted.price_cents = Some(budget);
                state.record_quote(accepted)?;
                Ok(advance(state, vec![ack]))
            }
            TurnSignal::RequestHuman => Ok(enter_escalation(state)),
            TurnSignal::Voicemail => Ok(enter_voicemail(state)),
            // Noise, or quote-shaped speech that yielded nothing parsable,
            // is not a refusal; repeat the ask at clarification cost
            // instead of spending a negotiation attempt.
            TurnSignal::Unintelligible => {
                let line = script::negotiate_prompt(
                    part,
                    quote.price_cents.unwrap_or_default(),
                    part.budget_max_cents.unwrap_or_default(),
                );
                state.clarification_attempts += 1;
                Ok(NodeOutcome::single(state, line))
            }
            TurnSignal::QuoteInfo if ctx.extracted.is_empty() => {
                let line = script::negotiate_prompt(
                    part,
                    quote.price_cents.unwrap_or_default(),
                    part.budget_max_cents.unwrap_or_default(),
                );
                state.clarification_attempts += 1;
                Ok(NodeOutcome::single(state, line))
            }
            _ => {
                // A repeated high quote or a refusal costs an attempt. The
                // policy layer escalates once attempts hit the limit.
                let line = script::negotiate_prompt(
                    part,
                    quote.price_cents.unwrap_or_default(),
                    part.budget_max_cents.unwrap_or_default(),
                );
                state.negotiation_attempts += 1;
                Ok(NodeOutcome::single(state, line))
            }
        }
    } else {
        // The latest statement brought the price inside the ceiling.
        Ok(advance(state, Vec::new()))
    }
}

/// Moves the call to the next unquoted part, or into confirmation once
/// every part has a recorded quote. Parts are always taken in request
/// order and never re-asked.
fn advance(mut state: CallState, mut lines: Vec<String>) -> NodeOutcome {
    let prompt = state.next_unquoted_part().map(script::part_prompt);
    match prompt {
        Some(line) => {
            state.current_node = CallNode::QuoteRequest;
            lines.push(line);
            NodeOutcome::new(state, lines)
        }
        None => enter_confirmation(state, lines),
    }
}

fn enter_confirmation(mut state: CallState, mut lines: Vec<String>) -> NodeOutcome {
    state.current_node = CallNode::Confirmation;
    state.status = CallStatus::Completed;
    state.outcome = Some(OUTCOME_QUOTES_CONFIRMED.to_string());
    lines.push(script::readback(&state));
    NodeOutcome::new(state, lines)
}

pub fn enter_escalation(mut state: CallState) -> NodeOutcome {
    state.current_node = CallNode::HumanEscalation;
    state.needs_human_escalation = true;
    state.status = CallStatus::Escalated;
    state.outcome = Some(OUTCOME_ESCALATED.to_string());
    state.next_action = NextAction::HumanFollowup;
    let line = script::escalation_line(&state);
    NodeOutcome::single(state, line)
}

pub fn enter_voicemail(mut state: CallState) -> NodeOutcome {
    state.current_node = CallNode::Voicemail;
    state.status = CallStatus::Completed;
    state.outcome = Some(OUTCOME_VOICEMAIL_LEFT.to_string());
    state.next_action = NextAction::EmailFallback;
    let line = script::voicemail_message(&state);
    NodeOutcome::single(state, line)
}
