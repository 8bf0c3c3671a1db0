//! Turn classification. The model labels the supplier's utterance with one
//! of the fixed signals; on timeout, error, or an unparseable label a
//! keyword classifier takes over so the call never stalls on the model.

use std::sync::Arc;
use std::time::Duration;

use partline_core::{CallState, TurnSignal};

use crate::extract::contains_price_signal;
use crate::llm::LlmClient;

pub struct TurnClassifier {
    llm: Arc<dyn LlmClient>,
    timeout: Duration,
}

impl TurnClassifier {
    pub fn new(llm: Arc<dyn LlmClient>, timeout: Duration) -> Self {
        Self { llm, timeout }
    }

    pub async fn classify(&self, utterance: &str, state: &CallState) -> TurnSignal {
        let prompt = classification_prompt(utterance, state);
        match tokio::time::timeout(self.timeout, self.llm.complete(&prompt)).await {
            Ok(Ok(raw)) => {
                if let Some(signal) = parse_signal(&raw) {
                    return signal;
                }
                tracing::debug!(
                    event_name = "classify.model_output_unparseable",
                    "falling back to keyword classification"
                );
            }
            Ok(Err(error)) => {
                tracing::debug!(
                    event_name = "classify.model_error",
                    error = %error,
                    "falling back to keyword classification"
                );
            }
            Err(_elapsed) => {
                tracing::debug!(
                    event_name = "classify.model_timeout",
                    timeout_ms = self.timeout.as_millis() as u64,
                    "falling back to keyword classification"
                );
            }
        }
        classify_rules(utterance, state)
    }
}

fn classification_prompt(utterance: &str, state: &CallState) -> String {
    let last_ai = state.last_ai_line().unwrap_or("(call just connected)");
    format!(
        "You are monitoring a phone call to a parts supplier.\n\
         The agent last said: \"{last_ai}\"\n\
         The supplier replied: \"{utterance}\"\n\
         Label the reply with exactly one of: affirmative, negative, quote_info, \
         request_human, transfer_offer, voicemail, unintelligible.\n\
         quote_info means the reply carries a price, availability, or lead time. \
         voicemail means the reply is a recorded greeting, not a person. \
         Reply with the label only."
    )
}

/// Reads the model's label out of its reply. Labels are matched most
/// specific first because `quote_info` contains no other label but prose
/// around the label is common.
fn parse_signal(raw: &str) -> Option<TurnSignal> {
    let normalized = raw.to_ascii_lowercase();
    const LABELS: [(&str, TurnSignal); 7] = [
        ("unintelligible", TurnSignal::Unintelligible),
        ("quote_info", TurnSignal::QuoteInfo),
        ("request_human", TurnSignal::RequestHuman),
        ("transfer_offer", TurnSignal::TransferOffer),
        ("voicemail", TurnSignal::Voicemail),
        ("affirmative", TurnSignal::Affirmative),
        ("negative", TurnSignal::Negative),
    ];
    LABELS
        .iter()
        .find(|(label, _)| normalized.contains(label))
        .map(|(_, signal)| *signal)
}

const VOICEMAIL_PHRASES: [&str; 8] = [
    "leave a message",
    "leave your name",
    "after the tone",
    "after the beep",
    "voicemail",
    "voice mail",
    "not able to take your call",
    "unable to take your call",
];

const TRANSFER_PHRASES: [&str; 4] =
    ["transfer you", "put you through", "connect you", "transferring you"];

const HUMAN_PHRASES: [&str; 6] = [
    "real person",
    "actual person",
    "a human",
    "call me back",
    "call you back",
    "have someone",
];

const NEGATIVE_PHRASES: [&str; 4] = ["can't help", "cannot help", "wrong number", "not the right"];

const AFFIRMATIVE_PHRASES: [&str; 5] =
    ["of course", "go ahead", "how can i help", "what do you need", "can help"];

/// Keyword fallback. Precedence mirrors the node machine's priorities:
/// voicemail beats everything, then transfer and human hand-off, then
/// quote content, then plain yes/no.
pub(crate) fn classify_rules(utterance: &str, state: &CallState) -> TurnSignal {
    let normalized = utterance.to_ascii_lowercase();
    let words: Vec<&str> = normalized
        .split(|c: char| !c.is_ascii_alphanumeric() && c != '\'')
        .filter(|word| !word.is_empty())
        .collect();

    if VOICEMAIL_PHRASES.iter().any(|phrase| normalized.contains(phrase)) {
        return TurnSignal::Voicemail;
    }
    if TRANSFER_PHRASES.iter().any(|phrase| normalized.contains(phrase)) {
        return TurnSignal::TransferOffer;
    }
    if HUMAN_PHRASES.iter().any(|phrase| normalized.contains(phrase)) {
        return TurnSignal::RequestHuman;
    }
    if contains_price_signal(utterance, &state.parts)
        || partline_core::Availability::from_speech(&normalized).is_some()
    {
        return TurnSignal::QuoteInfo;
    }
    if words.iter().any(|word| matches!(*word, "no" | "nope" | "nah"))
        || NEGATIVE_PHRASES.iter().any(|phrase| normalized.contains(phrase))
    {
        return TurnSignal::Negative;
    }
    if words.iter().any(|word| {
        matches!(
            *word,
            "yes" | "yeah" | "yep" | "sure" | "correct" | "right" | "ok" | "okay" | "absolutely"
                | "speaking" | "certainly"
        )
    }) || AFFIRMATIVE_PHRASES.iter().any(|phrase| normalized.contains(phrase))
    {
        return TurnSignal::Affirmative;
    }
    TurnSignal::Unintelligible
}

#[cfg(test)]
mod tests {
    use partline_core::{CallId, CallInit, CallState, PartRequest, TurnSignal};

    use crate::classify::{classify_rules, parse_signal};

    fn state_fixture() -> CallState {
        CallState::from_init(CallInit {
            call_id: CallId("call-1".to_string()),
            quote_request_id: "QR-1".to_string(),
            supplier_id: "sup-1".to_string(),
            supplier_name: "Acme".to_string(),
            supplier_phone: "+15550100".to_string(),
            organization_id: "org-1".to_string(),
            caller_id: "user-1".to_string(),
            caller_team: "the procurement team".to_string(),
            callback_number: "+15550199".to_string(),
            parts: vec![PartRequest {
                part_number: "F-100".to_string(),
                description: "filter".to_string(),
                quantity: 1,
                budget_max_cents: None,
            }],
            custom_context: None,
            custom_instructions: None,
            max_negotiation_attempts: None,
        })
    }

    #[test]
    fn keyword_table_covers_every_signal() {
        let state = state_fixture();
        let cases = [
            ("yes, this is parts", TurnSignal::Affirmative),
            ("sure, go ahead", TurnSignal::Affirmative),
            ("nope, wrong number", TurnSignal::Negative),
            ("that one's $450, in stock", TurnSignal::QuoteInfo),
            ("it's on backorder", TurnSignal::QuoteInfo),
            ("runs about 450 bucks", TurnSignal::QuoteInfo),
            ("can I have someone call you back?", TurnSignal::RequestHuman),
            ("hold on, let me transfer you to the parts desk", TurnSignal::TransferOffer),
            (
                "you've reached Acme, please leave a message after the tone",
                TurnSignal::Voicemail,
            ),
            ("krzzzt -- hrm --", TurnSignal::Unintelligible),
        ];
        for (utterance, expected) in cases {
            assert_eq!(classify_rules(utterance, &state), expected, "utterance: {utterance}");
        }
    }

    #[test]
    fn voicemail_wins_over_other_cues() {
        let state = state_fixture();
        // a voicemail greeting that also mentions availability wording
        let utterance = "we're not available right now, leave a message after the beep";
        assert_eq!(classify_rules(utterance, &state), TurnSignal::Voicemail);
    }

    #[test]
    fn now_is_not_a_no() {
        let state = state_fixture();
        assert_eq!(classify_rules("now hang on a moment", &state), TurnSignal::Unintelligible);
    }

    #[test]
    fn model_labels_parse_with_surrounding_prose() {
        assert_eq!(parse_signal("quote_info"), Some(TurnSignal::QuoteInfo));
        assert_eq!(
            parse_signal("The label is: affirmative."),
            Some(TurnSignal::Affirmative)
        );
        assert_eq!(parse_signal("I am not sure about this one."), None);
    }
}
