//! Deterministic dialogue line templates. These are the authoritative
//! spoken lines; the language model classifies and extracts but never
//! authors what the agent says, so a model outage degrades accuracy of
//! understanding, not the words on the call.

use crate::domain::call::CallState;
use crate::domain::part::PartRequest;
use crate::domain::quote::format_cents;

pub fn opener(state: &CallState) -> String {
    format!(
        "Hi, this is an automated purchasing assistant calling on behalf of {}. \
         Could you connect me with your parts department, or are you able to \
         help with a parts quote?",
        state.caller_team
    )
}

pub fn greeting_reprompt() -> String {
    "Sorry, I may not have been clear. I'm calling to get a quote on some \
     replacement parts. Is this the right department for that?"
        .to_string()
}

pub fn hold_for_transfer() -> String {
    "Thank you, I'll hold while you transfer me.".to_string()
}

pub fn part_prompt(part: &PartRequest) -> String {
    format!(
        "I'm looking for part number {}, {} — quantity {}. \
         Could you give me a price and availability on that?",
        part.part_number, part.description, part.quantity
    )
}

pub fn part_reprompt(part: &PartRequest) -> String {
    format!(
        "Sorry, I didn't catch that. For part number {}, could you tell me \
         the price and whether it's in stock?",
        part.part_number
    )
}

pub fn acknowledge_unavailable(part: &PartRequest) -> String {
    format!("Understood, I'll note that {} isn't available.", part.part_number)
}

pub fn negotiate_prompt(part: &PartRequest, quoted_cents: i64, budget_cents: i64) -> String {
    format!(
        "I appreciate that, but {} is above what we can spend on {} — \
         our ceiling is {}. Is there any room to come down on that price?",
        format_cents(quoted_cents),
        part.part_number,
        format_cents(budget_cents)
    )
}

pub fn accept_at_budget(part: &PartRequest, budget_cents: i64) -> String {
    format!(
        "That's great, thank you. I'll record {} at {}.",
        part.part_number,
        format_cents(budget_cents)
    )
}

pub fn readback(state: &CallState) -> String {
    let mut summary = Vec::with_capacity(state.quotes.len());
    for quote in &state.quotes {
        let mut entry = match quote.price_cents {
            Some(price) => format!("{} at {}", quote.part_number, format_cents(price)),
            None => format!("{} with no price", quote.part_number),
        };
        entry.push_str(&format!(", {}", quote.availability.spoken_label()));
        if let Some(days) = quote.lead_time_days {
            entry.push_str(&format!(", about {days} day lead time"));
        }
        summary.push(entry);
    }
    format!(
        "Perfect, let me read that back: {}. I'll send this over to our team \
         for purchase order {}. Thanks so much for your help today.",
        summary.join("; "),
        state.quote_request_id
    )
}

pub fn escalation_line(state: &CallState) -> String {
    format!(
        "I apologize, I don't want to waste your time. I'll have someone from \
         {} call you back directly to sort this out. Thank you for your patience.",
        state.caller_team
    )
}

pub fn voicemail_message(state: &CallState) -> String {
    format!(
        "Hello, this message is for {}. I'm calling on behalf of {} about a \
         parts quote request, reference {}. We'd appreciate a call back at {} \
         — we'll also follow up by email. Thank you.",
        state.supplier_name, state.caller_team, state.quote_request_id, state.callback_number
    )
}
