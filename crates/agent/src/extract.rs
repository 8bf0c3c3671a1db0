//! Structured quote extraction from free-form supplier speech. The model
//! path asks for a strict JSON array; the heuristic path tokenizes the
//! utterance and pulls out money tokens, availability keywords, and lead
//! times. Neither path ever fabricates a price: an utterance that resolves
//! to nothing yields no entries and the node re-prompts.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use partline_core::{Availability, PartQuote, PartRequest};

use crate::llm::LlmClient;

pub struct QuoteExtractor {
    llm: Arc<dyn LlmClient>,
    timeout: Duration,
}

impl QuoteExtractor {
    pub fn new(llm: Arc<dyn LlmClient>, timeout: Duration) -> Self {
        Self { llm, timeout }
    }

    /// Extracts zero or more per-part quotes from one utterance. `current`
    /// is the part under discussion; statements naming no part are
    /// attributed to it. Entries for unknown part numbers are dropped.
    pub async fn extract(
        &self,
        utterance: &str,
        parts: &[PartRequest],
        current: Option<&PartRequest>,
    ) -> Vec<PartQuote> {
        let prompt = extraction_prompt(utterance, parts, current);
        match tokio::time::timeout(self.timeout, self.llm.complete(&prompt)).await {
            Ok(Ok(raw)) => {
                if let Some(quotes) = parse_model_quotes(&raw, parts) {
                    return quotes;
                }
                tracing::debug!(
                    event_name = "extract.model_output_unparseable",
                    "falling back to heuristic extraction"
                );
            }
            Ok(Err(error)) => {
                tracing::debug!(
                    event_name = "extract.model_error",
                    error = %error,
                    "falling back to heuristic extraction"
                );
            }
            Err(_elapsed) => {
                tracing::debug!(
                    event_name = "extract.model_timeout",
                    timeout_ms = self.timeout.as_millis() as u64,
                    "falling back to heuristic extraction"
                );
            }
        }
        extract_rules(utterance, parts, current)
    }
}

fn extraction_prompt(
    utterance: &str,
    parts: &[PartRequest],
    current: Option<&PartRequest>,
) -> String {
    let part_list = parts
        .iter()
        .map(|part| format!("- {} ({})", part.part_number, part.description))
        .collect::<Vec<_>>()
        .join("\n");
    let focus = current
        .map(|part| format!("The part currently being discussed is {}.", part.part_number))
        .unwrap_or_default();
    format!(
        "Extract price and availability quotes from this supplier statement.\n\
         Known parts:\n{part_list}\n{focus}\n\
         Statement: \"{utterance}\"\n\
         Reply with ONLY a JSON array; each element: {{\"part_number\": string, \
         \"price\": number|null (dollars), \"availability\": \
         \"in_stock\"|\"out_of_stock\"|\"backorder\"|\"unavailable\"|null, \
         \"lead_time_days\": number|null, \"notes\": string|null}}. \
         Use [] if the statement contains no quote information."
    )
}

#[derive(Debug, Deserialize)]
struct RawQuote {
    part_number: String,
    price: Option<f64>,
    availability: Option<String>,
    lead_time_days: Option<u32>,
    notes: Option<String>,
}

/// Parses the model's JSON reply. Returns `None` when no well-formed array
/// is present, which sends the caller to the heuristic path.
fn parse_model_quotes(raw: &str, parts: &[PartRequest]) -> Option<Vec<PartQuote>> {
    let start = raw.find('[')?;
    let end = raw.rfind(']')?;
    let entries: Vec<RawQuote> = serde_json::from_str(raw.get(start..=end)?).ok()?;

    let quotes = entries
        .into_iter()
        .filter_map(|entry| {
            let part = parts
                .iter()
                .find(|part| part.part_number.eq_ignore_ascii_case(&entry.part_number))?;
            let availability = entry
                .availability
                .as_deref()
                .and_then(availability_from_label)
                .or_else(|| entry.price.map(|_| Availability::InStock))?;
            Some(PartQuote {
                part_number: part.part_number.clone(),
                price_cents: entry.price.map(dollars_to_cents),
                availability,
                lead_time_days: entry.lead_time_days,
                notes: entry.notes,
            })
        })
        .collect();
    Some(quotes)
}

fn availability_from_label(label: &str) -> Option<Availability> {
    match label.trim() {
        "in_stock" | "in stock" => Some(Availability::InStock),
        "out_of_stock" | "out of stock" => Some(Availability::OutOfStock),
        "backorder" => Some(Availability::Backorder),
        "unavailable" => Some(Availability::Unavailable),
        other => Availability::from_speech(&other.to_ascii_lowercase()),
    }
}

fn dollars_to_cents(dollars: f64) -> i64 {
    (dollars * 100.0).round() as i64
}

/// Deterministic fallback extraction. Attribution order: explicit part
/// number mention, ordinal reference ("the second one"), then the part
/// currently under discussion.
pub(crate) fn extract_rules(
    utterance: &str,
    parts: &[PartRequest],
    current: Option<&PartRequest>,
) -> Vec<PartQuote> {
    let normalized = utterance.to_ascii_lowercase();

    let mut mentions: Vec<(usize, &PartRequest)> = parts
        .iter()
        .filter_map(|part| {
            normalized.find(&part.part_number.to_ascii_lowercase()).map(|pos| (pos, part))
        })
        .collect();

    const ORDINALS: [&str; 5] = ["first", "second", "third", "fourth", "fifth"];
    for (index, ordinal) in ORDINALS.iter().enumerate() {
        if let (Some(pos), Some(part)) = (normalized.find(ordinal), parts.get(index)) {
            if !mentions.iter().any(|(_, seen)| seen.part_number == part.part_number) {
                mentions.push((pos, part));
            }
        }
    }
    mentions.sort_by_key(|(pos, _)| *pos);

    if mentions.is_empty() {
        return current
            .and_then(|part| quote_from_segment(&normalized, part, parts))
            .into_iter()
            .collect();
    }

    let mut quotes = Vec::new();
    for (index, (pos, part)) in mentions.iter().enumerate() {
        let end = mentions.get(index + 1).map(|(next, _)| *next).unwrap_or(normalized.len());
        if let Some(quote) = quote_from_segment(&normalized[*pos..end], part, parts) {
            quotes.push(quote);
        }
    }
    quotes
}

fn quote_from_segment(segment: &str, part: &PartRequest, parts: &[PartRequest]) -> Option<PartQuote> {
    // Scrub part numbers first so their digits never read as prices.
    let scrubbed = scrub_part_numbers(segment, parts);
    let tokens = tokenize(&scrubbed);
    let price_cents = find_price(&tokens);
    let availability = Availability::from_speech(segment);
    let lead_time_days = find_lead_time(&tokens);

    match (price_cents, availability) {
        (Some(price), availability) => Some(PartQuote {
            part_number: part.part_number.clone(),
            price_cents: Some(price),
            availability: availability.unwrap_or(Availability::InStock),
            lead_time_days,
            notes: None,
        }),
        // A negative availability statement is a complete answer without a
        // price; a bare "in stock" is not, so the node re-asks for a price.
        (None, Some(availability)) if availability != Availability::InStock => Some(PartQuote {
            part_number: part.part_number.clone(),
            price_cents: None,
            availability,
            lead_time_days,
            notes: None,
        }),
        _ => None,
    }
}

fn scrub_part_numbers(text: &str, parts: &[PartRequest]) -> String {
    let mut scrubbed = text.to_string();
    for part in parts {
        let needle = part.part_number.to_ascii_lowercase();
        if !needle.is_empty() {
            scrubbed = scrubbed.replace(&needle, " ");
        }
    }
    scrubbed
}

fn tokenize(text: &str) -> Vec<String> {
    let mut sanitized = String::with_capacity(text.len());
    for character in text.chars() {
        if character.is_ascii_alphanumeric() || matches!(character, '$' | '.') {
            sanitized.push(character);
        } else {
            sanitized.push(' ');
        }
    }
    sanitized
        .split_whitespace()
        .map(|token| token.trim_end_matches('.').to_string())
        .filter(|token| !token.is_empty())
        .collect()
}

const NON_PRICE_UNITS: [&str; 12] = [
    "day", "days", "week", "weeks", "business", "minute", "minutes", "second", "seconds", "hour",
    "hours", "percent",
];

fn find_price(tokens: &[String]) -> Option<i64> {
    // explicit money first: $-prefixed or a dollars/bucks neighbor
    for (index, token) in tokens.iter().enumerate() {
        let next = tokens.get(index + 1).map(String::as_str).unwrap_or("");
        if token.starts_with('$') || matches!(next, "dollars" | "bucks") {
            if let Some(cents) = parse_money_token(token) {
                return Some(cents);
            }
        }
    }
    // then bare numbers not bound to a non-price unit
    for (index, token) in tokens.iter().enumerate() {
        if !token.chars().next().is_some_and(|c| c.is_ascii_digit()) {
            continue;
        }
        let next = tokens.get(index + 1).map(String::as_str).unwrap_or("");
        if NON_PRICE_UNITS.contains(&next) {
            continue;
        }
        if let Some(cents) = parse_money_token(token) {
            return Some(cents);
        }
    }
    None
}

fn parse_money_token(token: &str) -> Option<i64> {
    let trimmed = token.trim_start_matches('$').trim_end_matches(',');
    if trimmed.is_empty() {
        return None;
    }

    let (number_part, multiplier) = if let Some(prefix) = trimmed.strip_suffix('k') {
        (prefix, 1_000.0)
    } else if let Some(prefix) = trimmed.strip_suffix('m') {
        (prefix, 1_000_000.0)
    } else {
        (trimmed, 1.0)
    };

    let amount = number_part.replace(',', "").parse::<f64>().ok()?;
    Some((amount * multiplier * 100.0).round() as i64)
}

fn find_lead_time(tokens: &[String]) -> Option<u32> {
    for (index, token) in tokens.iter().enumerate() {
        let Ok(value) = token.parse::<u32>() else { continue };
        match tokens.get(index + 1).map(String::as_str) {
            Some("day" | "days") => return Some(value),
            Some("week" | "weeks") => return Some(value.saturating_mul(7)),
            Some("business")
                if matches!(tokens.get(index + 2).map(String::as_str), Some("day" | "days")) =>
            {
                return Some(value)
            }
            _ => {}
        }
    }
    None
}

/// Whether the utterance carries anything that reads as a price. Used by
/// the fallback classifier to recognize quote content.
pub(crate) fn contains_price_signal(utterance: &str, parts: &[PartRequest]) -> bool {
    let normalized = utterance.to_ascii_lowercase();
    let scrubbed = scrub_part_numbers(&normalized, parts);
    find_price(&tokenize(&scrubbed)).is_some()
}
