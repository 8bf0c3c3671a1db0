use serde::{Deserialize, Serialize};

/// Fixed availability vocabulary extracted from supplier speech.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    InStock,
    OutOfStock,
    Backorder,
    Unavailable,
}

impl Availability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InStock => "in_stock",
            Self::OutOfStock => "out_of_stock",
            Self::Backorder => "backorder",
            Self::Unavailable => "unavailable",
        }
    }

    /// Maps free-form availability phrasing onto the fixed enum. Negative
    /// phrasings are checked first so "don't have it in stock" never reads
    /// as in stock. Returns `None` when the text carries no availability
    /// signal at all.
    pub fn from_speech(normalized_text: &str) -> Option<Self> {
        if normalized_text.contains("backorder") || normalized_text.contains("back order") {
            return Some(Self::Backorder);
        }
        if normalized_text.contains("out of stock") || normalized_text.contains("sold out") {
            return Some(Self::OutOfStock);
        }
        if normalized_text.contains("discontinued")
            || normalized_text.contains("don't carry")
            || normalized_text.contains("do not carry")
            || normalized_text.contains("don't have")
            || normalized_text.contains("do not have")
            || normalized_text.contains("no longer")
            || normalized_text.contains("unavailable")
            || normalized_text.contains("not available")
        {
            return Some(Self::Unavailable);
        }
        if normalized_text.contains("in stock")
            || normalized_text.contains("on the shelf")
            || normalized_text.contains("have it here")
            || normalized_text.contains("available")
        {
            return Some(Self::InStock);
        }
        None
    }

    pub fn spoken_label(&self) -> &'static str {
        match self {
            Self::InStock => "in stock",
            Self::OutOfStock => "out of stock",
            Self::Backorder => "on backorder",
            Self::Unavailable => "unavailable",
        }
    }
}

/// A structured price/availability record for one requested part. The most
/// recent supplier statement is authoritative, so recording a quote for a
/// part replaces any earlier entry for the same part number.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartQuote {
    pub part_number: String,
    pub price_cents: Option<i64>,
    pub availability: Availability,
    pub lead_time_days: Option<u32>,
    pub notes: Option<String>,
}

impl PartQuote {
    pub fn unavailable(part_number: impl Into<String>) -> Self {
        Self {
            part_number: part_number.into(),
            price_cents: None,
            availability: Availability::Unavailable,
            lead_time_days: None,
            notes: None,
        }
    }
}

pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let absolute = cents.unsigned_abs();
    format!("{sign}${}.{:02}", absolute / 100, absolute % 100)
}

#[cfg(test)]
mod tests {
    use super::{format_cents, Availability};

    #[test]
    fn availability_keywords_map_to_enum() {
        let cases = [
            ("yeah that one's in stock", Some(Availability::InStock)),
            ("it's on backorder until march", Some(Availability::Backorder)),
            ("that part is out of stock right now", Some(Availability::OutOfStock)),
            ("we discontinued that line", Some(Availability::Unavailable)),
            ("sorry, not available anymore", Some(Availability::Unavailable)),
            ("let me check with the warehouse", None),
        ];
        for (text, expected) in cases {
            assert_eq!(Availability::from_speech(text), expected, "text: {text}");
        }
    }

    #[test]
    fn cents_render_as_dollars() {
        assert_eq!(format_cents(45_000), "$450.00");
        assert_eq!(format_cents(99), "$0.99");
        assert_eq!(format_cents(-1_250), "-$12.50");
    }
}
