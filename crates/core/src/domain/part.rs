use serde::{Deserialize, Serialize};

/// One line item from the originating quote request. Parts are asked about
/// in the order the request lists them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartRequest {
    pub part_number: String,
    pub description: String,
    pub quantity: u32,
    /// Budget ceiling in integer cents. `None` means any quoted price is
    /// acceptable without negotiation.
    pub budget_max_cents: Option<i64>,
}

impl PartRequest {
    pub fn exceeds_budget(&self, price_cents: i64) -> bool {
        match self.budget_max_cents {
            Some(budget) => price_cents > budget,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::PartRequest;

    #[test]
    fn budget_check_only_applies_when_ceiling_is_set() {
        let capped = PartRequest {
            part_number: "AX-200".to_string(),
            description: "hydraulic pump".to_string(),
            quantity: 1,
            budget_max_cents: Some(40_000),
        };
        assert!(capped.exceeds_budget(50_000));
        assert!(!capped.exceeds_budget(40_000));

        let uncapped = PartRequest { budget_max_cents: None, ..capped };
        assert!(!uncapped.exceeds_budget(i64::MAX));
    }
}
