//! Per-token pricing for supported models.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Input/output cost per token in USD. Unknown models cost nothing.
pub fn model_cost(model: &str) -> (Decimal, Decimal) {
    // Longest prefix first so "gemini-2.5-flash-lite" doesn't match "gemini-2.5-flash".
    const TABLE: &[(&str, Decimal, Decimal)] = &[
        ("gemini-2.5-flash-lite", dec!(0.0000001), dec!(0.0000004)),
        ("gemini-2.5-flash", dec!(0.0000003), dec!(0.0000025)),
        ("gemini-2.5-pro", dec!(0.00000125), dec!(0.00001)),
        ("gemini-2.0-flash", dec!(0.0000001), dec!(0.0000004)),
    ];

    TABLE
        .iter()
        .find(|(prefix, _, _)| model.starts_with(prefix))
        .map(|(_, input, output)| (*input, *output))
        .unwrap_or((Decimal::ZERO, Decimal::ZERO))
}

/// Estimated cost of a single call.
pub fn call_cost(
    (input_rate, output_rate): (Decimal, Decimal),
    input_tokens: u32,
    output_tokens: u32,
) -> Decimal {
    input_rate * Decimal::from(input_tokens) + output_rate * Decimal::from(output_tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flash_lite_not_shadowed_by_flash() {
        assert_eq!(model_cost("gemini-2.5-flash-lite").1, dec!(0.0000004));
        assert_eq!(model_cost("gemini-2.5-flash").1, dec!(0.0000025));
    }

    #[test]
    fn unknown_model_is_free() {
        assert_eq!(model_cost("mystery"), (Decimal::ZERO, Decimal::ZERO));
    }

    #[test]
    fn call_cost_sums_both_directions() {
        let cost = call_cost(model_cost("gemini-2.5-flash"), 1_000_000, 1_000_000);
        assert_eq!(cost, dec!(2.8));
    }
}
