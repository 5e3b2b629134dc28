//! Totals breakdown, as checkout and the webhook compute it.

use rust_decimal::Decimal;

use kestrel_core::{PricingError, PricingRules, Totals};

/// Compute the totals for a subtotal or a charged gross amount.
///
/// # Errors
///
/// Returns `PricingError` when the amount is invalid, or when neither amount
/// was given.
pub fn quote(
    subtotal: Option<Decimal>,
    gross_minor: Option<i64>,
    rules: &PricingRules,
) -> Result<Totals, PricingError> {
    match (subtotal, gross_minor) {
        (Some(subtotal), _) => Totals::from_subtotal(subtotal, rules),
        (None, Some(gross)) => Totals::from_gross_minor(gross, rules),
        (None, None) => Ok(Totals::ZERO),
    }
}

/// Print the totals as JSON.
///
/// # Errors
///
/// Returns an error if the amount is invalid.
pub fn run(
    subtotal: Option<Decimal>,
    gross_minor: Option<i64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let totals = quote(subtotal, gross_minor, &PricingRules::default())?;

    #[allow(clippy::print_stdout)]
    {
        println!("{}", serde_json::to_string_pretty(&totals)?);
    }
    Ok(())
}
