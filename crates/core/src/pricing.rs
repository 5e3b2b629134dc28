//! Order totals.
//!
//! Every place that shows or charges money (checkout preview, gateway session
//! creation, webhook reconciliation) goes through [`compute_totals`] or
//! [`Totals::from_subtotal`], so the three call sites cannot drift apart.
//!
//! Rounding is half-away-from-zero to two decimals, applied independently
//! where tax and total are produced. Changing either rounding point changes
//! the charged amount by a cent on some carts.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Errors raised when totals cannot be trusted.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PricingError {
    /// A line or the subtotal came out negative.
    #[error("subtotal cannot be negative (got {subtotal})")]
    Negative {
        /// Offending subtotal.
        subtotal: Decimal,
    },
    /// Arithmetic left the representable range.
    #[error("totals overflowed")]
    Overflow,
    /// The subtotal is above the single-transaction ceiling.
    #[error("subtotal {subtotal} exceeds maximum of {max}")]
    ExceedsMaximum {
        /// Offending subtotal.
        subtotal: Decimal,
        /// Configured ceiling.
        max: Decimal,
    },
}

/// Store-wide pricing rules.
///
/// VAT rate, free-shipping threshold and flat shipping fee are business
/// constants; only the transaction ceiling is configurable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricingRules {
    /// VAT rate applied to the subtotal (0.23).
    pub vat_rate: Decimal,
    /// Subtotals at or above this ship for free (39.00).
    pub free_shipping_threshold: Decimal,
    /// Shipping fee below the threshold (5.99).
    pub flat_shipping: Decimal,
    /// Largest subtotal accepted in a single transaction.
    pub max_subtotal: Decimal,
}

impl PricingRules {
    /// Default ceiling for a single transaction.
    pub const DEFAULT_MAX_SUBTOTAL: i64 = 100_000;

    /// Standard rules with a custom transaction ceiling.
    #[must_use]
    pub fn with_max_subtotal(max_subtotal: Decimal) -> Self {
        Self {
            max_subtotal,
            ..Self::default()
        }
    }
}

impl Default for PricingRules {
    fn default() -> Self {
        Self {
            vat_rate: Decimal::new(23, 2),
            free_shipping_threshold: Decimal::new(39, 0),
            flat_shipping: Decimal::new(599, 2),
            max_subtotal: Decimal::new(Self::DEFAULT_MAX_SUBTOTAL, 0),
        }
    }
}

/// The price-relevant part of a cart line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineAmount {
    /// Authoritative unit price from the catalog.
    pub unit_price: Decimal,
    /// Number of units.
    pub quantity: u32,
}

/// Derived order totals, in the store currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub shipping: Decimal,
    pub total: Decimal,
}

impl Totals {
    /// All-zero totals (empty cart).
    pub const ZERO: Self = Self {
        subtotal: Decimal::ZERO,
        tax: Decimal::ZERO,
        shipping: Decimal::ZERO,
        total: Decimal::ZERO,
    };

    /// Derive tax, shipping and total from an unrounded subtotal.
    ///
    /// # Errors
    ///
    /// Returns [`PricingError`] if the subtotal is negative, above the
    /// configured ceiling, or the arithmetic overflows.
    pub fn from_subtotal(subtotal: Decimal, rules: &PricingRules) -> Result<Self, PricingError> {
        if subtotal.is_sign_negative() && !subtotal.is_zero() {
            return Err(PricingError::Negative { subtotal });
        }
        if subtotal > rules.max_subtotal {
            return Err(PricingError::ExceedsMaximum {
                subtotal,
                max: rules.max_subtotal,
            });
        }

        let tax = round2(
            subtotal
                .checked_mul(rules.vat_rate)
                .ok_or(PricingError::Overflow)?,
        );
        let shipping = if subtotal.is_zero() || subtotal >= rules.free_shipping_threshold {
            Decimal::ZERO
        } else {
            rules.flat_shipping
        };
        let total = round2(
            subtotal
                .checked_add(tax)
                .and_then(|sum| sum.checked_add(shipping))
                .ok_or(PricingError::Overflow)?,
        );

        Ok(Self {
            subtotal,
            tax,
            shipping,
            total,
        })
    }

    /// Reconstruct totals from the gross amount the gateway actually charged.
    ///
    /// Used only when checkout metadata is missing or unreadable. Assumes the
    /// whole gross carried VAT at `rules.vat_rate` and no shipping fee:
    /// `tax = round2(gross * rate / (1 + rate))`, `subtotal = gross - tax`.
    ///
    /// # Errors
    ///
    /// Returns [`PricingError::Negative`] for a negative amount and
    /// [`PricingError::Overflow`] if the arithmetic overflows.
    pub fn from_gross_minor(amount_minor: i64, rules: &PricingRules) -> Result<Self, PricingError> {
        let gross = Decimal::new(amount_minor, 2);
        if gross.is_sign_negative() && !gross.is_zero() {
            return Err(PricingError::Negative { subtotal: gross });
        }

        let divisor = Decimal::ONE
            .checked_add(rules.vat_rate)
            .ok_or(PricingError::Overflow)?;
        let tax = round2(
            gross
                .checked_mul(rules.vat_rate)
                .and_then(|v| v.checked_div(divisor))
                .ok_or(PricingError::Overflow)?,
        );
        let subtotal = gross.checked_sub(tax).ok_or(PricingError::Overflow)?;

        Ok(Self {
            subtotal,
            tax,
            shipping: Decimal::ZERO,
            total: gross,
        })
    }

    /// The total in minor currency units, as sent to the gateway.
    #[must_use]
    pub fn total_minor_units(&self) -> Option<i64> {
        to_minor_units(self.total)
    }
}

/// Compute totals for a list of priced lines.
///
/// `subtotal = Σ unit_price × quantity` with no intermediate rounding.
///
/// # Errors
///
/// Returns [`PricingError`] if any unit price is negative, the subtotal is
/// above the ceiling, or the arithmetic overflows.
pub fn compute_totals(lines: &[LineAmount], rules: &PricingRules) -> Result<Totals, PricingError> {
    let mut subtotal = Decimal::ZERO;
    for line in lines {
        if line.unit_price.is_sign_negative() && !line.unit_price.is_zero() {
            return Err(PricingError::Negative {
                subtotal: line.unit_price,
            });
        }
        let line_total = line
            .unit_price
            .checked_mul(Decimal::from(line.quantity))
            .ok_or(PricingError::Overflow)?;
        subtotal = subtotal
            .checked_add(line_total)
            .ok_or(PricingError::Overflow)?;
    }

    Totals::from_subtotal(subtotal, rules)
}

/// Round half away from zero to two decimal places.
#[must_use]
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Convert a currency amount to integer minor units (`round(amount × 100)`).
///
/// Returns `None` if the result does not fit in an `i64`.
#[must_use]
pub fn to_minor_units(amount: Decimal) -> Option<i64> {
    use rust_decimal::prelude::ToPrimitive;

    amount
        .checked_mul(Decimal::ONE_HUNDRED)?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}
