//! Money codec: decimal amounts at the API edge, integer minor units
//! everywhere else.
//!
//! All storage, arithmetic, and events use minor units (pence/cents) so
//! no float ever touches a balance. Conversions happen only here, with
//! one rounding rule: half away from zero.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use thiserror::Error;

/// Largest representable amount: one billion minor units (10^7 currency
/// units). Anything at or above this is rejected as implausible input.
pub const MAX_AMOUNT_MINOR: i64 = 1_000_000_000;

#[derive(Debug, Error, PartialEq)]
pub enum MoneyError {
    #[error("amount must not be negative, got {0}")]
    Negative(Decimal),

    #[error("amount {0} exceeds the supported maximum")]
    TooLarge(Decimal),
}

/// Convert a decimal currency amount to minor units.
///
/// Rounds half away from zero at the second decimal place, so "0.005"
/// becomes 1 minor unit. Rejects negative amounts and amounts at or
/// above [`MAX_AMOUNT_MINOR`].
pub fn to_minor_units(amount: Decimal) -> Result<i64, MoneyError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(MoneyError::Negative(amount));
    }

    let scaled = (amount * Decimal::from(100))
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);

    match scaled.to_i64() {
        Some(minor) if minor < MAX_AMOUNT_MINOR => Ok(minor),
        _ => Err(MoneyError::TooLarge(amount)),
    }
}

/// Render minor units as the exact two-decimal display form.
pub fn to_decimal(amount_minor: i64) -> Decimal {
    Decimal::new(amount_minor, 2)
}

/// Proportional fee in minor units from basis points.
///
/// `round(amount_minor * bps / 10_000)` with the same half-away-from-zero
/// rule as [`to_minor_units`]. Negative bps are clamped to zero; amounts
/// are non-negative by the time they reach this function.
pub fn apply_fee_bps(amount_minor: i64, bps: i64) -> i64 {
    let bps = bps.max(0);
    let product = amount_minor as i128 * bps as i128;
    ((product + 5_000) / 10_000) as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn converts_whole_and_fractional_amounts() {
        assert_eq!(to_minor_units(dec!(49.99)), Ok(4999));
        assert_eq!(to_minor_units(dec!(100)), Ok(10000));
        assert_eq!(to_minor_units(dec!(0)), Ok(0));
        assert_eq!(to_minor_units(dec!(0.01)), Ok(1));
    }

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(to_minor_units(dec!(0.005)), Ok(1));
        assert_eq!(to_minor_units(dec!(1.125)), Ok(113));
        assert_eq!(to_minor_units(dec!(1.124)), Ok(112));
    }

    #[test]
    fn rejects_negative_amounts() {
        assert_eq!(
            to_minor_units(dec!(-0.01)),
            Err(MoneyError::Negative(dec!(-0.01)))
        );
    }

    #[test]
    fn rejects_amounts_at_the_ceiling() {
        assert_eq!(
            to_minor_units(dec!(10000000.00)),
            Err(MoneyError::TooLarge(dec!(10000000.00)))
        );
        assert_eq!(to_minor_units(dec!(9999999.99)), Ok(999_999_999));
    }

    #[test]
    fn round_trips_two_decimal_amounts() {
        for raw in ["0.01", "0.99", "12.34", "49.99", "9999999.99"] {
            let amount: Decimal = raw.parse().unwrap();
            let minor = to_minor_units(amount).unwrap();
            assert_eq!(to_decimal(minor), amount, "round trip failed for {raw}");
        }
    }

    #[test]
    fn display_form_has_two_decimals() {
        assert_eq!(to_decimal(4999).to_string(), "49.99");
        assert_eq!(to_decimal(100).to_string(), "1.00");
        assert_eq!(to_decimal(0).to_string(), "0.00");
    }

    #[test]
    fn fee_basis_points() {
        // 0.40% of 100.00 currency units
        assert_eq!(apply_fee_bps(10000, 40), 40);
        // 2.50% of 3.33 rounds 8.325 -> 8
        assert_eq!(apply_fee_bps(333, 250), 8);
        assert_eq!(apply_fee_bps(0, 250), 0);
        assert_eq!(apply_fee_bps(10000, 0), 0);
    }

    #[test]
    fn fee_clamps_negative_bps() {
        assert_eq!(apply_fee_bps(10000, -25), 0);
    }
}
