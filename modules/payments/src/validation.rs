//! Synchronous validation of inbound payment payloads.
//!
//! Everything here rejects before any row is written, so a validation
//! failure is never partially applied.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::money::{self, MoneyError};

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("amount is invalid: {0}")]
    InvalidAmount(MoneyError),

    #[error("amount must be greater than zero")]
    ZeroAmount,

    #[error("currency must be a 3-letter uppercase code (ISO 4217), got: {0}")]
    InvalidCurrency(String),

    #[error("description must be between 1 and 500 characters, got {0}")]
    InvalidDescriptionLength(usize),

    #[error("customer email '{0}' is not a plausible address")]
    InvalidEmail(String),

    #[error("checkout reference must be non-empty when supplied")]
    EmptyReference,

    #[error("unknown payment method '{0}'")]
    UnknownMethod(String),

    #[error("manual payments cannot use the 'provider' method")]
    ProviderMethodReserved,
}

/// Parse and bound a decimal amount, returning minor units.
pub fn validate_amount(amount: Decimal) -> Result<i64, ValidationError> {
    let minor = money::to_minor_units(amount).map_err(ValidationError::InvalidAmount)?;
    if minor == 0 {
        return Err(ValidationError::ZeroAmount);
    }
    Ok(minor)
}

pub fn validate_currency(currency: &str) -> Result<(), ValidationError> {
    if currency.len() == 3 && currency.chars().all(|c| c.is_ascii_uppercase()) {
        Ok(())
    } else {
        Err(ValidationError::InvalidCurrency(currency.to_string()))
    }
}

pub fn validate_description(description: &str) -> Result<(), ValidationError> {
    let len = description.chars().count();
    if len == 0 || len > 500 {
        return Err(ValidationError::InvalidDescriptionLength(len));
    }
    Ok(())
}

/// Shallow shape check only; deliverability is the mail provider's job.
pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    let valid = email.len() <= 254
        && email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if valid {
        Ok(())
    } else {
        Err(ValidationError::InvalidEmail(email.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn amounts_must_be_positive() {
        assert_eq!(validate_amount(dec!(49.99)), Ok(4999));
        assert_eq!(validate_amount(dec!(0)), Err(ValidationError::ZeroAmount));
        assert!(matches!(
            validate_amount(dec!(-5)),
            Err(ValidationError::InvalidAmount(_))
        ));
    }

    #[test]
    fn currency_codes_are_strict() {
        assert!(validate_currency("GBP").is_ok());
        assert!(validate_currency("gbp").is_err());
        assert!(validate_currency("GBPX").is_err());
        assert!(validate_currency("").is_err());
    }

    #[test]
    fn description_bounds() {
        assert!(validate_description("Boiler deposit").is_ok());
        assert!(validate_description("").is_err());
        assert!(validate_description(&"x".repeat(501)).is_err());
    }

    #[test]
    fn email_shape() {
        assert!(validate_email("customer@example.co.uk").is_ok());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("a@nodot").is_err());
    }
}
