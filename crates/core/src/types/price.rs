//! Type-safe price representation using decimal arithmetic.
//!
//! Catalog prices are stored as `NUMERIC(12, 2)` and carried as
//! [`Decimal`] in the currency's standard unit. Payment providers expect the
//! smallest currency unit instead (cents), so conversion happens here, at
//! the boundary, and nowhere else.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors converting between prices and minor units.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PriceError {
    #[error("price must not be negative: {0}")]
    Negative(Decimal),
    #[error("price {0} does not fit in minor units")]
    Overflow(Decimal),
    #[error("unsupported currency code: {0}")]
    UnknownCurrency(String),
}

/// A price with currency information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Price {
    /// Amount in the currency's standard unit (e.g., dollars, not cents).
    pub amount: Decimal,
    /// ISO 4217 currency code.
    pub currency_code: CurrencyCode,
}

impl Price {
    /// Create a new price.
    #[must_use]
    pub const fn new(amount: Decimal, currency_code: CurrencyCode) -> Self {
        Self {
            amount,
            currency_code,
        }
    }

    /// Build a price from an amount in the smallest currency unit.
    #[must_use]
    pub fn from_minor_units(minor: i64, currency_code: CurrencyCode) -> Self {
        Self {
            amount: Decimal::new(minor, currency_code.exponent()),
            currency_code,
        }
    }

    /// Amount in the smallest currency unit, rounded half away from zero.
    ///
    /// # Errors
    ///
    /// Returns `PriceError::Negative` for negative amounts and
    /// `PriceError::Overflow` if the value does not fit in an `i64`.
    pub fn minor_units(&self) -> Result<i64, PriceError> {
        if self.amount.is_sign_negative() && !self.amount.is_zero() {
            return Err(PriceError::Negative(self.amount));
        }

        let exponent = self.currency_code.exponent();
        let scaled = self.amount.round_dp(exponent) * Decimal::from(10_i64.pow(exponent));

        scaled
            .trunc()
            .to_i64()
            .ok_or(PriceError::Overflow(self.amount))
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dp = self.currency_code.exponent() as usize;
        write!(
            f,
            "{}{:.dp$}",
            self.currency_code.symbol(),
            self.amount.round_dp(self.currency_code.exponent())
        )
    }
}

/// ISO 4217 currency codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    #[default]
    USD,
    EUR,
    GBP,
    CAD,
    AUD,
    JPY,
}

impl CurrencyCode {
    /// Number of decimal places in the currency's minor unit.
    #[must_use]
    pub const fn exponent(self) -> u32 {
        match self {
            Self::JPY => 0,
            _ => 2,
        }
    }

    /// Currency symbol used for display.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::USD | Self::CAD | Self::AUD => "$",
            Self::EUR => "€",
            Self::GBP => "£",
            Self::JPY => "¥",
        }
    }

    /// Upper-case ISO code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::USD => "USD",
            Self::EUR => "EUR",
            Self::GBP => "GBP",
            Self::CAD => "CAD",
            Self::AUD => "AUD",
            Self::JPY => "JPY",
        }
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CurrencyCode {
    type Err = PriceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "USD" => Ok(Self::USD),
            "EUR" => Ok(Self::EUR),
            "GBP" => Ok(Self::GBP),
            "CAD" => Ok(Self::CAD),
            "AUD" => Ok(Self::AUD),
            "JPY" => Ok(Self::JPY),
            _ => Err(PriceError::UnknownCurrency(s.to_string())),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_minor_units_usd() {
        let price = Price::new(Decimal::new(1999, 2), CurrencyCode::USD);
        assert_eq!(price.minor_units().unwrap(), 1999);
    }

    #[test]
    fn test_minor_units_rounds_extra_precision() {
        let price = Price::new(Decimal::new(10_005, 3), CurrencyCode::USD);
        assert_eq!(price.minor_units().unwrap(), 1001);
    }

    #[test]
    fn test_minor_units_zero_decimal_currency() {
        let price = Price::new(Decimal::from(500), CurrencyCode::JPY);
        assert_eq!(price.minor_units().unwrap(), 500);
    }

    #[test]
    fn test_minor_units_rejects_negative() {
        let price = Price::new(Decimal::new(-100, 2), CurrencyCode::USD);
        assert!(matches!(price.minor_units(), Err(PriceError::Negative(_))));
    }

    #[test]
    fn test_from_minor_units() {
        let price = Price::from_minor_units(2550, CurrencyCode::EUR);
        assert_eq!(price.amount, Decimal::new(2550, 2));
        assert_eq!(price.to_string(), "€25.50");
    }

    #[test]
    fn test_currency_parse_is_case_insensitive() {
        assert_eq!("gbp".parse::<CurrencyCode>().unwrap(), CurrencyCode::GBP);
        assert!("XYZ".parse::<CurrencyCode>().is_err());
    }
}
