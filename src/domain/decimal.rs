//! Lossless decimal price type backed by rust_decimal.
//!
//! Prices are the only fractional quantities in the engine. Amounts, shares and
//! valuations stay integral; converting an amount through a price always floors.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal as RustDecimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Oracle price per unit of an asset.
///
/// Serialized as a JSON string so quotes survive round trips exactly.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Decimal(#[serde(with = "rust_decimal::serde::str")] RustDecimal);

impl Decimal {
    /// Parse a price string such as `"0.9975"` without going through a float.
    pub fn from_str_canonical(s: &str) -> Result<Self, rust_decimal::Error> {
        RustDecimal::from_str(s).map(Decimal)
    }

    /// Shortest form without trailing zeros or exponent.
    pub fn to_canonical_string(&self) -> String {
        self.0.normalize().to_string()
    }

    pub fn zero() -> Self {
        Decimal(RustDecimal::ZERO)
    }

    /// The multiplicative identity (1), i.e. par.
    pub fn one() -> Self {
        Decimal(RustDecimal::ONE)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        !self.is_zero() && self.0.is_sign_negative()
    }

    /// Multiply an integer amount by this price and floor the result.
    ///
    /// Returns `None` when the amount does not fit the decimal mantissa, the
    /// product overflows, or the price is negative.
    pub fn mul_floor(&self, amount: u128) -> Option<u128> {
        if self.is_negative() {
            return None;
        }
        let amount = RustDecimal::from_u128(amount)?;
        amount.checked_mul(self.0)?.floor().to_u128()
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_canonical_string())
    }
}

impl FromStr for Decimal {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_canonical(s)
    }
}
