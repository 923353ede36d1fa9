//! Strategy position abstraction for leaf investables.
//!
//! A position is the asset-specific part of a leaf vault (a lending market, an
//! LP share, a hedged basis trade). The accounting engine only needs it to report
//! its balance sheet and to move deposit-asset tokens in and out.

use crate::domain::{Address, AssetBalance, Params};
use crate::error::VaultError;
use crate::ledger::TokenLedger;
use std::any::Any;
use std::fmt;
use thiserror::Error;

pub mod mock;

pub use mock::MockPosition;

/// Proportion of a holding, `numerator / denominator`, applied with floor rounding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fraction {
    pub numerator: u128,
    pub denominator: u128,
}

impl Fraction {
    pub fn new(numerator: u128, denominator: u128) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    pub fn whole() -> Self {
        Self::new(1, 1)
    }

    /// True when the fraction covers the entire holding.
    pub fn is_whole(&self) -> bool {
        self.denominator != 0 && self.numerator >= self.denominator
    }

    /// `floor(amount * numerator / denominator)`; the whole amount when `is_whole`.
    pub fn of(&self, amount: u128) -> Option<u128> {
        if self.is_whole() {
            return Some(amount);
        }
        crate::domain::mul_div_floor(amount, self.numerator, self.denominator)
    }
}

/// Strategy-specific position owned by a leaf investable.
///
/// Positions see the token ledger but not the engine, so they cannot call back
/// into any investable.
pub trait Position: fmt::Debug {
    /// Assets currently held, in native units.
    fn asset_balances(&self, ledger: &TokenLedger) -> Vec<AssetBalance>;

    /// Liabilities currently owed, in native units.
    fn liability_balances(&self, ledger: &TokenLedger) -> Vec<AssetBalance>;

    /// Pull `amount` of the deposit asset from `from` and deploy it.
    fn deposit(
        &mut self,
        ledger: &mut TokenLedger,
        from: &Address,
        amount: u128,
        params: &Params,
    ) -> Result<(), PositionError>;

    /// Unwind `fraction` of the position and pay the deposit-asset proceeds to `to`.
    ///
    /// Returns the amount paid. A whole fraction must leave nothing behind.
    fn withdraw(
        &mut self,
        ledger: &mut TokenLedger,
        to: &Address,
        fraction: Fraction,
        params: &Params,
    ) -> Result<u128, PositionError>;

    /// Realize accrued rewards as deposit asset paid to `to`; returns the amount.
    fn harvest(
        &mut self,
        ledger: &mut TokenLedger,
        to: &Address,
        params: &Params,
    ) -> Result<u128, PositionError>;

    fn clone_box(&self) -> Box<dyn Position>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl Clone for Box<dyn Position> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PositionError {
    #[error("position rejected {operation}: {reason}")]
    Rejected {
        operation: &'static str,
        reason: String,
    },
    #[error("slippage guard: received {received}, minimum {minimum}")]
    SlippageExceeded { received: u128, minimum: u128 },
    #[error("position ledger error: {0}")]
    Ledger(Box<VaultError>),
    #[error("position arithmetic overflow")]
    Overflow,
}

impl From<VaultError> for PositionError {
    fn from(err: VaultError) -> Self {
        PositionError::Ledger(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fraction_of() {
        assert_eq!(Fraction::new(1, 3).of(100), Some(33));
        assert_eq!(Fraction::new(3, 3).of(100), Some(100));
        assert_eq!(Fraction::new(0, 3).of(100), Some(0));
        assert_eq!(Fraction::new(1, 0).of(100), None);
    }

    #[test]
    fn test_fraction_whole() {
        assert!(Fraction::whole().is_whole());
        assert!(Fraction::new(10, 10).is_whole());
        assert!(!Fraction::new(9, 10).is_whole());
    }

    #[test]
    fn test_position_error_display() {
        let err = PositionError::SlippageExceeded {
            received: 95,
            minimum: 99,
        };
        assert_eq!(err.to_string(), "slippage guard: received 95, minimum 99");
    }
}
