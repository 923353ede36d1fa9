//! Mock position for tests and scenario replay, without any external protocol.

use super::{Fraction, Position, PositionError};
use crate::domain::{Address, AssetBalance, AssetId, Bps, Params};
use crate::ledger::TokenLedger;
use std::any::Any;

/// Position that parks the deposit asset in its own ledger account.
///
/// Knobs let tests simulate leverage (a liability in the deposit asset),
/// withdrawal slippage, pending rewards, and outright rejection. A `Params::Bytes`
/// payload of 16 bytes is read as a little-endian minimum withdrawal output.
#[derive(Debug, Clone)]
pub struct MockPosition {
    asset: AssetId,
    account: Address,
    debt: u128,
    borrow_ratio: Bps,
    withdraw_slippage: Bps,
    pending_rewards: u128,
    reject_deposits: bool,
    reject_withdrawals: bool,
}

impl MockPosition {
    /// Create a new mock position holding `asset` under `position:<name>`.
    pub fn new(name: &str, asset: AssetId) -> Self {
        Self {
            asset,
            account: Address::new(format!("position:{}", name)),
            debt: 0,
            borrow_ratio: Bps::ZERO,
            withdraw_slippage: Bps::ZERO,
            pending_rewards: 0,
            reject_deposits: false,
            reject_withdrawals: false,
        }
    }

    /// Borrow `ratio` of every deposit on top of it, as a looping strategy would.
    pub fn with_borrow_ratio(mut self, ratio: Bps) -> Self {
        self.borrow_ratio = ratio;
        self
    }

    /// Lose `slippage` of every withdrawal's proceeds.
    pub fn with_withdraw_slippage(mut self, slippage: Bps) -> Self {
        self.withdraw_slippage = slippage;
        self
    }

    /// Ledger account holding the deployed tokens; mint into it to simulate yield.
    pub fn account(&self) -> &Address {
        &self.account
    }

    pub fn debt(&self) -> u128 {
        self.debt
    }

    pub fn add_rewards(&mut self, amount: u128) {
        self.pending_rewards = self.pending_rewards.saturating_add(amount);
    }

    pub fn set_withdraw_slippage(&mut self, slippage: Bps) {
        self.withdraw_slippage = slippage;
    }

    pub fn set_reject_deposits(&mut self, reject: bool) {
        self.reject_deposits = reject;
    }

    pub fn set_reject_withdrawals(&mut self, reject: bool) {
        self.reject_withdrawals = reject;
    }

    fn min_output(params: &Params) -> Option<u128> {
        match params {
            Params::Bytes(bytes) => {
                let raw: [u8; 16] = bytes.as_slice().try_into().ok()?;
                Some(u128::from_le_bytes(raw))
            }
            _ => None,
        }
    }
}

impl Position for MockPosition {
    fn asset_balances(&self, ledger: &TokenLedger) -> Vec<AssetBalance> {
        vec![AssetBalance::new(
            self.asset.clone(),
            ledger.balance_of(&self.asset, &self.account),
        )]
    }

    fn liability_balances(&self, _ledger: &TokenLedger) -> Vec<AssetBalance> {
        if self.debt == 0 {
            return Vec::new();
        }
        vec![AssetBalance::new(self.asset.clone(), self.debt)]
    }

    fn deposit(
        &mut self,
        ledger: &mut TokenLedger,
        from: &Address,
        amount: u128,
        _params: &Params,
    ) -> Result<(), PositionError> {
        if self.reject_deposits {
            return Err(PositionError::Rejected {
                operation: "deposit",
                reason: "deposits disabled".to_string(),
            });
        }
        ledger.transfer(&self.asset, from, &self.account, amount)?;

        let borrowed = self
            .borrow_ratio
            .apply(amount)
            .ok_or(PositionError::Overflow)?;
        if borrowed > 0 {
            ledger.mint(&self.asset, &self.account, borrowed)?;
            self.debt = self.debt.checked_add(borrowed).ok_or(PositionError::Overflow)?;
        }
        Ok(())
    }

    fn withdraw(
        &mut self,
        ledger: &mut TokenLedger,
        to: &Address,
        fraction: Fraction,
        params: &Params,
    ) -> Result<u128, PositionError> {
        if self.reject_withdrawals {
            return Err(PositionError::Rejected {
                operation: "withdraw",
                reason: "withdrawals disabled".to_string(),
            });
        }
        let balance = ledger.balance_of(&self.asset, &self.account);
        let gross = fraction.of(balance).ok_or(PositionError::Overflow)?;
        let repay = fraction.of(self.debt).ok_or(PositionError::Overflow)?;

        let proceeds = gross.checked_sub(repay).ok_or(PositionError::Overflow)?;
        let lost = self
            .withdraw_slippage
            .apply(proceeds)
            .ok_or(PositionError::Overflow)?;
        let paid = proceeds.checked_sub(lost).ok_or(PositionError::Overflow)?;

        if let Some(minimum) = Self::min_output(params) {
            if paid < minimum {
                return Err(PositionError::SlippageExceeded {
                    received: paid,
                    minimum,
                });
            }
        }

        // Repaying debt burns the borrowed tokens.
        ledger.burn(&self.asset, &self.account, repay)?;
        self.debt -= repay;
        ledger.burn(&self.asset, &self.account, lost)?;
        ledger.transfer(&self.asset, &self.account, to, paid)?;
        Ok(paid)
    }

    fn harvest(
        &mut self,
        ledger: &mut TokenLedger,
        to: &Address,
        _params: &Params,
    ) -> Result<u128, PositionError> {
        let rewards = std::mem::take(&mut self.pending_rewards);
        ledger.mint(&self.asset, to, rewards)?;
        Ok(rewards)
    }

    fn clone_box(&self) -> Box<dyn Position> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
