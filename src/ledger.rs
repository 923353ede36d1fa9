//! Token balances and per-vault share ledgers.

use crate::domain::{Address, AssetId};
use crate::error::VaultError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Balances of every fungible asset, keyed by holder.
///
/// This is the engine's stand-in for the token contracts the vaults talk to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenLedger {
    balances: BTreeMap<(AssetId, Address), u128>,
}

impl TokenLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance_of(&self, asset: &AssetId, holder: &Address) -> u128 {
        self.balances
            .get(&(asset.clone(), holder.clone()))
            .copied()
            .unwrap_or(0)
    }

    pub fn mint(&mut self, asset: &AssetId, to: &Address, amount: u128) -> Result<(), VaultError> {
        let balance = self.balance_of(asset, to);
        let updated = balance
            .checked_add(amount)
            .ok_or(VaultError::MathOverflow("token mint"))?;
        self.set(asset, to, updated);
        Ok(())
    }

    pub fn burn(
        &mut self,
        asset: &AssetId,
        from: &Address,
        amount: u128,
    ) -> Result<(), VaultError> {
        let balance = self.balance_of(asset, from);
        if balance < amount {
            return Err(VaultError::InsufficientBalance {
                holder: from.clone(),
                asset: asset.clone(),
                available: balance,
                requested: amount,
            });
        }
        self.set(asset, from, balance - amount);
        Ok(())
    }

    pub fn transfer(
        &mut self,
        asset: &AssetId,
        from: &Address,
        to: &Address,
        amount: u128,
    ) -> Result<(), VaultError> {
        if amount == 0 || from == to {
            return Ok(());
        }
        self.burn(asset, from, amount)?;
        self.mint(asset, to, amount)
    }

    fn set(&mut self, asset: &AssetId, holder: &Address, amount: u128) {
        let key = (asset.clone(), holder.clone());
        if amount == 0 {
            self.balances.remove(&key);
        } else {
            self.balances.insert(key, amount);
        }
    }
}

/// Share (investment token) balances of one vault.
///
/// `supply` always equals the sum of `balances`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareLedger {
    supply: u128,
    balances: BTreeMap<Address, u128>,
}

impl ShareLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a ledger from stored balances; supply is derived, never trusted.
    pub fn from_balances(balances: BTreeMap<Address, u128>) -> Result<Self, VaultError> {
        let mut supply: u128 = 0;
        for amount in balances.values() {
            supply = supply
                .checked_add(*amount)
                .ok_or(VaultError::MathOverflow("share supply"))?;
        }
        let balances = balances.into_iter().filter(|(_, v)| *v > 0).collect();
        Ok(Self { supply, balances })
    }

    pub fn supply(&self) -> u128 {
        self.supply
    }

    pub fn balance_of(&self, holder: &Address) -> u128 {
        self.balances.get(holder).copied().unwrap_or(0)
    }

    pub fn balances(&self) -> &BTreeMap<Address, u128> {
        &self.balances
    }

    pub fn mint(&mut self, to: &Address, shares: u128) -> Result<(), VaultError> {
        let supply = self
            .supply
            .checked_add(shares)
            .ok_or(VaultError::MathOverflow("share supply"))?;
        if shares == 0 {
            return Ok(());
        }
        let balance = self
            .balance_of(to)
            .checked_add(shares)
            .ok_or(VaultError::MathOverflow("share balance"))?;
        self.balances.insert(to.clone(), balance);
        self.supply = supply;
        Ok(())
    }

    pub fn burn(&mut self, from: &Address, shares: u128) -> Result<(), VaultError> {
        let available = self.balance_of(from);
        if available < shares {
            return Err(VaultError::InsufficientShares {
                holder: from.clone(),
                available,
                requested: shares,
            });
        }
        if available == shares {
            self.balances.remove(from);
        } else {
            self.balances.insert(from.clone(), available - shares);
        }
        self.supply -= shares;
        Ok(())
    }

    /// Whether the cached supply matches the per-holder balances.
    pub fn is_consistent(&self) -> bool {
        self.balances
            .values()
            .try_fold(0u128, |acc, v| acc.checked_add(*v))
            == Some(self.supply)
    }
}
