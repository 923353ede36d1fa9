//! Equity valuation of leaves and portfolios.

use super::{Engine, Vault, VaultKind, VaultSummary};
use crate::domain::{
    mul_div_floor, Address, AllocationView, AssetBalance, Bps, Estimate, InvestableId,
};
use crate::error::VaultError;
use tracing::warn;

impl Engine {
    /// Assets minus liabilities of `id`, in the valuation unit.
    ///
    /// With `revert_on_pause` a paused investable fails with `VaultPaused`.
    pub fn get_equity_valuation(
        &self,
        id: &InvestableId,
        use_high_estimate: bool,
        revert_on_pause: bool,
    ) -> Result<u128, VaultError> {
        let vault = self.vault(id)?;
        if revert_on_pause && vault.paused {
            return Err(VaultError::VaultPaused(id.clone()));
        }
        self.equity_of(vault, Estimate::from_high_flag(use_high_estimate))
    }

    /// Deposit-asset tokens held by the vault itself that are not owed as fees.
    pub(crate) fn idle_balance(&self, vault: &Vault) -> u128 {
        self.state
            .ledger
            .balance_of(&vault.deposit_asset, &vault.address())
            .saturating_sub(vault.fees.accumulated_fee)
    }

    pub(crate) fn equity_of(&self, vault: &Vault, estimate: Estimate) -> Result<u128, VaultError> {
        let idle = self.idle_balance(vault);
        let idle_value = self
            .oracle
            .valuate(&vault.deposit_asset, idle, estimate)?;

        let invested = match &vault.kind {
            VaultKind::Leaf(position) => {
                let ledger = &self.state.ledger;
                let assets = self.sum_valuations(&position.asset_balances(ledger), estimate)?;
                let liabilities =
                    self.sum_valuations(&position.liability_balances(ledger), estimate)?;
                if liabilities > assets {
                    warn!(
                        investable = %vault.id,
                        assets,
                        liabilities,
                        "position liabilities exceed assets"
                    );
                }
                assets.saturating_sub(liabilities)
            }
            VaultKind::Portfolio(children) => {
                let holder = vault.address();
                let mut total: u128 = 0;
                for child in children {
                    let value = self.holding_value(&child.investable, &holder, estimate)?;
                    total = total
                        .checked_add(value)
                        .ok_or(VaultError::MathOverflow("portfolio equity"))?;
                }
                total
            }
        };

        invested
            .checked_add(idle_value)
            .ok_or(VaultError::MathOverflow("equity"))
    }

    /// Value of `holder`'s shares in `id`: `equity * shares / supply`, floored.
    pub(crate) fn holding_value(
        &self,
        id: &InvestableId,
        holder: &Address,
        estimate: Estimate,
    ) -> Result<u128, VaultError> {
        let vault = self.vault(id)?;
        let shares = vault.shares.balance_of(holder);
        if shares == 0 {
            return Ok(0);
        }
        let equity = self.equity_of(vault, estimate)?;
        mul_div_floor(equity, shares, vault.shares.supply())
            .ok_or(VaultError::MathOverflow("holding value"))
    }

    fn sum_valuations(
        &self,
        balances: &[AssetBalance],
        estimate: Estimate,
    ) -> Result<u128, VaultError> {
        let mut total: u128 = 0;
        for balance in balances {
            let value = self
                .oracle
                .valuate(&balance.asset, balance.amount, estimate)?;
            total = total
                .checked_add(value)
                .ok_or(VaultError::MathOverflow("balance sheet"))?;
        }
        Ok(total)
    }

    /// Target vs. actual allocation of every child of a portfolio.
    pub fn get_investable_allocations(
        &self,
        id: &InvestableId,
        estimate: Estimate,
    ) -> Result<Vec<AllocationView>, VaultError> {
        let vault = self.vault(id)?;
        let children = vault
            .investables()
            .ok_or_else(|| VaultError::NotAPortfolio(id.clone()))?;
        let total = self.equity_of(vault, estimate)?;
        let holder = vault.address();

        children
            .iter()
            .map(|child| {
                let valuation = self.holding_value(&child.investable, &holder, estimate)?;
                let actual =
                    Bps::ratio(valuation, total).ok_or(VaultError::MathOverflow("allocation"))?;
                Ok(AllocationView {
                    investable: child.investable.clone(),
                    target: child.allocation,
                    valuation,
                    actual,
                })
            })
            .collect()
    }

    /// Largest gap between actual and target allocation across children, in bps.
    pub fn allocation_drift(&self, id: &InvestableId) -> Result<u32, VaultError> {
        let views = self.get_investable_allocations(id, self.policy.rebalance)?;
        Ok(views.iter().map(AllocationView::drift).max().unwrap_or(0))
    }

    /// Whether every child sits within `tolerance` of its target allocation.
    pub fn is_within_tolerance(
        &self,
        id: &InvestableId,
        tolerance: Bps,
    ) -> Result<bool, VaultError> {
        Ok(self.allocation_drift(id)? <= tolerance.value())
    }

    pub fn summary(&self, id: &InvestableId) -> Result<VaultSummary, VaultError> {
        let vault = self.vault(id)?;
        Ok(VaultSummary {
            investable: id.clone(),
            portfolio: vault.kind.is_portfolio(),
            share_supply: vault.shares.supply(),
            equity_low: self.equity_of(vault, Estimate::Low)?,
            equity_high: self.equity_of(vault, Estimate::High)?,
            accumulated_fee: vault.fees.accumulated_fee,
            claimed_fee: vault.fees.claimed_fee,
            paused: vault.paused,
        })
    }
}
