//! Fee rates, fee claims and performance fees on harvested rewards.

use super::{Engine, VaultKind};
use crate::domain::{Bps, InvestableId, Params, VaultEvent};
use crate::error::VaultError;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FeeKind {
    Deposit,
    Withdrawal,
    Performance,
}

impl Engine {
    /// Pay the whole accumulated fee to the fee receiver; returns the amount paid.
    ///
    /// Accrued fees sit as idle deposit-asset tokens in the vault, so nothing is
    /// unwound and `params` is not forwarded anywhere. It is only logged, and the
    /// `FeeClaim` event carries just the amount.
    pub fn claim_fee(&mut self, id: &InvestableId, params: &Params) -> Result<u128, VaultError> {
        self.transact("claim_fee", |engine| {
            engine.with_vault(id, |engine, vault| {
                let amount = vault.fees.accumulated_fee;
                engine.state.ledger.transfer(
                    &vault.deposit_asset,
                    &vault.address(),
                    &vault.fees.fee_receiver,
                    amount,
                )?;
                vault.fees.claimed_fee = vault
                    .fees
                    .claimed_fee
                    .checked_add(amount)
                    .ok_or(VaultError::MathOverflow("claimed fee"))?;
                vault.fees.accumulated_fee = 0;
                engine.emit(id, VaultEvent::FeeClaim { amount });
                info!(
                    investable = %id,
                    receiver = %vault.fees.fee_receiver,
                    amount,
                    params = ?params,
                    "fee claimed"
                );
                Ok(amount)
            })
        })
    }

    pub fn set_deposit_fee(
        &mut self,
        id: &InvestableId,
        fee: Bps,
        params: &Params,
    ) -> Result<(), VaultError> {
        self.set_fee(id, FeeKind::Deposit, fee, params)
    }

    pub fn set_withdrawal_fee(
        &mut self,
        id: &InvestableId,
        fee: Bps,
        params: &Params,
    ) -> Result<(), VaultError> {
        self.set_fee(id, FeeKind::Withdrawal, fee, params)
    }

    pub fn set_performance_fee(
        &mut self,
        id: &InvestableId,
        fee: Bps,
        params: &Params,
    ) -> Result<(), VaultError> {
        self.set_fee(id, FeeKind::Performance, fee, params)
    }

    fn set_fee(
        &mut self,
        id: &InvestableId,
        kind: FeeKind,
        fee: Bps,
        params: &Params,
    ) -> Result<(), VaultError> {
        if !fee.is_valid_fee() {
            return Err(VaultError::InvalidFeeError { fee: fee.value() });
        }
        self.transact("set_fee", |engine| {
            engine.with_vault(id, |_, vault| {
                match kind {
                    FeeKind::Deposit => vault.fees.deposit_fee = fee,
                    FeeKind::Withdrawal => vault.fees.withdrawal_fee = fee,
                    FeeKind::Performance => vault.fees.performance_fee = fee,
                }
                Ok(())
            })?;
            let params = params.clone();
            let event = match kind {
                FeeKind::Deposit => VaultEvent::DepositFeeChange { fee, params },
                FeeKind::Withdrawal => VaultEvent::WithdrawalFeeChange { fee, params },
                FeeKind::Performance => VaultEvent::PerformanceFeeChange { fee, params },
            };
            engine.emit(id, event);
            info!(investable = %id, ?kind, %fee, "fee rate changed");
            Ok(())
        })
    }

    /// Realize the leaf position's rewards, keep the performance cut, and
    /// reinvest the rest. Returns the realized gain.
    pub fn harvest(&mut self, id: &InvestableId, params: &Params) -> Result<u128, VaultError> {
        self.transact("harvest", |engine| {
            engine.with_vault(id, |engine, vault| {
                if vault.paused {
                    return Err(VaultError::VaultPaused(id.clone()));
                }
                let vault_address = vault.address();
                let VaultKind::Leaf(position) = &mut vault.kind else {
                    return Err(VaultError::NotALeaf(id.clone()));
                };

                let gain = position.harvest(&mut engine.state.ledger, &vault_address, params)?;
                let fee = vault
                    .fees
                    .performance_fee
                    .apply(gain)
                    .ok_or(VaultError::MathOverflow("performance fee"))?;
                let reinvested = gain
                    .checked_sub(fee)
                    .ok_or(VaultError::MathOverflow("performance fee"))?;
                if reinvested > 0 {
                    position.deposit(
                        &mut engine.state.ledger,
                        &vault_address,
                        reinvested,
                        params,
                    )?;
                }
                vault.fees.accumulated_fee = vault
                    .fees
                    .accumulated_fee
                    .checked_add(fee)
                    .ok_or(VaultError::MathOverflow("accumulated fee"))?;

                engine.emit(
                    id,
                    VaultEvent::Harvest {
                        realized_gain: gain,
                        performance_fee: fee,
                    },
                );
                info!(investable = %id, gain, fee, reinvested, "harvest");
                Ok(gain)
            })
        })
    }
}
