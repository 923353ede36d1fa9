//! Deposit and withdraw: share issuance, redemption, and limit checks.
//!
//! Share price is never stored. Each deposit re-reads equity and supply, mints
//! `net_value * supply / equity` shares (floored), and each withdrawal unwinds
//! exactly `shares / supply` of every holding.

use super::{Engine, Vault, VaultKind};
use crate::domain::{mul_div_floor, params_at, Address, InvestableId, Params, VaultEvent};
use crate::error::VaultError;
use crate::position::Fraction;
use serde::Serialize;
use tracing::{debug, info};

/// Result of pricing a deposit against the current equity snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DepositQuote {
    pub amount: u128,
    pub fee: u128,
    pub net_principal: u128,
    /// `net_principal` in the valuation unit.
    pub net_value: u128,
    pub equity_before: u128,
    pub supply_before: u128,
    pub shares: u128,
}

impl Engine {
    /// Deposit `amount` of the deposit asset from `caller`, minting shares to `receiver`.
    pub fn deposit(
        &mut self,
        id: &InvestableId,
        caller: &Address,
        amount: u128,
        receiver: &Address,
        params: &Params,
    ) -> Result<u128, VaultError> {
        self.transact("deposit", |engine| {
            engine.deposit_into(id, caller, amount, receiver, params)
        })
    }

    /// Burn `share_amount` of `caller`'s shares and pay the net proceeds to `receiver`.
    pub fn withdraw(
        &mut self,
        id: &InvestableId,
        caller: &Address,
        share_amount: u128,
        receiver: &Address,
        params: &Params,
    ) -> Result<u128, VaultError> {
        self.transact("withdraw", |engine| {
            engine.withdraw_from(id, caller, share_amount, receiver, params)
        })
    }

    /// Shares a deposit of `amount` would mint right now, with limits checked for `receiver`.
    pub fn preview_deposit(
        &self,
        id: &InvestableId,
        amount: u128,
        receiver: &Address,
    ) -> Result<DepositQuote, VaultError> {
        let vault = self.vault(id)?;
        self.quote_deposit(vault, amount, receiver)
    }

    /// Value `share_amount` shares currently represent, net of the withdrawal fee.
    pub fn preview_withdraw(
        &self,
        id: &InvestableId,
        share_amount: u128,
    ) -> Result<u128, VaultError> {
        let vault = self.vault(id)?;
        let supply = vault.shares.supply();
        if share_amount == 0 {
            return Err(VaultError::ZeroAmountWithdrawn);
        }
        if share_amount > supply {
            return Err(VaultError::InsufficientShares {
                holder: vault.address(),
                available: supply,
                requested: share_amount,
            });
        }
        let equity = self.equity_of(vault, self.policy.share_price)?;
        let gross = mul_div_floor(share_amount, equity, supply)
            .ok_or(VaultError::MathOverflow("withdraw preview"))?;
        let fee = vault
            .fees
            .withdrawal_fee
            .apply(gross)
            .ok_or(VaultError::MathOverflow("withdrawal fee"))?;
        gross
            .checked_sub(fee)
            .ok_or(VaultError::MathOverflow("withdrawal fee"))
    }

    pub(crate) fn deposit_into(
        &mut self,
        id: &InvestableId,
        caller: &Address,
        amount: u128,
        receiver: &Address,
        params: &Params,
    ) -> Result<u128, VaultError> {
        self.with_vault(id, |engine, vault| {
            engine.deposit_with(vault, caller, amount, receiver, params)
        })
    }

    pub(crate) fn withdraw_from(
        &mut self,
        id: &InvestableId,
        caller: &Address,
        share_amount: u128,
        receiver: &Address,
        params: &Params,
    ) -> Result<u128, VaultError> {
        self.with_vault(id, |engine, vault| {
            engine.withdraw_with(vault, caller, share_amount, receiver, params)
        })
    }

    pub(crate) fn quote_deposit(
        &self,
        vault: &Vault,
        amount: u128,
        receiver: &Address,
    ) -> Result<DepositQuote, VaultError> {
        if amount == 0 {
            return Err(VaultError::ZeroAmountDeposited);
        }
        if vault.paused {
            return Err(VaultError::VaultPaused(vault.id.clone()));
        }

        let fee = vault
            .fees
            .deposit_fee
            .apply(amount)
            .ok_or(VaultError::MathOverflow("deposit fee"))?;
        let net_principal = amount
            .checked_sub(fee)
            .ok_or(VaultError::MathOverflow("deposit fee"))?;

        let equity_before = self.equity_of(vault, self.policy.share_price)?;
        let supply_before = vault.shares.supply();
        let net_value = self.oracle.valuate(
            &vault.deposit_asset,
            net_principal,
            self.policy.principal,
        )?;

        let shares = if supply_before == 0 {
            net_value
        } else {
            if equity_before == 0 {
                return Err(VaultError::InsolventVault(vault.id.clone()));
            }
            mul_div_floor(net_value, supply_before, equity_before)
                .ok_or(VaultError::MathOverflow("shares minted"))?
        };
        if shares == 0 {
            return Err(VaultError::ZeroSharesMinted { amount });
        }

        let quote = DepositQuote {
            amount,
            fee,
            net_principal,
            net_value,
            equity_before,
            supply_before,
            shares,
        };
        self.check_limits(vault, &quote, receiver)?;
        Ok(quote)
    }

    /// Reject a deposit that would push total or per-address value over its cap.
    fn check_limits(
        &self,
        vault: &Vault,
        quote: &DepositQuote,
        receiver: &Address,
    ) -> Result<(), VaultError> {
        if vault.limits.total.is_none() && vault.limits.per_address.is_none() {
            return Ok(());
        }
        let equity = if self.policy.limits == self.policy.share_price {
            quote.equity_before
        } else {
            self.equity_of(vault, self.policy.limits)?
        };

        let total_after = equity
            .checked_add(quote.net_value)
            .ok_or(VaultError::MathOverflow("limit check"))?;
        if let Some(limit) = vault.limits.total {
            if total_after > limit {
                return Err(VaultError::TotalInvestmentLimitExceeded {
                    valuation: total_after,
                    limit,
                });
            }
        }

        if let Some(limit) = vault.limits.per_address {
            let shares_after = vault
                .shares
                .balance_of(receiver)
                .checked_add(quote.shares)
                .ok_or(VaultError::MathOverflow("limit check"))?;
            let supply_after = quote
                .supply_before
                .checked_add(quote.shares)
                .ok_or(VaultError::MathOverflow("limit check"))?;
            let valuation = mul_div_floor(shares_after, total_after, supply_after)
                .ok_or(VaultError::MathOverflow("limit check"))?;
            if !vault.limits.per_address_allows(valuation) {
                return Err(VaultError::InvestmentLimitPerAddressExceeded {
                    address: receiver.clone(),
                    valuation,
                    limit,
                });
            }
        }
        Ok(())
    }

    fn deposit_with(
        &mut self,
        vault: &mut Vault,
        caller: &Address,
        amount: u128,
        receiver: &Address,
        params: &Params,
    ) -> Result<u128, VaultError> {
        let quote = self.quote_deposit(vault, amount, receiver)?;
        let vault_address = vault.address();

        self.state
            .ledger
            .transfer(&vault.deposit_asset, caller, &vault_address, amount)?;
        self.invest(vault, quote.net_principal, params)?;

        vault.fees.accumulated_fee = vault
            .fees
            .accumulated_fee
            .checked_add(quote.fee)
            .ok_or(VaultError::MathOverflow("accumulated fee"))?;
        vault.shares.mint(receiver, quote.shares)?;

        self.emit(
            &vault.id,
            VaultEvent::Deposit {
                depositor: caller.clone(),
                receiver: receiver.clone(),
                amount,
                shares_minted: quote.shares,
            },
        );
        info!(
            investable = %vault.id,
            depositor = %caller,
            receiver = %receiver,
            amount,
            fee = quote.fee,
            shares = quote.shares,
            "deposit"
        );
        Ok(quote.shares)
    }

    fn withdraw_with(
        &mut self,
        vault: &mut Vault,
        caller: &Address,
        share_amount: u128,
        receiver: &Address,
        params: &Params,
    ) -> Result<u128, VaultError> {
        if share_amount == 0 {
            return Err(VaultError::ZeroAmountWithdrawn);
        }
        if vault.paused {
            return Err(VaultError::VaultPaused(vault.id.clone()));
        }
        let held = vault.shares.balance_of(caller);
        if held < share_amount {
            return Err(VaultError::InsufficientShares {
                holder: caller.clone(),
                available: held,
                requested: share_amount,
            });
        }

        let fraction = Fraction::new(share_amount, vault.shares.supply());
        let idle_share = fraction
            .of(self.idle_balance(vault))
            .ok_or(VaultError::MathOverflow("idle share"))?;
        let divested = self.divest(vault, fraction, params)?;
        let gross = divested
            .checked_add(idle_share)
            .ok_or(VaultError::MathOverflow("withdrawal"))?;

        let fee = vault
            .fees
            .withdrawal_fee
            .apply(gross)
            .ok_or(VaultError::MathOverflow("withdrawal fee"))?;
        let net = gross
            .checked_sub(fee)
            .ok_or(VaultError::MathOverflow("withdrawal fee"))?;

        vault.shares.burn(caller, share_amount)?;
        vault.fees.accumulated_fee = vault
            .fees
            .accumulated_fee
            .checked_add(fee)
            .ok_or(VaultError::MathOverflow("accumulated fee"))?;
        self.state
            .ledger
            .transfer(&vault.deposit_asset, &vault.address(), receiver, net)?;

        self.emit(
            &vault.id,
            VaultEvent::Withdrawal {
                withdrawer: caller.clone(),
                receiver: receiver.clone(),
                share_amount,
                amount_returned: net,
            },
        );
        info!(
            investable = %vault.id,
            withdrawer = %caller,
            receiver = %receiver,
            share_amount,
            fee,
            returned = net,
            "withdrawal"
        );
        Ok(net)
    }

    /// Deploy `amount` of idle deposit asset into the position or the children.
    fn invest(
        &mut self,
        vault: &mut Vault,
        amount: u128,
        params: &Params,
    ) -> Result<(), VaultError> {
        let vault_address = vault.address();
        match &mut vault.kind {
            VaultKind::Leaf(position) => {
                position.deposit(&mut self.state.ledger, &vault_address, amount, params)?;
                Ok(())
            }
            VaultKind::Portfolio(children) => {
                let children = children.clone();
                self.route_deposit(&vault_address, &children, amount, params)
            }
        }
    }

    /// Pull `fraction` of the position or of every child holding back to the vault.
    fn divest(
        &mut self,
        vault: &mut Vault,
        fraction: Fraction,
        params: &Params,
    ) -> Result<u128, VaultError> {
        let vault_address = vault.address();
        match &mut vault.kind {
            VaultKind::Leaf(position) => Ok(position.withdraw(
                &mut self.state.ledger,
                &vault_address,
                fraction,
                params,
            )?),
            VaultKind::Portfolio(children) => {
                let children = children.clone();
                let count = children.len();
                let mut received: u128 = 0;
                for (index, child) in children.iter().enumerate() {
                    let held = self
                        .vault(&child.investable)?
                        .shares
                        .balance_of(&vault_address);
                    let shares = fraction
                        .of(held)
                        .ok_or(VaultError::MathOverflow("child shares"))?;
                    if shares == 0 {
                        continue;
                    }
                    let child_params = params.for_child(index, count).map_err(|actual| {
                        VaultError::IncorrectParamsLength {
                            expected: count,
                            actual,
                        }
                    })?;
                    debug!(child = %child.investable, shares, "withdrawing from child");
                    let amount = self.withdraw_from(
                        &child.investable,
                        &vault_address,
                        shares,
                        &vault_address,
                        &child_params,
                    )?;
                    received = received
                        .checked_add(amount)
                        .ok_or(VaultError::MathOverflow("child proceeds"))?;
                }
                Ok(received)
            }
        }
    }

    /// Resolve entry `index` of a caller-supplied per-child params slice.
    pub(crate) fn child_params(
        params: &[Params],
        index: usize,
        count: usize,
    ) -> Result<Params, VaultError> {
        params_at(params, index, count).map_err(|actual| VaultError::IncorrectParamsLength {
            expected: count,
            actual,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::{Address, AssetId, Bps, Decimal, InvestableId, InvestmentLimits, Params};
    use crate::engine::{Engine, VaultSpec};
    use crate::error::VaultError;
    use crate::oracle::PriceOracle;
    use crate::position::MockPosition;

    fn usdc() -> AssetId {
        AssetId::new("USDC")
    }

    fn setup(spec: VaultSpec) -> (Engine, InvestableId, Address) {
        let mut engine = Engine::new(PriceOracle::new().with_price(usdc(), Decimal::one()));
        let id = engine
            .create_leaf(spec, MockPosition::new("leaf", usdc()))
            .unwrap();
        let alice = Address::new("alice");
        engine.ledger_mut().mint(&usdc(), &alice, 100_000).unwrap();
        (engine, id, alice)
    }

    fn plain() -> VaultSpec {
        VaultSpec::new(InvestableId::new("leaf"), usdc())
    }

    #[test]
    fn test_first_deposit_mints_at_par() {
        let (mut engine, id, alice) = setup(plain());
        let shares = engine.deposit(&id, &alice, 3000, &alice, &Params::None).unwrap();
        assert_eq!(shares, 3000);
        assert_eq!(engine.get_investment_token_supply(&id), Ok(3000));
        assert_eq!(engine.get_equity_valuation(&id, true, false), Ok(3000));
        assert_eq!(engine.ledger().balance_of(&usdc(), &alice), 97_000);
    }

    #[test]
    fn test_deposit_after_yield_mints_fewer_shares() {
        let (mut engine, id, alice) = setup(plain());
        engine.deposit(&id, &alice, 1000, &alice, &Params::None).unwrap();
        let account = engine.position::<MockPosition>(&id).unwrap().account().clone();
        engine.ledger_mut().mint(&usdc(), &account, 1000).unwrap();

        let bob = Address::new("bob");
        let shares = engine.deposit(&id, &alice, 1000, &bob, &Params::None).unwrap();
        assert_eq!(shares, 500);
        assert_eq!(engine.get_investment_token_balance_of(&id, &bob), Ok(500));
    }

    #[test]
    fn test_zero_amounts_rejected() {
        let (mut engine, id, alice) = setup(plain());
        assert_eq!(
            engine.deposit(&id, &alice, 0, &alice, &Params::None),
            Err(VaultError::ZeroAmountDeposited)
        );
        assert_eq!(
            engine.withdraw(&id, &alice, 0, &alice, &Params::None),
            Err(VaultError::ZeroAmountWithdrawn)
        );
    }

    #[test]
    fn test_deposit_fee_accrues_and_reduces_shares() {
        let spec = plain().with_fees(Bps(1_000), Bps::ZERO, Bps::ZERO);
        let (mut engine, id, alice) = setup(spec);
        let shares = engine.deposit(&id, &alice, 3000, &alice, &Params::None).unwrap();
        assert_eq!(shares, 2970);
        let vault = engine.vault(&id).unwrap();
        assert_eq!(vault.fees().accumulated_fee, 30);
        // Fee tokens sit in the vault but are not equity.
        assert_eq!(engine.ledger().balance_of(&usdc(), &id.address()), 30);
        assert_eq!(engine.get_equity_valuation(&id, true, false), Ok(2970));
    }

    #[test]
    fn test_full_withdrawal_drives_equity_to_zero() {
        let spec = plain().with_fees(Bps::ZERO, Bps(500), Bps::ZERO);
        let (mut engine, id, alice) = setup(spec);
        engine.deposit(&id, &alice, 3000, &alice, &Params::None).unwrap();
        let returned = engine.withdraw(&id, &alice, 3000, &alice, &Params::None).unwrap();
        assert_eq!(returned, 2985);
        assert_eq!(engine.get_investment_token_supply(&id), Ok(0));
        assert_eq!(engine.get_equity_valuation(&id, true, false), Ok(0));
        assert_eq!(engine.vault(&id).unwrap().fees().accumulated_fee, 15);
    }

    #[test]
    fn test_withdraw_more_than_held() {
        let (mut engine, id, alice) = setup(plain());
        engine.deposit(&id, &alice, 100, &alice, &Params::None).unwrap();
        let err = engine
            .withdraw(&id, &alice, 101, &alice, &Params::None)
            .unwrap_err();
        assert!(matches!(err, VaultError::InsufficientShares { .. }));
        assert_eq!(engine.get_investment_token_supply(&id), Ok(100));
    }

    #[test]
    fn test_total_limit_enforced() {
        let spec = plain().with_limits(InvestmentLimits::unlimited().with_total(5_000));
        let (mut engine, id, alice) = setup(spec);
        engine.deposit(&id, &alice, 4_000, &alice, &Params::None).unwrap();
        let err = engine
            .deposit(&id, &alice, 1_001, &alice, &Params::None)
            .unwrap_err();
        assert_eq!(
            err,
            VaultError::TotalInvestmentLimitExceeded {
                valuation: 5_001,
                limit: 5_000
            }
        );
        assert_eq!(engine.ledger().balance_of(&usdc(), &alice), 96_000);
        engine.deposit(&id, &alice, 1_000, &alice, &Params::None).unwrap();
    }

    #[test]
    fn test_per_address_limit_enforced() {
        let spec = plain().with_limits(InvestmentLimits::unlimited().with_per_address(2_000));
        let (mut engine, id, alice) = setup(spec);
        let bob = Address::new("bob");
        engine.deposit(&id, &alice, 2_000, &alice, &Params::None).unwrap();
        engine.deposit(&id, &alice, 2_000, &bob, &Params::None).unwrap();
        let err = engine
            .deposit(&id, &alice, 1, &alice, &Params::None)
            .unwrap_err();
        assert!(matches!(
            err,
            VaultError::InvestmentLimitPerAddressExceeded { valuation: 2_001, .. }
        ));
    }

    #[test]
    fn test_deposit_without_funds_changes_nothing() {
        let (mut engine, id, _alice) = setup(plain());
        let carol = Address::new("carol");
        let err = engine
            .deposit(&id, &carol, 10, &carol, &Params::None)
            .unwrap_err();
        assert!(matches!(err, VaultError::InsufficientBalance { .. }));
        assert_eq!(engine.get_investment_token_supply(&id), Ok(0));
        assert!(engine.events().is_empty());
    }

    #[test]
    fn test_preview_matches_execution() {
        let (mut engine, id, alice) = setup(plain().with_fees(Bps(300), Bps(700), Bps::ZERO));
        engine.deposit(&id, &alice, 5_000, &alice, &Params::None).unwrap();
        let quote = engine.preview_deposit(&id, 1_234, &alice).unwrap();
        let minted = engine.deposit(&id, &alice, 1_234, &alice, &Params::None).unwrap();
        assert_eq!(quote.shares, minted);

        let preview = engine.preview_withdraw(&id, 1_000).unwrap();
        let returned = engine.withdraw(&id, &alice, 1_000, &alice, &Params::None).unwrap();
        assert_eq!(preview, returned);
    }

    #[test]
    fn test_insolvent_vault_rejects_deposits() {
        let (mut engine, id, alice) = setup(plain());
        engine.deposit(&id, &alice, 100, &alice, &Params::None).unwrap();
        let account = engine.position::<MockPosition>(&id).unwrap().account().clone();
        engine.ledger_mut().burn(&usdc(), &account, 100).unwrap();
        assert_eq!(
            engine.deposit(&id, &alice, 100, &alice, &Params::None),
            Err(VaultError::InsolventVault(id.clone()))
        );
    }
}
