//! Portfolio composition: target allocations, deposit routing and membership.
//!
//! Deposits are split by *target* allocation; withdrawals unwind every child
//! holding pro-rata, so they keep working while actual allocation has drifted.

use super::{Engine, Vault, VaultKind};
use crate::domain::{Address, Bps, InvestableDesc, InvestableId, Params, VaultEvent};
use crate::error::VaultError;
use tracing::{debug, info};

/// Reject an allocation table of the wrong length or one not summing to 100%.
pub(crate) fn validate_allocations(
    expected_len: usize,
    allocations: &[Bps],
) -> Result<(), VaultError> {
    if allocations.len() != expected_len {
        return Err(VaultError::RebalanceIncorrectAllocationsLength {
            expected: expected_len,
            actual: allocations.len(),
        });
    }
    if !Bps::sums_to_full(allocations) {
        return Err(VaultError::RebalancePercentageNot100 {
            sum: Bps::sum(allocations),
        });
    }
    Ok(())
}

/// Split `amount` by target allocation.
///
/// Floors each slice and hands the remainder to the first child with a non-zero
/// allocation, so the slices always sum to `amount`. No children, no slices.
pub fn deposit_slices(children: &[InvestableDesc], amount: u128) -> Option<Vec<u128>> {
    let mut slices = children
        .iter()
        .map(|child| child.allocation.apply(amount))
        .collect::<Option<Vec<u128>>>()?;
    let assigned: u128 = slices.iter().sum();
    if let Some(first) = children.iter().position(|c| !c.allocation.is_zero()) {
        slices[first] += amount - assigned;
    }
    Some(slices)
}

fn portfolio_children(vault: &mut Vault) -> Result<&mut Vec<InvestableDesc>, VaultError> {
    match &mut vault.kind {
        VaultKind::Portfolio(children) => Ok(children),
        VaultKind::Leaf(_) => Err(VaultError::NotAPortfolio(vault.id.clone())),
    }
}

fn check_params_length(params: &Params, child_count: usize) -> Result<(), VaultError> {
    match params {
        Params::PerChild(entries) if entries.len() != child_count => {
            Err(VaultError::IncorrectParamsLength {
                expected: child_count,
                actual: entries.len(),
            })
        }
        _ => Ok(()),
    }
}

impl Engine {
    /// Deposit `amount` held by `portfolio` into its children by target allocation.
    pub(crate) fn route_deposit(
        &mut self,
        portfolio: &Address,
        children: &[InvestableDesc],
        amount: u128,
        params: &Params,
    ) -> Result<(), VaultError> {
        let count = children.len();
        check_params_length(params, count)?;
        let slices =
            deposit_slices(children, amount).ok_or(VaultError::MathOverflow("deposit routing"))?;

        for (index, (child, slice)) in children.iter().zip(slices).enumerate() {
            if slice == 0 {
                continue;
            }
            let child_params = params.for_child(index, count).map_err(|actual| {
                VaultError::IncorrectParamsLength {
                    expected: count,
                    actual,
                }
            })?;
            debug!(child = %child.investable, slice, "routing deposit to child");
            self.deposit_into(&child.investable, portfolio, slice, portfolio, &child_params)?;
        }
        Ok(())
    }

    /// Replace the target allocation table. Moves no capital.
    pub fn set_target_investable_allocations(
        &mut self,
        id: &InvestableId,
        allocations: Vec<Bps>,
    ) -> Result<(), VaultError> {
        self.transact("set_target_investable_allocations", |engine| {
            engine.with_vault(id, |_, vault| {
                let children = portfolio_children(vault)?;
                validate_allocations(children.len(), &allocations)?;
                for (child, allocation) in children.iter_mut().zip(&allocations) {
                    child.allocation = *allocation;
                }
                Ok(())
            })?;
            info!(investable = %id, ?allocations, "target allocations set");
            engine.emit(id, VaultEvent::TargetInvestableAllocationsSet { allocations });
            Ok(())
        })
    }

    pub fn get_investables(&self, id: &InvestableId) -> Result<Vec<InvestableDesc>, VaultError> {
        self.vault(id)?
            .investables()
            .map(<[InvestableDesc]>::to_vec)
            .ok_or_else(|| VaultError::NotAPortfolio(id.clone()))
    }

    /// Append `child` to portfolio `id`; `allocations` covers the new, longer list.
    pub fn add_investable(
        &mut self,
        id: &InvestableId,
        child: &InvestableId,
        allocations: Vec<Bps>,
        params: &Params,
    ) -> Result<(), VaultError> {
        self.transact("add_investable", |engine| {
            engine.with_vault(id, |engine, vault| {
                engine.check_new_child(vault, child)?;
                let children = portfolio_children(vault)?;
                validate_allocations(children.len() + 1, &allocations)?;
                children.push(InvestableDesc::new(child.clone(), Bps::ZERO));
                for (desc, allocation) in children.iter_mut().zip(&allocations) {
                    desc.allocation = *allocation;
                }
                Ok(())
            })?;
            info!(investable = %id, child = %child, "investable added");
            engine.emit(
                id,
                VaultEvent::InvestableAdd {
                    investable: child.clone(),
                    allocations,
                    params: params.clone(),
                },
            );
            Ok(())
        })
    }

    /// Drop `child` from portfolio `id`. Its target must already be zero and the
    /// portfolio must no longer hold its shares.
    pub fn remove_investable(
        &mut self,
        id: &InvestableId,
        child: &InvestableId,
        allocations: Vec<Bps>,
        params: &Params,
    ) -> Result<(), VaultError> {
        self.transact("remove_investable", |engine| {
            engine.with_vault(id, |engine, vault| {
                let holder = vault.address();
                let children = portfolio_children(vault)?;
                let index = children
                    .iter()
                    .position(|c| &c.investable == child)
                    .ok_or_else(|| VaultError::InvestableNotYetAdded(child.clone()))?;
                if !children[index].allocation.is_zero() {
                    return Err(VaultError::InvestableHasNonZeroAllocation(child.clone()));
                }
                if engine.vault(child)?.shares.balance_of(&holder) > 0 {
                    return Err(VaultError::InvestableHasNonZeroBalance(child.clone()));
                }

                let remaining = children.len() - 1;
                if remaining > 0 || !allocations.is_empty() {
                    validate_allocations(remaining, &allocations)?;
                }
                children.remove(index);
                for (desc, allocation) in children.iter_mut().zip(&allocations) {
                    desc.allocation = *allocation;
                }
                Ok(())
            })?;
            info!(investable = %id, child = %child, "investable removed");
            engine.emit(
                id,
                VaultEvent::InvestableRemove {
                    investable: child.clone(),
                    allocations,
                    params: params.clone(),
                },
            );
            Ok(())
        })
    }

    /// Swap child `previous` for `replacement` in the same allocation slot,
    /// moving everything the portfolio held in `previous` over to `replacement`.
    pub fn change_investable(
        &mut self,
        id: &InvestableId,
        previous: &InvestableId,
        replacement: &InvestableId,
        params: &Params,
    ) -> Result<(), VaultError> {
        self.transact("change_investable", |engine| {
            engine.with_vault(id, |engine, vault| {
                let holder = vault.address();
                let index = portfolio_children(vault)?
                    .iter()
                    .position(|c| &c.investable == previous)
                    .ok_or_else(|| VaultError::InvestableNotYetAdded(previous.clone()))?;
                engine.check_new_child(vault, replacement)?;

                let held = engine.vault(previous)?.shares.balance_of(&holder);
                if held > 0 {
                    let moved = engine.withdraw_from(previous, &holder, held, &holder, params)?;
                    debug!(from = %previous, to = %replacement, moved, "migrating child capital");
                    if moved > 0 {
                        engine.deposit_into(replacement, &holder, moved, &holder, params)?;
                    }
                }

                portfolio_children(vault)?[index].investable = replacement.clone();
                Ok(())
            })?;
            info!(
                investable = %id,
                previous = %previous,
                replacement = %replacement,
                "investable changed"
            );
            engine.emit(
                id,
                VaultEvent::InvestableChange {
                    previous: previous.clone(),
                    investable: replacement.clone(),
                    params: params.clone(),
                },
            );
            Ok(())
        })
    }

    /// Checks shared by add and change: the candidate must exist, be new to the
    /// portfolio, take the same deposit asset and not contain the portfolio.
    fn check_new_child(&self, vault: &Vault, child: &InvestableId) -> Result<(), VaultError> {
        let children = vault
            .investables()
            .ok_or_else(|| VaultError::NotAPortfolio(vault.id.clone()))?;
        if self.subtree_contains(child, &vault.id)? {
            return Err(VaultError::CircularInvestable {
                portfolio: vault.id.clone(),
                child: child.clone(),
            });
        }
        if children.iter().any(|c| &c.investable == child) {
            return Err(VaultError::InvestableAlreadyAdded(child.clone()));
        }
        let candidate = self.vault(child)?;
        if candidate.deposit_asset != vault.deposit_asset {
            return Err(VaultError::DepositAssetMismatch {
                investable: child.clone(),
                expected: vault.deposit_asset.clone(),
                actual: candidate.deposit_asset.clone(),
            });
        }
        Ok(())
    }

    /// Whether `target` is `root` or sits anywhere below it.
    pub(super) fn subtree_contains(
        &self,
        root: &InvestableId,
        target: &InvestableId,
    ) -> Result<bool, VaultError> {
        if root == target {
            return Ok(true);
        }
        if let Some(children) = self.vault(root)?.investables() {
            for child in children {
                if self.subtree_contains(&child.investable, target)? {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }
}
