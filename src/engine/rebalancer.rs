//! Portfolio rebalancing: move capital between children toward target allocation.
//!
//! Planning is pure arithmetic over a valuation snapshot. Execution withdraws from
//! every over-allocated child before depositing anywhere, and the deposit phase
//! only spends what actually arrived, so withdrawal slippage shrinks deposits
//! instead of overdrawing the portfolio.

use super::Engine;
use crate::domain::{mul_div_floor, Bps, InvestableId, Params, VaultEvent};
use crate::error::VaultError;
use serde::Serialize;
use tracing::{debug, info};

/// Target and delta per child for one valuation snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RebalancePlan {
    /// Child holdings plus idle balance, in the valuation unit.
    pub total: u128,
    pub current: Vec<u128>,
    pub targets: Vec<u128>,
    /// `target - current`; negative means over-allocated.
    pub deltas: Vec<i128>,
}

impl RebalancePlan {
    /// `None` on arithmetic overflow.
    pub fn new(current: Vec<u128>, idle_value: u128, allocations: &[Bps]) -> Option<Self> {
        let total = current
            .iter()
            .try_fold(idle_value, |acc, value| acc.checked_add(*value))?;
        let targets = allocations
            .iter()
            .map(|allocation| allocation.apply(total))
            .collect::<Option<Vec<u128>>>()?;
        let deltas = targets
            .iter()
            .zip(&current)
            .map(|(target, current)| {
                let target = i128::try_from(*target).ok()?;
                let current = i128::try_from(*current).ok()?;
                target.checked_sub(current)
            })
            .collect::<Option<Vec<i128>>>()?;
        Some(Self {
            total,
            current,
            targets,
            deltas,
        })
    }

    /// Over-allocated children and the value to pull from each.
    pub fn withdrawals(&self) -> Vec<(usize, u128)> {
        self.deltas
            .iter()
            .enumerate()
            .filter(|(_, delta)| **delta < 0)
            .map(|(index, delta)| (index, delta.unsigned_abs()))
            .collect()
    }

    /// Positive deltas, zero for every other child.
    pub fn deficits(&self) -> Vec<u128> {
        self.deltas
            .iter()
            .map(|delta| if *delta > 0 { delta.unsigned_abs() } else { 0 })
            .collect()
    }

    pub fn is_balanced(&self) -> bool {
        self.deltas.iter().all(|delta| *delta == 0)
    }
}

/// Split `available` proportionally to `deficits`.
///
/// The floored remainder goes to the first child with a deficit, so the whole
/// amount is spent whenever any deficit exists.
pub fn deposit_split(available: u128, deficits: &[u128]) -> Option<Vec<u128>> {
    let total = deficits
        .iter()
        .try_fold(0u128, |acc, deficit| acc.checked_add(*deficit))?;
    if total == 0 {
        return Some(vec![0; deficits.len()]);
    }
    let mut split = deficits
        .iter()
        .map(|deficit| mul_div_floor(available, *deficit, total))
        .collect::<Option<Vec<u128>>>()?;
    let assigned: u128 = split.iter().sum();
    if let Some(first) = deficits.iter().position(|deficit| *deficit > 0) {
        split[first] += available - assigned;
    }
    Some(split)
}

impl Engine {
    /// Converge portfolio `id` on its target allocation.
    ///
    /// `deposit_params` and `withdraw_params` are either empty or hold one entry
    /// per child. Returns the realized change in each child's valuation.
    pub fn rebalance(
        &mut self,
        id: &InvestableId,
        deposit_params: &[Params],
        withdraw_params: &[Params],
    ) -> Result<Vec<i128>, VaultError> {
        self.transact("rebalance", |engine| {
            engine.with_vault(id, |engine, vault| {
                if vault.paused {
                    return Err(VaultError::VaultPaused(id.clone()));
                }
                let children = vault
                    .investables()
                    .ok_or_else(|| VaultError::NotAPortfolio(id.clone()))?
                    .to_vec();
                let count = children.len();
                for params in [deposit_params, withdraw_params] {
                    if !params.is_empty() && params.len() != count {
                        return Err(VaultError::IncorrectParamsLength {
                            expected: count,
                            actual: params.len(),
                        });
                    }
                }

                let holder = vault.address();
                let estimate = engine.policy.rebalance;
                let current = children
                    .iter()
                    .map(|child| engine.holding_value(&child.investable, &holder, estimate))
                    .collect::<Result<Vec<u128>, VaultError>>()?;
                let idle_value = engine.oracle.valuate(
                    &vault.deposit_asset,
                    engine.idle_balance(vault),
                    estimate,
                )?;
                let allocations: Vec<Bps> = children.iter().map(|c| c.allocation).collect();
                let plan = RebalancePlan::new(current, idle_value, &allocations)
                    .ok_or(VaultError::MathOverflow("rebalance plan"))?;
                debug!(investable = %id, ?plan, "rebalance planned");

                for (index, excess) in plan.withdrawals() {
                    let child = &children[index];
                    let child_vault = engine.vault(&child.investable)?;
                    let held = child_vault.shares.balance_of(&holder);
                    let equity = engine.equity_of(child_vault, estimate)?;
                    let shares = if child.allocation.is_zero() || equity == 0 {
                        held
                    } else {
                        mul_div_floor(excess, child_vault.shares.supply(), equity)
                            .ok_or(VaultError::MathOverflow("rebalance withdraw"))?
                            .min(held)
                    };
                    if shares == 0 {
                        continue;
                    }
                    let params = Engine::child_params(withdraw_params, index, count)?;
                    debug!(child = %child.investable, shares, "rebalance withdraw");
                    engine.withdraw_from(&child.investable, &holder, shares, &holder, &params)?;
                }

                let available = engine.idle_balance(vault);
                let amounts = deposit_split(available, &plan.deficits())
                    .ok_or(VaultError::MathOverflow("rebalance split"))?;
                for (index, amount) in amounts.into_iter().enumerate() {
                    if amount == 0 {
                        continue;
                    }
                    let child = &children[index].investable;
                    // Dust too small to buy a child share stays idle. Only the
                    // child's own quote is checked; a failure further down the
                    // tree aborts the whole rebalance.
                    match engine.quote_deposit(engine.vault(child)?, amount, &holder) {
                        Ok(_) => {}
                        Err(VaultError::ZeroSharesMinted { .. }) => {
                            debug!(child = %child, amount, "rebalance deposit skipped");
                            continue;
                        }
                        Err(err) => return Err(err),
                    }
                    let params = Engine::child_params(deposit_params, index, count)?;
                    debug!(child = %child, amount, "rebalance deposit");
                    engine.deposit_into(child, &holder, amount, &holder, &params)?;
                }

                let mut realized = Vec::with_capacity(count);
                for (child, before) in children.iter().zip(&plan.current) {
                    let after = engine.holding_value(&child.investable, &holder, estimate)?;
                    let delta = i128::try_from(after)
                        .ok()
                        .zip(i128::try_from(*before).ok())
                        .and_then(|(after, before)| after.checked_sub(before))
                        .ok_or(VaultError::MathOverflow("rebalance delta"))?;
                    realized.push(delta);
                }

                engine.emit(
                    id,
                    VaultEvent::Rebalance {
                        deltas: realized.clone(),
                    },
                );
                info!(investable = %id, total = plan.total, deltas = ?realized, "rebalanced");
                Ok(realized)
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Address, AssetId, Decimal, Estimate, InvestableDesc};
    use crate::engine::VaultSpec;
    use crate::oracle::PriceOracle;
    use crate::position::MockPosition;

    #[test]
    fn test_plan_from_single_child_to_thirds() {
        let plan = RebalancePlan::new(
            vec![10_000, 0, 0],
            0,
            &[Bps(33_000), Bps(33_000), Bps(34_000)],
        )
        .unwrap();
        assert_eq!(plan.total, 10_000);
        assert_eq!(plan.targets, vec![3_300, 3_300, 3_400]);
        assert_eq!(plan.deltas, vec![-6_700, 3_300, 3_400]);
        assert_eq!(plan.withdrawals(), vec![(0, 6_700)]);
        assert_eq!(plan.deficits(), vec![0, 3_300, 3_400]);
        assert!(!plan.is_balanced());
    }

    #[test]
    fn test_plan_counts_idle_balance() {
        let plan =
            RebalancePlan::new(vec![500, 500], 1_000, &[Bps(50_000), Bps(50_000)]).unwrap();
        assert_eq!(plan.deltas, vec![500, 500]);
        assert!(plan.withdrawals().is_empty());
    }

    #[test]
    fn test_deposit_split_spends_everything_available() {
        assert_eq!(deposit_split(100, &[0, 1, 2]), Some(vec![0, 34, 66]));
        assert_eq!(deposit_split(90, &[0, 50, 50]), Some(vec![0, 45, 45]));
        assert_eq!(deposit_split(100, &[0, 0]), Some(vec![0, 0]));
        assert_eq!(deposit_split(0, &[5, 5]), Some(vec![0, 0]));
    }

    fn usdc() -> AssetId {
        AssetId::new("USDC")
    }

    fn setup(
        positions: Vec<MockPosition>,
        allocations: &[u32],
    ) -> (Engine, InvestableId, Vec<InvestableId>, Address) {
        let mut engine = Engine::new(PriceOracle::new().with_price(usdc(), Decimal::one()));
        let mut children = Vec::new();
        for position in positions {
            let name = position
                .account()
                .as_str()
                .trim_start_matches("position:")
                .to_string();
            let id = engine
                .create_leaf(VaultSpec::new(InvestableId::new(name), usdc()), position)
                .unwrap();
            children.push(id);
        }
        let p = engine
            .create_portfolio(
                VaultSpec::new(InvestableId::new("p"), usdc()),
                children
                    .iter()
                    .zip(allocations)
                    .map(|(id, bps)| InvestableDesc::new(id.clone(), Bps(*bps)))
                    .collect(),
            )
            .unwrap();
        let alice = Address::new("alice");
        engine.ledger_mut().mint(&usdc(), &alice, 1_000_000).unwrap();
        (engine, p, children, alice)
    }

    #[test]
    fn test_rebalance_moves_capital_to_new_targets() {
        let (mut engine, p, children, alice) = setup(
            vec![
                MockPosition::new("a", usdc()),
                MockPosition::new("b", usdc()),
                MockPosition::new("c", usdc()),
            ],
            &[100_000, 0, 0],
        );
        engine.deposit(&p, &alice, 10_000, &alice, &Params::None).unwrap();
        engine
            .set_target_investable_allocations(&p, vec![Bps(33_000), Bps(33_000), Bps(34_000)])
            .unwrap();

        let deltas = engine.rebalance(&p, &[], &[]).unwrap();
        assert_eq!(deltas, vec![-6_700, 3_300, 3_400]);
        let holder = p.address();
        let values: Vec<u128> = children
            .iter()
            .map(|c| engine.holding_value(c, &holder, Estimate::Low).unwrap())
            .collect();
        assert_eq!(values, vec![3_300, 3_300, 3_400]);
        assert_eq!(engine.get_equity_valuation(&p, false, false), Ok(10_000));
        assert_eq!(
            engine.events().last().map(|e| e.event.clone()),
            Some(VaultEvent::Rebalance {
                deltas: vec![-6_700, 3_300, 3_400]
            })
        );
    }

    #[test]
    fn test_rebalance_with_slippage_never_overdraws() {
        let (mut engine, p, _children, alice) = setup(
            vec![
                MockPosition::new("a", usdc()).with_withdraw_slippage(Bps(10_000)),
                MockPosition::new("b", usdc()),
            ],
            &[100_000, 0],
        );
        engine.deposit(&p, &alice, 10_000, &alice, &Params::None).unwrap();
        engine
            .set_target_investable_allocations(&p, vec![Bps(50_000), Bps(50_000)])
            .unwrap();

        let deltas = engine.rebalance(&p, &[], &[]).unwrap();
        // 5000 pulled from a, 10% lost on the way out.
        assert_eq!(deltas, vec![-5_000, 4_500]);
        assert_eq!(engine.ledger().balance_of(&usdc(), &p.address()), 0);
        assert_eq!(engine.get_equity_valuation(&p, false, false), Ok(9_500));
    }

    #[test]
    fn test_rebalance_drains_zero_target_child() {
        let (mut engine, p, children, alice) = setup(
            vec![MockPosition::new("a", usdc()), MockPosition::new("b", usdc())],
            &[50_000, 50_000],
        );
        engine.deposit(&p, &alice, 999, &alice, &Params::None).unwrap();
        engine
            .set_target_investable_allocations(&p, vec![Bps::ZERO, Bps::FULL])
            .unwrap();
        engine.rebalance(&p, &[], &[]).unwrap();
        assert_eq!(
            engine.get_investment_token_balance_of(&children[0], &p.address()),
            Ok(0)
        );
        assert_eq!(engine.get_equity_valuation(&p, false, false), Ok(999));
    }

    #[test]
    fn test_failed_child_reverts_whole_rebalance() {
        let (mut engine, p, children, alice) = setup(
            vec![MockPosition::new("a", usdc()), MockPosition::new("b", usdc())],
            &[100_000, 0],
        );
        engine.deposit(&p, &alice, 1_000, &alice, &Params::None).unwrap();
        engine
            .set_target_investable_allocations(&p, vec![Bps(50_000), Bps(50_000)])
            .unwrap();
        engine
            .position_mut::<MockPosition>(&children[1])
            .unwrap()
            .set_reject_deposits(true);
        let ledger_before = engine.ledger().clone();
        let events_before = engine.events().len();

        assert!(matches!(
            engine.rebalance(&p, &[], &[]),
            Err(VaultError::Position(_))
        ));
        assert_eq!(engine.ledger(), &ledger_before);
        assert_eq!(engine.events().len(), events_before);
        assert_eq!(
            engine.get_investment_token_balance_of(&children[0], &p.address()),
            Ok(1_000)
        );
    }

    #[test]
    fn test_rebalance_params_length_checked() {
        let (mut engine, p, _children, _alice) = setup(
            vec![MockPosition::new("a", usdc()), MockPosition::new("b", usdc())],
            &[50_000, 50_000],
        );
        assert_eq!(
            engine.rebalance(&p, &[Params::None], &[]),
            Err(VaultError::IncorrectParamsLength {
                expected: 2,
                actual: 1
            })
        );
    }

    #[test]
    fn test_paused_portfolio_cannot_rebalance() {
        let (mut engine, p, _children, _alice) = setup(
            vec![MockPosition::new("a", usdc())],
            &[100_000],
        );
        engine.pause(&p).unwrap();
        assert_eq!(
            engine.rebalance(&p, &[], &[]),
            Err(VaultError::VaultPaused(p.clone()))
        );
    }
}
