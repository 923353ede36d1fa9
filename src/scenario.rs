//! JSON scenario replay.
//!
//! A scenario declares prices, opening balances and investables (leaves backed by
//! [`MockPosition`]), then an ordered list of steps. Every step runs as its own
//! atomic call; a failing step is recorded with its error and the run continues.

use crate::config::Config;
use crate::domain::{
    Address, AssetId, Bps, Decimal, EmittedEvent, InvestableDesc, InvestableId, InvestmentLimits,
    Params,
};
use crate::engine::{Engine, VaultSpec, VaultSummary};
use crate::error::VaultError;
use crate::oracle::{PriceOracle, PriceQuote};
use crate::position::MockPosition;
use crate::schema::SchemaError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("failed to read scenario: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid scenario: {0}")]
    Json(#[from] serde_json::Error),
    #[error("scenario setup failed: {0}")]
    Setup(#[from] VaultError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub assets: Vec<AssetQuote>,
    #[serde(default)]
    pub balances: Vec<InitialBalance>,
    pub investables: Vec<InvestableDef>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn from_json(raw: &str) -> Result<Self, ScenarioError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScenarioError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }
}

/// Price of an asset; `high` defaults to `low`.
#[derive(Debug, Clone, Deserialize)]
pub struct AssetQuote {
    pub asset: AssetId,
    pub low: Decimal,
    #[serde(default)]
    pub high: Option<Decimal>,
}

impl AssetQuote {
    fn quote(&self) -> PriceQuote {
        PriceQuote {
            low: self.low,
            high: self.high.unwrap_or(self.low),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InitialBalance {
    pub holder: Address,
    pub asset: AssetId,
    pub amount: u128,
}

/// Fee overrides; anything left out falls back to the configured defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeeRates {
    pub deposit: Option<Bps>,
    pub withdrawal: Option<Bps>,
    pub performance: Option<Bps>,
    pub receiver: Option<Address>,
}

/// Behaviour of the mock position behind a leaf.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PositionDef {
    #[serde(default)]
    pub borrow_ratio: Bps,
    #[serde(default)]
    pub withdraw_slippage: Bps,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvestableDef {
    Leaf {
        id: InvestableId,
        deposit_asset: AssetId,
        #[serde(default)]
        fees: FeeRates,
        #[serde(default)]
        limits: Option<InvestmentLimits>,
        #[serde(default)]
        position: PositionDef,
    },
    Portfolio {
        id: InvestableId,
        deposit_asset: AssetId,
        #[serde(default)]
        fees: FeeRates,
        #[serde(default)]
        limits: Option<InvestmentLimits>,
        #[serde(default)]
        children: Vec<InvestableDesc>,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Deposit {
        investable: InvestableId,
        caller: Address,
        amount: u128,
        #[serde(default)]
        receiver: Option<Address>,
        #[serde(default)]
        params: Params,
    },
    Withdraw {
        investable: InvestableId,
        caller: Address,
        shares: u128,
        #[serde(default)]
        receiver: Option<Address>,
        #[serde(default)]
        params: Params,
    },
    ClaimFee {
        investable: InvestableId,
        #[serde(default)]
        params: Params,
    },
    SetDepositFee {
        investable: InvestableId,
        fee: Bps,
        #[serde(default)]
        params: Params,
    },
    SetWithdrawalFee {
        investable: InvestableId,
        fee: Bps,
        #[serde(default)]
        params: Params,
    },
    SetPerformanceFee {
        investable: InvestableId,
        fee: Bps,
        #[serde(default)]
        params: Params,
    },
    SetTotalInvestmentLimit {
        investable: InvestableId,
        limit: Option<u128>,
    },
    SetInvestmentLimitPerAddress {
        investable: InvestableId,
        limit: Option<u128>,
    },
    SetTargetAllocations {
        investable: InvestableId,
        allocations: Vec<Bps>,
    },
    Rebalance {
        investable: InvestableId,
        #[serde(default)]
        deposit_params: Vec<Params>,
        #[serde(default)]
        withdraw_params: Vec<Params>,
    },
    AddInvestable {
        investable: InvestableId,
        child: InvestableId,
        allocations: Vec<Bps>,
        #[serde(default)]
        params: Params,
    },
    RemoveInvestable {
        investable: InvestableId,
        child: InvestableId,
        allocations: Vec<Bps>,
        #[serde(default)]
        params: Params,
    },
    ChangeInvestable {
        investable: InvestableId,
        previous: InvestableId,
        replacement: InvestableId,
        #[serde(default)]
        params: Params,
    },
    Harvest {
        investable: InvestableId,
        #[serde(default)]
        params: Params,
    },
    /// Queue rewards on a leaf's position for the next harvest.
    AddRewards {
        investable: InvestableId,
        amount: u128,
    },
    /// Grow a leaf's position balance directly, as accrued interest would.
    AccrueYield {
        investable: InvestableId,
        amount: u128,
    },
    SetPrice(AssetQuote),
    SetWithdrawSlippage {
        investable: InvestableId,
        slippage: Bps,
    },
    Pause {
        investable: InvestableId,
    },
    Unpause {
        investable: InvestableId,
    },
}

impl Step {
    pub fn action(&self) -> &'static str {
        match self {
            Step::Deposit { .. } => "deposit",
            Step::Withdraw { .. } => "withdraw",
            Step::ClaimFee { .. } => "claim_fee",
            Step::SetDepositFee { .. } => "set_deposit_fee",
            Step::SetWithdrawalFee { .. } => "set_withdrawal_fee",
            Step::SetPerformanceFee { .. } => "set_performance_fee",
            Step::SetTotalInvestmentLimit { .. } => "set_total_investment_limit",
            Step::SetInvestmentLimitPerAddress { .. } => "set_investment_limit_per_address",
            Step::SetTargetAllocations { .. } => "set_target_allocations",
            Step::Rebalance { .. } => "rebalance",
            Step::AddInvestable { .. } => "add_investable",
            Step::RemoveInvestable { .. } => "remove_investable",
            Step::ChangeInvestable { .. } => "change_investable",
            Step::Harvest { .. } => "harvest",
            Step::AddRewards { .. } => "add_rewards",
            Step::AccrueYield { .. } => "accrue_yield",
            Step::SetPrice(_) => "set_price",
            Step::SetWithdrawSlippage { .. } => "set_withdraw_slippage",
            Step::Pause { .. } => "pause",
            Step::Unpause { .. } => "unpause",
        }
    }
}

/// Return value of a successful step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum StepValue {
    None,
    Amount(u128),
    Deltas(Vec<i128>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepOutcome {
    pub index: usize,
    pub action: &'static str,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<StepValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub outcomes: Vec<StepOutcome>,
    pub events: Vec<EmittedEvent>,
    pub summaries: Vec<VaultSummary>,
    pub fingerprint: String,
}

impl ScenarioReport {
    pub fn failures(&self) -> impl Iterator<Item = &StepOutcome> {
        self.outcomes.iter().filter(|outcome| !outcome.ok)
    }
}

/// Replays `scenario` on a fresh engine configured from `config`.
pub fn run(scenario: &Scenario, config: &Config) -> Result<ScenarioReport, ScenarioError> {
    let mut runner = Runner::new(scenario, config)?;
    let mut outcomes = Vec::with_capacity(scenario.steps.len());
    for (index, step) in scenario.steps.iter().enumerate() {
        let outcome = match runner.apply(step) {
            Ok(value) => StepOutcome {
                index,
                action: step.action(),
                ok: true,
                value: Some(value),
                error: None,
            },
            Err(err) => {
                warn!(index, action = step.action(), error = %err, "step failed");
                StepOutcome {
                    index,
                    action: step.action(),
                    ok: false,
                    value: None,
                    error: Some(err.to_string()),
                }
            }
        };
        outcomes.push(outcome);
    }

    let engine = runner.engine;
    let summaries = engine
        .investable_ids()
        .iter()
        .map(|id| engine.summary(id))
        .collect::<Result<Vec<_>, VaultError>>()?;
    let fingerprint = engine.accounting_fingerprint()?;
    info!(
        steps = outcomes.len(),
        failed = outcomes.iter().filter(|o| !o.ok).count(),
        "scenario complete"
    );
    Ok(ScenarioReport {
        outcomes,
        events: engine.events().to_vec(),
        summaries,
        fingerprint,
    })
}

struct Runner {
    engine: Engine,
    oracle: PriceOracle,
}

impl Runner {
    fn new(scenario: &Scenario, config: &Config) -> Result<Self, ScenarioError> {
        let mut oracle = PriceOracle::new();
        for quote in &scenario.assets {
            oracle.set_quote(quote.asset.clone(), quote.quote());
        }
        let mut engine = Engine::from_config(oracle.clone(), config);

        for balance in &scenario.balances {
            engine
                .ledger_mut()
                .mint(&balance.asset, &balance.holder, balance.amount)?;
        }
        for def in &scenario.investables {
            create(&mut engine, def, config)?;
        }
        Ok(Self { engine, oracle })
    }

    fn apply(&mut self, step: &Step) -> Result<StepValue, VaultError> {
        let engine = &mut self.engine;
        let value = match step {
            Step::Deposit {
                investable,
                caller,
                amount,
                receiver,
                params,
            } => {
                let receiver = receiver.as_ref().unwrap_or(caller);
                StepValue::Amount(engine.deposit(investable, caller, *amount, receiver, params)?)
            }
            Step::Withdraw {
                investable,
                caller,
                shares,
                receiver,
                params,
            } => {
                let receiver = receiver.as_ref().unwrap_or(caller);
                StepValue::Amount(engine.withdraw(investable, caller, *shares, receiver, params)?)
            }
            Step::ClaimFee { investable, params } => {
                StepValue::Amount(engine.claim_fee(investable, params)?)
            }
            Step::SetDepositFee {
                investable,
                fee,
                params,
            } => {
                engine.set_deposit_fee(investable, *fee, params)?;
                StepValue::None
            }
            Step::SetWithdrawalFee {
                investable,
                fee,
                params,
            } => {
                engine.set_withdrawal_fee(investable, *fee, params)?;
                StepValue::None
            }
            Step::SetPerformanceFee {
                investable,
                fee,
                params,
            } => {
                engine.set_performance_fee(investable, *fee, params)?;
                StepValue::None
            }
            Step::SetTotalInvestmentLimit { investable, limit } => {
                engine.set_total_investment_limit(investable, *limit)?;
                StepValue::None
            }
            Step::SetInvestmentLimitPerAddress { investable, limit } => {
                engine.set_investment_limit_per_address(investable, *limit)?;
                StepValue::None
            }
            Step::SetTargetAllocations {
                investable,
                allocations,
            } => {
                engine.set_target_investable_allocations(investable, allocations.clone())?;
                StepValue::None
            }
            Step::Rebalance {
                investable,
                deposit_params,
                withdraw_params,
            } => StepValue::Deltas(engine.rebalance(investable, deposit_params, withdraw_params)?),
            Step::AddInvestable {
                investable,
                child,
                allocations,
                params,
            } => {
                engine.add_investable(investable, child, allocations.clone(), params)?;
                StepValue::None
            }
            Step::RemoveInvestable {
                investable,
                child,
                allocations,
                params,
            } => {
                engine.remove_investable(investable, child, allocations.clone(), params)?;
                StepValue::None
            }
            Step::ChangeInvestable {
                investable,
                previous,
                replacement,
                params,
            } => {
                engine.change_investable(investable, previous, replacement, params)?;
                StepValue::None
            }
            Step::Harvest { investable, params } => {
                StepValue::Amount(engine.harvest(investable, params)?)
            }
            Step::AddRewards { investable, amount } => {
                engine
                    .position_mut::<MockPosition>(investable)?
                    .add_rewards(*amount);
                StepValue::None
            }
            Step::AccrueYield { investable, amount } => {
                let vault = engine.vault(investable)?;
                let asset = vault.deposit_asset().clone();
                let account = engine.position::<MockPosition>(investable)?.account().clone();
                engine.ledger_mut().mint(&asset, &account, *amount)?;
                StepValue::None
            }
            Step::SetPrice(quote) => {
                self.oracle.set_quote(quote.asset.clone(), quote.quote());
                engine.set_oracle(self.oracle.clone());
                StepValue::None
            }
            Step::SetWithdrawSlippage {
                investable,
                slippage,
            } => {
                engine
                    .position_mut::<MockPosition>(investable)?
                    .set_withdraw_slippage(*slippage);
                StepValue::None
            }
            Step::Pause { investable } => {
                engine.pause(investable)?;
                StepValue::None
            }
            Step::Unpause { investable } => {
                engine.unpause(investable)?;
                StepValue::None
            }
        };
        Ok(value)
    }
}

fn create(engine: &mut Engine, def: &InvestableDef, config: &Config) -> Result<(), VaultError> {
    match def {
        InvestableDef::Leaf {
            id,
            deposit_asset,
            fees,
            limits,
            position,
        } => {
            let spec = spec_for(id, deposit_asset, fees, limits, config);
            let mock = MockPosition::new(id.as_str(), deposit_asset.clone())
                .with_borrow_ratio(position.borrow_ratio)
                .with_withdraw_slippage(position.withdraw_slippage);
            engine.create_leaf(spec, mock)?;
        }
        InvestableDef::Portfolio {
            id,
            deposit_asset,
            fees,
            limits,
            children,
        } => {
            let spec = spec_for(id, deposit_asset, fees, limits, config);
            engine.create_portfolio(spec, children.clone())?;
        }
    }
    Ok(())
}

fn spec_for(
    id: &InvestableId,
    deposit_asset: &AssetId,
    fees: &FeeRates,
    limits: &Option<InvestmentLimits>,
    config: &Config,
) -> VaultSpec {
    let mut spec = VaultSpec::from_config(id.clone(), deposit_asset.clone(), config);
    let deposit_fee = fees.deposit.unwrap_or(spec.deposit_fee);
    let withdrawal_fee = fees.withdrawal.unwrap_or(spec.withdrawal_fee);
    let performance_fee = fees.performance.unwrap_or(spec.performance_fee);
    spec = spec.with_fees(deposit_fee, withdrawal_fee, performance_fee);
    if let Some(receiver) = &fees.receiver {
        spec = spec.with_fee_receiver(receiver.clone());
    }
    if let Some(limits) = limits {
        spec = spec.with_limits(*limits);
    }
    spec
}
