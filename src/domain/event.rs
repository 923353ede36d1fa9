//! Events emitted by investables.

use super::{Address, Bps, InvestableId, Params};
use serde::Serialize;

/// State change notification emitted by a single investable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VaultEvent {
    Deposit {
        depositor: Address,
        receiver: Address,
        amount: u128,
        shares_minted: u128,
    },
    Withdrawal {
        withdrawer: Address,
        receiver: Address,
        share_amount: u128,
        amount_returned: u128,
    },
    FeeClaim {
        amount: u128,
    },
    DepositFeeChange {
        fee: Bps,
        params: Params,
    },
    WithdrawalFeeChange {
        fee: Bps,
        params: Params,
    },
    PerformanceFeeChange {
        fee: Bps,
        params: Params,
    },
    TotalInvestmentLimitChange {
        limit: Option<u128>,
    },
    InvestmentLimitPerAddressChange {
        limit: Option<u128>,
    },
    Harvest {
        realized_gain: u128,
        performance_fee: u128,
    },
    TargetInvestableAllocationsSet {
        allocations: Vec<Bps>,
    },
    /// Realized change of each child's valuation, in child order.
    Rebalance {
        deltas: Vec<i128>,
    },
    InvestableAdd {
        investable: InvestableId,
        allocations: Vec<Bps>,
        params: Params,
    },
    InvestableRemove {
        investable: InvestableId,
        allocations: Vec<Bps>,
        params: Params,
    },
    InvestableChange {
        previous: InvestableId,
        investable: InvestableId,
        params: Params,
    },
    Paused,
    Unpaused,
}

/// An event tagged with the investable that emitted it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmittedEvent {
    pub investable: InvestableId,
    #[serde(flatten)]
    pub event: VaultEvent,
}

impl EmittedEvent {
    pub fn new(investable: InvestableId, event: VaultEvent) -> Self {
        Self { investable, event }
    }
}
