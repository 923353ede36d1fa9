//! Per-vault accounting records: fees, limits, child allocations.

use super::{Address, AssetId, Bps, InvestableId};
use serde::{Deserialize, Serialize};

/// Fee rates plus the running fee balances of one vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeConfig {
    pub deposit_fee: Bps,
    pub withdrawal_fee: Bps,
    pub performance_fee: Bps,
    pub fee_receiver: Address,
    /// Fee recognized but not yet transferred to `fee_receiver`, in deposit-asset units.
    pub accumulated_fee: u128,
    /// Lifetime total moved out by `claim_fee`.
    pub claimed_fee: u128,
}

impl FeeConfig {
    pub fn new(fee_receiver: Address) -> Self {
        Self {
            deposit_fee: Bps::ZERO,
            withdrawal_fee: Bps::ZERO,
            performance_fee: Bps::ZERO,
            fee_receiver,
            accumulated_fee: 0,
            claimed_fee: 0,
        }
    }

    pub fn with_rates(mut self, deposit: Bps, withdrawal: Bps, performance: Bps) -> Self {
        self.deposit_fee = deposit;
        self.withdrawal_fee = withdrawal;
        self.performance_fee = performance;
        self
    }
}

/// Investment caps, expressed in the valuation unit. `None` means uncapped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvestmentLimits {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u128>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_address: Option<u128>,
}

impl InvestmentLimits {
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn with_total(mut self, limit: u128) -> Self {
        self.total = Some(limit);
        self
    }

    pub fn with_per_address(mut self, limit: u128) -> Self {
        self.per_address = Some(limit);
        self
    }

    pub fn total_allows(&self, valuation: u128) -> bool {
        self.total.map_or(true, |limit| valuation <= limit)
    }

    pub fn per_address_allows(&self, valuation: u128) -> bool {
        self.per_address.map_or(true, |limit| valuation <= limit)
    }
}

/// A portfolio child and its target share of the portfolio's equity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvestableDesc {
    pub investable: InvestableId,
    pub allocation: Bps,
}

impl InvestableDesc {
    pub fn new(investable: InvestableId, allocation: Bps) -> Self {
        Self {
            investable,
            allocation,
        }
    }
}

/// One line of a position's balance sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetBalance {
    pub asset: AssetId,
    pub amount: u128,
}

impl AssetBalance {
    pub fn new(asset: AssetId, amount: u128) -> Self {
        Self { asset, amount }
    }
}

/// Live view of one portfolio child.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllocationView {
    pub investable: InvestableId,
    pub target: Bps,
    /// Value of the portfolio's holding in this child.
    pub valuation: u128,
    /// `valuation` as a share of the portfolio's total equity.
    pub actual: Bps,
}

impl AllocationView {
    /// Absolute gap between actual and target, in bps.
    pub fn drift(&self) -> u32 {
        self.actual.value().abs_diff(self.target.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fee_config_defaults_to_zero_rates() {
        let fees = FeeConfig::new(Address::new("treasury"));
        assert!(fees.deposit_fee.is_zero());
        assert_eq!(fees.accumulated_fee, 0);
        let fees = fees.with_rates(Bps(100), Bps(200), Bps(10_000));
        assert_eq!(fees.withdrawal_fee, Bps(200));
    }

    #[test]
    fn test_limits_are_inclusive() {
        let limits = InvestmentLimits::unlimited().with_total(1_000);
        assert!(limits.total_allows(1_000));
        assert!(!limits.total_allows(1_001));
        assert!(limits.per_address_allows(u128::MAX));
    }

    #[test]
    fn test_allocation_drift() {
        let view = AllocationView {
            investable: InvestableId::new("a"),
            target: Bps(33_000),
            valuation: 10,
            actual: Bps(31_500),
        };
        assert_eq!(view.drift(), 1_500);
    }
}
