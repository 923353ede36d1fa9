//! Investable records held by the engine.

use crate::config::Config;
use crate::domain::{
    Address, AssetId, Bps, FeeConfig, InvestableDesc, InvestableId, InvestmentLimits,
};
use crate::error::VaultError;
use crate::ledger::ShareLedger;
use crate::position::Position;
use serde::Serialize;

/// What an investable does with its net principal.
#[derive(Debug, Clone)]
pub enum VaultKind {
    /// Leaf: a single strategy position.
    Leaf(Box<dyn Position>),
    /// Composite: child investables with target allocations, in order.
    Portfolio(Vec<InvestableDesc>),
}

impl VaultKind {
    pub fn is_portfolio(&self) -> bool {
        matches!(self, VaultKind::Portfolio(_))
    }
}

/// Accounting state of one investable.
#[derive(Debug, Clone)]
pub struct Vault {
    pub(crate) id: InvestableId,
    pub(crate) deposit_asset: AssetId,
    pub(crate) shares: ShareLedger,
    pub(crate) fees: FeeConfig,
    pub(crate) limits: InvestmentLimits,
    pub(crate) paused: bool,
    pub(crate) kind: VaultKind,
}

impl Vault {
    pub(crate) fn new(spec: VaultSpec, kind: VaultKind) -> Self {
        Self {
            id: spec.id,
            deposit_asset: spec.deposit_asset,
            shares: ShareLedger::new(),
            fees: FeeConfig::new(spec.fee_receiver).with_rates(
                spec.deposit_fee,
                spec.withdrawal_fee,
                spec.performance_fee,
            ),
            limits: spec.limits,
            paused: false,
            kind,
        }
    }

    pub fn id(&self) -> &InvestableId {
        &self.id
    }

    pub fn address(&self) -> Address {
        self.id.address()
    }

    pub fn deposit_asset(&self) -> &AssetId {
        &self.deposit_asset
    }

    pub fn shares(&self) -> &ShareLedger {
        &self.shares
    }

    pub fn fees(&self) -> &FeeConfig {
        &self.fees
    }

    pub fn limits(&self) -> &InvestmentLimits {
        &self.limits
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn kind(&self) -> &VaultKind {
        &self.kind
    }

    /// Children of a portfolio; `None` for a leaf.
    pub fn investables(&self) -> Option<&[InvestableDesc]> {
        match &self.kind {
            VaultKind::Portfolio(children) => Some(children),
            VaultKind::Leaf(_) => None,
        }
    }
}

/// Construction parameters for a new investable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultSpec {
    pub id: InvestableId,
    pub deposit_asset: AssetId,
    pub fee_receiver: Address,
    pub deposit_fee: Bps,
    pub withdrawal_fee: Bps,
    pub performance_fee: Bps,
    pub limits: InvestmentLimits,
}

impl VaultSpec {
    /// Fee-free, uncapped investable.
    pub fn new(id: InvestableId, deposit_asset: AssetId) -> Self {
        Self {
            id,
            deposit_asset,
            fee_receiver: Address::new("treasury"),
            deposit_fee: Bps::ZERO,
            withdrawal_fee: Bps::ZERO,
            performance_fee: Bps::ZERO,
            limits: InvestmentLimits::unlimited(),
        }
    }

    /// Investable with the configured default fees and limits.
    pub fn from_config(id: InvestableId, deposit_asset: AssetId, config: &Config) -> Self {
        Self {
            id,
            deposit_asset,
            fee_receiver: config.fee_receiver.clone(),
            deposit_fee: config.deposit_fee,
            withdrawal_fee: config.withdrawal_fee,
            performance_fee: config.performance_fee,
            limits: InvestmentLimits {
                total: config.total_investment_limit,
                per_address: config.investment_limit_per_address,
            },
        }
    }

    pub fn with_fee_receiver(mut self, receiver: Address) -> Self {
        self.fee_receiver = receiver;
        self
    }

    pub fn with_fees(mut self, deposit: Bps, withdrawal: Bps, performance: Bps) -> Self {
        self.deposit_fee = deposit;
        self.withdrawal_fee = withdrawal;
        self.performance_fee = performance;
        self
    }

    pub fn with_limits(mut self, limits: InvestmentLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Every fee rate must stay below 100%.
    pub fn validate(&self) -> Result<(), VaultError> {
        for fee in [self.deposit_fee, self.withdrawal_fee, self.performance_fee] {
            if !fee.is_valid_fee() {
                return Err(VaultError::InvalidFeeError { fee: fee.value() });
            }
        }
        Ok(())
    }
}

/// Read-only snapshot of an investable for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VaultSummary {
    pub investable: InvestableId,
    pub portfolio: bool,
    pub share_supply: u128,
    pub equity_low: u128,
    pub equity_high: u128,
    pub accumulated_fee: u128,
    pub claimed_fee: u128,
    pub paused: bool,
}
