use crate::domain::{Address, AssetId, InvestableId};
use crate::oracle::OracleError;
use crate::position::PositionError;
use thiserror::Error;

/// Every way an investable operation can fail.
///
/// A failed operation leaves balances, share supply, fees and allocations
/// exactly as they were before the call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VaultError {
    #[error("deposit amount must be greater than zero")]
    ZeroAmountDeposited,
    #[error("withdrawn share amount must be greater than zero")]
    ZeroAmountWithdrawn,
    #[error("deposit of {amount} would mint zero shares")]
    ZeroSharesMinted { amount: u128 },
    #[error("total investment limit exceeded: valuation {valuation}, limit {limit}")]
    TotalInvestmentLimitExceeded { valuation: u128, limit: u128 },
    #[error("investment limit per address exceeded for {address}: valuation {valuation}, limit {limit}")]
    InvestmentLimitPerAddressExceeded {
        address: Address,
        valuation: u128,
        limit: u128,
    },
    #[error("invalid fee: {fee} must be below 100000")]
    InvalidFeeError { fee: u32 },
    #[error("insufficient shares for {holder}: has {available}, needs {requested}")]
    InsufficientShares {
        holder: Address,
        available: u128,
        requested: u128,
    },
    #[error("insufficient {asset} balance for {holder}: has {available}, needs {requested}")]
    InsufficientBalance {
        holder: Address,
        asset: AssetId,
        available: u128,
        requested: u128,
    },
    #[error("investable {0} is paused")]
    VaultPaused(InvestableId),
    #[error("investable {0} has outstanding shares but zero equity")]
    InsolventVault(InvestableId),

    #[error("allocations length {actual} does not match investable count {expected}")]
    RebalanceIncorrectAllocationsLength { expected: usize, actual: usize },
    #[error("allocations sum to {sum}, expected 100000")]
    RebalancePercentageNot100 { sum: u64 },
    #[error("params length {actual} does not match investable count {expected}")]
    IncorrectParamsLength { expected: usize, actual: usize },
    #[error("investable {0} already added")]
    InvestableAlreadyAdded(InvestableId),
    #[error("investable {0} not yet added")]
    InvestableNotYetAdded(InvestableId),
    #[error("investable {0} still has a non-zero target allocation")]
    InvestableHasNonZeroAllocation(InvestableId),
    #[error("investable {0} still holds portfolio capital")]
    InvestableHasNonZeroBalance(InvestableId),
    #[error("adding {child} to {portfolio} would create a cycle")]
    CircularInvestable {
        portfolio: InvestableId,
        child: InvestableId,
    },
    #[error("investable {investable} takes {actual}, expected {expected}")]
    DepositAssetMismatch {
        investable: InvestableId,
        expected: AssetId,
        actual: AssetId,
    },
    #[error("operation requires a portfolio, {0} is a leaf")]
    NotAPortfolio(InvestableId),
    #[error("operation requires a leaf, {0} is a portfolio")]
    NotALeaf(InvestableId),

    #[error("investable {0} does not exist")]
    UnknownInvestable(InvestableId),
    #[error("investable {0} already exists")]
    DuplicateInvestable(InvestableId),
    #[error("reentrant call into investable {0}")]
    ReentrantCall(InvestableId),
    #[error("arithmetic overflow in {0}")]
    MathOverflow(&'static str),
    #[error("accounting invariant violated: {0}")]
    InvariantViolation(String),

    #[error(transparent)]
    Oracle(#[from] OracleError),
    #[error(transparent)]
    Position(#[from] PositionError),
}

impl VaultError {
    /// Validation failures are the caller's fault; everything else is propagated.
    pub fn is_validation(&self) -> bool {
        !matches!(
            self,
            VaultError::Oracle(_)
                | VaultError::Position(_)
                | VaultError::MathOverflow(_)
                | VaultError::InvariantViolation(_)
                | VaultError::ReentrantCall(_)
        )
    }
}
