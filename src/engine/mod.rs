//! Share accounting, fee and rebalancing engine for investables.
//!
//! The engine owns every investable, the token ledger they move funds on, and
//! the event log. Public entry points are atomic: on any error the world state
//! is restored to what it was before the call.
//!
//! An investable is checked out of the registry while an operation runs on it,
//! so a nested call that reaches it again fails with `ReentrantCall` instead of
//! observing half-applied state.

use crate::config::{Config, ValuationPolicy};
use crate::domain::{Address, EmittedEvent, InvestableDesc, InvestableId, VaultEvent};
use crate::error::VaultError;
use crate::ledger::TokenLedger;
use crate::oracle::ValuationOracle;
use crate::position::Position;
use std::collections::BTreeMap;
use tracing::{info, warn};

pub mod controls;
pub mod fees;
pub mod portfolio;
pub mod rebalancer;
pub mod shares;
pub mod snapshot;
pub mod valuation;
pub mod vault;

pub use rebalancer::{deposit_split, RebalancePlan};
pub use shares::DepositQuote;
pub use vault::{Vault, VaultKind, VaultSpec, VaultSummary};

#[derive(Debug, Clone)]
enum Slot {
    Available(Box<Vault>),
    InUse,
}

/// Everything that a failed call must roll back.
#[derive(Debug, Clone, Default)]
struct WorldState {
    ledger: TokenLedger,
    vaults: BTreeMap<InvestableId, Slot>,
}

#[derive(Debug)]
pub struct Engine {
    state: WorldState,
    oracle: Box<dyn ValuationOracle>,
    policy: ValuationPolicy,
    events: Vec<EmittedEvent>,
}

impl Engine {
    pub fn new(oracle: impl ValuationOracle + 'static) -> Self {
        Self {
            state: WorldState::default(),
            oracle: Box::new(oracle),
            policy: ValuationPolicy::default(),
            events: Vec::new(),
        }
    }

    pub fn from_config(oracle: impl ValuationOracle + 'static, config: &Config) -> Self {
        Self::new(oracle).with_policy(config.policy)
    }

    pub fn with_policy(mut self, policy: ValuationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &ValuationPolicy {
        &self.policy
    }

    pub fn set_oracle(&mut self, oracle: impl ValuationOracle + 'static) {
        self.oracle = Box::new(oracle);
    }

    pub fn ledger(&self) -> &TokenLedger {
        &self.state.ledger
    }

    /// Direct ledger access, for funding users or simulating donations.
    pub fn ledger_mut(&mut self) -> &mut TokenLedger {
        &mut self.state.ledger
    }

    pub fn events(&self) -> &[EmittedEvent] {
        &self.events
    }

    pub fn take_events(&mut self) -> Vec<EmittedEvent> {
        std::mem::take(&mut self.events)
    }

    /// Register a leaf investable backed by `position`.
    pub fn create_leaf(
        &mut self,
        spec: VaultSpec,
        position: impl Position + 'static,
    ) -> Result<InvestableId, VaultError> {
        spec.validate()?;
        let id = spec.id.clone();
        if self.state.vaults.contains_key(&id) {
            return Err(VaultError::DuplicateInvestable(id));
        }
        let vault = Vault::new(spec, VaultKind::Leaf(Box::new(position)));
        self.state
            .vaults
            .insert(id.clone(), Slot::Available(Box::new(vault)));
        info!(investable = %id, "leaf investable created");
        Ok(id)
    }

    /// Register a portfolio over existing investables.
    ///
    /// An empty child list is allowed; capital then stays idle until children are
    /// added. A non-empty list must allocate exactly 100%.
    pub fn create_portfolio(
        &mut self,
        spec: VaultSpec,
        children: Vec<InvestableDesc>,
    ) -> Result<InvestableId, VaultError> {
        spec.validate()?;
        let id = spec.id.clone();
        if self.state.vaults.contains_key(&id) {
            return Err(VaultError::DuplicateInvestable(id));
        }
        for (index, child) in children.iter().enumerate() {
            let vault = self.vault(&child.investable)?;
            if vault.deposit_asset != spec.deposit_asset {
                return Err(VaultError::DepositAssetMismatch {
                    investable: child.investable.clone(),
                    expected: spec.deposit_asset.clone(),
                    actual: vault.deposit_asset.clone(),
                });
            }
            if children[..index]
                .iter()
                .any(|c| c.investable == child.investable)
            {
                return Err(VaultError::InvestableAlreadyAdded(child.investable.clone()));
            }
        }
        if !children.is_empty() {
            let allocations: Vec<_> = children.iter().map(|c| c.allocation).collect();
            portfolio::validate_allocations(children.len(), &allocations)?;
        }
        let vault = Vault::new(spec, VaultKind::Portfolio(children));
        self.state
            .vaults
            .insert(id.clone(), Slot::Available(Box::new(vault)));
        info!(investable = %id, "portfolio created");
        Ok(id)
    }

    /// Read-only view of an investable.
    pub fn vault(&self, id: &InvestableId) -> Result<&Vault, VaultError> {
        match self.state.vaults.get(id) {
            Some(Slot::Available(vault)) => Ok(vault.as_ref()),
            Some(Slot::InUse) => Err(VaultError::ReentrantCall(id.clone())),
            None => Err(VaultError::UnknownInvestable(id.clone())),
        }
    }

    pub fn investable_ids(&self) -> Vec<InvestableId> {
        self.state.vaults.keys().cloned().collect()
    }

    /// Concrete position of a leaf, for inspection.
    pub fn position<P: Position + 'static>(&self, id: &InvestableId) -> Result<&P, VaultError> {
        match &self.vault(id)?.kind {
            VaultKind::Leaf(position) => position
                .as_any()
                .downcast_ref::<P>()
                .ok_or_else(|| VaultError::InvariantViolation(format!("{} position type", id))),
            VaultKind::Portfolio(_) => Err(VaultError::NotALeaf(id.clone())),
        }
    }

    /// Concrete position of a leaf, for adjusting test knobs.
    pub fn position_mut<P: Position + 'static>(
        &mut self,
        id: &InvestableId,
    ) -> Result<&mut P, VaultError> {
        match self.state.vaults.get_mut(id) {
            Some(Slot::Available(vault)) => match &mut vault.kind {
                VaultKind::Leaf(position) => {
                    position.as_any_mut().downcast_mut::<P>().ok_or_else(|| {
                        VaultError::InvariantViolation(format!("{} position type", id))
                    })
                }
                VaultKind::Portfolio(_) => Err(VaultError::NotALeaf(id.clone())),
            },
            Some(Slot::InUse) => Err(VaultError::ReentrantCall(id.clone())),
            None => Err(VaultError::UnknownInvestable(id.clone())),
        }
    }

    /// Run `op` atomically: on error, ledger, vaults and events are restored.
    fn transact<T>(
        &mut self,
        operation: &'static str,
        op: impl FnOnce(&mut Self) -> Result<T, VaultError>,
    ) -> Result<T, VaultError> {
        let snapshot = self.state.clone();
        let event_count = self.events.len();
        match op(self) {
            Ok(value) => Ok(value),
            Err(err) => {
                self.state = snapshot;
                self.events.truncate(event_count);
                warn!(operation, error = %err, "operation reverted");
                Err(err)
            }
        }
    }

    /// Check `id` out of the registry, run `op` on it, and check it back in.
    fn with_vault<T>(
        &mut self,
        id: &InvestableId,
        op: impl FnOnce(&mut Self, &mut Vault) -> Result<T, VaultError>,
    ) -> Result<T, VaultError> {
        let mut vault = self.checkout(id)?;
        let result = op(self, vault.as_mut());
        self.state
            .vaults
            .insert(id.clone(), Slot::Available(vault));
        result
    }

    fn checkout(&mut self, id: &InvestableId) -> Result<Box<Vault>, VaultError> {
        let slot = self
            .state
            .vaults
            .get_mut(id)
            .ok_or_else(|| VaultError::UnknownInvestable(id.clone()))?;
        match std::mem::replace(slot, Slot::InUse) {
            Slot::Available(vault) => Ok(vault),
            Slot::InUse => Err(VaultError::ReentrantCall(id.clone())),
        }
    }

    fn emit(&mut self, investable: &InvestableId, event: VaultEvent) {
        self.events
            .push(EmittedEvent::new(investable.clone(), event));
    }

    /// Share balance of `holder` in `id`.
    pub fn get_investment_token_balance_of(
        &self,
        id: &InvestableId,
        holder: &Address,
    ) -> Result<u128, VaultError> {
        Ok(self.vault(id)?.shares.balance_of(holder))
    }

    pub fn get_investment_token_supply(&self, id: &InvestableId) -> Result<u128, VaultError> {
        Ok(self.vault(id)?.shares.supply())
    }
}
