//! Administrative switches: pause state and investment limits.

use super::Engine;
use crate::domain::{InvestableId, VaultEvent};
use crate::error::VaultError;
use tracing::info;

impl Engine {
    /// Block deposits and withdrawals on `id`. Pausing twice is a no-op.
    pub fn pause(&mut self, id: &InvestableId) -> Result<(), VaultError> {
        self.set_paused(id, true)
    }

    pub fn unpause(&mut self, id: &InvestableId) -> Result<(), VaultError> {
        self.set_paused(id, false)
    }

    fn set_paused(&mut self, id: &InvestableId, paused: bool) -> Result<(), VaultError> {
        self.transact("set_paused", |engine| {
            let changed = engine.with_vault(id, |_, vault| {
                let changed = vault.paused != paused;
                vault.paused = paused;
                Ok(changed)
            })?;
            if changed {
                let event = if paused {
                    VaultEvent::Paused
                } else {
                    VaultEvent::Unpaused
                };
                engine.emit(id, event);
                info!(investable = %id, paused, "pause state changed");
            }
            Ok(())
        })
    }

    /// Cap total equity after a deposit; `None` removes the cap.
    pub fn set_total_investment_limit(
        &mut self,
        id: &InvestableId,
        limit: Option<u128>,
    ) -> Result<(), VaultError> {
        self.transact("set_total_investment_limit", |engine| {
            engine.with_vault(id, |_, vault| {
                vault.limits.total = limit;
                Ok(())
            })?;
            engine.emit(id, VaultEvent::TotalInvestmentLimitChange { limit });
            info!(investable = %id, ?limit, "total investment limit set");
            Ok(())
        })
    }

    /// Cap the value any single receiver may hold after a deposit.
    pub fn set_investment_limit_per_address(
        &mut self,
        id: &InvestableId,
        limit: Option<u128>,
    ) -> Result<(), VaultError> {
        self.transact("set_investment_limit_per_address", |engine| {
            engine.with_vault(id, |_, vault| {
                vault.limits.per_address = limit;
                Ok(())
            })?;
            engine.emit(id, VaultEvent::InvestmentLimitPerAddressChange { limit });
            info!(investable = %id, ?limit, "per-address investment limit set");
            Ok(())
        })
    }
}
