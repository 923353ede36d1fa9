//! Export and re-import of accounting state.

use super::{portfolio, Engine, Vault, VaultKind};
use crate::error::VaultError;
use crate::schema::{AccountingExport, AccountingRecord, SchemaError, CURRENT_VERSION};
use tracing::info;

impl Engine {
    /// Accounting state of every investable, in id order.
    pub fn export_accounting(&self) -> Result<AccountingExport, SchemaError> {
        let records = self
            .investable_ids()
            .iter()
            .map(|id| self.vault(id).map(record_of))
            .collect::<Result<Vec<_>, VaultError>>()?;
        AccountingExport::new(records)
    }

    /// Fingerprint of the current accounting state.
    pub fn accounting_fingerprint(&self) -> Result<String, SchemaError> {
        Ok(self.export_accounting()?.fingerprint)
    }

    /// Overwrite accounting state from an export.
    ///
    /// Every record must name an existing investable of the same kind and deposit
    /// asset. Share supply, fee rates and allocation tables are re-checked; any
    /// violation leaves the engine untouched.
    pub fn import_accounting(&mut self, export: &AccountingExport) -> Result<(), SchemaError> {
        if export.version != CURRENT_VERSION {
            return Err(SchemaError::UnsupportedVersion(export.version));
        }
        export.verify()?;
        self.transact("import_accounting", |engine| {
            for record in &export.records {
                engine.with_vault(&record.investable, |engine, vault| {
                    engine.apply_record(vault, record)
                })?;
            }
            Ok(())
        })?;
        info!(records = export.records.len(), "accounting imported");
        Ok(())
    }

    fn apply_record(
        &self,
        vault: &mut Vault,
        record: &AccountingRecord,
    ) -> Result<(), VaultError> {
        let id = &record.investable;
        if record.deposit_asset != vault.deposit_asset {
            return Err(VaultError::DepositAssetMismatch {
                investable: id.clone(),
                expected: vault.deposit_asset.clone(),
                actual: record.deposit_asset.clone(),
            });
        }
        if !record.shares.is_consistent() {
            return Err(VaultError::InvariantViolation(format!(
                "{} share supply does not match balances",
                id
            )));
        }
        for fee in [
            record.fees.deposit_fee,
            record.fees.withdrawal_fee,
            record.fees.performance_fee,
        ] {
            if !fee.is_valid_fee() {
                return Err(VaultError::InvalidFeeError { fee: fee.value() });
            }
        }

        match (&mut vault.kind, &record.investables) {
            (VaultKind::Portfolio(children), Some(table)) => {
                for (index, child) in table.iter().enumerate() {
                    if table[..index].iter().any(|c| c.investable == child.investable) {
                        return Err(VaultError::InvestableAlreadyAdded(child.investable.clone()));
                    }
                    if self.subtree_contains(&child.investable, id)? {
                        return Err(VaultError::CircularInvestable {
                            portfolio: id.clone(),
                            child: child.investable.clone(),
                        });
                    }
                }
                if !table.is_empty() {
                    let allocations: Vec<_> = table.iter().map(|c| c.allocation).collect();
                    portfolio::validate_allocations(table.len(), &allocations)?;
                }
                *children = table.clone();
            }
            (VaultKind::Portfolio(_), None) => return Err(VaultError::NotALeaf(id.clone())),
            (VaultKind::Leaf(_), Some(_)) => return Err(VaultError::NotAPortfolio(id.clone())),
            (VaultKind::Leaf(_), None) => {}
        }

        vault.shares = record.shares.clone();
        vault.fees = record.fees.clone();
        vault.limits = record.limits;
        vault.paused = record.paused;
        Ok(())
    }
}

fn record_of(vault: &Vault) -> AccountingRecord {
    AccountingRecord {
        investable: vault.id.clone(),
        deposit_asset: vault.deposit_asset.clone(),
        shares: vault.shares.clone(),
        fees: vault.fees.clone(),
        limits: vault.limits,
        paused: vault.paused,
        investables: vault.investables().map(<[_]>::to_vec),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Address, AssetId, Bps, Decimal, InvestableDesc, InvestableId, Params};
    use crate::engine::VaultSpec;
    use crate::oracle::PriceOracle;
    use crate::position::MockPosition;

    fn usdc() -> AssetId {
        AssetId::new("USDC")
    }

    fn build() -> (Engine, InvestableId, InvestableId) {
        let mut engine = Engine::new(PriceOracle::new().with_price(usdc(), Decimal::one()));
        let a = engine
            .create_leaf(
                VaultSpec::new(InvestableId::new("a"), usdc())
                    .with_fees(Bps(1_000), Bps::ZERO, Bps::ZERO),
                MockPosition::new("a", usdc()),
            )
            .unwrap();
        let p = engine
            .create_portfolio(
                VaultSpec::new(InvestableId::new("p"), usdc()),
                vec![InvestableDesc::new(a.clone(), Bps::FULL)],
            )
            .unwrap();
        (engine, a, p)
    }

    #[test]
    fn test_export_import_restores_accounting() {
        let (mut engine, a, _p) = build();
        let alice = Address::new("alice");
        engine.ledger_mut().mint(&usdc(), &alice, 1_000).unwrap();
        let before = engine.export_accounting().unwrap();

        engine.deposit(&a, &alice, 1_000, &alice, &Params::None).unwrap();
        engine.pause(&a).unwrap();
        let after = engine.export_accounting().unwrap();
        assert_ne!(before.fingerprint, after.fingerprint);

        let (mut fresh, _, _) = build();
        fresh.import_accounting(&after).unwrap();
        assert_eq!(fresh.accounting_fingerprint().unwrap(), after.fingerprint);
        let vault = fresh.vault(&a).unwrap();
        assert!(vault.is_paused());
        assert_eq!(vault.fees().accumulated_fee, 10);
        assert_eq!(vault.shares().balance_of(&alice), 990);
    }

    #[test]
    fn test_import_rejects_inconsistent_records() {
        let (mut engine, _a, p) = build();
        let mut export = engine.export_accounting().unwrap();
        let index = export.records.iter().position(|r| r.investable == p).unwrap();
        export.records[index].investables = None;
        let export = AccountingExport::new(export.records).unwrap();
        let fingerprint = engine.accounting_fingerprint().unwrap();

        assert!(matches!(
            engine.import_accounting(&export),
            Err(SchemaError::Vault(VaultError::NotALeaf(_)))
        ));
        assert_eq!(engine.accounting_fingerprint().unwrap(), fingerprint);
    }
}
