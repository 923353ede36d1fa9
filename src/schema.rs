//! Versioned accounting export.
//!
//! An export captures every investable's share balances, fee state, limits, pause
//! flag and allocation table. Older exports are migrated on load; strategy
//! position internals are not part of it.

use crate::domain::{
    Address, AssetId, Bps, FeeConfig, InvestableDesc, InvestableId, InvestmentLimits,
};
use crate::error::VaultError;
use crate::ledger::ShareLedger;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CURRENT_VERSION: u32 = 2;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("unsupported schema version {0}")]
    UnsupportedVersion(u32),
    #[error("fingerprint mismatch: export says {expected}, records hash to {actual}")]
    FingerprintMismatch { expected: String, actual: String },
    #[error("malformed export: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Vault(#[from] VaultError),
}

/// Accounting state of one investable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountingRecord {
    pub investable: InvestableId,
    pub deposit_asset: AssetId,
    pub shares: ShareLedger,
    pub fees: FeeConfig,
    #[serde(default)]
    pub limits: InvestmentLimits,
    pub paused: bool,
    /// Child table of a portfolio; absent for a leaf.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub investables: Option<Vec<InvestableDesc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountingExport {
    pub version: u32,
    pub records: Vec<AccountingRecord>,
    pub fingerprint: String,
}

impl AccountingExport {
    pub fn new(records: Vec<AccountingRecord>) -> Result<Self, SchemaError> {
        let fingerprint = fingerprint(&records)?;
        Ok(Self {
            version: CURRENT_VERSION,
            records,
            fingerprint,
        })
    }

    /// Recompute the fingerprint and compare it with the stored one.
    pub fn verify(&self) -> Result<(), SchemaError> {
        let actual = fingerprint(&self.records)?;
        if actual != self.fingerprint {
            return Err(SchemaError::FingerprintMismatch {
                expected: self.fingerprint.clone(),
                actual,
            });
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, SchemaError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse an export of any supported version, migrating it to the current one.
    ///
    /// Version 1 exports carry no fingerprint; a fresh one is computed after
    /// migration.
    pub fn from_json(raw: &str) -> Result<Self, SchemaError> {
        let probe: VersionProbe = serde_json::from_str(raw)?;
        match probe.version {
            1 => {
                let legacy: ExportV1 = serde_json::from_str(raw)?;
                let records = legacy.records.into_iter().map(migrate_record).collect();
                Self::new(records)
            }
            CURRENT_VERSION => {
                let export: AccountingExport = serde_json::from_str(raw)?;
                export.verify()?;
                Ok(export)
            }
            other => Err(SchemaError::UnsupportedVersion(other)),
        }
    }
}

/// SHA-256 over the canonical JSON of `records`, hex encoded.
pub fn fingerprint(records: &[AccountingRecord]) -> Result<String, SchemaError> {
    use sha2::{Digest, Sha256};

    let bytes = serde_json::to_vec(records)?;
    let mut hasher = Sha256::new();
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(&bytes);
    Ok(format!("sha256:{}", hex::encode(hasher.finalize())))
}

#[derive(Deserialize)]
struct VersionProbe {
    version: u32,
}

#[derive(Debug, Clone, Deserialize)]
struct ExportV1 {
    records: Vec<RecordV1>,
}

/// Version 1 layout: no pause flag, no claimed-fee counter.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RecordV1 {
    pub investable: InvestableId,
    pub deposit_asset: AssetId,
    pub shares: ShareLedger,
    pub fees: FeesV1,
    #[serde(default)]
    pub limits: InvestmentLimits,
    #[serde(default)]
    pub investables: Option<Vec<InvestableDesc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FeesV1 {
    pub deposit_fee: Bps,
    pub withdrawal_fee: Bps,
    pub performance_fee: Bps,
    pub fee_receiver: Address,
    pub accumulated_fee: u128,
}

/// Upgrade a version 1 record: nothing claimed yet, not paused.
pub fn migrate_record(record: RecordV1) -> AccountingRecord {
    let fees = FeeConfig {
        deposit_fee: record.fees.deposit_fee,
        withdrawal_fee: record.fees.withdrawal_fee,
        performance_fee: record.fees.performance_fee,
        fee_receiver: record.fees.fee_receiver,
        accumulated_fee: record.fees.accumulated_fee,
        claimed_fee: 0,
    };
    AccountingRecord {
        investable: record.investable,
        deposit_asset: record.deposit_asset,
        shares: record.shares,
        fees,
        limits: record.limits,
        paused: false,
        investables: record.investables,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn record() -> AccountingRecord {
        let mut balances = BTreeMap::new();
        balances.insert(Address::new("alice"), 3_000u128);
        AccountingRecord {
            investable: InvestableId::new("leaf"),
            deposit_asset: AssetId::new("USDC"),
            shares: ShareLedger::from_balances(balances).unwrap(),
            fees: FeeConfig::new(Address::new("treasury")),
            limits: InvestmentLimits::unlimited(),
            paused: false,
            investables: None,
        }
    }

    #[test]
    fn test_export_round_trips_through_json() {
        let export = AccountingExport::new(vec![record()]).unwrap();
        let parsed = AccountingExport::from_json(&export.to_json().unwrap()).unwrap();
        assert_eq!(parsed, export);
        assert!(parsed.fingerprint.starts_with("sha256:"));
    }

    #[test]
    fn test_tampered_export_rejected() {
        let mut export = AccountingExport::new(vec![record()]).unwrap();
        export.records[0].fees.accumulated_fee = 1;
        let raw = export.to_json().unwrap();
        assert!(matches!(
            AccountingExport::from_json(&raw),
            Err(SchemaError::FingerprintMismatch { .. })
        ));
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let a = fingerprint(&[record()]).unwrap();
        let mut changed = record();
        changed.paused = true;
        assert_ne!(a, fingerprint(&[changed]).unwrap());
        assert_eq!(a, fingerprint(&[record()]).unwrap());
    }

    #[test]
    fn test_v1_export_migrates() {
        let raw = r#"{
            "version": 1,
            "records": [{
                "investable": "leaf",
                "deposit_asset": "USDC",
                "shares": {"supply": 3000, "balances": {"alice": 3000}},
                "fees": {
                    "deposit_fee": 100,
                    "withdrawal_fee": 0,
                    "performance_fee": 0,
                    "fee_receiver": "treasury",
                    "accumulated_fee": 30
                }
            }]
        }"#;
        let export = AccountingExport::from_json(raw).unwrap();
        assert_eq!(export.version, CURRENT_VERSION);
        let migrated = &export.records[0];
        assert_eq!(migrated.fees.claimed_fee, 0);
        assert_eq!(migrated.fees.accumulated_fee, 30);
        assert_eq!(migrated.fees.deposit_fee, Bps(100));
        assert!(!migrated.paused);
        assert_eq!(migrated.shares.balance_of(&Address::new("alice")), 3_000);
        assert!(export.verify().is_ok());
    }

    #[test]
    fn test_unknown_version_rejected() {
        let raw = r#"{"version": 7, "records": [], "fingerprint": ""}"#;
        assert!(matches!(
            AccountingExport::from_json(raw),
            Err(SchemaError::UnsupportedVersion(7))
        ));
    }
}
