//! Domain primitives: Address, AssetId, InvestableId, Estimate.

use serde::{Deserialize, Serialize};

/// Holder address (user wallet, vault, or position account).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(pub String);

impl Address {
    /// Create an Address from a string.
    pub fn new(addr: impl Into<String>) -> Self {
        Address(addr.into())
    }

    /// Get the address as a string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Asset/token symbol (e.g., "USDC", "WETH").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AssetId(pub String);

impl AssetId {
    pub fn new(asset: impl Into<String>) -> Self {
        AssetId(asset.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AssetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Registry key of an Investable (leaf vault or portfolio).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InvestableId(pub String);

impl InvestableId {
    pub fn new(id: impl Into<String>) -> Self {
        InvestableId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Ledger address that holds this investable's assets and child shares.
    pub fn address(&self) -> Address {
        Address(format!("investable:{}", self.0))
    }

    /// Asset id of this investable's share (investment) token.
    pub fn share_asset(&self) -> AssetId {
        AssetId(format!("{}-shares", self.0))
    }
}

impl std::fmt::Display for InvestableId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Valuation mode: pessimistic (low) or optimistic (high).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Estimate {
    Low,
    High,
}

impl Estimate {
    pub fn from_high_flag(use_high_estimate: bool) -> Self {
        if use_high_estimate {
            Estimate::High
        } else {
            Estimate::Low
        }
    }

    pub fn is_high(&self) -> bool {
        matches!(self, Estimate::High)
    }
}

impl std::fmt::Display for Estimate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Estimate::Low => write!(f, "low"),
            Estimate::High => write!(f, "high"),
        }
    }
}

impl std::str::FromStr for Estimate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Estimate::Low),
            "high" => Ok(Estimate::High),
            other => Err(format!("must be low or high, got {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_investable_addresses_are_distinct_from_users() {
        let id = InvestableId::new("aave-usdc");
        assert_eq!(id.address().to_string(), "investable:aave-usdc");
        assert_ne!(id.address(), Address::new("aave-usdc"));
        assert_eq!(id.share_asset().as_str(), "aave-usdc-shares");
    }

    #[test]
    fn test_estimate_serialization() {
        let json = serde_json::to_string(&Estimate::High).unwrap();
        assert_eq!(json, "\"high\"");
        assert_eq!("low".parse::<Estimate>(), Ok(Estimate::Low));
        assert!("mid".parse::<Estimate>().is_err());
    }

    #[test]
    fn test_estimate_from_flag() {
        assert_eq!(Estimate::from_high_flag(true), Estimate::High);
        assert!(!Estimate::from_high_flag(false).is_high());
    }
}
