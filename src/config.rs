use crate::domain::{Address, Bps, Estimate};
use std::collections::HashMap;
use thiserror::Error;

/// Engine-wide defaults for newly created investables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub deposit_fee: Bps,
    pub withdrawal_fee: Bps,
    pub performance_fee: Bps,
    pub fee_receiver: Address,
    pub total_investment_limit: Option<u128>,
    pub investment_limit_per_address: Option<u128>,
    pub policy: ValuationPolicy,
    /// Allowed gap between actual and target allocation after a rebalance.
    pub rebalance_tolerance: Bps,
}

/// Which valuation estimate each accounting step reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValuationPolicy {
    /// Equity used to price shares on deposit and in previews.
    pub share_price: Estimate,
    /// Estimate used to convert deposited principal into the valuation unit.
    pub principal: Estimate,
    /// Equity used for investment limit checks.
    pub limits: Estimate,
    /// Estimate used to snapshot children during a rebalance.
    pub rebalance: Estimate,
}

impl Default for ValuationPolicy {
    fn default() -> Self {
        Self {
            share_price: Estimate::High,
            principal: Estimate::Low,
            limits: Estimate::High,
            rebalance: Estimate::Low,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            deposit_fee: Bps::ZERO,
            withdrawal_fee: Bps::ZERO,
            performance_fee: Bps::ZERO,
            fee_receiver: Address::new("treasury"),
            total_investment_limit: None,
            investment_limit_per_address: None,
            policy: ValuationPolicy::default(),
            rebalance_tolerance: Bps(5_000),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let defaults = Config::default();

        let deposit_fee = parse_fee(&env_map, "VAULT_DEPOSIT_FEE")?;
        let withdrawal_fee = parse_fee(&env_map, "VAULT_WITHDRAWAL_FEE")?;
        let performance_fee = parse_fee(&env_map, "VAULT_PERFORMANCE_FEE")?;

        let fee_receiver = env_map
            .get("VAULT_FEE_RECEIVER")
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(Address::new)
            .unwrap_or(defaults.fee_receiver);

        let total_investment_limit = parse_limit(&env_map, "VAULT_TOTAL_INVESTMENT_LIMIT")?;
        let investment_limit_per_address =
            parse_limit(&env_map, "VAULT_INVESTMENT_LIMIT_PER_ADDRESS")?;

        let policy = ValuationPolicy {
            share_price: parse_estimate(
                &env_map,
                "VAULT_SHARE_PRICE_ESTIMATE",
                defaults.policy.share_price,
            )?,
            principal: parse_estimate(
                &env_map,
                "VAULT_PRINCIPAL_ESTIMATE",
                defaults.policy.principal,
            )?,
            limits: parse_estimate(&env_map, "VAULT_LIMIT_ESTIMATE", defaults.policy.limits)?,
            rebalance: parse_estimate(
                &env_map,
                "VAULT_REBALANCE_ESTIMATE",
                defaults.policy.rebalance,
            )?,
        };

        let rebalance_tolerance = match env_map.get("VAULT_REBALANCE_TOLERANCE") {
            Some(raw) => {
                let bps = parse_bps(raw, "VAULT_REBALANCE_TOLERANCE")?;
                if bps.value() > Bps::SCALE {
                    return Err(ConfigError::InvalidValue(
                        "VAULT_REBALANCE_TOLERANCE".to_string(),
                        "must not exceed 100000".to_string(),
                    ));
                }
                bps
            }
            None => defaults.rebalance_tolerance,
        };

        Ok(Config {
            deposit_fee,
            withdrawal_fee,
            performance_fee,
            fee_receiver,
            total_investment_limit,
            investment_limit_per_address,
            policy,
            rebalance_tolerance,
        })
    }
}

fn parse_bps(raw: &str, key: &str) -> Result<Bps, ConfigError> {
    raw.trim().parse::<u32>().map(Bps).map_err(|_| {
        ConfigError::InvalidValue(key.to_string(), "must be a valid u32".to_string())
    })
}

fn parse_fee(env_map: &HashMap<String, String>, key: &str) -> Result<Bps, ConfigError> {
    let Some(raw) = env_map.get(key) else {
        return Ok(Bps::ZERO);
    };
    let fee = parse_bps(raw, key)?;
    if !fee.is_valid_fee() {
        return Err(ConfigError::InvalidValue(
            key.to_string(),
            format!("must be below 100000, got {}", fee.value()),
        ));
    }
    Ok(fee)
}

fn parse_limit(env_map: &HashMap<String, String>, key: &str) -> Result<Option<u128>, ConfigError> {
    env_map
        .get(key)
        .map(|raw| {
            raw.trim().parse::<u128>().map_err(|_| {
                ConfigError::InvalidValue(key.to_string(), "must be a valid u128".to_string())
            })
        })
        .transpose()
}

fn parse_estimate(
    env_map: &HashMap<String, String>,
    key: &str,
    default: Estimate,
) -> Result<Estimate, ConfigError> {
    match env_map.get(key) {
        Some(raw) => raw
            .trim()
            .parse::<Estimate>()
            .map_err(|msg| ConfigError::InvalidValue(key.to_string(), msg)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_env_uses_defaults() {
        let config = Config::from_env_map(HashMap::new()).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.policy.share_price, Estimate::High);
        assert_eq!(config.policy.principal, Estimate::Low);
        assert_eq!(config.rebalance_tolerance, Bps(5_000));
    }

    #[test]
    fn test_fee_of_one_hundred_percent_rejected() {
        let mut env_map = HashMap::new();
        env_map.insert("VAULT_WITHDRAWAL_FEE".to_string(), "100000".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "VAULT_WITHDRAWAL_FEE"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_invalid_fee_number() {
        let mut env_map = HashMap::new();
        env_map.insert("VAULT_DEPOSIT_FEE".to_string(), "ten".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "VAULT_DEPOSIT_FEE"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_limits_and_receiver() {
        let mut env_map = HashMap::new();
        env_map.insert("VAULT_TOTAL_INVESTMENT_LIMIT".to_string(), "1000000".to_string());
        env_map.insert("VAULT_FEE_RECEIVER".to_string(), "0xfee".to_string());
        let config = Config::from_env_map(env_map).unwrap();
        assert_eq!(config.total_investment_limit, Some(1_000_000));
        assert_eq!(config.investment_limit_per_address, None);
        assert_eq!(config.fee_receiver, Address::new("0xfee"));
    }

    #[test]
    fn test_invalid_estimate() {
        let mut env_map = HashMap::new();
        env_map.insert("VAULT_LIMIT_ESTIMATE".to_string(), "medium".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "VAULT_LIMIT_ESTIMATE"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_tolerance_above_full_rejected() {
        let mut env_map = HashMap::new();
        env_map.insert("VAULT_REBALANCE_TOLERANCE".to_string(), "100001".to_string());
        assert!(Config::from_env_map(env_map).is_err());
    }
}
