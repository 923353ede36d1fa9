//! Valuation oracle abstraction.

use crate::domain::{AssetId, Decimal, Estimate};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Prices an amount of an asset in the common valuation unit.
///
/// Implementations may quote a pessimistic (`Low`) and optimistic (`High`)
/// value; callers pick one estimate per snapshot and stick to it.
pub trait ValuationOracle: fmt::Debug {
    fn valuate(&self, asset: &AssetId, amount: u128, estimate: Estimate)
        -> Result<u128, OracleError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    #[error("no price for asset {0}")]
    UnknownAsset(AssetId),
    #[error("valuation of {amount} {asset} overflows")]
    Overflow { asset: AssetId, amount: u128 },
    #[error("oracle unavailable: {0}")]
    Unavailable(String),
}

/// Low/high price pair for one asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceQuote {
    pub low: Decimal,
    pub high: Decimal,
}

impl PriceQuote {
    pub fn flat(price: Decimal) -> Self {
        Self {
            low: price,
            high: price,
        }
    }

    pub fn price(&self, estimate: Estimate) -> Decimal {
        match estimate {
            Estimate::Low => self.low,
            Estimate::High => self.high,
        }
    }
}

/// Oracle backed by a fixed price table.
#[derive(Debug, Clone, Default)]
pub struct PriceOracle {
    quotes: HashMap<AssetId, PriceQuote>,
    offline: bool,
}

impl PriceOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Quote an asset at a single price for both estimates.
    pub fn with_price(mut self, asset: AssetId, price: Decimal) -> Self {
        self.set_quote(asset, PriceQuote::flat(price));
        self
    }

    /// Quote an asset with distinct low and high prices.
    pub fn with_spread(mut self, asset: AssetId, low: Decimal, high: Decimal) -> Self {
        self.set_quote(asset, PriceQuote { low, high });
        self
    }

    pub fn set_quote(&mut self, asset: AssetId, quote: PriceQuote) {
        self.quotes.insert(asset, quote);
    }

    /// Make every valuation fail, as a dead feed would.
    pub fn set_offline(&mut self, offline: bool) {
        self.offline = offline;
    }
}

impl ValuationOracle for PriceOracle {
    fn valuate(
        &self,
        asset: &AssetId,
        amount: u128,
        estimate: Estimate,
    ) -> Result<u128, OracleError> {
        if self.offline {
            return Err(OracleError::Unavailable("price feed offline".to_string()));
        }
        if amount == 0 {
            return Ok(0);
        }
        let quote = self
            .quotes
            .get(asset)
            .ok_or_else(|| OracleError::UnknownAsset(asset.clone()))?;
        quote
            .price(estimate)
            .mul_floor(amount)
            .ok_or_else(|| OracleError::Overflow {
                asset: asset.clone(),
                amount,
            })
    }
}
