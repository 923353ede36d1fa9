//! Domain types for the vault accounting engine.
//!
//! This module provides:
//! - Integer-safe price handling via the Decimal wrapper
//! - Fixed-point percentages (`Bps`, 1e5 = 100%)
//! - Domain primitives: Address, AssetId, InvestableId, Estimate
//! - Fee, limit and allocation records plus emitted events

pub mod accounting;
pub mod bps;
pub mod decimal;
pub mod event;
pub mod params;
pub mod primitives;

pub use accounting::{AllocationView, AssetBalance, FeeConfig, InvestableDesc, InvestmentLimits};
pub use bps::{mul_div_floor, Bps};
pub use decimal::Decimal;
pub use event::{EmittedEvent, VaultEvent};
pub use params::{params_at, Params};
pub use primitives::{Address, AssetId, Estimate, InvestableId};
