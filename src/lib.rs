pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod oracle;
pub mod position;
pub mod scenario;
pub mod schema;

pub use config::{Config, ValuationPolicy};
pub use domain::{
    Address, AssetId, Bps, Decimal, EmittedEvent, Estimate, InvestableDesc, InvestableId,
    InvestmentLimits, Params, VaultEvent,
};
pub use engine::{Engine, VaultSpec, VaultSummary};
pub use error::VaultError;
pub use ledger::{ShareLedger, TokenLedger};
pub use oracle::{OracleError, PriceOracle, ValuationOracle};
pub use position::{Fraction, MockPosition, Position, PositionError};
pub use schema::{AccountingExport, SchemaError};
