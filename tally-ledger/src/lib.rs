//! Ledger engine and storage backend for the tally runtime.

mod config;
mod convert;
mod engine;
mod error;
mod registry;
mod rollup;
mod store;
mod tree;

pub use config::RuntimeConfig;
pub use convert::{
    add_currency_conversion, add_unit_conversion, convert_currency, convert_unit, currency_rate,
    unit_factor,
};
pub use engine::{add_account, add_item, apply_transaction, update_market_price};
pub use error::{LedgerError, LedgerResult};
pub use registry::{LedgerDb, LedgerRuntime, STORE_FILE};
pub use rollup::{render_historical, render_market, rollup, RollupEntry};
pub use store::{fetch_balance_history, fetch_leaf_balances};
pub use tree::{build_account_tree, AccountTree};
