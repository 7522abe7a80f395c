//! Core data model shared by the tally ledger engine and its RPC surface.

mod account;
mod balance;
mod decimal;
mod ids;
mod transaction;

pub use account::{Account, AccountSpec, Item, ItemSpec, ROOT_ACCOUNT_NAMES};
pub use balance::{
    BalanceHistoryRow, CurrencyConversion, LeafBalance, MarketPriceSpec, UnitConversion,
};
pub use decimal::{decimal_digits, set_decimal_digits, Decimal};
pub use ids::new_id;
pub use transaction::{LineInput, TransactionInput};
