use tally_core::Decimal;
use thiserror::Error;
use uuid::Uuid;

/// Result alias for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Error type surfaced by ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("storage error: {0}")]
    Storage(String),
    #[error("unknown account {0}")]
    UnknownAccount(Uuid),
    #[error("unknown item {0}")]
    UnknownItem(Uuid),
    #[error("unbalanced transaction: {currency} financial lines sum to {residual}")]
    Unbalanced { currency: String, residual: Decimal },
    #[error("account requires a parent; root accounts are fixed at creation")]
    ParentRequired,
    #[error("account tree corrupt: {0}")]
    CorruptTree(String),
    #[error("no database selected")]
    NoCurrentDatabase,
    #[error("arithmetic overflow computing {0}")]
    Arithmetic(&'static str),
}

impl From<rusqlite::Error> for LedgerError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Storage(value.to_string())
    }
}

impl From<std::io::Error> for LedgerError {
    fn from(value: std::io::Error) -> Self {
        Self::Storage(value.to_string())
    }
}
