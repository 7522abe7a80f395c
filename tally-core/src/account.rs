use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reserved root account names, created once per database at schema
/// initialisation. Case-sensitive lowercase.
pub const ROOT_ACCOUNT_NAMES: [&str; 5] = ["asset", "equity", "liability", "income", "expense"];

/// A stored node in the chart of accounts.
///
/// `parent` is a storage-local surrogate index into the account arena;
/// `None` only for the five roots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub uuid: Uuid,
    pub name: String,
    pub parent: Option<i64>,
}

impl Account {
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// Creation request for an account, as carried over the RPC surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSpec {
    pub name: String,
    pub parent: Option<Uuid>,
}

/// A stored item (a thing whose quantity the ledger tracks).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    pub uuid: Uuid,
    pub name: String,
    pub description: String,
    pub unit: String,
}

/// Creation request for an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSpec {
    pub name: String,
    pub description: String,
    pub unit: String,
}
