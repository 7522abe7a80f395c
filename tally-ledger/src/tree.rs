//! Materialised view of the chart of accounts.

use std::collections::HashMap;

use rusqlite::Connection;
use tally_core::{Account, ROOT_ACCOUNT_NAMES};
use uuid::Uuid;

use crate::{store, LedgerError, LedgerResult};

/// The resolved account forest: an arena keyed by surrogate id, the
/// root-to-leaf name path per account, and handles for the five reserved
/// roots.
#[derive(Debug, Clone)]
pub struct AccountTree {
    accounts: HashMap<i64, Account>,
    by_uuid: HashMap<Uuid, i64>,
    paths: HashMap<i64, Vec<String>>,
    roots: HashMap<&'static str, i64>,
}

/// Scan every account, resolve parent links, and compute all paths.
///
/// Cycles, orphan parent references, and missing or duplicated reserved
/// roots are fatal data errors.
pub fn build_account_tree(conn: &Connection) -> LedgerResult<AccountTree> {
    let accounts = store::fetch_accounts(conn)?;

    let mut arena: HashMap<i64, Account> = HashMap::with_capacity(accounts.len());
    let mut by_uuid: HashMap<Uuid, i64> = HashMap::with_capacity(accounts.len());
    for account in accounts {
        by_uuid.insert(account.uuid, account.id);
        arena.insert(account.id, account);
    }

    let mut roots: HashMap<&'static str, i64> = HashMap::new();
    for name in ROOT_ACCOUNT_NAMES {
        let mut matches = arena
            .values()
            .filter(|account| account.is_root() && account.name == name);
        let root = matches
            .next()
            .ok_or_else(|| LedgerError::CorruptTree(format!("missing root account `{name}`")))?;
        if matches.next().is_some() {
            return Err(LedgerError::CorruptTree(format!(
                "duplicate root account `{name}`"
            )));
        }
        roots.insert(name, root.id);
    }

    let mut paths: HashMap<i64, Vec<String>> = HashMap::with_capacity(arena.len());
    for account in arena.values() {
        let mut path = Vec::new();
        let mut cursor = Some(account.id);
        let mut steps = 0usize;
        while let Some(id) = cursor {
            steps += 1;
            if steps > arena.len() {
                return Err(LedgerError::CorruptTree(format!(
                    "parent cycle reached from account `{}`",
                    account.name
                )));
            }
            let node = arena.get(&id).ok_or_else(|| {
                LedgerError::CorruptTree(format!(
                    "account `{}` references unknown parent {id}",
                    account.name
                ))
            })?;
            path.push(node.name.clone());
            cursor = node.parent;
        }
        path.reverse();
        paths.insert(account.id, path);
    }

    Ok(AccountTree {
        accounts: arena,
        by_uuid,
        paths,
        roots,
    })
}

impl AccountTree {
    pub fn account(&self, id: i64) -> Option<&Account> {
        self.accounts.get(&id)
    }

    pub fn account_by_uuid(&self, uuid: Uuid) -> Option<&Account> {
        self.by_uuid.get(&uuid).and_then(|id| self.accounts.get(id))
    }

    /// The ordered root-to-leaf name path for an account.
    pub fn path(&self, id: i64) -> Option<&[String]> {
        self.paths.get(&id).map(Vec::as_slice)
    }

    /// Handle for one of the five reserved roots.
    pub fn root(&self, name: &str) -> Option<&Account> {
        self.roots.get(name).and_then(|id| self.accounts.get(id))
    }

    /// Walk the parent chain from `id`; true when `ancestor` is reached,
    /// false at a root.
    pub fn is_child_of_or_itself(&self, id: i64, ancestor: i64) -> bool {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.accounts.get(&current).and_then(|node| node.parent);
        }
        false
    }
}
