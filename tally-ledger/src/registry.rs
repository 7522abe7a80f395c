//! Open-database registry and the per-database handle.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;
use tally_core::{
    set_decimal_digits, Account, AccountSpec, ItemSpec, MarketPriceSpec, TransactionInput,
    ROOT_ACCOUNT_NAMES,
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    build_account_tree, engine, rollup, store, LedgerError, LedgerResult, RuntimeConfig,
};

/// Store file name inside each database directory.
pub const STORE_FILE: &str = "inventory.db";

/// One open ledger database. Every operation takes an exclusive lease on
/// the underlying connection, so applies against a single database are
/// serialised while different databases proceed independently.
#[derive(Debug)]
pub struct LedgerDb {
    uuid: Uuid,
    conn: Mutex<Connection>,
}

impl LedgerDb {
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    fn lease(&self) -> LedgerResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| LedgerError::Storage("poisoned database lease".into()))
    }

    pub fn add_account(&self, spec: &AccountSpec) -> LedgerResult<Uuid> {
        let conn = self.lease()?;
        engine::add_account(&conn, spec)
    }

    pub fn add_item(&self, spec: &ItemSpec) -> LedgerResult<Uuid> {
        let conn = self.lease()?;
        engine::add_item(&conn, spec)
    }

    pub fn apply_transaction(&self, input: &TransactionInput) -> LedgerResult<Uuid> {
        let mut conn = self.lease()?;
        engine::apply_transaction(&mut conn, input)
    }

    pub fn update_market_price(&self, spec: &MarketPriceSpec) -> LedgerResult<()> {
        let conn = self.lease()?;
        engine::update_market_price(&conn, spec)
    }

    /// The five root accounts, in reserved-name order.
    pub fn main_accounts(&self) -> LedgerResult<Vec<Account>> {
        let conn = self.lease()?;
        let tree = build_account_tree(&conn)?;
        ROOT_ACCOUNT_NAMES
            .iter()
            .map(|name| {
                tree.root(name).cloned().ok_or_else(|| {
                    LedgerError::CorruptTree(format!("missing root account `{name}`"))
                })
            })
            .collect()
    }

    /// Historical-cost report over the full account tree.
    pub fn balances_report(&self) -> LedgerResult<String> {
        let conn = self.lease()?;
        let tree = build_account_tree(&conn)?;
        let leaves = store::fetch_leaf_balances(&conn)?;
        let rolled = rollup::rollup(&leaves, &tree)?;
        Ok(rollup::render_historical(&rolled, &tree))
    }

    /// Market-value report over the full account tree.
    pub fn market_report(&self) -> LedgerResult<String> {
        let conn = self.lease()?;
        let tree = build_account_tree(&conn)?;
        let leaves = store::fetch_leaf_balances(&conn)?;
        let rolled = rollup::rollup(&leaves, &tree)?;
        Ok(rollup::render_market(&rolled))
    }
}

/// The process's view of its ledger databases: prefix directory, open
/// handles keyed by identifier, and the current selection. Owned by the
/// application's top-level composition; tests build independent runtimes.
#[derive(Debug)]
pub struct LedgerRuntime {
    prefix: PathBuf,
    dbs: HashMap<Uuid, Arc<LedgerDb>>,
    current: Option<Arc<LedgerDb>>,
}

impl LedgerRuntime {
    pub fn new(config: RuntimeConfig) -> Self {
        set_decimal_digits(config.decimal_digits);
        Self {
            prefix: config.prefix,
            dbs: HashMap::new(),
            current: None,
        }
    }

    /// Open (or create) the database for `id`, select it as current, and
    /// return its identifier. A cached handle is reused without touching
    /// the schema; a fresh store file is initialised and seeded with the
    /// five roots.
    pub fn open_or_create(&mut self, id: Option<Uuid>) -> LedgerResult<Uuid> {
        let id = id.unwrap_or_else(tally_core::new_id);
        if let Some(db) = self.dbs.get(&id) {
            self.current = Some(db.clone());
            debug!(%id, "selected cached database");
            return Ok(id);
        }

        let dir = self.prefix.join(id.to_string());
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }
        let path = dir.join(STORE_FILE);
        let fresh = !path.exists();
        let conn = store::open_store(&path)?;
        if fresh {
            store::init_schema(&conn)?;
            store::ensure_root_accounts(&conn)?;
            info!(%id, "initialised new ledger database");
        }
        // Validates roots and parent links even for pre-existing stores.
        build_account_tree(&conn)?;

        let db = Arc::new(LedgerDb {
            uuid: id,
            conn: Mutex::new(conn),
        });
        self.dbs.insert(id, db.clone());
        self.current = Some(db);
        Ok(id)
    }

    /// The currently selected database, if any.
    pub fn current(&self) -> Option<Arc<LedgerDb>> {
        self.current.clone()
    }

    /// Identifier of the current selection, resolved by scanning the
    /// registry for the selected handle.
    pub fn current_uuid(&self) -> Option<Uuid> {
        let current = self.current.as_ref()?;
        self.dbs
            .iter()
            .find(|(_, db)| Arc::ptr_eq(db, current))
            .map(|(id, _)| *id)
    }

    /// Remove the current database from the registry and drop the
    /// selection; the store closes once the last handle goes away.
    pub fn close_current(&mut self) -> LedgerResult<()> {
        let current = self.current.take().ok_or(LedgerError::NoCurrentDatabase)?;
        let id = current.uuid();
        self.dbs.remove(&id);
        info!(%id, "closed database");
        Ok(())
    }

    /// Open every subdirectory of the prefix whose name parses as an
    /// identifier. Returns the number of databases now registered.
    pub fn load_db_map(&mut self) -> LedgerResult<usize> {
        if !self.prefix.exists() {
            return Ok(self.dbs.len());
        }
        for entry in fs::read_dir(&self.prefix)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            let Ok(id) = Uuid::parse_str(&name) else {
                continue;
            };
            self.open_or_create(Some(id))?;
        }
        Ok(self.dbs.len())
    }
}
