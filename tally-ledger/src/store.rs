//! Row-level sqlite operations used by the ledger engine.
//!
//! Decimal columns persist the raw backing integer; scanning reconstructs
//! values with the process-global digit configuration.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use tally_core::{
    Account, BalanceHistoryRow, Decimal, Item, LeafBalance, LineInput, ROOT_ACCOUNT_NAMES,
};
use uuid::Uuid;

use crate::{LedgerError, LedgerResult};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    id INTEGER PRIMARY KEY,
    uuid BLOB NOT NULL UNIQUE,
    name TEXT NOT NULL,
    parent_id INTEGER NOT NULL DEFAULT -1
);
CREATE TABLE IF NOT EXISTS items (
    id INTEGER PRIMARY KEY,
    uuid BLOB NOT NULL UNIQUE,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    unit TEXT NOT NULL DEFAULT ''
);
CREATE TABLE IF NOT EXISTS transactions (
    id INTEGER PRIMARY KEY,
    uuid BLOB NOT NULL UNIQUE,
    description TEXT NOT NULL,
    datetime_ms INTEGER NOT NULL,
    year INTEGER NOT NULL,
    month INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS transactions_idx_year_month
    ON transactions(year, month);
CREATE TABLE IF NOT EXISTS transaction_lines (
    id INTEGER PRIMARY KEY,
    uuid BLOB NOT NULL UNIQUE,
    transaction_id INTEGER NOT NULL REFERENCES transactions(id),
    account_id INTEGER NOT NULL REFERENCES accounts(id),
    item_id INTEGER REFERENCES items(id),
    quantity INTEGER NOT NULL,
    unit TEXT NOT NULL DEFAULT '',
    price INTEGER NOT NULL,
    currency TEXT NOT NULL DEFAULT '',
    note TEXT
);
CREATE TABLE IF NOT EXISTS balance_history (
    id INTEGER PRIMARY KEY,
    uuid BLOB NOT NULL UNIQUE,
    account_id INTEGER NOT NULL REFERENCES accounts(id),
    transaction_id INTEGER NOT NULL REFERENCES transactions(id),
    item_id INTEGER REFERENCES items(id),
    unit TEXT NOT NULL DEFAULT '',
    quantity INTEGER NOT NULL,
    total_cost INTEGER NOT NULL,
    avg_cost INTEGER NOT NULL,
    value INTEGER NOT NULL,
    price INTEGER NOT NULL,
    currency TEXT NOT NULL DEFAULT '',
    market_value INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS balance_history_idx_pair
    ON balance_history(account_id, item_id);
CREATE TABLE IF NOT EXISTS market_prices (
    id INTEGER PRIMARY KEY,
    item_id INTEGER NOT NULL REFERENCES items(id),
    datetime_ms INTEGER NOT NULL,
    price INTEGER NOT NULL,
    unit TEXT NOT NULL DEFAULT '',
    currency TEXT NOT NULL DEFAULT ''
);
CREATE INDEX IF NOT EXISTS market_prices_idx_item_time
    ON market_prices(item_id, datetime_ms);
CREATE TABLE IF NOT EXISTS unit_conversions (
    from_unit TEXT NOT NULL,
    to_unit TEXT NOT NULL,
    factor REAL NOT NULL,
    datetime_ms INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS currency_conversions (
    from_currency TEXT NOT NULL,
    to_currency TEXT NOT NULL,
    rate REAL NOT NULL,
    datetime_ms INTEGER NOT NULL
);
"#;

/// Open (creating parent directories as needed) the store file at `path`.
pub fn open_store(path: &Path) -> LedgerResult<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")?;
    Ok(conn)
}

/// Create the schema; safe to run against an already-initialised store.
pub fn init_schema(conn: &Connection) -> LedgerResult<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

/// Seed the five reserved root accounts if the accounts table is empty.
pub fn ensure_root_accounts(conn: &Connection) -> LedgerResult<()> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM accounts", [], |row| row.get(0))?;
    if count > 0 {
        return Ok(());
    }
    for name in ROOT_ACCOUNT_NAMES {
        insert_account(conn, tally_core::new_id(), name, None)?;
    }
    Ok(())
}

pub fn insert_account(
    conn: &Connection,
    uuid: Uuid,
    name: &str,
    parent_id: Option<i64>,
) -> LedgerResult<i64> {
    conn.execute(
        "INSERT INTO accounts (uuid, name, parent_id) VALUES (?1, ?2, ?3)",
        params![uuid.as_bytes().to_vec(), name, parent_id.unwrap_or(-1)],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn account_by_uuid(conn: &Connection, uuid: Uuid) -> LedgerResult<Option<Account>> {
    conn.query_row(
        "SELECT id, uuid, name, parent_id FROM accounts WHERE uuid = ?1",
        params![uuid.as_bytes().to_vec()],
        row_to_account,
    )
    .optional()
    .map_err(Into::into)
}

pub fn fetch_accounts(conn: &Connection) -> LedgerResult<Vec<Account>> {
    let mut stmt = conn.prepare("SELECT id, uuid, name, parent_id FROM accounts ORDER BY id")?;
    let mut rows = stmt.query([])?;
    let mut accounts = Vec::new();
    while let Some(row) = rows.next()? {
        accounts.push(row_to_account(row)?);
    }
    Ok(accounts)
}

pub fn insert_item(
    conn: &Connection,
    uuid: Uuid,
    name: &str,
    description: &str,
    unit: &str,
) -> LedgerResult<i64> {
    conn.execute(
        "INSERT INTO items (uuid, name, description, unit) VALUES (?1, ?2, ?3, ?4)",
        params![uuid.as_bytes().to_vec(), name, description, unit],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn item_by_uuid(conn: &Connection, uuid: Uuid) -> LedgerResult<Option<Item>> {
    conn.query_row(
        "SELECT id, uuid, name, description, unit FROM items WHERE uuid = ?1",
        params![uuid.as_bytes().to_vec()],
        |row| {
            Ok(Item {
                id: row.get(0)?,
                uuid: uuid_column(row, 1)?,
                name: row.get(2)?,
                description: row.get(3)?,
                unit: row.get(4)?,
            })
        },
    )
    .optional()
    .map_err(Into::into)
}

pub fn insert_transaction_row(
    conn: &Connection,
    uuid: Uuid,
    description: &str,
    datetime_ms: i64,
    year: i32,
    month: u32,
) -> LedgerResult<i64> {
    conn.execute(
        "INSERT INTO transactions (uuid, description, datetime_ms, year, month)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![uuid.as_bytes().to_vec(), description, datetime_ms, year, month],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_line_row(
    conn: &Connection,
    uuid: Uuid,
    transaction_id: i64,
    account_id: i64,
    item_id: Option<i64>,
    line: &LineInput,
) -> LedgerResult<i64> {
    conn.execute(
        "INSERT INTO transaction_lines (
            uuid, transaction_id, account_id, item_id, quantity, unit, price, currency, note
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            uuid.as_bytes().to_vec(),
            transaction_id,
            account_id,
            item_id,
            line.quantity.raw(),
            line.unit,
            line.price.raw(),
            line.currency,
            line.note,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// The most recent running (quantity, total_cost) for an (account, item)
/// pair at or before `up_to_ms`. The bound is inclusive and ties break by
/// insertion order, so later lines of one transaction see earlier ones.
pub fn previous_balance(
    conn: &Connection,
    account_id: i64,
    item_id: Option<i64>,
    up_to_ms: i64,
) -> LedgerResult<Option<(Decimal, Decimal)>> {
    conn.query_row(
        "SELECT b.quantity, b.total_cost
         FROM balance_history b
         JOIN transactions t ON t.id = b.transaction_id
         WHERE b.account_id = ?1 AND b.item_id IS ?2 AND t.datetime_ms <= ?3
         ORDER BY t.datetime_ms DESC, b.id DESC
         LIMIT 1",
        params![account_id, item_id, up_to_ms],
        |row| {
            Ok((
                Decimal::new(row.get::<_, i64>(0)?),
                Decimal::new(row.get::<_, i64>(1)?),
            ))
        },
    )
    .optional()
    .map_err(Into::into)
}

#[allow(clippy::too_many_arguments)]
pub fn insert_history_row(
    conn: &Connection,
    uuid: Uuid,
    account_id: i64,
    transaction_id: i64,
    item_id: Option<i64>,
    unit: &str,
    quantity: Decimal,
    total_cost: Decimal,
    avg_cost: Decimal,
    value: Decimal,
    price: Decimal,
    currency: &str,
) -> LedgerResult<i64> {
    conn.execute(
        "INSERT INTO balance_history (
            uuid, account_id, transaction_id, item_id, unit,
            quantity, total_cost, avg_cost, value, price, currency, market_value
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 0)",
        params![
            uuid.as_bytes().to_vec(),
            account_id,
            transaction_id,
            item_id,
            unit,
            quantity.raw(),
            total_cost.raw(),
            avg_cost.raw(),
            value.raw(),
            price.raw(),
            currency,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_market_price(
    conn: &Connection,
    item_id: i64,
    datetime_ms: i64,
    price: Decimal,
    unit: &str,
    currency: &str,
) -> LedgerResult<()> {
    conn.execute(
        "INSERT INTO market_prices (item_id, datetime_ms, price, unit, currency)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![item_id, datetime_ms, price.raw(), unit, currency],
    )?;
    Ok(())
}

/// Every balance snapshot for an (account, item) pair in application order.
pub fn fetch_balance_history(
    conn: &Connection,
    account_id: i64,
    item_id: Option<i64>,
) -> LedgerResult<Vec<BalanceHistoryRow>> {
    let mut stmt = conn.prepare(
        "SELECT b.id, b.uuid, b.account_id, b.transaction_id, b.item_id, b.unit,
                b.quantity, b.total_cost, b.avg_cost, b.value, b.price, b.currency,
                b.market_value
         FROM balance_history b
         JOIN transactions t ON t.id = b.transaction_id
         WHERE b.account_id = ?1 AND b.item_id IS ?2
         ORDER BY t.datetime_ms ASC, b.id ASC",
    )?;
    let mut rows = stmt.query(params![account_id, item_id])?;
    let mut history = Vec::new();
    while let Some(row) = rows.next()? {
        history.push(BalanceHistoryRow {
            id: row.get(0)?,
            uuid: uuid_column(row, 1)?,
            account_id: row.get(2)?,
            transaction_id: row.get(3)?,
            item_id: row.get(4)?,
            unit: row.get(5)?,
            quantity: Decimal::new(row.get::<_, i64>(6)?),
            total_cost: Decimal::new(row.get::<_, i64>(7)?),
            avg_cost: Decimal::new(row.get::<_, i64>(8)?),
            value: Decimal::new(row.get::<_, i64>(9)?),
            price: Decimal::new(row.get::<_, i64>(10)?),
            currency: row.get(11)?,
            market_value: Decimal::new(row.get::<_, i64>(12)?),
        });
    }
    Ok(history)
}

/// The market price row with the greatest timestamp for an item.
pub fn latest_market_price(conn: &Connection, item_id: i64) -> LedgerResult<Option<Decimal>> {
    conn.query_row(
        "SELECT price FROM market_prices
         WHERE item_id = ?1
         ORDER BY datetime_ms DESC, id DESC
         LIMIT 1",
        params![item_id],
        |row| Ok(Decimal::new(row.get::<_, i64>(0)?)),
    )
    .optional()
    .map_err(Into::into)
}

/// Fetch the most-recent balance row per (account, item) pair, enriched with
/// the current market price. Items with no recorded price report a market
/// price and market value of zero.
pub fn fetch_leaf_balances(conn: &Connection) -> LedgerResult<Vec<LeafBalance>> {
    let mut stmt = conn.prepare(
        "SELECT b.account_id, b.item_id, COALESCE(i.name, ''), b.unit,
                b.quantity, b.avg_cost, b.currency, t.datetime_ms, t.uuid
         FROM balance_history b
         JOIN transactions t ON t.id = b.transaction_id
         LEFT JOIN items i ON i.id = b.item_id
         ORDER BY t.datetime_ms DESC, b.id DESC",
    )?;
    let mut rows = stmt.query([])?;

    let mut seen: std::collections::HashSet<(i64, Option<i64>)> = std::collections::HashSet::new();
    let mut price_cache: HashMap<i64, Decimal> = HashMap::new();
    let mut leaves = Vec::new();
    while let Some(row) = rows.next()? {
        let account_id: i64 = row.get(0)?;
        let item_id: Option<i64> = row.get(1)?;
        if !seen.insert((account_id, item_id)) {
            continue;
        }
        let quantity = Decimal::new(row.get::<_, i64>(4)?);
        let avg_cost = Decimal::new(row.get::<_, i64>(5)?);
        let value = quantity
            .checked_mul(avg_cost)
            .ok_or(LedgerError::Arithmetic("leaf value"))?;

        let market_price = match item_id {
            Some(item_id) => match price_cache.get(&item_id) {
                Some(price) => *price,
                None => {
                    let price = latest_market_price(conn, item_id)?.unwrap_or(Decimal::ZERO);
                    price_cache.insert(item_id, price);
                    price
                }
            },
            None => Decimal::ZERO,
        };
        let market_value = quantity
            .checked_mul(market_price)
            .ok_or(LedgerError::Arithmetic("market value"))?;

        leaves.push(LeafBalance {
            account_id,
            item_id,
            item_name: row.get(2)?,
            unit: row.get(3)?,
            quantity,
            avg_cost,
            value,
            market_price,
            market_value,
            currency: row.get(6)?,
            datetime_ms: row.get(7)?,
            transaction_uuid: uuid_column(row, 8)?,
        });
    }
    Ok(leaves)
}

fn row_to_account(row: &rusqlite::Row<'_>) -> rusqlite::Result<Account> {
    let parent_id: i64 = row.get(3)?;
    Ok(Account {
        id: row.get(0)?,
        uuid: uuid_column(row, 1)?,
        name: row.get(2)?,
        parent: (parent_id >= 0).then_some(parent_id),
    })
}

fn uuid_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let bytes: Vec<u8> = row.get(idx)?;
    Uuid::from_slice(&bytes).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Blob,
            Box::new(err),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open_test_store() -> (tempfile::TempDir, Connection) {
        let dir = tempdir().unwrap();
        let conn = open_store(&dir.path().join("inventory.db")).unwrap();
        init_schema(&conn).unwrap();
        ensure_root_accounts(&conn).unwrap();
        (dir, conn)
    }

    #[test]
    fn schema_seeds_five_roots_once() {
        let (_dir, conn) = open_test_store();
        let accounts = fetch_accounts(&conn).unwrap();
        assert_eq!(accounts.len(), 5);
        assert!(accounts.iter().all(|account| account.is_root()));

        // Re-running init is a no-op.
        init_schema(&conn).unwrap();
        ensure_root_accounts(&conn).unwrap();
        assert_eq!(fetch_accounts(&conn).unwrap().len(), 5);
    }

    #[test]
    fn account_round_trip_by_uuid() {
        let (_dir, conn) = open_test_store();
        let roots = fetch_accounts(&conn).unwrap();
        let asset = roots.iter().find(|a| a.name == "asset").unwrap();

        let uuid = tally_core::new_id();
        let id = insert_account(&conn, uuid, "cash", Some(asset.id)).unwrap();
        let loaded = account_by_uuid(&conn, uuid).unwrap().unwrap();
        assert_eq!(loaded.id, id);
        assert_eq!(loaded.name, "cash");
        assert_eq!(loaded.parent, Some(asset.id));

        assert!(account_by_uuid(&conn, tally_core::new_id())
            .unwrap()
            .is_none());
    }

    #[test]
    fn latest_market_price_wins() {
        let (_dir, conn) = open_test_store();
        let item_uuid = tally_core::new_id();
        let item_id = insert_item(&conn, item_uuid, "steel", "", "kg").unwrap();

        assert!(latest_market_price(&conn, item_id).unwrap().is_none());
        insert_market_price(&conn, item_id, 1_000, Decimal::new(50_000), "kg", "USD").unwrap();
        insert_market_price(&conn, item_id, 2_000, Decimal::new(60_000), "kg", "USD").unwrap();
        assert_eq!(
            latest_market_price(&conn, item_id).unwrap(),
            Some(Decimal::new(60_000))
        );
    }
}
