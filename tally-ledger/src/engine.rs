//! Transactional application of ledger operations.

use chrono::{Datelike, TimeZone, Utc};
use rusqlite::Connection;
use tally_core::{new_id, AccountSpec, Decimal, ItemSpec, MarketPriceSpec, TransactionInput};
use tracing::debug;
use uuid::Uuid;

use crate::{store, LedgerError, LedgerResult};

/// Create an account under an existing parent. The five roots are fixed at
/// schema initialisation, so a parent is always required here.
pub fn add_account(conn: &Connection, spec: &AccountSpec) -> LedgerResult<Uuid> {
    let parent_uuid = spec.parent.ok_or(LedgerError::ParentRequired)?;
    let parent = store::account_by_uuid(conn, parent_uuid)?
        .ok_or(LedgerError::UnknownAccount(parent_uuid))?;
    let uuid = new_id();
    store::insert_account(conn, uuid, &spec.name, Some(parent.id))?;
    Ok(uuid)
}

pub fn add_item(conn: &Connection, spec: &ItemSpec) -> LedgerResult<Uuid> {
    let uuid = new_id();
    store::insert_item(conn, uuid, &spec.name, &spec.description, &spec.unit)?;
    Ok(uuid)
}

/// Apply a balanced transaction atomically.
///
/// Lines are applied in list order; each line's running-balance snapshot is
/// visible to later lines of the same transaction through the inclusive
/// timestamp lookup. Any failure rolls back the header, every line, and
/// every history row.
pub fn apply_transaction(conn: &mut Connection, input: &TransactionInput) -> LedgerResult<Uuid> {
    if let Some((currency, residual)) = input.financial_imbalances().into_iter().next() {
        return Err(LedgerError::Unbalanced { currency, residual });
    }
    let when = Utc
        .timestamp_millis_opt(input.datetime_ms)
        .single()
        .ok_or(LedgerError::Arithmetic("transaction timestamp"))?;

    let tx = conn.transaction()?;
    let tx_uuid = new_id();
    let tx_id = store::insert_transaction_row(
        &tx,
        tx_uuid,
        &input.description,
        input.datetime_ms,
        when.year(),
        when.month(),
    )?;

    for line in &input.lines {
        let account = store::account_by_uuid(&tx, line.account)?
            .ok_or(LedgerError::UnknownAccount(line.account))?;
        let item_id = match line.item {
            Some(item_uuid) => Some(
                store::item_by_uuid(&tx, item_uuid)?
                    .ok_or(LedgerError::UnknownItem(item_uuid))?
                    .id,
            ),
            None => None,
        };
        store::insert_line_row(&tx, new_id(), tx_id, account.id, item_id, line)?;

        let (prev_qty, prev_total) =
            store::previous_balance(&tx, account.id, item_id, input.datetime_ms)?
                .unwrap_or((Decimal::ZERO, Decimal::ZERO));
        let new_qty = prev_qty
            .checked_add(line.quantity)
            .ok_or(LedgerError::Arithmetic("running quantity"))?;
        let line_cost = line
            .quantity
            .checked_mul(line.price)
            .ok_or(LedgerError::Arithmetic("line cost"))?;
        let new_total = prev_total
            .checked_add(line_cost)
            .ok_or(LedgerError::Arithmetic("running cost"))?;
        let avg_cost = if new_qty.is_zero() {
            Decimal::ZERO
        } else {
            new_total
                .checked_div(new_qty)
                .ok_or(LedgerError::Arithmetic("average cost"))?
        };
        let value = new_qty
            .checked_mul(avg_cost)
            .ok_or(LedgerError::Arithmetic("position value"))?;

        store::insert_history_row(
            &tx,
            new_id(),
            account.id,
            tx_id,
            item_id,
            &line.unit,
            new_qty,
            new_total,
            avg_cost,
            value,
            line.price,
            &line.currency,
        )?;
    }

    tx.commit()?;
    debug!(%tx_uuid, lines = input.lines.len(), "transaction applied");
    Ok(tx_uuid)
}

/// Record a new market price for an item, stamped with the current time.
/// Queries always pick the most recent row, so no deduplication happens.
pub fn update_market_price(conn: &Connection, spec: &MarketPriceSpec) -> LedgerResult<()> {
    let item = store::item_by_uuid(conn, spec.item)?.ok_or(LedgerError::UnknownItem(spec.item))?;
    let stamped_ms = Utc::now().timestamp_millis();
    store::insert_market_price(conn, item.id, stamped_ms, spec.price, &spec.unit, &spec.currency)
}
