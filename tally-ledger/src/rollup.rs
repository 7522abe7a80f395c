//! Aggregation of leaf balances along every ancestor path, and the two
//! rendered reports.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{TimeZone, Utc};
use tally_core::{Decimal, LeafBalance};
use uuid::Uuid;

use crate::{AccountTree, LedgerError, LedgerResult};

/// One aggregated row, keyed by `<joined path> <item name>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollupEntry {
    pub path: Vec<String>,
    pub item_name: String,
    pub quantity: Decimal,
    pub value: Decimal,
    pub market_value: Decimal,
    pub currency: String,
    pub datetime_ms: i64,
    /// Account of the last leaf merged into this key; used for the
    /// presentation sign rule.
    pub account_id: i64,
    pub transaction_uuid: Uuid,
}

/// Aggregate each leaf into every prefix of its account's path. Keys sort
/// lexicographically, which fixes the report order.
pub fn rollup(
    leaves: &[LeafBalance],
    tree: &AccountTree,
) -> LedgerResult<BTreeMap<String, RollupEntry>> {
    let mut rolled: BTreeMap<String, RollupEntry> = BTreeMap::new();
    for leaf in leaves {
        let path = tree.path(leaf.account_id).ok_or_else(|| {
            LedgerError::CorruptTree(format!("balance references unknown account {}", leaf.account_id))
        })?;
        for prefix_len in 1..=path.len() {
            let prefix = &path[..prefix_len];
            let key = format!("{} {}", prefix.join(" > "), leaf.item_name);
            let entry = rolled.entry(key).or_insert_with(|| RollupEntry {
                path: prefix.to_vec(),
                item_name: leaf.item_name.clone(),
                quantity: Decimal::ZERO,
                value: Decimal::ZERO,
                market_value: Decimal::ZERO,
                currency: String::new(),
                datetime_ms: 0,
                account_id: leaf.account_id,
                transaction_uuid: leaf.transaction_uuid,
            });
            entry.quantity = entry.quantity + leaf.quantity;
            entry.value = entry.value + leaf.value;
            entry.market_value = entry.market_value + leaf.market_value;
            entry.currency = leaf.currency.clone();
            entry.datetime_ms = leaf.datetime_ms;
            entry.account_id = leaf.account_id;
            entry.transaction_uuid = leaf.transaction_uuid;
        }
    }
    Ok(rolled)
}

/// Liability, Equity, and Income positions display negated; storage keeps
/// the signed totals.
fn displays_negated(tree: &AccountTree, account_id: i64) -> bool {
    ["liability", "equity", "income"].iter().any(|name| {
        tree.root(name)
            .is_some_and(|root| tree.is_child_of_or_itself(account_id, root.id))
    })
}

pub fn render_historical(rolled: &BTreeMap<String, RollupEntry>, tree: &AccountTree) -> String {
    let mut out = String::from("=== Historical Cost Balances ===\n");
    for (key, entry) in rolled {
        let (quantity, value) = if displays_negated(tree, entry.account_id) {
            (-entry.quantity, -entry.value)
        } else {
            (entry.quantity, entry.value)
        };
        let as_of = Utc
            .timestamp_millis_opt(entry.datetime_ms)
            .single()
            .map(|when| when.to_string())
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "{key} | Qty {:.2} | Value {:.2} | as of {as_of}",
            quantity.to_float(),
            value.to_float(),
        );
    }
    out
}

pub fn render_market(rolled: &BTreeMap<String, RollupEntry>) -> String {
    let mut out = String::from("=== Market Value Balances ===\n");
    for (key, entry) in rolled {
        let _ = writeln!(
            out,
            "{key} | Qty {:.2} | MarketValue {:.2} {}",
            entry.quantity.to_float(),
            entry.market_value.to_float(),
            entry.currency,
        );
    }
    out
}
