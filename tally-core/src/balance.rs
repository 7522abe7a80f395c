use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Decimal;

/// One append-only running-balance snapshot, written per transaction line.
/// The latest row for an (account, item) pair is the current position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceHistoryRow {
    pub id: i64,
    pub uuid: Uuid,
    pub account_id: i64,
    pub transaction_id: i64,
    pub item_id: Option<i64>,
    pub unit: String,
    /// Running quantity for the (account, item) pair after this line.
    pub quantity: Decimal,
    /// Running accumulated cost (Σ quantity × price).
    pub total_cost: Decimal,
    /// total_cost / quantity when the quantity is non-zero, else zero.
    pub avg_cost: Decimal,
    pub value: Decimal,
    /// The unit price of the line that produced this row.
    pub price: Decimal,
    pub currency: String,
    pub market_value: Decimal,
}

/// The most-recent balance position for an (account, item) pair, enriched
/// with the current market price at fetch time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafBalance {
    pub account_id: i64,
    pub item_id: Option<i64>,
    /// Empty for financial positions.
    pub item_name: String,
    pub unit: String,
    pub quantity: Decimal,
    pub avg_cost: Decimal,
    /// quantity × avg_cost.
    pub value: Decimal,
    /// Zero when the item has no market price recorded.
    pub market_price: Decimal,
    /// quantity × market_price.
    pub market_value: Decimal,
    pub currency: String,
    pub datetime_ms: i64,
    pub transaction_uuid: Uuid,
}

/// Market price update request, referencing the item by UUID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketPriceSpec {
    pub item: Uuid,
    pub price: Decimal,
    pub unit: String,
    pub currency: String,
}

/// A timestamped unit conversion rule; the newest rule for a
/// (from, to) pair is the effective one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitConversion {
    pub from_unit: String,
    pub to_unit: String,
    pub factor: f64,
    pub datetime_ms: i64,
}

/// A timestamped currency conversion rule; newest wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrencyConversion {
    pub from_currency: String,
    pub to_currency: String,
    pub rate: f64,
    pub datetime_ms: i64,
}
