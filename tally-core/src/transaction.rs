use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Decimal;

/// A transaction to be applied, referencing accounts and items by UUID.
/// Lines are applied in list order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionInput {
    pub description: String,
    pub datetime_ms: i64,
    pub lines: Vec<LineInput>,
}

impl TransactionInput {
    pub fn new(description: impl Into<String>, datetime_ms: i64) -> Self {
        Self {
            description: description.into(),
            datetime_ms,
            lines: Vec::new(),
        }
    }

    pub fn with_lines(mut self, lines: Vec<LineInput>) -> Self {
        self.lines = lines;
        self
    }

    /// Per-currency sums of the financial lines that are not zero.
    /// An empty result means the transaction balances.
    pub fn financial_imbalances(&self) -> Vec<(String, Decimal)> {
        let mut sums: BTreeMap<&str, Decimal> = BTreeMap::new();
        for line in self.lines.iter().filter(|l| l.item.is_none()) {
            let entry = sums.entry(line.currency.as_str()).or_insert(Decimal::ZERO);
            *entry = *entry + line.quantity;
        }
        sums.into_iter()
            .filter(|(_, sum)| !sum.is_zero())
            .map(|(currency, sum)| (currency.to_string(), sum))
            .collect()
    }
}

/// One line of a transaction.
///
/// Inventory lines carry an item and a real unit price; financial lines
/// carry no item and store the signed amount (debit − credit) as the
/// quantity with a unit price of one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineInput {
    pub account: Uuid,
    pub item: Option<Uuid>,
    pub quantity: Decimal,
    pub unit: String,
    pub price: Decimal,
    pub currency: String,
    pub note: Option<String>,
}

impl LineInput {
    /// An inventory movement: positive quantity increases the account's
    /// holdings of the item.
    pub fn inventory(
        account: Uuid,
        item: Uuid,
        quantity: Decimal,
        unit: impl Into<String>,
        price: Decimal,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            account,
            item: Some(item),
            quantity,
            unit: unit.into(),
            price,
            currency: currency.into(),
            note: None,
        }
    }

    /// A monetary movement: quantity = debit − credit, priced at one so the
    /// running value tracks the signed amount.
    pub fn financial(
        account: Uuid,
        debit: Decimal,
        credit: Decimal,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            account,
            item: None,
            quantity: debit - credit,
            unit: String::new(),
            price: Decimal::one(),
            currency: currency.into(),
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::new_id;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn financial_line_stores_debit_minus_credit() {
        let line = LineInput::financial(new_id(), dec("1000"), Decimal::ZERO, "USD");
        assert_eq!(line.quantity, dec("1000"));
        assert!(line.item.is_none());
        assert!(line.unit.is_empty());
        assert_eq!(line.price, Decimal::one());

        let line = LineInput::financial(new_id(), Decimal::ZERO, dec("1000"), "USD");
        assert_eq!(line.quantity, dec("-1000"));
    }

    #[test]
    fn balanced_financial_lines_have_no_imbalance() {
        let tx = TransactionInput::new("owner investment", 0).with_lines(vec![
            LineInput::financial(new_id(), Decimal::ZERO, dec("1000"), "USD"),
            LineInput::financial(new_id(), dec("1000"), Decimal::ZERO, "USD"),
        ]);
        assert!(tx.financial_imbalances().is_empty());
    }

    #[test]
    fn imbalance_is_reported_per_currency() {
        let tx = TransactionInput::new("mixed", 0).with_lines(vec![
            LineInput::financial(new_id(), dec("10"), Decimal::ZERO, "USD"),
            LineInput::financial(new_id(), Decimal::ZERO, dec("4"), "USD"),
            LineInput::financial(new_id(), dec("7"), Decimal::ZERO, "EUR"),
            LineInput::financial(new_id(), Decimal::ZERO, dec("7"), "EUR"),
        ]);
        let off = tx.financial_imbalances();
        assert_eq!(off, vec![("USD".to_string(), dec("6"))]);
    }

    #[test]
    fn inventory_lines_do_not_count_toward_balance() {
        let tx = TransactionInput::new("move stock", 0).with_lines(vec![LineInput::inventory(
            new_id(),
            new_id(),
            dec("100"),
            "kg",
            dec("5"),
            "USD",
        )]);
        assert!(tx.financial_imbalances().is_empty());
    }
}
