//! Unit and currency conversion tables.
//!
//! Rules are timestamped and the newest rule for a pair is the effective
//! one. A missing rule is a soft miss: conversion returns the input
//! unchanged.

use rusqlite::{params, Connection, OptionalExtension};
use tally_core::{CurrencyConversion, UnitConversion};
use tracing::debug;

use crate::LedgerResult;

pub fn add_unit_conversion(conn: &Connection, rule: &UnitConversion) -> LedgerResult<()> {
    conn.execute(
        "INSERT INTO unit_conversions (from_unit, to_unit, factor, datetime_ms)
         VALUES (?1, ?2, ?3, ?4)",
        params![rule.from_unit, rule.to_unit, rule.factor, rule.datetime_ms],
    )?;
    Ok(())
}

pub fn add_currency_conversion(conn: &Connection, rule: &CurrencyConversion) -> LedgerResult<()> {
    conn.execute(
        "INSERT INTO currency_conversions (from_currency, to_currency, rate, datetime_ms)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            rule.from_currency,
            rule.to_currency,
            rule.rate,
            rule.datetime_ms
        ],
    )?;
    Ok(())
}

/// The effective factor for a unit pair, if any rule exists.
pub fn unit_factor(conn: &Connection, from: &str, to: &str) -> LedgerResult<Option<f64>> {
    conn.query_row(
        "SELECT factor FROM unit_conversions
         WHERE from_unit = ?1 AND to_unit = ?2
         ORDER BY datetime_ms DESC
         LIMIT 1",
        params![from, to],
        |row| row.get(0),
    )
    .optional()
    .map_err(Into::into)
}

/// The effective rate for a currency pair, if any rule exists.
pub fn currency_rate(conn: &Connection, from: &str, to: &str) -> LedgerResult<Option<f64>> {
    conn.query_row(
        "SELECT rate FROM currency_conversions
         WHERE from_currency = ?1 AND to_currency = ?2
         ORDER BY datetime_ms DESC
         LIMIT 1",
        params![from, to],
        |row| row.get(0),
    )
    .optional()
    .map_err(Into::into)
}

pub fn convert_unit(conn: &Connection, quantity: f64, from: &str, to: &str) -> LedgerResult<f64> {
    match unit_factor(conn, from, to)? {
        Some(factor) => Ok(quantity * factor),
        None => {
            debug!(from, to, "no unit conversion rule; quantity unchanged");
            Ok(quantity)
        }
    }
}

pub fn convert_currency(conn: &Connection, amount: f64, from: &str, to: &str) -> LedgerResult<f64> {
    match currency_rate(conn, from, to)? {
        Some(rate) => Ok(amount * rate),
        None => {
            debug!(from, to, "no currency conversion rule; amount unchanged");
            Ok(amount)
        }
    }
}
