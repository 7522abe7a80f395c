//! Fixed-point decimal arithmetic backed by a signed 64-bit integer.
//!
//! Every value is `data / 10^D` where `D` is the process-global fractional
//! digit count (default 4). Storage persists the raw backing integer, so a
//! database written with one `D` must be read with the same `D`.

use std::convert::Infallible;
use std::fmt;
use std::ops::{Add, Neg, Sub};
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};

static DECIMAL_DIGITS: AtomicU32 = AtomicU32::new(4);

/// Current process-global fractional digit count.
pub fn decimal_digits() -> u32 {
    DECIMAL_DIGITS.load(Ordering::Relaxed)
}

/// Set the process-global fractional digit count.
///
/// Accepts 1..=9; out-of-range values are clamped. Must be called before any
/// decimals are created or persisted — changing it afterwards reinterprets
/// every existing backing integer.
pub fn set_decimal_digits(digits: u32) {
    DECIMAL_DIGITS.store(digits.clamp(1, 9), Ordering::Relaxed);
}

fn divisor() -> i64 {
    10i64.pow(decimal_digits())
}

/// Signed fixed-point rational; see the module docs for the representation.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Decimal {
    data: i64,
}

impl Decimal {
    pub const ZERO: Decimal = Decimal { data: 0 };

    /// Wrap a raw backing integer (the storage form).
    pub const fn new(raw: i64) -> Self {
        Self { data: raw }
    }

    /// The value 1 at the current digit configuration.
    pub fn one() -> Self {
        Self { data: divisor() }
    }

    /// Build from an integer part and a fractional part already reduced
    /// modulo the divisor. The fractional magnitude is applied away from
    /// zero, matching the sign of the integer part.
    pub fn from_int_frac(int_part: i64, frac_part: i64) -> Self {
        let raw = if int_part >= 0 {
            int_part * divisor() + frac_part
        } else {
            int_part * divisor() - frac_part
        };
        Self { data: raw }
    }

    /// Truncating conversion from a float.
    pub fn from_float(value: f64) -> Self {
        Self {
            data: (value * divisor() as f64) as i64,
        }
    }

    /// The raw backing integer (the storage form).
    pub const fn raw(self) -> i64 {
        self.data
    }

    pub fn to_float(self) -> f64 {
        self.data as f64 / divisor() as f64
    }

    /// Split into (integer part, fractional remainder); both carry the sign
    /// of the value.
    pub fn to_int_frac(self) -> (i64, i64) {
        (self.data / divisor(), self.data % divisor())
    }

    pub const fn is_zero(self) -> bool {
        self.data == 0
    }

    pub fn checked_add(self, rhs: Decimal) -> Option<Decimal> {
        self.data.checked_add(rhs.data).map(Decimal::new)
    }

    pub fn checked_sub(self, rhs: Decimal) -> Option<Decimal> {
        self.data.checked_sub(rhs.data).map(Decimal::new)
    }

    /// `(a.data * b.data) / 10^D`, truncating toward zero.
    pub fn checked_mul(self, rhs: Decimal) -> Option<Decimal> {
        self.data
            .checked_mul(rhs.data)?
            .checked_div(divisor())
            .map(Decimal::new)
    }

    /// `(a.data * 10^D) / b.data`, truncating toward zero. `None` when the
    /// divisor is zero or the scaled dividend overflows.
    pub fn checked_div(self, rhs: Decimal) -> Option<Decimal> {
        self.data
            .checked_mul(divisor())?
            .checked_div(rhs.data)
            .map(Decimal::new)
    }
}

impl Add for Decimal {
    type Output = Decimal;

    fn add(self, rhs: Decimal) -> Decimal {
        Decimal::new(self.data + rhs.data)
    }
}

impl Sub for Decimal {
    type Output = Decimal;

    fn sub(self, rhs: Decimal) -> Decimal {
        Decimal::new(self.data - rhs.data)
    }
}

impl Neg for Decimal {
    type Output = Decimal;

    fn neg(self) -> Decimal {
        Decimal::new(-self.data)
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = decimal_digits() as usize;
        let div = divisor() as u64;
        let sign = if self.data < 0 { "-" } else { "" };
        let mag = self.data.unsigned_abs();
        write!(f, "{sign}{}.{:0digits$}", mag / div, mag % div)
    }
}

impl FromStr for Decimal {
    type Err = Infallible;

    /// Lossy parse: never fails, unparseable integer or fractional segments
    /// read as zero. Fractional digits beyond `D` are truncated.
    fn from_str(s: &str) -> Result<Self, Infallible> {
        let s = s.trim();
        let negative = s.starts_with('-');
        let unsigned = s.strip_prefix(['-', '+']).unwrap_or(s);
        let (int_str, frac_str) = match unsigned.split_once('.') {
            Some((int_str, frac_str)) => (int_str, frac_str),
            None => (unsigned, ""),
        };
        let int_part: i64 = int_str.parse().unwrap_or(0);

        let digits = decimal_digits() as usize;
        let mut frac_digits: String = frac_str.chars().take(digits).collect();
        while frac_digits.len() < digits {
            frac_digits.push('0');
        }
        let frac_part: i64 = frac_digits.parse().unwrap_or(0);

        let mag = int_part.saturating_mul(divisor()).saturating_add(frac_part);
        Ok(Decimal::new(if negative { -mag } else { mag }))
    }
}
