use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Runtime configuration for a ledger process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Directory holding one subdirectory per database identifier.
    pub prefix: PathBuf,

    /// Fractional digit count for decimal values. Must match the value the
    /// databases under `prefix` were written with.
    pub decimal_digits: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            prefix: PathBuf::from("./db"),
            decimal_digits: 4,
        }
    }
}

impl RuntimeConfig {
    /// Load defaults, overridden by environment variables where present.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(prefix) = std::env::var("TALLY_DB_PREFIX") {
            config.prefix = PathBuf::from(prefix);
        }
        if let Ok(digits) = std::env::var("TALLY_DECIMAL_DIGITS") {
            if let Ok(digits) = digits.parse() {
                config.decimal_digits = digits;
            }
        }
        config
    }
}
