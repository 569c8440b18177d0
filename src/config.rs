// ⚙️ Configuration - Environment driven settings
//
//   SPLIT_LEDGER_DB         SQLite file            (default: split_ledger.db)
//   SPLIT_LEDGER_CURRENCY   currency symbol        (default: ₹)
//   SPLIT_LEDGER_THRESHOLD  settle threshold       (default: 0.01)
//   SPLIT_LEDGER_ADDR       API listen address     (default: 127.0.0.1:3000)
//
// Blank values fall back to defaults; malformed values are errors.

use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use crate::ledger::DEFAULT_CURRENCY;
use crate::settlement::{SettlementEngine, SETTLE_THRESHOLD};

pub const ENV_DB: &str = "SPLIT_LEDGER_DB";
pub const ENV_CURRENCY: &str = "SPLIT_LEDGER_CURRENCY";
pub const ENV_THRESHOLD: &str = "SPLIT_LEDGER_THRESHOLD";
pub const ENV_ADDR: &str = "SPLIT_LEDGER_ADDR";

pub const DEFAULT_DB_PATH: &str = "split_ledger.db";
pub const DEFAULT_ADDR: &str = "127.0.0.1:3000";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub db_path: PathBuf,
    pub currency: String,
    pub settle_threshold: Decimal,
    pub server_addr: SocketAddr,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let vars: HashMap<String, String> = env::vars().collect();
        Self::from_vars(&vars)
    }

    /// Build from an explicit variable map (tests, embedding).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self> {
        let lookup = |key: &str| {
            vars.get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let db_path = lookup(ENV_DB)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH));

        let currency = lookup(ENV_CURRENCY).unwrap_or_else(|| DEFAULT_CURRENCY.to_string());

        let settle_threshold = match lookup(ENV_THRESHOLD) {
            Some(raw) => {
                let value = Decimal::from_str(&raw)
                    .with_context(|| format!("{} is not a decimal: {}", ENV_THRESHOLD, raw))?;
                if value < Decimal::ZERO {
                    bail!("{} must not be negative: {}", ENV_THRESHOLD, raw);
                }
                value
            }
            None => SETTLE_THRESHOLD,
        };

        let addr = lookup(ENV_ADDR).unwrap_or_else(|| DEFAULT_ADDR.to_string());
        let server_addr = addr
            .parse::<SocketAddr>()
            .with_context(|| format!("{} is not a socket address: {}", ENV_ADDR, addr))?;

        Ok(Config {
            db_path,
            currency,
            settle_threshold,
            server_addr,
        })
    }

    pub fn engine(&self) -> SettlementEngine {
        SettlementEngine::with_threshold(self.settle_threshold)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            currency: DEFAULT_CURRENCY.to_string(),
            settle_threshold: SETTLE_THRESHOLD,
            server_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_vars(&HashMap::new()).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.engine().threshold, dec!(0.01));
    }

    #[test]
    fn test_overrides_and_blank_values() {
        let config = Config::from_vars(&vars(&[
            (ENV_DB, "/tmp/trip.db"),
            (ENV_CURRENCY, "  "),
            (ENV_THRESHOLD, "0.05"),
            (ENV_ADDR, "0.0.0.0:8080"),
        ]))
        .unwrap();

        assert_eq!(config.db_path, PathBuf::from("/tmp/trip.db"));
        assert_eq!(config.currency, "₹");
        assert_eq!(config.settle_threshold, dec!(0.05));
        assert_eq!(config.server_addr.port(), 8080);
    }

    #[test]
    fn test_malformed_values_are_errors() {
        assert!(Config::from_vars(&vars(&[(ENV_THRESHOLD, "cheap")])).is_err());
        assert!(Config::from_vars(&vars(&[(ENV_THRESHOLD, "-1")])).is_err());
        assert!(Config::from_vars(&vars(&[(ENV_ADDR, "localhost")])).is_err());
    }
}
