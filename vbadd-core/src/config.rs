//! Runtime settings, read once from the process environment the first time an
//! export is called. A VBA host gives a dll no other configuration channel.

use std::sync::OnceLock;

use log::LevelFilter;

pub const ENV_LOG: &str = "VBA_BRIDGE_LOG";
pub const ENV_MAX_CELLS: &str = "VBA_BRIDGE_MAX_CELLS";

/// Rows in an Excel 2007+ worksheet.
pub const SHEET_ROWS: usize = 1_048_576;
/// Columns in an Excel 2007+ worksheet.
pub const SHEET_COLUMNS: usize = 16_384;

#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    pub log_level: LevelFilter,
    /// Upper bound on the cells of a single returned grid.
    pub max_cells: u64,
    /// Problems found while reading the environment, logged once the logger
    /// is up.
    pub warnings: Vec<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            log_level: LevelFilter::Warn,
            max_cells: (SHEET_ROWS as u64) * (SHEET_COLUMNS as u64),
            warnings: Vec::new(),
        }
    }
}

static CONFIG: OnceLock<BridgeConfig> = OnceLock::new();

impl BridgeConfig {
    /// Builds a config from a lookup function, so tests need not touch the
    /// real environment.
    pub fn from_lookup<F>(lookup: F) -> BridgeConfig
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = BridgeConfig::default();

        if let Some(level) = lookup(ENV_LOG) {
            match level.trim().parse::<LevelFilter>() {
                Ok(l) => config.log_level = l,
                Err(_) => config
                    .warnings
                    .push(format!("{}: unknown level '{}', using warn", ENV_LOG, level)),
            }
        }

        if let Some(cells) = lookup(ENV_MAX_CELLS) {
            match cells.trim().replace('_', "").parse::<u64>() {
                Ok(n) if n > 0 => config.max_cells = n,
                _ => config.warnings.push(format!(
                    "{}: '{}' is not a positive integer, using {}",
                    ENV_MAX_CELLS, cells, config.max_cells
                )),
            }
        }

        config
    }

    pub fn from_env() -> BridgeConfig {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// The process-wide config.
    pub fn global() -> &'static BridgeConfig {
        CONFIG.get_or_init(BridgeConfig::from_env)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let config = BridgeConfig::from_lookup(|_| None);
        assert_eq!(config, BridgeConfig::default());
        assert_eq!(config.max_cells, 17_179_869_184);
    }

    #[test]
    fn reads_level_and_limit() {
        let config =
            BridgeConfig::from_lookup(lookup(&[(ENV_LOG, "debug"), (ENV_MAX_CELLS, "10_000")]));
        assert_eq!(config.log_level, LevelFilter::Debug);
        assert_eq!(config.max_cells, 10_000);
        assert!(config.warnings.is_empty());
    }

    #[test]
    fn bad_values_fall_back_with_warning() {
        let config =
            BridgeConfig::from_lookup(lookup(&[(ENV_LOG, "loud"), (ENV_MAX_CELLS, "0")]));
        assert_eq!(config.log_level, LevelFilter::Warn);
        assert_eq!(config.max_cells, BridgeConfig::default().max_cells);
        assert_eq!(config.warnings.len(), 2);
    }
}
