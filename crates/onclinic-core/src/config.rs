//! Application configuration.
//!
//! Values come from an optional TOML file (`config/onclinic.toml` unless a
//! path is given) overlaid by `ONCLINIC__SECTION__KEY` environment variables.
//! Every field has a default, so an empty environment yields a usable config.

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::billing::DispenseMode;
use crate::sequence::AllocationStrategy;

const DEFAULT_CONFIG_FILE: &str = "config/onclinic";
const ENV_PREFIX: &str = "ONCLINIC";

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub sequence: SequenceConfig,
    pub ledger: LedgerConfig,
    pub billing: BillingConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    /// How long a writer waits on a locked database before failing
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("onclinic.db"),
            busy_timeout_ms: 5000,
        }
    }
}

impl DatabaseConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct SequenceConfig {
    pub strategy: AllocationStrategy,
    pub max_attempts: u32,
    pub clinic_bill_prefix: String,
    pub pharmacy_bill_prefix: String,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            strategy: AllocationStrategy::ScanVerify,
            max_attempts: 5,
            clinic_bill_prefix: "ON".to_string(),
            pharmacy_bill_prefix: "ONP".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct LedgerConfig {
    pub allow_negative_stock: bool,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct BillingConfig {
    pub dispense_mode: DispenseMode,
}

impl AppConfig {
    /// Load from `config/onclinic.toml` (if present) and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load from an explicit file, which must exist, or the default
    /// location, which may not.
    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let config: AppConfig = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.sequence.max_attempts == 0 {
            return Err(ConfigError::Message(
                "sequence.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.sequence.clinic_bill_prefix.is_empty() || self.sequence.pharmacy_bill_prefix.is_empty() {
            return Err(ConfigError::Message("bill prefixes cannot be empty".to_string()));
        }
        if self.sequence.clinic_bill_prefix == self.sequence.pharmacy_bill_prefix {
            return Err(ConfigError::Message(
                "clinic and pharmacy bill prefixes must differ".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.database.busy_timeout(), Duration::from_secs(5));
        assert_eq!(config.sequence.strategy, AllocationStrategy::ScanVerify);
        assert_eq!(config.sequence.max_attempts, 5);
        assert_eq!(config.sequence.clinic_bill_prefix, "ON");
        assert!(!config.ledger.allow_negative_stock);
        assert_eq!(config.billing.dispense_mode, DispenseMode::BestEffort);
    }

    #[test]
    fn test_load_partial_file() {
        let file = write_config(
            r#"
            [sequence]
            strategy = "counter"
            max_attempts = 8

            [billing]
            dispense_mode = "atomic"
            "#,
        );

        let config = AppConfig::load_from(Some(file.path())).unwrap();
        assert_eq!(config.sequence.strategy, AllocationStrategy::Counter);
        assert_eq!(config.sequence.max_attempts, 8);
        assert_eq!(config.sequence.pharmacy_bill_prefix, "ONP");
        assert_eq!(config.billing.dispense_mode, DispenseMode::Atomic);
        assert_eq!(config.database, DatabaseConfig::default());
    }

    #[test]
    fn test_rejects_zero_attempts() {
        let file = write_config("[sequence]\nmax_attempts = 0\n");
        assert!(AppConfig::load_from(Some(file.path())).is_err());
    }

    #[test]
    fn test_rejects_shared_prefix() {
        let file = write_config("[sequence]\npharmacy_bill_prefix = \"ON\"\n");
        assert!(AppConfig::load_from(Some(file.path())).is_err());
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(AppConfig::load_from(Some(&dir.path().join("absent.toml"))).is_err());
    }
}
