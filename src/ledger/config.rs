//! Runtime configuration for the ledger and its HTTP surface

use serde::Deserialize;
use thiserror::Error;

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use super::pow::MAX_DIFFICULTY;
use super::transaction::DEFAULT_TRANSACTION_FEE;

/// Environment variable naming the configuration file
pub const CONFIG_ENV_VAR: &str = "EDU_LEDGER_CONFIG";

/// Configuration file used when the environment variable is unset
pub const DEFAULT_CONFIG_PATH: &str = "edu_ledger.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Economic and proof-of-work parameters
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Leading zero hex digits required of a puzzle digest
    pub difficulty: u32,
    /// Credit paid to the miner of each block
    pub mining_reward: u64,
    /// Fee charged by wallets
    pub transaction_fee: u64,
    /// Bootstrap grant for every new wallet
    pub starting_balance: u64,
    pub genesis_payer: String,
    pub genesis_payee: String,
    pub genesis_allocation: u64,
    /// Blocks between difficulty checks
    pub adjustment_interval: u64,
    /// Average seconds per block above which difficulty is raised
    pub target_block_time_secs: u64,
    pub max_difficulty: Option<u32>,
    /// `None` searches until a solution is found
    pub max_mining_attempts: Option<u64>,
    /// Credit the sealed transaction's fee to the miner instead of burning it
    pub credit_fees_to_miner: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            difficulty: 4,
            mining_reward: 50,
            transaction_fee: DEFAULT_TRANSACTION_FEE,
            starting_balance: 100,
            genesis_payer: "genesis".to_string(),
            genesis_payee: "godwin".to_string(),
            genesis_allocation: 100,
            adjustment_interval: 5,
            target_block_time_secs: 10,
            max_difficulty: None,
            max_mining_attempts: None,
            credit_fees_to_miner: false,
        }
    }
}

impl LedgerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.adjustment_interval == 0 {
            return Err(ConfigError::Invalid(
                "adjustment_interval must be greater than zero".to_string(),
            ));
        }

        let ceiling = self.max_difficulty.unwrap_or(MAX_DIFFICULTY);
        if ceiling > MAX_DIFFICULTY {
            return Err(ConfigError::Invalid(format!(
                "max_difficulty must be at most {}",
                MAX_DIFFICULTY
            )));
        }
        if self.difficulty > ceiling {
            return Err(ConfigError::Invalid(format!(
                "difficulty {} exceeds the maximum of {}",
                self.difficulty, ceiling
            )));
        }

        if self.genesis_payer.is_empty() || self.genesis_payee.is_empty() {
            return Err(ConfigError::Invalid(
                "genesis identities must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl AppConfig {
    /// Parses and validates a TOML document
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(contents)?;
        config.ledger.validate()?;
        Ok(config)
    }

    /// Loads a config file; a missing file yields the defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(contents) => Self::from_toml_str(&contents),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(err.into()),
        }
    }

    /// Loads from `$EDU_LEDGER_CONFIG`, falling back to `edu_ledger.toml`
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_ENV_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::from_file(path)
    }
}
