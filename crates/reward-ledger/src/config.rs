//! # Ledger Configuration
//!
//! Configuration for the ledger services and the expiration scheduler.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     REWARD_DB_PATH=/var/lib/rewards/rewards.db                         │
//! │     REWARD_SCHEDULER_INTERVAL_MINS=30                                  │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/reward-ledger/scheduler.toml (Linux)                     │
//! │     ~/Library/Application Support/com.reward.ledger/scheduler.toml    │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     hourly ticks, 1 year expiration window                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # scheduler.toml
//! [database]
//! path = "/var/lib/rewards/rewards.db"
//! max_connections = 5
//!
//! [scheduler]
//! enabled = true
//! interval_mins = 60
//! expire_years = 1
//! expire_months = 0
//! expire_days = 0
//!
//! [ledger]
//! multipliers_path = "/etc/rewards/multipliers.json"
//! ```

use chrono::Duration as ChronoDuration;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use reward_core::{ExpirationWindow, MultiplierTable};
use reward_db::DbConfig;

use crate::error::{LedgerError, LedgerResult};
use crate::retry::RetryPolicy;

/// Upper bound on the scheduler lease lifetime (one week).
const MAX_LEASE_TTL_SECS: u64 = 7 * 24 * 60 * 60;

// =============================================================================
// Database Settings
// =============================================================================

/// Where the ledger database lives and how many connections to pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file path.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    /// Maximum pooled connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long a writer waits on SQLite's lock (milliseconds).
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

fn default_db_path() -> PathBuf {
    directories::ProjectDirs::from("com", "reward", "ledger")
        .map(|dirs| dirs.data_dir().join("rewards.db"))
        .unwrap_or_else(|| PathBuf::from("rewards.db"))
}

fn default_max_connections() -> u32 {
    5
}

fn default_busy_timeout() -> u64 {
    5_000
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
            busy_timeout_ms: default_busy_timeout(),
        }
    }
}

// =============================================================================
// Scheduler Settings
// =============================================================================

/// Expiration scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSettings {
    /// Whether the scheduler loop runs at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Minutes between ticks.
    #[serde(default = "default_interval_mins")]
    pub interval_mins: u64,

    /// Run a tick immediately on start instead of after the first interval.
    #[serde(default)]
    pub run_on_start: bool,

    /// Expiration window: years component.
    #[serde(default = "default_expire_years")]
    pub expire_years: u32,

    /// Expiration window: months component.
    #[serde(default)]
    pub expire_months: u32,

    /// Expiration window: days component.
    #[serde(default)]
    pub expire_days: u32,

    /// Candidates fetched per page. A tick keeps paging until every due
    /// transaction has been visited.
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,

    /// How long the single-instance lease lasts without renewal (seconds).
    #[serde(default = "default_lease_ttl")]
    pub lease_ttl_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_interval_mins() -> u64 {
    60
}

fn default_expire_years() -> u32 {
    1
}

fn default_batch_size() -> i64 {
    1_000
}

fn default_lease_ttl() -> u64 {
    300
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        SchedulerSettings {
            enabled: true,
            interval_mins: default_interval_mins(),
            run_on_start: false,
            expire_years: default_expire_years(),
            expire_months: 0,
            expire_days: 0,
            batch_size: default_batch_size(),
            lease_ttl_secs: default_lease_ttl(),
        }
    }
}

// =============================================================================
// Ledger Settings
// =============================================================================

/// Settings shared by the recorder and redemption paths.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerSettings {
    /// JSON file mapping category to multiplier. None means every
    /// category earns at the default multiplier.
    #[serde(default)]
    pub multipliers_path: Option<PathBuf>,

    /// Backoff applied when a unit of work hits a write conflict.
    #[serde(default)]
    pub retry: RetryPolicy,
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete ledger configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub scheduler: SchedulerSettings,

    #[serde(default)]
    pub ledger: LedgerSettings,
}

impl LedgerConfig {
    /// Creates a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (`scheduler.toml`)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> LedgerResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading ledger config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> LedgerResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| LedgerError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| LedgerError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| LedgerError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Ledger config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> LedgerResult<()> {
        if self.database.path.as_os_str().is_empty() {
            return Err(LedgerError::InvalidConfig("database.path must not be empty".into()));
        }

        if self.database.max_connections == 0 {
            return Err(LedgerError::InvalidConfig(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        if self.scheduler.interval_mins == 0 {
            return Err(LedgerError::InvalidConfig(
                "scheduler.interval_mins must be greater than 0".into(),
            ));
        }

        if self.expiration_window().is_empty() {
            return Err(LedgerError::InvalidConfig(
                "scheduler expiration window must be non-zero".into(),
            ));
        }

        if self.scheduler.batch_size <= 0 {
            return Err(LedgerError::InvalidConfig(
                "scheduler.batch_size must be greater than 0".into(),
            ));
        }

        if self.scheduler.lease_ttl_secs == 0 {
            return Err(LedgerError::InvalidConfig(
                "scheduler.lease_ttl_secs must be greater than 0".into(),
            ));
        }

        self.ledger.retry.validate()
    }

    /// Applies environment variable overrides.
    ///
    /// Unparseable numeric values are logged and ignored.
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("REWARD_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Ok(path) = std::env::var("REWARD_MULTIPLIERS_PATH") {
            debug!(path = %path, "Overriding multipliers path from environment");
            self.ledger.multipliers_path = Some(PathBuf::from(path));
        }

        if let Some(mins) = env_parse::<u64>("REWARD_SCHEDULER_INTERVAL_MINS") {
            self.scheduler.interval_mins = mins;
        }

        if let Some(years) = env_parse::<u32>("REWARD_EXPIRE_YEARS") {
            self.scheduler.expire_years = years;
        }

        if let Some(months) = env_parse::<u32>("REWARD_EXPIRE_MONTHS") {
            self.scheduler.expire_months = months;
        }

        if let Some(days) = env_parse::<u32>("REWARD_EXPIRE_DAYS") {
            self.scheduler.expire_days = days;
        }

        if let Some(enabled) = env_parse::<bool>("REWARD_SCHEDULER_ENABLED") {
            self.scheduler.enabled = enabled;
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "reward", "ledger")
            .map(|dirs| dirs.config_dir().join("scheduler.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// The configured expiration window.
    pub fn expiration_window(&self) -> ExpirationWindow {
        ExpirationWindow::new(
            self.scheduler.expire_years,
            self.scheduler.expire_months,
            self.scheduler.expire_days,
        )
    }

    /// Time between scheduler ticks.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.scheduler.interval_mins.saturating_mul(60))
    }

    /// Scheduler lease lifetime.
    pub fn lease_ttl(&self) -> ChronoDuration {
        let secs = self.scheduler.lease_ttl_secs.min(MAX_LEASE_TTL_SECS);
        ChronoDuration::seconds(i64::try_from(secs).unwrap_or(0))
    }

    /// Database pool settings.
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.database.path)
            .max_connections(self.database.max_connections)
            .busy_timeout(Duration::from_millis(self.database.busy_timeout_ms))
    }

    /// Loads the multiplier table once.
    ///
    /// A missing `multipliers_path` yields an empty table.
    pub fn load_multipliers(&self) -> LedgerResult<MultiplierTable> {
        match &self.ledger.multipliers_path {
            Some(path) => load_multiplier_file(path),
            None => {
                warn!("No multipliers file configured; every category earns at 1x");
                Ok(MultiplierTable::new())
            }
        }
    }
}

/// Reads and parses a JSON multiplier file.
pub fn load_multiplier_file(path: &Path) -> LedgerResult<MultiplierTable> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| LedgerError::ConfigLoadFailed(format!("{}: {}", path.display(), e)))?;

    let table = MultiplierTable::from_json_str(&contents)?;

    info!(path = %path.display(), categories = table.len(), "Loaded multiplier table");
    Ok(table)
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => {
            debug!(key, value = %raw, "Overriding from environment");
            Some(value)
        }
        Err(_) => {
            warn!(key, value = %raw, "Ignoring unparseable environment override");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = LedgerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.interval(), Duration::from_secs(3600));
        assert_eq!(config.expiration_window(), ExpirationWindow::one_year());
        assert!(config.scheduler.enabled);
        assert!(!config.scheduler.run_on_start);
    }

    #[test]
    fn test_config_validation() {
        let mut config = LedgerConfig::default();

        config.scheduler.interval_mins = 0;
        assert!(config.validate().is_err());

        config.scheduler.interval_mins = 5;
        config.scheduler.expire_years = 0;
        assert!(config.validate().is_err());

        config.scheduler.expire_days = 30;
        assert!(config.validate().is_ok());

        config.database.path = PathBuf::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: LedgerConfig = toml::from_str(
            r#"
            [scheduler]
            interval_mins = 15
            expire_months = 18
            expire_years = 0
            "#,
        )
        .unwrap();

        assert_eq!(config.scheduler.interval_mins, 15);
        assert_eq!(config.expiration_window(), ExpirationWindow::new(0, 18, 0));
        assert_eq!(config.database.max_connections, 5);
        assert!(config.ledger.multipliers_path.is_none());
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("scheduler.toml");

        let mut config = LedgerConfig::default();
        config.database.path = dir.path().join("rewards.db");
        config.scheduler.interval_mins = 10;
        config.save(Some(path.clone())).unwrap();

        let loaded = LedgerConfig::load(Some(path)).unwrap();
        assert_eq!(loaded.scheduler.interval_mins, 10);
        assert_eq!(loaded.database.path, dir.path().join("rewards.db"));
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scheduler.toml");
        std::fs::write(&path, "[scheduler]\ninterval_mins = 0\n").unwrap();

        let err = LedgerConfig::load(Some(path)).unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_load_multipliers() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"grocery": 2, "electronics": 3}}"#).unwrap();

        let mut config = LedgerConfig::default();
        config.ledger.multipliers_path = Some(file.path().to_path_buf());
        let table = config.load_multipliers().unwrap();
        assert_eq!(table.multiplier("electronics"), 3);
        assert_eq!(table.multiplier("toys"), 1);

        config.ledger.multipliers_path = None;
        assert!(config.load_multipliers().unwrap().is_empty());

        config.ledger.multipliers_path = Some(PathBuf::from("/definitely/not/here.json"));
        assert!(config.load_multipliers().unwrap_err().is_config_error());
    }

    #[test]
    fn test_bad_multiplier_rejected_at_load() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"grocery": 0}}"#).unwrap();

        let err = load_multiplier_file(file.path()).unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_toml_serialization() {
        let toml_str = toml::to_string_pretty(&LedgerConfig::default()).unwrap();
        assert!(toml_str.contains("[database]"));
        assert!(toml_str.contains("[scheduler]"));
        assert!(toml_str.contains("[ledger"));
    }
}
