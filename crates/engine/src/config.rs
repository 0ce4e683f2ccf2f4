//! Configuration for tierstore.
//!
//! Every field has a default, so an empty TOML file (or none at all) is a
//! valid configuration. Values are read from the file first, then
//! overridden by environment variables, then validated.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tierstore_storage::fs::DEFAULT_CONTAINER;
use tierstore_storage::PartitionScheme;

pub const ENV_PRIMARY_DIR: &str = "TIERSTORE_PRIMARY_DIR";
pub const ENV_ARCHIVE_DIR: &str = "TIERSTORE_ARCHIVE_DIR";
pub const ENV_RETENTION_DAYS: &str = "TIERSTORE_RETENTION_DAYS";
pub const ENV_CONCURRENCY: &str = "TIERSTORE_CONCURRENCY";

/// Records older than this many days are migrated.
pub const RETENTION_DAYS_DEFAULT: u64 = 90;
/// Ten thousand years; anything longer never migrates anything anyway.
pub const RETENTION_DAYS_MAX: u64 = 3_652_500;
pub const CONCURRENCY_LIMIT_DEFAULT: usize = 8;
pub const CONCURRENCY_LIMIT_MAX: usize = 256;
pub const WRITE_RETRIES_MAX: u32 = 10;
pub const RETRY_BACKOFF_MS_DEFAULT: u64 = 200;

/// Errors from loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("invalid configuration: {field}: {reason}")]
    Invalid { field: String, reason: String },
}

/// Main configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TieringConfig {
    /// Age in days after which a record becomes eligible for migration.
    #[serde(default = "default_retention_days")]
    pub retention_days: u64,

    /// Maximum records migrated in parallel.
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,

    /// Pass `overwrite = true` to archive writes.
    #[serde(default = "default_true")]
    pub overwrite_on_archive: bool,

    /// Extra in-cycle attempts for a failed archive write.
    #[serde(default)]
    pub write_retries: u32,

    /// Delay before the first retry; grows linearly per attempt.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Upper bound for any single store call. Unset means no bound.
    #[serde(default)]
    pub store_timeout_ms: Option<u64>,

    #[serde(default)]
    pub partition: PartitionScheme,

    #[serde(default)]
    pub primary: PrimaryConfig,

    #[serde(default)]
    pub archive: ArchiveConfig,
}

fn default_retention_days() -> u64 {
    RETENTION_DAYS_DEFAULT
}

fn default_concurrency_limit() -> usize {
    CONCURRENCY_LIMIT_DEFAULT
}

fn default_true() -> bool {
    true
}

fn default_retry_backoff_ms() -> u64 {
    RETRY_BACKOFF_MS_DEFAULT
}

impl Default for TieringConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            concurrency_limit: default_concurrency_limit(),
            overwrite_on_archive: true,
            write_retries: 0,
            retry_backoff_ms: default_retry_backoff_ms(),
            store_timeout_ms: None,
            partition: PartitionScheme::default(),
            primary: PrimaryConfig::default(),
            archive: ArchiveConfig::default(),
        }
    }
}

/// Location of the primary (hot) tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimaryConfig {
    #[serde(default = "default_primary_dir")]
    pub dir: PathBuf,
}

fn default_primary_dir() -> PathBuf {
    PathBuf::from("./data/primary")
}

impl Default for PrimaryConfig {
    fn default() -> Self {
        Self {
            dir: default_primary_dir(),
        }
    }
}

/// Location of the archive (cold) tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveConfig {
    #[serde(default = "default_archive_dir")]
    pub dir: PathBuf,

    #[serde(default = "default_container")]
    pub container: String,
}

fn default_archive_dir() -> PathBuf {
    PathBuf::from("./data/archive")
}

fn default_container() -> String {
    DEFAULT_CONTAINER.to_string()
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            dir: default_archive_dir(),
            container: default_container(),
        }
    }
}

impl TieringConfig {
    /// Load from an optional TOML file, apply environment overrides, validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply overrides from `lookup` (normally the process environment).
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        fn parse<T: std::str::FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidEnv { var, value })
        }

        if let Some(dir) = lookup(ENV_PRIMARY_DIR).filter(|v| !v.is_empty()) {
            self.primary.dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup(ENV_ARCHIVE_DIR).filter(|v| !v.is_empty()) {
            self.archive.dir = PathBuf::from(dir);
        }
        if let Some(v) = lookup(ENV_RETENTION_DAYS) {
            self.retention_days = parse(ENV_RETENTION_DAYS, v)?;
        }
        if let Some(v) = lookup(ENV_CONCURRENCY) {
            self.concurrency_limit = parse(ENV_CONCURRENCY, v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retention_days == 0 || self.retention_days > RETENTION_DAYS_MAX {
            return Err(invalid(
                "retention_days",
                &format!("must be between 1 and {RETENTION_DAYS_MAX}"),
            ));
        }
        if self.concurrency_limit == 0 || self.concurrency_limit > CONCURRENCY_LIMIT_MAX {
            return Err(invalid(
                "concurrency_limit",
                &format!("must be between 1 and {CONCURRENCY_LIMIT_MAX}"),
            ));
        }
        if self.write_retries > WRITE_RETRIES_MAX {
            return Err(invalid(
                "write_retries",
                &format!("must be at most {WRITE_RETRIES_MAX}"),
            ));
        }
        if self.store_timeout_ms == Some(0) {
            return Err(invalid("store_timeout_ms", "must be positive when set"));
        }
        if let Err(e) = self.partition.build() {
            return Err(invalid("partition", &e.to_string()));
        }
        if self.archive.container.is_empty() || self.archive.container.contains(['/', '\\']) {
            return Err(invalid(
                "archive.container",
                "must be a single non-empty path component",
            ));
        }
        Ok(())
    }

    /// Saturates at `time::Duration::MAX` for unvalidated configs.
    pub fn retention_window(&self) -> time::Duration {
        i64::try_from(self.retention_days)
            .ok()
            .and_then(|days| days.checked_mul(86_400))
            .map(time::Duration::seconds)
            .unwrap_or(time::Duration::MAX)
    }

    /// Settings consumed by the migration engine.
    pub fn migration_settings(&self) -> MigrationSettings {
        MigrationSettings {
            retention: self.retention_window(),
            concurrency_limit: self.concurrency_limit,
            overwrite_on_archive: self.overwrite_on_archive,
            write_retries: self.write_retries,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
            store_timeout: self.store_timeout(),
        }
    }

    pub fn store_timeout(&self) -> Option<Duration> {
        self.store_timeout_ms.map(Duration::from_millis)
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

/// Tunables for one [`crate::MigrationEngine`].
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationSettings {
    pub retention: time::Duration,
    pub concurrency_limit: usize,
    pub overwrite_on_archive: bool,
    pub write_retries: u32,
    pub retry_backoff: Duration,
    pub store_timeout: Option<Duration>,
}

impl Default for MigrationSettings {
    fn default() -> Self {
        TieringConfig::default().migration_settings()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn empty_toml_yields_defaults() {
        let config: TieringConfig = toml::from_str("").unwrap();
        assert_eq!(config, TieringConfig::default());
        assert_eq!(config.retention_days, 90);
        assert!(config.overwrite_on_archive);
        assert_eq!(config.archive.container, "archived-records");
        config.validate().unwrap();
    }

    #[test]
    fn toml_overrides_selected_fields() {
        let config: TieringConfig = toml::from_str(
            r#"
            retention_days = 30
            concurrency_limit = 2
            overwrite_on_archive = false
            store_timeout_ms = 1500

            [partition]
            policy = "hash"
            buckets = 32

            [archive]
            dir = "/srv/cold"
            "#,
        )
        .unwrap();
        assert_eq!(config.retention_days, 30);
        assert_eq!(config.concurrency_limit, 2);
        assert!(!config.overwrite_on_archive);
        assert_eq!(config.partition, PartitionScheme::Hash { buckets: 32 });
        assert_eq!(config.archive.dir, PathBuf::from("/srv/cold"));
        assert_eq!(config.archive.container, "archived-records");
        assert_eq!(config.store_timeout(), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = TieringConfig::default();
        config
            .apply_env(env(&[
                (ENV_PRIMARY_DIR, "/hot"),
                (ENV_RETENTION_DAYS, "45"),
                (ENV_CONCURRENCY, " 3 "),
            ]))
            .unwrap();
        assert_eq!(config.primary.dir, PathBuf::from("/hot"));
        assert_eq!(config.archive.dir, PathBuf::from("./data/archive"));
        assert_eq!(config.retention_days, 45);
        assert_eq!(config.concurrency_limit, 3);
    }

    #[test]
    fn bad_env_value_is_rejected() {
        let mut config = TieringConfig::default();
        let err = config
            .apply_env(env(&[(ENV_RETENTION_DAYS, "ninety")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidEnv {
                var: ENV_RETENTION_DAYS,
                ..
            }
        ));
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        let mut config = TieringConfig {
            concurrency_limit: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        config.concurrency_limit = CONCURRENCY_LIMIT_MAX + 1;
        assert!(config.validate().is_err());
        config.concurrency_limit = 4;
        config.retention_days = 0;
        assert!(config.validate().is_err());
        config.retention_days = RETENTION_DAYS_MAX + 1;
        assert!(config.validate().is_err());
        config.retention_days = RETENTION_DAYS_MAX;
        config.validate().unwrap();
        config.retention_days = 1;
        config.partition = PartitionScheme::Prefix { len: 0 };
        assert!(config.validate().is_err());
        config.partition = PartitionScheme::default();
        config.archive.container = "a/b".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn migration_settings_follow_config() {
        let config = TieringConfig {
            retention_days: 7,
            write_retries: 2,
            ..Default::default()
        };
        let settings = config.migration_settings();
        assert_eq!(settings.retention, time::Duration::days(7));
        assert_eq!(settings.write_retries, 2);
        assert_eq!(settings.concurrency_limit, CONCURRENCY_LIMIT_DEFAULT);
    }

    #[test]
    fn huge_retention_from_env_is_rejected_not_panicking() {
        let mut config = TieringConfig::default();
        config
            .apply_env(env(&[(ENV_RETENTION_DAYS, "200000000000000")]))
            .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { ref field, .. }) if field == "retention_days"
        ));
        // Unvalidated configs still produce a window instead of overflowing.
        assert_eq!(config.retention_window(), time::Duration::MAX);
        let cutoff = crate::cutoff_for(time::OffsetDateTime::now_utc(), config.retention_window());
        assert_eq!(cutoff, time::OffsetDateTime::UNIX_EPOCH);
    }
}
