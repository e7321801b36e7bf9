use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::DbError;

/// Logging settings consumed by [`crate::logger::configure_logging`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LogConfig {
    pub dir: Option<PathBuf>,
    pub level: Option<String>,
    pub retention: Option<usize>,
}

/// Tuning for query execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct QueryConfig {
    /// The sort iterator polls for cancellation after this many collected items.
    pub sort_cancel_check_every: usize,
    /// Sorts slower than this are logged as warnings.
    pub slow_sort_ms: u64,
    /// Deadline for transactions opened by `MemoryStore::begin_query`.
    pub default_timeout_ms: Option<u64>,
    /// Scratch buffers kept by the buffer pool.
    pub pool_max_buffers: usize,
    pub log: LogConfig,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            sort_cancel_check_every: 256,
            slow_sort_ms: 500,
            default_timeout_ms: None,
            pool_max_buffers: 32,
            log: LogConfig::default(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse::<T>().ok())
}

impl QueryConfig {
    /// # Errors
    /// Returns `DbError::Config` when the text is not valid TOML for this struct.
    pub fn from_toml_str(s: &str) -> Result<Self, DbError> {
        let cfg: Self = toml::from_str(s).map_err(|e| DbError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// # Errors
    /// Returns `DbError::Config` when the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, DbError> {
        let s = std::fs::read_to_string(path)
            .map_err(|e| DbError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&s)
    }

    /// Defaults overridden by environment variables:
    /// - NEXUSLITE_QUERY_SORT_CHECK
    /// - NEXUSLITE_QUERY_SLOW_SORT_MS
    /// - NEXUSLITE_QUERY_TIMEOUT_MS
    /// - NEXUSLITE_LOG_DIR / NEXUSLITE_LOG_LEVEL / NEXUSLITE_LOG_RETENTION
    #[must_use]
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.apply_env();
        cfg
    }

    pub fn apply_env(&mut self) {
        if let Some(n) = env_parse::<usize>("NEXUSLITE_QUERY_SORT_CHECK").filter(|n| *n > 0) {
            self.sort_cancel_check_every = n;
        }
        if let Some(ms) = env_parse("NEXUSLITE_QUERY_SLOW_SORT_MS") {
            self.slow_sort_ms = ms;
        }
        if let Some(ms) = env_parse("NEXUSLITE_QUERY_TIMEOUT_MS") {
            self.default_timeout_ms = Some(ms);
        }
        if let Ok(dir) = std::env::var("NEXUSLITE_LOG_DIR") {
            self.log.dir = Some(PathBuf::from(dir));
        }
        if let Ok(level) = std::env::var("NEXUSLITE_LOG_LEVEL") {
            self.log.level = Some(level);
        }
        if let Some(r) = env_parse("NEXUSLITE_LOG_RETENTION") {
            self.log.retention = Some(r);
        }
    }

    fn validate(&self) -> Result<(), DbError> {
        if self.sort_cancel_check_every == 0 {
            return Err(DbError::Config("sort_cancel_check_every must be positive".into()));
        }
        Ok(())
    }
}
