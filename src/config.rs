//! Runtime configuration.
//!
//! Workspace and model settings come from the environment (optionally
//! seeded from a `.env` file). Discovery tuning has compiled-in defaults
//! that the binary overrides from CLI flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::ValueEnum;

use crate::catalog::DEFAULT_SEARCH_LIMIT;
use crate::error::ConfigError;

/// Default number of keywords searched per discovery.
pub const DEFAULT_KEYWORD_LIMIT: usize = 5;

/// Default number of ranked tables whose details go into the prompt.
pub const DEFAULT_TOP_TABLES: usize = 2;

/// Default statement `wait_timeout` (the API accepts 5s to 50s).
pub const DEFAULT_WAIT_TIMEOUT: &str = "50s";

/// Default HTTP timeout for warehouse and model calls.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(120);

// ============================================================================
// Environment
// ============================================================================

/// Directory name under the user config dir holding a fallback `.env`.
const CONFIG_DIR_NAME: &str = "dbsql-assistant";

/// Load environment variables from a `.env` file.
///
/// An explicit path must exist. Otherwise the working directory's `.env` is
/// tried first, then `<config dir>/dbsql-assistant/.env`. Variables already
/// set in the process environment win. Returns the file that was loaded.
pub fn load_env_file(explicit: Option<&Path>) -> Result<Option<PathBuf>, ConfigError> {
    if let Some(path) = explicit {
        dotenv::from_path(path).map_err(|e| ConfigError::Invalid {
            name: "--env-file",
            reason: format!("{}: {e}", path.display()),
        })?;
        return Ok(Some(path.to_path_buf()));
    }

    if let Ok(path) = dotenv::dotenv() {
        return Ok(Some(path));
    }

    let fallback = dirs::config_dir().map(|d| d.join(CONFIG_DIR_NAME).join(".env"));
    match fallback {
        Some(path) if path.exists() => {
            dotenv::from_path(&path).map_err(|e| ConfigError::Invalid {
                name: "DOTENV",
                reason: format!("{}: {e}", path.display()),
            })?;
            Ok(Some(path))
        }
        _ => Ok(None),
    }
}

fn required_var(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::MissingVar(name))
}

/// HTTP timeout from `DATABRICKS_HTTP_TIMEOUT_SECS`, or the default.
pub fn http_timeout_from_env() -> Result<Duration, ConfigError> {
    match std::env::var("DATABRICKS_HTTP_TIMEOUT_SECS") {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .ok_or_else(|| ConfigError::Invalid {
                name: "DATABRICKS_HTTP_TIMEOUT_SECS",
                reason: format!("expected a positive number of seconds, got '{raw}'"),
            }),
        Err(_) => Ok(DEFAULT_HTTP_TIMEOUT),
    }
}

// ============================================================================
// Warehouse
// ============================================================================

/// Connection settings for a Databricks workspace and SQL warehouse.
#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    /// Workspace URL, always with a scheme and no trailing slash.
    pub host: String,
    pub token: String,
    pub warehouse_id: String,
    pub wait_timeout: String,
    pub http_timeout: Duration,
}

impl WarehouseConfig {
    /// Read `DATABRICKS_HOST`, `DATABRICKS_TOKEN`, `DATABRICKS_SQL_WAREHOUSE_ID`
    /// and the optional `DATABRICKS_WAIT_TIMEOUT` / `DATABRICKS_HTTP_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let wait_timeout = std::env::var("DATABRICKS_WAIT_TIMEOUT")
            .unwrap_or_else(|_| DEFAULT_WAIT_TIMEOUT.to_string());
        validate_wait_timeout(&wait_timeout)?;

        Ok(Self {
            host: normalize_host(&required_var("DATABRICKS_HOST")?),
            token: required_var("DATABRICKS_TOKEN")?,
            warehouse_id: required_var("DATABRICKS_SQL_WAREHOUSE_ID")?,
            wait_timeout,
            http_timeout: http_timeout_from_env()?,
        })
    }
}

/// Add `https://` when missing and drop trailing slashes.
pub fn normalize_host(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    }
}

fn validate_wait_timeout(value: &str) -> Result<(), ConfigError> {
    let secs = value
        .strip_suffix('s')
        .and_then(|n| n.parse::<u32>().ok())
        .ok_or_else(|| ConfigError::Invalid {
            name: "DATABRICKS_WAIT_TIMEOUT",
            reason: format!("expected '<seconds>s', got '{value}'"),
        })?;
    if secs != 0 && !(5..=50).contains(&secs) {
        return Err(ConfigError::Invalid {
            name: "DATABRICKS_WAIT_TIMEOUT",
            reason: format!("must be 0s or between 5s and 50s, got '{value}'"),
        });
    }
    Ok(())
}

// ============================================================================
// Discovery
// ============================================================================

/// Whether discovery also searches the legacy Hive metastore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ScopePolicy {
    /// Search only the requested catalog/schema (or all catalogs).
    #[default]
    Primary,
    /// Also search `hive_metastore` and union the results.
    WithLegacy,
}

/// Bounds on the work one schema discovery performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryConfig {
    /// Only the first `keyword_limit` keywords are searched.
    pub keyword_limit: usize,
    /// Number of ranked tables whose details go into the schema context.
    pub top_tables: usize,
    /// Row cap applied to every catalog search.
    pub search_limit: usize,
    pub scope_policy: ScopePolicy,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            keyword_limit: DEFAULT_KEYWORD_LIMIT,
            top_tables: DEFAULT_TOP_TABLES,
            search_limit: DEFAULT_SEARCH_LIMIT,
            scope_policy: ScopePolicy::Primary,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_host() {
        assert_eq!(
            normalize_host("adb-123.4.azuredatabricks.net/"),
            "https://adb-123.4.azuredatabricks.net"
        );
        assert_eq!(
            normalize_host(" https://dbc-1.cloud.databricks.com "),
            "https://dbc-1.cloud.databricks.com"
        );
        assert_eq!(normalize_host("http://localhost:8080"), "http://localhost:8080");
    }

    #[test]
    fn test_wait_timeout_validation() {
        assert!(validate_wait_timeout("50s").is_ok());
        assert!(validate_wait_timeout("5s").is_ok());
        assert!(validate_wait_timeout("0s").is_ok());
        assert!(validate_wait_timeout("4s").is_err());
        assert!(validate_wait_timeout("51s").is_err());
        assert!(validate_wait_timeout("30").is_err());
    }

    #[test]
    fn test_discovery_defaults() {
        let cfg = DiscoveryConfig::default();
        assert_eq!(cfg.keyword_limit, 5);
        assert_eq!(cfg.top_tables, 2);
        assert_eq!(cfg.search_limit, 100);
        assert_eq!(cfg.scope_policy, ScopePolicy::Primary);
    }

    #[test]
    fn test_scope_policy_parses_kebab_case() {
        assert_eq!(
            ScopePolicy::from_str("with-legacy", true).unwrap(),
            ScopePolicy::WithLegacy
        );
        assert_eq!(ScopePolicy::from_str("primary", true).unwrap(), ScopePolicy::Primary);
        assert!(ScopePolicy::from_str("both", true).is_err());
    }

    #[test]
    fn test_load_explicit_env_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("assistant.env");
        std::fs::write(&path, "DBSQL_TEST_ENV_MARKER=loaded\n").unwrap();

        let loaded = load_env_file(Some(&path)).unwrap();
        assert_eq!(loaded.as_deref(), Some(path.as_path()));
        assert_eq!(std::env::var("DBSQL_TEST_ENV_MARKER").unwrap(), "loaded");
    }

    #[test]
    fn test_load_missing_explicit_env_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_env_file(Some(&dir.path().join("nope.env")));
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }
}
