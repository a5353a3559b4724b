//! Configuration loading and resolution
//!
//! Settings sources, highest priority first:
//! 1. Command-line arguments (applied by the binary through [`CliOverrides`])
//! 2. Environment variables (`COMICVINE_API_KEY`, `ANTHROPIC_API_KEY`,
//!    `CVMATCH_WORKERS`, `CVMATCH_DATABASE`)
//! 3. TOML configuration file
//! 4. Built-in defaults (code constants)
//!
//! A missing configuration file is not an error: a warning is logged and the
//! defaults are used. A file that exists but does not parse is an error.
//!
//! The resolved [`AppConfig`] is passed explicitly into every component
//! constructor; nothing in the workspace reads configuration globally.

use crate::{Error, Result, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

pub const ENV_COMICVINE_API_KEY: &str = "COMICVINE_API_KEY";
pub const ENV_ANTHROPIC_API_KEY: &str = "ANTHROPIC_API_KEY";
pub const ENV_WORKERS: &str = "CVMATCH_WORKERS";
pub const ENV_DATABASE: &str = "CVMATCH_DATABASE";

/// Complete application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Catalog (ComicVine) API key; required for resolution runs
    pub comicvine_api_key: Option<String>,
    pub comicvine_base_url: String,

    /// Completion service (Anthropic) API key; required only for the
    /// remote parser and remote selector
    pub anthropic_api_key: Option<String>,
    pub anthropic_base_url: String,
    pub anthropic_model: String,
    pub anthropic_max_tokens: u32,

    /// Number of concurrent batch workers
    pub worker_count: usize,

    /// Minimum spacing between catalog requests, shared by all workers
    pub catalog_min_interval_ms: u64,
    /// Completion requests allowed per minute
    pub completion_rate_limit_per_min: u32,

    /// Total attempts per outbound request
    pub retry_attempts: u32,
    pub retry_base_delay_ms: u64,

    pub issue_cache_ttl_secs: u64,
    /// Volumes from the volume search whose issues are fetched
    pub max_volumes_to_check: usize,

    /// SQLite database path; `None` means the OS default data directory
    pub database_path: Option<PathBuf>,

    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            comicvine_api_key: None,
            comicvine_base_url: "https://comicvine.gamespot.com/api".to_string(),
            anthropic_api_key: None,
            anthropic_base_url: "https://api.anthropic.com/v1".to_string(),
            anthropic_model: "claude-3-5-sonnet-20240620".to_string(),
            anthropic_max_tokens: 1024,
            worker_count: 3,
            catalog_min_interval_ms: 1000,
            completion_rate_limit_per_min: 30,
            retry_attempts: 3,
            retry_base_delay_ms: 2000,
            issue_cache_ttl_secs: 24 * 60 * 60,
            max_volumes_to_check: 5,
            database_path: None,
            logging: LoggingConfig::default(),
        }
    }
}

/// Values supplied on the command line; `None` leaves lower tiers in effect
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub comicvine_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub worker_count: Option<usize>,
    pub database_path: Option<PathBuf>,
    pub log_level: Option<String>,
}

/// Which credentials a command needs before any work starts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Requirements {
    pub catalog: bool,
    pub completion: bool,
}

impl AppConfig {
    /// Parse a TOML document; absent keys take their defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load the TOML tier.
    ///
    /// An explicit `path` must exist. Without one, the platform default
    /// location is tried and its absence falls back to defaults.
    pub fn load_file(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (Some(p.to_path_buf()), true),
            None => (default_config_path(), false),
        };

        let Some(path) = path else {
            warn!("Could not determine configuration directory, using built-in defaults");
            return Ok(Self::default());
        };

        if !path.exists() {
            if explicit {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            warn!(path = %path.display(), "No config file found, using built-in defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)?;
        let config = Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        info!(path = %path.display(), "Loaded configuration file");
        Ok(config)
    }

    /// Apply the environment tier using the process environment
    pub fn apply_env(&mut self) {
        self.apply_env_from(|name| std::env::var(name).ok());
    }

    /// Apply the environment tier from an arbitrary lookup
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup(ENV_COMICVINE_API_KEY).filter(|k| is_valid_key(k)) {
            if self.comicvine_api_key.as_deref().is_some_and(is_valid_key) {
                warn!("Catalog API key found in environment and TOML. Using environment (higher priority).");
            }
            self.comicvine_api_key = Some(key);
        }

        if let Some(key) = lookup(ENV_ANTHROPIC_API_KEY).filter(|k| is_valid_key(k)) {
            if self.anthropic_api_key.as_deref().is_some_and(is_valid_key) {
                warn!("Completion API key found in environment and TOML. Using environment (higher priority).");
            }
            self.anthropic_api_key = Some(key);
        }

        if let Some(raw) = lookup(ENV_WORKERS) {
            match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => self.worker_count = n,
                _ => warn!(value = %raw, "Ignoring invalid {}", ENV_WORKERS),
            }
        }

        if let Some(path) = lookup(ENV_DATABASE).filter(|p| !p.trim().is_empty()) {
            self.database_path = Some(PathBuf::from(path));
        }
    }

    /// Apply the command-line tier
    pub fn apply_cli(&mut self, cli: &CliOverrides) {
        if let Some(key) = cli.comicvine_api_key.as_ref().filter(|k| is_valid_key(k)) {
            self.comicvine_api_key = Some(key.clone());
        }
        if let Some(key) = cli.anthropic_api_key.as_ref().filter(|k| is_valid_key(k)) {
            self.anthropic_api_key = Some(key.clone());
        }
        if let Some(n) = cli.worker_count {
            self.worker_count = n;
        }
        if let Some(path) = &cli.database_path {
            self.database_path = Some(path.clone());
        }
        if let Some(level) = &cli.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Resolve all tiers: file, then environment, then command line
    pub fn resolve(config_path: Option<&Path>, cli: &CliOverrides) -> Result<Self> {
        let mut config = Self::load_file(config_path)?;
        config.apply_env();
        config.apply_cli(cli);
        Ok(config)
    }

    /// Reject configurations that cannot run; called before any work starts
    pub fn validate(&self, requirements: Requirements) -> Result<()> {
        if self.worker_count == 0 {
            return Err(Error::Config("worker_count must be at least 1".to_string()));
        }
        if self.max_volumes_to_check == 0 {
            return Err(Error::Config(
                "max_volumes_to_check must be at least 1".to_string(),
            ));
        }
        if requirements.catalog && !self.comicvine_api_key.as_deref().is_some_and(is_valid_key) {
            return Err(Error::Config(format!(
                "Catalog API key not configured. Please configure using one of:\n\
                 1. Command line: --comicvine-key your-key\n\
                 2. Environment: {}=your-key\n\
                 3. TOML config: comicvine_api_key = \"your-key\"",
                ENV_COMICVINE_API_KEY
            )));
        }
        if requirements.completion && !self.anthropic_api_key.as_deref().is_some_and(is_valid_key) {
            return Err(Error::Config(format!(
                "Completion API key not configured (required by the remote parser/selector). \
                 Set {} or anthropic_api_key in the TOML config",
                ENV_ANTHROPIC_API_KEY
            )));
        }
        Ok(())
    }

    pub fn catalog_min_interval(&self) -> Duration {
        Duration::from_millis(self.catalog_min_interval_ms)
    }

    /// Spacing between completion requests derived from the per-minute limit
    pub fn completion_min_interval(&self) -> Duration {
        if self.completion_rate_limit_per_min == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs(60) / self.completion_rate_limit_per_min
        }
    }

    pub fn issue_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.issue_cache_ttl_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_attempts,
            Duration::from_millis(self.retry_base_delay_ms),
        )
    }

    /// Database path with the OS default applied
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(default_database_path)
    }
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// `<config_dir>/cvmatch/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("cvmatch").join("config.toml"))
}

/// OS-dependent default database location
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("cvmatch"))
        .unwrap_or_else(|| PathBuf::from("./cvmatch_data"))
        .join("cvmatch.db")
}

/// Write configuration atomically (temp file + rename)
pub fn write_toml_config(config: &AppConfig, target: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;

    if let Some(parent) = target.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let temp_path = target.with_extension("toml.tmp");
    std::fs::write(&temp_path, content)?;
    std::fs::rename(&temp_path, target)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        // API keys live in this file
        let perms = std::fs::Permissions::from_mode(0o600);
        if let Err(e) = std::fs::set_permissions(target, perms) {
            warn!(path = %target.display(), error = %e, "Could not restrict config file permissions");
        }
    }

    Ok(())
}
