//! Configuration management for schooldocs.
//!
//! Loads configuration from ${SCHOOLDOCS_HOME}/config.toml with sensible defaults.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Environment variable that overrides `base_url`.
pub const BASE_URL_ENV: &str = "SCHOOLDOCS_BASE_URL";

/// Where the session store keeps its copy of the tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageScope {
    /// Saved to `session.json` and reused by later invocations
    #[default]
    Persistent,
    /// Kept in memory only; gone when the process exits
    Session,
}

impl StorageScope {
    pub fn as_str(self) -> &'static str {
        match self {
            StorageScope::Persistent => "persistent",
            StorageScope::Session => "session",
        }
    }
}

pub mod paths {
    //! Path resolution for schooldocs configuration and data directories.
    //!
    //! SCHOOLDOCS_HOME resolution order:
    //! 1. SCHOOLDOCS_HOME environment variable (if set)
    //! 2. ~/.config/schooldocs (default)

    use std::path::PathBuf;

    /// Returns the schooldocs home directory.
    ///
    /// Checks SCHOOLDOCS_HOME env var first, falls back to ~/.config/schooldocs,
    /// and finally to a relative `.schooldocs` directory when no home exists.
    pub fn schooldocs_home() -> PathBuf {
        if let Ok(home) = std::env::var("SCHOOLDOCS_HOME") {
            return PathBuf::from(home);
        }

        dirs::home_dir().map_or_else(
            || PathBuf::from(".schooldocs"),
            |h| h.join(".config").join("schooldocs"),
        )
    }

    /// Returns the path to the config.toml file.
    pub fn config_path() -> PathBuf {
        schooldocs_home().join("config.toml")
    }

    /// Returns the path to the persisted session file.
    pub fn session_path() -> PathBuf {
        schooldocs_home().join("session.json")
    }

    /// Returns the directory that receives log files.
    pub fn logs_dir() -> PathBuf {
        schooldocs_home().join("logs")
    }
}

fn default_config_template() -> &'static str {
    include_str!("../default_config.toml")
}

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Portal API base URL
    pub base_url: String,
    /// Request timeout in seconds (0 = no timeout)
    pub timeout_secs: u64,
    /// Session storage backend
    pub storage: StorageScope,
    /// Default log filter directive
    pub log_level: String,
}

impl Config {
    pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5000";
    const DEFAULT_TIMEOUT_SECS: u64 = 30;
    const DEFAULT_LOG_LEVEL: &str = "info";

    /// Loads configuration from the default config path.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_path())
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if file doesn't exist.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    /// Resolves the base URL with precedence: env > config > default.
    ///
    /// Trailing slashes are dropped so paths can be appended verbatim.
    ///
    /// # Errors
    /// Returns an error if the chosen URL is not a valid URL.
    pub fn effective_base_url(&self) -> Result<String> {
        let env_url = std::env::var(BASE_URL_ENV).ok();
        resolve_base_url(env_url.as_deref(), Some(&self.base_url))
    }

    pub fn timeout(&self) -> Option<Duration> {
        if self.timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.timeout_secs))
        }
    }

    /// Creates a default config file at the given path.
    /// Returns an error if the file already exists.
    ///
    /// # Errors
    /// Returns an error if the file exists or cannot be written.
    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            anyhow::bail!("Config file already exists at {}", path.display());
        }

        Self::write_config(path, default_config_template())
    }

    /// Writes config content to a file, creating parent directories as needed.
    /// Uses atomic write (temp file + rename) to prevent corruption.
    fn write_config(path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let tmp_path = path.with_extension("toml.tmp");
        fs::write(&tmp_path, content)
            .with_context(|| format!("Failed to write config to {}", tmp_path.display()))?;
        fs::rename(&tmp_path, path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                tmp_path.display(),
                path.display()
            )
        })?;

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: Self::DEFAULT_BASE_URL.to_string(),
            timeout_secs: Self::DEFAULT_TIMEOUT_SECS,
            storage: StorageScope::default(),
            log_level: Self::DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

fn resolve_base_url(env_url: Option<&str>, config_url: Option<&str>) -> Result<String> {
    let chosen = [env_url, config_url]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|url| !url.is_empty())
        .unwrap_or(Config::DEFAULT_BASE_URL);

    url::Url::parse(chosen).with_context(|| format!("Invalid portal base URL: {chosen}"))?;
    Ok(chosen.trim_end_matches('/').to_string())
}
