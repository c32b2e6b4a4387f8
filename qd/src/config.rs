//! Configuration types and loading

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

/// Main queued configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Seconds between scheduler ticks
    #[serde(rename = "tick-interval-secs")]
    pub tick_interval_secs: u64,

    /// Minimum seconds between processing actions; 0 disables throttling
    #[serde(rename = "rate-limit-secs")]
    pub rate_limit_secs: u64,

    /// Directory holding the cache/queue/archive files and the lock
    #[serde(rename = "state-dir")]
    pub state_dir: PathBuf,

    /// Log level override (TRACE/DEBUG/INFO/WARN/ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Job source command configuration
    pub source: SourceConfig,

    /// Executor command configuration
    pub executor: ExecutorConfig,
}

/// Job source command: prints one item id per line on stdout
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Argv of the command that lists the full current item set
    pub command: Vec<String>,

    /// Fetch timeout in seconds
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,
}

/// Executor command: processes a single item, success by exit code
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Argv of the per-item command; `{id}` is substituted, or the id is
    /// appended when no placeholder is present
    pub command: Vec<String>,
}

fn default_tick_interval_secs() -> u64 {
    60
}

fn default_source_timeout_secs() -> u64 {
    60
}

fn default_state_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("queued")
        .join("state")
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            timeout_secs: default_source_timeout_secs(),
        }
    }
}

impl Config {
    /// Validate configuration before the loop starts.
    ///
    /// The only fatal error class: an invalid config refuses to start at all.
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_secs == 0 {
            return Err(eyre::eyre!("tick-interval-secs must be greater than zero"));
        }
        self.validate_source()?;
        if self.executor.command.is_empty() {
            return Err(eyre::eyre!("executor.command must not be empty"));
        }
        Ok(())
    }

    /// Source-only validation, for commands that never execute items
    pub fn validate_source(&self) -> Result<()> {
        if self.source.command.is_empty() {
            return Err(eyre::eyre!("source.command must not be empty"));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn rate_limit(&self) -> Duration {
        Duration::from_secs(self.rate_limit_secs)
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_secs(self.source.timeout_secs)
    }

    /// Path of the persisted last-action timestamp, inside the state dir
    pub fn last_action_path(&self) -> PathBuf {
        self.state_dir.join("last_action")
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .queued.yml
        let local_config = PathBuf::from(".queued.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/queued/queued.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("queued").join("queued.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval_secs(),
            rate_limit_secs: 0,
            state_dir: default_state_dir(),
            log_level: None,
            source: SourceConfig::default(),
            executor: ExecutorConfig::default(),
        }
    }
}
