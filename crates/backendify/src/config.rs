//! Configuration loading and validation

use anyhow::{Context, Result, bail};
use backendify_core::CacheKeyMode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub admission: AdmissionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Country code to backend origin
    #[serde(default)]
    pub backends: BTreeMap<String, String>,
    /// File the configuration was read from, `None` when running on defaults
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Upper bound for handling one inbound request
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Fetch engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Worker pool size
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Maximum number of cached companies
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,
    /// How long a request waits for its worker
    #[serde(default = "default_job_timeout_ms")]
    pub job_timeout_ms: u64,
    /// Timeout for a single backend call
    #[serde(default = "default_backend_timeout_ms")]
    pub backend_timeout_ms: u64,
    /// Cache key mode: "id" or "origin_and_id"
    #[serde(default)]
    pub cache_key: CacheKeyMode,
    /// Serve canned companies instead of calling real backends
    #[serde(default)]
    pub mock_backends: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            cache_size: default_cache_size(),
            job_timeout_ms: default_job_timeout_ms(),
            backend_timeout_ms: default_backend_timeout_ms(),
            cache_key: CacheKeyMode::default(),
            mock_backends: false,
        }
    }
}

/// Admission gate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Requests allowed inside the engine at once
    #[serde(default = "default_admission_capacity")]
    pub capacity: usize,
    /// How long a request may wait for admission
    #[serde(default = "default_admission_wait_ms")]
    pub wait_timeout_ms: u64,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            capacity: default_admission_capacity(),
            wait_timeout_ms: default_admission_wait_ms(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// "pretty" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9000
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_workers() -> usize {
    64
}

fn default_cache_size() -> usize {
    10_000
}

fn default_job_timeout_ms() -> u64 {
    10_000
}

fn default_backend_timeout_ms() -> u64 {
    5_000
}

fn default_admission_capacity() -> usize {
    100
}

fn default_admission_wait_ms() -> u64 {
    1_000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Config {
    /// Load configuration from a file, falling back to defaults when it is absent.
    ///
    /// Runs before logging is set up; callers report [`Config::source`] once it is.
    pub fn load(path: &str) -> Result<Self> {
        let config_path = Path::new(path);

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path))?;
        config.source = Some(config_path.to_path_buf());

        Ok(config)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.engine.workers == 0 {
            bail!("engine.workers must be a positive integer");
        }
        if self.engine.cache_size == 0 {
            bail!("engine.cache_size must be a positive integer");
        }
        if self.admission.capacity == 0 {
            bail!("admission.capacity must be a positive integer");
        }
        if self.engine.job_timeout_ms == 0 {
            bail!("engine.job_timeout_ms must be a positive integer");
        }
        if self.engine.backend_timeout_ms == 0 {
            bail!("engine.backend_timeout_ms must be a positive integer");
        }
        if self.server.request_timeout_secs == 0 {
            bail!("server.request_timeout_secs must be a positive integer");
        }
        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            bail!(
                "logging.format must be \"pretty\" or \"json\", got \"{}\"",
                self.logging.format
            );
        }
        Ok(())
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_millis(self.engine.job_timeout_ms)
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_millis(self.engine.backend_timeout_ms)
    }

    pub fn admission_wait(&self) -> Duration {
        Duration::from_millis(self.admission.wait_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }
}
