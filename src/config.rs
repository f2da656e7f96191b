//! Configuration loading
//!
//! Configuration is resolved once at startup from, in increasing priority:
//! 1. Built-in defaults
//! 2. A TOML file at `WEB_SEARCH_CONFIG_PATH`, or `./config.toml` if present
//! 3. `WEB_SEARCH_*`, `SEARXNG_URL` and `SEARXNG_ENGINES` environment variables

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound for every timeout setting, in seconds
pub const MAX_TIMEOUT_SECS: u64 = 3600;
/// Upper bound for `cache.ttl`, in seconds (30 days)
pub const MAX_CACHE_TTL_SECS: u64 = 30 * 24 * 3600;
/// Upper bound for `search.retry_delay_ms`
pub const MAX_RETRY_DELAY_MS: u64 = 60_000;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub search: SearchConfig,
    pub cache: CacheConfig,
    pub extraction: ExtractionConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter used when RUST_LOG is not set
    pub level: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Duckduckgo,
    Searxng,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Duckduckgo => "duckduckgo",
            BackendKind::Searxng => "searxng",
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "duckduckgo" => Ok(BackendKind::Duckduckgo),
            "searxng" => Ok(BackendKind::Searxng),
            other => Err(anyhow!(
                "unknown search backend '{}' (expected duckduckgo or searxng)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub backend: BackendKind,
    /// Server-side cap on results per request
    pub max_results: usize,
    /// Per-attempt backend timeout in seconds
    pub timeout: u64,
    /// Outer deadline in seconds covering querying and extraction
    pub request_timeout: u64,
    pub user_agent_rotation: bool,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub searxng_url: String,
    pub searxng_engines: Option<String>,
    pub duckduckgo_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Entry lifetime in seconds
    pub ttl: u64,
    pub max_size: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Per-page fetch timeout in seconds
    pub timeout: u64,
    /// Response bodies are truncated beyond this many bytes
    pub max_bytes: usize,
    /// Number of pages fetched in parallel for one request
    pub concurrency: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            max_results: 20,
            timeout: 15,
            request_timeout: 30,
            user_agent_rotation: true,
            retry_attempts: 3,
            retry_delay_ms: 1000,
            searxng_url: "http://localhost:8888".to_string(),
            searxng_engines: None,
            duckduckgo_url: "https://html.duckduckgo.com/html/".to_string(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: 3600,
            max_size: 1000,
        }
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            timeout: 10,
            max_bytes: 5 * 1024 * 1024,
            concurrency: 5,
        }
    }
}

impl SearchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl)
    }
}

impl ExtractionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

impl Config {
    /// Load configuration from file and environment. Runs before logging is
    /// set up, so callers report [`Config::source_path`] themselves.
    pub fn load() -> Result<Self> {
        let mut config = match Self::source_path() {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    /// Parse TOML; missing sections and keys keep their defaults
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// The config file `load` reads, if any
    pub fn source_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("WEB_SEARCH_CONFIG_PATH") {
            return Some(PathBuf::from(path));
        }
        let local = PathBuf::from("config.toml");
        local.exists().then_some(local)
    }

    /// Apply overrides from a variable lookup (the process environment in production)
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("WEB_SEARCH_BACKEND") {
            self.search.backend = v.parse()?;
        }
        if let Some(v) = lookup("WEB_SEARCH_MAX_RESULTS") {
            self.search.max_results = parse_var("WEB_SEARCH_MAX_RESULTS", &v)?;
        }
        if let Some(v) = lookup("WEB_SEARCH_TIMEOUT") {
            self.search.timeout = parse_var("WEB_SEARCH_TIMEOUT", &v)?;
        }
        if let Some(v) = lookup("WEB_SEARCH_REQUEST_TIMEOUT") {
            self.search.request_timeout = parse_var("WEB_SEARCH_REQUEST_TIMEOUT", &v)?;
        }
        if let Some(v) = lookup("WEB_SEARCH_USER_AGENT_ROTATION") {
            self.search.user_agent_rotation = parse_bool("WEB_SEARCH_USER_AGENT_ROTATION", &v)?;
        }
        if let Some(v) = lookup("WEB_SEARCH_CACHE_ENABLED") {
            self.cache.enabled = parse_bool("WEB_SEARCH_CACHE_ENABLED", &v)?;
        }
        if let Some(v) = lookup("WEB_SEARCH_CACHE_TTL") {
            self.cache.ttl = parse_var("WEB_SEARCH_CACHE_TTL", &v)?;
        }
        if let Some(v) = lookup("WEB_SEARCH_CACHE_MAX_SIZE") {
            self.cache.max_size = parse_var("WEB_SEARCH_CACHE_MAX_SIZE", &v)?;
        }
        if let Some(v) = lookup("WEB_SEARCH_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = lookup("WEB_SEARCH_HOST") {
            self.server.host = v;
        }
        if let Some(v) = lookup("WEB_SEARCH_PORT") {
            self.server.port = parse_var("WEB_SEARCH_PORT", &v)?;
        }
        // SearXNG settings keep their conventional names
        if let Some(v) = lookup("SEARXNG_URL") {
            self.search.searxng_url = v;
        }
        if let Some(v) = lookup("SEARXNG_ENGINES") {
            self.search.searxng_engines = Some(v).filter(|s| !s.trim().is_empty());
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();
        if !(1..=100).contains(&self.search.max_results) {
            errors.push("search.max_results must be between 1 and 100".to_string());
        }
        if !(1..=MAX_TIMEOUT_SECS).contains(&self.search.timeout) {
            errors.push(format!(
                "search.timeout must be between 1 and {}",
                MAX_TIMEOUT_SECS
            ));
        }
        if !(1..=MAX_TIMEOUT_SECS).contains(&self.search.request_timeout) {
            errors.push(format!(
                "search.request_timeout must be between 1 and {}",
                MAX_TIMEOUT_SECS
            ));
        }
        if self.search.retry_delay_ms > MAX_RETRY_DELAY_MS {
            errors.push(format!(
                "search.retry_delay_ms must be at most {}",
                MAX_RETRY_DELAY_MS
            ));
        }
        if !(1..=10).contains(&self.search.retry_attempts) {
            errors.push("search.retry_attempts must be between 1 and 10".to_string());
        }
        if !(1..=MAX_CACHE_TTL_SECS).contains(&self.cache.ttl) {
            errors.push(format!(
                "cache.ttl must be between 1 and {}",
                MAX_CACHE_TTL_SECS
            ));
        }
        if self.cache.max_size == 0 {
            errors.push("cache.max_size must be positive".to_string());
        }
        if !(1..=20).contains(&self.extraction.concurrency) {
            errors.push("extraction.concurrency must be between 1 and 20".to_string());
        }
        if !(1..=MAX_TIMEOUT_SECS).contains(&self.extraction.timeout) {
            errors.push(format!(
                "extraction.timeout must be between 1 and {}",
                MAX_TIMEOUT_SECS
            ));
        }
        if self.extraction.max_bytes == 0 {
            errors.push("extraction.max_bytes must be positive".to_string());
        }
        if !errors.is_empty() {
            bail!("invalid configuration: {}", errors.join("; "));
        }
        Ok(())
    }

    pub fn snapshot(&self) -> ConfigSnapshot {
        ConfigSnapshot {
            backend: self.search.backend.as_str().to_string(),
            max_results: self.search.max_results.min(crate::types::MAX_RESULTS_LIMIT as usize),
            timeout_seconds: self.search.timeout,
            request_timeout_seconds: self.search.request_timeout,
            user_agent_rotation: self.search.user_agent_rotation,
            retry_attempts: self.search.retry_attempts,
            cache: CacheSnapshot {
                enabled: self.cache.enabled,
                ttl_seconds: self.cache.ttl,
                max_size: self.cache.max_size,
            },
            extraction: ExtractionSnapshot {
                timeout_seconds: self.extraction.timeout,
                max_bytes: self.extraction.max_bytes,
                concurrency: self.extraction.concurrency,
            },
        }
    }
}

fn parse_var<T>(name: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| anyhow!("invalid value '{}' for {}: {}", value, name, e))
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(anyhow!("invalid boolean '{}' for {}", value, name)),
    }
}

/// Effective configuration as reported by `get_search_config`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub backend: String,
    pub max_results: usize,
    pub timeout_seconds: u64,
    pub request_timeout_seconds: u64,
    pub user_agent_rotation: bool,
    pub retry_attempts: u32,
    pub cache: CacheSnapshot,
    pub extraction: ExtractionSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub enabled: bool,
    pub ttl_seconds: u64,
    pub max_size: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionSnapshot {
    pub timeout_seconds: u64,
    pub max_bytes: usize,
    pub concurrency: usize,
}
