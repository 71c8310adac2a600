//! Configuration for the indexer core
//!
//! Process-wide knobs come from the environment ([`CoreConfig::from_env`]);
//! per-indexer settings come from a YAML document ([`load_indexer_settings`]).

use std::collections::BTreeMap;
use std::env;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

/// Core configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Per-request timeout when a request does not set its own
    pub request_timeout: Duration,

    /// Minimum interval between requests to one indexer
    pub default_rate_limit: Duration,

    /// Retries after a network failure (5xx always gets exactly one)
    pub max_retries: u32,

    /// First backoff delay between retries
    pub retry_initial_interval: Duration,

    /// Upper bound for a single backoff delay
    pub retry_max_interval: Duration,

    /// Upper bound on pages fetched per search
    pub max_pages: u32,

    /// How long search results stay cached
    pub cache_ttl: Duration,

    /// Overall deadline for a manager fan-out search
    pub search_timeout: Option<Duration>,

    /// User-Agent sent with every request
    pub user_agent: String,

    /// Optional HTTP/SOCKS proxy for all indexer traffic
    pub proxy_url: Option<String>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(100),
            default_rate_limit: Duration::from_secs(2),
            max_retries: 2,
            retry_initial_interval: Duration::from_millis(500),
            retry_max_interval: Duration::from_secs(10),
            max_pages: 5,
            cache_ttl: Duration::from_secs(300),
            search_timeout: None,
            user_agent: format!("indexer-core/{}", env!("CARGO_PKG_VERSION")),
            proxy_url: None,
        }
    }
}

fn env_millis(name: &str, default: Duration) -> Result<Duration> {
    match env::var(name) {
        Ok(v) => Ok(Duration::from_millis(
            v.parse().with_context(|| format!("Invalid {}", name))?,
        )),
        Err(_) => Ok(default),
    }
}

impl CoreConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            request_timeout: env_millis("INDEXER_REQUEST_TIMEOUT_MS", defaults.request_timeout)?,

            default_rate_limit: env_millis("INDEXER_RATE_LIMIT_MS", defaults.default_rate_limit)?,

            max_retries: env::var("INDEXER_MAX_RETRIES")
                .unwrap_or_else(|_| defaults.max_retries.to_string())
                .parse()
                .context("Invalid INDEXER_MAX_RETRIES")?,

            retry_initial_interval: env_millis(
                "INDEXER_RETRY_INITIAL_MS",
                defaults.retry_initial_interval,
            )?,

            retry_max_interval: env_millis("INDEXER_RETRY_MAX_MS", defaults.retry_max_interval)?,

            max_pages: env::var("INDEXER_MAX_PAGES")
                .unwrap_or_else(|_| defaults.max_pages.to_string())
                .parse()
                .context("Invalid INDEXER_MAX_PAGES")?,

            cache_ttl: env::var("INDEXER_CACHE_TTL_SECS")
                .ok()
                .map(|v| v.parse().map(Duration::from_secs))
                .transpose()
                .context("Invalid INDEXER_CACHE_TTL_SECS")?
                .unwrap_or(defaults.cache_ttl),

            search_timeout: env::var("INDEXER_SEARCH_TIMEOUT_MS")
                .ok()
                .map(|v| v.parse().map(Duration::from_millis))
                .transpose()
                .context("Invalid INDEXER_SEARCH_TIMEOUT_MS")?,

            user_agent: env::var("INDEXER_USER_AGENT").unwrap_or(defaults.user_agent),

            proxy_url: env::var("INDEXER_PROXY_URL").ok().filter(|v| !v.is_empty()),
        })
    }
}

/// Settings for one configured indexer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexerSettings {
    pub id: String,
    /// Adapter type, e.g. `gazelle` or `newznab`
    pub implementation: String,
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub base_url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Overrides [`CoreConfig::default_rate_limit`]
    #[serde(default)]
    pub rate_limit_ms: Option<u64>,
    /// Adapter-specific options
    #[serde(default)]
    pub settings: BTreeMap<String, String>,
}

fn default_enabled() -> bool {
    true
}

impl IndexerSettings {
    pub fn new(id: &str, implementation: &str, base_url: &str) -> Self {
        Self {
            id: id.to_string(),
            implementation: implementation.to_string(),
            name: id.to_string(),
            enabled: true,
            base_url: base_url.to_string(),
            username: None,
            password: None,
            api_key: None,
            rate_limit_ms: None,
            settings: BTreeMap::new(),
        }
    }

    pub fn rate_limit(&self) -> Option<Duration> {
        self.rate_limit_ms.map(Duration::from_millis)
    }

    pub fn setting(&self, key: &str) -> Option<&str> {
        self.settings.get(key).map(String::as_str)
    }

    pub fn setting_bool(&self, key: &str) -> bool {
        self.setting(key)
            .is_some_and(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
    }

    /// Check the fields every adapter relies on
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            bail!("indexer id must not be empty");
        }
        if self.implementation.trim().is_empty() {
            bail!("indexer '{}' has no implementation", self.id);
        }
        url::Url::parse(&self.base_url)
            .with_context(|| format!("indexer '{}' has invalid base_url", self.id))?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct IndexerSettingsFile {
    #[serde(default)]
    indexers: Vec<IndexerSettings>,
}

/// Parse a YAML document with a top-level `indexers:` list
pub fn parse_indexer_settings(yaml: &str) -> Result<Vec<IndexerSettings>> {
    let file: IndexerSettingsFile =
        serde_yaml::from_str(yaml).context("Failed to parse indexer settings")?;

    let mut seen = std::collections::HashSet::new();
    for settings in &file.indexers {
        settings.validate()?;
        if !seen.insert(settings.id.as_str()) {
            bail!("duplicate indexer id '{}'", settings.id);
        }
    }
    Ok(file.indexers)
}

pub fn load_indexer_settings(path: impl AsRef<Path>) -> Result<Vec<IndexerSettings>> {
    let path = path.as_ref();
    let yaml = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse_indexer_settings(&yaml)
}
