use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::definition::IndexerSettings;
use crate::http::DEFAULT_USER_AGENT;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub definitions: DefinitionsConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Sites the operator has turned on, with their credentials.
    #[serde(default)]
    pub indexers: Vec<IndexerEntry>,
}

impl EngineConfig {
    /// The entry for one definition id, when configured.
    pub fn indexer(&self, id: &str) -> Option<&IndexerEntry> {
        self.indexers.iter().find(|entry| entry.id == id)
    }
}

/// Outbound HTTP configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpConfig {
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    /// Proxy URL for all outbound traffic (e.g. "socks5://127.0.0.1:9050")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            user_agent: default_user_agent(),
            max_redirects: default_max_redirects(),
            proxy: None,
        }
    }
}

fn default_timeout() -> u64 {
    30
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_max_redirects() -> usize {
    10
}

/// Where definition files live
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DefinitionsConfig {
    #[serde(default = "default_definitions_dir")]
    pub dir: PathBuf,
}

impl Default for DefinitionsConfig {
    fn default() -> Self {
        Self {
            dir: default_definitions_dir(),
        }
    }
}

fn default_definitions_dir() -> PathBuf {
    PathBuf::from("definitions")
}

/// Request pacing applied on top of per-definition delays
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Floor on the spacing between two requests to the same site, in
    /// seconds. A Definition asking for more keeps its own delay.
    #[serde(default)]
    pub min_delay_secs: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            min_delay_secs: 0.0,
        }
    }
}

/// One configured site
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IndexerEntry {
    /// Definition id this entry configures.
    pub id: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Overrides the Definition's first link.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Values for the Definition's declared settings (credentials, flags).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub settings: BTreeMap<String, String>,
}

impl IndexerEntry {
    pub fn to_settings(&self) -> IndexerSettings {
        IndexerSettings {
            base_url: self.base_url.clone(),
            values: self.settings.clone(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

/// Sanitized config for display (credentials redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub http: HttpConfig,
    pub definitions: DefinitionsConfig,
    pub rate_limit: RateLimitConfig,
    pub indexers: Vec<SanitizedIndexerEntry>,
}

/// Sanitized indexer entry (setting values hidden, names kept)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedIndexerEntry {
    pub id: String,
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub settings_configured: Vec<String>,
}

impl From<&EngineConfig> for SanitizedConfig {
    fn from(config: &EngineConfig) -> Self {
        Self {
            http: config.http.clone(),
            definitions: config.definitions.clone(),
            rate_limit: config.rate_limit.clone(),
            indexers: config
                .indexers
                .iter()
                .map(|entry| SanitizedIndexerEntry {
                    id: entry.id.clone(),
                    enabled: entry.enabled,
                    base_url: entry.base_url.clone(),
                    settings_configured: entry.settings.keys().cloned().collect(),
                })
                .collect(),
        }
    }
}
