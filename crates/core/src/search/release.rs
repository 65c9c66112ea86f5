//! The normalized output unit handed to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::categories::StandardCategory;

/// One release as reported by a tracker, normalized. Field semantics are
/// stable for downstream consumers; new fields may be added but existing
/// ones keep their meaning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseRecord {
    pub title: String,
    /// Stable identity within one site: the details URL when known,
    /// otherwise the download link.
    pub guid: String,
    /// Definition id this release came from.
    pub indexer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub magnet_uri: Option<String>,
    /// Lowercase hex BTIH when the site exposes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seeders: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leechers: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grabs: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<StandardCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poster: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imdb_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tmdb_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tvdb_id: Option<u32>,
    /// 0.0 on freeleech torrents, 1.0 normally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_volume_factor: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_volume_factor: Option<f64>,
}

impl ReleaseRecord {
    /// The preferred link for fetching this release: magnet first, then the
    /// site's download endpoint, then the details page.
    pub fn best_link(&self) -> Option<&str> {
        self.magnet_uri
            .as_deref()
            .or(self.download_url.as_deref())
            .or(self.details_url.as_deref())
    }
}
