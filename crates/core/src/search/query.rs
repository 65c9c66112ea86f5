//! Typed search queries, one flavor per Torznab search mode.

use serde::{Deserialize, Serialize};

use crate::categories::StandardCategory;

/// What the caller is looking for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub kind: QueryKind,
    /// Free-text term; for movie/TV kinds this is the title.
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub categories: Vec<StandardCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
}

/// Kind-specific identifiers. Every field is optional; templates see unset
/// ones as nil.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum QueryKind {
    #[default]
    Generic,
    Movie {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        year: Option<i32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        imdb_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tmdb_id: Option<u32>,
    },
    Tv {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        season: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        episode: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        imdb_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tvdb_id: Option<u32>,
    },
    Music {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        artist: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        album: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        track: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        year: Option<i32>,
    },
    Book {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        author: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },
}

impl SearchQuery {
    pub fn generic(text: impl Into<String>) -> Self {
        Self {
            kind: QueryKind::Generic,
            text: text.into(),
            categories: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    pub fn movie(title: impl Into<String>, year: Option<i32>) -> Self {
        Self {
            kind: QueryKind::Movie {
                year,
                imdb_id: None,
                tmdb_id: None,
            },
            ..Self::generic(title)
        }
    }

    pub fn tv(title: impl Into<String>, season: Option<u32>, episode: Option<u32>) -> Self {
        Self {
            kind: QueryKind::Tv {
                season,
                episode,
                imdb_id: None,
                tvdb_id: None,
            },
            ..Self::generic(title)
        }
    }

    pub fn with_categories(mut self, categories: Vec<StandardCategory>) -> Self {
        self.categories = categories;
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Torznab mode name, used for `.Query.Type` and capability checks.
    pub fn mode(&self) -> &'static str {
        match self.kind {
            QueryKind::Generic => "search",
            QueryKind::Movie { .. } => "movie-search",
            QueryKind::Tv { .. } => "tv-search",
            QueryKind::Music { .. } => "music-search",
            QueryKind::Book { .. } => "book-search",
        }
    }

    /// `S01E05`-style episode token for TV queries, `S01` for season packs.
    pub fn episode_string(&self) -> Option<String> {
        match self.kind {
            QueryKind::Tv {
                season, episode, ..
            } => match (season, episode) {
                (Some(s), Some(e)) => Some(format!("S{s:02}E{e:02}")),
                (Some(s), None) => Some(format!("S{s:02}")),
                (None, Some(e)) => Some(format!("E{e:02}")),
                (None, None) => None,
            },
            _ => None,
        }
    }

    /// True when the query carries an external id that could be searched for
    /// directly instead of the free text.
    pub fn has_external_ids(&self) -> bool {
        match &self.kind {
            QueryKind::Movie {
                imdb_id, tmdb_id, ..
            } => imdb_id.is_some() || tmdb_id.is_some(),
            QueryKind::Tv {
                imdb_id, tvdb_id, ..
            } => imdb_id.is_some() || tvdb_id.is_some(),
            _ => false,
        }
    }

    /// The same query with external ids dropped, for the text-only fallback
    /// tier. Returns `None` when there is nothing to fall back to.
    pub fn without_external_ids(&self) -> Option<Self> {
        if !self.has_external_ids() || self.text.trim().is_empty() {
            return None;
        }
        let mut fallback = self.clone();
        fallback.kind = match fallback.kind {
            QueryKind::Movie { year, .. } => QueryKind::Movie {
                year,
                imdb_id: None,
                tmdb_id: None,
            },
            QueryKind::Tv {
                season, episode, ..
            } => QueryKind::Tv {
                season,
                episode,
                imdb_id: None,
                tvdb_id: None,
            },
            other => other,
        };
        Some(fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_episode_string() {
        assert_eq!(
            SearchQuery::tv("show", Some(1), Some(5)).episode_string(),
            Some("S01E05".to_string())
        );
        assert_eq!(
            SearchQuery::tv("show", Some(12), None).episode_string(),
            Some("S12".to_string())
        );
        assert_eq!(SearchQuery::tv("show", None, None).episode_string(), None);
        assert_eq!(SearchQuery::generic("show").episode_string(), None);
    }

    #[test]
    fn test_mode_names() {
        assert_eq!(SearchQuery::generic("x").mode(), "search");
        assert_eq!(SearchQuery::movie("x", None).mode(), "movie-search");
        assert_eq!(SearchQuery::tv("x", None, None).mode(), "tv-search");
    }

    #[test]
    fn test_fallback_query_drops_ids() {
        let mut query = SearchQuery::movie("The Matrix", Some(1999));
        assert!(query.without_external_ids().is_none());

        query.kind = QueryKind::Movie {
            year: Some(1999),
            imdb_id: Some("tt0133093".to_string()),
            tmdb_id: None,
        };
        let fallback = query.without_external_ids().unwrap();
        assert!(!fallback.has_external_ids());
        assert_eq!(fallback.text, "The Matrix");

        // No text to fall back to.
        query.text = String::new();
        assert!(query.without_external_ids().is_none());
    }
}
