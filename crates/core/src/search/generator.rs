//! Builds the outbound request set for one query.
//!
//! One query fans out into an ordered chain of request tiers. The first tier
//! carries the query as given; when the query has external ids plus free
//! text, a second tier repeats the search text-only, for sites whose id
//! inputs silently return nothing. Within a tier, one request is generated
//! per matching search path. Requests are built eagerly but dispatched one
//! at a time by the facade.

use chrono::Datelike;
use reqwest::{Method, Url};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

use crate::definition::{Definition, IndexerSettings, RequestMethodDef, ResponseKind, SettingKind};
use crate::error::IndexerError;
use crate::filters::apply_filters;
use crate::http::{HttpError, WebRequest};
use crate::template::{self, TemplateValue, VariableScope};

use super::query::{QueryKind, SearchQuery};

/// Every variable a Definition may reference, nil unless the query supplies
/// it. Uniform defaulting keeps templates from tripping over fields the
/// current query kind never sets.
const QUERY_KEYS: &[&str] = &[
    ".Query.Type",
    ".Query.Q",
    ".Query.Keywords",
    ".Query.Limit",
    ".Query.Offset",
    ".Query.Series",
    ".Query.Season",
    ".Query.Ep",
    ".Query.Episode",
    ".Query.Movie",
    ".Query.Year",
    ".Query.IMDBID",
    ".Query.IMDBIDShort",
    ".Query.TMDBID",
    ".Query.TVDBID",
    ".Query.Artist",
    ".Query.Album",
    ".Query.Label",
    ".Query.Track",
    ".Query.Author",
    ".Query.Title",
    ".Keywords",
    ".Categories",
];

/// One ready-to-send request plus everything the parser needs to interpret
/// its response.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub web: WebRequest,
    pub scope: VariableScope,
    pub response: ResponseKind,
}

/// Tiers of requests; a later tier runs only when every earlier tier came
/// back empty.
#[derive(Debug, Default)]
pub struct SearchRequestChain {
    pub tiers: Vec<Vec<SearchRequest>>,
}

impl SearchRequestChain {
    pub fn is_empty(&self) -> bool {
        self.tiers.iter().all(|t| t.is_empty())
    }

    pub fn total_requests(&self) -> usize {
        self.tiers.iter().map(|t| t.len()).sum()
    }
}

/// Variables independent of any query: operator settings and a few
/// constants.
pub fn base_scope(def: &Definition, settings: &IndexerSettings) -> VariableScope {
    let mut scope = VariableScope::new();
    scope.set(".True", "True");
    scope.set_nil(".False");
    scope.set(".Today.Year", chrono::Utc::now().year().to_string());
    for field in &def.settings {
        let key = format!(".Config.{}", field.name);
        match def.setting_value(settings, &field.name) {
            Some(value) if field.kind == SettingKind::Checkbox => {
                if is_truthy_flag(value) {
                    scope.set(key, "True");
                } else {
                    scope.set_nil(key);
                }
            }
            Some(value) => scope.set(key, value),
            None => scope.set_nil(key),
        }
    }
    scope
}

fn is_truthy_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

pub struct RequestGenerator<'a> {
    def: &'a Definition,
    settings: &'a IndexerSettings,
}

impl<'a> RequestGenerator<'a> {
    pub fn new(def: &'a Definition, settings: &'a IndexerSettings) -> Self {
        Self { def, settings }
    }

    pub fn generate(&self, query: &SearchQuery) -> Result<SearchRequestChain, IndexerError> {
        let primary = self.requests_for(query)?;
        let primary_shape = shape_of(&primary);
        let mut tiers = vec![primary];

        if let Some(fallback) = query.without_external_ids() {
            let secondary = self.requests_for(&fallback)?;
            // Sites that ignore the id variables would repeat the identical
            // request; skip the tier then.
            if shape_of(&secondary) != primary_shape {
                tiers.push(secondary);
            }
        }

        debug!(
            indexer = %self.def.id,
            tiers = tiers.len(),
            requests = tiers.iter().map(|t| t.len()).sum::<usize>(),
            "generated search requests"
        );
        Ok(SearchRequestChain { tiers })
    }

    fn requests_for(&self, query: &SearchQuery) -> Result<Vec<SearchRequest>, IndexerError> {
        let map = self.def.category_map();
        let selected = map.to_tracker(&query.categories);
        let scope = self.query_scope(query, &selected)?;
        let base = self.def.base_link(self.settings);
        let delay = self
            .def
            .request_delay_secs
            .filter(|d| *d > 0.0)
            .map(Duration::from_secs_f64);

        let mut requests = Vec::new();
        for path in &self.def.search.paths {
            if !path_applies(&path.categories, &selected) {
                debug!(indexer = %self.def.id, path = %path.path, "path skipped by category filter");
                continue;
            }

            let mut inputs: BTreeMap<String, String> = BTreeMap::new();
            if path.inherit_inputs {
                inputs.extend(self.def.search.inputs.clone());
            }
            inputs.extend(path.inputs.clone());

            let resolved_path = template::resolve(&path.path, &scope)?;
            let url = resolve_url(&base, &resolved_path)?;

            let encoder = |v: &str| urlencoding::encode(v).into_owned();
            let mut query_parts: Vec<String> = Vec::new();
            let mut form: Vec<(String, String)> = Vec::new();
            for (key, value) in &inputs {
                if key == "$raw" {
                    // Pre-assembled querystring fragment; keys and separators
                    // are taken verbatim, substituted values still encoded.
                    let resolved = template::resolve_encoded(value, &scope, &encoder)?;
                    let trimmed = resolved.trim_matches('&');
                    if !trimmed.is_empty() {
                        query_parts.push(trimmed.to_string());
                    }
                } else if path.method == RequestMethodDef::Get {
                    let resolved = template::resolve_encoded(value, &scope, &encoder)?;
                    query_parts.push(format!("{key}={resolved}"));
                } else {
                    form.push((key.clone(), template::resolve(value, &scope)?));
                }
            }

            let mut url = url.to_string();
            if !query_parts.is_empty() {
                url.push(if url.contains('?') { '&' } else { '?' });
                url.push_str(&query_parts.join("&"));
            }

            let method = match path.method {
                RequestMethodDef::Get => Method::GET,
                RequestMethodDef::Post => Method::POST,
            };
            let mut web = WebRequest::new(method, url)
                .with_follow_redirects(path.follow_redirects.unwrap_or(self.def.follow_redirects))
                .with_rate_limit(delay);
            web.form = form;
            for (name, value) in &self.def.search.headers {
                web.headers
                    .push((name.clone(), template::resolve(value, &scope)?));
            }

            requests.push(SearchRequest {
                web,
                scope: scope.clone(),
                response: path.response,
            });
        }
        Ok(requests)
    }

    fn query_scope(
        &self,
        query: &SearchQuery,
        tracker_categories: &[String],
    ) -> Result<VariableScope, IndexerError> {
        let mut scope = base_scope(self.def, self.settings);
        for key in QUERY_KEYS {
            scope.set_nil(*key);
        }
        scope.set(".Query.Type", query.mode());
        let text = query.text.trim();
        if !text.is_empty() {
            scope.set(".Query.Q", text);
        }
        if let Some(limit) = query.limit {
            scope.set(".Query.Limit", limit.to_string());
        }
        if let Some(offset) = query.offset {
            scope.set(".Query.Offset", offset.to_string());
        }

        match &query.kind {
            QueryKind::Generic => {}
            QueryKind::Movie {
                year,
                imdb_id,
                tmdb_id,
            } => {
                if !text.is_empty() {
                    scope.set(".Query.Movie", text);
                }
                if let Some(year) = year {
                    scope.set(".Query.Year", year.to_string());
                }
                if let Some(imdb) = imdb_id {
                    scope.set(".Query.IMDBID", full_imdb_id(imdb));
                    scope.set(".Query.IMDBIDShort", short_imdb_id(imdb));
                }
                if let Some(tmdb) = tmdb_id {
                    scope.set(".Query.TMDBID", tmdb.to_string());
                }
            }
            QueryKind::Tv {
                season,
                episode,
                imdb_id,
                tvdb_id,
            } => {
                if !text.is_empty() {
                    scope.set(".Query.Series", text);
                }
                if let Some(season) = season {
                    scope.set(".Query.Season", season.to_string());
                }
                if let Some(ep) = episode {
                    scope.set(".Query.Ep", ep.to_string());
                }
                if let Some(token) = query.episode_string() {
                    scope.set(".Query.Episode", token);
                }
                if let Some(imdb) = imdb_id {
                    scope.set(".Query.IMDBID", full_imdb_id(imdb));
                    scope.set(".Query.IMDBIDShort", short_imdb_id(imdb));
                }
                if let Some(tvdb) = tvdb_id {
                    scope.set(".Query.TVDBID", tvdb.to_string());
                }
            }
            QueryKind::Music {
                artist,
                album,
                label,
                track,
                year,
            } => {
                for (key, value) in [
                    (".Query.Artist", artist),
                    (".Query.Album", album),
                    (".Query.Label", label),
                    (".Query.Track", track),
                ] {
                    if let Some(value) = value {
                        scope.set(key, value.as_str());
                    }
                }
                if let Some(year) = year {
                    scope.set(".Query.Year", year.to_string());
                }
            }
            QueryKind::Book { author, title } => {
                if let Some(author) = author {
                    scope.set(".Query.Author", author.as_str());
                }
                match title {
                    Some(title) => scope.set(".Query.Title", title.as_str()),
                    None if !text.is_empty() => scope.set(".Query.Title", text),
                    None => {}
                }
            }
        }

        scope.set(
            ".Categories",
            TemplateValue::List(tracker_categories.to_vec()),
        );

        let keywords = self.keywords(query, &scope)?;
        scope.set(".Query.Keywords", keywords.clone());
        scope.set(".Keywords", keywords);
        Ok(scope)
    }

    /// Free-text keywords: the query text plus year (movies) or episode
    /// token (TV), passed through the Definition's keyword filters.
    fn keywords(&self, query: &SearchQuery, scope: &VariableScope) -> Result<String, IndexerError> {
        let mut parts: Vec<String> = Vec::new();
        let text = query.text.trim();
        if !text.is_empty() {
            parts.push(text.to_string());
        }
        if let QueryKind::Movie {
            year: Some(year), ..
        } = &query.kind
        {
            parts.push(year.to_string());
        }
        if let Some(token) = query.episode_string() {
            parts.push(token);
        }
        let assembled = parts.join(" ");
        Ok(apply_filters(
            &assembled,
            &self.def.search.keywords_filters,
            scope,
        )?)
    }
}

/// Category filter on a search path: a leading `!` inverts the match, an
/// empty filter (or an unconstrained query) lets everything through.
fn path_applies(path_categories: &[String], selected: &[String]) -> bool {
    if path_categories.is_empty() || selected.is_empty() {
        return true;
    }
    let inverted = path_categories[0].starts_with('!');
    let listed = |cat: &str| {
        path_categories
            .iter()
            .any(|p| p.trim_start_matches('!').eq_ignore_ascii_case(cat))
    };
    let intersects = selected.iter().any(|s| listed(s));
    if inverted {
        !intersects
    } else {
        intersects
    }
}

fn resolve_url(base: &str, path: &str) -> Result<Url, IndexerError> {
    let bad = |reason: String| {
        IndexerError::Http(HttpError::BadUrl {
            url: path.to_string(),
            reason,
        })
    };
    if path.starts_with("http://") || path.starts_with("https://") {
        return Url::parse(path).map_err(|e| bad(e.to_string()));
    }
    let base = Url::parse(base).map_err(|e| bad(e.to_string()))?;
    base.join(path).map_err(|e| bad(e.to_string()))
}

fn full_imdb_id(id: &str) -> String {
    let id = id.trim();
    if id.starts_with("tt") {
        id.to_string()
    } else {
        format!("tt{id}")
    }
}

fn short_imdb_id(id: &str) -> String {
    id.trim().trim_start_matches("tt").to_string()
}

fn shape_of(requests: &[SearchRequest]) -> Vec<(String, Vec<(String, String)>)> {
    requests
        .iter()
        .map(|r| (r.web.url.clone(), r.web.form.clone()))
        .collect()
}
