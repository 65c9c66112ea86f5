//! Turns raw responses into release records.
//!
//! Failure classification runs in strict precedence order before any
//! extraction: HTTP status, content-type sanity, body markers (built-in
//! phrases, the Definition's error blocks, a missing session marker), then
//! document structure. Only a response that passes all of it is mined for
//! rows; a row missing a mandatory field is dropped and logged while the
//! rest of the batch survives.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

use crate::categories::CategoryMap;
use crate::definition::{Definition, ErrorBlock, ResponseKind};
use crate::error::IndexerError;
use crate::filters;
use crate::http::WebResponse;
use crate::metrics;
use crate::selector::{self, Document, Node, SelectorBlock, SelectorError};
use crate::template::{self, VariableScope};

use super::generator::SearchRequest;
use super::release::ReleaseRecord;

/// Lowercased phrases that mark an anti-bot or challenge page.
const BLOCK_MARKERS: &[&str] = &[
    "ddos-guard",
    "attention required",
    "checking your browser",
    "just a moment",
];

/// Lowercased phrases that mark site-side throttling.
const RATE_MARKERS: &[&str] = &["too many requests", "rate limit exceeded", "slow down"];

/// Lowercased phrases in a Definition error message that mean the session is
/// gone rather than the site being broken.
const LOGIN_MARKERS: &[&str] = &["not logged in", "log in", "login", "session expired"];

/// How much of a body to quote back in diagnostics.
const SNIPPET_LEN: usize = 120;

/// How deep into a body the built-in marker scan looks.
const MARKER_SCAN_LEN: usize = 16 * 1024;

pub struct ResponseParser<'a> {
    def: &'a Definition,
    base: String,
}

impl<'a> ResponseParser<'a> {
    pub fn new(def: &'a Definition, base: impl Into<String>) -> Self {
        Self {
            def,
            base: base.into(),
        }
    }

    /// Interpret one search response.
    pub fn parse(
        &self,
        request: &SearchRequest,
        response: &WebResponse,
    ) -> Result<Vec<ReleaseRecord>, IndexerError> {
        self.check_status(response)?;

        let text = response.text(self.def.encoding.as_deref());
        if request.response == ResponseKind::Json && looks_like_html(&text) {
            return Err(IndexerError::Blocked {
                reason: format!(
                    "HTML response where JSON was expected; body starts: {}",
                    snippet(&text)
                ),
            });
        }
        self.check_builtin_markers(&text)?;

        let doc = match request.response {
            ResponseKind::Html => Document::parse_html(&text),
            ResponseKind::Json => {
                Document::parse_json(&text).map_err(|e| IndexerError::Malformed {
                    reason: format!("{e}; body starts: {}", snippet(&text)),
                })?
            }
        };

        if request.response == ResponseKind::Html {
            self.check_error_blocks(&doc, &self.def.search.error, &request.scope)?;
            self.check_session_marker(&doc)?;
        }

        let rows_selector = self
            .def
            .search
            .rows
            .selector
            .as_deref()
            .ok_or_else(|| IndexerError::Malformed {
                reason: "search.rows has no selector".to_string(),
            })?;
        let rows_selector = template::resolve(rows_selector, &request.scope)?;
        let rows = doc
            .select_all(&rows_selector)
            .map_err(|e| IndexerError::Malformed {
                reason: format!(
                    "rows selector '{rows_selector}' failed: {e}; body starts: {}",
                    snippet(&text)
                ),
            })?;

        let mut records = Vec::with_capacity(rows.len());
        for (idx, row) in rows.iter().enumerate() {
            let values = self.extract_row(*row, &request.scope)?;
            match self.build_record(values) {
                Ok(record) => records.push(record),
                Err(reason) => {
                    warn!(
                        indexer = %self.def.id,
                        row = idx + 1,
                        reason = %reason,
                        "dropping unparsable result row"
                    );
                    metrics::ROWS_DROPPED
                        .with_label_values(&[&self.def.id])
                        .inc();
                }
            }
        }
        debug!(
            indexer = %self.def.id,
            rows = rows.len(),
            records = records.len(),
            "parsed search response"
        );
        Ok(records)
    }

    fn check_status(&self, response: &WebResponse) -> Result<(), IndexerError> {
        match response.status {
            200..=299 => Ok(()),
            401 => Err(IndexerError::Login {
                reason: "HTTP 401 Unauthorized".to_string(),
            }),
            403 => Err(IndexerError::Blocked {
                reason: format!("HTTP 403 Forbidden from {}", response.final_url),
            }),
            429 | 503 => Err(IndexerError::RateLimited {
                indexer: self.def.id.clone(),
                retry_after: response
                    .header("retry-after")
                    .and_then(|v| v.trim().parse::<u64>().ok())
                    .map(Duration::from_secs),
            }),
            status => Err(IndexerError::UnexpectedStatus {
                status,
                url: response.final_url.clone(),
            }),
        }
    }

    fn check_builtin_markers(&self, text: &str) -> Result<(), IndexerError> {
        let head: String = text.chars().take(MARKER_SCAN_LEN).collect();
        let head = head.to_lowercase();
        if let Some(marker) = RATE_MARKERS.iter().find(|m| head.contains(*m)) {
            debug!(indexer = %self.def.id, marker, "rate-limit marker in body");
            return Err(IndexerError::RateLimited {
                indexer: self.def.id.clone(),
                retry_after: None,
            });
        }
        if let Some(marker) = BLOCK_MARKERS.iter().find(|m| head.contains(*m)) {
            return Err(IndexerError::Blocked {
                reason: format!("challenge-page marker '{marker}' in body"),
            });
        }
        Ok(())
    }

    /// Evaluate the Definition's own failure markers.
    fn check_error_blocks(
        &self,
        doc: &Document,
        blocks: &[ErrorBlock],
        scope: &VariableScope,
    ) -> Result<(), IndexerError> {
        for block in blocks {
            let sel = template::resolve(&block.selector, scope)?;
            let matched = doc
                .select_all(&sel)
                .map_err(|e| IndexerError::Malformed {
                    reason: format!("error selector '{sel}' failed: {e}"),
                })?;
            let Some(node) = matched.first() else {
                continue;
            };
            let message = match &block.message {
                Some(message_block) => selector::extract(*node, message_block, scope)?,
                None => selector::extract(*node, &SelectorBlock::default(), scope)?,
            }
            .unwrap_or_else(|| "site reported an error".to_string());
            return Err(classify_site_message(&message, &self.def.id));
        }
        Ok(())
    }

    /// A Definition that can tell logged-in pages apart does so with
    /// `login.test.selector`; its absence from a search response means the
    /// session is gone.
    fn check_session_marker(&self, doc: &Document) -> Result<(), IndexerError> {
        let marker = self
            .def
            .login
            .as_ref()
            .and_then(|l| l.test.as_ref())
            .and_then(|t| t.selector.as_deref());
        let Some(marker) = marker else {
            return Ok(());
        };
        let matched = doc
            .select_all(marker)
            .map_err(|e| IndexerError::Malformed {
                reason: format!("session marker selector '{marker}' failed: {e}"),
            })?;
        if matched.is_empty() {
            return Err(IndexerError::Login {
                reason: format!("session marker '{marker}' missing from response"),
            });
        }
        Ok(())
    }

    /// Raw field values for one row. Filter rejections make a field absent;
    /// template and selector errors are Definition bugs and abort the parse.
    fn extract_row(
        &self,
        row: Node<'_>,
        scope: &VariableScope,
    ) -> Result<BTreeMap<String, String>, IndexerError> {
        let mut values = BTreeMap::new();
        for (name, block) in &self.def.search.fields {
            match selector::extract(row, block, scope) {
                Ok(Some(value)) => {
                    values.insert(name.clone(), value);
                }
                Ok(None) => {}
                Err(SelectorError::Filter(e)) => {
                    debug!(indexer = %self.def.id, field = %name, error = %e, "field filter rejected value");
                }
                Err(other) => return Err(other.into()),
            }
        }
        Ok(values)
    }

    /// Coerce raw values into a record, or explain why the row is unusable.
    fn build_record(&self, values: BTreeMap<String, String>) -> Result<ReleaseRecord, String> {
        let title = values
            .get("title")
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or("mandatory field 'title' is missing")?;

        let details_url = values.get("details").and_then(|v| self.absolute(v));
        let mut download_url = None;
        let mut magnet_uri = values.get("magnet").map(|m| m.trim().to_string());
        if let Some(raw) = values.get("download") {
            if raw.trim().starts_with("magnet:") {
                magnet_uri.get_or_insert_with(|| raw.trim().to_string());
            } else {
                download_url = self.absolute(raw);
            }
        }
        let info_hash = values.get("infohash").and_then(|h| normalize_infohash(h));
        if magnet_uri.is_none() {
            if let Some(hash) = &info_hash {
                magnet_uri = Some(crate::download::magnet_from_hash(hash, &title));
            }
        }

        if download_url.is_none()
            && magnet_uri.is_none()
            && details_url.is_none()
            && info_hash.is_none()
        {
            return Err("no usable link (download/magnet/infohash/details all absent)".to_string());
        }

        let map = self.def.category_map();
        let categories = match values.get("category") {
            Some(raw) => resolve_categories(&map, raw),
            None => vec![map.fallback()],
        };

        let seeders = values.get("seeders").and_then(|v| parse_count(v));
        let leechers = values.get("leechers").and_then(|v| parse_count(v)).or_else(|| {
            values.get("peers").and_then(|v| parse_count(v)).map(|peers| {
                peers.saturating_sub(seeders.unwrap_or(0))
            })
        });

        let guid = details_url
            .clone()
            .or_else(|| download_url.clone())
            .or_else(|| magnet_uri.clone())
            .unwrap_or_else(|| title.clone());

        Ok(ReleaseRecord {
            title,
            guid,
            indexer: self.def.id.clone(),
            details_url,
            download_url,
            magnet_uri,
            info_hash,
            size: values.get("size").and_then(|v| parse_size_value(v)),
            seeders,
            leechers,
            grabs: values.get("grabs").and_then(|v| parse_count(v)),
            files: values.get("files").and_then(|v| parse_count(v)),
            publish_date: values.get("date").and_then(|v| parse_date_value(v)),
            categories,
            description: values.get("description").map(|v| v.trim().to_string()),
            poster: values.get("poster").and_then(|v| self.absolute(v)),
            imdb_id: values.get("imdbid").map(|v| normalize_imdb(v)),
            tmdb_id: values.get("tmdbid").and_then(|v| parse_count(v)),
            tvdb_id: values.get("tvdbid").and_then(|v| parse_count(v)),
            download_volume_factor: values
                .get("downloadvolumefactor")
                .and_then(|v| v.trim().parse().ok()),
            upload_volume_factor: values
                .get("uploadvolumefactor")
                .and_then(|v| v.trim().parse().ok()),
        })
    }

    /// Resolve a possibly relative link against the site base. Magnet and
    /// absolute links pass through.
    fn absolute(&self, link: &str) -> Option<String> {
        let link = link.trim();
        if link.is_empty() {
            return None;
        }
        if link.starts_with("magnet:") || link.starts_with("http://") || link.starts_with("https://")
        {
            return Some(link.to_string());
        }
        reqwest::Url::parse(&self.base)
            .and_then(|base| base.join(link))
            .map(|u| u.to_string())
            .ok()
    }
}

/// Tracker categories may arrive as a comma-separated list.
fn resolve_categories(map: &CategoryMap, raw: &str) -> Vec<crate::categories::StandardCategory> {
    let mut out = Vec::new();
    for part in raw.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        for cat in map.to_standard(part) {
            if !out.contains(&cat) {
                out.push(cat);
            }
        }
    }
    if out.is_empty() {
        out.push(map.fallback());
    }
    out
}

fn classify_site_message(message: &str, indexer: &str) -> IndexerError {
    let lower = message.to_lowercase();
    if RATE_MARKERS.iter().any(|m| lower.contains(m)) {
        return IndexerError::RateLimited {
            indexer: indexer.to_string(),
            retry_after: None,
        };
    }
    if LOGIN_MARKERS.iter().any(|m| lower.contains(m)) {
        return IndexerError::Login {
            reason: message.trim().to_string(),
        };
    }
    IndexerError::Blocked {
        reason: message.trim().to_string(),
    }
}

fn looks_like_html(text: &str) -> bool {
    let head: String = text
        .trim_start()
        .chars()
        .take(256)
        .collect::<String>()
        .to_lowercase();
    head.starts_with("<!doctype html") || head.starts_with("<html") || head.contains("<html")
}

fn snippet(text: &str) -> String {
    text.trim_start().chars().take(SNIPPET_LEN).collect()
}

/// "1,234" and "12" both parse; "-" and "" do not.
fn parse_count(text: &str) -> Option<u32> {
    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

fn parse_size_value(text: &str) -> Option<u64> {
    match filters::size::parse_size(text) {
        Ok(bytes) => Some(bytes),
        Err(reason) => {
            debug!(input = %text, %reason, "unparsable size value");
            None
        }
    }
}

fn parse_date_value(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| filters::date::parse_fuzzy(text).map_err(|_| ()))
        .ok()
        .or_else(|| {
            debug!(input = %text, "unparsable date value");
            None
        })
}

fn normalize_infohash(raw: &str) -> Option<String> {
    let hash = raw.trim().to_lowercase();
    if hash.len() == 40 && hash.chars().all(|c| c.is_ascii_hexdigit()) {
        return Some(hash);
    }
    None
}

fn normalize_imdb(raw: &str) -> String {
    let raw = raw.trim();
    if raw.starts_with("tt") {
        raw.to_string()
    } else {
        format!("tt{raw}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categories::StandardCategory;
    use crate::definition::from_toml_str;
    use crate::http::{Cookie, WebRequest};

    const HTML_DEF: &str = r#"
id = "parse-demo"
name = "Parse Demo"
links = ["https://demo.example/"]

[caps]

[[caps.categories]]
tracker = "41"
standard = "Movies/HD"

[search]

[[search.paths]]
path = "browse.php"

[search.rows]
selector = "table.torrents > tbody > tr"

[search.fields.title]
selector = "a.name"

[search.fields.details]
selector = "a.name"
attribute = "href"

[search.fields.download]
selector = "a.dl"
attribute = "href"

[search.fields.size]
selector = "td.size"

[search.fields.seeders]
selector = "td.seed"

[search.fields.peers]
selector = "td.peers"

[search.fields.category]
selector = "td.cat"

[search.fields.date]
selector = "td.added"
"#;

    const PAGE: &str = r#"<html><body>
<table class="torrents"><tbody>
<tr>
  <td><a class="name" href="details.php?id=1">Alpha Release 1080p</a></td>
  <td class="cat">41</td><td class="size">1.5 GB</td>
  <td class="seed">12</td><td class="peers">30</td>
  <td class="added">2024-06-15T10:30:00Z</td>
  <td><a class="dl" href="download.php?id=1">get</a></td>
</tr>
<tr>
  <td><span class="broken">no title anchor here</span></td>
  <td class="cat">41</td><td class="size">700 MB</td>
  <td class="seed">1</td><td class="peers">2</td>
  <td class="added">2024-06-14</td>
  <td><a class="dl" href="download.php?id=2">get</a></td>
</tr>
<tr>
  <td><a class="name" href="details.php?id=3">Gamma Release 720p</a></td>
  <td class="cat">99</td><td class="size">700 MB</td>
  <td class="seed">3</td><td class="peers">7</td>
  <td class="added">2024-06-13T08:00:00Z</td>
  <td><a class="dl" href="download.php?id=3">get</a></td>
</tr>
</tbody></table>
</body></html>"#;

    fn html_request() -> SearchRequest {
        SearchRequest {
            web: WebRequest::get("https://demo.example/browse.php"),
            scope: VariableScope::new(),
            response: ResponseKind::Html,
        }
    }

    fn json_request() -> SearchRequest {
        SearchRequest {
            response: ResponseKind::Json,
            ..html_request()
        }
    }

    fn response(status: u16, content_type: &str, body: &str) -> WebResponse {
        WebResponse {
            status,
            final_url: "https://demo.example/browse.php".to_string(),
            headers: vec![("content-type".to_string(), content_type.to_string())],
            body: body.as_bytes().to_vec(),
            cookies: Vec::<Cookie>::new(),
        }
    }

    #[test]
    fn test_rows_parse_and_middle_row_drops() {
        let def = from_toml_str(HTML_DEF).unwrap();
        let parser = ResponseParser::new(&def, "https://demo.example/");
        let records = parser
            .parse(&html_request(), &response(200, "text/html", PAGE))
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].title, "Alpha Release 1080p");
        assert_eq!(records[1].title, "Gamma Release 720p");
    }

    #[test]
    fn test_field_coercion() {
        let def = from_toml_str(HTML_DEF).unwrap();
        let parser = ResponseParser::new(&def, "https://demo.example/");
        let records = parser
            .parse(&html_request(), &response(200, "text/html", PAGE))
            .unwrap();

        let first = &records[0];
        assert_eq!(first.size, Some(1_610_612_736));
        assert_eq!(first.seeders, Some(12));
        // peers = seeders + leechers on this site
        assert_eq!(first.leechers, Some(18));
        assert_eq!(first.categories, vec![StandardCategory::MoviesHd]);
        assert_eq!(
            first.download_url.as_deref(),
            Some("https://demo.example/download.php?id=1")
        );
        assert_eq!(
            first.details_url.as_deref(),
            Some("https://demo.example/details.php?id=1")
        );
        assert_eq!(first.guid, "https://demo.example/details.php?id=1");
        assert_eq!(
            first.publish_date.map(|d| d.to_rfc3339()),
            Some("2024-06-15T10:30:00+00:00".to_string())
        );

        // Unmapped tracker category 99 falls back.
        assert_eq!(records[1].categories, vec![StandardCategory::Other]);
    }

    #[test]
    fn test_status_mapping() {
        let def = from_toml_str(HTML_DEF).unwrap();
        let parser = ResponseParser::new(&def, "https://demo.example/");
        let parse = |status: u16| parser.parse(&html_request(), &response(status, "text/html", ""));

        assert!(matches!(
            parse(401).unwrap_err(),
            IndexerError::Login { .. }
        ));
        assert!(matches!(
            parse(403).unwrap_err(),
            IndexerError::Blocked { .. }
        ));
        assert!(matches!(
            parse(429).unwrap_err(),
            IndexerError::RateLimited { .. }
        ));
        assert!(matches!(
            parse(503).unwrap_err(),
            IndexerError::RateLimited { .. }
        ));
        assert!(matches!(
            parse(404).unwrap_err(),
            IndexerError::UnexpectedStatus { status: 404, .. }
        ));
        assert!(matches!(
            parse(500).unwrap_err(),
            IndexerError::UnexpectedStatus { status: 500, .. }
        ));
    }

    #[test]
    fn test_retry_after_header_is_surfaced() {
        let def = from_toml_str(HTML_DEF).unwrap();
        let parser = ResponseParser::new(&def, "https://demo.example/");
        let mut resp = response(429, "text/html", "");
        resp.headers
            .push(("Retry-After".to_string(), "120".to_string()));

        match parser.parse(&html_request(), &resp).unwrap_err() {
            IndexerError::RateLimited { retry_after, .. } => {
                assert_eq!(retry_after, Some(Duration::from_secs(120)));
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_rows_is_zero_results() {
        let def = from_toml_str(HTML_DEF).unwrap();
        let parser = ResponseParser::new(&def, "https://demo.example/");
        let records = parser
            .parse(
                &html_request(),
                &response(200, "text/html", "<html><body>nothing here</body></html>"),
            )
            .unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_rate_limit_body_marker() {
        let def = from_toml_str(HTML_DEF).unwrap();
        let parser = ResponseParser::new(&def, "https://demo.example/");
        let err = parser
            .parse(
                &html_request(),
                &response(
                    200,
                    "text/html",
                    "<html><body><h1>Too many requests</h1></body></html>",
                ),
            )
            .unwrap_err();
        assert!(matches!(err, IndexerError::RateLimited { .. }));
    }

    #[test]
    fn test_definition_error_blocks() {
        let def_toml = format!(
            "{HTML_DEF}\n[[search.error]]\nselector = \"div.alert\"\n"
        );
        let def = from_toml_str(&def_toml).unwrap();
        let parser = ResponseParser::new(&def, "https://demo.example/");

        let err = parser
            .parse(
                &html_request(),
                &response(
                    200,
                    "text/html",
                    r#"<html><body><div class="alert">Tracker is under maintenance</div></body></html>"#,
                ),
            )
            .unwrap_err();
        match err {
            IndexerError::Blocked { reason } => {
                assert_eq!(reason, "Tracker is under maintenance")
            }
            other => panic!("expected Blocked, got {other:?}"),
        }

        let err = parser
            .parse(
                &html_request(),
                &response(
                    200,
                    "text/html",
                    r#"<html><body><div class="alert">You are not logged in</div></body></html>"#,
                ),
            )
            .unwrap_err();
        assert!(matches!(err, IndexerError::Login { .. }));
    }

    const LOGIN_MARKER_DEF_TAIL: &str = r#"
[login]
method = "cookie"

[login.inputs]
cookie = "uid=1"

[login.test]
selector = 'a[href="logout.php"]'
"#;

    #[test]
    fn test_missing_session_marker_triggers_login_error() {
        let def_toml = format!("{HTML_DEF}{LOGIN_MARKER_DEF_TAIL}");
        let def = from_toml_str(&def_toml).unwrap();
        let parser = ResponseParser::new(&def, "https://demo.example/");

        // No logout link anywhere: the session is gone.
        let err = parser
            .parse(&html_request(), &response(200, "text/html", PAGE))
            .unwrap_err();
        assert!(matches!(err, IndexerError::Login { .. }));

        // With the marker present the same page parses normally.
        let page = PAGE.replace(
            "<table class=\"torrents\">",
            "<a href=\"logout.php\">logout</a><table class=\"torrents\">",
        );
        let records = parser
            .parse(&html_request(), &response(200, "text/html", &page))
            .unwrap();
        assert_eq!(records.len(), 2);
    }

    const JSON_DEF: &str = r#"
id = "json-demo"
name = "Json Demo"
links = ["https://api.example/"]

[caps]

[search]

[[search.paths]]
path = "v1/search"
response = "json"

[search.rows]
selector = "results"

[search.fields.title]
selector = "name"

[search.fields.download]
selector = "link"

[search.fields.size]
selector = "size_bytes"

[search.fields.infohash]
selector = "hash"
"#;

    const JSON_BODY: &str = r#"{
  "results": [
    {"name": "Alpha", "link": "https://api.example/dl/1", "size_bytes": "123456",
     "hash": "AA97B1779BB2C9B41C4E4E2EDED8C2AF4A4A4A4A"},
    {"name": "Beta", "link": "https://api.example/dl/2", "size_bytes": "99"}
  ]
}"#;

    #[test]
    fn test_json_rows() {
        let def = from_toml_str(JSON_DEF).unwrap();
        let parser = ResponseParser::new(&def, "https://api.example/");
        let records = parser
            .parse(&json_request(), &response(200, "application/json", JSON_BODY))
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].title, "Alpha");
        assert_eq!(records[0].size, Some(123_456));
        assert_eq!(
            records[0].info_hash.as_deref(),
            Some("aa97b1779bb2c9b41c4e4e2eded8c2af4a4a4a4a")
        );
        assert_eq!(records[1].info_hash, None);
    }

    #[test]
    fn test_html_body_when_json_expected_is_blocked() {
        let def = from_toml_str(JSON_DEF).unwrap();
        let parser = ResponseParser::new(&def, "https://api.example/");
        let err = parser
            .parse(
                &json_request(),
                &response(200, "text/html", "<html><body>intercepted</body></html>"),
            )
            .unwrap_err();
        assert!(matches!(err, IndexerError::Blocked { .. }));
    }

    #[test]
    fn test_invalid_json_is_malformed() {
        let def = from_toml_str(JSON_DEF).unwrap();
        let parser = ResponseParser::new(&def, "https://api.example/");
        let err = parser
            .parse(&json_request(), &response(200, "application/json", "{nope"))
            .unwrap_err();
        match err {
            IndexerError::Malformed { reason } => assert!(reason.contains("body starts")),
            other => panic!("expected Malformed, got {other:?}"),
        }
    }

    #[test]
    fn test_infohash_only_site_builds_magnet() {
        let def = from_toml_str(JSON_DEF).unwrap();
        let parser = ResponseParser::new(&def, "https://api.example/");
        let body = r#"{"results": [
            {"name": "Hash Only", "hash": "aa97b1779bb2c9b41c4e4e2eded8c2af4a4a4a4a"}
        ]}"#;
        // Definition has a download selector that yields nothing for this row.
        let records = parser
            .parse(&json_request(), &response(200, "application/json", body))
            .unwrap();
        assert_eq!(records.len(), 1);
        let magnet = records[0].magnet_uri.as_deref().unwrap();
        assert!(magnet.starts_with("magnet:?xt=urn:btih:aa97b177"));
        assert!(magnet.contains("Hash%20Only"));
    }

    #[test]
    fn test_helpers() {
        assert_eq!(parse_count("1,234"), Some(1234));
        assert_eq!(parse_count("-"), None);
        assert_eq!(normalize_imdb("0133093"), "tt0133093");
        assert_eq!(normalize_imdb("tt0133093"), "tt0133093");
        assert!(normalize_infohash("xyz").is_none());
    }
}
