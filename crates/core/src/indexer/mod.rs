//! The per-site facade tying the engine together.
//!
//! One [`SiteIndexer`] drives one Definition end to end: login when the
//! site wants one, request generation, rate-limited dispatch, response
//! parsing, and a single transparent re-login when the site drops the
//! session mid-flight. [`MultiIndexer`] fans a query out across sites.

mod multi;

pub use multi::{MultiIndexer, MultiSearchOutcome};

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::definition::{Definition, IndexerSettings, SearchMode};
use crate::download::{DownloadPayload, DownloadResolver};
use crate::error::IndexerError;
use crate::http::{CookieStore, HttpClient, MemoryCookieStore, WebResponse};
use crate::metrics;
use crate::ratelimit::RateLimiter;
use crate::search::{
    base_scope, ReleaseRecord, RequestGenerator, ResponseParser, SearchQuery, SearchRequest,
};
use crate::session::{self, CaptchaChallenge, SessionState, SessionStateMachine};
use crate::template::VariableScope;

/// What one site supports, for callers deciding where to route a query.
#[derive(Debug, Clone, Serialize)]
pub struct IndexerCapabilities {
    pub id: String,
    pub name: String,
    pub language: String,
    pub needs_login: bool,
    pub search_modes: Vec<SearchMode>,
    pub categories: Vec<CategoryCapability>,
}

/// One tracker category and the standard category it maps onto.
#[derive(Debug, Clone, Serialize)]
pub struct CategoryCapability {
    pub tracker: String,
    pub id: u32,
    pub name: String,
}

/// A single site, ready to search.
pub struct SiteIndexer {
    def: Arc<Definition>,
    settings: IndexerSettings,
    base: String,
    http: Arc<dyn HttpClient>,
    session: SessionStateMachine,
    limiter: Option<RateLimiter>,
}

impl SiteIndexer {
    /// Build an indexer with in-process cookie persistence.
    pub fn new(def: Arc<Definition>, settings: IndexerSettings, http: Arc<dyn HttpClient>) -> Self {
        Self::with_cookie_store(def, settings, http, Arc::new(MemoryCookieStore::new()))
    }

    /// Build an indexer whose session cookies survive in the given store.
    pub fn with_cookie_store(
        def: Arc<Definition>,
        settings: IndexerSettings,
        http: Arc<dyn HttpClient>,
        store: Arc<dyn CookieStore>,
    ) -> Self {
        let base = def.base_link(&settings);
        let session = SessionStateMachine::new(
            Arc::clone(&def),
            base.clone(),
            Arc::clone(&http),
            store,
        );
        let limiter = RateLimiter::from_delay_secs(def.request_delay_secs);
        Self {
            def,
            settings,
            base,
            http,
            session,
            limiter,
        }
    }

    pub fn id(&self) -> &str {
        &self.def.id
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    /// The effective base URL, operator override included.
    pub fn base_url(&self) -> &str {
        &self.base
    }

    pub fn definition(&self) -> &Definition {
        &self.def
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    /// The captcha challenge blocking login, when there is one.
    pub async fn pending_captcha(&self) -> Option<CaptchaChallenge> {
        self.session.pending_challenge().await
    }

    /// Hand in the operator's answer to a pending captcha. The next search
    /// retries the login with it.
    pub async fn supply_captcha_answer(&self, answer: impl Into<String>) {
        self.session.supply_captcha_answer(answer).await;
    }

    /// Drop the session and its persisted cookies.
    pub async fn logout(&self) {
        self.session.invalidate().await;
    }

    pub fn capabilities(&self) -> IndexerCapabilities {
        IndexerCapabilities {
            id: self.def.id.clone(),
            name: self.def.name.clone(),
            language: self.def.language.clone(),
            needs_login: self.def.login.is_some(),
            search_modes: self.def.caps.search_modes.clone(),
            categories: self
                .def
                .caps
                .categories
                .iter()
                .map(|mapping| CategoryCapability {
                    tracker: mapping.tracker.clone(),
                    id: mapping.standard.id(),
                    name: mapping.standard.name().to_string(),
                })
                .collect(),
        }
    }

    /// Run one query against the site.
    ///
    /// Request tiers run in order; the first tier that yields rows wins.
    /// Within a tier an unusable response only costs that request, while a
    /// rate limit or block stops the remaining requests and returns what
    /// was already collected, if anything.
    pub async fn search(&self, query: &SearchQuery) -> Result<Vec<ReleaseRecord>, IndexerError> {
        let started = Instant::now();
        let scope = base_scope(&self.def, &self.settings);
        self.session.ensure_logged_in(&scope).await.map_err(|e| {
            metrics::SEARCHES
                .with_label_values(&[&self.def.id, "error"])
                .inc();
            e
        })?;

        let chain = RequestGenerator::new(&self.def, &self.settings).generate(query)?;
        let mut relogged = false;

        for (tier, requests) in chain.tiers.iter().enumerate() {
            let mut collected = Vec::new();
            let mut aborted = None;

            for request in requests {
                match self.run_request(request, &scope, &mut relogged).await {
                    Ok(records) => collected.extend(records),
                    Err(IndexerError::Malformed { reason }) => {
                        warn!(
                            indexer = %self.def.id,
                            %reason,
                            "skipping unusable response"
                        );
                    }
                    Err(err) if err.is_site_level() => {
                        aborted = Some(err);
                        break;
                    }
                    Err(err) => {
                        metrics::SEARCHES
                            .with_label_values(&[&self.def.id, "error"])
                            .inc();
                        return Err(err);
                    }
                }
            }

            if let Some(err) = aborted {
                if collected.is_empty() {
                    metrics::SEARCHES
                        .with_label_values(&[&self.def.id, "error"])
                        .inc();
                    return Err(err);
                }
                warn!(indexer = %self.def.id, error = %err, "returning partial results");
                return Ok(self.finish(query, collected, started));
            }
            if !collected.is_empty() {
                if tier > 0 {
                    debug!(indexer = %self.def.id, tier, "fallback tier produced results");
                }
                return Ok(self.finish(query, collected, started));
            }
        }

        metrics::SEARCHES
            .with_label_values(&[&self.def.id, "empty"])
            .inc();
        metrics::SEARCH_DURATION
            .with_label_values(&[&self.def.id])
            .observe(started.elapsed().as_secs_f64());
        Ok(Vec::new())
    }

    /// Resolve a release link into something a torrent client can ingest.
    pub async fn download(&self, link: &str) -> Result<DownloadPayload, IndexerError> {
        let scope = base_scope(&self.def, &self.settings);
        self.session.ensure_logged_in(&scope).await?;
        if let Some(limiter) = &self.limiter {
            limiter.acquire().await;
        }

        let resolver = DownloadResolver::new(&self.def, &self.base, self.http.as_ref());
        let outcome = resolver
            .resolve(link, &self.session.cookies().await, &scope)
            .await;
        let payload = match outcome {
            Err(err) if err.is_auth_failure() && self.def.login.is_some() => {
                info!(indexer = %self.def.id, "session rejected during download, logging in again");
                metrics::SESSION_RECOVERIES
                    .with_label_values(&[&self.def.id])
                    .inc();
                self.session.invalidate().await;
                self.session.ensure_logged_in(&scope).await?;
                resolver
                    .resolve(link, &self.session.cookies().await, &scope)
                    .await?
            }
            other => other?,
        };

        let kind = if payload.is_magnet() { "magnet" } else { "torrent" };
        metrics::DOWNLOADS
            .with_label_values(&[&self.def.id, kind])
            .inc();
        Ok(payload)
    }

    /// Probe the site with a keywordless search. Returns the row count, so
    /// a healthy-but-empty site is distinguishable from a broken one.
    pub async fn test(&self) -> Result<usize, IndexerError> {
        let records = self.search(&SearchQuery::generic("")).await?;
        Ok(records.len())
    }

    async fn run_request(
        &self,
        request: &SearchRequest,
        scope: &VariableScope,
        relogged: &mut bool,
    ) -> Result<Vec<ReleaseRecord>, IndexerError> {
        match self.dispatch(request).await {
            Err(err) if err.is_auth_failure() && !*relogged && self.def.login.is_some() => {
                *relogged = true;
                info!(
                    indexer = %self.def.id,
                    error = %err,
                    "session rejected mid-search, logging in again"
                );
                metrics::SESSION_RECOVERIES
                    .with_label_values(&[&self.def.id])
                    .inc();
                self.session.invalidate().await;
                self.session.ensure_logged_in(scope).await?;
                self.dispatch(request).await
            }
            outcome => outcome,
        }
    }

    async fn dispatch(&self, request: &SearchRequest) -> Result<Vec<ReleaseRecord>, IndexerError> {
        if let Some(limiter) = &self.limiter {
            limiter.acquire().await;
        }
        let mut web = request.web.clone();
        web.cookies = self.session.cookies().await;
        debug!(indexer = %self.def.id, url = %web.url, "fetching search page");
        let response = self.http.execute(web).await?;
        self.check_landing_domain(&request.web.url, &response)?;
        ResponseParser::new(&self.def, &self.base).parse(request, &response)
    }

    /// A response from a host other than the configured one means the site
    /// moved or an interstitial took over. For login sites the session
    /// machinery gets a shot at it; otherwise it is a block.
    fn check_landing_domain(
        &self,
        requested: &str,
        response: &WebResponse,
    ) -> Result<(), IndexerError> {
        let Some(hint) = session::foreign_domain_hint(requested, &response.final_url) else {
            return Ok(());
        };
        if self.def.login.is_some() {
            Err(IndexerError::Login { reason: hint })
        } else {
            Err(IndexerError::Blocked { reason: hint })
        }
    }

    fn finish(
        &self,
        query: &SearchQuery,
        records: Vec<ReleaseRecord>,
        started: Instant,
    ) -> Vec<ReleaseRecord> {
        let mut seen = HashSet::new();
        let mut unique: Vec<ReleaseRecord> = records
            .into_iter()
            .filter(|r| seen.insert(r.guid.clone()))
            .collect();
        if let Some(limit) = query.limit {
            unique.truncate(limit as usize);
        }
        metrics::SEARCHES
            .with_label_values(&[&self.def.id, "ok"])
            .inc();
        metrics::SEARCH_RESULTS
            .with_label_values(&[])
            .observe(unique.len() as f64);
        metrics::SEARCH_DURATION
            .with_label_values(&[&self.def.id])
            .observe(started.elapsed().as_secs_f64());
        unique
    }
}

impl std::fmt::Debug for SiteIndexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SiteIndexer")
            .field("id", &self.def.id)
            .field("base", &self.base)
            .field("state", &self.session.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::from_toml_str;
    use crate::http::{HttpError, WebRequest};
    use crate::testing::{fixtures, MockHttpClient};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const OPEN_DEF: &str = r#"
id = "open-demo"
name = "Open Demo"
links = ["https://mock.example/"]

[caps]

[[caps.categories]]
tracker = "18"
standard = "TV/HD"

[search]

[[search.paths]]
path = "browse.php"

[search.inputs]
q = "{{ .Keywords }}"

[search.rows]
selector = "tr.row"

[search.fields.title]
selector = "a.t"

[search.fields.details]
selector = "a.t"
attribute = "href"

[search.fields.download]
selector = "a.d"
attribute = "href"

[search.fields.category]
selector = "td.c"
"#;

    const OPEN_PAGE: &str = r#"<html><body><table>
<tr class="row"><td class="c">18</td><td><a class="t" href="/d.php?id=1">Alpha S01E01</a></td><td><a class="d" href="/get.php?id=1">get</a></td></tr>
<tr class="row"><td class="c">18</td><td><a class="t" href="/d.php?id=2">Alpha S01E02</a></td><td><a class="d" href="/get.php?id=2">get</a></td></tr>
</table></body></html>"#;

    fn open_indexer(http: Arc<MockHttpClient>) -> SiteIndexer {
        let def = Arc::new(from_toml_str(OPEN_DEF).unwrap());
        SiteIndexer::new(def, IndexerSettings::default(), http)
    }

    #[tokio::test]
    async fn test_search_returns_parsed_rows() {
        let http = Arc::new(MockHttpClient::new());
        http.queue_response(fixtures::html_response(OPEN_PAGE)).await;
        let indexer = open_indexer(Arc::clone(&http));

        let records = indexer
            .search(&SearchQuery::generic("alpha"))
            .await
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].title, "Alpha S01E01");
        assert_eq!(
            records[0].details_url.as_deref(),
            Some("https://mock.example/d.php?id=1")
        );
        let requests = http.recorded_requests().await;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url, "https://mock.example/browse.php?q=alpha");
    }

    #[tokio::test]
    async fn test_duplicate_guids_collapse() {
        let page = r#"<html><body><table>
<tr class="row"><td><a class="t" href="/d.php?id=1">Alpha</a></td><td><a class="d" href="/get.php?id=1">g</a></td></tr>
<tr class="row"><td><a class="t" href="/d.php?id=1">Alpha</a></td><td><a class="d" href="/get.php?id=1">g</a></td></tr>
</table></body></html>"#;
        let http = Arc::new(MockHttpClient::new());
        http.queue_response(fixtures::html_response(page)).await;
        let indexer = open_indexer(Arc::clone(&http));

        let records = indexer.search(&SearchQuery::generic("alpha")).await.unwrap();
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn test_limit_truncates_results() {
        let http = Arc::new(MockHttpClient::new());
        http.queue_response(fixtures::html_response(OPEN_PAGE)).await;
        let indexer = open_indexer(Arc::clone(&http));

        let records = indexer
            .search(&SearchQuery::generic("alpha").with_limit(1))
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn test_blocked_response_is_an_error() {
        let http = Arc::new(MockHttpClient::new());
        http.queue_response(fixtures::status_response(403)).await;
        let indexer = open_indexer(Arc::clone(&http));

        let err = indexer
            .search(&SearchQuery::generic("alpha"))
            .await
            .unwrap_err();
        assert!(matches!(err, IndexerError::Blocked { .. }));
    }

    #[tokio::test]
    async fn test_foreign_landing_domain_blocks_open_site() {
        let http = Arc::new(MockHttpClient::new());
        let mut response = fixtures::html_response(OPEN_PAGE);
        response.final_url = "https://seized.example/notice".to_string();
        http.queue_response(response).await;
        let indexer = open_indexer(Arc::clone(&http));

        let err = indexer
            .search(&SearchQuery::generic("alpha"))
            .await
            .unwrap_err();
        match err {
            IndexerError::Blocked { reason } => {
                assert!(reason.contains("seized.example"), "reason: {reason}")
            }
            other => panic!("expected Blocked, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_capabilities_reflect_definition() {
        let http = Arc::new(MockHttpClient::new());
        let indexer = open_indexer(http);

        let caps = indexer.capabilities();
        assert_eq!(caps.id, "open-demo");
        assert!(!caps.needs_login);
        assert_eq!(caps.categories.len(), 1);
        assert_eq!(caps.categories[0].tracker, "18");
        assert_eq!(caps.categories[0].name, "TV/HD");
        assert_eq!(caps.categories[0].id, 5040);
    }

    #[tokio::test]
    async fn test_magnet_download_needs_no_network() {
        let http = Arc::new(MockHttpClient::new());
        let indexer = open_indexer(Arc::clone(&http));

        let magnet = "magnet:?xt=urn:btih:aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
        let payload = indexer.download(magnet).await.unwrap();
        assert!(matches!(payload, DownloadPayload::Magnet(ref m) if m == magnet));
        assert_eq!(http.request_count().await, 0);
    }

    const LOGIN_DEF: &str = r#"
id = "guarded-demo"
name = "Guarded Demo"
links = ["https://mock.example/"]

[caps]

[login]
method = "post"
path = "login.php"

[login.inputs]
username = "{{ .Config.username }}"
password = "{{ .Config.password }}"

[login.test]
path = "my.php"
selector = "a[href=\"logout.php\"]"

[[settings]]
name = "username"
label = "Username"

[[settings]]
name = "password"
label = "Password"
type = "password"

[search]

[[search.paths]]
path = "browse.php"

[search.inputs]
q = "{{ .Keywords }}"

[search.rows]
selector = "tr.row"

[search.fields.title]
selector = "a.t"

[search.fields.download]
selector = "a.d"
attribute = "href"
"#;

    const LOGGED_IN_PAGE: &str = r#"<html><body><a href="logout.php">bye</a><table>
<tr class="row"><td><a class="t" href="/d1">Bravo</a></td><td><a class="d" href="/g1">g</a></td></tr>
</table></body></html>"#;

    const LOGGED_OUT_PAGE: &str =
        r#"<html><body><form action="login.php">please sign in</form></body></html>"#;

    fn guarded_indexer(http: Arc<MockHttpClient>) -> SiteIndexer {
        let def = Arc::new(from_toml_str(LOGIN_DEF).unwrap());
        let settings = IndexerSettings::default()
            .with_value("username", "alice")
            .with_value("password", "s3cret");
        SiteIndexer::new(def, settings, http)
    }

    fn guarded_handler(
        stale_first_search: bool,
    ) -> impl Fn(&WebRequest) -> Option<Result<WebResponse, HttpError>> + Send + Sync + 'static
    {
        let searches = AtomicUsize::new(0);
        move |request| {
            let response = if request.url.contains("login.php") {
                fixtures::html_response_with_cookies("<html>ok</html>", &[("sid", "tok1")])
            } else if request.url.contains("my.php") {
                fixtures::html_response(r#"<html><a href="logout.php">bye</a></html>"#)
            } else if request.url.contains("browse.php") {
                let n = searches.fetch_add(1, Ordering::SeqCst);
                if stale_first_search && n == 0 {
                    fixtures::html_response(LOGGED_OUT_PAGE)
                } else {
                    fixtures::html_response(LOGGED_IN_PAGE)
                }
            } else {
                return None;
            };
            Some(Ok(response))
        }
    }

    #[tokio::test]
    async fn test_login_runs_before_the_first_search() {
        let http = Arc::new(MockHttpClient::new());
        http.set_handler(guarded_handler(false)).await;
        let indexer = guarded_indexer(Arc::clone(&http));

        let records = indexer.search(&SearchQuery::generic("bravo")).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(indexer.session_state(), SessionState::Authenticated);

        let urls: Vec<String> = http
            .recorded_requests()
            .await
            .into_iter()
            .map(|r| r.url)
            .collect();
        assert_eq!(urls.len(), 3);
        assert!(urls[0].contains("login.php"));
        assert!(urls[1].contains("my.php"));
        assert!(urls[2].contains("browse.php"));
    }

    #[tokio::test]
    async fn test_expired_session_triggers_one_relogin() {
        let http = Arc::new(MockHttpClient::new());
        http.set_handler(guarded_handler(true)).await;
        let indexer = guarded_indexer(Arc::clone(&http));

        let records = indexer.search(&SearchQuery::generic("bravo")).await.unwrap();
        assert_eq!(records.len(), 1);

        // login, verify, stale search, login, verify, retried search
        let urls: Vec<String> = http
            .recorded_requests()
            .await
            .into_iter()
            .map(|r| r.url)
            .collect();
        assert_eq!(urls.len(), 6);
        assert!(urls[2].contains("browse.php"));
        assert!(urls[3].contains("login.php"));
        assert!(urls[5].contains("browse.php"));
    }

    #[tokio::test]
    async fn test_search_cookies_come_from_the_session() {
        let http = Arc::new(MockHttpClient::new());
        http.set_handler(guarded_handler(false)).await;
        let indexer = guarded_indexer(Arc::clone(&http));

        indexer.search(&SearchQuery::generic("bravo")).await.unwrap();

        let requests = http.recorded_requests().await;
        let search = requests.last().unwrap();
        assert!(search
            .cookies
            .iter()
            .any(|c| c.name == "sid" && c.value == "tok1"));
    }

    #[tokio::test]
    async fn test_partial_results_survive_a_rate_limit() {
        // Two paths in one tier; the second gets throttled.
        let def_toml = r#"
id = "two-path"
name = "Two Path"
links = ["https://mock.example/"]

[caps]

[search]

[[search.paths]]
path = "browse.php"

[[search.paths]]
path = "extra.php"

[search.rows]
selector = "tr.row"

[search.fields.title]
selector = "a.t"

[search.fields.download]
selector = "a.d"
attribute = "href"
"#;
        let http = Arc::new(MockHttpClient::new());
        http.set_handler(|request: &WebRequest| {
            if request.url.contains("browse.php") {
                Some(Ok(fixtures::html_response(
                    r#"<table><tr class="row"><td><a class="t" href="/d1">Kept</a></td><td><a class="d" href="/g1">g</a></td></tr></table>"#,
                )))
            } else {
                Some(Ok(fixtures::status_response(429)))
            }
        })
        .await;

        let def = Arc::new(from_toml_str(def_toml).unwrap());
        let indexer = SiteIndexer::new(def, IndexerSettings::default(), http);

        let records = indexer.search(&SearchQuery::generic("kept")).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "Kept");
    }

    #[tokio::test]
    async fn test_rate_limit_with_nothing_collected_is_an_error() {
        let http = Arc::new(MockHttpClient::new());
        http.queue_response(fixtures::status_response(429)).await;
        let indexer = open_indexer(Arc::clone(&http));

        let err = indexer
            .search(&SearchQuery::generic("alpha"))
            .await
            .unwrap_err();
        assert!(matches!(err, IndexerError::RateLimited { .. }));
    }

    #[tokio::test]
    async fn test_probe_reports_row_count() {
        let http = Arc::new(MockHttpClient::new());
        http.queue_response(fixtures::html_response(OPEN_PAGE)).await;
        let indexer = open_indexer(Arc::clone(&http));

        assert_eq!(indexer.test().await.unwrap(), 2);
    }
}
