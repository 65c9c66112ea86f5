//! The login state machine.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::definition::{CaptchaKind, Definition, LoginBlock, LoginMethod};
use crate::error::IndexerError;
use crate::http::{
    merge_cookies, Cookie, CookieStore, HttpClient, StoredCookies, WebRequest, WebResponse,
};
use crate::metrics;
use crate::selector::{self, Document, SelectorBlock};
use crate::template::{self, VariableScope};

use super::{foreign_domain_hint, CaptchaChallenge, SessionSnapshot, SessionState};

/// Sessions older than this are not worth retrying; log in fresh instead.
const COOKIE_HORIZON_DAYS: i64 = 30;

/// Working data behind the single-flight lock.
struct SessionData {
    cookies: Vec<Cookie>,
    last_login: Option<DateTime<Utc>>,
    captcha_answer: Option<String>,
    challenge: Option<CaptchaChallenge>,
}

/// Owned extract of the landing page's login form.
struct ParsedForm {
    fields: BTreeMap<String, String>,
    action: Option<String>,
    multipart: bool,
    captcha: Option<CaptchaLead>,
}

struct CaptchaLead {
    /// Form input the answer goes into.
    input: String,
    content: CaptchaContent,
}

enum CaptchaContent {
    ImageSrc(Option<String>),
    Text(String),
}

/// Per-site login lifecycle: holds the cookie jar, runs the Definition's
/// login strategy, and persists sessions through a [`CookieStore`].
///
/// One login attempt runs at a time; concurrent callers of
/// [`ensure_logged_in`](Self::ensure_logged_in) queue on the same lock and
/// see its outcome. The observable [`SessionState`] lives outside the lock
/// so health checks never wait on a login in flight.
pub struct SessionStateMachine {
    def: Arc<Definition>,
    base: String,
    http: Arc<dyn HttpClient>,
    store: Arc<dyn CookieStore>,
    state: RwLock<SessionState>,
    data: Mutex<SessionData>,
}

/// Reverts to `Unauthenticated` unless the attempt reached a terminal
/// state, so a cancelled login never leaves `Authenticating` behind.
struct AttemptGuard<'a> {
    state: &'a RwLock<SessionState>,
    armed: bool,
}

impl<'a> AttemptGuard<'a> {
    fn begin(state: &'a RwLock<SessionState>) -> Self {
        set_state(state, SessionState::Authenticating);
        Self { state, armed: true }
    }

    fn finish(mut self, terminal: SessionState) {
        set_state(self.state, terminal);
        self.armed = false;
    }
}

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            set_state(self.state, SessionState::Unauthenticated);
        }
    }
}

fn set_state(state: &RwLock<SessionState>, new_state: SessionState) {
    if let Ok(mut slot) = state.write() {
        *slot = new_state;
    }
}

impl SessionStateMachine {
    pub fn new(
        def: Arc<Definition>,
        base: impl Into<String>,
        http: Arc<dyn HttpClient>,
        store: Arc<dyn CookieStore>,
    ) -> Self {
        Self {
            def,
            base: base.into(),
            http,
            store,
            state: RwLock::new(SessionState::Unauthenticated),
            data: Mutex::new(SessionData {
                cookies: Vec::new(),
                last_login: None,
                captcha_answer: None,
                challenge: None,
            }),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
            .read()
            .map(|s| s.clone())
            .unwrap_or(SessionState::Unauthenticated)
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let data = self.data.lock().await;
        SessionSnapshot {
            state: self.state(),
            cookies: data.cookies.clone(),
        }
    }

    /// Cookies to attach to site requests.
    pub async fn cookies(&self) -> Vec<Cookie> {
        self.data.lock().await.cookies.clone()
    }

    pub async fn last_login(&self) -> Option<DateTime<Utc>> {
        self.data.lock().await.last_login
    }

    /// The challenge captured by the most recent failed login, if any.
    pub async fn pending_challenge(&self) -> Option<CaptchaChallenge> {
        self.data.lock().await.challenge.clone()
    }

    /// Hand in a solved captcha. The next login attempt submits it once.
    pub async fn supply_captcha_answer(&self, answer: impl Into<String>) {
        let mut data = self.data.lock().await;
        data.captcha_answer = Some(answer.into());
        data.challenge = None;
        if self.state() == SessionState::CaptchaPending {
            set_state(&self.state, SessionState::Unauthenticated);
        }
    }

    /// Drop the session entirely: cookies, persisted copy, state.
    pub async fn invalidate(&self) {
        let mut data = self.data.lock().await;
        data.cookies.clear();
        data.last_login = None;
        self.store.clear(&self.def.id);
        set_state(&self.state, SessionState::Unauthenticated);
        debug!(indexer = %self.def.id, "session invalidated");
    }

    /// Make sure the site will accept authenticated requests.
    ///
    /// Already-authenticated sessions return immediately without touching
    /// the network. Otherwise: adopt persisted cookies if they are fresh
    /// enough and pass verification, or run the Definition's login strategy.
    pub async fn ensure_logged_in(&self, scope: &VariableScope) -> Result<(), IndexerError> {
        let Some(login) = &self.def.login else {
            return Ok(());
        };
        let mut data = self.data.lock().await;
        if self.state() == SessionState::Authenticated {
            return Ok(());
        }

        if data.cookies.is_empty() {
            if let Some(stored) = self.store.load(&self.def.id) {
                let age = Utc::now().signed_duration_since(stored.saved_at);
                if age < ChronoDuration::days(COOKIE_HORIZON_DAYS) {
                    debug!(indexer = %self.def.id, "adopting persisted session cookies");
                    data.cookies = stored.cookies;
                } else {
                    debug!(indexer = %self.def.id, "persisted session is past the horizon");
                    self.store.clear(&self.def.id);
                }
            }
        }
        if !data.cookies.is_empty() {
            match self.verify(login, &data.cookies, scope).await {
                Ok(()) => {
                    set_state(&self.state, SessionState::Authenticated);
                    return Ok(());
                }
                Err(e) => {
                    debug!(indexer = %self.def.id, error = %e, "existing session rejected, logging in fresh");
                    data.cookies.clear();
                }
            }
        }

        let guard = AttemptGuard::begin(&self.state);
        match self.attempt_login(login, &mut data, scope).await {
            Ok(()) => {
                data.last_login = Some(Utc::now());
                if data.cookies.is_empty() {
                    warn!(indexer = %self.def.id, "login succeeded but no cookies were set");
                } else {
                    self.store
                        .store(&self.def.id, StoredCookies::now(data.cookies.clone()));
                }
                info!(indexer = %self.def.id, "logged in");
                metrics::LOGINS.with_label_values(&[&self.def.id, "ok"]).inc();
                guard.finish(SessionState::Authenticated);
                Ok(())
            }
            Err(IndexerError::CaptchaRequired { indexer }) => {
                metrics::LOGINS
                    .with_label_values(&[&self.def.id, "captcha"])
                    .inc();
                guard.finish(SessionState::CaptchaPending);
                Err(IndexerError::CaptchaRequired { indexer })
            }
            Err(e) => {
                metrics::LOGINS
                    .with_label_values(&[&self.def.id, "failed"])
                    .inc();
                guard.finish(SessionState::Failed {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn attempt_login(
        &self,
        login: &LoginBlock,
        data: &mut SessionData,
        scope: &VariableScope,
    ) -> Result<(), IndexerError> {
        match login.method {
            LoginMethod::Cookie => self.login_cookie(login, data, scope)?,
            LoginMethod::Post => self.login_post(login, data, scope).await?,
            LoginMethod::Get | LoginMethod::OneUrl => {
                self.login_get(login, data, scope).await?
            }
            LoginMethod::Form => self.login_form(login, data, scope).await?,
        }
        self.verify(login, &data.cookies, scope).await
    }

    /// `cookie`: the operator pasted a Cookie header, nothing to fetch.
    fn login_cookie(
        &self,
        login: &LoginBlock,
        data: &mut SessionData,
        scope: &VariableScope,
    ) -> Result<(), IndexerError> {
        let raw = login.inputs.get("cookie").cloned().unwrap_or_default();
        let resolved = template::resolve(&raw, scope)?;
        let cookies = Cookie::parse_header(&resolved);
        if cookies.is_empty() {
            return Err(IndexerError::Login {
                reason: "cookie login configured but the cookie setting is empty".to_string(),
            });
        }
        data.cookies = cookies;
        Ok(())
    }

    /// `post`: submit the templated inputs straight at the endpoint.
    async fn login_post(
        &self,
        login: &LoginBlock,
        data: &mut SessionData,
        scope: &VariableScope,
    ) -> Result<(), IndexerError> {
        let url = self.login_url(login)?;
        let mut request = WebRequest::post(url);
        for (key, value) in self.resolved_inputs(login, scope)? {
            request = request.with_form(key, value);
        }
        self.submit(login, request, data, scope).await
    }

    /// `get`/`oneurl`: a GET carrying the credentials.
    async fn login_get(
        &self,
        login: &LoginBlock,
        data: &mut SessionData,
        scope: &VariableScope,
    ) -> Result<(), IndexerError> {
        let url = if login.method == LoginMethod::OneUrl {
            let raw = login.inputs.get("oneurl").cloned().unwrap_or_default();
            self.absolute(&template::resolve(&raw, scope)?)?
        } else {
            let mut url = self.login_url(login)?;
            let query: Vec<String> = self
                .resolved_inputs(login, scope)?
                .into_iter()
                .map(|(key, value)| format!("{key}={}", urlencoding::encode(&value)))
                .collect();
            if !query.is_empty() {
                url.push(if url.contains('?') { '&' } else { '?' });
                url.push_str(&query.join("&"));
            }
            url
        };
        self.submit(login, WebRequest::get(url), data, scope).await
    }

    /// `form`: fetch the landing page, merge its form with our inputs,
    /// handle the captcha if one is declared, submit.
    async fn login_form(
        &self,
        login: &LoginBlock,
        data: &mut SessionData,
        scope: &VariableScope,
    ) -> Result<(), IndexerError> {
        let landing_url = self.login_url(login)?;
        let mut landing_request = WebRequest::get(&landing_url);
        landing_request.headers = self.login_headers(login, scope)?;
        let landing = self.http.execute(landing_request).await?;
        self.check_login_status(&landing)?;
        merge_cookies(&mut data.cookies, landing.cookies.clone());

        let body = landing.text(self.def.encoding.as_deref());
        let mut form = self.parse_login_form(login, &body, &landing_url, scope)?;

        if let Some(lead) = form.captcha.take() {
            match data.captcha_answer.take() {
                Some(answer) => {
                    form.fields.insert(lead.input, answer);
                }
                None => {
                    let challenge = self
                        .fetch_captcha_challenge(lead, &data.cookies)
                        .await?;
                    data.challenge = Some(challenge);
                    return Err(IndexerError::CaptchaRequired {
                        indexer: self.def.id.clone(),
                    });
                }
            }
        }

        let action = if let Some(submit_path) = &login.submit_path {
            self.absolute(&template::resolve(submit_path, scope)?)?
        } else {
            match &form.action {
                Some(action) if !action.is_empty() => join(&landing.final_url, action)?,
                _ => landing.final_url.clone(),
            }
        };

        let mut request = WebRequest::post(action);
        if form.multipart {
            let boundary = format!(
                "----trawler-{}",
                Utc::now().timestamp_nanos_opt().unwrap_or_default()
            );
            request = request
                .with_header(
                    "content-type",
                    format!("multipart/form-data; boundary={boundary}"),
                )
                .with_raw_body(encode_multipart(&boundary, &form.fields));
        } else {
            for (key, value) in form.fields {
                request = request.with_form(key, value);
            }
        }
        self.submit(login, request, data, scope).await
    }

    /// Pull everything out of the landing page in one synchronous pass. The
    /// parsed document must not live across an await.
    fn parse_login_form(
        &self,
        login: &LoginBlock,
        body: &str,
        landing_url: &str,
        scope: &VariableScope,
    ) -> Result<ParsedForm, IndexerError> {
        let html = scraper::Html::parse_document(body);
        let form_selector = login.form.as_deref().unwrap_or("form");
        let form_sel = compile(form_selector)?;
        let Some(form_el) = html.select(&form_sel).next() else {
            return Err(IndexerError::Login {
                reason: format!("login form '{form_selector}' not found on {landing_url}"),
            });
        };

        // The form's own fields first, then the Definition's inputs over
        // them, then anything scraped via selector inputs.
        let mut fields: BTreeMap<String, String> = BTreeMap::new();
        let input_sel = compile("input")?;
        for input in form_el.select(&input_sel) {
            if let Some(name) = input.value().attr("name") {
                fields.insert(
                    name.to_string(),
                    input.value().attr("value").unwrap_or_default().to_string(),
                );
            }
        }
        for (key, value) in self.resolved_inputs(login, scope)? {
            fields.insert(key, value);
        }
        let root = selector::Node::Html(html.root_element());
        for selector_input in &login.selector_inputs {
            match selector::extract(root, &selector_input.block, scope)? {
                Some(value) => {
                    fields.insert(selector_input.name.clone(), value);
                }
                None => {
                    return Err(IndexerError::Login {
                        reason: format!(
                            "selector input '{}' matched nothing on the login page",
                            selector_input.name
                        ),
                    })
                }
            }
        }

        let captcha = match &login.captcha {
            Some(captcha) => html
                .select(&compile(&captcha.selector)?)
                .next()
                .map(|el| {
                    let content = match captcha.kind {
                        CaptchaKind::Image => {
                            CaptchaContent::ImageSrc(el.value().attr("src").map(str::to_string))
                        }
                        CaptchaKind::Text => {
                            CaptchaContent::Text(el.text().collect::<String>().trim().to_string())
                        }
                    };
                    CaptchaLead {
                        input: captcha.input.clone(),
                        content,
                    }
                }),
            None => None,
        };

        Ok(ParsedForm {
            fields,
            action: form_el.value().attr("action").map(str::to_string),
            multipart: form_el
                .value()
                .attr("enctype")
                .is_some_and(|e| e.eq_ignore_ascii_case("multipart/form-data")),
            captcha,
        })
    }

    /// Shared tail of every network strategy: attach headers and cookies,
    /// execute, check for failure markers, collect cookies.
    async fn submit(
        &self,
        login: &LoginBlock,
        mut request: WebRequest,
        data: &mut SessionData,
        scope: &VariableScope,
    ) -> Result<(), IndexerError> {
        request
            .headers
            .extend(self.login_headers(login, scope)?);
        request.cookies = data.cookies.clone();
        debug!(indexer = %self.def.id, url = %request.url, method = %request.method, "submitting login");

        let response = self.http.execute(request).await?;
        self.check_login_status(&response)?;
        self.check_login_errors(login, &response, scope)?;
        merge_cookies(&mut data.cookies, response.cookies.clone());
        Ok(())
    }

    /// Probe the session: fetch `login.test.path` (if declared) and require
    /// the logged-in marker on it.
    async fn verify(
        &self,
        login: &LoginBlock,
        cookies: &[Cookie],
        scope: &VariableScope,
    ) -> Result<(), IndexerError> {
        let Some(test) = &login.test else {
            return Ok(());
        };
        let Some(path) = &test.path else {
            return Ok(());
        };
        let url = self.absolute(&template::resolve(path, scope)?)?;
        let request = WebRequest::get(&url).with_cookies(cookies.to_vec());
        let response = self.http.execute(request).await?;
        self.check_login_status(&response)?;
        if let Some(hint) = foreign_domain_hint(&url, &response.final_url) {
            return Err(IndexerError::Login {
                reason: format!("session probe failed: {hint}"),
            });
        }

        if let Some(marker) = &test.selector {
            let body = response.text(self.def.encoding.as_deref());
            let doc = Document::parse_html(&body);
            if doc.select_all(marker)?.is_empty() {
                return Err(IndexerError::Login {
                    reason: format!("logged-in marker '{marker}' missing from {url}"),
                });
            }
        }
        debug!(indexer = %self.def.id, url = %url, "session verified");
        Ok(())
    }

    async fn fetch_captcha_challenge(
        &self,
        lead: CaptchaLead,
        cookies: &[Cookie],
    ) -> Result<CaptchaChallenge, IndexerError> {
        match lead.content {
            CaptchaContent::Text(text) => Ok(CaptchaChallenge {
                image: text.into_bytes(),
                content_type: Some("text/plain".to_string()),
                cookies: cookies.to_vec(),
            }),
            CaptchaContent::ImageSrc(src) => {
                let src = src.ok_or_else(|| IndexerError::Login {
                    reason: "captcha element has no src attribute".to_string(),
                })?;
                let url = self.absolute(&src)?;
                let request = WebRequest::get(&url).with_cookies(cookies.to_vec());
                let response = self.http.execute(request).await?;
                self.check_login_status(&response)?;
                info!(indexer = %self.def.id, url = %url, "captured captcha challenge");
                Ok(CaptchaChallenge {
                    content_type: response.content_type(),
                    image: response.body,
                    cookies: cookies.to_vec(),
                })
            }
        }
    }

    fn check_login_status(&self, response: &WebResponse) -> Result<(), IndexerError> {
        match response.status {
            200..=299 => Ok(()),
            401 | 403 => Err(IndexerError::Login {
                reason: format!("login rejected with HTTP {}", response.status),
            }),
            429 | 503 => Err(IndexerError::RateLimited {
                indexer: self.def.id.clone(),
                retry_after: None,
            }),
            status => Err(IndexerError::UnexpectedStatus {
                status,
                url: response.final_url.clone(),
            }),
        }
    }

    fn check_login_errors(
        &self,
        login: &LoginBlock,
        response: &WebResponse,
        scope: &VariableScope,
    ) -> Result<(), IndexerError> {
        if login.error.is_empty() {
            return Ok(());
        }
        let body = response.text(self.def.encoding.as_deref());
        let doc = Document::parse_html(&body);
        for block in &login.error {
            let sel = template::resolve(&block.selector, scope)?;
            let matched = doc.select_all(&sel)?;
            let Some(node) = matched.first() else {
                continue;
            };
            let message = match &block.message {
                Some(message_block) => selector::extract(*node, message_block, scope)?,
                None => selector::extract(*node, &SelectorBlock::default(), scope)?,
            }
            .unwrap_or_else(|| "login rejected".to_string());
            return Err(IndexerError::Login {
                reason: message.trim().to_string(),
            });
        }
        Ok(())
    }

    fn resolved_inputs(
        &self,
        login: &LoginBlock,
        scope: &VariableScope,
    ) -> Result<Vec<(String, String)>, IndexerError> {
        login
            .inputs
            .iter()
            .map(|(key, value)| Ok((key.clone(), template::resolve(value, scope)?)))
            .collect()
    }

    fn login_headers(
        &self,
        login: &LoginBlock,
        scope: &VariableScope,
    ) -> Result<Vec<(String, String)>, IndexerError> {
        login
            .headers
            .iter()
            .map(|(name, value)| Ok((name.clone(), template::resolve(value, scope)?)))
            .collect()
    }

    fn login_url(&self, login: &LoginBlock) -> Result<String, IndexerError> {
        let path = login.path.as_deref().unwrap_or("");
        self.absolute(path)
    }

    fn absolute(&self, link: &str) -> Result<String, IndexerError> {
        if link.starts_with("http://") || link.starts_with("https://") {
            return Ok(link.to_string());
        }
        join(&self.base, link)
    }
}

fn join(base: &str, path: &str) -> Result<String, IndexerError> {
    reqwest::Url::parse(base)
        .and_then(|b| b.join(path))
        .map(|u| u.to_string())
        .map_err(|e| {
            IndexerError::Http(crate::http::HttpError::BadUrl {
                url: path.to_string(),
                reason: e.to_string(),
            })
        })
}

fn compile(selector: &str) -> Result<scraper::Selector, IndexerError> {
    scraper::Selector::parse(selector).map_err(|e| IndexerError::Malformed {
        reason: format!("invalid selector '{selector}': {e}"),
    })
}

fn encode_multipart(boundary: &str, fields: &BTreeMap<String, String>) -> String {
    let mut body = String::new();
    for (name, value) in fields {
        body.push_str(&format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
        ));
    }
    body.push_str(&format!("--{boundary}--\r\n"));
    body
}
