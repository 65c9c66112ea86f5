//! The HTTP transport seam.
//!
//! Everything above this module talks [`HttpClient`]; the real
//! reqwest-backed implementation lives here and the test double lives in
//! [`crate::testing`]. Redirects are followed manually so that cookies set
//! on intermediate hops are kept, which stock redirect handling loses.

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode, Url};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace};

use super::types::{cookie_header, merge_cookies, Cookie, WebRequest, WebResponse};

/// Sent when a Definition does not set its own User-Agent. Trackers tend to
/// reject obviously robotic agents.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:128.0) Gecko/20100101 Firefox/128.0";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_REDIRECTS: usize = 10;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid URL '{url}': {reason}")]
    BadUrl { url: String, reason: String },
    #[error("redirect loop at '{url}'")]
    TooManyRedirects { url: String },
}

/// Executes one [`WebRequest`] and yields the terminal response.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, request: WebRequest) -> Result<WebResponse, HttpError>;
}

/// Production client on top of reqwest.
pub struct ReqwestHttpClient {
    client: Client,
    max_redirects: usize,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(DEFAULT_USER_AGENT)
            .build()
            .expect("Failed to create HTTP client");
        Self {
            client,
            max_redirects: MAX_REDIRECTS,
        }
    }

    /// Build a client from operator settings. Unlike the fixed-default
    /// constructors this can fail, since the proxy string is user input.
    pub fn with_options(
        timeout: Duration,
        user_agent: &str,
        max_redirects: usize,
        proxy: Option<&str>,
    ) -> Result<Self, HttpError> {
        let mut builder = Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(user_agent);
        if let Some(proxy) = proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| HttpError::Transport(format!("bad proxy '{proxy}': {e}")))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| HttpError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            max_redirects,
        })
    }

    async fn send_once(
        &self,
        method: &Method,
        url: &Url,
        request: &WebRequest,
        jar: &[Cookie],
        with_body: bool,
    ) -> Result<reqwest::Response, HttpError> {
        let mut builder = self.client.request(method.clone(), url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if !jar.is_empty() {
            builder = builder.header(reqwest::header::COOKIE, cookie_header(jar));
        }
        if with_body {
            if let Some(raw) = &request.raw_body {
                builder = builder.body(raw.clone());
            } else if !request.form.is_empty() {
                builder = builder.form(&request.form);
            }
        }
        builder.send().await.map_err(|e| {
            if e.is_timeout() {
                HttpError::Timeout
            } else if e.is_connect() {
                HttpError::Connect(e.to_string())
            } else {
                HttpError::Transport(e.to_string())
            }
        })
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn execute(&self, request: WebRequest) -> Result<WebResponse, HttpError> {
        let mut url = Url::parse(&request.url).map_err(|e| HttpError::BadUrl {
            url: request.url.clone(),
            reason: e.to_string(),
        })?;
        let mut method = request.method.clone();
        let mut jar = request.cookies.clone();
        let mut with_body = true;

        for hop in 0..=self.max_redirects {
            trace!(%method, %url, hop, "sending request");
            let response = self
                .send_once(&method, &url, &request, &jar, with_body)
                .await?;

            let status = response.status();
            merge_cookies(&mut jar, set_cookies(&response));

            let location = response
                .headers()
                .get(reqwest::header::LOCATION)
                .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned());
            if request.follow_redirects && status.is_redirection() {
                if let Some(location) = location {
                    if hop == self.max_redirects {
                        return Err(HttpError::TooManyRedirects {
                            url: url.to_string(),
                        });
                    }
                    url = url.join(&location).map_err(|e| HttpError::BadUrl {
                        url: location.clone(),
                        reason: e.to_string(),
                    })?;
                    if demotes_to_get(status) && method == Method::POST {
                        method = Method::GET;
                        with_body = false;
                    }
                    debug!(status = status.as_u16(), %url, "following redirect");
                    continue;
                }
            }

            let final_url = response.url().to_string();
            let headers = response
                .headers()
                .iter()
                .map(|(n, v)| {
                    (
                        n.as_str().to_string(),
                        String::from_utf8_lossy(v.as_bytes()).into_owned(),
                    )
                })
                .collect();
            let body = response
                .bytes()
                .await
                .map_err(|e| HttpError::Transport(e.to_string()))?;
            return Ok(WebResponse {
                status: status.as_u16(),
                final_url,
                headers,
                body: body.to_vec(),
                cookies: jar,
            });
        }

        Err(HttpError::TooManyRedirects {
            url: url.to_string(),
        })
    }
}

fn set_cookies(response: &reqwest::Response) -> Vec<Cookie> {
    response
        .headers()
        .get_all(reqwest::header::SET_COOKIE)
        .iter()
        .filter_map(|v| Cookie::from_set_cookie(&String::from_utf8_lossy(v.as_bytes())))
        .collect()
}

/// 301/302/303 turn a POST into a GET; 307/308 keep the method.
fn demotes_to_get(status: StatusCode) -> bool {
    matches!(status.as_u16(), 301 | 302 | 303)
}
