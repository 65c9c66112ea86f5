//! Request and response types shared by the real client and the test mocks.

use encoding_rs::Encoding;
use reqwest::Method;

/// One name=value pair of a session cookie. Attributes (path, expiry, ...)
/// are dropped; tracker sessions live or die by the pair alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Parse a `Set-Cookie` header value, keeping only the leading pair.
    pub fn from_set_cookie(header: &str) -> Option<Self> {
        let pair = header.split(';').next()?.trim();
        let (name, value) = pair.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        Some(Self::new(name, value.trim()))
    }

    /// Parse a `Cookie` request header (`a=1; b=2`) into pairs.
    pub fn parse_header(header: &str) -> Vec<Self> {
        header
            .split(';')
            .filter_map(|chunk| {
                let (name, value) = chunk.trim().split_once('=')?;
                let name = name.trim();
                (!name.is_empty()).then(|| Self::new(name, value.trim()))
            })
            .collect()
    }
}

/// Render cookies as a `Cookie` request header value.
pub fn cookie_header(cookies: &[Cookie]) -> String {
    cookies
        .iter()
        .map(|c| format!("{}={}", c.name, c.value))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Merge `newer` into `base`, replacing same-named cookies.
pub fn merge_cookies(base: &mut Vec<Cookie>, newer: Vec<Cookie>) {
    for cookie in newer {
        match base.iter_mut().find(|c| c.name == cookie.name) {
            Some(existing) => existing.value = cookie.value,
            None => base.push(cookie),
        }
    }
}

/// A single outgoing request, fully resolved: URL, headers and body carry no
/// template expressions anymore.
#[derive(Debug, Clone)]
pub struct WebRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    /// Urlencoded body pairs for POST requests. Order is preserved; some
    /// sites check it. Ignored when `raw_body` is set.
    pub form: Vec<(String, String)>,
    /// Pre-assembled body, sent verbatim.
    pub raw_body: Option<String>,
    pub cookies: Vec<Cookie>,
    pub follow_redirects: bool,
    /// Minimum spacing to the site's previous request. The dispatching layer
    /// honors it through the site's rate limiter.
    pub rate_limit: Option<std::time::Duration>,
}

impl WebRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            form: Vec::new(),
            raw_body: None,
            cookies: Vec::new(),
            follow_redirects: true,
            rate_limit: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_form(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.form.push((name.into(), value.into()));
        self
    }

    pub fn with_raw_body(mut self, body: impl Into<String>) -> Self {
        self.raw_body = Some(body.into());
        self
    }

    pub fn with_cookies(mut self, cookies: Vec<Cookie>) -> Self {
        self.cookies = cookies;
        self
    }

    pub fn with_follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = follow;
        self
    }

    pub fn with_rate_limit(mut self, min_interval: Option<std::time::Duration>) -> Self {
        self.rate_limit = min_interval;
        self
    }
}

/// The terminal response of a request, after any redirects were followed.
#[derive(Debug, Clone)]
pub struct WebResponse {
    pub status: u16,
    /// URL that actually produced the body, after redirects.
    pub final_url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    /// The request's cookies merged with everything the server set along the
    /// way.
    pub cookies: Vec<Cookie>,
}

impl WebResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// First header with the given name, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The media type without parameters, lowercased.
    pub fn content_type(&self) -> Option<String> {
        let raw = self.header("content-type")?;
        Some(
            raw.split(';')
                .next()
                .unwrap_or(raw)
                .trim()
                .to_ascii_lowercase(),
        )
    }

    /// Decode the body to text.
    ///
    /// Charset resolution order: the `charset` parameter of the Content-Type
    /// header, then `declared` (the Definition's `encoding`), then UTF-8 with
    /// replacement characters.
    pub fn text(&self, declared: Option<&str>) -> String {
        let label = self
            .header("content-type")
            .and_then(charset_param)
            .or_else(|| declared.map(str::to_string));
        if let Some(label) = label {
            if let Some(encoding) = Encoding::for_label(label.trim().as_bytes()) {
                let (text, _, _) = encoding.decode(&self.body);
                return text.into_owned();
            }
        }
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Extract the `charset` parameter from a Content-Type header value.
fn charset_param(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("charset") {
            return None;
        }
        Some(value.trim().trim_matches('"').to_string())
    })
}
