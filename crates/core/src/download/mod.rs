//! Resolves a release link into a downloadable payload.
//!
//! Plain sites hand back a .torrent body on the first request. Gated sites
//! interpose a click-through request, hide the real link behind selectors on
//! the release page, or publish only an info hash; the Definition's download
//! block drives all three. Indirection that comes up empty falls through to
//! fetching the link the release already carried.

use librqbit_core::torrent_metainfo::{torrent_from_bytes, TorrentMetaV1Owned};
use once_cell::sync::Lazy;
use regex_lite::Regex;
use reqwest::Method;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::definition::{BeforeBlock, Definition, DownloadBlock, RequestMethodDef};
use crate::error::IndexerError;
use crate::http::{Cookie, HttpClient, HttpError, WebRequest, WebResponse};
use crate::selector::{self, Document};
use crate::template::{self, VariableScope};

/// Open trackers appended to constructed magnets so hash-only releases are
/// reachable without the site's own announce.
const PUBLIC_TRACKERS: &[&str] = &[
    "udp://tracker.opentrackr.org:1337/announce",
    "udp://open.stealth.si:80/announce",
    "udp://tracker.torrent.eu.org:451/announce",
    "udp://explodie.org:6969/announce",
];

/// Redirect hops the payload fetch will chase by hand. Manual so that a
/// `Location: magnet:...` can be caught instead of erroring in the transport.
const MAX_PAYLOAD_HOPS: usize = 5;

static BTIH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)urn:btih:([0-9a-f]{40})").expect("valid btih regex"));

/// Build a magnet link from an info hash and display name.
pub fn magnet_from_hash(hash: &str, title: &str) -> String {
    let mut magnet = format!(
        "magnet:?xt=urn:btih:{}&dn={}",
        hash.to_lowercase(),
        urlencoding::encode(title)
    );
    for tracker in PUBLIC_TRACKERS {
        magnet.push_str("&tr=");
        magnet.push_str(&urlencoding::encode(tracker));
    }
    magnet
}

/// Lowercase hex info hash of a magnet link, if it carries one.
pub fn infohash_from_magnet(magnet: &str) -> Option<String> {
    BTIH.captures(magnet).map(|caps| caps[1].to_lowercase())
}

/// Parse bytes as a .torrent and return the info hash as lowercase hex.
pub fn validate_torrent(bytes: &[u8]) -> Result<String, String> {
    if !bytes.starts_with(b"d") {
        return Err("not a bencoded dictionary".to_string());
    }
    let torrent: TorrentMetaV1Owned = torrent_from_bytes(bytes).map_err(|e| e.to_string())?;
    Ok(torrent.info_hash.as_string())
}

/// What a resolved release link yields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadPayload {
    /// Raw .torrent file contents.
    Torrent(Vec<u8>),
    Magnet(String),
}

impl DownloadPayload {
    pub fn is_magnet(&self) -> bool {
        matches!(self, Self::Magnet(_))
    }
}

pub struct DownloadResolver<'a> {
    def: &'a Definition,
    base: String,
    http: &'a dyn HttpClient,
}

impl<'a> DownloadResolver<'a> {
    pub fn new(def: &'a Definition, base: impl Into<String>, http: &'a dyn HttpClient) -> Self {
        Self {
            def,
            base: base.into(),
            http,
        }
    }

    /// Resolve a release link to its payload. Session cookies ride along on
    /// every request the resolution makes.
    pub async fn resolve(
        &self,
        link: &str,
        cookies: &[Cookie],
        scope: &VariableScope,
    ) -> Result<DownloadPayload, IndexerError> {
        if link.starts_with("magnet:") {
            return Ok(DownloadPayload::Magnet(link.to_string()));
        }
        if let Some(block) = &self.def.download {
            if let Some(payload) = self.resolve_via_block(block, link, cookies, scope).await? {
                return Ok(payload);
            }
            debug!(indexer = %self.def.id, link, "download block yielded nothing, fetching link directly");
        }
        let headers = self.resolved_headers(scope)?;
        self.fetch_payload(link, Method::GET, cookies, &headers)
            .await
    }

    /// Run the download block's indirection. `Ok(None)` means nothing
    /// matched and the caller should fall through to the original link.
    async fn resolve_via_block(
        &self,
        block: &DownloadBlock,
        link: &str,
        cookies: &[Cookie],
        scope: &VariableScope,
    ) -> Result<Option<DownloadPayload>, IndexerError> {
        let headers = self.resolved_headers(scope)?;
        let needs_page = !block.selectors.is_empty()
            || block.infohash.is_some()
            || block
                .before
                .as_ref()
                .is_some_and(|b| b.path_selector.is_some());

        let page = if needs_page {
            let response = self
                .fetch_text(link, cookies, &headers)
                .await?;
            Some(Document::parse_html(
                &response.text(self.def.encoding.as_deref()),
            ))
        } else {
            None
        };

        let before_response = match &block.before {
            Some(before) => {
                self.fire_before_request(before, page.as_ref(), cookies, scope)
                    .await
            }
            None => None,
        };
        let before_doc = before_response
            .as_ref()
            .map(|r| Document::parse_html(&r.text(self.def.encoding.as_deref())));

        if let Some(infohash) = &block.infohash {
            let doc = if infohash.use_before_response {
                before_doc.as_ref().or(page.as_ref())
            } else {
                page.as_ref()
            };
            let Some(doc) = doc else {
                return Ok(None);
            };
            match self.extract_infohash(doc, infohash, scope)? {
                Some(magnet) => return Ok(Some(DownloadPayload::Magnet(magnet))),
                None => {
                    warn!(indexer = %self.def.id, link, "infohash block matched nothing");
                    return Ok(None);
                }
            }
        }

        let method = match block.method {
            RequestMethodDef::Get => Method::GET,
            RequestMethodDef::Post => Method::POST,
        };
        for (idx, dl_selector) in block.selectors.iter().enumerate() {
            let doc = if dl_selector.use_before_response {
                before_doc.as_ref()
            } else {
                page.as_ref()
            };
            let Some(doc) = doc else {
                continue;
            };
            let value = match selector::extract(doc.root(), &dl_selector.block, scope) {
                Ok(value) => value,
                Err(e) => {
                    debug!(indexer = %self.def.id, selector = idx, error = %e, "download selector failed");
                    continue;
                }
            };
            let Some(value) = value else {
                continue;
            };
            if value.starts_with("magnet:") {
                return Ok(Some(DownloadPayload::Magnet(value)));
            }
            let target = self.absolute(&value)?;
            match self
                .fetch_payload(&target, method.clone(), cookies, &headers)
                .await
            {
                Ok(payload) => return Ok(Some(payload)),
                Err(e) => {
                    debug!(indexer = %self.def.id, url = %target, error = %e, "download candidate rejected");
                }
            }
        }
        Ok(None)
    }

    /// Fire the click-through request. Its side effect on the site is the
    /// point; a failure is logged and resolution continues.
    async fn fire_before_request(
        &self,
        before: &BeforeBlock,
        page: Option<&Document>,
        cookies: &[Cookie],
        scope: &VariableScope,
    ) -> Option<WebResponse> {
        let path = if let Some(path) = &before.path {
            match template::resolve(path, scope) {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!(indexer = %self.def.id, error = %e, "before request path failed to resolve");
                    None
                }
            }
        } else if let Some(path_selector) = &before.path_selector {
            page.and_then(|doc| {
                selector::extract(doc.root(), path_selector, scope)
                    .ok()
                    .flatten()
            })
        } else {
            None
        };
        let path = path?;

        let mut url = match self.absolute(&path) {
            Ok(url) => url,
            Err(e) => {
                warn!(indexer = %self.def.id, path, error = %e, "before request URL invalid");
                return None;
            }
        };
        let mut query = Vec::new();
        for (key, value) in &before.inputs {
            match template::resolve(value, scope) {
                Ok(resolved) => query.push(format!(
                    "{key}={}",
                    urlencoding::encode(&resolved)
                )),
                Err(e) => warn!(indexer = %self.def.id, input = %key, error = %e, "before request input failed"),
            }
        }
        if !query.is_empty() {
            url.push(if url.contains('?') { '&' } else { '?' });
            url.push_str(&query.join("&"));
        }

        let request = WebRequest::get(&url).with_cookies(cookies.to_vec());
        match self.http.execute(request).await {
            Ok(response) => {
                debug!(indexer = %self.def.id, url = %url, status = response.status, "before request done");
                Some(response)
            }
            Err(e) => {
                warn!(indexer = %self.def.id, url = %url, error = %e, "before request failed");
                None
            }
        }
    }

    fn extract_infohash(
        &self,
        doc: &Document,
        block: &crate::definition::InfohashBlock,
        scope: &VariableScope,
    ) -> Result<Option<String>, IndexerError> {
        let Some(hash) = selector::extract(doc.root(), &block.hash, scope)? else {
            return Ok(None);
        };
        let hash = hash.trim().to_lowercase();
        if hash.len() != 40 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(IndexerError::Malformed {
                reason: format!("scraped info hash '{hash}' is not 40 hex chars"),
            });
        }
        let title = selector::extract(doc.root(), &block.title, scope)?
            .unwrap_or_default();
        Ok(Some(magnet_from_hash(&hash, title.trim())))
    }

    /// Fetch a page body (release page, landing page) with session cookies.
    async fn fetch_text(
        &self,
        url: &str,
        cookies: &[Cookie],
        headers: &[(String, String)],
    ) -> Result<WebResponse, IndexerError> {
        let mut request = WebRequest::get(url).with_cookies(cookies.to_vec());
        request.headers.extend(headers.iter().cloned());
        let response = self.http.execute(request).await?;
        self.check_status(&response)?;
        Ok(response)
    }

    /// Fetch and validate the final payload, chasing redirects by hand so a
    /// magnet Location is returned instead of followed.
    async fn fetch_payload(
        &self,
        url: &str,
        method: Method,
        cookies: &[Cookie],
        headers: &[(String, String)],
    ) -> Result<DownloadPayload, IndexerError> {
        let mut url = url.to_string();
        for _ in 0..MAX_PAYLOAD_HOPS {
            let mut request = WebRequest::new(method.clone(), &url)
                .with_cookies(cookies.to_vec())
                .with_follow_redirects(false);
            request.headers.extend(headers.iter().cloned());
            let response = self.http.execute(request).await?;

            if (300..400).contains(&response.status) {
                let Some(location) = response.header("location") else {
                    return Err(IndexerError::Malformed {
                        reason: format!("redirect from {url} carries no Location"),
                    });
                };
                if location.starts_with("magnet:") {
                    return Ok(DownloadPayload::Magnet(location.to_string()));
                }
                url = join_location(&url, location)?;
                debug!(indexer = %self.def.id, url = %url, "following download redirect");
                continue;
            }

            self.check_status(&response)?;
            return match validate_torrent(&response.body) {
                Ok(hash) => {
                    debug!(indexer = %self.def.id, infohash = %hash, bytes = response.body.len(), "torrent payload validated");
                    Ok(DownloadPayload::Torrent(response.body))
                }
                Err(reason) => Err(IndexerError::Malformed {
                    reason: format!("response from {url} is not a torrent: {reason}"),
                }),
            };
        }
        Err(IndexerError::Http(HttpError::TooManyRedirects { url }))
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
            status => Err(IndexerError::UnexpectedStatus {
                status,
                url: response.final_url.clone(),
            }),
        }
    }

    fn resolved_headers(&self, scope: &VariableScope) -> Result<Vec<(String, String)>, IndexerError> {
        let empty = BTreeMap::new();
        let headers = self
            .def
            .download
            .as_ref()
            .map(|b| &b.headers)
            .unwrap_or(&empty);
        headers
            .iter()
            .map(|(name, value)| Ok((name.clone(), template::resolve(value, scope)?)))
            .collect()
    }

    fn absolute(&self, link: &str) -> Result<String, IndexerError> {
        let link = link.trim();
        if link.starts_with("http://") || link.starts_with("https://") {
            return Ok(link.to_string());
        }
        join_location(&self.base, link)
    }
}

fn join_location(base: &str, location: &str) -> Result<String, IndexerError> {
    reqwest::Url::parse(base)
        .and_then(|b| b.join(location))
        .map(|u| u.to_string())
        .map_err(|e| {
            IndexerError::Http(HttpError::BadUrl {
                url: location.to_string(),
                reason: e.to_string(),
            })
        })
}
