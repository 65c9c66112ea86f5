//! Testing utilities and mock implementations.
//!
//! This module provides a mock HTTP transport and response fixtures, allowing
//! full indexer flows (login, search, download) to run against canned traffic
//! without real infrastructure.
//!
//! # Example
//!
//! ```rust,ignore
//! use trawler_core::testing::{fixtures, MockHttpClient};
//!
//! let http = MockHttpClient::new();
//! http.queue_response(fixtures::html_response(SEARCH_PAGE)).await;
//! http.queue_response(fixtures::torrent_response()).await;
//!
//! // Use as the transport of a SiteIndexer...
//! ```

mod mock_http;

pub use mock_http::MockHttpClient;

/// Response fixtures and helper constructors.
pub mod fixtures {
    use crate::http::{Cookie, WebResponse};

    /// A response with one `content-type` header and nothing else.
    pub fn response(status: u16, content_type: &str, body: &[u8]) -> WebResponse {
        WebResponse {
            status,
            final_url: "https://mock.example/".to_string(),
            headers: vec![("content-type".to_string(), content_type.to_string())],
            body: body.to_vec(),
            cookies: Vec::new(),
        }
    }

    pub fn html_response(body: &str) -> WebResponse {
        response(200, "text/html; charset=utf-8", body.as_bytes())
    }

    pub fn json_response(body: &str) -> WebResponse {
        response(200, "application/json", body.as_bytes())
    }

    /// An empty body with the given status.
    pub fn status_response(status: u16) -> WebResponse {
        response(status, "text/html", b"")
    }

    /// A 302 redirect to `location`.
    pub fn redirect_response(location: &str) -> WebResponse {
        let mut redirect = status_response(302);
        redirect
            .headers
            .push(("location".to_string(), location.to_string()));
        redirect
    }

    /// An HTML response that also sets session cookies.
    pub fn html_response_with_cookies(body: &str, cookies: &[(&str, &str)]) -> WebResponse {
        let mut resp = html_response(body);
        resp.cookies = cookies
            .iter()
            .map(|(name, value)| Cookie::new(*name, *value))
            .collect();
        resp
    }

    /// A minimal but structurally valid single-file .torrent.
    pub fn torrent_bytes() -> Vec<u8> {
        b"d8:announce30:udp://tracker.example/announce4:infod6:lengthi12345e\
4:name8:test.txt12:piece lengthi16384e6:pieces20:AAAAAAAAAAAAAAAAAAAAee"
            .to_vec()
    }

    pub fn torrent_response() -> WebResponse {
        response(200, "application/x-bittorrent", &torrent_bytes())
    }
}
