//! HTTP plumbing: request/response types, the transport trait and cookie
//! persistence.

mod client;
mod cookies;
mod types;

pub use client::{HttpClient, HttpError, ReqwestHttpClient, DEFAULT_USER_AGENT};
pub use cookies::{CookieStore, MemoryCookieStore, StoredCookies};
pub use types::{cookie_header, merge_cookies, Cookie, WebRequest, WebResponse};
