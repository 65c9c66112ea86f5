//! Per-indexer cookie persistence.
//!
//! Sessions survive engine restarts when the host application plugs in a
//! durable [`CookieStore`]; the bundled in-memory store covers tests and
//! short-lived CLI runs.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::RwLock;

use super::types::Cookie;

/// Cookies captured at a known point in time. The session layer uses the
/// timestamp to age sessions out.
#[derive(Debug, Clone)]
pub struct StoredCookies {
    pub cookies: Vec<Cookie>,
    pub saved_at: DateTime<Utc>,
}

impl StoredCookies {
    pub fn now(cookies: Vec<Cookie>) -> Self {
        Self {
            cookies,
            saved_at: Utc::now(),
        }
    }
}

/// Storage backend for session cookies, keyed by Definition id.
pub trait CookieStore: Send + Sync {
    fn load(&self, indexer: &str) -> Option<StoredCookies>;
    fn store(&self, indexer: &str, cookies: StoredCookies);
    fn clear(&self, indexer: &str);
}

/// Keeps cookies for the lifetime of the process.
#[derive(Default)]
pub struct MemoryCookieStore {
    entries: RwLock<BTreeMap<String, StoredCookies>>,
}

impl MemoryCookieStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CookieStore for MemoryCookieStore {
    fn load(&self, indexer: &str) -> Option<StoredCookies> {
        self.entries
            .read()
            .ok()
            .and_then(|map| map.get(indexer).cloned())
    }

    fn store(&self, indexer: &str, cookies: StoredCookies) {
        if let Ok(mut map) = self.entries.write() {
            map.insert(indexer.to_string(), cookies);
        }
    }

    fn clear(&self, indexer: &str) {
        if let Ok(mut map) = self.entries.write() {
            map.remove(indexer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryCookieStore::new();
        assert!(store.load("demo").is_none());

        store.store("demo", StoredCookies::now(vec![Cookie::new("uid", "1")]));
        let loaded = store.load("demo").unwrap();
        assert_eq!(loaded.cookies, vec![Cookie::new("uid", "1")]);

        store.clear("demo");
        assert!(store.load("demo").is_none());
    }

    #[test]
    fn test_entries_are_keyed_by_indexer() {
        let store = MemoryCookieStore::new();
        store.store("a", StoredCookies::now(vec![Cookie::new("x", "1")]));
        store.store("b", StoredCookies::now(vec![Cookie::new("x", "2")]));
        assert_eq!(store.load("a").unwrap().cookies[0].value, "1");
        assert_eq!(store.load("b").unwrap().cookies[0].value, "2");
    }
}
