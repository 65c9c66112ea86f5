//! Fan-out across a set of sites.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::IndexerError;
use crate::search::{ReleaseRecord, SearchQuery};

use super::SiteIndexer;

/// What a fan-out search produced: everything that worked, plus the error
/// of every site that did not. One broken tracker never sinks the batch.
#[derive(Debug)]
pub struct MultiSearchOutcome {
    pub releases: Vec<ReleaseRecord>,
    /// Failures keyed by indexer id.
    pub errors: HashMap<String, IndexerError>,
}

impl MultiSearchOutcome {
    /// True when every single site failed and nothing came back.
    pub fn all_failed(&self) -> bool {
        self.releases.is_empty() && !self.errors.is_empty()
    }
}

/// Runs one query against many sites concurrently.
pub struct MultiIndexer {
    indexers: Vec<Arc<SiteIndexer>>,
}

impl MultiIndexer {
    pub fn new(indexers: Vec<Arc<SiteIndexer>>) -> Self {
        Self { indexers }
    }

    pub fn len(&self) -> usize {
        self.indexers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indexers.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Arc<SiteIndexer>> {
        self.indexers.iter().find(|i| i.id() == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<SiteIndexer>> {
        self.indexers.iter()
    }

    /// Search every site concurrently and merge what comes back, most
    /// seeded releases first.
    pub async fn search(&self, query: &SearchQuery) -> MultiSearchOutcome {
        let futures: Vec<_> = self
            .indexers
            .iter()
            .map(|indexer| {
                let indexer = Arc::clone(indexer);
                let query = query.clone();
                async move {
                    let outcome = indexer.search(&query).await;
                    (indexer.id().to_string(), outcome)
                }
            })
            .collect();

        let mut releases = Vec::new();
        let mut errors = HashMap::new();
        for (id, outcome) in futures::future::join_all(futures).await {
            match outcome {
                Ok(mut records) => releases.append(&mut records),
                Err(err) => {
                    warn!(indexer = %id, error = %err, "indexer search failed");
                    errors.insert(id, err);
                }
            }
        }

        releases.sort_by(|a, b| b.seeders.unwrap_or(0).cmp(&a.seeders.unwrap_or(0)));
        debug!(
            releases = releases.len(),
            failed = errors.len(),
            "fan-out search complete"
        );
        MultiSearchOutcome { releases, errors }
    }
}
