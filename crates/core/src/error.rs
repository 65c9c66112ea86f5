//! The error taxonomy shared by session, search and download paths.

use std::time::Duration;
use thiserror::Error;

use crate::definition::DefinitionError;
use crate::filters::{FilterApplyError, FilterError};
use crate::http::HttpError;
use crate::selector::SelectorError;
use crate::template::TemplateError;

/// Anything that can go wrong while driving one indexer.
#[derive(Debug, Error)]
pub enum IndexerError {
    /// A template expression in the Definition could not be resolved.
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// A filter chain rejected its input.
    #[error(transparent)]
    Filter(#[from] FilterError),

    /// The site refused or lost our credentials.
    #[error("login failed: {reason}")]
    Login { reason: String },

    /// The login page presented a captcha that has not been answered yet.
    #[error("captcha required by '{indexer}'")]
    CaptchaRequired { indexer: String },

    /// The site told us to slow down.
    #[error("rate limited by '{indexer}'")]
    RateLimited {
        indexer: String,
        retry_after: Option<Duration>,
    },

    /// The site is blocking us or is not really there (CDN challenge pages,
    /// domain parking, maintenance).
    #[error("blocked or unavailable: {reason}")]
    Blocked { reason: String },

    /// The response arrived but does not have the promised shape.
    #[error("malformed response: {reason}")]
    Malformed { reason: String },

    /// The transport failed before any response arrived.
    #[error(transparent)]
    Http(#[from] HttpError),

    /// A non-success status with no more specific interpretation.
    #[error("unexpected status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error(transparent)]
    Definition(#[from] DefinitionError),
}

impl IndexerError {
    /// True for errors that a fresh login can plausibly cure.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, IndexerError::Login { .. })
    }

    /// True when hammering the same site with the remaining requests of this
    /// search would make things worse.
    pub fn is_site_level(&self) -> bool {
        matches!(
            self,
            IndexerError::RateLimited { .. } | IndexerError::Blocked { .. }
        )
    }
}

impl From<SelectorError> for IndexerError {
    fn from(err: SelectorError) -> Self {
        match err {
            SelectorError::Template(e) => IndexerError::Template(e),
            SelectorError::Filter(e) => IndexerError::Filter(e),
            other => IndexerError::Malformed {
                reason: other.to_string(),
            },
        }
    }
}

impl From<FilterApplyError> for IndexerError {
    fn from(err: FilterApplyError) -> Self {
        match err {
            FilterApplyError::Template(e) => IndexerError::Template(e),
            FilterApplyError::Filter(e) => IndexerError::Filter(e),
        }
    }
}
