//! Errors raised while loading and validating Definitions.

use thiserror::Error;

/// A Definition that fails any of these never becomes an indexer; bad site
/// descriptions are rejected at load, not discovered mid-search.
#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("failed to read '{path}': {reason}")]
    Read { path: String, reason: String },

    #[error("unsupported definition format '{path}', expected .toml or .json")]
    UnsupportedFormat { path: String },

    #[error("parse error in {context}: {reason}")]
    Parse { context: String, reason: String },

    #[error("invalid definition '{id}': {reason}")]
    Invalid { id: String, reason: String },

    #[error("duplicate definition id '{id}' in '{path}'")]
    Duplicate { id: String, path: String },
}
