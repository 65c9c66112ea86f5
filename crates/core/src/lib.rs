pub mod categories;
pub mod config;
pub mod definition;
pub mod download;
pub mod error;
pub mod filters;
pub mod http;
pub mod indexer;
pub mod metrics;
pub mod ratelimit;
pub mod search;
pub mod selector;
pub mod session;
pub mod template;
pub mod testing;

pub use config::{
    load_config, load_config_from_str, validate_config, ConfigError, EngineConfig, SanitizedConfig,
};
pub use definition::{
    from_toml_str, load_dir, load_file, Definition, DefinitionError, IndexerSettings,
};
pub use download::DownloadPayload;
pub use error::IndexerError;
pub use http::{HttpClient, ReqwestHttpClient};
pub use indexer::{IndexerCapabilities, MultiIndexer, MultiSearchOutcome, SiteIndexer};
pub use search::{QueryKind, ReleaseRecord, SearchQuery};
pub use session::{CaptchaChallenge, SessionState};
