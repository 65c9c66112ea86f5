//! Loading, validation and the data model for tracker Definitions.
//!
//! A Definition is the single source of truth for one site: how to log in,
//! how to phrase a search, how to read the response and how to resolve a
//! download link. The engine itself is site-agnostic; all site knowledge
//! lives here.

mod error;
mod load;
mod types;
mod validate;

pub use error::DefinitionError;
pub use load::{from_json_str, from_toml_str, load_dir, load_file};
pub use types::{
    BeforeBlock, CapsBlock, CaptchaBlock, CaptchaKind, Definition, DownloadBlock,
    DownloadSelector, ErrorBlock, IndexerSettings, InfohashBlock, LoginBlock, LoginMethod,
    LoginTestBlock, RequestMethodDef, ResponseKind, SearchBlock, SearchMode, SearchPath,
    SelectorInput, SettingField, SettingKind, SettingOption,
};
pub use validate::KNOWN_FIELDS;
