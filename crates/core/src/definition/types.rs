//! The Definition data model: a declarative description of one tracker site.
//!
//! Definitions are deserialized from TOML or JSON, validated once, and are
//! immutable afterwards. Every string that ends up in a request or selector
//! may contain template expressions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::categories::{CategoryMap, CategoryMapping, StandardCategory};
use crate::filters::FilterDef;
use crate::selector::SelectorBlock;

/// A complete site description.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Definition {
    /// Stable identifier, used for cookies, logging and metrics labels.
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub language: String,
    /// Base URL candidates. The first one is used unless the operator
    /// overrides it; all must end with a slash (normalized at load).
    pub links: Vec<String>,
    /// Former domains, kept so stored URLs can be recognized.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub legacy_links: Vec<String>,
    /// Charset label for response decoding when the site misdeclares or
    /// omits it ("windows-1251", "utf-8", ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    /// Follow redirects on search requests by default.
    #[serde(default)]
    pub follow_redirects: bool,
    /// Minimum spacing between any two requests to this site, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_delay_secs: Option<f64>,
    /// Operator-supplied fields (credentials, flags) referenced from
    /// templates as `.Config.<name>`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub settings: Vec<SettingField>,
    pub caps: CapsBlock,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login: Option<LoginBlock>,
    pub search: SearchBlock,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download: Option<DownloadBlock>,
}

impl Definition {
    /// The effective base link: the operator override when set and sane,
    /// otherwise the first declared link.
    pub fn base_link(&self, settings: &IndexerSettings) -> String {
        if let Some(base) = &settings.base_url {
            if !base.trim().is_empty() {
                let mut base = base.trim().to_string();
                if !base.ends_with('/') {
                    base.push('/');
                }
                return base;
            }
        }
        self.links.first().cloned().unwrap_or_default()
    }

    pub fn category_map(&self) -> CategoryMap {
        CategoryMap::new(
            self.caps.categories.clone(),
            self.caps.fallback_category,
            self.caps.default_categories.clone(),
        )
    }

    /// Effective value of a declared setting: operator value, else default.
    pub fn setting_value<'a>(
        &'a self,
        settings: &'a IndexerSettings,
        name: &str,
    ) -> Option<&'a str> {
        if let Some(value) = settings.values.get(name) {
            return Some(value.as_str());
        }
        self.settings
            .iter()
            .find(|f| f.name == name)
            .and_then(|f| f.default.as_deref())
    }
}

/// Operator-tunable values for one configured indexer instance. This is the
/// runtime counterpart of [`Definition::settings`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexerSettings {
    /// Overrides the Definition's first link when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Values for declared setting fields, by field name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub values: BTreeMap<String, String>,
}

impl IndexerSettings {
    pub fn with_value(mut self, name: &str, value: &str) -> Self {
        self.values.insert(name.to_string(), value.to_string());
        self
    }
}

/// One declared operator setting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettingField {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: SettingKind,
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    /// Choices for `select` settings.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<SettingOption>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SettingKind {
    #[default]
    Text,
    Password,
    Checkbox,
    Select,
    Info,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettingOption {
    pub value: String,
    pub label: String,
}

/// What the site can answer and how its categories map onto the standard
/// taxonomy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CapsBlock {
    #[serde(default = "default_search_modes")]
    pub search_modes: Vec<SearchMode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<CategoryMapping>,
    /// Standard category assigned to rows whose tracker category is unmapped.
    #[serde(default = "default_fallback_category")]
    pub fallback_category: StandardCategory,
    /// Tracker categories used when a requested standard category has no
    /// mapping at all.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub default_categories: Vec<String>,
}

fn default_search_modes() -> Vec<SearchMode> {
    vec![SearchMode::Search]
}

fn default_fallback_category() -> StandardCategory {
    StandardCategory::Other
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum SearchMode {
    Search,
    TvSearch,
    MovieSearch,
    MusicSearch,
    BookSearch,
}

/// How to authenticate against the site.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginBlock {
    pub method: LoginMethod,
    /// Page holding the login form (`form`) or the endpoint itself
    /// (`post`/`get`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Overrides the form's own action as submit target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submit_path: Option<String>,
    /// CSS selector for the login form on the landing page. Defaults to
    /// `form`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form: Option<String>,
    /// Static or templated fields submitted with the login.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub inputs: BTreeMap<String, String>,
    /// Fields whose values are scraped off the landing page (hidden tokens
    /// and the like).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub selector_inputs: Vec<SelectorInput>,
    /// Markers of a failed login on the response page.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub error: Vec<ErrorBlock>,
    /// How to recognize (and verify) an authenticated session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test: Option<LoginTestBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captcha: Option<CaptchaBlock>,
    /// Extra templated headers on login requests.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LoginMethod {
    /// POST the templated inputs straight at `path`.
    Post,
    /// Fetch the landing page, merge its form fields with ours, submit.
    Form,
    /// No network login: the operator pastes a cookie header.
    Cookie,
    /// GET `path` with the templated inputs as query parameters.
    Get,
    /// GET a single fully templated URL from `inputs.oneurl`.
    OneUrl,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorInput {
    pub name: String,
    #[serde(flatten)]
    pub block: SelectorBlock,
}

/// A failure marker: if `selector` matches, the operation failed and the
/// message (from `message`, or the matched element's text) explains why.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ErrorBlock {
    pub selector: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<SelectorBlock>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginTestBlock {
    /// Cheap page to probe after login and when checking session health.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Present only while logged in (a logout link, typically).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CaptchaBlock {
    #[serde(rename = "type", default)]
    pub kind: CaptchaKind,
    /// Selects the captcha image on the landing page.
    pub selector: String,
    /// Form input the solved answer goes into.
    pub input: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CaptchaKind {
    #[default]
    Image,
    Text,
}

/// How to build and read search requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchBlock {
    pub paths: Vec<SearchPath>,
    /// Inputs shared by all paths (paths may override).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub inputs: BTreeMap<String, String>,
    /// Extra templated headers on search requests.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    /// Applied to the assembled keywords before they enter the scope.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords_filters: Vec<FilterDef>,
    /// Site-level failure markers checked before row extraction.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub error: Vec<ErrorBlock>,
    /// Selects one result row per release.
    pub rows: SelectorBlock,
    /// Per-release field extraction, keyed by field name ("title",
    /// "download", "size", ...).
    pub fields: BTreeMap<String, SelectorBlock>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchPath {
    pub path: String,
    #[serde(default)]
    pub method: RequestMethodDef,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub inputs: BTreeMap<String, String>,
    /// Merge the search-level inputs under this path's own.
    #[serde(default = "default_true")]
    pub inherit_inputs: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_redirects: Option<bool>,
    /// Tracker categories this path serves. A leading `!` excludes instead;
    /// an empty list means all categories.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    #[serde(default)]
    pub response: ResponseKind,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RequestMethodDef {
    #[default]
    Get,
    Post,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
    #[default]
    Html,
    Json,
}

/// How to turn a release link into something fetchable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DownloadBlock {
    /// Request issued first, for sites that require a click-through.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<BeforeBlock>,
    #[serde(default)]
    pub method: RequestMethodDef,
    /// Tried in order against the release page; first hit that validates
    /// wins.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub selectors: Vec<DownloadSelector>,
    /// Build a magnet link from scraped hash and title instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub infohash: Option<InfohashBlock>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BeforeBlock {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Extracts the before-request path from the release page instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_selector: Option<SelectorBlock>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub inputs: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadSelector {
    #[serde(flatten)]
    pub block: SelectorBlock,
    /// Evaluate against the before-request's response instead of the
    /// release page.
    #[serde(default)]
    pub use_before_response: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InfohashBlock {
    pub hash: SelectorBlock,
    pub title: SelectorBlock,
    #[serde(default)]
    pub use_before_response: bool,
}
