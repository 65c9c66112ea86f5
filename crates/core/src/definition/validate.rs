//! Semantic validation of loaded Definitions.
//!
//! Everything that can be ruled out without network access is ruled out
//! here: unknown filter names, malformed templates, broken CSS selectors,
//! bad links, missing mandatory fields. A Definition that passes may still
//! describe the site wrongly, but it cannot be structurally nonsense.

use reqwest::Url;

use super::error::DefinitionError;
use super::types::{Definition, LoginMethod, ResponseKind, SettingKind};
use crate::filters::{validate_filter, FilterDef};
use crate::selector::SelectorBlock;
use crate::template::{self, VariableScope};

/// Field names the response parser understands.
pub const KNOWN_FIELDS: &[&str] = &[
    "title",
    "guid",
    "details",
    "download",
    "magnet",
    "infohash",
    "size",
    "seeders",
    "leechers",
    "peers",
    "grabs",
    "files",
    "date",
    "category",
    "description",
    "poster",
    "imdbid",
    "tmdbid",
    "tvdbid",
    "downloadvolumefactor",
    "uploadvolumefactor",
];

/// Fields at least one of which must be present for releases to be usable.
const LINK_FIELDS: &[&str] = &["details", "download", "magnet", "infohash"];

pub(super) fn validate(def: &Definition) -> Result<(), DefinitionError> {
    inner(def).map_err(|reason| DefinitionError::Invalid {
        id: def.id.clone(),
        reason,
    })
}

fn inner(def: &Definition) -> Result<(), String> {
    if def.id.trim().is_empty() || def.id.contains(char::is_whitespace) {
        return Err("id must be a non-empty token".to_string());
    }
    if def.name.trim().is_empty() {
        return Err("name must not be empty".to_string());
    }
    if def.links.is_empty() {
        return Err("at least one link is required".to_string());
    }
    for link in def.links.iter().chain(def.legacy_links.iter()) {
        let url = Url::parse(link).map_err(|e| format!("bad link '{link}': {e}"))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(format!("link '{link}' must be http(s)"));
        }
    }
    if let Some(delay) = def.request_delay_secs {
        if !delay.is_finite() || delay < 0.0 {
            return Err(format!("request_delay_secs must be >= 0, got {delay}"));
        }
    }

    check_settings(def)?;
    check_caps(def)?;
    check_login(def)?;
    check_search(def)?;
    check_download(def)?;
    Ok(())
}

fn check_settings(def: &Definition) -> Result<(), String> {
    let mut seen = std::collections::BTreeSet::new();
    for field in &def.settings {
        if field.name.trim().is_empty() {
            return Err("setting with empty name".to_string());
        }
        if !seen.insert(field.name.as_str()) {
            return Err(format!("duplicate setting '{}'", field.name));
        }
        if field.kind == SettingKind::Select && field.options.is_empty() {
            return Err(format!("select setting '{}' needs options", field.name));
        }
    }
    Ok(())
}

fn check_caps(def: &Definition) -> Result<(), String> {
    for mapping in &def.caps.categories {
        if mapping.tracker.trim().is_empty() {
            return Err("category mapping with empty tracker id".to_string());
        }
    }
    for cat in &def.caps.default_categories {
        if cat.trim().is_empty() {
            return Err("empty entry in default_categories".to_string());
        }
    }
    Ok(())
}

fn check_login(def: &Definition) -> Result<(), String> {
    let Some(login) = &def.login else {
        return Ok(());
    };
    match login.method {
        LoginMethod::Post | LoginMethod::Get | LoginMethod::Form => {
            if login.path.as_deref().map(str::trim).unwrap_or("").is_empty() {
                return Err(format!(
                    "login method '{:?}' requires a path",
                    login.method
                ));
            }
        }
        LoginMethod::OneUrl => {
            if !login.inputs.contains_key("oneurl") {
                return Err("login method 'oneurl' requires inputs.oneurl".to_string());
            }
        }
        LoginMethod::Cookie => {
            if !login.inputs.contains_key("cookie") {
                return Err("login method 'cookie' requires inputs.cookie".to_string());
            }
        }
    }
    for (where_, value) in [("login.path", &login.path), ("login.submit_path", &login.submit_path)] {
        if let Some(value) = value {
            check_template(where_, value)?;
        }
    }
    if let Some(form) = &login.form {
        check_css("login.form", form)?;
    }
    check_inputs("login.inputs", &login.inputs)?;
    check_inputs("login.headers", &login.headers)?;
    for input in &login.selector_inputs {
        if input.name.trim().is_empty() {
            return Err("login selector input with empty name".to_string());
        }
        check_block(&format!("login.selector_inputs.{}", input.name), &input.block, true)?;
    }
    for (i, block) in login.error.iter().enumerate() {
        check_css(&format!("login.error[{i}]"), &block.selector)?;
        if let Some(message) = &block.message {
            check_block(&format!("login.error[{i}].message"), message, true)?;
        }
    }
    if let Some(test) = &login.test {
        if let Some(path) = &test.path {
            check_template("login.test.path", path)?;
        }
        if let Some(selector) = &test.selector {
            check_css("login.test.selector", selector)?;
        }
    }
    if let Some(captcha) = &login.captcha {
        if captcha.selector.trim().is_empty() {
            return Err("captcha selector must not be empty".to_string());
        }
        check_css("login.captcha.selector", &captcha.selector)?;
        if captcha.input.trim().is_empty() {
            return Err("captcha input must not be empty".to_string());
        }
    }
    Ok(())
}

fn check_search(def: &Definition) -> Result<(), String> {
    let search = &def.search;
    if search.paths.is_empty() {
        return Err("at least one search path is required".to_string());
    }
    let all_html = search
        .paths
        .iter()
        .all(|p| p.response == ResponseKind::Html);
    for (i, path) in search.paths.iter().enumerate() {
        if path.path.trim().is_empty() {
            return Err(format!("search path [{i}] is empty"));
        }
        check_template(&format!("search.paths[{i}].path"), &path.path)?;
        check_inputs(&format!("search.paths[{i}].inputs"), &path.inputs)?;
        for cat in &path.categories {
            if cat.trim_start_matches('!').trim().is_empty() {
                return Err(format!("search path [{i}] has an empty category filter"));
            }
        }
    }
    check_inputs("search.inputs", &search.inputs)?;
    check_inputs("search.headers", &search.headers)?;
    check_filters("search.keywords_filters", &search.keywords_filters)?;
    for (i, block) in search.error.iter().enumerate() {
        check_css(&format!("search.error[{i}]"), &block.selector)?;
        if let Some(message) = &block.message {
            check_block(&format!("search.error[{i}].message"), message, all_html)?;
        }
    }

    if search.rows.selector.is_none() {
        return Err("search.rows needs a selector".to_string());
    }
    check_block("search.rows", &search.rows, all_html)?;

    if !search.fields.contains_key("title") {
        return Err("search.fields must include 'title'".to_string());
    }
    if !LINK_FIELDS.iter().any(|f| search.fields.contains_key(*f)) {
        return Err(
            "search.fields must include one of details, download, magnet or infohash".to_string(),
        );
    }
    for (name, block) in &search.fields {
        if !KNOWN_FIELDS.contains(&name.as_str()) {
            return Err(format!("unknown search field '{name}'"));
        }
        check_block(&format!("search.fields.{name}"), block, all_html)?;
    }
    Ok(())
}

fn check_download(def: &Definition) -> Result<(), String> {
    let Some(download) = &def.download else {
        return Ok(());
    };
    if let Some(before) = &download.before {
        if let Some(path) = &before.path {
            check_template("download.before.path", path)?;
        }
        if let Some(selector) = &before.path_selector {
            check_block("download.before.path_selector", selector, true)?;
        }
        if before.path.is_none() && before.path_selector.is_none() {
            return Err("download.before needs a path or a path_selector".to_string());
        }
        check_inputs("download.before.inputs", &before.inputs)?;
    }
    for (i, selector) in download.selectors.iter().enumerate() {
        if selector.block.selector.is_none() && selector.block.text.is_none() {
            return Err(format!("download.selectors[{i}] needs a selector"));
        }
        check_block(&format!("download.selectors[{i}]"), &selector.block, true)?;
    }
    if let Some(infohash) = &download.infohash {
        check_block("download.infohash.hash", &infohash.hash, true)?;
        check_block("download.infohash.title", &infohash.title, true)?;
    }
    check_inputs("download.headers", &download.headers)?;
    Ok(())
}

fn check_block(where_: &str, block: &SelectorBlock, html: bool) -> Result<(), String> {
    if let Some(selector) = &block.selector {
        check_template(&format!("{where_}.selector"), selector)?;
        if html {
            check_css(where_, selector)?;
        }
    }
    if let Some(remove) = &block.remove {
        check_css(&format!("{where_}.remove"), remove)?;
    }
    for (i, case) in block.case.iter().enumerate() {
        check_template(&format!("{where_}.case[{i}].selector"), &case.selector)?;
        check_template(&format!("{where_}.case[{i}].value"), &case.value)?;
        if html {
            check_css(&format!("{where_}.case[{i}]"), &case.selector)?;
        }
    }
    if let Some(text) = &block.text {
        check_template(&format!("{where_}.text"), text)?;
    }
    check_filters(where_, &block.filters)
}

fn check_filters(where_: &str, filters: &[FilterDef]) -> Result<(), String> {
    for filter in filters {
        validate_filter(&filter.name, filter.args.len())
            .map_err(|e| format!("{where_}: {e}"))?;
        for arg in &filter.args {
            check_template(&format!("{where_}.{}", filter.name), arg)?;
        }
    }
    Ok(())
}

fn check_inputs(
    where_: &str,
    inputs: &std::collections::BTreeMap<String, String>,
) -> Result<(), String> {
    for (key, value) in inputs {
        check_template(&format!("{where_}.{key}"), value)?;
    }
    Ok(())
}

/// Resolve against an empty scope: variables all read empty, so only syntax
/// problems surface.
fn check_template(where_: &str, text: &str) -> Result<(), String> {
    template::resolve(text, &VariableScope::new())
        .map(|_| ())
        .map_err(|e| format!("template error in {where_}: {e}"))
}

/// Compile CSS selectors that carry no template expressions.
fn check_css(where_: &str, selector: &str) -> Result<(), String> {
    if selector.contains("{{") {
        return Ok(());
    }
    scraper::Selector::parse(selector)
        .map(|_| ())
        .map_err(|e| format!("bad selector in {where_}: {e}"))
}
