//! Filter chains applied to extracted values and keywords.
//!
//! A Definition attaches an ordered list of named filters to a selector or to
//! the search keywords. Each filter is a pure string transformation; filters
//! that parse dates normalize to RFC 3339 so downstream coercion is
//! unambiguous. Filter arguments are themselves template expressions and are
//! resolved against the request's variable scope before application.

pub mod date;
pub mod size;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::template::{self, TemplateError, VariableScope};

/// One filter application from a Definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FilterDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

/// A filter rejected its input. The containing field becomes absent; whether
/// that drops the whole record is the caller's call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("filter '{name}' failed on '{input}': {reason}")]
pub struct FilterError {
    pub name: String,
    pub input: String,
    pub reason: String,
}

/// Failure while running a filter chain. Template errors are Definition bugs
/// and fatal; filter errors only invalidate the one value.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FilterApplyError {
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Filter(#[from] FilterError),
}

/// Every filter name a Definition may reference.
pub const KNOWN_FILTERS: &[&str] = &[
    "trim",
    "append",
    "prepend",
    "tolower",
    "toupper",
    "replace",
    "split",
    "regexp",
    "re_replace",
    "urlencode",
    "urldecode",
    "querystring",
    "dateparse",
    "fuzzytime",
    "timeago",
    "sizeparse",
];

/// Validate a filter reference at Definition load time so misspellings fail
/// fast instead of at search time.
pub fn validate_filter(name: &str, arg_count: usize) -> Result<(), String> {
    let expected: std::ops::RangeInclusive<usize> = match name {
        "trim" => 0..=1,
        "append" | "prepend" | "regexp" | "querystring" | "dateparse" => 1..=1,
        "replace" | "split" | "re_replace" => 2..=2,
        "tolower" | "toupper" | "urlencode" | "urldecode" | "fuzzytime" | "timeago"
        | "sizeparse" => 0..=0,
        _ => return Err(format!("unknown filter '{name}'")),
    };
    if !expected.contains(&arg_count) {
        return Err(format!(
            "filter '{name}' takes {} argument(s), got {arg_count}",
            if expected.start() == expected.end() {
                expected.start().to_string()
            } else {
                format!("{} to {}", expected.start(), expected.end())
            }
        ));
    }
    Ok(())
}

/// Run a filter chain over a value, resolving each argument against `scope`.
pub fn apply_filters(
    value: &str,
    filters: &[FilterDef],
    scope: &VariableScope,
) -> Result<String, FilterApplyError> {
    let mut current = value.to_string();
    for filter in filters {
        let mut args = Vec::with_capacity(filter.args.len());
        for arg in &filter.args {
            args.push(template::resolve(arg, scope)?);
        }
        current = apply_single(&filter.name, &args, &current)?;
    }
    Ok(current)
}

/// Apply one filter with already-resolved arguments.
pub fn apply_single(name: &str, args: &[String], input: &str) -> Result<String, FilterError> {
    let arg = |i: usize| args.get(i).map(String::as_str).unwrap_or("");
    let fail = |reason: String| FilterError {
        name: name.to_string(),
        input: input.to_string(),
        reason,
    };

    match name {
        "trim" => Ok(if args.is_empty() || arg(0).is_empty() {
            input.trim().to_string()
        } else {
            let cutset: Vec<char> = arg(0).chars().collect();
            input.trim_matches(|c| cutset.contains(&c)).to_string()
        }),
        "append" => Ok(format!("{input}{}", arg(0))),
        "prepend" => Ok(format!("{}{input}", arg(0))),
        "tolower" => Ok(input.to_lowercase()),
        "toupper" => Ok(input.to_uppercase()),
        "replace" => Ok(input.replace(arg(0), arg(1))),
        "split" => {
            let sep = arg(0);
            if sep.is_empty() {
                return Err(fail("empty separator".to_string()));
            }
            let index: i64 = arg(1)
                .parse()
                .map_err(|_| fail(format!("bad index '{}'", arg(1))))?;
            let parts: Vec<&str> = input.split(sep).collect();
            let effective = if index < 0 {
                parts.len() as i64 + index
            } else {
                index
            };
            usize::try_from(effective)
                .ok()
                .and_then(|i| parts.get(i))
                .map(|s| s.to_string())
                .ok_or_else(|| fail(format!("index {index} out of {} parts", parts.len())))
        }
        "regexp" => {
            let re = compile(arg(0)).map_err(&fail)?;
            let caps = re
                .captures(input)
                .ok_or_else(|| fail(format!("no match for '{}'", arg(0))))?;
            let m = caps
                .get(1)
                .or_else(|| caps.get(0))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            Ok(m)
        }
        "re_replace" => {
            let re = compile(arg(0)).map_err(&fail)?;
            Ok(re.replace_all(input, arg(1)).into_owned())
        }
        "urlencode" => Ok(urlencoding::encode(input).into_owned()),
        "urldecode" => urlencoding::decode(input)
            .map(|s| s.into_owned())
            .map_err(|e| fail(format!("invalid encoding: {e}"))),
        "querystring" => query_param(input, arg(0))
            .ok_or_else(|| fail(format!("no parameter '{}' in query string", arg(0)))),
        "dateparse" => date::parse_with_format(input, arg(0))
            .map(|dt| dt.to_rfc3339())
            .map_err(fail),
        "fuzzytime" => date::parse_fuzzy(input)
            .map(|dt| dt.to_rfc3339())
            .map_err(fail),
        "timeago" => date::parse_time_ago(input)
            .map(|dt| dt.to_rfc3339())
            .map_err(fail),
        "sizeparse" => size::parse_size(input)
            .map(|bytes| bytes.to_string())
            .map_err(fail),
        other => Err(fail(format!("unknown filter '{other}'"))),
    }
}

fn compile(pattern: &str) -> Result<regex_lite::Regex, String> {
    regex_lite::Regex::new(pattern).map_err(|e| format!("bad pattern '{pattern}': {e}"))
}

/// Extract a named parameter from a URL or bare query string, decoded.
fn query_param(input: &str, name: &str) -> Option<String> {
    let query = match input.split_once('?') {
        Some((_, q)) => q,
        None => input,
    };
    let query = query.split('#').next().unwrap_or(query);
    for pair in query.split('&') {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        if key == name {
            return Some(
                urlencoding::decode(value)
                    .map(|s| s.into_owned())
                    .unwrap_or_else(|_| value.to_string()),
            );
        }
    }
    None
}
