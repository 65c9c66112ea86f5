//! Expression resolver for the template subset used by Definitions.
//!
//! Supported constructs, resolved in this order:
//!
//! - `{{ re_replace .Var "pattern" "replacement" }}`
//! - `{{ join .List "separator" }}`
//! - `{{ range .List }}prefix{{.}}postfix{{ end }}`
//! - `{{ if .Var }}A{{ else }}B{{ end }}` (conditions may be `or`/`and`
//!   over several variables)
//! - `{{ .Dotted.Path }}` substitution
//!
//! Undefined variables resolve to the empty string. Malformed expressions,
//! including anything still wrapped in `{{ }}` after resolution, are a hard
//! error so broken Definitions fail loudly instead of leaking template text
//! into requests.

use once_cell::sync::Lazy;
use regex_lite::{Captures, Regex};
use thiserror::Error;

use super::scope::VariableScope;

/// Errors from template resolution. These are Definition bugs, not transient
/// conditions, and abort the whole operation they occur in.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("malformed template expression near '{fragment}'")]
    Syntax { fragment: String },

    #[error("invalid re_replace pattern '{pattern}': {reason}")]
    BadPattern { pattern: String, reason: String },
}

static RE_REPLACE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)\{\{\s*re_replace\s+(\.[^\s\}]+)\s+"(.*?)"\s+"(.*?)"\s*\}\}"#)
        .expect("pattern compiles")
});

static JOIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)\{\{\s*join\s+(\.[^\s\}]+)\s+"(.*?)"\s*\}\}"#).expect("pattern compiles")
});

static RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)\{\{\s*range\s+(\.[^\s\}]+)\s*\}\}(.*?)\{\{\s*\.\s*\}\}(.*?)\{\{\s*end\s*\}\}")
        .expect("pattern compiles")
});

static IF_ELSE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)\{\{\s*if\s+(.+?)\s*\}\}(.*?)(?:\{\{\s*else\s*\}\}(.*?))?\{\{\s*end\s*\}\}")
        .expect("pattern compiles")
});

static VARIABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*(\.[^\s\}]*)\s*\}\}").expect("pattern compiles"));

static LEFTOVER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{\{.{0,60}").expect("pattern compiles"));

/// Resolve a template against a scope.
pub fn resolve(text: &str, scope: &VariableScope) -> Result<String, TemplateError> {
    resolve_inner(text, scope, None)
}

/// Resolve a template, passing every substituted variable value through
/// `encoder`. Literal text is not encoded. Used for URL assembly.
pub fn resolve_encoded(
    text: &str,
    scope: &VariableScope,
    encoder: &dyn Fn(&str) -> String,
) -> Result<String, TemplateError> {
    resolve_inner(text, scope, Some(encoder))
}

fn resolve_inner(
    text: &str,
    scope: &VariableScope,
    encoder: Option<&dyn Fn(&str) -> String>,
) -> Result<String, TemplateError> {
    check_balanced(text)?;

    let step = apply_re_replace(text, scope, encoder)?;
    let step = apply_join(&step, scope, encoder)?;
    let step = apply_range(&step, scope, encoder)?;
    let step = apply_if_else(&step, scope)?;
    let step = apply_variables(&step, scope, encoder)?;

    if let Some(m) = LEFTOVER.find(&step) {
        return Err(TemplateError::Syntax {
            fragment: m.as_str().trim().to_string(),
        });
    }
    Ok(step)
}

fn check_balanced(text: &str) -> Result<(), TemplateError> {
    let opens = text.matches("{{").count();
    let closes = text.matches("}}").count();
    if opens != closes {
        let fragment: String = text.trim().chars().take(60).collect();
        return Err(TemplateError::Syntax { fragment });
    }
    Ok(())
}

/// Rebuild `text` by replacing every match of `re` with `f(captures)`,
/// propagating errors out of the replacement.
fn replace_each(
    re: &Regex,
    text: &str,
    mut f: impl FnMut(&Captures<'_>) -> Result<String, TemplateError>,
) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for caps in re.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        out.push_str(&text[last..whole.start()]);
        out.push_str(&f(&caps)?);
        last = whole.end();
    }
    out.push_str(&text[last..]);
    Ok(out)
}

fn group<'t>(caps: &Captures<'t>, i: usize) -> &'t str {
    caps.get(i).map(|m| m.as_str()).unwrap_or("")
}

/// Substituted values go through the encoder; literal template text never
/// does.
fn encode(encoder: Option<&dyn Fn(&str) -> String>, value: &str) -> String {
    match encoder {
        Some(enc) => enc(value),
        None => value.to_string(),
    }
}

fn apply_re_replace(
    text: &str,
    scope: &VariableScope,
    encoder: Option<&dyn Fn(&str) -> String>,
) -> Result<String, TemplateError> {
    replace_each(&RE_REPLACE, text, |caps| {
        let value = scope.render(group(caps, 1));
        let pattern = group(caps, 2);
        let replacement = group(caps, 3);
        let re = Regex::new(pattern).map_err(|e| TemplateError::BadPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        Ok(encode(encoder, &re.replace_all(&value, replacement)))
    })
}

fn apply_join(
    text: &str,
    scope: &VariableScope,
    encoder: Option<&dyn Fn(&str) -> String>,
) -> Result<String, TemplateError> {
    replace_each(&JOIN, text, |caps| {
        let items = scope.get(group(caps, 1)).as_list();
        let encoded: Vec<String> = items.iter().map(|i| encode(encoder, i)).collect();
        Ok(encoded.join(group(caps, 2)))
    })
}

fn apply_range(
    text: &str,
    scope: &VariableScope,
    encoder: Option<&dyn Fn(&str) -> String>,
) -> Result<String, TemplateError> {
    replace_each(&RANGE, text, |caps| {
        let items = scope.get(group(caps, 1)).as_list();
        let prefix = group(caps, 2);
        let postfix = group(caps, 3);
        let mut out = String::new();
        for item in items {
            out.push_str(prefix);
            out.push_str(&encode(encoder, &item));
            out.push_str(postfix);
        }
        Ok(out)
    })
}

fn apply_if_else(text: &str, scope: &VariableScope) -> Result<String, TemplateError> {
    replace_each(&IF_ELSE, text, |caps| {
        let condition = group(caps, 1);
        if eval_condition(condition, scope)? {
            Ok(group(caps, 2).to_string())
        } else {
            Ok(group(caps, 3).to_string())
        }
    })
}

/// Conditions are a single variable, or `or`/`and` applied to several.
fn eval_condition(condition: &str, scope: &VariableScope) -> Result<bool, TemplateError> {
    let mut tokens = condition.split_whitespace();
    let first = tokens.next().ok_or_else(|| TemplateError::Syntax {
        fragment: condition.to_string(),
    })?;

    let (combine_any, vars): (bool, Vec<&str>) = match first {
        "or" => (true, tokens.collect()),
        "and" => (false, tokens.collect()),
        _ => (true, vec![first]),
    };
    if vars.is_empty() || vars.iter().any(|v| !v.starts_with('.')) {
        return Err(TemplateError::Syntax {
            fragment: condition.to_string(),
        });
    }
    Ok(if combine_any {
        vars.iter().any(|v| scope.is_truthy(v))
    } else {
        vars.iter().all(|v| scope.is_truthy(v))
    })
}

fn apply_variables(
    text: &str,
    scope: &VariableScope,
    encoder: Option<&dyn Fn(&str) -> String>,
) -> Result<String, TemplateError> {
    replace_each(&VARIABLE, text, |caps| {
        let value = scope.render(group(caps, 1));
        Ok(match encoder {
            Some(enc) => enc(&value),
            None => value,
        })
    })
}
