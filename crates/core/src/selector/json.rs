//! JSON evaluation of selector blocks (dotted paths with array indexing).

use serde_json::Value;

use super::{SelectorBlock, SelectorError};
use crate::template::{self, VariableScope};

pub(super) fn extract_raw(
    value: &Value,
    block: &SelectorBlock,
    scope: &VariableScope,
) -> Result<Option<String>, SelectorError> {
    if let Some(text) = &block.text {
        return Ok(Some(template::resolve(text, scope)?));
    }
    let target = match &block.selector {
        Some(raw) => {
            let path = template::resolve(raw, scope)?;
            match walk(value, &path) {
                Some(found) => found,
                None => return Ok(None),
            }
        }
        None => value,
    };
    Ok(stringify(target))
}

/// Navigate a dotted path like `results.torrents[0].name`. An empty path is
/// the value itself. Anything unresolvable, including a malformed segment,
/// reads as "not found".
pub fn walk<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let path = path.trim();
    if path.is_empty() {
        return Some(value);
    }
    let mut current = value;
    for segment in path.split('.') {
        let (name, indices) = parse_segment(segment)?;
        if !name.is_empty() {
            current = current.get(name)?;
        }
        for idx in indices {
            current = current.get(idx)?;
        }
    }
    Some(current)
}

fn parse_segment(segment: &str) -> Option<(&str, Vec<usize>)> {
    match segment.find('[') {
        None => Some((segment, Vec::new())),
        Some(pos) => {
            let name = &segment[..pos];
            let mut indices = Vec::new();
            let mut rest = &segment[pos..];
            while let Some(r) = rest.strip_prefix('[') {
                let end = r.find(']')?;
                indices.push(r[..end].parse().ok()?);
                rest = &r[end + 1..];
            }
            rest.is_empty().then_some((name, indices))
        }
    }
}

/// Scalars render naturally; null is "absent"; structures render as compact
/// JSON so filters can still pick at them.
fn stringify(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_walk_paths() {
        let v = json!({"a": {"b": [{"c": 1}, {"c": 2}]}});
        assert_eq!(walk(&v, "a.b[1].c"), Some(&json!(2)));
        assert_eq!(walk(&v, "a.b"), Some(&json!([{"c": 1}, {"c": 2}])));
        assert_eq!(walk(&v, ""), Some(&v));
        assert_eq!(walk(&v, "a.x"), None);
        assert_eq!(walk(&v, "a.b[9]"), None);
        assert_eq!(walk(&v, "a.b[bad]"), None);
    }

    #[test]
    fn test_bare_index_segment() {
        let v = json!([["x", "y"], ["z"]]);
        assert_eq!(walk(&v, "[0][1]"), Some(&json!("y")));
        assert_eq!(walk(&v, "[1][0]"), Some(&json!("z")));
    }

    #[test]
    fn test_stringify() {
        assert_eq!(stringify(&json!("s")), Some("s".to_string()));
        assert_eq!(stringify(&json!(42)), Some("42".to_string()));
        assert_eq!(stringify(&json!(true)), Some("true".to_string()));
        assert_eq!(stringify(&json!(null)), None);
        assert_eq!(stringify(&json!({"k": 1})), Some("{\"k\":1}".to_string()));
    }
}
