//! Selector blocks: one declarative extraction surface over HTML and JSON
//! responses.
//!
//! A block names where a value lives (CSS selector or dotted JSON path) and
//! how to read it (element text, a named attribute, a case table or a fixed
//! text constant), then pushes it through the block's filter chain. "Not
//! found" is `Ok(None)`, distinct from an empty string; whether absence is
//! fatal belongs to the caller.

mod html;
mod json;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::filters::{FilterApplyError, FilterDef, FilterError};
use crate::template::{TemplateError, VariableScope};

pub use json::walk as json_walk;

/// Declarative extraction rule from a Definition.
///
/// Selectors, case values and the text constant are template expressions and
/// resolve against the request's variable scope.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SelectorBlock {
    /// CSS selector (HTML) or dotted path (JSON). Absent means "this node".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    /// Read this attribute instead of the element text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
    /// CSS selector for subtrees to exclude from text extraction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove: Option<String>,
    /// First rule whose selector matches (or is contained in) the element
    /// wins and yields its value.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub case: Vec<CaseRule>,
    /// Fixed output, bypassing extraction entirely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<FilterDef>,
    /// Absence and filter rejection yield `None` instead of an error.
    #[serde(default)]
    pub optional: bool,
}

impl SelectorBlock {
    /// Shorthand for a plain selector with defaults everywhere else.
    pub fn of(selector: &str) -> Self {
        Self {
            selector: Some(selector.to_string()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CaseRule {
    pub selector: String,
    pub value: String,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SelectorError {
    #[error("invalid selector '{selector}': {reason}")]
    BadSelector { selector: String, reason: String },

    #[error("response body is not valid JSON: {reason}")]
    BadJson { reason: String },

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Filter(#[from] FilterError),
}

/// A parsed response body. HTML documents are parsed synchronously and are
/// not `Send`; they live only for the duration of one parse pass.
#[derive(Debug)]
pub enum Document {
    Html(scraper::Html),
    Json(serde_json::Value),
}

/// One selectable node within a [`Document`].
#[derive(Debug, Clone, Copy)]
pub enum Node<'a> {
    Html(scraper::ElementRef<'a>),
    Json(&'a serde_json::Value),
}

impl Document {
    pub fn parse_html(body: &str) -> Self {
        Self::Html(scraper::Html::parse_document(body))
    }

    pub fn parse_json(body: &str) -> Result<Self, SelectorError> {
        let value = serde_json::from_str(body).map_err(|e| SelectorError::BadJson {
            reason: e.to_string(),
        })?;
        Ok(Self::Json(value))
    }

    /// The whole document as a node.
    pub fn root(&self) -> Node<'_> {
        match self {
            Self::Html(doc) => Node::Html(doc.root_element()),
            Self::Json(value) => Node::Json(value),
        }
    }

    /// All nodes matching a row selector. For JSON the selector is a path to
    /// an array; a non-array hit yields that single node.
    pub fn select_all(&self, selector: &str) -> Result<Vec<Node<'_>>, SelectorError> {
        match self {
            Self::Html(doc) => {
                let sel = html::compile(selector)?;
                Ok(doc.select(&sel).map(Node::Html).collect())
            }
            Self::Json(value) => Ok(match json::walk(value, selector) {
                Some(serde_json::Value::Array(items)) => items.iter().map(Node::Json).collect(),
                Some(other) => vec![Node::Json(other)],
                None => Vec::new(),
            }),
        }
    }
}

/// Evaluate a selector block against a node and run its filter chain.
pub fn extract(
    node: Node<'_>,
    block: &SelectorBlock,
    scope: &VariableScope,
) -> Result<Option<String>, SelectorError> {
    let raw = match node {
        Node::Html(el) => html::extract_raw(el, block, scope)?,
        Node::Json(value) => json::extract_raw(value, block, scope)?,
    };
    let Some(raw) = raw else {
        return Ok(None);
    };
    match crate::filters::apply_filters(&raw, &block.filters, scope) {
        Ok(value) => Ok(Some(value)),
        Err(FilterApplyError::Template(e)) => Err(e.into()),
        Err(FilterApplyError::Filter(e)) => {
            if block.optional {
                debug!(error = %e, "optional selector value rejected by filter");
                Ok(None)
            } else {
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
          <table class="torrents">
            <tr class="torrent" id="t1">
              <td class="cat"><div class="cats_moviehd"></div></td>
              <td class="name"><a href="/details.php?id=101">First <b>Release</b></a>
                <span class="tags">FREELEECH</span></td>
              <td class="size">1.5 GB</td>
            </tr>
            <tr class="torrent" id="t2">
              <td class="cat"><div class="cats_tvsd"></div></td>
              <td class="name"><a href="/details.php?id=102">Second Release</a></td>
              <td class="size">700 MB</td>
            </tr>
          </table>
        </body></html>"#;

    fn scope() -> VariableScope {
        VariableScope::new()
    }

    #[test]
    fn test_html_rows_and_text() {
        let doc = Document::parse_html(PAGE);
        let rows = doc.select_all("tr.torrent").unwrap();
        assert_eq!(rows.len(), 2);

        let block = SelectorBlock::of("td.name a");
        let title = extract(rows[0], &block, &scope()).unwrap();
        assert_eq!(title.as_deref(), Some("First Release"));
    }

    #[test]
    fn test_html_attribute() {
        let doc = Document::parse_html(PAGE);
        let rows = doc.select_all("tr.torrent").unwrap();
        let block = SelectorBlock {
            attribute: Some("href".to_string()),
            ..SelectorBlock::of("td.name a")
        };
        let href = extract(rows[1], &block, &scope()).unwrap();
        assert_eq!(href.as_deref(), Some("/details.php?id=102"));
    }

    #[test]
    fn test_html_missing_attribute_is_absent() {
        let doc = Document::parse_html(PAGE);
        let rows = doc.select_all("tr.torrent").unwrap();
        let block = SelectorBlock {
            attribute: Some("data-missing".to_string()),
            ..SelectorBlock::of("td.name a")
        };
        assert_eq!(extract(rows[0], &block, &scope()).unwrap(), None);
    }

    #[test]
    fn test_html_remove_excludes_subtree() {
        let doc = Document::parse_html(PAGE);
        let rows = doc.select_all("tr.torrent").unwrap();
        let block = SelectorBlock {
            remove: Some("span.tags".to_string()),
            ..SelectorBlock::of("td.name")
        };
        let text = extract(rows[0], &block, &scope()).unwrap();
        assert_eq!(text.as_deref(), Some("First Release"));

        // Without remove the tag text leaks in.
        let block = SelectorBlock::of("td.name");
        let text = extract(rows[0], &block, &scope()).unwrap();
        assert_eq!(text.as_deref(), Some("First Release FREELEECH"));
    }

    #[test]
    fn test_html_case_table() {
        let doc = Document::parse_html(PAGE);
        let rows = doc.select_all("tr.torrent").unwrap();
        let block = SelectorBlock {
            case: vec![
                CaseRule {
                    selector: "div.cats_moviehd".to_string(),
                    value: "41".to_string(),
                },
                CaseRule {
                    selector: "div.cats_tvsd".to_string(),
                    value: "7".to_string(),
                },
            ],
            ..SelectorBlock::of("td.cat")
        };
        assert_eq!(
            extract(rows[0], &block, &scope()).unwrap().as_deref(),
            Some("41")
        );
        assert_eq!(
            extract(rows[1], &block, &scope()).unwrap().as_deref(),
            Some("7")
        );
    }

    #[test]
    fn test_html_case_matches_element_itself() {
        let doc = Document::parse_html(PAGE);
        let rows = doc.select_all("tr.torrent").unwrap();
        let block = SelectorBlock {
            case: vec![CaseRule {
                selector: "tr#t1".to_string(),
                value: "first".to_string(),
            }],
            ..SelectorBlock::default()
        };
        assert_eq!(
            extract(rows[0], &block, &scope()).unwrap().as_deref(),
            Some("first")
        );
        assert_eq!(extract(rows[1], &block, &scope()).unwrap(), None);
    }

    #[test]
    fn test_text_constant_bypasses_extraction() {
        let doc = Document::parse_html(PAGE);
        let mut sc = scope();
        sc.set(".Config.tag", "fixed");
        let block = SelectorBlock {
            text: Some("{{ .Config.tag }}-value".to_string()),
            ..SelectorBlock::default()
        };
        assert_eq!(
            extract(doc.root(), &block, &sc).unwrap().as_deref(),
            Some("fixed-value")
        );
    }

    #[test]
    fn test_selector_miss_is_absent_not_error() {
        let doc = Document::parse_html(PAGE);
        let block = SelectorBlock::of("div.nonexistent");
        assert_eq!(extract(doc.root(), &block, &scope()).unwrap(), None);
    }

    #[test]
    fn test_bad_selector_errors() {
        let doc = Document::parse_html(PAGE);
        let err = doc.select_all("tr[[").unwrap_err();
        assert!(matches!(err, SelectorError::BadSelector { .. }));
    }

    #[test]
    fn test_filters_run_on_extracted_value() {
        let doc = Document::parse_html(PAGE);
        let rows = doc.select_all("tr.torrent").unwrap();
        let block = SelectorBlock {
            filters: vec![FilterDef {
                name: "sizeparse".to_string(),
                args: vec![],
            }],
            ..SelectorBlock::of("td.size")
        };
        assert_eq!(
            extract(rows[0], &block, &scope()).unwrap().as_deref(),
            Some("1610612736")
        );
    }

    #[test]
    fn test_optional_swallows_filter_rejection() {
        let doc = Document::parse_html(PAGE);
        let rows = doc.select_all("tr.torrent").unwrap();
        let failing = vec![FilterDef {
            name: "regexp".to_string(),
            args: vec![r"(\d{9})".to_string()],
        }];

        let required = SelectorBlock {
            filters: failing.clone(),
            ..SelectorBlock::of("td.name a")
        };
        assert!(matches!(
            extract(rows[0], &required, &scope()),
            Err(SelectorError::Filter(_))
        ));

        let optional = SelectorBlock {
            optional: true,
            ..required
        };
        assert_eq!(extract(rows[0], &optional, &scope()).unwrap(), None);
    }

    #[test]
    fn test_json_rows_and_fields() {
        let body = r#"{
            "status": "ok",
            "results": {"torrents": [
                {"name": "One", "seeders": 12, "details": {"id": 7}},
                {"name": "Two", "seeders": 0, "details": {"id": 9}}
            ]}
        }"#;
        let doc = Document::parse_json(body).unwrap();
        let rows = doc.select_all("results.torrents").unwrap();
        assert_eq!(rows.len(), 2);

        let name = extract(rows[0], &SelectorBlock::of("name"), &scope()).unwrap();
        assert_eq!(name.as_deref(), Some("One"));

        let seeders = extract(rows[1], &SelectorBlock::of("seeders"), &scope()).unwrap();
        assert_eq!(seeders.as_deref(), Some("0"));

        let id = extract(rows[0], &SelectorBlock::of("details.id"), &scope()).unwrap();
        assert_eq!(id.as_deref(), Some("7"));
    }

    #[test]
    fn test_json_indexing_and_null() {
        let body = r#"{"items": [{"v": null}, {"v": "x"}]}"#;
        let doc = Document::parse_json(body).unwrap();

        let second = extract(doc.root(), &SelectorBlock::of("items[1].v"), &scope()).unwrap();
        assert_eq!(second.as_deref(), Some("x"));

        // JSON null reads as absent.
        let first = extract(doc.root(), &SelectorBlock::of("items[0].v"), &scope()).unwrap();
        assert_eq!(first, None);

        let missing = extract(doc.root(), &SelectorBlock::of("nope.deep"), &scope()).unwrap();
        assert_eq!(missing, None);
    }

    #[test]
    fn test_bad_json_body() {
        let err = Document::parse_json("<html>surprise</html>").unwrap_err();
        assert!(matches!(err, SelectorError::BadJson { .. }));
    }

    #[test]
    fn test_templated_selector() {
        let doc = Document::parse_html(PAGE);
        let mut sc = scope();
        sc.set(".Config.row", "t2");
        let block = SelectorBlock {
            attribute: Some("id".to_string()),
            ..SelectorBlock::of("tr#{{ .Config.row }}")
        };
        assert_eq!(
            extract(doc.root(), &block, &sc).unwrap().as_deref(),
            Some("t2")
        );
    }
}
