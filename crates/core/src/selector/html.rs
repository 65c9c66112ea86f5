//! HTML evaluation of selector blocks (CSS selectors via scraper).

use scraper::{ElementRef, Selector};

use super::{CaseRule, SelectorBlock, SelectorError};
use crate::template::{self, VariableScope};

pub(super) fn compile(css: &str) -> Result<Selector, SelectorError> {
    Selector::parse(css).map_err(|e| SelectorError::BadSelector {
        selector: css.to_string(),
        reason: e.to_string(),
    })
}

pub(super) fn extract_raw(
    el: ElementRef<'_>,
    block: &SelectorBlock,
    scope: &VariableScope,
) -> Result<Option<String>, SelectorError> {
    if let Some(text) = &block.text {
        return Ok(Some(template::resolve(text, scope)?));
    }

    let target = match &block.selector {
        Some(raw) => {
            let css = template::resolve(raw, scope)?;
            match el.select(&compile(&css)?).next() {
                Some(found) => found,
                None => return Ok(None),
            }
        }
        None => el,
    };

    if !block.case.is_empty() {
        return case_value(target, &block.case, scope);
    }
    if let Some(attr) = &block.attribute {
        return Ok(target.value().attr(attr).map(str::to_string));
    }
    let text = text_excluding(target, block.remove.as_deref())?;
    Ok(Some(text))
}

/// First case rule whose selector matches the element itself or anything
/// inside it wins.
fn case_value(
    el: ElementRef<'_>,
    rules: &[CaseRule],
    scope: &VariableScope,
) -> Result<Option<String>, SelectorError> {
    for rule in rules {
        let css = template::resolve(&rule.selector, scope)?;
        let sel = compile(&css)?;
        if sel.matches(&el) || el.select(&sel).next().is_some() {
            return Ok(Some(template::resolve(&rule.value, scope)?));
        }
    }
    Ok(None)
}

/// Element text with `remove`-matched subtrees excluded, whitespace
/// normalized the way a browser would render it.
fn text_excluding(el: ElementRef<'_>, remove: Option<&str>) -> Result<String, SelectorError> {
    let removed = remove.map(compile).transpose()?;
    let mut raw = String::new();
    collect_text(el, removed.as_ref(), &mut raw);
    Ok(raw.split_whitespace().collect::<Vec<_>>().join(" "))
}

fn collect_text(el: ElementRef<'_>, skip: Option<&Selector>, out: &mut String) {
    for child in el.children() {
        if let Some(child_el) = ElementRef::wrap(child) {
            if let Some(sel) = skip {
                if sel.matches(&child_el) {
                    continue;
                }
            }
            collect_text(child_el, skip, out);
        } else if let Some(text) = child.value().as_text() {
            out.push_str(text);
        }
    }
}
