//! Variable scopes for template resolution.

use std::collections::BTreeMap;

/// A value bound in a [`VariableScope`].
///
/// `Nil` is distinct from an empty string: it renders as empty and tests
/// falsy, but carries "this variable was never provided" semantics, which is
/// what conditional blocks branch on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateValue {
    Nil,
    Text(String),
    List(Vec<String>),
}

impl TemplateValue {
    /// Render for substitution. Lists join with a comma.
    pub fn render(&self) -> String {
        match self {
            Self::Nil => String::new(),
            Self::Text(t) => t.clone(),
            Self::List(l) => l.join(","),
        }
    }

    /// Conditional truthiness: set and non-blank.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Nil => false,
            Self::Text(t) => !t.trim().is_empty(),
            Self::List(l) => !l.is_empty(),
        }
    }

    /// View as a list for `range`/`join`.
    pub fn as_list(&self) -> Vec<String> {
        match self {
            Self::Nil => Vec::new(),
            Self::Text(t) => vec![t.clone()],
            Self::List(l) => l.clone(),
        }
    }
}

impl From<String> for TemplateValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for TemplateValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Vec<String>> for TemplateValue {
    fn from(value: Vec<String>) -> Self {
        Self::List(value)
    }
}

const NIL: TemplateValue = TemplateValue::Nil;

/// Ordered map of dotted variable names (".Query.Season") to values.
///
/// Built fresh for every request; iteration order is deterministic so request
/// assembly is reproducible.
#[derive(Debug, Clone, Default)]
pub struct VariableScope {
    values: BTreeMap<String, TemplateValue>,
}

impl VariableScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a variable. Keys are expected to carry their leading dot.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<TemplateValue>) {
        self.values.insert(key.into(), value.into());
    }

    /// Bind a variable to `Nil` (present but unset).
    pub fn set_nil(&mut self, key: impl Into<String>) {
        self.values.insert(key.into(), TemplateValue::Nil);
    }

    /// Look up a variable. Missing keys read as `Nil`.
    pub fn get(&self, key: &str) -> &TemplateValue {
        self.values.get(key).unwrap_or(&NIL)
    }

    /// Render a variable for substitution. Missing keys render empty.
    pub fn render(&self, key: &str) -> String {
        self.get(key).render()
    }

    pub fn is_truthy(&self, key: &str) -> bool {
        self.get(key).is_truthy()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TemplateValue)> {
        self.values.iter()
    }
}
