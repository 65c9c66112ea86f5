//! Template language for Definitions: variable scopes and the expression
//! resolver applied to paths, inputs, selectors and filter arguments.

mod engine;
mod scope;

pub use engine::{resolve, resolve_encoded, TemplateError};
pub use scope::{TemplateValue, VariableScope};
