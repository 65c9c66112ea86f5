//! Query model, request generation and response parsing.

mod generator;
mod parser;
mod query;
mod release;

pub use generator::{base_scope, RequestGenerator, SearchRequest, SearchRequestChain};
pub use parser::ResponseParser;
pub use query::{QueryKind, SearchQuery};
pub use release::ReleaseRecord;
