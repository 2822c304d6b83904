//! Statement extraction
//!
//! Events are serialized to Turtle and parsed back into individual
//! statements, so admission can tell statements about the event node apart
//! from the fact the event reports.

mod parser;
mod serializer;

pub use parser::{ParseError, ParseResult};
pub use serializer::TurtleSerializer;

use crate::model::{Statement, Term};

/// Parse a Turtle document into its statements, in document order.
///
/// `base` resolves relative IRIs; for events it is the event URI and must be
/// absolute. Malformed input yields an error and no statements.
pub fn extract_statements(text: &str, base: &str) -> ParseResult<Vec<Statement>> {
    parser::parse_document(text, base)
}

/// Parse one term in N-Triples form (`<iri>`, `_:b`, `"lit"@en`, `"1"^^<dt>`)
pub fn parse_term(text: &str) -> ParseResult<Term> {
    parser::parse_single_term(text)
}
