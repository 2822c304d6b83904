//! Turtle parsing on top of `oxttl`
//!
//! Relative IRIs are resolved against the base with RFC 3986 reference
//! resolution, dot segments included. Every IRI in the output is absolute
//! and syntactically valid.

use crate::model::{xsd, Statement, Term, TermError};
use oxttl::{TurtleParseError, TurtleParser};
use std::str::FromStr;
use thiserror::Error;

/// Malformed serialization
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("parse error at line {line}: {message}")]
pub struct ParseError {
    /// 1-based line of the offending token; 0 when no position applies
    pub line: usize,
    pub message: String,
}

pub type ParseResult<T> = Result<T, ParseError>;

impl ParseError {
    fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

impl From<TurtleParseError> for ParseError {
    fn from(err: TurtleParseError) -> Self {
        match err {
            TurtleParseError::Syntax(syntax) => {
                let line = syntax.location().start.line as usize + 1;
                Self::new(line, syntax.to_string())
            }
            TurtleParseError::Io(io) => Self::new(0, io.to_string()),
        }
    }
}

/// A term that would not survive serialization
impl From<TermError> for ParseError {
    fn from(err: TermError) -> Self {
        Self::new(0, err.to_string())
    }
}

/// Parse a whole document. Any error discards the statements read so far.
pub(crate) fn parse_document(text: &str, base: &str) -> ParseResult<Vec<Statement>> {
    let mut parser = TurtleParser::new();
    if !base.is_empty() {
        parser = parser
            .with_base_iri(base)
            .map_err(|e| ParseError::new(0, format!("invalid base IRI <{}>: {}", base, e)))?;
    }

    let mut statements = Vec::new();
    for triple in parser.for_reader(text.as_bytes()) {
        statements.push(convert_triple(triple?)?);
    }
    Ok(statements)
}

/// Parse exactly one term in N-Triples syntax
pub(crate) fn parse_single_term(text: &str) -> ParseResult<Term> {
    let term =
        oxrdf::Term::from_str(text.trim()).map_err(|e| ParseError::new(1, e.to_string()))?;
    convert_term(term)
}

fn convert_triple(triple: oxrdf::Triple) -> ParseResult<Statement> {
    #[allow(unreachable_patterns)]
    let subject = match triple.subject {
        oxrdf::Subject::NamedNode(node) => Term::Iri(node.into_string()),
        oxrdf::Subject::BlankNode(node) => Term::Blank(node.as_str().to_string()),
        _ => return Err(ParseError::new(0, "quoted triples are not supported")),
    };
    Ok(Statement::new(
        subject,
        Term::Iri(triple.predicate.into_string()),
        convert_term(triple.object)?,
    ))
}

fn convert_term(term: oxrdf::Term) -> ParseResult<Term> {
    #[allow(unreachable_patterns)]
    match term {
        oxrdf::Term::NamedNode(node) => Ok(Term::Iri(node.into_string())),
        oxrdf::Term::BlankNode(node) => Ok(Term::Blank(node.as_str().to_string())),
        oxrdf::Term::Literal(literal) => Ok(convert_literal(&literal)),
        _ => Err(ParseError::new(0, "quoted triples are not supported")),
    }
}

fn convert_literal(literal: &oxrdf::Literal) -> Term {
    if let Some(language) = literal.language() {
        return Term::lang_literal(literal.value(), language);
    }
    let datatype = literal.datatype().as_str();
    if datatype == xsd::STRING {
        Term::literal(literal.value())
    } else {
        Term::typed_literal(literal.value(), datatype)
    }
}
