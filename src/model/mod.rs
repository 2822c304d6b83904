//! Core data model: terms, statements and context events

mod event;
mod statement;
mod term;
pub mod vocab;

pub use event::{ContextEvent, MAX_CONFIDENCE};
pub use statement::{Statement, StatementPattern};
pub use term::{check_iri, xsd, Term, TermError};
