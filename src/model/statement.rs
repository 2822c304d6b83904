//! Statements (triples bound to an optional graph) and statement patterns

use super::term::{Term, TermError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A subject-predicate-object triple, optionally bound to a graph
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Statement {
    pub subject: Term,
    pub predicate: Term,
    pub object: Term,
    /// Graph (context) identifier; `None` is the default graph
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Term>,
}

impl Statement {
    pub fn new(subject: Term, predicate: Term, object: Term) -> Self {
        Self {
            subject,
            predicate,
            object,
            context: None,
        }
    }

    pub fn with_context(mut self, context: Term) -> Self {
        self.context = Some(context);
        self
    }

    /// Copies of this statement, one per graph.
    ///
    /// An empty graph list keeps the statement's own context.
    pub fn in_contexts(&self, contexts: &[Term]) -> Vec<Statement> {
        if contexts.is_empty() {
            return vec![self.clone()];
        }
        contexts
            .iter()
            .map(|ctx| Statement {
                context: Some(ctx.clone()),
                ..self.clone()
            })
            .collect()
    }

    /// Check positions and term syntax before the statement is written.
    ///
    /// Subjects and graph names must be IRIs or blank nodes, predicates must
    /// be IRIs, and every term must be well formed.
    pub fn validate(&self) -> Result<(), TermError> {
        if !self.subject.is_resource() {
            return Err(TermError::NotAResource(self.subject.to_ntriples()));
        }
        if !self.predicate.is_iri() {
            return Err(TermError::NotAnIri(self.predicate.to_ntriples()));
        }
        if let Some(ctx) = &self.context {
            if !ctx.is_resource() {
                return Err(TermError::NotAResource(ctx.to_ntriples()));
            }
            ctx.validate()?;
        }
        self.subject.validate()?;
        self.predicate.validate()?;
        self.object.validate()
    }

    /// True if the subject's string value equals `uri` byte-for-byte
    pub fn has_subject(&self, uri: &str) -> bool {
        self.subject.value() == uri
    }

    /// N-Triples (or N-Quads, when a context is set) line without trailing newline
    pub fn to_nquad(&self) -> String {
        match &self.context {
            Some(ctx) => format!(
                "{} {} {} {} .",
                self.subject, self.predicate, self.object, ctx
            ),
            None => format!("{} {} {} .", self.subject, self.predicate, self.object),
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_nquad())
    }
}

/// Match criteria for reading or removing statements
///
/// `None` positions are wildcards. An empty context list matches every graph;
/// otherwise only statements in one of the listed graphs match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatementPattern {
    pub subject: Option<Term>,
    pub predicate: Option<Term>,
    pub object: Option<Term>,
    pub contexts: Vec<Term>,
}

impl StatementPattern {
    /// Pattern matching every statement
    pub fn any() -> Self {
        Self::default()
    }

    pub fn with_subject(mut self, subject: Term) -> Self {
        self.subject = Some(subject);
        self
    }

    pub fn with_predicate(mut self, predicate: Term) -> Self {
        self.predicate = Some(predicate);
        self
    }

    pub fn with_object(mut self, object: Term) -> Self {
        self.object = Some(object);
        self
    }

    pub fn in_contexts(mut self, contexts: &[Term]) -> Self {
        self.contexts = contexts.to_vec();
        self
    }

    pub fn matches(&self, st: &Statement) -> bool {
        fn pos(want: &Option<Term>, got: &Term) -> bool {
            want.as_ref().map_or(true, |w| w == got)
        }
        pos(&self.subject, &st.subject)
            && pos(&self.predicate, &st.predicate)
            && pos(&self.object, &st.object)
            && (self.contexts.is_empty()
                || st
                    .context
                    .as_ref()
                    .map_or(false, |c| self.contexts.contains(c)))
    }
}
