//! Cardinality policies: which existing statements a new one displaces

use crate::model::{Statement, StatementPattern, Term};
use std::collections::HashSet;

/// Given a statement about to be added to `graphs`, name the statements it
/// replaces. Displaced statements are removed in the same transaction,
/// before the add.
pub trait CardinalityPolicy: Send + Sync {
    fn displaced(&self, statement: &Statement, graphs: &[Term]) -> Option<StatementPattern>;
}

/// Statements accumulate; nothing is ever displaced.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unbounded;

impl CardinalityPolicy for Unbounded {
    fn displaced(&self, _statement: &Statement, _graphs: &[Term]) -> Option<StatementPattern> {
        None
    }
}

/// Predicates with at most one value per subject and graph.
///
/// Adding `(s, p, o)` for a functional `p` displaces every `(s, p, *)` in the
/// target graphs. With no target graphs, every graph is affected.
#[derive(Debug, Default, Clone)]
pub struct FunctionalPredicates {
    predicates: HashSet<String>,
}

impl FunctionalPredicates {
    pub fn new<I, P>(predicates: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        Self {
            predicates: predicates.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_functional(&self, predicate: &str) -> bool {
        self.predicates.contains(predicate)
    }

    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }
}

impl CardinalityPolicy for FunctionalPredicates {
    fn displaced(&self, statement: &Statement, graphs: &[Term]) -> Option<StatementPattern> {
        if !statement.predicate.is_iri() || !self.is_functional(statement.predicate.value()) {
            return None;
        }
        Some(
            StatementPattern::any()
                .with_subject(statement.subject.clone())
                .with_predicate(statement.predicate.clone())
                .in_contexts(graphs),
        )
    }
}
