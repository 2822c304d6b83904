//! Admission policies: how much of an event gets persisted

use crate::model::{ContextEvent, Statement, MAX_CONFIDENCE};
use std::sync::atomic::{AtomicU8, Ordering};

/// How much of an event's statements to keep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Every extracted statement, provenance included
    Full,
    /// Only statements whose subject is the event's own URI
    Partial,
}

impl std::fmt::Display for Admission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Admission::Full => write!(f, "full"),
            Admission::Partial => write!(f, "partial"),
        }
    }
}

/// Decides admission for one event and applies that decision.
pub trait AdmissionPolicy: Send + Sync {
    fn decide(&self, event: &ContextEvent) -> Admission;

    /// Keep the statements `admission` allows for `event`, in order.
    fn filter(
        &self,
        event: &ContextEvent,
        admission: Admission,
        statements: Vec<Statement>,
    ) -> Vec<Statement> {
        match admission {
            Admission::Full => statements,
            Admission::Partial => statements
                .into_iter()
                .filter(|st| st.has_subject(&event.uri))
                .collect(),
        }
    }
}

/// Clamp a caller-supplied threshold into `0..=100`
pub fn clamp_threshold(threshold: i64) -> u8 {
    threshold.clamp(0, i64::from(MAX_CONFIDENCE)) as u8
}

/// Confidence gate: events at or above the threshold are admitted in full,
/// events below it partially. Events without a confidence are admitted in full.
#[derive(Debug, Default)]
pub struct ConfidenceFilter {
    threshold: AtomicU8,
}

impl ConfidenceFilter {
    pub fn new(threshold: i64) -> Self {
        Self {
            threshold: AtomicU8::new(clamp_threshold(threshold)),
        }
    }

    pub fn threshold(&self) -> u8 {
        self.threshold.load(Ordering::SeqCst)
    }

    /// Values above 100 become 100 and negatives become 0; never rejected.
    pub fn set_threshold(&self, threshold: i64) {
        let clamped = clamp_threshold(threshold);
        if i64::from(clamped) != threshold {
            tracing::debug!(requested = threshold, threshold = clamped, "threshold clamped");
        }
        self.threshold.store(clamped, Ordering::SeqCst);
    }
}

impl AdmissionPolicy for ConfidenceFilter {
    fn decide(&self, event: &ContextEvent) -> Admission {
        match event.confidence {
            Some(confidence) if confidence < self.threshold() => Admission::Partial,
            _ => Admission::Full,
        }
    }
}

/// Admits every event in full regardless of confidence.
#[derive(Debug, Default, Clone, Copy)]
pub struct AdmitAll;

impl AdmissionPolicy for AdmitAll {
    fn decide(&self, _event: &ContextEvent) -> Admission {
        Admission::Full
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{vocab, Term};

    fn event(confidence: Option<u8>) -> ContextEvent {
        let mut event = ContextEvent::with_uri("urn:U", "urn:S", "urn:P", Term::iri("urn:O")).unwrap();
        event.confidence = confidence;
        event
    }

    fn extracted() -> Vec<Statement> {
        vec![
            Statement::new(Term::iri("urn:U"), Term::iri(vocab::HAS_SUBJECT), Term::iri("urn:S")),
            Statement::new(Term::iri("urn:U"), Term::iri(vocab::HAS_PREDICATE), Term::iri("urn:P")),
            Statement::new(Term::iri("urn:U"), Term::iri(vocab::HAS_OBJECT), Term::iri("urn:O")),
            Statement::new(Term::iri("urn:S"), Term::iri("urn:P"), Term::iri("urn:O")),
        ]
    }

    #[test]
    fn threshold_clamps_on_both_ends() {
        let filter = ConfidenceFilter::new(250);
        assert_eq!(filter.threshold(), 100);

        filter.set_threshold(101);
        assert_eq!(filter.threshold(), 100);
        filter.set_threshold(-5);
        assert_eq!(filter.threshold(), 0);
        filter.set_threshold(42);
        assert_eq!(filter.threshold(), 42);
        filter.set_threshold(i64::MAX);
        assert_eq!(filter.threshold(), 100);
    }

    #[test]
    fn low_confidence_keeps_only_event_node() {
        let filter = ConfidenceFilter::new(50);
        let event = event(Some(30));

        let admission = filter.decide(&event);
        assert_eq!(admission, Admission::Partial);

        let kept = filter.filter(&event, admission, extracted());
        assert_eq!(kept, extracted()[..3].to_vec());
    }

    #[test]
    fn high_confidence_keeps_everything() {
        let filter = ConfidenceFilter::new(50);
        let event = event(Some(70));

        let admission = filter.decide(&event);
        assert_eq!(admission, Admission::Full);
        assert_eq!(filter.filter(&event, admission, extracted()), extracted());
    }

    #[test]
    fn confidence_equal_to_threshold_is_full() {
        let filter = ConfidenceFilter::new(50);
        assert_eq!(filter.decide(&event(Some(50))), Admission::Full);
    }

    #[test]
    fn missing_confidence_is_full_at_any_threshold() {
        let filter = ConfidenceFilter::new(0);
        for threshold in [0, 1, 50, 99, 100] {
            filter.set_threshold(threshold);
            assert_eq!(filter.decide(&event(None)), Admission::Full);
        }
    }

    #[test]
    fn subject_match_is_exact() {
        let filter = ConfidenceFilter::new(100);
        let event = event(Some(0));
        let near_miss = vec![
            Statement::new(Term::iri("urn:U/"), Term::iri("urn:p"), Term::iri("urn:o")),
            Statement::new(Term::iri("urn:u"), Term::iri("urn:p"), Term::iri("urn:o")),
            Statement::new(Term::iri("urn:U"), Term::iri("urn:p"), Term::iri("urn:o")),
        ];
        let kept = filter.filter(&event, Admission::Partial, near_miss);
        assert_eq!(kept.len(), 1);
        assert!(kept[0].has_subject("urn:U"));
    }

    #[test]
    fn admit_all_ignores_confidence() {
        assert_eq!(AdmitAll.decide(&event(Some(0))), Admission::Full);
        assert_eq!(Admission::Partial.to_string(), "partial");
    }
}
