//! Turtle serialization of context events

use crate::model::{vocab, xsd, ContextEvent, Term};
use chrono::SecondsFormat;
use std::fmt::Write;

/// Renders a [`ContextEvent`] as a Turtle document.
///
/// The document describes the event node (type, declared subject, predicate
/// and object, plus confidence, timestamp and provider when present) and then
/// states the core fact on its own. IRIs are written verbatim, so the event
/// should pass [`ContextEvent::validate`] first; a validated event never
/// yields a relative IRI, and the output parses the same under any base.
#[derive(Debug, Clone, Copy, Default)]
pub struct TurtleSerializer;

impl TurtleSerializer {
    pub fn new() -> Self {
        Self
    }

    pub fn serialize(&self, event: &ContextEvent) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "@prefix ctx: <{}> .", vocab::CTX_NS);
        let _ = writeln!(out);

        let _ = writeln!(out, "<{}> a ctx:ContextEvent ;", event.uri);
        let _ = writeln!(out, "    ctx:hasSubject <{}> ;", event.subject);
        let _ = writeln!(out, "    ctx:hasPredicate <{}> ;", event.predicate);
        let _ = write!(out, "    ctx:hasObject {}", event.object.to_ntriples());

        if let Some(confidence) = event.confidence {
            let _ = write!(
                out,
                " ;\n    ctx:hasConfidence {}",
                Term::typed_literal(confidence.to_string(), xsd::INTEGER)
            );
        }
        if let Some(ts) = event.timestamp {
            let _ = write!(
                out,
                " ;\n    ctx:hasTimestamp {}",
                Term::typed_literal(ts.to_rfc3339_opts(SecondsFormat::Millis, true), xsd::DATE_TIME)
            );
        }
        if let Some(provider) = &event.provider {
            let _ = write!(out, " ;\n    ctx:hasProvider <{}>", provider);
        }
        let _ = writeln!(out, " .");
        let _ = writeln!(out);

        let _ = writeln!(
            out,
            "<{}> <{}> {} .",
            event.subject,
            event.predicate,
            event.object.to_ntriples()
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::extract_statements;
    use crate::model::Statement;
    use chrono::{TimeZone, Utc};

    fn event() -> ContextEvent {
        ContextEvent::with_uri("urn:ev:1", "urn:s", "urn:p", Term::iri("urn:o")).unwrap()
    }

    #[test]
    fn minimal_event_yields_reification_and_fact() {
        let text = TurtleSerializer::new().serialize(&event());
        let sts = extract_statements(&text, "urn:ev:1").unwrap();
        assert_eq!(sts.len(), 5);
        assert_eq!(
            sts[0],
            Statement::new(
                Term::iri("urn:ev:1"),
                Term::iri(vocab::RDF_TYPE),
                Term::iri(vocab::CONTEXT_EVENT)
            )
        );
        assert_eq!(sts[4], event().fact());
    }

    #[test]
    fn optional_fields_are_serialized() {
        let e = event()
            .with_confidence(30)
            .at(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap())
            .with_provider("urn:sensor:7");
        let text = TurtleSerializer::new().serialize(&e);
        let sts = extract_statements(&text, &e.uri).unwrap();

        let about_event: Vec<_> = sts.iter().filter(|s| s.has_subject("urn:ev:1")).collect();
        assert_eq!(about_event.len(), 7);
        assert!(sts.iter().any(|s| s.predicate == Term::iri(vocab::HAS_CONFIDENCE)
            && s.object == Term::typed_literal("30", xsd::INTEGER)));
        assert!(sts.iter().any(|s| s.predicate == Term::iri(vocab::HAS_TIMESTAMP)
            && s.object
                == Term::typed_literal("2024-05-01T12:00:00.000Z", xsd::DATE_TIME)));
        assert!(sts.iter().any(|s| s.predicate == Term::iri(vocab::HAS_PROVIDER)));
    }

    #[test]
    fn literal_objects_survive() {
        let e = ContextEvent::with_uri(
            "urn:ev:2",
            "urn:sensor:t",
            "urn:p:label",
            Term::lang_literal("cocina \"norte\"", "es"),
        )
        .unwrap();
        let text = TurtleSerializer::new().serialize(&e);
        let sts = extract_statements(&text, &e.uri).unwrap();
        assert_eq!(sts.last().unwrap(), &e.fact());
    }
}
