//! ContextEvent: a timestamped observation entering the store

use super::term::{check_iri, Term, TermError};
use super::vocab;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Highest admissible confidence value
pub const MAX_CONFIDENCE: u8 = 100;

/// An observation about the world: "subject predicate object", with provenance.
///
/// Immutable once handed to the connector. JSON form:
///
/// ```json
/// {"uri": "urn:ev:1", "subject": "urn:user:ana", "predicate": "urn:p:location",
///  "object": "urn:room:kitchen", "confidence": 70, "scopes": ["tenantA"]}
/// ```
///
/// `object` accepts any N-Triples term (`<iri>`, `"literal"`, `_:b`); a bare
/// string is taken as an IRI. `uri`, `subject`, `predicate` and `provider`
/// must be absolute IRIs; anything else fails deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEvent {
    #[serde(deserialize_with = "absolute_iri")]
    pub uri: String,
    #[serde(deserialize_with = "absolute_iri")]
    pub subject: String,
    #[serde(deserialize_with = "absolute_iri")]
    pub predicate: String,
    #[serde(deserialize_with = "lenient_object")]
    pub object: Term,
    /// Confidence in [0, 100]; `None` means unknown
    #[serde(
        default,
        deserialize_with = "bounded_confidence",
        skip_serializing_if = "Option::is_none"
    )]
    pub confidence: Option<u8>,
    /// Tenant/scope identifiers, qualified or local names
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// IRI of the component that produced the event
    #[serde(
        default,
        deserialize_with = "optional_iri",
        skip_serializing_if = "Option::is_none"
    )]
    pub provider: Option<String>,
}

impl ContextEvent {
    /// Create an event with a fresh `urn:uuid:` URI and the current time
    pub fn new(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: Term,
    ) -> Result<Self, TermError> {
        Ok(Self::with_uri(
            format!("urn:uuid:{}", Uuid::new_v4()),
            subject,
            predicate,
            object,
        )?
        .at(Utc::now()))
    }

    /// Create an event with an explicit URI and no timestamp.
    ///
    /// Fails unless `uri`, `subject` and `predicate` are absolute IRIs and
    /// `object` is a well-formed term.
    pub fn with_uri(
        uri: impl Into<String>,
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: Term,
    ) -> Result<Self, TermError> {
        let event = Self {
            uri: uri.into(),
            subject: subject.into(),
            predicate: predicate.into(),
            object,
            confidence: None,
            scopes: Vec::new(),
            timestamp: None,
            provider: None,
        };
        event.validate()?;
        Ok(event)
    }

    /// Check the IRIs and the object; the connector runs this before
    /// serializing an event
    pub fn validate(&self) -> Result<(), TermError> {
        check_iri(&self.uri)?;
        check_iri(&self.subject)?;
        check_iri(&self.predicate)?;
        if let Some(provider) = &self.provider {
            check_iri(provider)?;
        }
        self.object.validate()
    }

    /// Set the confidence, clamped to [`MAX_CONFIDENCE`]
    pub fn with_confidence(mut self, confidence: u8) -> Self {
        self.confidence = Some(confidence.min(MAX_CONFIDENCE));
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scopes.push(scope.into());
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// The observed fact itself
    pub fn fact(&self) -> super::Statement {
        super::Statement::new(
            Term::iri(&self.subject),
            Term::iri(&self.predicate),
            self.object.clone(),
        )
    }

    /// Graph identifiers for this event's scopes, in scope order.
    ///
    /// Local names are prefixed with `scope_prefix`.
    pub fn graphs(&self, scope_prefix: &str) -> Vec<Term> {
        self.scopes
            .iter()
            .map(|scope| {
                if vocab::is_qualified(scope) {
                    Term::iri(scope.as_str())
                } else {
                    Term::iri(format!("{}{}", scope_prefix, scope))
                }
            })
            .collect()
    }
}

fn lenient_object<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Term, D::Error> {
    let raw = String::deserialize(deserializer)?;
    let trimmed = raw.trim();
    if trimmed.starts_with('<') || trimmed.starts_with('"') || trimmed.starts_with("_:") {
        crate::extract::parse_term(trimmed).map_err(serde::de::Error::custom)
    } else {
        Term::parse_iri(trimmed).map_err(serde::de::Error::custom)
    }
}

fn absolute_iri<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let raw = String::deserialize(deserializer)?;
    check_iri(&raw).map_err(serde::de::Error::custom)?;
    Ok(raw)
}

fn optional_iri<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    if let Some(iri) = &raw {
        check_iri(iri).map_err(serde::de::Error::custom)?;
    }
    Ok(raw)
}

fn bounded_confidence<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u8>, D::Error> {
    let raw = Option::<i64>::deserialize(deserializer)?;
    match raw {
        None => Ok(None),
        Some(c) if (0..=MAX_CONFIDENCE as i64).contains(&c) => Ok(Some(c as u8)),
        Some(c) => Err(serde::de::Error::custom(format!(
            "confidence {} outside 0..={}",
            c, MAX_CONFIDENCE
        ))),
    }
}
