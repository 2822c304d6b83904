//! RDF terms: IRIs, blank nodes and literals

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// XML Schema datatype IRIs used by the serializer and the extractor
pub mod xsd {
    pub const INTEGER: &str = "http://www.w3.org/2001/XMLSchema#integer";
    pub const DECIMAL: &str = "http://www.w3.org/2001/XMLSchema#decimal";
    pub const DOUBLE: &str = "http://www.w3.org/2001/XMLSchema#double";
    pub const BOOLEAN: &str = "http://www.w3.org/2001/XMLSchema#boolean";
    pub const STRING: &str = "http://www.w3.org/2001/XMLSchema#string";
    pub const DATE_TIME: &str = "http://www.w3.org/2001/XMLSchema#dateTime";
}

/// A term that cannot be stored or serialized safely
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TermError {
    #[error("invalid IRI <{iri}>: {message}")]
    InvalidIri { iri: String, message: String },
    #[error("invalid blank node label {0:?}")]
    InvalidBlank(String),
    #[error("invalid language tag {0:?}")]
    InvalidLanguage(String),
    #[error("{0} cannot be a subject or graph name")]
    NotAResource(String),
    #[error("{0} cannot be a predicate")]
    NotAnIri(String),
}

/// Check that `iri` is an absolute IRI with no characters N-Triples forbids
pub fn check_iri(iri: &str) -> Result<(), TermError> {
    oxiri::Iri::parse(iri)
        .map(|_| ())
        .map_err(|e| TermError::InvalidIri {
            iri: iri.to_string(),
            message: e.to_string(),
        })
}

/// A single RDF term
///
/// Serializes as its N-Triples form, which is also how terms are encoded in
/// persistent storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Term {
    /// An absolute IRI, stored without angle brackets.
    ///
    /// The constructors do not check the IRI; [`Term::validate`] does, and
    /// both storage engines call it before buffering a write.
    Iri(String),
    /// A blank node label, stored without the `_:` prefix
    Blank(String),
    /// A literal with optional datatype or language tag
    Literal {
        lexical: String,
        datatype: Option<String>,
        language: Option<String>,
    },
}

impl Term {
    pub fn iri(iri: impl Into<String>) -> Self {
        Self::Iri(iri.into())
    }

    /// An IRI term from untrusted input
    pub fn parse_iri(iri: impl Into<String>) -> Result<Self, TermError> {
        let iri = iri.into();
        check_iri(&iri)?;
        Ok(Self::Iri(iri))
    }

    pub fn blank(label: impl Into<String>) -> Self {
        Self::Blank(label.into())
    }

    /// A plain string literal
    pub fn literal(lexical: impl Into<String>) -> Self {
        Self::Literal {
            lexical: lexical.into(),
            datatype: None,
            language: None,
        }
    }

    /// A typed literal; `xsd:string` collapses to a plain literal
    pub fn typed_literal(lexical: impl Into<String>, datatype: impl Into<String>) -> Self {
        let datatype = datatype.into();
        Self::Literal {
            lexical: lexical.into(),
            datatype: (datatype != xsd::STRING).then_some(datatype),
            language: None,
        }
    }

    /// A language-tagged literal; the tag is lowercased
    pub fn lang_literal(lexical: impl Into<String>, language: impl Into<String>) -> Self {
        Self::Literal {
            lexical: lexical.into(),
            datatype: None,
            language: Some(language.into().to_ascii_lowercase()),
        }
    }

    pub fn is_iri(&self) -> bool {
        matches!(self, Self::Iri(_))
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Self::Literal { .. })
    }

    /// Literals cannot be subjects or graph names
    pub fn is_resource(&self) -> bool {
        !self.is_literal()
    }

    /// Check that the term renders to well-formed N-Triples
    pub fn validate(&self) -> Result<(), TermError> {
        match self {
            Self::Iri(iri) => check_iri(iri),
            Self::Blank(label) => {
                let valid = !label.is_empty()
                    && !label.ends_with('.')
                    && label
                        .chars()
                        .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'));
                if valid {
                    Ok(())
                } else {
                    Err(TermError::InvalidBlank(label.clone()))
                }
            }
            Self::Literal {
                datatype, language, ..
            } => {
                if let Some(lang) = language {
                    let valid = lang.split('-').all(|part| {
                        !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric())
                    });
                    if !valid {
                        return Err(TermError::InvalidLanguage(lang.clone()));
                    }
                }
                match datatype {
                    Some(dt) => check_iri(dt),
                    None => Ok(()),
                }
            }
        }
    }

    /// The bare string value: IRI text, blank label, or literal lexical form.
    ///
    /// Subject comparisons during partial admission use this value.
    pub fn value(&self) -> &str {
        match self {
            Self::Iri(iri) => iri,
            Self::Blank(label) => label,
            Self::Literal { lexical, .. } => lexical,
        }
    }

    /// Render the term in N-Triples syntax
    pub fn to_ntriples(&self) -> String {
        match self {
            Self::Iri(iri) => format!("<{}>", iri),
            Self::Blank(label) => format!("_:{}", label),
            Self::Literal {
                lexical,
                datatype,
                language,
            } => {
                let mut out = String::with_capacity(lexical.len() + 2);
                out.push('"');
                escape_into(lexical, &mut out);
                out.push('"');
                if let Some(lang) = language {
                    out.push('@');
                    out.push_str(lang);
                } else if let Some(dt) = datatype {
                    out.push_str("^^<");
                    out.push_str(dt);
                    out.push('>');
                }
                out
            }
        }
    }
}

fn escape_into(lexical: &str, out: &mut String) {
    for c in lexical.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_ntriples())
    }
}

impl Serialize for Term {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_ntriples())
    }
}

impl<'de> Deserialize<'de> for Term {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        crate::extract::parse_term(&raw).map_err(serde::de::Error::custom)
    }
}

impl From<&str> for Term {
    fn from(iri: &str) -> Self {
        Self::Iri(iri.to_string())
    }
}
