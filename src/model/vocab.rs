//! Vocabulary used to describe context events as statements

pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";

/// Namespace of the context event vocabulary
pub const CTX_NS: &str = "http://ontology.ctxstore.dev/Context.owl#";

pub const CONTEXT_EVENT: &str = "http://ontology.ctxstore.dev/Context.owl#ContextEvent";
pub const HAS_SUBJECT: &str = "http://ontology.ctxstore.dev/Context.owl#hasSubject";
pub const HAS_PREDICATE: &str = "http://ontology.ctxstore.dev/Context.owl#hasPredicate";
pub const HAS_OBJECT: &str = "http://ontology.ctxstore.dev/Context.owl#hasObject";
pub const HAS_CONFIDENCE: &str = "http://ontology.ctxstore.dev/Context.owl#hasConfidence";
pub const HAS_TIMESTAMP: &str = "http://ontology.ctxstore.dev/Context.owl#hasTimestamp";
pub const HAS_PROVIDER: &str = "http://ontology.ctxstore.dev/Context.owl#hasProvider";

/// Prefix turning a local scope name into a graph IRI
pub const DEFAULT_SCOPE_PREFIX: &str = "urn:ctxstore:scope:";

/// True if `id` already is a fully qualified identifier (has a scheme)
pub fn is_qualified(id: &str) -> bool {
    match id.find(':') {
        Some(idx) => idx > 0,
        None => false,
    }
}
