//! Synchronous usage errors (spec §7).
//!
//! Only the usage-error class is represented here: malformed input that the
//! cache can tolerate (hydrate garbage, un-normalizable network objects) is
//! absorbed silently elsewhere, and read paths never return `Err` at all —
//! see the module docs on [`crate::Cache`].

/// Errors the cache surfaces synchronously from write/usage APIs.
///
/// Read APIs (`read_query`, `read_fragment`, `materialize_entity`) never
/// produce this type; they return `None`/placeholder shapes instead (spec §7).
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("id must be a non-empty string")]
    EmptyId,

    #[error("fragment document must be a non-empty string")]
    EmptyFragmentName,

    /// A fragment document did not contain exactly one fragment definition.
    #[error("fragment document must contain exactly one fragment definition, found {found}")]
    FragmentDocumentShape { found: usize },

    #[error("failed to parse GraphQL document: {message}")]
    GraphQlSyntax {
        message: String,
        #[source]
        source: Option<DiagnosticSource>,
    },
}

/// Wraps the compiler's diagnostics so `CacheError` stays `Send + 'static`
/// without leaking `apollo_compiler`'s borrowed diagnostic types across the
/// crate boundary.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct DiagnosticSource(pub String);

impl CacheError {
    pub(crate) fn from_diagnostics(message: impl std::fmt::Display) -> Self {
        let message = message.to_string();
        CacheError::GraphQlSyntax {
            source: Some(DiagnosticSource(message.clone())),
            message,
        }
    }
}
