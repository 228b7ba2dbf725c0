//! Error types for schema weaving and request-time resolution.
//!
//! Splits into a leaf error enum and an aggregating
//! wrapper: [`SingleWeaverError`] is what any one step of the pipeline can
//! fail with, [`WeaverError`] is what propagates out of boot (potentially
//! several, since a [`WeavingError`](SingleWeaverError::Weaving) for one
//! link never aborts the others).

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SingleWeaverError {
    #[error("endpoint configuration is invalid: {message}")]
    Config { message: String },

    #[error("introspection of endpoint `{endpoint}` failed: {message}")]
    IntrospectionFailure { endpoint: String, message: String },

    #[error("failed to build schema for endpoint `{endpoint}`: {message}")]
    SchemaBuild { endpoint: String, message: String },

    #[error("type `{type_name}` is produced by more than one endpoint after namespacing")]
    NamespaceCollision { type_name: String },

    #[error("link `{parent_type}.{field}` could not be installed: {message}")]
    Weaving {
        parent_type: String,
        field: String,
        message: String,
    },

    #[error("transformer referenced unknown type `{type_name}`")]
    UnknownTypeReference { type_name: String },

    #[error("duplicate field `{field}` on type `{type_name}`")]
    DuplicateField { type_name: String, field: String },

    #[error("selection aliases `{field}` to the reserved name `__typename`")]
    ReservedFieldAlias { field: String },

    #[error("upstream response for endpoint `{endpoint}` is missing expected field at `{path}`")]
    UpstreamContractViolation { endpoint: String, path: String },

    #[error("link key field evaluated to an error value for parent at `{path}`")]
    KeyFieldError { path: String },

    #[error("sub-query to endpoint `{endpoint}` returned errors: {}", .errors.join("; "))]
    Subquery { endpoint: String, errors: Vec<String> },

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl SingleWeaverError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Boot-fatal errors (everything except [`SingleWeaverError::Weaving`], which
/// is reported through the error consumer instead) abort [`crate::Weaver::build`].
/// Request-fatal errors are surfaced as a single GraphQL error on the
/// originating field's response path by [`crate::proxy`]/[`crate::link`].
#[derive(Error, Debug, Clone)]
pub enum WeaverError {
    #[error(transparent)]
    Single(#[from] SingleWeaverError),

    #[error("{} errors occurred while weaving the schema", .0.len())]
    Multiple(Vec<SingleWeaverError>),
}

impl WeaverError {
    pub fn errors(&self) -> Vec<&SingleWeaverError> {
        match self {
            WeaverError::Single(err) => vec![err],
            WeaverError::Multiple(errs) => errs.iter().collect(),
        }
    }
}

pub type WeaverResult<T> = Result<T, WeaverError>;

impl From<apollo_compiler::validation::WithErrors<apollo_compiler::Schema>> for SingleWeaverError {
    fn from(value: apollo_compiler::validation::WithErrors<apollo_compiler::Schema>) -> Self {
        SingleWeaverError::internal(value.to_string())
    }
}
