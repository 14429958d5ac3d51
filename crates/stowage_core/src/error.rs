//! Error types for stowage core.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur while mapping, querying or persisting aggregates.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The schema of a domain type cannot be turned into a definition.
    #[error("invalid definition for {model}: {message}")]
    Definition {
        /// The aggregate or component being described.
        model: String,
        /// Description of the problem.
        message: String,
    },

    /// The aggregate declares no identity field.
    #[error("{model} has no identity field")]
    MissingIdentity {
        /// The aggregate being described.
        model: String,
    },

    /// A value does not fit the type it is mapped through.
    #[error("type mismatch: expected {expected}, got {value}")]
    TypeMismatch {
        /// The expected kind of value.
        expected: String,
        /// The offending value.
        value: String,
    },

    /// A mutating call was made while no transaction is running.
    #[error("illegal mutation: {operation} on {model} requires a transaction")]
    IllegalMutation {
        /// The operation that was attempted.
        operation: &'static str,
        /// The aggregate the repository manages.
        model: String,
    },

    /// A specification node cannot be translated.
    #[error("unsupported specification: {node} ({reason})")]
    UnsupportedSpecification {
        /// The offending node kind.
        node: String,
        /// Why it cannot be translated.
        reason: String,
    },

    /// A specification or sort refers to a property the aggregate doesn't map.
    #[error("unknown property {property} on {model}")]
    UnknownProperty {
        /// The aggregate searched.
        model: String,
        /// The property name, prefixed with its scope when nested.
        property: String,
    },

    /// A sub-query was built by a repository of another manager.
    #[error("sub-query on {model} belongs to another manager")]
    ForeignContext {
        /// The aggregate the sub-query selects.
        model: String,
    },

    /// `transactional` was called while a transaction is already running.
    #[error("nested transactions are not supported")]
    NestedTransaction,

    /// Two snapshots of different aggregates were diffed.
    #[error("identity mismatch: cannot diff {then} against {now}")]
    IdentityMismatch {
        /// Identity of the previous snapshot.
        then: String,
        /// Identity of the current snapshot.
        now: String,
    },

    /// The backend failed.
    #[error("{adapter} adapter error: {source}")]
    Adapter {
        /// Name of the adapter.
        adapter: &'static str,
        /// The underlying error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl CoreError {
    /// Creates a definition error.
    pub fn definition(model: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Definition {
            model: model.into(),
            message: message.into(),
        }
    }

    /// Creates a type mismatch error.
    pub fn type_mismatch(expected: impl Into<String>, value: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            value: value.into(),
        }
    }

    /// Creates an illegal mutation error.
    pub fn illegal_mutation(operation: &'static str, model: impl Into<String>) -> Self {
        Self::IllegalMutation {
            operation,
            model: model.into(),
        }
    }

    /// Creates an unsupported specification error.
    pub fn unsupported(node: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnsupportedSpecification {
            node: node.into(),
            reason: reason.into(),
        }
    }

    /// Creates an unknown property error.
    pub fn unknown_property(model: impl Into<String>, property: impl Into<String>) -> Self {
        Self::UnknownProperty {
            model: model.into(),
            property: property.into(),
        }
    }

    /// Wraps a backend error.
    pub fn adapter(
        adapter: &'static str,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Adapter {
            adapter,
            source: source.into(),
        }
    }
}
