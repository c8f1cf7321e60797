//! # Error Types
//!
//! The main error type shared by the rotation engine, the access reconciler
//! and the store adapters.

use super::batch::BatchError;

/// Main error type for keyward
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Missing or invalid configuration
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Template tokens that could not be resolved at the point they are needed
    #[error("Configuration error: unresolved tokens in '{context}': {}", tokens.join(", "))]
    UnresolvedTokens { context: String, tokens: Vec<String> },

    /// Invalid command usage, detected before any backend call
    #[error("Usage error: {0}")]
    Usage(String),

    /// Declarative validation failures
    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    /// A store was asked for an operation outside its capabilities
    #[error("Store '{store}' does not support {operation}")]
    Unsupported { store: String, operation: &'static str },

    /// Failure reported by an external backend
    #[error("Backend error during {operation}: {message}")]
    Backend { operation: String, message: String },

    /// Resource missing at the backend
    #[error("Resource not found: {resource_type} '{id}'")]
    NotFound { resource_type: String, id: String },

    /// A step of one plan or identity failed
    #[error("{step} failed for '{target}': {source}")]
    StepFailed {
        step: &'static str,
        target: String,
        #[source]
        source: Box<Error>,
    },

    /// One or more items of a batch failed
    #[error(transparent)]
    Batch(#[from] BatchError),

    /// The run was cancelled before this item completed
    #[error("Operation cancelled")]
    Cancelled,

    /// I/O errors with additional context
    #[error("I/O error: {context}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {context}")]
    Serialization {
        #[source]
        source: serde_json::Error,
        context: String,
    },
}

impl Error {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Create an unresolved token error
    pub fn unresolved_tokens<C, I, T>(context: C, tokens: I) -> Self
    where
        C: Into<String>,
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self::UnresolvedTokens {
            context: context.into(),
            tokens: tokens.into_iter().map(Into::into).collect(),
        }
    }

    /// Create a usage error
    pub fn usage<S: Into<String>>(message: S) -> Self {
        Self::Usage(message.into())
    }

    /// Create an unsupported operation error
    pub fn unsupported<S: Into<String>>(store: S, operation: &'static str) -> Self {
        Self::Unsupported { store: store.into(), operation }
    }

    /// Create a backend error
    pub fn backend<O: Into<String>, M: Into<String>>(operation: O, message: M) -> Self {
        Self::Backend { operation: operation.into(), message: message.into() }
    }

    /// Create a not found error
    pub fn not_found<R: Into<String>, I: Into<String>>(resource_type: R, id: I) -> Self {
        Self::NotFound { resource_type: resource_type.into(), id: id.into() }
    }

    /// Wrap an error with the step and target it happened in
    pub fn step<T: Into<String>>(step: &'static str, target: T, source: Error) -> Self {
        Self::StepFailed { step, target: target.into(), source: Box::new(source) }
    }

    /// Create an I/O error with context
    pub fn io<S: Into<String>>(source: std::io::Error, context: S) -> Self {
        Self::Io { source, context: context.into() }
    }

    /// Create a serialization error with context
    pub fn serialization<S: Into<String>>(source: serde_json::Error, context: S) -> Self {
        Self::Serialization { source, context: context.into() }
    }

    /// True for configuration-class errors, looking through step wrappers
    pub fn is_configuration(&self) -> bool {
        match self {
            Self::Configuration { .. }
            | Self::UnresolvedTokens { .. }
            | Self::Usage(_)
            | Self::Validation(_) => true,
            Self::StepFailed { source, .. } => source.is_configuration(),
            _ => false,
        }
    }

    /// True when the backend reported the resource as absent
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::StepFailed { source, .. } => source.is_not_found(),
            _ => false,
        }
    }
}
