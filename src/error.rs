use std::error::Error;
use std::time::Duration;

use thiserror::Error;

use crate::metadata::MetadataError;

/// Opaque failure reported by a [`Persister`](crate::store::Persister).
///
/// The core never inspects or retries these; they surface unchanged from the Store.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct PersisterError {
    message: String,
    #[source]
    source: Option<Box<dyn Error + Send + Sync>>,
}

impl PersisterError {
    pub fn new(message: impl Into<String>) -> Self {
        PersisterError {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(message: impl Into<String>, source: impl Error + Send + Sync + 'static) -> Self {
        PersisterError {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<serde_json::Error> for PersisterError {
    fn from(err: serde_json::Error) -> Self {
        PersisterError::with_source("record encoding failed", err)
    }
}

/// Errors raised by the Store and by models attached to it.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found: {type_key}:{id}")]
    RecordNotFound { type_key: String, id: String },

    #[error("type `{candidate}` cannot be related through `{field}` (expected {expected})")]
    InvalidRelationshipType {
        field: String,
        expected: String,
        candidate: String,
    },

    #[error("invalid state transition for {model}: {reason}")]
    InvalidStateTransition { model: String, reason: String },

    #[error("type `{0}` is abstract and cannot be instantiated")]
    AbstractType(String),

    #[error("type `{type_key}` has no field `{key}`")]
    UnknownField { type_key: String, key: String },

    #[error("field `{key}` on `{type_key}` is {actual}, not {expected}")]
    FieldKind {
        type_key: String,
        key: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("invalid value for `{key}` on `{type_key}`: {reason}")]
    InvalidValue {
        type_key: String,
        key: String,
        reason: String,
    },

    #[error("persister call `{operation}` took {elapsed:?}, exceeding the configured timeout")]
    Timeout {
        operation: &'static str,
        elapsed: Duration,
    },

    #[error("model {0} is no longer attached to a store")]
    Detached(String),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Persister(#[from] PersisterError),
}

impl StoreError {
    pub(crate) fn transition(model: impl ToString, reason: impl Into<String>) -> Self {
        StoreError::InvalidStateTransition {
            model: model.to_string(),
            reason: reason.into(),
        }
    }

    /// Map this error to an HTTP-style status code.
    pub fn status_code(&self) -> u16 {
        match self {
            StoreError::RecordNotFound { .. } => 404,
            StoreError::InvalidRelationshipType { .. } => 422,
            StoreError::InvalidStateTransition { .. } => 409,
            StoreError::AbstractType(_) => 400,
            StoreError::UnknownField { .. } => 400,
            StoreError::FieldKind { .. } => 400,
            StoreError::InvalidValue { .. } => 422,
            StoreError::Timeout { .. } => 504,
            StoreError::Detached(_) => 500,
            StoreError::Metadata(MetadataError::SchemaNotFound(_)) => 404,
            StoreError::Metadata(_) => 500,
            StoreError::Persister(_) => 500,
        }
    }
}
