//! Local error types.
//!
//! # Design
//! Backend and transport failures never surface as `Err`: they are folded
//! into a `ResponseEnvelope`. The types here cover what the client itself
//! can get wrong, namely configuration, request serialization and field
//! mutation. `RequestExecutor::execute` turns any `ClientError` raised
//! while building a request into a local error on the envelope.

use thiserror::Error;

/// Errors raised by the client before or around an HTTP exchange.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A configuration file could not be read.
    #[error("failed to read {path}: {source}")]
    ConfigRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A configuration file or override could not be parsed.
    #[error("invalid configuration: {0}")]
    ConfigParse(String),

    #[error(transparent)]
    Field(#[from] FieldError),
}

/// Errors raised by `fields::set_value`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FieldError {
    /// The field's type tag has no known mutation shape.
    #[error("field '{label}' has unsupported type '{type_tag}'")]
    UnsupportedType { label: String, type_tag: String },

    /// The new value does not fit the field's value slot.
    #[error("field '{label}' of type '{type_tag}' expects {expected}")]
    ValueMismatch {
        label: String,
        type_tag: String,
        expected: &'static str,
    },
}
