//! Error types for the channel bridge.

use flowrun_core::ValueType;
use thiserror::Error;

/// Errors decoding a raw value into its declared type.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Fixed-width value with the wrong number of bytes.
    #[error("Expected {expected} bytes for {value_type} value, got {actual}")]
    WrongLength {
        value_type: ValueType,
        expected: usize,
        actual: usize,
    },

    /// Text value that is not valid UTF-8.
    #[error("Invalid UTF-8 text: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// Value whose type differs from the channel's declared type.
    #[error("Expected a {expected} value, got {actual}")]
    TypeMismatch {
        expected: ValueType,
        actual: ValueType,
    },

    /// Bool value that is neither 0 nor 1.
    #[error("Invalid bool byte: {0}")]
    InvalidBool(u8),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors resolving or serving a named channel.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The requested end of a named channel was already handed out.
    #[error("The {end} end of channel '{name}' is already claimed")]
    AlreadyClaimed { name: String, end: &'static str },

    /// Could not reach the endpoint for a channel.
    #[error("Failed to resolve channel '{name}' at '{location}': {source}")]
    Resolve {
        name: String,
        location: String,
        #[source]
        source: std::io::Error,
    },

    /// Socket I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Protocol error during communication.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
