//! Domain error types.

use thiserror::Error;

/// Value object validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueObjectError {
    #[error("client id must not be empty")]
    ClientIdEmpty,

    #[error("client id must be at most {0} bytes")]
    ClientIdTooLong(usize),

    #[error("username must not be empty")]
    UsernameEmpty,

    #[error("username must be at most {0} characters")]
    UsernameTooLong(usize),
}

/// Errors raised by the chat store
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    #[error("session '{0}' not found")]
    SessionNotFound(i64),

    #[error("storage failure: {0}")]
    Storage(String),
}

/// Errors raised while loading or saving the session configuration
#[derive(Debug, Error)]
pub enum ConfigStoreError {
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised by the catalog file repository
#[derive(Debug, Error)]
pub enum FileRepositoryError {
    #[error("path '{0}' is outside the catalog root")]
    InvalidPath(String),

    #[error("file '{path}' could not be read: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("file '{path}' is not valid JSON: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors raised by an inference provider
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("no inference API is configured")]
    NoApi,

    #[error("engine mode '{0}' is not supported")]
    Unsupported(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("provider returned an unexpected payload: {0}")]
    InvalidResponse(String),
}

/// Errors raised while pushing frames to connected clients
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessagePushError {
    #[error("client '{0}' not found")]
    ClientNotFound(String),

    #[error("push failed: {0}")]
    PushFailed(String),
}
