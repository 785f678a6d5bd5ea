//! Common error types for querysync.

use thiserror::Error;

/// Top-level error type for query-string synchronization.
#[derive(Debug, Error)]
pub enum Error {
    /// A raw query value does not fit the binding's declared type.
    #[error("Cannot decode query key '{key}' as {expected}: {raw:?}")]
    Decode {
        key: String,
        expected: String,
        raw: String,
    },

    /// A property path could not be parsed.
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// A binding declaration is malformed.
    #[error("Invalid declaration: {0}")]
    InvalidDeclaration(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Update hooks kept queueing follow-up mutations.
    #[error("Mutation cascade exceeded {0} follow-up batches")]
    Cascade(usize),

    /// A binding path or query key is already registered in the scope.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// A shared lock was poisoned by a panicking writer.
    #[error("Lock poisoned: {0}")]
    Poisoned(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build a decode error for `key`.
    pub fn decode(key: impl Into<String>, expected: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::Decode {
            key: key.into(),
            expected: expected.into(),
            raw: raw.into(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
