//! Error types for the core library.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in core operations.
///
/// Every variant is a persistence problem with the subscription store.
/// Policy violations and empty receiver sets are not errors; they are
/// reported through [`crate::Rejection`].
#[derive(Debug, Error)]
pub enum Error {
    /// Reading or writing the store file failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// Store file that was being accessed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The store file is not valid JSON of the expected shape.
    #[error("Malformed subscriber list {}: {source}", path.display())]
    Serde {
        /// Store file that failed to parse.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// The store file parsed but contains a key that no tag set derives to.
    #[error("Invalid audience key {key:?} in {}", path.display())]
    InvalidKey {
        /// Store file containing the key.
        path: PathBuf,
        /// Offending key.
        key: String,
    },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn serde(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Serde {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported by a [`MailFetch`](crate::MailFetch) implementation.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The mailbox could not be read or updated.
    #[error("Mailbox I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The mailbox rejected the request or returned unusable data.
    #[error("Mailbox error: {0}")]
    Mailbox(String),
}

/// Errors reported by a [`MailSend`](crate::MailSend) implementation.
#[derive(Debug, Error)]
pub enum SendError {
    /// An address could not be parsed.
    #[error("Invalid address {address:?}: {reason}")]
    Address {
        /// Offending address.
        address: String,
        /// Parser message.
        reason: String,
    },

    /// The message could not be assembled.
    #[error("Failed to build message: {0}")]
    Build(String),

    /// The transport failed to deliver the message.
    #[error("Transport error: {0}")]
    Transport(String),
}
