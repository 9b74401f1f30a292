//! Error types for mediathek-dl
//!
//! The taxonomy follows how errors are handled rather than where they occur:
//! - Configuration errors (bad filter syntax, invalid settings) are fatal to
//!   the invocation and never retried.
//! - Network errors are transient: catalog fetches retry across the mirror
//!   list, per-show fetches abort only that show.
//! - Data errors (malformed rows, empty variant lists) are dropped at the
//!   smallest granularity.

use thiserror::Error;

/// Result type alias for mediathek-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for mediathek-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error, including invalid filter expressions.
    ///
    /// Carries the offending token (filter text or config key) so the user
    /// sees exactly which input was rejected.
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable description of what is invalid
        message: String,
        /// The filter expression or config key that caused the error
        token: Option<String>,
    },

    /// SQLite store error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// HTTP transfer error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The catalog payload could not be decoded
    #[error("invalid catalog: {0}")]
    InvalidCatalog(String),

    /// Every catalog mirror failed
    #[error("catalog download failed after {attempts} attempts, giving up")]
    MirrorsExhausted {
        /// Number of mirror attempts made
        attempts: usize,
    },

    /// The retrieved media file has an extension we cannot handle
    #[error("unsupported media format {extension:?}")]
    UnsupportedFormat {
        /// The file extension that was not recognized
        extension: String,
    },

    /// An adaptive manifest yielded no usable bitrate variants
    #[error("no eligible stream variants in manifest")]
    NoStreamVariants,

    /// Subtitle document could not be converted
    #[error("invalid subtitle document: {0}")]
    InvalidSubtitles(String),

    /// URL parse or join failure
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Build a configuration error for a rejected filter expression or key.
    pub fn config(message: impl Into<String>, token: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            token: Some(token.into()),
        }
    }

    /// True if the error is a transient transfer failure worth retrying
    /// against another mirror. Everything else is permanent for the current
    /// attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Network(_) => true,
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }
}
