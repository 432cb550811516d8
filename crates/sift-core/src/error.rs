//! Error types for Sift

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("Config error: {0}")]
    Config(String),

    /// Timeout, connection failure, HTTP 429/5xx
    #[error("Provider error (transient): {0}")]
    ProviderTransient(String),

    /// Authentication failure, malformed request, subprocess failure
    #[error("Provider error: {0}")]
    ProviderPermanent(String),

    #[error("Provider call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("no rankings found in provider response")]
    NoRankings,

    /// Context cancellation or deadline; never retried
    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("{0} is closed")]
    Closed(&'static str),

    #[error("Patch error: {0}")]
    Patch(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Marks an error as eligible for another attempt under `retry`
    #[error("{0}")]
    Retryable(Box<Error>),

    #[error("classification failed: {0}")]
    ClassificationFailed(#[source] Box<Error>),

    #[error("classification failed for transaction {transaction_id}: {source}")]
    Batch {
        transaction_id: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Worker task failed: {0}")]
    Task(String),
}

impl Error {
    /// Wrap an error so the retry loop will attempt the operation again
    pub fn retryable(err: Error) -> Self {
        match err {
            Error::Retryable(_) => err,
            other => Error::Retryable(Box::new(other)),
        }
    }

    /// Whether the error was wrapped with [`Error::retryable`]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Retryable(_))
    }

    /// Strip any retry marker, returning the underlying error
    pub fn into_inner(self) -> Error {
        match self {
            Error::Retryable(inner) => inner.into_inner(),
            other => other,
        }
    }

    /// Whether this is a cancellation or deadline error
    pub fn is_cancelled(&self) -> bool {
        match self {
            Error::Cancelled(_) => true,
            Error::Retryable(inner) => inner.is_cancelled(),
            Error::Batch { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// Best-effort classification of provider failures as transient.
    ///
    /// Only used for logging: the classifier currently retries every
    /// provider failure regardless of this answer.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::ProviderTransient(_) | Error::Timeout(_) => true,
            Error::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().is_some_and(|s| is_transient_status(s.as_u16()))
            }
            Error::Retryable(inner) => inner.is_transient(),
            _ => false,
        }
    }
}

/// HTTP statuses that indicate an overloaded or briefly unavailable provider
pub fn is_transient_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
