//! Fetch engine error types

use thiserror::Error;

/// Errors surfaced by the fetch engine
///
/// Retryable conditions (timeouts, duplicate/congestion Nacks) are handled
/// internally by [`crate::data_fetcher::DataFetcher`] and the adaptive
/// pipelines; only conditions that escape to the session surface here.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// A name component could not be parsed as a segment or version number
    #[error("invalid name component: {0}")]
    InvalidComponent(String),

    /// Retry ceiling (timeout or Nack) was exhausted for a request
    #[error("retries exhausted for {name}: {reason}")]
    RetriesExhausted {
        /// Name of the Interest that could not be satisfied
        name: String,
        /// Human-readable cause of the final failure
        reason: String,
    },

    /// A Nack was received with a reason that is never retried
    /// (`NoRoute` or an unrecognized reason)
    #[error("non-retryable nack for {name}: {reason}")]
    NonRetryableNack {
        /// Name of the rejected Interest
        name: String,
        /// Nack reason, formatted for display
        reason: String,
    },

    /// Version discovery could not resolve a prefix to a versioned name
    #[error("version discovery failed: {0}")]
    DiscoveryFailed(String),

    /// A discovery reply's metadata payload did not contain a valid
    /// versioned name
    #[error("invalid versioned name in discovery metadata")]
    InvalidVersionedName,

    /// A previously unknown `FinalBlockId` retroactively proved that an
    /// earlier deferred failure was fatal
    #[error("segment {segment} failed and is within the content ({last_segment} segments total)")]
    SegmentFailed {
        /// The segment number that failed
        segment: u64,
        /// The last segment number of the content, once learnt
        last_segment: u64,
    },

    /// The external validator rejected a Data packet
    #[error("data validation failed: {0}")]
    ValidationFailed(String),

    /// A Data packet carried an application-level Nack content type
    #[error("application nack received for segment {segment}")]
    ApplicationNack {
        /// The segment number carrying the application Nack
        segment: u64,
    },

    /// The overall session deadline elapsed before completion
    #[error("session timed out")]
    Timeout,

    /// The session was cancelled by the caller
    #[error("session cancelled")]
    Cancelled,

    /// Catch-all for conditions that do not fit another variant
    #[error("{0}")]
    Other(String),
}

/// Result type alias using [`FetchError`]
pub type Result<T> = std::result::Result<T, FetchError>;
