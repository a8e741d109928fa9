use thiserror::Error;

/// Errors raised by the HTTP source adapter.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("Invalid source URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Connection failures, non-success statuses and body read errors.
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
}
