// Error types for certgraph
//
// Structured errors using thiserror. Worker tasks absorb these at the task
// boundary; only pre-flight failures reach the binary's exit path.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Main error type for certgraph operations
#[derive(Debug, Error)]
pub enum GraphError {
    /// Connection or operation timed out
    #[error("timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// Connection was refused by the remote host
    #[error("connection refused by {host}")]
    ConnectionRefused { host: String },

    /// DNS resolution failed for the hostname
    #[error("DNS resolution failed for {hostname}: {details}")]
    DnsResolutionFailed { hostname: String, details: String },

    /// TLS handshake failed or is invalid
    #[error("TLS handshake failed: {details}")]
    HandshakeFailed { details: String },

    /// STARTTLS negotiation failed before the TLS layer came up
    #[error("STARTTLS error: {details}")]
    StarttlsError { details: String },

    /// Remote HTTP endpoint answered with an unexpected status
    #[error("HTTP error (status {status}): {details}")]
    HttpError { status: u16, details: String },

    /// Parsing error for wire or certificate data
    #[error("parse error: {message}")]
    ParseError { message: String },

    /// A certificate source was asked for a fingerprint it never reported
    #[error("certificate {fingerprint} not found")]
    CertNotFound { fingerprint: String },

    /// Invalid configuration or parameters
    #[error("invalid configuration: {message}")]
    ConfigError { message: String },

    /// Generic I/O error
    #[error("I/O error: {source}")]
    IoError {
        #[from]
        source: io::Error,
    },

    /// HTTP client errors
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    /// URL parsing errors
    #[error("invalid URL: {0}")]
    UrlParseError(#[from] url::ParseError),

    /// Serialization/deserialization errors
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// PEM encoding errors
    #[error("PEM error: {0}")]
    PemError(#[from] pem::PemError),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for GraphError {
    fn from(err: anyhow::Error) -> Self {
        GraphError::Other(err.to_string())
    }
}

impl From<tokio::task::JoinError> for GraphError {
    fn from(err: tokio::task::JoinError) -> Self {
        GraphError::IoError {
            source: io::Error::new(io::ErrorKind::Other, format!("task join error: {}", err)),
        }
    }
}
