// Domain probe statuses

use crate::error::GraphError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// What a certificate source observed when probing a domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DomainStatus {
    Good,
    Timeout,
    Refused,
    Revoked,
    Expired,
    NoHost,
    Unknown,
}

impl DomainStatus {
    /// Classify a query failure into the status recorded on the node.
    pub fn from_error(err: &GraphError) -> Self {
        match err {
            GraphError::Timeout { .. } => DomainStatus::Timeout,
            GraphError::ConnectionRefused { .. } => DomainStatus::Refused,
            GraphError::DnsResolutionFailed { .. } => DomainStatus::NoHost,
            GraphError::IoError { source } if source.kind() == std::io::ErrorKind::ConnectionRefused => {
                DomainStatus::Refused
            }
            GraphError::IoError { source } if source.kind() == std::io::ErrorKind::TimedOut => {
                DomainStatus::Timeout
            }
            _ => DomainStatus::Unknown,
        }
    }
}

impl fmt::Display for DomainStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DomainStatus::Good => "GOOD",
            DomainStatus::Timeout => "TIMEOUT",
            DomainStatus::Refused => "REFUSED",
            DomainStatus::Revoked => "REVOKED",
            DomainStatus::Expired => "EXPIRED",
            DomainStatus::NoHost => "NO_HOST",
            DomainStatus::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// Hostname to status, as returned by a source query.
pub type StatusMap = BTreeMap<String, DomainStatus>;
