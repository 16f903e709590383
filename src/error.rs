//! Top-level error type for a benchmark run.

use serde::{Deserialize, Serialize};
use std::fmt;

use nbench_remoting::RemotingError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum BenchErrorKind {
    /// Configuration file missing, unreadable or invalid.
    Config,
    /// Session, transport or transfer failure.
    Remoting,
    /// Logging could not be installed.
    Logging,
}

impl fmt::Display for BenchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config => write!(f, "Configuration error"),
            Self::Remoting => write!(f, "Remoting error"),
            Self::Logging => write!(f, "Logging error"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchError {
    pub kind: BenchErrorKind,
    pub message: String,
    /// Underlying remoting error, kept for callers that branch on its kind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remoting: Option<RemotingError>,
}

pub type BenchResult<T> = Result<T, BenchError>;

impl BenchError {
    pub fn new(kind: BenchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            remoting: None,
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::new(BenchErrorKind::Config, msg)
    }
}

impl fmt::Display for BenchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl std::error::Error for BenchError {}

impl From<RemotingError> for BenchError {
    fn from(e: RemotingError) -> Self {
        Self {
            kind: BenchErrorKind::Remoting,
            message: e.to_string(),
            remoting: Some(e),
        }
    }
}

impl From<BenchError> for String {
    fn from(e: BenchError) -> String {
        e.to_string()
    }
}
