//! Remoting error type.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::SessionState;

/// Categorised remoting error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum RemotingErrorKind {
    /// The session was not in `Opened` state when the operation started.
    SessionNotOpen,
    /// The local source file or folder does not exist.
    SourceNotFound,
    /// A session could not be established to the host.
    Connect,
    /// The HTTP / WS-Management round trip itself failed.
    Transport,
    /// The remote command ran but reported a failure.
    RemoteCommand,
    /// Reading the local source failed after the transfer started.
    LocalIo,
    /// Configuration is incomplete or contradictory.
    InvalidConfig,
    /// A remote response could not be interpreted.
    Parse,
}

impl fmt::Display for RemotingErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionNotOpen => write!(f, "Session not open"),
            Self::SourceNotFound => write!(f, "Source not found"),
            Self::Connect => write!(f, "Connect failed"),
            Self::Transport => write!(f, "Transport error"),
            Self::RemoteCommand => write!(f, "Remote command failed"),
            Self::LocalIo => write!(f, "Local I/O error"),
            Self::InvalidConfig => write!(f, "Invalid configuration"),
            Self::Parse => write!(f, "Parse error"),
        }
    }
}

/// Error returned by session, transport and transfer operations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RemotingError {
    pub kind: RemotingErrorKind,
    pub message: String,
    /// Host key or address the error relates to, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

pub type RemotingResult<T> = Result<T, RemotingError>;

impl RemotingError {
    pub fn new(kind: RemotingErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            host: None,
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    // ── Convenience constructors ─────────────────────────────────

    pub fn session_not_open(host: &str, state: SessionState) -> Self {
        Self::new(
            RemotingErrorKind::SessionNotOpen,
            format!("Session to '{}' is {:?}, expected Opened", host, state),
        )
        .with_host(host)
    }

    pub fn source_not_found(path: &std::path::Path) -> Self {
        Self::new(
            RemotingErrorKind::SourceNotFound,
            format!("Local source '{}' does not exist", path.display()),
        )
    }

    pub fn connect(host: &str, msg: impl Into<String>) -> Self {
        Self::new(RemotingErrorKind::Connect, msg).with_host(host)
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::new(RemotingErrorKind::Transport, msg)
    }

    pub fn remote_command(msg: impl Into<String>) -> Self {
        Self::new(RemotingErrorKind::RemoteCommand, msg)
    }

    pub fn local_io(path: &std::path::Path, err: impl fmt::Display) -> Self {
        Self::new(
            RemotingErrorKind::LocalIo,
            format!("'{}': {}", path.display(), err),
        )
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::new(RemotingErrorKind::InvalidConfig, msg)
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::new(RemotingErrorKind::Parse, msg)
    }

    /// Failure detected before any side effect was attempted.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self.kind,
            RemotingErrorKind::SessionNotOpen | RemotingErrorKind::SourceNotFound
        )
    }

    /// Failure of a remote round trip; the destination may be partially written.
    pub fn is_remote_failure(&self) -> bool {
        matches!(
            self.kind,
            RemotingErrorKind::Transport | RemotingErrorKind::RemoteCommand
        )
    }
}

impl fmt::Display for RemotingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)?;
        if let Some(ref host) = self.host {
            write!(f, " (host: {})", host)?;
        }
        Ok(())
    }
}

impl std::error::Error for RemotingError {}

impl From<RemotingError> for String {
    fn from(e: RemotingError) -> String {
        e.to_string()
    }
}
