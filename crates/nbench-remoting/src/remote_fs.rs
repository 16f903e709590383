//! Capabilities a remote session exposes to the transfer and driver code.

use async_trait::async_trait;
use std::path::{Component, Path};

use crate::error::RemotingResult;
use crate::types::{DestinationStatus, SessionState};

/// A channel to one remote host with an observable liveness state.
#[async_trait]
pub trait RemoteSession: Send {
    /// Host key or address this session is bound to.
    fn host(&self) -> &str;

    fn state(&self) -> SessionState;

    fn is_open(&self) -> bool {
        self.state() == SessionState::Opened
    }

    /// Release the remote side of the channel; the session ends up `Closed`.
    async fn close(&mut self) -> RemotingResult<()>;
}

/// Remote filesystem primitives used by the chunked transfer.
///
/// Relative paths resolve against the remote session's working directory.
#[async_trait]
pub trait RemoteFs: RemoteSession {
    async fn check_exists(&mut self, path: &str) -> RemotingResult<bool>;

    /// Create `dir` and any missing ancestors.
    async fn make_dirs(&mut self, dir: &str) -> RemotingResult<()>;

    async fn delete_file(&mut self, path: &str) -> RemotingResult<()>;

    /// Append exactly `data` to `path`, creating it if needed.
    async fn append_bytes(&mut self, path: &str, data: &[u8]) -> RemotingResult<()>;

    async fn file_size(&mut self, path: &str) -> RemotingResult<u64>;

    /// Make `path` ready to receive a fresh upload.
    ///
    /// An existing file is left alone when `skip_if_exists` is set and deleted
    /// otherwise; a missing parent directory is created.
    async fn prepare_destination(
        &mut self,
        path: &str,
        skip_if_exists: bool,
    ) -> RemotingResult<DestinationStatus> {
        if self.check_exists(path).await? {
            if skip_if_exists {
                return Ok(DestinationStatus::Existing);
            }
            self.delete_file(path).await?;
            return Ok(DestinationStatus::Replaced);
        }
        if let Some(parent) = remote_parent(path) {
            self.make_dirs(parent).await?;
        }
        Ok(DestinationStatus::Absent)
    }
}

/// Opaque remote command execution.
#[async_trait]
pub trait RemoteCommand: RemoteSession {
    /// Run `script` remotely and return its stdout.
    async fn run_script(&mut self, script: &str) -> RemotingResult<String>;
}

// ─── Remote path helpers ─────────────────────────────────────────────────────

/// Parent portion of a remote path, split on the last `/` or `\`.
pub fn remote_parent(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches(['/', '\\']);
    let idx = trimmed.rfind(['/', '\\'])?;
    if idx == 0 {
        return Some(&trimmed[..1]);
    }
    Some(&trimmed[..idx])
}

/// Join a local relative path onto a remote base directory.
///
/// Uses `\` only when `base` already uses backslashes exclusively.
pub fn join_remote(base: &str, relative: &Path) -> String {
    let sep = if base.contains('\\') && !base.contains('/') {
        '\\'
    } else {
        '/'
    };
    let mut out = base.trim_end_matches(['/', '\\']).to_string();
    if out.is_empty() && base.starts_with(['/', '\\']) {
        out.push(sep);
    }
    for comp in relative.components() {
        if let Component::Normal(part) = comp {
            if !out.is_empty() && !out.ends_with(sep) {
                out.push(sep);
            }
            out.push_str(&part.to_string_lossy());
        }
    }
    out
}
