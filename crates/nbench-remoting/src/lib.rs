//! # netbench – Remoting
//!
//! Remote session handling and file transfer for the benchmark hosts.
//!
//! ## Features
//!
//! - **WinRM transport** – WS-Management shells over HTTP(S), PowerShell commands, streamed stdin
//! - **Sessions** – open/close, liveness tracking, `Broken` on transport failure
//! - **Registry** – one live session per host key, readiness-gated (re)connect, polling
//! - **Chunked transfer** – sequential bounded-memory upload of files and folder trees

pub mod types;
pub mod error;
pub mod auth;
pub mod transport;
pub mod scripts;
pub mod remote_fs;
pub mod session;
pub mod registry;
pub mod copy;

pub use copy::{send_file, send_folder};
pub use error::{RemotingError, RemotingErrorKind, RemotingResult};
pub use registry::{
    AlwaysReady, Connector, EnsureOutcome, PollPolicy, ReadinessCheck, SessionRegistry,
};
pub use remote_fs::{RemoteCommand, RemoteFs, RemoteSession};
pub use session::{WinRmConnector, WinRmSession};
pub use types::*;
