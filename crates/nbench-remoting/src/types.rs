use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ─── Transport Protocol ──────────────────────────────────────────────────────

/// Transport used for the WinRM listener.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportProtocol {
    /// WinRM over HTTP (port 5985)
    Http,
    /// WinRM over HTTPS (port 5986)
    #[default]
    Https,
}

impl TransportProtocol {
    pub fn default_port(&self) -> u16 {
        match self {
            Self::Http => 5985,
            Self::Https => 5986,
        }
    }

    pub fn scheme(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }
}

// ─── Authentication ──────────────────────────────────────────────────────────

/// Credential presented to the WinRM listener (HTTP Basic).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    /// Domain for domain-joined hosts; local accounts leave this empty.
    #[serde(default)]
    pub domain: Option<String>,
}

// ─── Connection Configuration ────────────────────────────────────────────────

/// Connection settings shared by every host of a run.
///
/// Certificate trust is carried here explicitly instead of living in
/// process-wide state, so the provisioning step hands it to the connector.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemotingConfig {
    /// Connection port (defaults based on transport)
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub transport: TransportProtocol,
    pub credential: Credential,
    /// Accept self-signed listener certificates.
    #[serde(default)]
    pub skip_ca_check: bool,
    /// PEM file with the listener's certificate (or its issuing CA).
    #[serde(default)]
    pub trusted_certificate: Option<PathBuf>,
    /// WinRM URI path (default: /wsman)
    #[serde(default = "default_wsman_path")]
    pub uri_path: String,
    #[serde(default)]
    pub session_option: SessionOption,
}

fn default_wsman_path() -> String {
    "/wsman".to_string()
}

impl RemotingConfig {
    pub fn new(credential: Credential) -> Self {
        Self {
            port: None,
            transport: TransportProtocol::default(),
            credential,
            skip_ca_check: false,
            trusted_certificate: None,
            uri_path: default_wsman_path(),
            session_option: SessionOption::default(),
        }
    }

    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.transport.default_port())
    }

    /// Full WS-Management endpoint for `host`.
    pub fn endpoint_uri(&self, host: &str) -> String {
        format!(
            "{}://{}:{}/{}",
            self.transport.scheme(),
            host,
            self.effective_port(),
            self.uri_path.trim_start_matches('/')
        )
    }
}

// ─── Session Options ─────────────────────────────────────────────────────────

/// Timeouts and shell options for a WinRM session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOption {
    /// Operation timeout in seconds (default: 180)
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_sec: u32,
    /// Connect timeout in seconds (default: 30)
    #[serde(default = "default_open_timeout")]
    pub open_timeout_sec: u32,
    /// Shell idle timeout in seconds (default: 7200)
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_sec: u32,
    /// Skip loading the user profile on the remote end
    #[serde(default)]
    pub skip_machine_profile: bool,
    #[serde(default = "default_culture")]
    pub culture: String,
    /// Upper bound on stdin bytes carried by a single Send envelope
    #[serde(default = "default_max_input_slice")]
    pub max_input_slice: usize,
}

fn default_operation_timeout() -> u32 {
    180
}
fn default_open_timeout() -> u32 {
    30
}
fn default_idle_timeout() -> u32 {
    7200
}
fn default_culture() -> String {
    "en-US".to_string()
}
fn default_max_input_slice() -> usize {
    // base64 on the wire inflates by 4/3; keeps envelopes under the 500 KB default
    192 * 1024
}

impl Default for SessionOption {
    fn default() -> Self {
        Self {
            operation_timeout_sec: default_operation_timeout(),
            open_timeout_sec: default_open_timeout(),
            idle_timeout_sec: default_idle_timeout(),
            skip_machine_profile: false,
            culture: default_culture(),
            max_input_slice: default_max_input_slice(),
        }
    }
}

// ─── Session State ───────────────────────────────────────────────────────────

/// Liveness of a remote session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    /// Open and ready for commands
    Opened,
    /// Closed by the caller
    Closed,
    /// A transport failure left the channel unusable
    Broken,
}

/// Collected output of one remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn succeeded(&self) -> bool {
        self.exit_code.map_or(true, |c| c == 0)
    }
}

// ─── File Transfer ───────────────────────────────────────────────────────────

/// Default transfer chunk: 1 MiB.
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// One local-to-remote copy request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileCopyParams {
    pub local_path: PathBuf,
    /// Remote destination; relative paths resolve against the remote working directory.
    pub remote_path: String,
    /// Leave an existing destination untouched and report it as skipped.
    #[serde(default)]
    pub skip_if_exists: bool,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

impl FileCopyParams {
    pub fn new(local_path: impl Into<PathBuf>, remote_path: impl Into<String>) -> Self {
        Self {
            local_path: local_path.into(),
            remote_path: remote_path.into(),
            skip_if_exists: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn skip_if_exists(mut self, skip: bool) -> Self {
        self.skip_if_exists = skip;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }
}

/// Result of the remote pre-check round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestinationStatus {
    /// Nothing was there; parent directories now exist.
    Absent,
    /// An existing file was deleted ahead of the upload.
    Replaced,
    /// The file exists and was left alone.
    Existing,
}

/// Outcome of a single file transfer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum TransferOutcome {
    Skipped,
    Completed { bytes: u64, chunks: u64 },
}

/// Totals for a folder transfer.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FolderTransferSummary {
    pub files_sent: u32,
    pub files_skipped: u32,
    pub bytes_sent: u64,
}

impl FolderTransferSummary {
    pub fn record(&mut self, outcome: TransferOutcome) {
        match outcome {
            TransferOutcome::Skipped => self.files_skipped += 1,
            TransferOutcome::Completed { bytes, .. } => {
                self.files_sent += 1;
                self.bytes_sent += bytes;
            }
        }
    }
}

// ─── SOAP / WinRM Protocol Types ─────────────────────────────────────────────

/// WinRM SOAP action types.
#[derive(Debug, Clone, PartialEq)]
pub enum WsManAction {
    Create,
    Delete,
    Command,
    Receive,
    Send,
    Signal,
}

impl WsManAction {
    pub fn uri(&self) -> &str {
        match self {
            Self::Create => "http://schemas.xmlsoap.org/ws/2004/09/transfer/Create",
            Self::Delete => "http://schemas.xmlsoap.org/ws/2004/09/transfer/Delete",
            Self::Command => "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/Command",
            Self::Receive => "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/Receive",
            Self::Send => "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/Send",
            Self::Signal => "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/Signal",
        }
    }
}

/// WinRM signal codes.
pub struct WsManSignal;

impl WsManSignal {
    pub const TERMINATE: &'static str =
        "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/signal/terminate";
}

/// WinRM resource URIs.
pub struct WsManResourceUri;

impl WsManResourceUri {
    pub const SHELL: &'static str =
        "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/cmd";
}

/// WinRM SOAP namespaces.
pub struct WsManNamespace;

impl WsManNamespace {
    pub const SOAP: &'static str = "http://www.w3.org/2003/05/soap-envelope";
    pub const ADDRESSING: &'static str = "http://schemas.xmlsoap.org/ws/2004/08/addressing";
    pub const WSMAN: &'static str = "http://schemas.dmtf.org/wbem/wsman/1/wsman.xsd";
    pub const WSMAND: &'static str = "http://schemas.microsoft.com/wbem/wsman/1/wsman.xsd";
    pub const SHELL: &'static str = "http://schemas.microsoft.com/wbem/wsman/1/windows/shell";
}
