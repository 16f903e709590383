//! WinRM session lifecycle.
//!
//! A [`WinRmSession`] owns one remote shell on one host. Any transport-level
//! failure flips it to `Broken`; the registry then replaces it on the next
//! `ensure_sessions` call rather than trying to repair it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{RemotingError, RemotingErrorKind, RemotingResult};
use crate::registry::Connector;
use crate::remote_fs::{RemoteCommand, RemoteFs, RemoteSession};
use crate::scripts;
use crate::transport::WinRmTransport;
use crate::types::*;

// ─── Session ─────────────────────────────────────────────────────────────────

/// An open WS-Management shell on a single host.
#[derive(Debug)]
pub struct WinRmSession {
    pub id: String,
    host: String,
    shell_id: String,
    state: SessionState,
    transport: WinRmTransport,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub command_count: u64,
}

impl WinRmSession {
    /// Authenticate and create a remote shell on `host`.
    pub async fn open(config: &RemotingConfig, host: &str) -> RemotingResult<Self> {
        info!(
            "Opening WinRM session to {}:{} ({})",
            host,
            config.effective_port(),
            config.transport.scheme()
        );

        let mut transport =
            WinRmTransport::new(config, host).map_err(|e| e.with_host(host))?;
        let auth = crate::auth::basic_auth_header(&config.credential)?;
        transport.set_auth_header(auth);

        let shell_id = transport
            .create_shell(&config.session_option)
            .await
            .map_err(|e| RemotingError::connect(host, e.message))?;

        let now = Utc::now();
        debug!("WinRM session to {} uses shell {}", host, shell_id);

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            host: host.to_string(),
            shell_id,
            state: SessionState::Opened,
            transport,
            created_at: now,
            last_activity: now,
            command_count: 0,
        })
    }

    /// Run a script, failing on a non-zero exit code.
    async fn invoke(&mut self, script: &str, stdin: Option<&[u8]>) -> RemotingResult<String> {
        if self.state != SessionState::Opened {
            return Err(RemotingError::session_not_open(&self.host, self.state));
        }

        self.command_count += 1;
        self.last_activity = Utc::now();

        let output = match self.transport.run_ps(&self.shell_id, script, stdin).await {
            Ok(output) => output,
            Err(e) => {
                if e.kind == RemotingErrorKind::Transport {
                    warn!("WinRM session to {} is broken: {}", self.host, e.message);
                    self.state = SessionState::Broken;
                }
                return Err(e.with_host(&self.host));
            }
        };

        if !output.succeeded() {
            let detail = if output.stderr.trim().is_empty() {
                output.stdout.trim().to_string()
            } else {
                output.stderr.trim().to_string()
            };
            return Err(RemotingError::remote_command(format!(
                "exit code {}: {}",
                output.exit_code.unwrap_or_default(),
                detail
            ))
            .with_host(&self.host));
        }

        if !output.stderr.trim().is_empty() {
            debug!("stderr from {}: {}", self.host, output.stderr.trim());
        }

        Ok(output.stdout)
    }
}

#[async_trait]
impl RemoteSession for WinRmSession {
    fn host(&self) -> &str {
        &self.host
    }

    fn state(&self) -> SessionState {
        self.state
    }

    async fn close(&mut self) -> RemotingResult<()> {
        if self.state == SessionState::Closed {
            return Ok(());
        }
        // Broken sessions still try to release the remote shell
        self.state = SessionState::Closed;
        self.transport
            .delete_shell(&self.shell_id)
            .await
            .map_err(|e| e.with_host(&self.host))?;
        info!("Closed WinRM session to {}", self.host);
        Ok(())
    }
}

#[async_trait]
impl RemoteFs for WinRmSession {
    async fn check_exists(&mut self, path: &str) -> RemotingResult<bool> {
        let out = self.invoke(&scripts::exists(path), None).await?;
        scripts::parse_bool(&out)
    }

    async fn make_dirs(&mut self, dir: &str) -> RemotingResult<()> {
        self.invoke(&scripts::make_dirs(dir), None).await?;
        Ok(())
    }

    async fn delete_file(&mut self, path: &str) -> RemotingResult<()> {
        self.invoke(&scripts::delete_file(path), None).await?;
        Ok(())
    }

    async fn append_bytes(&mut self, path: &str, data: &[u8]) -> RemotingResult<()> {
        // Payload travels as base64 text on stdin
        let text = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, data);
        let out = self
            .invoke(&scripts::append_from_stdin(path), Some(text.as_bytes()))
            .await?;
        let written = scripts::parse_u64(&out)?;
        if written != data.len() as u64 {
            return Err(RemotingError::remote_command(format!(
                "appended {} of {} bytes to '{}'",
                written,
                data.len(),
                path
            ))
            .with_host(&self.host));
        }
        Ok(())
    }

    async fn file_size(&mut self, path: &str) -> RemotingResult<u64> {
        let out = self.invoke(&scripts::file_size(path), None).await?;
        scripts::parse_u64(&out)
    }

    async fn prepare_destination(
        &mut self,
        path: &str,
        skip_if_exists: bool,
    ) -> RemotingResult<DestinationStatus> {
        let out = self
            .invoke(&scripts::prepare_destination(path, skip_if_exists), None)
            .await?;
        scripts::parse_destination_status(&out)
    }
}

#[async_trait]
impl RemoteCommand for WinRmSession {
    async fn run_script(&mut self, script: &str) -> RemotingResult<String> {
        self.invoke(script, None).await
    }
}

// ─── Connector ───────────────────────────────────────────────────────────────

/// Opens [`WinRmSession`]s for host keys using one shared configuration.
#[derive(Debug, Clone)]
pub struct WinRmConnector {
    config: RemotingConfig,
    /// Host key -> address; keys missing here are used as the address.
    addresses: HashMap<String, String>,
}

impl WinRmConnector {
    pub fn new(config: RemotingConfig) -> Self {
        Self {
            config,
            addresses: HashMap::new(),
        }
    }

    pub fn with_address(mut self, key: impl Into<String>, address: impl Into<String>) -> Self {
        self.addresses.insert(key.into(), address.into());
        self
    }

    pub fn address_of<'a>(&'a self, key: &'a str) -> &'a str {
        self.addresses.get(key).map(String::as_str).unwrap_or(key)
    }
}

#[async_trait]
impl Connector<String> for WinRmConnector {
    type Session = WinRmSession;

    async fn connect(&self, key: &String) -> RemotingResult<WinRmSession> {
        let address = self.address_of(key);
        WinRmSession::open(&self.config, address)
            .await
            .map_err(|e| e.with_host(key.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connector_resolves_addresses() {
        let connector = WinRmConnector::new(RemotingConfig::new(Credential::default()))
            .with_address("bench-server", "10.1.0.4");
        assert_eq!(connector.address_of("bench-server"), "10.1.0.4");
        assert_eq!(connector.address_of("10.1.0.9"), "10.1.0.9");
    }

    #[tokio::test]
    async fn open_without_username_is_rejected() {
        let cfg = RemotingConfig::new(Credential::default());
        let err = WinRmSession::open(&cfg, "127.0.0.1").await.unwrap_err();
        assert_eq!(err.kind, RemotingErrorKind::InvalidConfig);
    }
}
