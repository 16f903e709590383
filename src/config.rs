//! Run configuration.
//!
//! Loaded from a JSON file: `$NETBENCH_CONFIG` if set, otherwise
//! `<config dir>/netbench/config.json`. Secrets can be supplied through the
//! environment instead of the file.

use log::debug;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use nbench_azure::{AzureConfig, AzureCredentials};
use nbench_remoting::{RemotingConfig, DEFAULT_CHUNK_SIZE};

use crate::error::{BenchError, BenchResult};

pub const CONFIG_PATH_ENV: &str = "NETBENCH_CONFIG";
pub const WINRM_PASSWORD_ENV: &str = "NETBENCH_WINRM_PASSWORD";
pub const AZURE_SECRET_ENV: &str = "AZURE_CLIENT_SECRET";

/// One benchmark VM.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostConfig {
    /// Registry key; also the Azure VM name.
    pub name: String,
    /// Address the WinRM listener is reachable on.
    pub address: String,
}

/// What gets pushed to both hosts before the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadConfig {
    /// Local file or directory.
    pub local_path: PathBuf,
    pub remote_path: String,
    #[serde(default = "default_true")]
    pub skip_if_exists: bool,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

/// Opaque benchmark commands; their stdout is scanned for measurement records.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkConfig {
    /// Started on the server host before the client runs.
    #[serde(default)]
    pub server_command: Option<String>,
    pub client_command: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollConfig {
    #[serde(default = "default_poll_interval")]
    pub interval_sec: u64,
    #[serde(default = "default_poll_attempts")]
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_sec: default_poll_interval(),
            max_attempts: default_poll_attempts(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AzureSettings {
    pub credentials: AzureCredentials,
    pub resource_group: String,
    #[serde(default)]
    pub client: AzureConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchConfig {
    pub server: HostConfig,
    pub client: HostConfig,
    pub remoting: RemotingConfig,
    pub payload: PayloadConfig,
    pub benchmark: BenchmarkConfig,
    /// Without Azure settings every host is assumed ready.
    #[serde(default)]
    pub azure: Option<AzureSettings>,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_true() -> bool {
    true
}
fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}
fn default_poll_interval() -> u64 {
    10
}
fn default_poll_attempts() -> u32 {
    60
}
fn default_log_level() -> String {
    "info".to_string()
}

impl BenchConfig {
    /// Load from the default location and apply environment overrides.
    pub fn load() -> BenchResult<Self> {
        let path = config_path()?;
        let mut config = Self::from_file(&path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> BenchResult<Self> {
        debug!("Reading configuration from {}", path.display());
        let text = std::fs::read_to_string(path).map_err(|e| {
            BenchError::config(format!("Cannot read '{}': {}", path.display(), e))
        })?;
        Self::from_json(&text)
            .map_err(|e| BenchError::config(format!("{} ({})", e.message, path.display())))
    }

    pub fn from_json(text: &str) -> BenchResult<Self> {
        serde_json::from_str(text).map_err(|e| BenchError::config(format!("Invalid configuration: {}", e)))
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(pw) = std::env::var(WINRM_PASSWORD_ENV) {
            self.remoting.credential.password = Some(pw);
        }
        if let (Some(azure), Ok(secret)) = (self.azure.as_mut(), std::env::var(AZURE_SECRET_ENV)) {
            azure.credentials.client_secret = secret;
        }
    }

    pub fn validate(&self) -> BenchResult<()> {
        for host in [&self.server, &self.client] {
            if host.name.trim().is_empty() || host.address.trim().is_empty() {
                return Err(BenchError::config("Every host needs a name and an address"));
            }
        }
        if self.server.name == self.client.name {
            return Err(BenchError::config(format!(
                "Server and client share the name '{}'",
                self.server.name
            )));
        }
        if self.remoting.credential.username.is_empty() {
            return Err(BenchError::config("remoting.credential.username is empty"));
        }
        if self.payload.chunk_size == 0 {
            return Err(BenchError::config("payload.chunkSize must be greater than zero"));
        }
        if self.payload.remote_path.trim().is_empty() {
            return Err(BenchError::config("payload.remotePath is empty"));
        }
        Ok(())
    }

    /// Host keys in the order they are processed.
    pub fn host_keys(&self) -> Vec<String> {
        vec![self.server.name.clone(), self.client.name.clone()]
    }
}

/// `$NETBENCH_CONFIG`, or `<config dir>/netbench/config.json`.
pub fn config_path() -> BenchResult<PathBuf> {
    if let Some(p) = std::env::var_os(CONFIG_PATH_ENV) {
        return Ok(PathBuf::from(p));
    }
    dirs::config_dir()
        .map(|d| d.join("netbench").join("config.json"))
        .ok_or_else(|| {
            BenchError::config(format!(
                "No config directory on this platform; set {}",
                CONFIG_PATH_ENV
            ))
        })
}
