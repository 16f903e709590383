//! Core types for the Azure Resource Manager integration.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Base URL of the public-cloud ARM endpoint.
pub const ARM_BASE: &str = "https://management.azure.com";

/// OAuth2 scope for ARM tokens.
pub const ARM_SCOPE: &str = "https://management.azure.com/.default";

// ─── Error types ─────────────────────────────────────────────────────

/// Categorised error kinds for Azure operations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AzureErrorKind {
    Auth,
    NotFound,
    Forbidden,
    RateLimit,
    BadRequest,
    ServerError,
    Network,
    Parse,
    Validation,
    NotAuthenticated,
    SubscriptionNotSet,
}

impl fmt::Display for AzureErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auth => write!(f, "Authentication error"),
            Self::NotFound => write!(f, "Resource not found"),
            Self::Forbidden => write!(f, "Forbidden"),
            Self::RateLimit => write!(f, "Rate limit exceeded"),
            Self::BadRequest => write!(f, "Bad request"),
            Self::ServerError => write!(f, "Server error"),
            Self::Network => write!(f, "Network error"),
            Self::Parse => write!(f, "Parse error"),
            Self::Validation => write!(f, "Validation error"),
            Self::NotAuthenticated => write!(f, "Not authenticated"),
            Self::SubscriptionNotSet => write!(f, "Subscription ID not set"),
        }
    }
}

/// Main error type for Azure operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AzureError {
    pub kind: AzureErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

impl AzureError {
    pub fn new(kind: AzureErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status_code: None,
        }
    }

    pub fn from_status(status: u16, body: &str) -> Self {
        let kind = match status {
            400 => AzureErrorKind::BadRequest,
            401 => AzureErrorKind::Auth,
            403 => AzureErrorKind::Forbidden,
            404 => AzureErrorKind::NotFound,
            429 => AzureErrorKind::RateLimit,
            500..=599 => AzureErrorKind::ServerError,
            _ => AzureErrorKind::Network,
        };
        Self {
            kind,
            message: body.to_string(),
            status_code: Some(status),
        }
    }

    pub fn not_authenticated() -> Self {
        Self::new(AzureErrorKind::NotAuthenticated, "No access token; authenticate first")
    }

    pub fn subscription_not_set() -> Self {
        Self::new(AzureErrorKind::SubscriptionNotSet, "Subscription ID not configured")
    }
}

impl fmt::Display for AzureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl std::error::Error for AzureError {}

impl From<AzureError> for String {
    fn from(e: AzureError) -> String {
        e.to_string()
    }
}

pub type AzureResult<T> = Result<T, AzureError>;

// ─── OAuth / Auth ────────────────────────────────────────────────────

/// Service-principal credentials for the subscription hosting the benchmark VMs.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AzureCredentials {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    pub tenant_id: String,
    pub subscription_id: String,
}

/// Cached bearer token.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AzureToken {
    pub access_token: String,
    pub token_type: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl AzureToken {
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(exp) => Utc::now() >= exp,
            None => false,
        }
    }
}

/// Raw token endpoint response.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

// ─── Client configuration ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AzureConfig {
    #[serde(default = "default_arm_base")]
    pub arm_base: String,
    #[serde(default = "default_compute_api")]
    pub api_version_compute: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_sec: u64,
}

fn default_arm_base() -> String {
    ARM_BASE.to_string()
}
fn default_compute_api() -> String {
    "2024-03-01".to_string()
}
fn default_timeout() -> u64 {
    30
}

impl Default for AzureConfig {
    fn default() -> Self {
        Self {
            arm_base: default_arm_base(),
            api_version_compute: default_compute_api(),
            timeout_sec: default_timeout(),
        }
    }
}

// ─── Virtual machines ────────────────────────────────────────────────

/// Runtime view of a VM (`.../instanceView`).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct VmInstanceView {
    #[serde(default)]
    pub computer_name: Option<String>,
    #[serde(default)]
    pub statuses: Vec<InstanceViewStatus>,
    #[serde(default)]
    pub vm_agent: Option<VmAgent>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct InstanceViewStatus {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub display_status: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct VmAgent {
    #[serde(default)]
    pub vm_agent_version: Option<String>,
    #[serde(default)]
    pub statuses: Vec<InstanceViewStatus>,
}
