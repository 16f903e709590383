//! # netbench – Azure
//!
//! Azure Resource Manager access for the benchmark run: a service-principal
//! token, the VM instance view, and a readiness check that gates session
//! creation on each VM being provisioned and running.

pub mod types;
pub mod client;
pub mod auth;
pub mod virtual_machines;
pub mod readiness;

pub use client::AzureClient;
pub use readiness::AzureReadiness;
pub use types::{AzureConfig, AzureCredentials, AzureError, AzureErrorKind, AzureResult};
