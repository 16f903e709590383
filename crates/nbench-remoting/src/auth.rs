//! HTTP Basic authentication for the WinRM listener.
//!
//! Basic is the only scheme the benchmark VMs enable; it is paired with the
//! HTTPS listener so the credential never crosses the wire in clear text.

use base64::Engine;

use crate::error::{RemotingError, RemotingResult};
use crate::types::Credential;

/// Build the `Authorization` header value for `credential`.
pub fn basic_auth_header(credential: &Credential) -> RemotingResult<String> {
    if credential.username.is_empty() {
        return Err(RemotingError::invalid_config(
            "WinRM credential has no username",
        ));
    }
    let user = match credential.domain.as_deref() {
        Some(domain) if !domain.is_empty() => format!("{}\\{}", domain, credential.username),
        _ => credential.username.clone(),
    };
    let password = credential.password.as_deref().unwrap_or_default();
    let encoded = base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", user, password));
    Ok(format!("Basic {}", encoded))
}
