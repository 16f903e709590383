//! Azure AD client-credentials authentication.

use chrono::{Duration, Utc};
use log::debug;

use crate::client::AzureClient;
use crate::types::{AzureError, AzureErrorKind, AzureResult, AzureToken, TokenResponse, ARM_SCOPE};

/// Token endpoint URL for a given tenant.
fn token_url(tenant_id: &str) -> String {
    format!(
        "https://login.microsoftonline.com/{}/oauth2/v2.0/token",
        tenant_id
    )
}

/// Acquire an ARM token using the client's service-principal credentials.
pub async fn acquire_token(client: &AzureClient) -> AzureResult<AzureToken> {
    let creds = client.credentials();
    if creds.client_id.is_empty() || creds.client_secret.is_empty() || creds.tenant_id.is_empty() {
        return Err(AzureError::new(
            AzureErrorKind::Validation,
            "client_id, client_secret, and tenant_id are all required",
        ));
    }

    let url = token_url(&creds.tenant_id);
    debug!("Azure token request → {}", url);

    let form = [
        ("grant_type", "client_credentials"),
        ("client_id", creds.client_id.as_str()),
        ("client_secret", creds.client_secret.as_str()),
        ("scope", ARM_SCOPE),
    ];

    let resp: TokenResponse = client.post_form_unauthenticated(&url, &form).await?;
    Ok(token_from_response(resp))
}

/// Make sure `client` holds an unexpired token, fetching one if needed.
pub async fn ensure_token(client: &mut AzureClient) -> AzureResult<()> {
    if client.is_authenticated() {
        return Ok(());
    }
    let token = acquire_token(client).await?;
    client.set_token(token);
    Ok(())
}

fn token_from_response(resp: TokenResponse) -> AzureToken {
    // Treat the token as expired a minute early
    let expires_at = resp
        .expires_in
        .map(|secs| Utc::now() + Duration::seconds(secs as i64 - 60));

    AzureToken {
        access_token: resp.access_token,
        token_type: resp.token_type,
        expires_at,
    }
}
