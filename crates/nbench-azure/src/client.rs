//! HTTP client wrapper for Azure Resource Manager.
//!
//! Handles bearer-token injection and retries of throttled or transient
//! responses with exponential backoff.

use std::time::Duration;

use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client;

use crate::types::{AzureConfig, AzureCredentials, AzureError, AzureErrorKind, AzureResult, AzureToken};

/// Maximum retries for transient / rate-limit errors.
const MAX_RETRIES: u32 = 3;
/// Base delay between retries (doubled each attempt).
const BASE_DELAY_MS: u64 = 500;

/// HTTP client with Azure-specific auth and retry logic.
#[derive(Debug, Clone)]
pub struct AzureClient {
    http: Client,
    token: Option<AzureToken>,
    credentials: AzureCredentials,
    config: AzureConfig,
}

impl AzureClient {
    pub fn new(credentials: AzureCredentials, config: AzureConfig) -> Self {
        Self {
            http: Client::builder()
                .timeout(Duration::from_secs(config.timeout_sec))
                .build()
                .unwrap_or_default(),
            token: None,
            credentials,
            config,
        }
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn config(&self) -> &AzureConfig {
        &self.config
    }

    pub fn credentials(&self) -> &AzureCredentials {
        &self.credentials
    }

    pub fn set_token(&mut self, token: AzureToken) {
        self.token = Some(token);
    }

    pub fn token(&self) -> Option<&AzureToken> {
        self.token.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token
            .as_ref()
            .map(|t| !t.access_token.is_empty() && !t.is_expired())
            .unwrap_or(false)
    }

    pub fn subscription_id(&self) -> AzureResult<&str> {
        Some(self.credentials.subscription_id.as_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(AzureError::subscription_not_set)
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// Resource-group-scoped URL.
    pub fn resource_group_url(&self, rg: &str, suffix: &str) -> AzureResult<String> {
        let sub = self.subscription_id()?;
        Ok(format!(
            "{}/subscriptions/{}/resourceGroups/{}{}",
            self.config.arm_base.trim_end_matches('/'),
            sub,
            rg,
            suffix
        ))
    }

    fn auth_headers(&self) -> AzureResult<HeaderMap> {
        let token = self
            .token
            .as_ref()
            .filter(|t| !t.access_token.is_empty())
            .ok_or_else(AzureError::not_authenticated)?;

        let mut headers = HeaderMap::new();
        let val = format!("Bearer {}", token.access_token);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&val).map_err(|e| {
                AzureError::new(AzureErrorKind::Auth, format!("Header value error: {e}"))
            })?,
        );
        Ok(headers)
    }

    // ── HTTP verbs ───────────────────────────────────────────────────

    pub async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> AzureResult<T> {
        let headers = self.auth_headers()?;

        for attempt in 0..=MAX_RETRIES {
            let resp = self
                .http
                .get(url)
                .headers(headers.clone())
                .send()
                .await
                .map_err(|e| AzureError::new(AzureErrorKind::Network, format!("{e}")))?;

            let status = resp.status();
            if status.is_success() {
                return resp.json::<T>().await.map_err(|e| {
                    AzureError::new(AzureErrorKind::Parse, format!("JSON parse: {e}"))
                });
            }

            if should_retry(status.as_u16()) && attempt < MAX_RETRIES {
                let delay = BASE_DELAY_MS * 2u64.pow(attempt);
                warn!("Azure GET {} → {} – retrying in {}ms", url, status, delay);
                tokio::time::sleep(Duration::from_millis(delay)).await;
                continue;
            }

            let body = resp.text().await.unwrap_or_default();
            return Err(AzureError::from_status(status.as_u16(), &body));
        }

        Err(AzureError::new(AzureErrorKind::Network, "Max retries exceeded"))
    }

    /// POST a form without a bearer token (token endpoint).
    pub async fn post_form_unauthenticated<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        form: &[(&str, &str)],
    ) -> AzureResult<T> {
        debug!("Azure form POST → {}", url);
        let resp = self
            .http
            .post(url)
            .form(form)
            .send()
            .await
            .map_err(|e| AzureError::new(AzureErrorKind::Network, format!("{e}")))?;

        if resp.status().is_success() {
            resp.json::<T>().await.map_err(|e| {
                AzureError::new(AzureErrorKind::Parse, format!("JSON parse: {e}"))
            })
        } else {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            Err(AzureError::from_status(status, &body))
        }
    }
}

fn should_retry(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}
