//! # Webhook Provider
//!
//! Generic read-only backend for anything that can serve secrets over
//! HTTP/JSON: internal secret services, bridge daemons, dev fixtures.
//!
//! `GET {url}/{key}` (plus `?version=` when a reference pins one) must
//! return the secret value as JSON; non-JSON bodies are carried as plain
//! string values. No push support - declarations requesting push semantics
//! against this provider are rejected at validation time.

use super::registry::{ProviderRegistry, RegistryError};
use super::{FetchResult, ProviderError, SecretsClient};
use crate::crd::SecretReference;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use zeroize::Zeroizing;

/// Registry id of the webhook backend
pub const PROVIDER_ID: &str = "webhook";

fn default_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookProviderConfig {
    /// Base URL; the reference key is appended as a path segment
    pub url: String,
    /// Bearer token sent with every request
    #[serde(default)]
    pub bearer_token: Option<String>,
    /// Extra headers sent with every request
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Register the webhook backend
pub fn register(registry: &mut ProviderRegistry) -> Result<(), RegistryError> {
    registry.register(
        PROVIDER_ID,
        Arc::new(|config| {
            let config = config.cloned();
            Box::pin(async move {
                let Some(config) = config else {
                    return Err(ProviderError::InvalidConfig(
                        "webhook provider requires a config with 'url'".to_string(),
                    ));
                };
                let config: WebhookProviderConfig = serde_json::from_value(config)
                    .map_err(|e| ProviderError::InvalidConfig(e.to_string()))?;
                let client = WebhookClient::new(config)?;
                Ok(Arc::new(client) as Arc<dyn SecretsClient>)
            })
        }),
    )
}

pub struct WebhookClient {
    http: reqwest::Client,
    base_url: String,
    // Zeroized on drop; must never appear in logs or debug output
    bearer_token: Option<Zeroizing<String>>,
    headers: BTreeMap<String, String>,
}

impl std::fmt::Debug for WebhookClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookClient")
            .field("base_url", &self.base_url)
            .field("bearer_token", &"***")
            .finish_non_exhaustive()
    }
}

impl WebhookClient {
    /// Build a client from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::InvalidConfig`] when the HTTP client cannot
    /// be constructed from the configured timeout.
    pub fn new(config: WebhookProviderConfig) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ProviderError::InvalidConfig(e.to_string()))?;
        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            bearer_token: config.bearer_token.map(Zeroizing::new),
            headers: config.headers,
        })
    }

    async fn get(&self, key: &str, version: Option<&str>) -> Result<FetchResult, ProviderError> {
        let url = format!("{}/{key}", self.base_url);
        let mut request = self.http.get(&url);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token.as_str());
        }
        for (name, value) in &self.headers {
            request = request.header(name, value);
        }
        if let Some(version) = version {
            request = request.query(&[("version", version)]);
        }

        let response = request.send().await.map_err(|e| {
            // Connect errors and timeouts are transient; the retry loop owns them
            ProviderError::Unavailable(format!("request to {url} failed: {e}"))
        })?;

        match response.status() {
            status if status.is_success() => {}
            reqwest::StatusCode::NOT_FOUND => {
                return Err(ProviderError::NotFound(key.to_string()));
            }
            reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
                return Err(ProviderError::Unauthorized(format!(
                    "webhook returned {}",
                    response.status()
                )));
            }
            status => {
                return Err(ProviderError::Unavailable(format!(
                    "webhook returned {status}"
                )));
            }
        }

        let etag = response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim_matches('"').to_string());
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;
        // Non-JSON bodies are legitimate: treat them as a plain string value
        let value = serde_json::from_str(&body).unwrap_or(Value::String(body));

        Ok(FetchResult {
            key: key.to_string(),
            value,
            version: etag,
        })
    }
}

#[async_trait]
impl SecretsClient for WebhookClient {
    async fn fetch(&self, reference: &SecretReference) -> Result<FetchResult, ProviderError> {
        self.get(&reference.key, reference.version.as_deref()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str) -> WebhookProviderConfig {
        WebhookProviderConfig {
            url: url.to_string(),
            bearer_token: Some("token-abc".to_string()),
            headers: BTreeMap::new(),
            timeout_secs: 5,
        }
    }

    #[test]
    fn test_base_url_is_normalized() {
        let client = WebhookClient::new(config("https://secrets.internal/v1/")).unwrap();
        assert_eq!(client.base_url, "https://secrets.internal/v1");
    }

    #[test]
    fn test_debug_never_reveals_the_token() {
        let client = WebhookClient::new(config("https://secrets.internal")).unwrap();
        let rendered = format!("{client:?}");
        assert!(!rendered.contains("token-abc"));
    }

    #[test]
    fn test_webhook_is_read_only() {
        let client = WebhookClient::new(config("https://secrets.internal")).unwrap();
        assert!(client.pusher().is_none());
        assert!(!client.supports_selector());
    }
}
