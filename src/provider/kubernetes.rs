//! # Kubernetes Provider
//!
//! Serves secret material from native Secrets in a configured namespace -
//! typically a namespace another tool mirrors vault material into. Keys are
//! Secret names; each fetched value is the Secret's data decoded into a
//! key/value object. Bidirectional: push writes a Secret via server-side
//! apply, delete removes it.

use super::registry::{ProviderRegistry, RegistryError};
use super::{FetchResult, ProviderError, SecretsClient, SecretsPusher};
use crate::constants;
use crate::crd::SecretReference;
use async_trait::async_trait;
use base64::Engine;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::{Api, DeleteParams, ListParams, ObjectMeta, Patch, PatchParams};
use kube::{Client, ResourceExt};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Registry id of the kubernetes backend
pub const PROVIDER_ID: &str = "kubernetes";

/// Backend configuration: which namespace holds the source Secrets
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesProviderConfig {
    pub namespace: String,
}

/// Register the kubernetes backend. The constructor captures the controller's
/// cluster client; per-declaration configuration selects the namespace.
pub fn register(registry: &mut ProviderRegistry, client: Client) -> Result<(), RegistryError> {
    registry.register(
        PROVIDER_ID,
        Arc::new(move |config| {
            let client = client.clone();
            let config = config.cloned();
            Box::pin(async move {
                let Some(config) = config else {
                    return Err(ProviderError::InvalidConfig(
                        "kubernetes provider requires a config with 'namespace'".to_string(),
                    ));
                };
                let config: KubernetesProviderConfig = serde_json::from_value(config)
                    .map_err(|e| ProviderError::InvalidConfig(e.to_string()))?;
                Ok(Arc::new(KubernetesClient::new(client, config.namespace))
                    as Arc<dyn SecretsClient>)
            })
        }),
    )
}

pub struct KubernetesClient {
    api: Api<Secret>,
}

impl std::fmt::Debug for KubernetesClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubernetesClient").finish_non_exhaustive()
    }
}

impl KubernetesClient {
    #[must_use]
    pub fn new(client: Client, namespace: String) -> Self {
        Self {
            api: Api::namespaced(client, &namespace),
        }
    }
}

/// Map a cluster API failure onto the provider error taxonomy
fn classify_kube_error(key: &str, error: &kube::Error) -> ProviderError {
    match error {
        kube::Error::Api(response) if response.code == 404 => {
            ProviderError::NotFound(key.to_string())
        }
        kube::Error::Api(response) if response.code == 401 || response.code == 403 => {
            ProviderError::Unauthorized(response.message.clone())
        }
        other => ProviderError::Unavailable(other.to_string()),
    }
}

/// Decode a Secret's data map into a JSON object.
/// Non-UTF-8 entries are carried as base64 strings.
fn secret_to_value(secret: &Secret) -> Value {
    let mut object = serde_json::Map::new();
    if let Some(data) = &secret.data {
        for (key, ByteString(bytes)) in data {
            let value = match String::from_utf8(bytes.clone()) {
                Ok(text) => Value::String(text),
                Err(_) => {
                    Value::String(base64::engine::general_purpose::STANDARD.encode(bytes))
                }
            };
            object.insert(key.clone(), value);
        }
    }
    Value::Object(object)
}

fn result_from_secret(key: &str, secret: &Secret) -> FetchResult {
    FetchResult {
        key: key.to_string(),
        value: secret_to_value(secret),
        version: secret.metadata.resource_version.clone(),
    }
}

#[async_trait]
impl SecretsClient for KubernetesClient {
    async fn fetch(&self, reference: &SecretReference) -> Result<FetchResult, ProviderError> {
        let secret = self
            .api
            .get(&reference.key)
            .await
            .map_err(|e| classify_kube_error(&reference.key, &e))?;
        Ok(result_from_secret(&reference.key, &secret))
    }

    fn supports_selector(&self) -> bool {
        true
    }

    async fn fetch_by_prefix(&self, prefix: &str) -> Result<Vec<FetchResult>, ProviderError> {
        let secrets = self
            .api
            .list(&ListParams::default())
            .await
            .map_err(|e| classify_kube_error(prefix, &e))?;
        let mut results: Vec<FetchResult> = secrets
            .items
            .iter()
            .filter(|secret| secret.name_any().starts_with(prefix))
            .map(|secret| result_from_secret(&secret.name_any(), secret))
            .collect();
        results.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(results)
    }

    fn pusher(&self) -> Option<&dyn SecretsPusher> {
        Some(self)
    }
}

#[async_trait]
impl SecretsPusher for KubernetesClient {
    async fn push(&self, key: &str, value: &Value) -> Result<(), ProviderError> {
        let mut string_data = BTreeMap::new();
        match value {
            Value::Object(map) => {
                for (entry_key, entry_value) in map {
                    string_data.insert(entry_key.clone(), stringify(entry_value));
                }
            }
            other => {
                // Scalar pushes land under a single conventional entry
                string_data.insert("value".to_string(), stringify(other));
            }
        }
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(key.to_string()),
                ..ObjectMeta::default()
            },
            string_data: Some(string_data),
            ..Secret::default()
        };
        self.api
            .patch(
                key,
                &PatchParams::apply(constants::CONTROLLER_NAME).force(),
                &Patch::Apply(&secret),
            )
            .await
            .map_err(|e| classify_kube_error(key, &e))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), ProviderError> {
        match self.api.delete(key, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            // Idempotent: already gone is success
            Err(kube::Error::Api(response)) if response.code == 404 => Ok(()),
            Err(e) => Err(classify_kube_error(key, &e)),
        }
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_secret_data_decodes_to_object() {
        let mut data = BTreeMap::new();
        data.insert("user".to_string(), ByteString(b"svc".to_vec()));
        data.insert("password".to_string(), ByteString(b"hunter2".to_vec()));
        let secret = Secret {
            data: Some(data),
            ..Secret::default()
        };
        assert_eq!(
            secret_to_value(&secret),
            json!({"password": "hunter2", "user": "svc"})
        );
    }

    #[test]
    fn test_non_utf8_data_is_base64_encoded() {
        let mut data = BTreeMap::new();
        data.insert("blob".to_string(), ByteString(vec![0xff, 0xfe]));
        let secret = Secret {
            data: Some(data),
            ..Secret::default()
        };
        let value = secret_to_value(&secret);
        assert_eq!(value, json!({"blob": "//4="}));
    }
}
