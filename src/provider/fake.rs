//! # Fake Provider
//!
//! In-memory backend used as the test double throughout the crate and as a
//! scratch backend on development clusters. Bidirectional (push/delete),
//! selector-capable, with per-key scriptable failures so tests can exercise
//! the retry and partial-failure paths deterministically.

use super::registry::{ProviderRegistry, RegistryError};
use super::{FetchResult, ProviderError, SecretsClient, SecretsPusher};
use crate::crd::SecretReference;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};

/// Registry id of the fake backend
pub const PROVIDER_ID: &str = "fake";

/// Register the fake backend. The registered constructor builds an empty
/// store; tests construct [`FakeClient`] directly and seed it instead.
pub fn register(registry: &mut ProviderRegistry) -> Result<(), RegistryError> {
    registry.register(
        PROVIDER_ID,
        Arc::new(|_config| {
            Box::pin(async { Ok(Arc::new(FakeClient::new()) as Arc<dyn SecretsClient>) })
        }),
    )
}

#[derive(Debug, Default)]
pub struct FakeClient {
    // key -> (value, version counter)
    store: RwLock<BTreeMap<String, (Value, u64)>>,
    // scripted failures consumed per fetch of the named key
    failures: Mutex<HashMap<String, VecDeque<ProviderError>>>,
    // fetch attempts per key, for retry-bound assertions
    fetches: Mutex<HashMap<String, u32>>,
}

impl FakeClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed or overwrite a backend value
    pub fn insert(&self, key: &str, value: Value) {
        let mut store = self.store.write().expect("fake store lock poisoned");
        let version = store.get(key).map_or(1, |(_, v)| v + 1);
        store.insert(key.to_string(), (value, version));
    }

    /// Remove a backend value
    pub fn remove(&self, key: &str) -> bool {
        self.store
            .write()
            .expect("fake store lock poisoned")
            .remove(key)
            .is_some()
    }

    /// Whether a backend value currently exists
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.store
            .read()
            .expect("fake store lock poisoned")
            .contains_key(key)
    }

    /// Current value for a key, if present
    #[must_use]
    pub fn value_of(&self, key: &str) -> Option<Value> {
        self.store
            .read()
            .expect("fake store lock poisoned")
            .get(key)
            .map(|(v, _)| v.clone())
    }

    /// Script the next fetch of `key` to fail with `error`.
    /// Queued failures are consumed in order before the stored value is
    /// served again.
    pub fn enqueue_failure(&self, key: &str, error: ProviderError) {
        self.failures
            .lock()
            .expect("fake failure lock poisoned")
            .entry(key.to_string())
            .or_default()
            .push_back(error);
    }

    /// How many times `key` has been fetched
    #[must_use]
    pub fn fetch_count(&self, key: &str) -> u32 {
        self.fetches
            .lock()
            .expect("fake fetch-count lock poisoned")
            .get(key)
            .copied()
            .unwrap_or(0)
    }

    fn record_fetch(&self, key: &str) -> Option<ProviderError> {
        *self
            .fetches
            .lock()
            .expect("fake fetch-count lock poisoned")
            .entry(key.to_string())
            .or_insert(0) += 1;
        self.failures
            .lock()
            .expect("fake failure lock poisoned")
            .get_mut(key)
            .and_then(VecDeque::pop_front)
    }
}

#[async_trait]
impl SecretsClient for FakeClient {
    async fn fetch(&self, reference: &SecretReference) -> Result<FetchResult, ProviderError> {
        if let Some(error) = self.record_fetch(&reference.key) {
            return Err(error);
        }
        let store = self.store.read().expect("fake store lock poisoned");
        let (value, version) = store
            .get(&reference.key)
            .ok_or_else(|| ProviderError::NotFound(reference.key.clone()))?;
        if let Some(pinned) = &reference.version {
            if pinned != &version.to_string() {
                return Err(ProviderError::NotFound(format!(
                    "{}@{pinned}",
                    reference.key
                )));
            }
        }
        Ok(FetchResult {
            key: reference.key.clone(),
            value: value.clone(),
            version: Some(version.to_string()),
        })
    }

    fn supports_selector(&self) -> bool {
        true
    }

    async fn fetch_by_prefix(&self, prefix: &str) -> Result<Vec<FetchResult>, ProviderError> {
        if let Some(error) = self.record_fetch(prefix) {
            return Err(error);
        }
        let store = self.store.read().expect("fake store lock poisoned");
        // BTreeMap iteration keeps selector results in stable key order
        Ok(store
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, (value, version))| FetchResult {
                key: key.clone(),
                value: value.clone(),
                version: Some(version.to_string()),
            })
            .collect())
    }

    fn pusher(&self) -> Option<&dyn SecretsPusher> {
        Some(self)
    }
}

#[async_trait]
impl SecretsPusher for FakeClient {
    async fn push(&self, key: &str, value: &Value) -> Result<(), ProviderError> {
        self.insert(key, value.clone());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), ProviderError> {
        // Idempotent: deleting an absent key is fine
        self.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reference(key: &str) -> SecretReference {
        SecretReference {
            key: key.to_string(),
            version: None,
            property: None,
            target_key: None,
        }
    }

    #[tokio::test]
    async fn test_fetch_round_trip_and_versions() {
        let fake = FakeClient::new();
        fake.insert("app/token", json!("s3cr3t"));
        fake.insert("app/token", json!("s3cr3t-2"));

        let result = fake.fetch(&reference("app/token")).await.unwrap();
        assert_eq!(result.value, json!("s3cr3t-2"));
        assert_eq!(result.version.as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_missing_key_is_not_found() {
        let fake = FakeClient::new();
        let err = fake.fetch(&reference("absent")).await.unwrap_err();
        assert!(matches!(err, ProviderError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_scripted_failures_are_consumed_in_order() {
        let fake = FakeClient::new();
        fake.insert("flaky", json!("ok"));
        fake.enqueue_failure("flaky", ProviderError::Unavailable("blip".into()));

        let err = fake.fetch(&reference("flaky")).await.unwrap_err();
        assert!(err.is_transient());
        let result = fake.fetch(&reference("flaky")).await.unwrap();
        assert_eq!(result.value, json!("ok"));
        assert_eq!(fake.fetch_count("flaky"), 2);
    }

    #[tokio::test]
    async fn test_prefix_fetch_is_sorted_and_filtered() {
        let fake = FakeClient::new();
        fake.insert("db/user", json!("svc"));
        fake.insert("db/password", json!("hunter2"));
        fake.insert("cache/url", json!("redis://"));

        let results = fake.fetch_by_prefix("db/").await.unwrap();
        let keys: Vec<&str> = results.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["db/password", "db/user"]);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let fake = FakeClient::new();
        fake.insert("gone", json!("x"));
        let pusher = fake.pusher().unwrap();
        pusher.delete("gone").await.unwrap();
        pusher.delete("gone").await.unwrap();
        assert!(!fake.contains("gone"));
    }
}
