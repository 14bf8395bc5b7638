//! # Provider Registry
//!
//! Explicit mapping from backend id to provider constructor.
//!
//! The registry is an ordinary object constructed during process bootstrap
//! and passed by reference into the reconciler - registration is an explicit
//! call in `main`, never an import side effect. After startup it is
//! read-only, so concurrent `resolve` calls need no locking discipline.

use super::{ProviderError, SecretsClient};
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Builds a live, authenticated provider handle from an opaque backend
/// configuration. Constructors must be pure with respect to global state
/// beyond caching.
pub type ProviderConstructor = Arc<
    dyn Fn(Option<&Value>) -> BoxFuture<'static, Result<Arc<dyn SecretsClient>, ProviderError>>
        + Send
        + Sync,
>;

#[derive(Debug, Error)]
pub enum RegistryError {
    /// `resolve` was asked for an id nothing registered
    #[error("no provider registered under id '{0}'")]
    UnknownProvider(String),
    /// A second registration attempted to shadow an existing backend.
    /// Startup-fatal: silently shadowing a backend must never happen.
    #[error("provider id '{0}' is already registered")]
    DuplicateRegistration(String),
}

#[derive(Default)]
pub struct ProviderRegistry {
    constructors: HashMap<String, ProviderConstructor>,
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("ids", &self.ids())
            .finish()
    }
}

impl ProviderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend constructor under `id`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateRegistration`] when `id` is already
    /// taken. Callers treat this as startup-fatal.
    pub fn register(
        &mut self,
        id: impl Into<String>,
        constructor: ProviderConstructor,
    ) -> Result<(), RegistryError> {
        let id = id.into();
        if self.constructors.contains_key(&id) {
            return Err(RegistryError::DuplicateRegistration(id));
        }
        self.constructors.insert(id, constructor);
        Ok(())
    }

    /// Resolve the constructor registered under `id`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownProvider`] for unregistered ids -
    /// never a silent no-op.
    pub fn resolve(&self, id: &str) -> Result<ProviderConstructor, RegistryError> {
        self.constructors
            .get(id)
            .map(Arc::clone)
            .ok_or_else(|| RegistryError::UnknownProvider(id.to_string()))
    }

    /// Registered backend ids, sorted for stable logging
    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::fake::FakeClient;

    fn fake_constructor() -> ProviderConstructor {
        Arc::new(|_config| {
            Box::pin(async { Ok(Arc::new(FakeClient::new()) as Arc<dyn SecretsClient>) })
        })
    }

    #[test]
    fn test_duplicate_registration_is_rejected() {
        let mut registry = ProviderRegistry::new();
        registry.register("fake", fake_constructor()).unwrap();

        let err = registry.register("fake", fake_constructor()).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateRegistration(id) if id == "fake"));
    }

    #[test]
    fn test_resolve_unknown_id_fails() {
        let registry = ProviderRegistry::new();
        let err = match registry.resolve("vault") {
            Ok(_) => panic!("expected resolve to fail for unknown provider"),
            Err(err) => err,
        };
        assert!(matches!(err, RegistryError::UnknownProvider(id) if id == "vault"));
    }

    #[tokio::test]
    async fn test_resolved_constructor_builds_a_handle() {
        let mut registry = ProviderRegistry::new();
        registry.register("fake", fake_constructor()).unwrap();

        let constructor = registry.resolve("fake").unwrap();
        let handle = constructor(None).await.unwrap();
        assert!(handle.pusher().is_some());
    }

    #[test]
    fn test_ids_are_sorted() {
        let mut registry = ProviderRegistry::new();
        registry.register("webhook", fake_constructor()).unwrap();
        registry.register("fake", fake_constructor()).unwrap();
        assert_eq!(registry.ids(), vec!["fake", "webhook"]);
    }
}
