//! # Provider Handle Cache
//!
//! Lazily constructed, shared provider handles.
//!
//! Handles are created on first use per distinct backend configuration and
//! reused by every reconciliation pass that references the same
//! configuration. The cache key includes a fingerprint of the configuration,
//! so editing a provider config naturally yields a fresh handle instead of
//! reusing one built from stale credentials.

use super::registry::{ProviderRegistry, RegistryError};
use super::{ProviderError, SecretsClient};
use crate::crd::ProviderRef;
use crate::fingerprint::{fingerprint, FingerprintError};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum HandleError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("failed to key provider configuration: {0}")]
    Fingerprint(#[from] FingerprintError),
}

pub struct ClientCache {
    registry: Arc<ProviderRegistry>,
    clients: Mutex<HashMap<String, Arc<dyn SecretsClient>>>,
}

impl fmt::Debug for ClientCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCache")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl ClientCache {
    #[must_use]
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self {
            registry,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve and (if needed) construct the handle for a provider reference.
    ///
    /// Two passes racing on first use of the same configuration may both
    /// construct a handle; the first insert wins and handles are
    /// interchangeable, so this is harmless.
    ///
    /// # Errors
    ///
    /// Fails when the provider id is unregistered, the configuration cannot
    /// be keyed, or the provider constructor rejects the configuration.
    pub async fn client_for(
        &self,
        provider: &ProviderRef,
    ) -> Result<Arc<dyn SecretsClient>, HandleError> {
        let key = format!("{}/{}", provider.name, fingerprint(&provider.config)?);

        if let Some(existing) = self.clients.lock().await.get(&key) {
            return Ok(Arc::clone(existing));
        }

        // Construct outside the lock - constructors may perform auth I/O
        let constructor = self.registry.resolve(&provider.name)?;
        let handle = constructor(provider.config.as_ref()).await?;

        let mut clients = self.clients.lock().await;
        let entry = clients.entry(key).or_insert_with(|| Arc::clone(&handle));
        Ok(Arc::clone(entry))
    }
}
