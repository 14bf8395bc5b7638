//! # Provider Modules
//!
//! Secret provider implementations and the capability contract they satisfy.
//!
//! Every backend - KV store, HTTP service, another cluster namespace - is
//! adapted to the single [`SecretsClient`] contract so the reconciler never
//! depends on a specific backend. Optional capabilities (selector fetches,
//! push/delete) are exposed as presence/absence, never by downcasting.

use crate::crd::SecretReference;
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub mod cache;
pub mod fake;
pub mod kubernetes;
pub mod registry;
pub mod webhook;

/// Provider-layer error taxonomy.
///
/// `Unavailable` is the only transient kind; everything else is terminal for
/// the current reconciliation pass.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The reference does not exist at the backend
    #[error("secret '{0}' not found at backend")]
    NotFound(String),
    /// Credential rejected or expired
    #[error("backend rejected credentials: {0}")]
    Unauthorized(String),
    /// Transient backend or network failure; safe to retry
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    /// The provider configuration itself is unusable
    #[error("invalid provider configuration: {0}")]
    InvalidConfig(String),
}

impl ProviderError {
    /// Whether the reconciler may retry this error with backoff
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Unavailable(_))
    }

    /// Stable kind string surfaced in status conditions and metrics
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::NotFound(_) => "NotFound",
            ProviderError::Unauthorized(_) => "Unauthorized",
            ProviderError::Unavailable(_) => "Unavailable",
            ProviderError::InvalidConfig(_) => "InvalidConfig",
        }
    }
}

/// Raw value returned by a provider for one reference.
///
/// Owned transiently by the reconciler for the duration of one pass;
/// never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    /// Backend key the value was fetched from
    pub key: String,
    /// Raw or structured value as returned by the backend
    pub value: Value,
    /// Backend-assigned version token, when the backend has one
    pub version: Option<String>,
}

/// Capability contract every backend implementation satisfies.
///
/// Implementations must be safe for concurrent calls: one handle is shared
/// across all reconciliation passes that reference the same backend
/// configuration.
#[async_trait]
pub trait SecretsClient: Send + Sync {
    /// Fetch a single reference.
    ///
    /// Only `key` and `version` of the reference concern the provider;
    /// `property` extraction and renaming happen in the composition layer.
    async fn fetch(&self, reference: &SecretReference) -> Result<FetchResult, ProviderError>;

    /// Whether this backend supports bulk prefix queries.
    /// Declarations using `dataFrom` against a provider without selector
    /// support are rejected as a configuration error before any fetch.
    fn supports_selector(&self) -> bool {
        false
    }

    /// Fetch every key under a prefix. Backends that support this return
    /// results in a stable (sorted) key order.
    async fn fetch_by_prefix(&self, prefix: &str) -> Result<Vec<FetchResult>, ProviderError> {
        Err(ProviderError::InvalidConfig(format!(
            "backend does not support selector fetches (prefix '{prefix}')"
        )))
    }

    /// Push/delete capability. `None` marks a read-only provider;
    /// declarations requesting push semantics against it fail validation
    /// with a configuration error.
    fn pusher(&self) -> Option<&dyn SecretsPusher> {
        None
    }
}

/// Write-side capability for bidirectional backends
#[async_trait]
pub trait SecretsPusher: Send + Sync {
    /// Create or update the backend value under `key`
    async fn push(&self, key: &str, value: &Value) -> Result<(), ProviderError>;

    /// Delete the backend value under `key`. Deleting an absent key is not
    /// an error - deletion is idempotent.
    async fn delete(&self, key: &str) -> Result<(), ProviderError>;
}
