//! # Types
//!
//! Core types for the reconciler.

use crate::controller::backoff::{ExponentialBackoff, RetryPolicy};
use crate::fingerprint::FingerprintError;
use crate::provider::cache::{ClientCache, HandleError};
use crate::provider::registry::{ProviderRegistry, RegistryError};
use crate::provider::ProviderError;
use crate::template::ComposeError;
use crate::{constants, crd::ManagedSecret};
use chrono::{DateTime, Utc};
use kube::{Client, ResourceExt};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

/// Error taxonomy of one reconciliation pass.
///
/// `Provider(Unavailable)` only reaches this level after the fetch retry
/// loop is exhausted; everything else is terminal for the pass the moment
/// it occurs.
#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
    #[error("composition error: {0}")]
    Compose(#[from] ComposeError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("fingerprint error: {0}")]
    Fingerprint(#[from] FingerprintError),
    /// The declaration itself is unusable; retrying cannot help until it
    /// is edited
    #[error("invalid declaration: {0}")]
    Config(String),
    /// The output Secret was modified outside the controller while a commit
    /// was in flight, and re-comparing against fresh state conflicted again
    #[error("output secret was modified concurrently")]
    CommitConflict,
    #[error("kubernetes api error: {0}")]
    Kube(#[from] kube::Error),
}

impl From<HandleError> for ReconcilerError {
    fn from(error: HandleError) -> Self {
        match error {
            HandleError::Registry(e) => ReconcilerError::Registry(e),
            HandleError::Provider(e) => ReconcilerError::Provider(e),
            HandleError::Fingerprint(e) => ReconcilerError::Fingerprint(e),
        }
    }
}

impl ReconcilerError {
    /// Stable kind string surfaced in status conditions and metrics
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ReconcilerError::Provider(e) => e.kind(),
            ReconcilerError::Compose(e) => e.kind(),
            ReconcilerError::Registry(RegistryError::UnknownProvider(_)) => "UnknownProvider",
            ReconcilerError::Registry(RegistryError::DuplicateRegistration(_)) => {
                "DuplicateRegistration"
            }
            ReconcilerError::Fingerprint(_) => "FingerprintError",
            ReconcilerError::Config(_) => "InvalidDeclaration",
            ReconcilerError::CommitConflict => "CommitConflict",
            ReconcilerError::Kube(_) => "KubeApi",
        }
    }
}

/// States of one reconciliation pass, in the order they are entered.
/// Used for logging and status descriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassPhase {
    Pending,
    Fetching,
    Composing,
    Comparing,
    Committing,
    Skipped,
    Done,
    Failed,
}

impl PassPhase {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            PassPhase::Pending => "pending",
            PassPhase::Fetching => "fetching",
            PassPhase::Composing => "composing",
            PassPhase::Comparing => "comparing",
            PassPhase::Committing => "committing",
            PassPhase::Skipped => "skipped",
            PassPhase::Done => "done",
            PassPhase::Failed => "failed",
        }
    }
}

/// Per-declaration record of the last successful sync.
///
/// The durable copy lives as annotations on the output Secret; this
/// in-memory record exists so skipped passes can refresh the timestamp
/// without touching the output object. Updated only after a successful
/// commit.
#[derive(Debug, Clone)]
pub struct SyncState {
    pub fingerprint: String,
    pub last_synced: DateTime<Utc>,
}

/// Backoff state for a specific resource
/// Tracks error count and backoff calculator for progressive retries
#[derive(Debug, Clone)]
pub struct BackoffState {
    pub backoff: ExponentialBackoff,
    pub error_count: u32,
}

impl BackoffState {
    #[must_use]
    pub fn new() -> Self {
        Self {
            backoff: ExponentialBackoff::new(
                Duration::from_secs(constants::DEFAULT_PASS_BACKOFF_INITIAL_SECS),
                Duration::from_secs(constants::DEFAULT_PASS_BACKOFF_MAX_SECS),
            ),
            error_count: 0,
        }
    }

    pub fn increment_error(&mut self) {
        self.error_count += 1;
    }

    pub fn reset(&mut self) {
        self.error_count = 0;
        self.backoff.reset();
    }
}

impl Default for BackoffState {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared reconciler context, cloned into every pass.
#[derive(Clone)]
pub struct Reconciler {
    pub client: Client,
    /// Read-only after startup; no locking discipline needed for resolve
    pub registry: Arc<ProviderRegistry>,
    /// Provider handles shared across passes that use the same configuration
    pub handles: Arc<ClientCache>,
    /// Bounds for the in-pass fetch retry loop
    pub retry: RetryPolicy,
    /// Per-reference fetch timeout
    pub fetch_timeout: Duration,
    /// In-memory sync state per resource (keyed namespace/name)
    pub sync_states: Arc<Mutex<HashMap<String, SyncState>>>,
    /// Backoff state per resource (keyed namespace/name)
    /// Lives in the error_policy layer so failing resources never block
    /// watch or timer paths for healthy ones
    pub backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("registry", &self.registry)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    #[must_use]
    pub fn new(client: Client, registry: Arc<ProviderRegistry>) -> Self {
        Self {
            client,
            handles: Arc::new(ClientCache::new(Arc::clone(&registry))),
            registry,
            retry: RetryPolicy::default(),
            fetch_timeout: Duration::from_secs(constants::DEFAULT_FETCH_TIMEOUT_SECS),
            sync_states: Arc::new(Mutex::new(HashMap::new())),
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// "namespace/name" key identifying a resource in the state maps
    #[must_use]
    pub fn resource_key(resource: &ManagedSecret) -> String {
        format!(
            "{}/{}",
            resource.namespace().unwrap_or_else(|| "default".to_string()),
            resource.name_any()
        )
    }

    /// Record a successful sync and reset the resource's error backoff
    pub fn record_success(&self, resource: &ManagedSecret, fingerprint: String) {
        let key = Self::resource_key(resource);
        if let Ok(mut states) = self.sync_states.lock() {
            states.insert(
                key.clone(),
                SyncState {
                    fingerprint,
                    last_synced: Utc::now(),
                },
            );
        }
        if let Ok(mut backoffs) = self.backoff_states.lock() {
            if let Some(state) = backoffs.get_mut(&key) {
                state.reset();
            }
        }
    }

    /// Discard all in-memory state for a deleted resource
    pub fn forget(&self, resource: &ManagedSecret) {
        let key = Self::resource_key(resource);
        if let Ok(mut states) = self.sync_states.lock() {
            states.remove(&key);
        }
        if let Ok(mut backoffs) = self.backoff_states.lock() {
            backoffs.remove(&key);
        }
    }
}
