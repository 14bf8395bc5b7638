//! # Reconciler
//!
//! Core reconciliation logic for `ManagedSecret` resources.
//!
//! The reconciler:
//! - Watches `ManagedSecret` declarations across all namespaces
//! - Resolves the declared backend through the provider registry
//! - Fetches every referenced value concurrently, with bounded retry
//! - Composes the fetched values through the template/merge engine
//! - Fingerprints the result and commits the output Secret only on change
//! - Updates resource status with the pass outcome
//!
//! ## Reconciliation Flow
//!
//! 1. Validate the declaration (terminal configuration errors stop here)
//! 2. Resolve the provider handle from the registry (cached per config)
//! 3. Fetch all references and selectors concurrently
//! 4. Compose: merge policy + template rendering
//! 5. Compare fingerprints and commit or skip
//! 6. Update status and requeue at the refresh interval

pub mod commit;
pub mod fetch;
pub mod finalize;
pub mod reconcile;
pub mod status;
pub mod types;
pub mod validation;

// Re-export public API
pub use commit::{decide, CommitOutcome, SyncDecision};
pub use fetch::fetch_all;
pub use finalize::should_delete_output;
pub use reconcile::{error_policy, reconcile};
pub use types::{BackoffState, PassPhase, Reconciler, ReconcilerError, SyncState};
pub use validation::{
    parse_kubernetes_duration, validate_capabilities, validate_duration_interval,
    validate_managed_secret,
};
