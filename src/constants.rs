//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// Default requeue interval applied by the error policy when a pass fails (seconds)
pub const DEFAULT_ERROR_REQUEUE_SECS: u64 = 60;

/// Default refresh interval when a ManagedSecret does not declare one
pub const DEFAULT_REFRESH_INTERVAL: &str = "1h";

/// Minimum refresh interval (seconds)
/// Shorter intervals may hit backend rate limits
pub const MIN_REFRESH_INTERVAL_SECS: u64 = 60;

/// Per-reference fetch timeout (seconds)
/// Timeouts are per-fetch so one slow backend cannot starve fetches to
/// healthy backends within the same pass
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;

/// Maximum fetch rounds for transient backend failures before a pass fails
pub const DEFAULT_FETCH_MAX_ATTEMPTS: u32 = 5;

/// Maximum total time spent fetching (including backoff sleeps) before a
/// pass fails (seconds)
pub const DEFAULT_FETCH_MAX_ELAPSED_SECS: u64 = 60;

/// Initial fetch retry backoff (milliseconds)
pub const DEFAULT_FETCH_BACKOFF_INITIAL_MS: u64 = 500;

/// Maximum fetch retry backoff interval (milliseconds)
pub const DEFAULT_FETCH_BACKOFF_MAX_MS: u64 = 8_000;

/// Initial error-policy backoff between failed passes (seconds)
pub const DEFAULT_PASS_BACKOFF_INITIAL_SECS: u64 = 5;

/// Maximum error-policy backoff between failed passes (seconds)
pub const DEFAULT_PASS_BACKOFF_MAX_SECS: u64 = 600;

/// Annotation on the output Secret holding the fingerprint of the content
/// last committed. This is the durable half of the sync state: it is written
/// in the same API call as the data itself.
pub const FINGERPRINT_ANNOTATION: &str = "secret-sync.microscaler.io/content-fingerprint";

/// Annotation on the output Secret holding the last successful sync time (RFC3339)
pub const LAST_SYNC_ANNOTATION: &str = "secret-sync.microscaler.io/last-sync-time";

/// Annotation on the output Secret naming the declaration that owns it
/// ("namespace/name"). Two declarations must never write the same output;
/// a mismatch here fails the pass instead of racing.
pub const OWNER_ANNOTATION: &str = "secret-sync.microscaler.io/owner";

/// Annotation on a ManagedSecret that forces an unconditional commit on the
/// next pass, bypassing the fingerprint comparison
pub const FORCE_SYNC_ANNOTATION: &str = "secret-sync.microscaler.io/force-sync";

/// Finalizer owned by this controller; drives the deletion policy
pub const FINALIZER: &str = "secret-sync.microscaler.io/finalizer";

/// Label applied to output Secrets
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Label value / field manager identity for API writes
pub const CONTROLLER_NAME: &str = "secret-sync-controller";
