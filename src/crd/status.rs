//! # ManagedSecret Status
//!
//! Status types for tracking synchronization state and conditions.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Status of the ManagedSecret resource
///
/// Tracks the outcome of the latest reconciliation pass.
#[derive(Debug, Clone, Deserialize, Serialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManagedSecretStatus {
    /// Current state of the declaration
    /// Values: Pending, Synced, Failed
    #[serde(default)]
    pub phase: Option<String>,
    /// Human-readable description of the current state
    #[serde(default)]
    pub description: Option<String>,
    /// Conditions represent the latest available observations
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Observed generation
    #[serde(default)]
    pub observed_generation: Option<i64>,
    /// Last successful sync time (RFC3339)
    #[serde(default)]
    pub last_sync_time: Option<String>,
    /// Next scheduled refresh time (RFC3339)
    #[serde(default)]
    pub next_sync_time: Option<String>,
    /// Error kind of the last failed pass (e.g. "Unavailable", "MergeConflict")
    /// Cleared on success
    #[serde(default)]
    pub last_error_kind: Option<String>,
    /// Error message of the last failed pass. Cleared on success.
    #[serde(default)]
    pub last_error_message: Option<String>,
    /// Fingerprint of the content last committed to the output Secret.
    /// Informational echo of the durable annotation on the output object.
    #[serde(default)]
    pub synced_fingerprint: Option<String>,
}

/// Condition represents a status condition for the resource
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    pub r#type: String,
    /// Status of condition (True, False, Unknown)
    pub status: String,
    /// Last transition time
    #[serde(default)]
    pub last_transition_time: Option<String>,
    /// Reason for condition
    #[serde(default)]
    pub reason: Option<String>,
    /// Message describing condition
    #[serde(default)]
    pub message: Option<String>,
}
