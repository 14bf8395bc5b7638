//! # ManagedSecret Spec
//!
//! Desired-state declaration: where secret material lives, how it is
//! composed, and what output Secret it materializes as.

use crate::crd::status::ManagedSecretStatus;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// ManagedSecret Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: secret-sync.microscaler.io/v1
/// kind: ManagedSecret
/// metadata:
///   name: payments-db
///   namespace: payments
/// spec:
///   providerRef:
///     name: kubernetes
///     config:
///       namespace: vault-mirror
///   data:
///     - key: payments/db-credentials
///       property: password
///       targetKey: DB_PASSWORD
///   target:
///     name: payments-db
///   refreshInterval: 1h
/// ```
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "secret-sync.microscaler.io",
    version = "v1",
    kind = "ManagedSecret",
    namespaced,
    status = "ManagedSecretStatus",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#,
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ManagedSecretSpec {
    /// Which registered provider serves this declaration, plus its
    /// backend-specific configuration
    pub provider_ref: ProviderRef,
    /// Individual secret references to fetch
    #[serde(default)]
    pub data: Vec<SecretReference>,
    /// Bulk references resolved via provider selector support.
    /// Explicit `data` entries take precedence over selector results on
    /// key collisions (selector results are merged first).
    #[serde(default)]
    pub data_from: Vec<SelectorReference>,
    /// Optional templated output entries rendered from the fetched values
    #[serde(default)]
    pub template: Option<TemplateSpec>,
    /// How key collisions between fetched values are resolved
    #[serde(default)]
    pub merge_policy: MergePolicy,
    /// How leaf collisions are resolved inside `mergeNested` deep merges
    #[serde(default)]
    pub nested_leaf_policy: LeafPolicy,
    /// Output Secret identity
    pub target: TargetSpec,
    /// How often the backend is re-queried for changes
    /// Kubernetes duration format: "30s", "5m", "1h", "1d"
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: String,
    /// What happens to the output Secret when this declaration is deleted
    #[serde(default)]
    pub deletion_policy: DeletionPolicy,
    /// Optionally write the composed output back to the backend.
    /// Requires a provider with push support; read-only providers reject
    /// this at validation time.
    #[serde(default)]
    pub push: Option<PushSpec>,
}

/// Reference to a registered secret provider
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProviderRef {
    /// Registry id of the provider ("fake", "kubernetes", "webhook", ...)
    pub name: String,
    /// Backend-specific configuration, passed opaquely to the provider
    /// constructor. Editing this yields a fresh provider handle.
    #[serde(default)]
    pub config: Option<serde_json::Value>,
}

/// Identifies one piece of backend-held material.
/// Immutable once read from a declaration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretReference {
    /// Opaque backend key or path (e.g. "payments/db-credentials")
    pub key: String,
    /// Backend-assigned version to pin; latest when absent
    #[serde(default)]
    pub version: Option<String>,
    /// Sub-key to extract when the backend value is structured (JSON/YAML)
    #[serde(default)]
    pub property: Option<String>,
    /// Output key in the composed Secret; defaults to the property name or
    /// the last path segment of `key`
    #[serde(default)]
    pub target_key: Option<String>,
}

/// Bulk fetch of all backend keys under a prefix
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SelectorReference {
    /// Key prefix to enumerate at the backend
    pub prefix: String,
    /// Strip the prefix from fetched keys when forming output keys
    #[serde(default)]
    pub strip_prefix: bool,
}

/// Templated output entries.
///
/// Values are strings with `{{ key }}` placeholders resolved against the
/// flat view of all fetched values. Rendered entries override composed keys.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TemplateSpec {
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

/// Merge policy applied when multiple sources contribute the same output key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum MergePolicy {
    /// Last source wins, deterministic by declaration order
    #[default]
    Replace,
    /// Any collision with differing values is a hard failure
    ErrorOnOverlap,
    /// Structured values are deep-merged key by key; leaf collisions are
    /// governed by `nestedLeafPolicy`
    MergeNested,
}

/// Leaf collision behavior inside `mergeNested` deep merges.
///
/// Policy scope is deliberately explicit: the merge policy is global to the
/// declaration and the nested-leaf behavior is its own declared choice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum LeafPolicy {
    /// Later source wins on leaf collisions
    #[default]
    Replace,
    /// Leaf collisions with differing values are a hard failure
    Error,
}

/// Output Secret identity.
/// Unique within the declaration's namespace; two declarations must not
/// target the same name.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TargetSpec {
    /// Name of the output Secret (created in the declaration's namespace)
    pub name: String,
    /// Extra labels applied to the output Secret
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Secret type (e.g. "kubernetes.io/tls"); defaults to Opaque
    #[serde(default)]
    pub secret_type: Option<String>,
}

/// What happens to the output Secret when the declaration is removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum DeletionPolicy {
    /// Leave the output Secret in place; only sync state is discarded
    #[default]
    Retain,
    /// Delete the output Secret (and the backend copy for push declarations)
    Delete,
}

/// Write the composed output back to the backend under the given key
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PushSpec {
    /// Backend key the composed object is pushed to
    pub key: String,
}

fn default_refresh_interval() -> String {
    crate::constants::DEFAULT_REFRESH_INTERVAL.to_string()
}
