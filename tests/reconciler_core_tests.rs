//! # Reconciler Core Unit Tests
//!
//! Cluster-free tests of the reconciliation core, driven by the fake
//! provider.
//!
//! These tests verify:
//! - Retry bounds for transient backend failures
//! - Partial-failure retries touching only still-outstanding references
//! - Terminal classification of auth/missing-reference errors
//! - Per-fetch timeouts mapping to transient failures
//! - Fetch ordering, composition, and fingerprint idempotence
//! - Capability validation against read-only providers
//! - Deletion policy decisions

use secret_sync_controller::controller::backoff::RetryPolicy;
use secret_sync_controller::controller::reconciler::{
    decide, fetch_all, should_delete_output, validate_capabilities, ReconcilerError,
    SyncDecision,
};
use secret_sync_controller::crd::{
    DeletionPolicy, LeafPolicy, ManagedSecret, ManagedSecretSpec, MergePolicy, ProviderRef,
    PushSpec, SecretReference, SelectorReference, TargetSpec,
};
use secret_sync_controller::fingerprint::fingerprint;
use secret_sync_controller::provider::fake::FakeClient;
use secret_sync_controller::provider::{FetchResult, ProviderError, SecretsClient, SecretsPusher};
use secret_sync_controller::template::compose;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn reference(key: &str) -> SecretReference {
    SecretReference {
        key: key.to_string(),
        version: None,
        property: None,
        target_key: None,
    }
}

fn spec_with(data: Vec<SecretReference>, data_from: Vec<SelectorReference>) -> ManagedSecretSpec {
    ManagedSecretSpec {
        provider_ref: ProviderRef {
            name: "fake".to_string(),
            config: None,
        },
        data,
        data_from,
        template: None,
        merge_policy: MergePolicy::Replace,
        nested_leaf_policy: LeafPolicy::Replace,
        target: TargetSpec {
            name: "output".to_string(),
            labels: Default::default(),
            secret_type: None,
        },
        refresh_interval: "1h".to_string(),
        deletion_policy: DeletionPolicy::Retain,
        push: None,
    }
}

/// Retry policy with millisecond backoffs so tests stay fast
fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        max_elapsed: Duration::from_secs(5),
        initial_interval: Duration::from_millis(1),
        max_interval: Duration::from_millis(2),
    }
}

const FETCH_TIMEOUT: Duration = Duration::from_secs(1);

#[tokio::test]
async fn test_always_unavailable_backend_fails_after_max_attempts() {
    let fake = Arc::new(FakeClient::new());
    fake.insert("down", json!("unreachable"));
    for _ in 0..10 {
        fake.enqueue_failure("down", ProviderError::Unavailable("backend down".into()));
    }
    let client: Arc<dyn SecretsClient> = Arc::clone(&fake) as Arc<dyn SecretsClient>;

    let spec = spec_with(vec![reference("down")], Vec::new());
    let err = fetch_all(&client, &spec, &fast_retry(3), FETCH_TIMEOUT)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "Unavailable");
    // Exactly the configured number of rounds, never retried indefinitely
    assert_eq!(fake.fetch_count("down"), 3);
}

#[tokio::test]
async fn test_partial_failure_retries_only_outstanding_references() {
    let fake = Arc::new(FakeClient::new());
    fake.insert("flaky", json!("eventually"));
    fake.insert("steady", json!("always"));
    fake.enqueue_failure("flaky", ProviderError::Unavailable("blip".into()));
    let client: Arc<dyn SecretsClient> = Arc::clone(&fake) as Arc<dyn SecretsClient>;

    let spec = spec_with(vec![reference("flaky"), reference("steady")], Vec::new());
    let sources = fetch_all(&client, &spec, &fast_retry(5), FETCH_TIMEOUT)
        .await
        .unwrap();

    assert_eq!(sources.len(), 2);
    // The reference that succeeded in round one is not fetched again
    assert_eq!(fake.fetch_count("flaky"), 2);
    assert_eq!(fake.fetch_count("steady"), 1);
}

#[tokio::test]
async fn test_unauthorized_is_terminal_without_retry() {
    let fake = Arc::new(FakeClient::new());
    fake.insert("locked", json!("nope"));
    fake.enqueue_failure("locked", ProviderError::Unauthorized("token expired".into()));
    let client: Arc<dyn SecretsClient> = Arc::clone(&fake) as Arc<dyn SecretsClient>;

    let spec = spec_with(vec![reference("locked")], Vec::new());
    let err = fetch_all(&client, &spec, &fast_retry(5), FETCH_TIMEOUT)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "Unauthorized");
    assert_eq!(fake.fetch_count("locked"), 1);
}

#[tokio::test]
async fn test_missing_reference_is_terminal() {
    let fake = Arc::new(FakeClient::new());
    let client: Arc<dyn SecretsClient> = Arc::clone(&fake) as Arc<dyn SecretsClient>;

    let spec = spec_with(vec![reference("absent")], Vec::new());
    let err = fetch_all(&client, &spec, &fast_retry(5), FETCH_TIMEOUT)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "NotFound");
    assert_eq!(fake.fetch_count("absent"), 1);
}

/// Backend that never answers within a reasonable fetch timeout
#[derive(Debug)]
struct SlowClient;

#[async_trait::async_trait]
impl SecretsClient for SlowClient {
    async fn fetch(&self, reference: &SecretReference) -> Result<FetchResult, ProviderError> {
        tokio::time::sleep(Duration::from_millis(250)).await;
        Ok(FetchResult {
            key: reference.key.clone(),
            value: json!("late"),
            version: None,
        })
    }
}

#[tokio::test]
async fn test_slow_fetch_times_out_as_unavailable() {
    let client: Arc<dyn SecretsClient> = Arc::new(SlowClient);

    let spec = spec_with(vec![reference("slow")], Vec::new());
    let err = fetch_all(&client, &spec, &fast_retry(2), Duration::from_millis(10))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "Unavailable");
    assert!(err.to_string().contains("timed out"));
}

#[tokio::test]
async fn test_max_elapsed_bounds_the_retry_loop() {
    let fake = Arc::new(FakeClient::new());
    for _ in 0..100 {
        fake.enqueue_failure("down", ProviderError::Unavailable("still down".into()));
    }
    let client: Arc<dyn SecretsClient> = Arc::clone(&fake) as Arc<dyn SecretsClient>;

    let policy = RetryPolicy {
        max_attempts: 100,
        max_elapsed: Duration::ZERO,
        initial_interval: Duration::from_millis(1),
        max_interval: Duration::from_millis(2),
    };
    let spec = spec_with(vec![reference("down")], Vec::new());
    let err = fetch_all(&client, &spec, &policy, FETCH_TIMEOUT)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "Unavailable");
    // Elapsed bound trips after the first round
    assert_eq!(fake.fetch_count("down"), 1);
}

#[tokio::test]
async fn test_explicit_data_overrides_selector_results() {
    let fake = Arc::new(FakeClient::new());
    fake.insert("app/user", json!("from-selector"));
    fake.insert("app/password", json!("hunter2"));
    let client: Arc<dyn SecretsClient> = Arc::clone(&fake) as Arc<dyn SecretsClient>;

    let mut explicit = reference("override/user");
    explicit.target_key = Some("user".to_string());
    fake.insert("override/user", json!("from-data"));

    let spec = spec_with(
        vec![explicit],
        vec![SelectorReference {
            prefix: "app/".to_string(),
            strip_prefix: true,
        }],
    );
    let sources = fetch_all(&client, &spec, &fast_retry(3), FETCH_TIMEOUT)
        .await
        .unwrap();
    let composed = compose(&sources, None, MergePolicy::Replace, LeafPolicy::Replace).unwrap();

    // Selector contributed both keys; the explicit reference wins on 'user'
    assert_eq!(composed["password"], json!("hunter2"));
    assert_eq!(composed["user"], json!("from-data"));
}

#[tokio::test]
async fn test_unchanged_inputs_fingerprint_identically_and_skip() {
    let fake = Arc::new(FakeClient::new());
    fake.insert("app/token", json!("s3cr3t"));
    let client: Arc<dyn SecretsClient> = Arc::clone(&fake) as Arc<dyn SecretsClient>;

    let spec = spec_with(vec![reference("app/token")], Vec::new());

    let first = fetch_all(&client, &spec, &fast_retry(3), FETCH_TIMEOUT)
        .await
        .unwrap();
    let second = fetch_all(&client, &spec, &fast_retry(3), FETCH_TIMEOUT)
        .await
        .unwrap();

    let composed_first =
        compose(&first, None, MergePolicy::Replace, LeafPolicy::Replace).unwrap();
    let composed_second =
        compose(&second, None, MergePolicy::Replace, LeafPolicy::Replace).unwrap();

    let digest_first = fingerprint(&composed_first).unwrap();
    let digest_second = fingerprint(&composed_second).unwrap();
    assert_eq!(digest_first, digest_second);

    // First pass commits, second pass is skipped
    assert_eq!(decide(None, &digest_first), SyncDecision::Commit);
    assert_eq!(
        decide(Some(digest_first.as_str()), &digest_second),
        SyncDecision::Skip
    );
}

#[tokio::test]
async fn test_changed_backend_value_changes_the_decision() {
    let fake = Arc::new(FakeClient::new());
    fake.insert("app/token", json!("v1"));
    let client: Arc<dyn SecretsClient> = Arc::clone(&fake) as Arc<dyn SecretsClient>;
    let spec = spec_with(vec![reference("app/token")], Vec::new());

    let before = fetch_all(&client, &spec, &fast_retry(3), FETCH_TIMEOUT)
        .await
        .unwrap();
    let digest_before = fingerprint(
        &compose(&before, None, MergePolicy::Replace, LeafPolicy::Replace).unwrap(),
    )
    .unwrap();

    fake.insert("app/token", json!("v2"));
    let after = fetch_all(&client, &spec, &fast_retry(3), FETCH_TIMEOUT)
        .await
        .unwrap();
    let digest_after = fingerprint(
        &compose(&after, None, MergePolicy::Replace, LeafPolicy::Replace).unwrap(),
    )
    .unwrap();

    assert_ne!(digest_before, digest_after);
    assert_eq!(
        decide(Some(digest_before.as_str()), &digest_after),
        SyncDecision::Commit
    );
}

/// Read-only view over the fake backend: no pusher, no selector support
#[derive(Debug)]
struct ReadOnlyClient(FakeClient);

#[async_trait::async_trait]
impl SecretsClient for ReadOnlyClient {
    async fn fetch(&self, reference: &SecretReference) -> Result<FetchResult, ProviderError> {
        self.0.fetch(reference).await
    }
}

#[tokio::test]
async fn test_push_against_read_only_provider_is_a_config_error() {
    let mut spec = spec_with(vec![reference("app/token")], Vec::new());
    spec.push = Some(PushSpec {
        key: "mirror/app-token".to_string(),
    });
    let resource = ManagedSecret::new("app-token", spec);

    let client = ReadOnlyClient(FakeClient::new());
    let err = validate_capabilities(&resource, &client).unwrap_err();
    assert!(matches!(err, ReconcilerError::Config(_)));
    assert_eq!(err.kind(), "InvalidDeclaration");
    assert!(err.to_string().contains("read-only"));
}

#[tokio::test]
async fn test_selector_against_unsupporting_provider_is_a_config_error() {
    let spec = spec_with(
        Vec::new(),
        vec![SelectorReference {
            prefix: "app/".to_string(),
            strip_prefix: false,
        }],
    );
    let resource = ManagedSecret::new("app-config", spec);

    let client = ReadOnlyClient(FakeClient::new());
    let err = validate_capabilities(&resource, &client).unwrap_err();
    assert_eq!(err.kind(), "InvalidDeclaration");
    assert!(err.to_string().contains("selector"));
}

#[tokio::test]
async fn test_capable_provider_passes_capability_validation() {
    let mut spec = spec_with(
        vec![reference("app/token")],
        vec![SelectorReference {
            prefix: "app/".to_string(),
            strip_prefix: false,
        }],
    );
    spec.push = Some(PushSpec {
        key: "mirror/app-token".to_string(),
    });
    let resource = ManagedSecret::new("app-token", spec);

    let client = FakeClient::new();
    assert!(validate_capabilities(&resource, &client).is_ok());
}

#[test]
fn test_deletion_policy_decision() {
    // "retain": removing a declaration leaves its output intact
    assert!(!should_delete_output(DeletionPolicy::Retain));
    // "delete": removing it deletes the output object
    assert!(should_delete_output(DeletionPolicy::Delete));
}

#[tokio::test]
async fn test_provider_side_delete_runs_for_push_declarations() {
    let fake = FakeClient::new();
    fake.insert("mirror/app-token", json!("pushed"));

    // The finalization path delegates to the pusher's idempotent delete
    let pusher = fake.pusher().expect("fake provider is bidirectional");
    pusher.delete("mirror/app-token").await.unwrap();
    assert!(!fake.contains("mirror/app-token"));
    pusher.delete("mirror/app-token").await.unwrap();
}
