//! # Reconciliation Logic
//!
//! The state machine for one pass over a ManagedSecret declaration:
//! `Pending -> Fetching -> Composing -> Comparing -> {Committing | Skipped}
//! -> Done`, with `Failed` reachable from `Fetching`, `Composing`, and
//! `Committing`.
//!
//! The declaration is an immutable read for the duration of the pass. Errors
//! surface as a Failed status condition with kind and message, leaving the
//! previously committed output and sync state untouched. The kube-runtime
//! controller serializes passes per declaration and coalesces triggers, so
//! at most one pass is in flight per resource.

use crate::constants;
use crate::controller::reconciler::commit::{commit_output, CommitOutcome};
use crate::controller::reconciler::fetch::fetch_all;
use crate::controller::reconciler::finalize::{ensure_finalizer, finalize};
use crate::controller::reconciler::status::{
    update_status_failed, update_status_phase, update_status_synced,
};
use crate::controller::reconciler::types::{
    BackoffState, PassPhase, Reconciler, ReconcilerError,
};
use crate::controller::reconciler::validation::{
    parse_kubernetes_duration, validate_capabilities, validate_managed_secret,
};
use crate::crd::ManagedSecret;
use crate::fingerprint::fingerprint;
use crate::observability;
use crate::provider::{SecretsClient, SecretsPusher};
use crate::template::compose;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Main reconciliation function.
/// Errors are handled by `error_policy` - backoff lives in that layer so
/// failing resources never block watch or timer paths for healthy ones.
pub async fn reconcile(
    resource: Arc<ManagedSecret>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ReconcilerError> {
    let start = Instant::now();
    let name = resource.name_any();
    let namespace = resource
        .namespace()
        .unwrap_or_else(|| "default".to_string());

    let span = tracing::span!(
        tracing::Level::INFO,
        "reconcile",
        resource.name = %name,
        resource.namespace = %namespace,
        resource.kind = "ManagedSecret",
        resource.provider = %resource.spec.provider_ref.name
    );
    let _guard = span.enter();

    observability::metrics::increment_passes();

    // Deletion short-circuits the whole machine
    if resource.metadata.deletion_timestamp.is_some() {
        return finalize(&ctx, &resource).await;
    }

    info!("Reconciling ManagedSecret '{namespace}/{name}'");

    // Pending: the declaration itself must hold up before anything runs
    if let Err(e) = validate_managed_secret(&resource) {
        return Err(fail(&ctx, &resource, ReconcilerError::Config(e.to_string())).await);
    }

    ensure_finalizer(&ctx, &resource).await?;

    if let Err(e) = update_status_phase(&ctx, &resource, "Pending", Some("Sync started")).await {
        warn!("Failed to update status to Pending: {e}");
    }

    // Resolve the provider handle (cached per backend configuration)
    let handle = match ctx.handles.client_for(&resource.spec.provider_ref).await {
        Ok(handle) => handle,
        Err(e) => return Err(fail(&ctx, &resource, e.into()).await),
    };

    // Capability mismatches are configuration errors, caught before any fetch
    if let Err(e) = validate_capabilities(&resource, handle.as_ref()) {
        return Err(fail(&ctx, &resource, e).await);
    }

    // Fetching: concurrent per-reference fetches with bounded retry
    log_phase(&name, PassPhase::Fetching);
    let sources = match fetch_all(&handle, &resource.spec, &ctx.retry, ctx.fetch_timeout).await {
        Ok(sources) => sources,
        Err(e) => return Err(fail(&ctx, &resource, e).await),
    };

    // Composing: merge + template, terminal on conflict
    log_phase(&name, PassPhase::Composing);
    let composed = match compose(
        &sources,
        resource.spec.template.as_ref(),
        resource.spec.merge_policy,
        resource.spec.nested_leaf_policy,
    ) {
        Ok(composed) => composed,
        Err(e) => return Err(fail(&ctx, &resource, e.into()).await),
    };

    // Comparing: fingerprint against the durable state on the output object
    log_phase(&name, PassPhase::Comparing);
    let digest = match fingerprint(&composed) {
        Ok(digest) => digest,
        Err(e) => return Err(fail(&ctx, &resource, e.into()).await),
    };

    let force = resource
        .annotations()
        .contains_key(constants::FORCE_SYNC_ANNOTATION);
    let outcome = match commit_output(&ctx.client, &resource, &composed, &digest, force).await {
        Ok(outcome) => outcome,
        Err(e) => return Err(fail(&ctx, &resource, e).await),
    };

    let skipped = match outcome {
        CommitOutcome::Committed => {
            observability::metrics::increment_commits();

            // Push declarations mirror the committed output to the backend
            if let Some(push) = &resource.spec.push {
                if let Some(pusher) = handle.pusher() {
                    let payload = Value::Object(
                        composed
                            .iter()
                            .map(|(key, value)| (key.clone(), value.clone()))
                            .collect(),
                    );
                    if let Err(e) = pusher.push(&push.key, &payload).await {
                        return Err(fail(&ctx, &resource, e.into()).await);
                    }
                }
            }
            false
        }
        CommitOutcome::Skipped => {
            observability::metrics::increment_skips();
            log_phase(&name, PassPhase::Skipped);
            true
        }
    };

    // Sync state is recorded only after a successful commit path
    ctx.record_success(&resource, digest.clone());

    if let Err(e) = update_status_synced(&ctx, &resource, &digest, skipped).await {
        warn!("Failed to update status to Synced: {e}");
    }

    observability::metrics::observe_pass_duration(start.elapsed().as_secs_f64());
    log_phase(&name, PassPhase::Done);

    // Level-triggered refresh: requeue at the declared interval
    let refresh = parse_kubernetes_duration(&resource.spec.refresh_interval)
        .unwrap_or_else(|_| std::time::Duration::from_secs(constants::MIN_REFRESH_INTERVAL_SECS));
    Ok(Action::requeue(refresh))
}

/// Record a failed pass: status condition, metrics, error propagation
async fn fail(
    ctx: &Arc<Reconciler>,
    resource: &ManagedSecret,
    error: ReconcilerError,
) -> ReconcilerError {
    error!(
        "Reconciliation failed for '{}': {error}",
        resource.name_any()
    );
    observability::metrics::increment_pass_errors(error.kind());
    if let Err(status_error) = update_status_failed(ctx, resource, &error).await {
        warn!("Failed to update status to Failed: {status_error}");
    }
    error
}

fn log_phase(name: &str, phase: PassPhase) {
    tracing::debug!("ManagedSecret '{name}': entering {}", phase.as_str());
}

/// Handle reconciliation errors with per-resource exponential backoff.
///
/// Backoff state is tracked per resource so one failing declaration never
/// slows the others down; a later successful pass resets it.
pub fn error_policy(
    resource: Arc<ManagedSecret>,
    error: &ReconcilerError,
    ctx: Arc<Reconciler>,
) -> Action {
    let key = Reconciler::resource_key(&resource);

    let (delay, error_count) = match ctx.backoff_states.lock() {
        Ok(mut states) => {
            let state = states.entry(key.clone()).or_insert_with(BackoffState::new);
            state.increment_error();
            (state.backoff.next_backoff(), state.error_count)
        }
        Err(e) => {
            warn!("Failed to lock backoff states: {e}, using default requeue");
            (
                std::time::Duration::from_secs(constants::DEFAULT_ERROR_REQUEUE_SECS),
                0,
            )
        }
    };

    error!(
        "Reconciliation error for '{key}' ({}): {error:?} - requeue in {delay:?} (error count: {error_count})",
        error.kind()
    );
    Action::requeue(delay)
}
