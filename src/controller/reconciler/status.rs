//! # Status Updates
//!
//! Patches the ManagedSecret status subresource with the outcome of each
//! pass. Updates are skipped when nothing changed to avoid generating
//! needless watch events.

use crate::controller::reconciler::types::{Reconciler, ReconcilerError};
use crate::controller::reconciler::validation::parse_kubernetes_duration;
use crate::crd::{Condition, ManagedSecret, ManagedSecretStatus};
use anyhow::Result;
use kube::api::{Api, Patch, PatchParams};
use kube::ResourceExt;
use tracing::debug;

/// Maximum length of an error message carried in status
const MAX_STATUS_MESSAGE_LEN: usize = 1024;

/// Patch the status to an intermediate phase (e.g. Pending at pass start)
///
/// # Errors
///
/// Fails when the status subresource patch is rejected.
pub async fn update_status_phase(
    ctx: &Reconciler,
    resource: &ManagedSecret,
    phase: &str,
    description: Option<&str>,
) -> Result<()> {
    let current = resource.status.as_ref();
    if current.and_then(|status| status.phase.as_deref()) == Some(phase)
        && current.and_then(|status| status.description.as_deref()) == description
    {
        debug!("Skipping status update - phase unchanged: {phase}");
        return Ok(());
    }

    let status = ManagedSecretStatus {
        phase: Some(phase.to_string()),
        description: description.map(String::from),
        observed_generation: resource.metadata.generation,
        ..carry_over(current)
    };
    patch_status(ctx, resource, status).await
}

/// Record a successful pass: phase Synced, Ready condition, sync times,
/// fingerprint echo, cleared error fields.
///
/// # Errors
///
/// Fails when the status subresource patch is rejected.
pub async fn update_status_synced(
    ctx: &Reconciler,
    resource: &ManagedSecret,
    fingerprint: &str,
    skipped: bool,
) -> Result<()> {
    let description = if skipped {
        "Backend content unchanged, no write performed".to_string()
    } else {
        format!("Committed output secret '{}'", resource.spec.target.name)
    };

    let now = chrono::Utc::now();
    let next_sync_time = parse_kubernetes_duration(&resource.spec.refresh_interval)
        .ok()
        .and_then(|interval| chrono::Duration::from_std(interval).ok())
        .and_then(|interval| now.checked_add_signed(interval))
        .map(|at| at.to_rfc3339());

    let status = ManagedSecretStatus {
        phase: Some("Synced".to_string()),
        description: Some(description.clone()),
        conditions: vec![Condition {
            r#type: "Ready".to_string(),
            status: "True".to_string(),
            last_transition_time: Some(now.to_rfc3339()),
            reason: Some("SyncSucceeded".to_string()),
            message: Some(description),
        }],
        observed_generation: resource.metadata.generation,
        last_sync_time: Some(now.to_rfc3339()),
        next_sync_time,
        last_error_kind: None,
        last_error_message: None,
        synced_fingerprint: Some(fingerprint.to_string()),
    };
    patch_status(ctx, resource, status).await
}

/// Record a failed pass: phase Failed, Ready False, error kind + message.
/// Prior sync times and fingerprint are preserved - a failed pass never
/// touches the last committed state.
///
/// # Errors
///
/// Fails when the status subresource patch is rejected.
pub async fn update_status_failed(
    ctx: &Reconciler,
    resource: &ManagedSecret,
    error: &ReconcilerError,
) -> Result<()> {
    let mut message = error.to_string();
    if message.len() > MAX_STATUS_MESSAGE_LEN {
        let mut cut = MAX_STATUS_MESSAGE_LEN;
        while !message.is_char_boundary(cut) {
            cut -= 1;
        }
        message.truncate(cut);
    }

    let now = chrono::Utc::now().to_rfc3339();
    let status = ManagedSecretStatus {
        phase: Some("Failed".to_string()),
        description: Some(format!("Sync failed: {}", error.kind())),
        conditions: vec![Condition {
            r#type: "Ready".to_string(),
            status: "False".to_string(),
            last_transition_time: Some(now),
            reason: Some(error.kind().to_string()),
            message: Some(message.clone()),
        }],
        observed_generation: resource.metadata.generation,
        last_error_kind: Some(error.kind().to_string()),
        last_error_message: Some(message),
        ..carry_over(resource.status.as_ref())
    };
    patch_status(ctx, resource, status).await
}

/// Fields a new status inherits from the previous one
fn carry_over(current: Option<&ManagedSecretStatus>) -> ManagedSecretStatus {
    ManagedSecretStatus {
        last_sync_time: current.and_then(|status| status.last_sync_time.clone()),
        next_sync_time: current.and_then(|status| status.next_sync_time.clone()),
        synced_fingerprint: current.and_then(|status| status.synced_fingerprint.clone()),
        conditions: current.map(|status| status.conditions.clone()).unwrap_or_default(),
        ..ManagedSecretStatus::default()
    }
}

async fn patch_status(
    ctx: &Reconciler,
    resource: &ManagedSecret,
    status: ManagedSecretStatus,
) -> Result<()> {
    let namespace = resource
        .namespace()
        .unwrap_or_else(|| "default".to_string());
    let api: Api<ManagedSecret> = Api::namespaced(ctx.client.clone(), &namespace);
    let patch = serde_json::json!({ "status": status });
    api.patch_status(
        &resource.name_any(),
        &PatchParams::apply(crate::constants::CONTROLLER_NAME),
        &Patch::Merge(patch),
    )
    .await?;
    Ok(())
}
