//! # Deletion & Finalizers
//!
//! Declaration lifecycle is finalizer-driven so the deletion policy is
//! honored exactly: `Retain` leaves the output Secret behind untouched,
//! `Delete` removes it (and the backend copy for push declarations) before
//! the declaration is allowed to disappear. Output Secrets carry no owner
//! reference - garbage collection would break `Retain`.

use crate::constants;
use crate::controller::reconciler::types::{Reconciler, ReconcilerError};
use crate::crd::{DeletionPolicy, ManagedSecret};
use crate::provider::{SecretsClient, SecretsPusher};
use kube::api::{Api, Patch, PatchParams};
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::sync::Arc;
use tracing::{info, warn};

/// Whether the deletion policy calls for removing the output Secret
#[must_use]
pub fn should_delete_output(policy: DeletionPolicy) -> bool {
    matches!(policy, DeletionPolicy::Delete)
}

/// Add our finalizer to a live declaration if it is not present yet.
///
/// # Errors
///
/// Returns [`ReconcilerError::Kube`] when the metadata patch fails.
pub async fn ensure_finalizer(
    ctx: &Arc<Reconciler>,
    resource: &ManagedSecret,
) -> Result<(), ReconcilerError> {
    if resource
        .finalizers()
        .iter()
        .any(|finalizer| finalizer == constants::FINALIZER)
    {
        return Ok(());
    }

    let namespace = resource
        .namespace()
        .unwrap_or_else(|| "default".to_string());
    let api: Api<ManagedSecret> = Api::namespaced(ctx.client.clone(), &namespace);

    let mut finalizers = resource.finalizers().to_vec();
    finalizers.push(constants::FINALIZER.to_string());
    let patch = serde_json::json!({"metadata": {"finalizers": finalizers}});
    api.patch(
        &resource.name_any(),
        &PatchParams::default(),
        &Patch::Merge(patch),
    )
    .await?;
    Ok(())
}

/// Handle a declaration marked for deletion.
///
/// Runs the deletion policy, discards in-memory sync state, then releases
/// the finalizer. Transient backend failures during provider-side deletes
/// surface as errors so the error policy retries the finalization.
///
/// # Errors
///
/// Returns [`ReconcilerError`] when the output delete, provider-side delete,
/// or finalizer release fails.
pub async fn finalize(
    ctx: &Arc<Reconciler>,
    resource: &ManagedSecret,
) -> Result<Action, ReconcilerError> {
    let name = resource.name_any();
    let namespace = resource
        .namespace()
        .unwrap_or_else(|| "default".to_string());

    if !resource
        .finalizers()
        .iter()
        .any(|finalizer| finalizer == constants::FINALIZER)
    {
        // Nothing left for us to do; the API server finishes the delete
        return Ok(Action::await_change());
    }

    info!(
        "Finalizing ManagedSecret '{namespace}/{name}' (deletion policy: {:?})",
        resource.spec.deletion_policy
    );

    if should_delete_output(resource.spec.deletion_policy) {
        super::commit::delete_output(&ctx.client, resource).await?;

        // Push declarations also own their backend copy
        if let Some(push) = &resource.spec.push {
            let handle = ctx.handles.client_for(&resource.spec.provider_ref).await?;
            match handle.pusher() {
                Some(pusher) => pusher.delete(&push.key).await.map_err(|error| {
                    warn!(
                        "Provider-side delete of '{}' failed during finalization: {error}",
                        push.key
                    );
                    ReconcilerError::Provider(error)
                })?,
                None => {
                    // Provider lost push capability since the declaration was
                    // admitted; there is nothing to delete remotely
                    warn!(
                        "Provider '{}' is read-only, skipping provider-side delete of '{}'",
                        resource.spec.provider_ref.name, push.key
                    );
                }
            }
        }
    } else {
        info!("Retaining output secret '{namespace}/{}'", resource.spec.target.name);
    }

    ctx.forget(resource);
    release_finalizer(ctx, resource).await?;
    Ok(Action::await_change())
}

/// Remove our finalizer, letting the API server complete the deletion
async fn release_finalizer(
    ctx: &Arc<Reconciler>,
    resource: &ManagedSecret,
) -> Result<(), ReconcilerError> {
    let namespace = resource
        .namespace()
        .unwrap_or_else(|| "default".to_string());
    let api: Api<ManagedSecret> = Api::namespaced(ctx.client.clone(), &namespace);

    let remaining: Vec<String> = resource
        .finalizers()
        .iter()
        .filter(|finalizer| finalizer.as_str() != constants::FINALIZER)
        .cloned()
        .collect();
    let patch = serde_json::json!({"metadata": {"finalizers": remaining}});
    match api
        .patch(
            &resource.name_any(),
            &PatchParams::default(),
            &Patch::Merge(patch),
        )
        .await
    {
        Ok(_) => Ok(()),
        // Already gone: the deletion completed without us
        Err(kube::Error::Api(response)) if response.code == 404 => Ok(()),
        Err(error) => Err(error.into()),
    }
}
