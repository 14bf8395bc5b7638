//! # Comparing & Committing
//!
//! The `Comparing` and `Committing` states of a pass.
//!
//! The fingerprint of the composed output is compared against the
//! fingerprint annotation on the live output Secret - the durable half of
//! the sync state. On a match the pass skips without any observable
//! mutation of the output object. On a difference (or when no output
//! exists) the data, fingerprint annotation, and sync-time annotation are
//! written in a single create/replace call, so a crash can never separate
//! the output from its recorded state: re-running compare-and-commit with
//! the same composed value is idempotent.
//!
//! A 409 from the API server means something else touched the output
//! Secret. The commit re-runs the comparison against fresh state exactly
//! once; a second conflict surfaces as `CommitConflict`.

use crate::constants;
use crate::controller::reconciler::types::ReconcilerError;
use crate::crd::ManagedSecret;
use crate::template::value_to_string;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, DeleteParams, ObjectMeta, PostParams};
use kube::{Client, ResourceExt};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Outcome of the Comparing state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDecision {
    /// Content changed (or no prior state): write the output
    Commit,
    /// Content unchanged: perform no write
    Skip,
}

/// Decide whether a composed output needs committing.
/// Pure comparison - this is what makes re-reconciling unchanged inputs
/// produce zero writes.
#[must_use]
pub fn decide(previous: Option<&str>, computed: &str) -> SyncDecision {
    match previous {
        Some(existing) if existing == computed => SyncDecision::Skip,
        _ => SyncDecision::Commit,
    }
}

/// Result of one compare-and-commit cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    Skipped,
}

/// Compare the composed output against live state and commit if needed.
///
/// `force` bypasses the comparison (manual re-sync); the write is still the
/// same idempotent apply of the composed content.
///
/// # Errors
///
/// [`ReconcilerError::CommitConflict`] when the output keeps being modified
/// concurrently; [`ReconcilerError::Kube`] for other API failures.
pub async fn commit_output(
    client: &Client,
    resource: &ManagedSecret,
    composed: &BTreeMap<String, Value>,
    fingerprint: &str,
    force: bool,
) -> Result<CommitOutcome, ReconcilerError> {
    let namespace = resource
        .namespace()
        .unwrap_or_else(|| "default".to_string());
    let api: Api<Secret> = Api::namespaced(client.clone(), &namespace);
    let target = &resource.spec.target.name;

    let owner = format!("{namespace}/{}", resource.name_any());

    let mut attempts = 0;
    loop {
        attempts += 1;

        let existing = api.get_opt(target).await?;

        // An output identity is owned by exactly one declaration; writing
        // over another declaration's output would be a silent race
        if let Some(current_owner) = existing
            .as_ref()
            .and_then(|secret| secret.metadata.annotations.as_ref())
            .and_then(|annotations| annotations.get(constants::OWNER_ANNOTATION))
        {
            if current_owner != &owner {
                return Err(ReconcilerError::Config(format!(
                    "output secret '{namespace}/{target}' is owned by declaration '{current_owner}'"
                )));
            }
        }

        let previous = existing
            .as_ref()
            .and_then(|secret| secret.metadata.annotations.as_ref())
            .and_then(|annotations| annotations.get(constants::FINGERPRINT_ANNOTATION))
            .map(String::as_str);

        if !force && decide(previous, fingerprint) == SyncDecision::Skip {
            debug!(
                "Output secret '{namespace}/{target}' already at fingerprint {fingerprint}, skipping write"
            );
            return Ok(CommitOutcome::Skipped);
        }

        let output = build_output_secret(
            resource,
            composed,
            fingerprint,
            existing
                .as_ref()
                .and_then(|secret| secret.metadata.resource_version.clone()),
        );

        // Carrying the read resourceVersion into the write turns concurrent
        // modifications into a 409 instead of a blind overwrite
        let written = match &existing {
            Some(_) => api.replace(target, &PostParams::default(), &output).await,
            None => api.create(&PostParams::default(), &output).await,
        };

        match written {
            Ok(_) => {
                info!("Committed output secret '{namespace}/{target}' at fingerprint {fingerprint}");
                return Ok(CommitOutcome::Committed);
            }
            Err(kube::Error::Api(response)) if response.code == 409 => {
                if attempts >= 2 {
                    return Err(ReconcilerError::CommitConflict);
                }
                debug!(
                    "Output secret '{namespace}/{target}' modified concurrently, re-running comparison"
                );
                // Loop re-reads fresh state and compares again
            }
            Err(error) => return Err(error.into()),
        }
    }
}

/// Build the output Secret: composed data plus the sync-state annotations,
/// all in one object so the write is atomic.
fn build_output_secret(
    resource: &ManagedSecret,
    composed: &BTreeMap<String, Value>,
    fingerprint: &str,
    resource_version: Option<String>,
) -> Secret {
    let mut labels = resource.spec.target.labels.clone();
    labels.insert(
        constants::MANAGED_BY_LABEL.to_string(),
        constants::CONTROLLER_NAME.to_string(),
    );

    let mut annotations = BTreeMap::new();
    annotations.insert(
        constants::FINGERPRINT_ANNOTATION.to_string(),
        fingerprint.to_string(),
    );
    annotations.insert(
        constants::LAST_SYNC_ANNOTATION.to_string(),
        chrono::Utc::now().to_rfc3339(),
    );
    annotations.insert(
        constants::OWNER_ANNOTATION.to_string(),
        format!(
            "{}/{}",
            resource
                .namespace()
                .unwrap_or_else(|| "default".to_string()),
            resource.name_any()
        ),
    );

    let string_data: BTreeMap<String, String> = composed
        .iter()
        .map(|(key, value)| (key.clone(), value_to_string(value)))
        .collect();

    Secret {
        metadata: ObjectMeta {
            name: Some(resource.spec.target.name.clone()),
            namespace: resource.namespace(),
            labels: Some(labels),
            annotations: Some(annotations),
            resource_version,
            ..ObjectMeta::default()
        },
        string_data: Some(string_data),
        type_: resource.spec.target.secret_type.clone(),
        ..Secret::default()
    }
}

/// Delete the output Secret. Absent is success - deletion is idempotent.
///
/// # Errors
///
/// Returns [`ReconcilerError::Kube`] for API failures other than 404.
pub async fn delete_output(client: &Client, resource: &ManagedSecret) -> Result<(), ReconcilerError> {
    let namespace = resource
        .namespace()
        .unwrap_or_else(|| "default".to_string());
    let api: Api<Secret> = Api::namespaced(client.clone(), &namespace);
    match api
        .delete(&resource.spec.target.name, &DeleteParams::default())
        .await
    {
        Ok(_) => {
            info!(
                "Deleted output secret '{namespace}/{}'",
                resource.spec.target.name
            );
            Ok(())
        }
        Err(kube::Error::Api(response)) if response.code == 404 => Ok(()),
        Err(error) => Err(error.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decide_skips_on_matching_fingerprint() {
        assert_eq!(decide(Some("abc"), "abc"), SyncDecision::Skip);
    }

    #[test]
    fn test_decide_commits_on_difference_or_absence() {
        assert_eq!(decide(Some("abc"), "def"), SyncDecision::Commit);
        assert_eq!(decide(None, "abc"), SyncDecision::Commit);
    }
}
