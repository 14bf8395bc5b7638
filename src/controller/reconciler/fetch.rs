//! # Fetching
//!
//! The `Fetching` state of a pass: every reference in the declaration is
//! fetched concurrently with a per-reference timeout, and transient failures
//! are retried with exponential backoff - re-fetching only the references
//! that are still outstanding, never the whole set.
//!
//! Terminal provider errors (`NotFound`, `Unauthorized`, `InvalidConfig`)
//! abort the pass immediately. A pass dropped mid-fetch (shutdown, deletion)
//! cancels its in-flight provider calls and leaves no state behind.

use crate::controller::backoff::RetryPolicy;
use crate::controller::reconciler::types::ReconcilerError;
use crate::crd::{ManagedSecretSpec, SecretReference, SelectorReference};
use crate::observability;
use crate::provider::{ProviderError, SecretsClient};
use crate::template::{FetchedSource, SourceOrigin};
use futures::future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

/// One unit of fetch work: an explicit reference or a selector
enum FetchItem<'a> {
    Reference(&'a SecretReference),
    Selector(&'a SelectorReference),
}

impl FetchItem<'_> {
    fn describe(&self) -> &str {
        match self {
            FetchItem::Reference(reference) => &reference.key,
            FetchItem::Selector(selector) => &selector.prefix,
        }
    }
}

/// Fetch everything a declaration references.
///
/// Selector entries are fetched before explicit `data` entries so that
/// explicit references win on key collisions downstream. The returned
/// sources preserve declaration order regardless of fetch completion order.
///
/// # Errors
///
/// Terminal provider errors are returned immediately; `Unavailable` errors
/// are returned only once the retry policy (attempts or elapsed time) is
/// exhausted.
pub async fn fetch_all(
    client: &Arc<dyn SecretsClient>,
    spec: &ManagedSecretSpec,
    retry: &RetryPolicy,
    fetch_timeout: Duration,
) -> Result<Vec<FetchedSource>, ReconcilerError> {
    let items: Vec<FetchItem<'_>> = spec
        .data_from
        .iter()
        .map(FetchItem::Selector)
        .chain(spec.data.iter().map(FetchItem::Reference))
        .collect();

    let mut slots: Vec<Option<Vec<FetchedSource>>> = (0..items.len()).map(|_| None).collect();
    let mut outstanding: Vec<usize> = (0..items.len()).collect();
    let mut backoff = retry.backoff();
    let started = Instant::now();
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        let round = outstanding.iter().map(|&index| {
            let item = &items[index];
            async move { (index, fetch_item(client.as_ref(), item, fetch_timeout).await) }
        });
        let results = future::join_all(round).await;

        let mut transient: Vec<(usize, ProviderError)> = Vec::new();
        for (index, result) in results {
            match result {
                Ok(sources) => slots[index] = Some(sources),
                Err(error) if error.is_transient() => transient.push((index, error)),
                // Unauthorized / NotFound / InvalidConfig end the pass now
                Err(error) => return Err(error.into()),
            }
        }
        if transient.is_empty() {
            break;
        }

        if attempt >= retry.max_attempts || started.elapsed() >= retry.max_elapsed {
            let failed: Vec<&str> = transient
                .iter()
                .map(|(index, _)| items[*index].describe())
                .collect();
            warn!(
                "Giving up on {} unavailable reference(s) after {} attempt(s): {:?}",
                transient.len(),
                attempt,
                failed
            );
            let (_, error) = transient.swap_remove(0);
            return Err(error.into());
        }

        outstanding = transient.iter().map(|(index, _)| *index).collect();
        let delay = backoff.next_backoff();
        warn!(
            "{} reference(s) unavailable, retrying in {:?} (attempt {}/{})",
            outstanding.len(),
            delay,
            attempt,
            retry.max_attempts
        );
        tokio::time::sleep(delay).await;
    }

    Ok(slots.into_iter().flatten().flatten().collect())
}

/// Fetch one item with the per-fetch timeout applied.
/// A timeout is a transient failure: the backend may simply be slow.
async fn fetch_item(
    client: &dyn SecretsClient,
    item: &FetchItem<'_>,
    fetch_timeout: Duration,
) -> Result<Vec<FetchedSource>, ProviderError> {
    observability::metrics::increment_provider_fetches();
    match item {
        FetchItem::Reference(reference) => {
            let result = tokio::time::timeout(fetch_timeout, client.fetch(reference))
                .await
                .map_err(|_| {
                    ProviderError::Unavailable(format!(
                        "fetch of '{}' timed out after {fetch_timeout:?}",
                        reference.key
                    ))
                })??;
            Ok(vec![FetchedSource {
                origin: SourceOrigin::Reference((*reference).clone()),
                result,
            }])
        }
        FetchItem::Selector(selector) => {
            let results = tokio::time::timeout(fetch_timeout, client.fetch_by_prefix(&selector.prefix))
                .await
                .map_err(|_| {
                    ProviderError::Unavailable(format!(
                        "selector fetch of prefix '{}' timed out after {fetch_timeout:?}",
                        selector.prefix
                    ))
                })??;
            Ok(results
                .into_iter()
                .map(|result| FetchedSource {
                    origin: SourceOrigin::Selector((*selector).clone()),
                    result,
                })
                .collect())
        }
    }
}
