use crate::config::MAX_RETRY;
use crate::error::{RegistryError, Result, UplinkError};
use crate::manifest::Manifest;
use crate::sync::freshness::{now_millis, should_fetch};
use crate::uplink::{FetchRequest, RemoteResponse, Uplink, UplinkSet};
use futures::future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Per-call sync parameters
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// When false no uplink is consulted and the sync is local-only
    pub uplinks_look: bool,
    /// Overrides the ETag stored for each uplink
    pub etag: Option<String>,
    /// Extra attempts per uplink; overrides the uplink's `retry`, capped at `MAX_RETRY`
    pub retry: Option<u32>,
    /// Per-attempt timeout override for every uplink
    pub timeout: Option<Duration>,
    /// Bounds the whole fan-out, including retries
    pub global_timeout: Option<Duration>,
    /// Ignore max-age and always ask the uplinks
    pub force_refresh: bool,
    /// Version or dist-tag the caller will look up after the merge
    pub version: Option<String>,
    pub cancel: CancellationToken,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            uplinks_look: true,
            etag: None,
            retry: None,
            timeout: None,
            global_timeout: None,
            force_refresh: false,
            version: None,
            cancel: CancellationToken::new(),
        }
    }
}

/// Result of consulting one uplink
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    Success {
        manifest: Manifest,
        etag: Option<String>,
        /// Unix milliseconds at which the response arrived
        fetched: i64,
    },
    NotModified,
    Failed(UplinkError),
}

impl SyncOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SyncOutcome::Success { .. })
    }

    pub fn error(&self) -> Option<&UplinkError> {
        match self {
            SyncOutcome::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// Outcome tagged with the uplink that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct UplinkOutcome {
    pub upname: String,
    pub outcome: SyncOutcome,
}

/// Consult every eligible uplink concurrently.
///
/// Returns one outcome per uplink in configuration order. A failing uplink never
/// cancels its siblings; only `options.cancel` aborts the fan-out, in which case
/// every in-flight fetch is dropped and `Cancelled` is returned.
pub async fn fetch_all(
    name: &str,
    uplinks: &UplinkSet,
    local: Option<&Manifest>,
    options: &SyncOptions,
) -> Result<Vec<UplinkOutcome>> {
    if !options.uplinks_look {
        tracing::debug!(package = %name, "Uplinks disabled for this request");
        return Ok(Vec::new());
    }
    if options.cancel.is_cancelled() {
        return Err(RegistryError::Cancelled);
    }

    let deadline = options.global_timeout.map(|d| Instant::now() + d);
    let mut outcomes: Vec<Option<SyncOutcome>> = vec![None; uplinks.len()];
    let mut handles = Vec::new();

    for (idx, uplink) in uplinks.iter().enumerate() {
        let last_fetched = local.and_then(|m| m.uplink_fetched(uplink.upname()));
        if !should_fetch(&uplink.config, last_fetched, options) {
            tracing::debug!(
                upname = %uplink.upname(),
                package = %name,
                last_fetched = ?last_fetched,
                "Cached uplink metadata still fresh, skipping fetch"
            );
            outcomes[idx] = Some(SyncOutcome::NotModified);
            continue;
        }

        if uplinks.is_offline(uplink).await {
            tracing::warn!(
                upname = %uplink.upname(),
                package = %name,
                "Uplink is offline after repeated failures, skipping"
            );
            outcomes[idx] = Some(SyncOutcome::Failed(UplinkError::Offline));
            continue;
        }

        let etag = options.etag.clone().or_else(|| {
            local
                .and_then(|m| m.uplink_etag(uplink.upname()))
                .map(|s| s.to_string())
        });
        let request = FetchRequest {
            etag,
            timeout: options.timeout,
        };
        let attempts = options
            .retry
            .map(|retry| retry.min(MAX_RETRY))
            .unwrap_or_else(|| uplink.config.retries())
            + 1;
        let uplink = uplink.clone();
        let package = name.to_string();

        let handle = tokio::spawn(async move {
            let fetch = fetch_with_retry(&uplink, &package, &request, attempts);
            match deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, fetch)
                    .await
                    .unwrap_or(SyncOutcome::Failed(UplinkError::Timeout)),
                None => fetch.await,
            }
        });
        handles.push((idx, handle));
    }

    let collected = {
        let joined = future::join_all(handles.iter_mut().map(|(_, handle)| handle));
        tokio::select! {
            results = joined => Some(results),
            _ = options.cancel.cancelled() => None,
        }
    };

    let Some(results) = collected else {
        for (_, handle) in &handles {
            handle.abort();
        }
        tracing::debug!(package = %name, "Sync cancelled, discarding partial outcomes");
        return Err(RegistryError::Cancelled);
    };

    for ((idx, _), result) in handles.iter().zip(results) {
        let outcome = result.unwrap_or_else(|e| {
            SyncOutcome::Failed(UplinkError::Transport(format!("fetch task failed: {}", e)))
        });
        let upname = uplinks
            .iter()
            .nth(*idx)
            .map(|u| u.upname().to_string())
            .unwrap_or_default();

        match &outcome {
            SyncOutcome::Failed(e) => {
                tracing::warn!(upname = %upname, package = %name, error = %e, "Uplink fetch failed");
                if e.counts_as_failure() {
                    uplinks.record_failure(&upname).await;
                }
            }
            _ => uplinks.record_success(&upname).await,
        }
        outcomes[*idx] = Some(outcome);
    }

    Ok(uplinks
        .iter()
        .zip(outcomes)
        .map(|(uplink, outcome)| UplinkOutcome {
            upname: uplink.upname().to_string(),
            outcome: outcome.unwrap_or(SyncOutcome::Failed(UplinkError::Cancelled)),
        })
        .collect())
}

/// One uplink, up to `attempts` tries. Only retryable failures are retried and
/// each try is bounded by the uplink timeout.
async fn fetch_with_retry(
    uplink: &Uplink,
    name: &str,
    request: &FetchRequest,
    attempts: u32,
) -> SyncOutcome {
    let per_attempt = request
        .timeout
        .unwrap_or_else(|| uplink.config.request_timeout());
    let mut attempt = 0;

    loop {
        attempt += 1;
        let started = Instant::now();
        let result = tokio::time::timeout(
            per_attempt,
            uplink.transport.fetch_remote_metadata(name, request),
        )
        .await
        .unwrap_or(Err(UplinkError::Timeout));

        match result {
            Ok(RemoteResponse::Modified { manifest, etag }) => {
                tracing::debug!(
                    upname = %uplink.upname(),
                    package = %name,
                    attempt,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Uplink fetch succeeded"
                );
                return SyncOutcome::Success {
                    manifest,
                    etag,
                    fetched: now_millis(),
                };
            }
            Ok(RemoteResponse::NotModified) => return SyncOutcome::NotModified,
            Err(e) if e.is_retryable() && attempt < attempts => {
                tracing::debug!(
                    upname = %uplink.upname(),
                    package = %name,
                    attempt,
                    error = %e,
                    "Uplink fetch failed, retrying"
                );
            }
            Err(e) => return SyncOutcome::Failed(e),
        }
    }
}
