use crate::manifest::Manifest;
use async_trait::async_trait;
use std::sync::Arc;

/// Post-merge transformation hook, e.g. hiding versions by policy
#[async_trait]
pub trait ManifestFilter: Send + Sync {
    fn name(&self) -> &str;

    async fn filter_metadata(&self, manifest: Manifest) -> Result<Manifest, String>;
}

/// Error raised by one filter; the pipeline keeps going without it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterError {
    pub filter: String,
    pub message: String,
}

/// Run filters in order. A failing filter is skipped and the next one receives
/// the last successfully filtered manifest.
pub async fn apply_filters(
    filters: &[Arc<dyn ManifestFilter>],
    manifest: Manifest,
) -> (Manifest, Vec<FilterError>) {
    let mut current = manifest;
    let mut errors = Vec::new();

    for filter in filters {
        match filter.filter_metadata(current.clone()).await {
            Ok(filtered) => current = filtered,
            Err(message) => {
                tracing::error!(filter = %filter.name(), error = %message, "Manifest filter failed");
                errors.push(FilterError {
                    filter: filter.name().to_string(),
                    message,
                });
            }
        }
    }

    (current, errors)
}
