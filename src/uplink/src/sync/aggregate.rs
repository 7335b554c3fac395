use crate::error::{RegistryError, Result};
use crate::manifest::Manifest;
use crate::sync::coordinator::{SyncOutcome, UplinkOutcome};
use crate::sync::merge::{merge, Merged};

/// Turn the local read result and per-uplink outcomes into a merged manifest
/// or a single failure.
///
/// - any uplink success, or a local copy: success (the local copy alone is
///   enough when every uplink failed)
/// - otherwise a timed-out uplink: `ServiceUnavailable`
/// - otherwise an uplink claiming not-modified: `NotModifiedWithoutData`
/// - otherwise: `NotFound`
pub fn aggregate(name: &str, local: Option<Manifest>, outcomes: &[UplinkOutcome]) -> Result<Merged> {
    let any_success = outcomes.iter().any(|o| o.outcome.is_success());

    if any_success || local.is_some() {
        return Ok(merge(name, local, outcomes));
    }

    if let Some(timed_out) = outcomes
        .iter()
        .find(|o| o.outcome.error().is_some_and(|e| e.is_timeout()))
    {
        tracing::error!(package = %name, upname = %timed_out.upname, "No local copy and uplink timed out");
        return Err(RegistryError::ServiceUnavailable(format!(
            "uplink {} timed out fetching {}",
            timed_out.upname, name
        )));
    }

    if outcomes
        .iter()
        .any(|o| matches!(o.outcome, SyncOutcome::NotModified))
    {
        tracing::error!(package = %name, "Uplinks claim freshness but nothing is cached");
        return Err(RegistryError::NotModifiedWithoutData(name.to_string()));
    }

    tracing::debug!(package = %name, uplinks = outcomes.len(), "Package not found locally or on any uplink");
    Err(RegistryError::NotFound(name.to_string()))
}
