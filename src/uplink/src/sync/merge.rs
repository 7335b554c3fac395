//! Reconciles the local manifest with successful uplink responses.
//!
//! Precedence is local first, then uplinks in configuration order. A version
//! already known is never replaced; later sources can only fill fields the
//! earlier ones left absent. `latest` is recomputed from the merged version set
//! whenever a remote contributed data.

use crate::manifest::{DistFile, Manifest, UplinkState, LATEST_TAG, TIME_CREATED, TIME_MODIFIED};
use crate::sync::coordinator::{SyncOutcome, UplinkOutcome};
use crate::versions;
use chrono::DateTime;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Same version published with different tarball content by two sources
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionConflict {
    pub version: String,
    pub upname: String,
}

/// Diagnostics collected while merging
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeReport {
    /// Version key to the uplink it was taken from
    pub origins: BTreeMap<String, String>,
    /// Uplinks whose manifests were merged, in order
    pub contributed: Vec<String>,
    pub not_modified: Vec<String>,
    pub failed: Vec<(String, crate::error::UplinkError)>,
    /// (upname, raw key) of remote version keys that are not valid semver
    pub rejected: Vec<(String, String)>,
    pub conflicts: Vec<VersionConflict>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Merged {
    pub manifest: Manifest,
    pub report: MergeReport,
}

/// Merge `local` (if any) with the successful outcomes in `outcomes`.
pub fn merge(name: &str, local: Option<Manifest>, outcomes: &[UplinkOutcome]) -> Merged {
    let mut report = MergeReport::default();
    for UplinkOutcome { upname, outcome } in outcomes {
        match outcome {
            SyncOutcome::NotModified => report.not_modified.push(upname.clone()),
            SyncOutcome::Failed(e) => report.failed.push((upname.clone(), e.clone())),
            SyncOutcome::Success { .. } => {}
        }
    }

    let local_present = local.is_some();
    let mut merged = local.unwrap_or_else(|| Manifest::new(name));

    if !outcomes.iter().any(|o| o.outcome.is_success()) {
        // Nothing new: the input comes back untouched
        return Merged {
            manifest: merged,
            report,
        };
    }

    if merged.name != name {
        if local_present {
            tracing::warn!(package = %name, stored = %merged.name, "Local manifest name mismatch, forcing requested name");
        }
        merged.name = name.to_string();
    }

    let mut known: HashMap<String, String> = merged
        .versions
        .keys()
        .map(|key| (versions::canonical(key).unwrap_or_else(|_| key.clone()), key.clone()))
        .collect();
    let mut claimed_tags: HashSet<String> = merged.dist_tags.keys().cloned().collect();

    for UplinkOutcome { upname, outcome } in outcomes {
        let SyncOutcome::Success {
            manifest: remote,
            etag,
            fetched,
        } = outcome
        else {
            continue;
        };

        if remote.name != name && !remote.name.is_empty() {
            tracing::debug!(upname = %upname, package = %name, remote_name = %remote.name, "Uplink returned a different package name");
        }

        merge_versions(&mut merged, remote, upname, &mut known, &mut report);
        merge_dist_tags(&mut merged, remote, &mut claimed_tags);
        merge_time(&mut merged, remote);

        for (key, value) in &remote.attachments {
            merged
                .attachments
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        for (key, value) in &remote.extra {
            // Registry-internal fields of another registry are not ours to keep
            if key.starts_with('_') {
                continue;
            }
            merged
                .extra
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }

        merged.uplinks.insert(
            upname.clone(),
            UplinkState {
                etag: etag.clone(),
                fetched: *fetched,
            },
        );
        report.contributed.push(upname.clone());
    }

    match versions::highest(merged.versions.keys()) {
        Some(highest) => {
            merged.dist_tags.insert(LATEST_TAG.to_string(), highest);
        }
        None => {
            merged.dist_tags.remove(LATEST_TAG);
        }
    }

    tracing::debug!(
        package = %name,
        versions = merged.versions.len(),
        contributed = ?report.contributed,
        latest = ?merged.latest(),
        "Merged uplink metadata"
    );

    Merged {
        manifest: merged,
        report,
    }
}

fn merge_versions(
    merged: &mut Manifest,
    remote: &Manifest,
    upname: &str,
    known: &mut HashMap<String, String>,
    report: &mut MergeReport,
) {
    for key in remote.versions.keys() {
        if !versions::is_valid(key) {
            tracing::warn!(upname = %upname, version = %key, "Rejecting invalid version key from uplink");
            report.rejected.push((upname.to_string(), key.clone()));
        }
    }

    for key in versions::sort(remote.versions.keys()) {
        let Some(record) = remote.versions.get(&key) else {
            continue;
        };
        let canonical = versions::canonical(&key).unwrap_or_else(|_| key.clone());

        match known.get(&canonical) {
            None => {
                merged.versions.insert(key.clone(), record.clone());
                known.insert(canonical, key.clone());
                report.origins.insert(key.clone(), upname.to_string());

                if let Some(published) = remote.time.get(&key) {
                    merged
                        .time
                        .entry(key.clone())
                        .or_insert_with(|| published.clone());
                }
                if let Some(file) = record.dist.file_name() {
                    merged
                        .distfiles
                        .entry(file.to_string())
                        .or_insert_with(|| DistFile {
                            url: record.dist.tarball.clone(),
                            sha: record.dist.shasum.clone(),
                            registry: upname.to_string(),
                        });
                }
            }
            Some(existing_key) => {
                let Some(existing) = merged.versions.get_mut(existing_key) else {
                    continue;
                };
                if !existing.dist.same_content(&record.dist) {
                    tracing::warn!(
                        upname = %upname,
                        version = %key,
                        "Uplink publishes different tarball for a known version, keeping existing"
                    );
                    report.conflicts.push(VersionConflict {
                        version: existing_key.clone(),
                        upname: upname.to_string(),
                    });
                }
                for (field, value) in &record.extra {
                    existing
                        .extra
                        .entry(field.clone())
                        .or_insert_with(|| value.clone());
                }
            }
        }
    }
}

fn merge_dist_tags(merged: &mut Manifest, remote: &Manifest, claimed: &mut HashSet<String>) {
    for (tag, version) in &remote.dist_tags {
        if tag == LATEST_TAG || claimed.contains(tag) {
            continue;
        }
        if !merged.versions.contains_key(version) {
            continue;
        }
        merged.dist_tags.insert(tag.clone(), version.clone());
        claimed.insert(tag.clone());
    }
}

fn merge_time(merged: &mut Manifest, remote: &Manifest) {
    for (key, value) in &remote.time {
        match key.as_str() {
            TIME_CREATED => keep_by(&mut merged.time, key, value, |new, old| new < old),
            TIME_MODIFIED => keep_by(&mut merged.time, key, value, |new, old| new > old),
            // Version timestamps are copied along with their version
            _ => {}
        }
    }
}

/// Replace `time[key]` with `value` when absent or when `better(value, current)`.
fn keep_by<F>(time: &mut BTreeMap<String, String>, key: &str, value: &str, better: F)
where
    F: Fn(i64, i64) -> bool,
{
    let Some(current) = time.get(key) else {
        time.insert(key.to_string(), value.to_string());
        return;
    };
    if let (Some(new), Some(old)) = (parse_millis(value), parse_millis(current)) {
        if better(new, old) {
            time.insert(key.to_string(), value.to_string());
        }
    }
}

fn parse_millis(value: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.timestamp_millis())
}
