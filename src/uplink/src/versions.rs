//! Version-key handling for manifests.
//!
//! Version strings are compared after strict semver parsing, so `1.0.0` and
//! `1.0.0+build` stay distinct keys while malformed strings such as `01.0.0`
//! or `v1.0.0` are rejected outright.

use crate::error::{RegistryError, Result};
use semver::Version;

/// Parse a version key strictly.
pub fn parse(raw: &str) -> Result<Version> {
    Version::parse(raw).map_err(|_| RegistryError::InvalidVersion(raw.to_string()))
}

/// Canonical form of a version key, used to detect duplicates across sources.
pub fn canonical(raw: &str) -> Result<String> {
    parse(raw).map(|v| v.to_string())
}

pub fn is_valid(raw: &str) -> bool {
    Version::parse(raw).is_ok()
}

/// Sort version keys ascending by semver precedence. Keys that do not parse are
/// dropped. Build metadata breaks ties so the order is total.
pub fn sort<'a, I>(keys: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a String>,
{
    let mut parsed: Vec<(Version, &String)> = keys
        .into_iter()
        .filter_map(|k| Version::parse(k).ok().map(|v| (v, k)))
        .collect();
    parsed.sort_by(|a, b| a.0.cmp(&b.0));
    parsed.into_iter().map(|(_, k)| k.clone()).collect()
}

/// Highest version among the keys, if any parse.
pub fn highest<'a, I>(keys: I) -> Option<String>
where
    I: IntoIterator<Item = &'a String>,
{
    keys.into_iter()
        .filter_map(|k| Version::parse(k).ok().map(|v| (v, k)))
        .max_by(|a, b| a.0.cmp(&b.0))
        .map(|(_, k)| k.clone())
}
