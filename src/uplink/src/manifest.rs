use crate::versions;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Dist-tag recomputed after every merge pass
pub const LATEST_TAG: &str = "latest";

/// Special `time` keys that are not versions
pub const TIME_CREATED: &str = "created";
pub const TIME_MODIFIED: &str = "modified";

/// Full package metadata document. Unknown top-level fields (readme,
/// description, maintainers, ...) are carried through untouched in `extra`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub versions: BTreeMap<String, VersionRecord>,
    #[serde(rename = "dist-tags", default)]
    pub dist_tags: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub time: BTreeMap<String, String>,
    /// Last known state per uplink (ETag and fetch time)
    #[serde(rename = "_uplinks", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub uplinks: BTreeMap<String, UplinkState>,
    /// Tarball file name to originating location
    #[serde(rename = "_distfiles", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub distfiles: BTreeMap<String, DistFile>,
    #[serde(rename = "_attachments", default, skip_serializing_if = "Map::is_empty")]
    pub attachments: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One published version. Unknown fields (dependencies, engines, deprecated,
/// ...) live in `extra`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VersionRecord {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub dist: Dist,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Dist {
    #[serde(default)]
    pub tarball: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shasum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Dist {
    /// Whether two dist blocks point at the same tarball content
    pub fn same_content(&self, other: &Dist) -> bool {
        match (&self.shasum, &other.shasum) {
            (Some(a), Some(b)) => a == b,
            _ => match (&self.integrity, &other.integrity) {
                (Some(a), Some(b)) => a == b,
                _ => self.tarball == other.tarball,
            },
        }
    }

    /// File name component of the tarball URL
    pub fn file_name(&self) -> Option<&str> {
        self.tarball
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UplinkState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    /// Unix timestamp in milliseconds
    #[serde(default)]
    pub fetched: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistFile {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
    pub registry: String,
}

impl Manifest {
    /// Empty skeleton for a package with no local copy
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn latest(&self) -> Option<&str> {
        self.dist_tags.get(LATEST_TAG).map(String::as_str)
    }

    /// Version keys sorted ascending by semver
    pub fn sorted_versions(&self) -> Vec<String> {
        versions::sort(self.versions.keys())
    }

    /// Look up a version by exact key, then by dist-tag
    pub fn resolve(&self, version_or_tag: &str) -> Option<&VersionRecord> {
        self.versions.get(version_or_tag).or_else(|| {
            self.dist_tags
                .get(version_or_tag)
                .and_then(|v| self.versions.get(v))
        })
    }

    pub fn uplink_fetched(&self, upname: &str) -> Option<i64> {
        self.uplinks
            .get(upname)
            .map(|s| s.fetched)
            .filter(|fetched| *fetched > 0)
    }

    pub fn uplink_etag(&self, upname: &str) -> Option<&str> {
        self.uplinks.get(upname).and_then(|s| s.etag.as_deref())
    }

    /// Drop registry bookkeeping before handing the manifest to a client
    pub fn strip_internal(&mut self) {
        self.uplinks.clear();
        self.distfiles.clear();
    }
}
