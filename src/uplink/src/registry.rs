use crate::config::Config;
use crate::error::{RegistryError, Result};
use crate::filter::{apply_filters, ManifestFilter};
use crate::manifest::{Manifest, VersionRecord};
use crate::storage::{validate_package_name, FsStore, LocalStore};
use crate::sync::{aggregate, fetch_all, Merged, SyncOptions};
use crate::uplink::UplinkSet;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Per-package critical sections; different names never contend
type PackageLocks = Arc<std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>>;

/// Claim on one entry of the lock map. Claims are only created and dropped
/// with the map locked; dropping the last claim removes the entry, also when
/// the owning future is dropped while waiting for the lock.
struct PackageLock {
    name: String,
    locks: PackageLocks,
    mutex: Arc<Mutex<()>>,
}

impl Drop for PackageLock {
    fn drop(&mut self) {
        let mut locks = match self.locks.lock() {
            Ok(locks) => locks,
            Err(poisoned) => poisoned.into_inner(),
        };
        // The map and this claim are the only references
        if Arc::strong_count(&self.mutex) == 2 {
            locks.remove(&self.name);
        }
    }
}

/// Options for a package retrieval
#[derive(Debug, Clone, Default)]
pub struct GetPackageOptions {
    /// Keep `_uplinks` / `_distfiles` in the returned manifest
    pub keep_uplink_data: bool,
    pub sync: SyncOptions,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PackageResponse {
    Manifest(Manifest),
    Version(VersionRecord),
}

/// Registry-wide context: configuration, uplinks, local store and filters.
/// Built once at startup and shared by reference with every sync call.
pub struct Registry {
    config: Arc<Config>,
    uplinks: Arc<UplinkSet>,
    store: Arc<dyn LocalStore>,
    filters: Vec<Arc<dyn ManifestFilter>>,
    locks: PackageLocks,
}

impl Registry {
    /// Build from configuration: file storage plus one HTTP client per uplink
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let store = Arc::new(FsStore::new(PathBuf::from(&config.storage.directory))?);
        let uplinks = UplinkSet::from_config(&config)?;
        tracing::info!(
            storage = %config.storage.directory,
            uplinks = uplinks.len(),
            "Registry initialized"
        );
        Ok(Self::with_parts(config, uplinks, store))
    }

    pub fn with_parts(config: Config, uplinks: UplinkSet, store: Arc<dyn LocalStore>) -> Self {
        Self {
            config: Arc::new(config),
            uplinks: Arc::new(uplinks),
            store,
            filters: Vec::new(),
            locks: Arc::new(std::sync::Mutex::new(HashMap::new())),
        }
    }

    pub fn with_filter(mut self, filter: Arc<dyn ManifestFilter>) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn uplinks(&self) -> &UplinkSet {
        &self.uplinks
    }

    pub fn store(&self) -> &Arc<dyn LocalStore> {
        &self.store
    }

    /// Number of package names currently locked or awaited
    pub fn active_package_locks(&self) -> usize {
        match self.locks.lock() {
            Ok(locks) => locks.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// Reconcile `local` with every eligible uplink and return the merged
    /// manifest, or the single failure the outcomes add up to.
    pub async fn sync_uplinks_metadata(
        &self,
        name: &str,
        local: Option<Manifest>,
        options: &SyncOptions,
    ) -> Result<Merged> {
        let mut options = options.clone();
        if options.global_timeout.is_none() {
            options.global_timeout = self
                .config
                .sync
                .global_timeout
                .and_then(|t| t.as_duration());
        }

        let outcomes = fetch_all(name, &self.uplinks, local.as_ref(), &options).await?;
        aggregate(name, local, &outcomes)
    }

    /// Read, sync, persist and filter one package, then optionally pick a
    /// version or dist-tag out of it.
    pub async fn get_package(&self, name: &str, options: &GetPackageOptions) -> Result<PackageResponse> {
        validate_package_name(name)?;

        let merged = {
            let package_lock = self.package_lock(name);
            let _guard = package_lock.mutex.lock().await;
            self.sync_and_persist(name, &options.sync).await?
        };

        let (mut manifest, filter_errors) = apply_filters(&self.filters, merged.manifest).await;
        if !filter_errors.is_empty() {
            tracing::warn!(package = %name, failed = filter_errors.len(), "Serving manifest with failed filters skipped");
        }
        if !options.keep_uplink_data {
            manifest.strip_internal();
        }

        match &options.sync.version {
            None => Ok(PackageResponse::Manifest(manifest)),
            Some(wanted) => manifest
                .resolve(wanted)
                .cloned()
                .map(PackageResponse::Version)
                .ok_or_else(|| RegistryError::VersionNotFound(wanted.clone())),
        }
    }

    async fn sync_and_persist(&self, name: &str, options: &SyncOptions) -> Result<Merged> {
        let local = match self.store.read_manifest(name).await {
            Ok(manifest) => Some(manifest),
            Err(RegistryError::NotFound(_)) => None,
            Err(e) => return Err(e),
        };

        let merged = self.sync_uplinks_metadata(name, local, options).await?;

        let cacheable = merged.report.contributed.iter().any(|upname| {
            self.uplinks
                .get(upname)
                .map(|u| u.config.cache)
                .unwrap_or(false)
        });
        if cacheable {
            if let Err(e) = self.store.write_manifest(name, &merged.manifest).await {
                // The merged data is still valid for this response
                tracing::error!(package = %name, error = %e, "Failed to persist merged manifest");
            }
        }

        Ok(merged)
    }

    fn package_lock(&self, name: &str) -> PackageLock {
        let mut locks = match self.locks.lock() {
            Ok(locks) => locks,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mutex = locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        PackageLock {
            name: name.to_string(),
            locks: self.locks.clone(),
            mutex,
        }
    }
}
