use crate::error::{RegistryError, Result};
use crate::manifest::Manifest;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Manifest file name inside each package directory
pub const PACKAGE_FILE: &str = "package.json";

/// Durable storage for local package manifests
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Read a manifest; `RegistryError::NotFound` when there is no local copy
    async fn read_manifest(&self, name: &str) -> Result<Manifest>;

    /// Replace a manifest. Readers see either the old or the new document.
    async fn write_manifest(&self, name: &str, manifest: &Manifest) -> Result<()>;

    async fn delete_manifest(&self, name: &str) -> Result<()>;

    async fn list_packages(&self) -> Result<Vec<String>>;
}

/// Reject names that would escape the storage directory
pub fn validate_package_name(name: &str) -> Result<()> {
    let invalid = || RegistryError::Storage(format!("invalid package name: {:?}", name));
    let segments: Vec<&str> = name.split('/').collect();
    let well_formed = match segments.as_slice() {
        [single] => !single.starts_with('@'),
        [scope, _] => scope.starts_with('@') && scope.len() > 1,
        _ => false,
    };
    if !well_formed || name.contains('\\') {
        return Err(invalid());
    }
    if segments
        .iter()
        .any(|s| s.is_empty() || s.starts_with('.') || *s == "node_modules")
    {
        return Err(invalid());
    }
    Ok(())
}

/// One JSON file per package under a base directory; scoped packages nest as
/// `@scope/name/package.json`.
pub struct FsStore {
    base_dir: PathBuf,
}

impl FsStore {
    pub fn new(base_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&base_dir).map_err(|e| {
            RegistryError::Storage(format!("Failed to create storage dir: {}", e))
        })?;
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn manifest_path(&self, name: &str) -> PathBuf {
        self.base_dir.join(name).join(PACKAGE_FILE)
    }

    /// Package directories directly under `dir`, plus the directories of scopes
    /// (`@scope`) found there.
    async fn package_dirs(dir: &Path) -> Result<(Vec<String>, Vec<(String, PathBuf)>)> {
        let mut packages = Vec::new();
        let mut scopes = Vec::new();
        let mut entries = fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let dir_name = entry.file_name().to_string_lossy().to_string();
            if dir_name.starts_with('@') {
                scopes.push((dir_name, entry.path()));
            } else if fs::metadata(entry.path().join(PACKAGE_FILE)).await.is_ok() {
                packages.push(dir_name);
            }
        }
        Ok((packages, scopes))
    }
}

#[async_trait]
impl LocalStore for FsStore {
    async fn read_manifest(&self, name: &str) -> Result<Manifest> {
        validate_package_name(name)?;
        let path = self.manifest_path(name);
        let data = match fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RegistryError::NotFound(name.to_string()))
            }
            Err(e) => {
                return Err(RegistryError::Storage(format!(
                    "Failed to read manifest {}: {}",
                    name, e
                )))
            }
        };
        let manifest = serde_json::from_slice(&data)?;
        Ok(manifest)
    }

    async fn write_manifest(&self, name: &str, manifest: &Manifest) -> Result<()> {
        validate_package_name(name)?;
        let path = self.manifest_path(name);
        let data = serde_json::to_vec_pretty(manifest)?;

        tracing::debug!(
            package = %name,
            path = %path.display(),
            data_len = data.len(),
            "Writing manifest to local storage"
        );

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                RegistryError::Storage(format!("Failed to create package dir: {}", e))
            })?;
        }

        // Atomic write: write to temp file, then rename
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, &data).await.map_err(|e| {
            tracing::error!(path = %temp_path.display(), error = %e, "Failed to write manifest file");
            RegistryError::Storage(format!("Failed to write manifest {}: {}", name, e))
        })?;
        if let Ok(file) = fs::File::open(&temp_path).await {
            let _ = file.sync_all().await;
        }

        fs::rename(&temp_path, &path).await.map_err(|e| {
            tracing::error!(path = %path.display(), error = %e, "Failed to rename manifest file");
            RegistryError::Storage(format!("Failed to rename manifest {}: {}", name, e))
        })?;

        Ok(())
    }

    async fn delete_manifest(&self, name: &str) -> Result<()> {
        validate_package_name(name)?;
        let path = self.manifest_path(name);
        match fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RegistryError::NotFound(name.to_string()))
            }
            Err(e) => {
                return Err(RegistryError::Storage(format!(
                    "Failed to delete manifest {}: {}",
                    name, e
                )))
            }
        }
        if let Some(dir) = path.parent() {
            // Leaves the directory when it still holds tarballs
            let _ = fs::remove_dir(dir).await;
        }
        Ok(())
    }

    async fn list_packages(&self) -> Result<Vec<String>> {
        let (mut packages, scopes) = Self::package_dirs(&self.base_dir).await?;
        for (scope, path) in scopes {
            let (scoped, _) = Self::package_dirs(&path).await?;
            packages.extend(scoped.into_iter().map(|name| format!("{}/{}", scope, name)));
        }
        packages.sort();
        Ok(packages)
    }
}
