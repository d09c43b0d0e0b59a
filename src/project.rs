use std::collections::BTreeSet;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lru::LruCache;
use sha2::{Digest, Sha256};

use crate::cache::PackageMap;
use crate::error::{Error, Result};
use crate::manifest::{resolve_manifest, DependencyGroups};
use crate::models::PackageOptions;
use crate::packages::{GroupLicenses, LicenseScanner};
use crate::poetry::DependencyManager;

/// Lock file written next to `pyproject.toml` by Poetry.
pub const LOCK_FILE: &str = "poetry.lock";

/// A Poetry project read once: its declared groups and installed distributions.
#[derive(Debug)]
pub struct PoetryProject {
    manifest: PathBuf,
    lock_hash: Option<String>,
    options: PackageOptions,
    dependencies: DependencyGroups,
    packages: Arc<PackageMap>,
}

impl PoetryProject {
    pub fn load<M: DependencyManager>(
        scanner: &mut LicenseScanner<M>,
        manifest: &Path,
        options: &PackageOptions,
    ) -> Result<Self> {
        let manifest = resolve_manifest(manifest)?;
        let lock_hash = lock_file_hash(&manifest)?;
        let dependencies = scanner.dependencies(&manifest)?;
        let packages = Arc::new(scanner.package_map(&manifest, options)?);

        Ok(Self {
            manifest,
            lock_hash,
            options: options.clone(),
            dependencies,
            packages,
        })
    }

    pub fn manifest(&self) -> &Path {
        &self.manifest
    }

    /// SHA-256 of `poetry.lock` when the project was loaded, `None` without a lock file.
    pub fn lock_hash(&self) -> Option<&str> {
        self.lock_hash.as_deref()
    }

    pub fn options(&self) -> &PackageOptions {
        &self.options
    }

    pub fn dependencies(&self) -> &DependencyGroups {
        &self.dependencies
    }

    pub fn packages(&self) -> &PackageMap {
        &self.packages
    }

    pub fn groups(&self) -> BTreeSet<String> {
        self.dependencies.names().map(str::to_string).collect()
    }

    /// Installed distribution (or `None`) for every dependency of `group`.
    pub fn licenses(&self, group: &str, strict: bool) -> Result<GroupLicenses> {
        let dependencies = self
            .dependencies
            .get(group)
            .ok_or_else(|| Error::GroupNotFound {
                group: group.to_string(),
                manifest: self.manifest.clone(),
            })?;

        Ok(GroupLicenses::new(
            dependencies.to_vec(),
            Arc::clone(&self.packages),
            strict,
        ))
    }
}

/// Hex SHA-256 of the lock file beside `manifest`.
pub fn lock_file_hash(manifest: &Path) -> Result<Option<String>> {
    let lock = manifest
        .parent()
        .unwrap_or(Path::new("."))
        .join(LOCK_FILE);

    if !lock.is_file() {
        return Ok(None);
    }

    let content = std::fs::read(&lock).map_err(|e| Error::io(&lock, e))?;
    Ok(Some(hex::encode(Sha256::digest(&content))))
}

/// Reuses loaded projects per manifest and options until `poetry.lock` changes.
#[derive(Debug)]
pub struct ProjectCache {
    entries: LruCache<(PathBuf, PackageOptions), Arc<PoetryProject>>,
}

impl ProjectCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: LruCache::new(capacity),
        }
    }

    pub fn unbounded() -> Self {
        Self {
            entries: LruCache::unbounded(),
        }
    }

    /// The cached project for `manifest`, reloaded when its lock file hash differs.
    pub fn open<M: DependencyManager>(
        &mut self,
        scanner: &mut LicenseScanner<M>,
        manifest: &Path,
        options: &PackageOptions,
    ) -> Result<Arc<PoetryProject>> {
        let manifest = resolve_manifest(manifest)?;
        let lock_hash = lock_file_hash(&manifest)?;
        let key = (manifest, options.clone());

        if let Some(project) = self.entries.get(&key) {
            if project.lock_hash == lock_hash {
                return Ok(Arc::clone(project));
            }
            tracing::debug!(manifest = %key.0.display(), "lock file changed, reloading project");
        }

        let project = Arc::new(PoetryProject::load(scanner, &key.0, options)?);
        self.entries.put(key, Arc::clone(&project));
        Ok(project)
    }

    /// Forget every cached project for `manifest`.
    pub fn invalidate(&mut self, manifest: &Path) {
        let manifest = resolve_manifest(manifest).unwrap_or_else(|_| manifest.to_path_buf());
        let stale: Vec<_> = self
            .entries
            .iter()
            .filter(|((path, _), _)| *path == manifest)
            .map(|(key, _)| key.clone())
            .collect();
        for key in stale {
            self.entries.pop(&key);
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ProjectCache {
    fn default() -> Self {
        Self::unbounded()
    }
}
