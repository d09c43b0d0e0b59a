use std::iter::FusedIterator;
use std::path::Path;
use std::sync::Arc;

use crate::cache::PackageMap;
use crate::environment::EnvironmentContext;
use crate::error::{Error, Result};
use crate::license::{list_packages, Packages};
use crate::manifest::{resolve_manifest, DependencyGroups};
use crate::models::{Dependency, PackageInfo, PackageOptions};
use crate::poetry::{DependencyManager, Poetry};

/// Joins a project's declared dependencies with the distributions installed for it.
///
/// Owns the [`EnvironmentContext`] activations run in, so repeated scans reuse its
/// search-path cache.
#[derive(Debug)]
pub struct LicenseScanner<M = Poetry> {
    manager: M,
    context: EnvironmentContext,
}

impl LicenseScanner<Poetry> {
    pub fn new() -> Self {
        Self::with_parts(Poetry::new(), EnvironmentContext::default())
    }
}

impl Default for LicenseScanner<Poetry> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: DependencyManager> LicenseScanner<M> {
    pub fn with_parts(manager: M, context: EnvironmentContext) -> Self {
        Self { manager, context }
    }

    pub fn manager(&self) -> &M {
        &self.manager
    }

    pub fn context(&self) -> &EnvironmentContext {
        &self.context
    }

    pub fn dependencies(&self, manifest: &Path) -> Result<DependencyGroups> {
        self.manager.grouped_dependencies(manifest)
    }

    /// Distributions installed in the project's environment.
    ///
    /// The environment is active only while its distributions are collected.
    pub fn get_packages(&mut self, manifest: &Path, options: &PackageOptions) -> Result<Packages> {
        let env = self.manager.locate_environment(manifest)?;
        let guard = self.context.activate(&env)?;
        list_packages(guard.search_path(), options)
    }

    /// [`get_packages`](Self::get_packages), materialized.
    pub fn package_map(&mut self, manifest: &Path, options: &PackageOptions) -> Result<PackageMap> {
        self.get_packages(manifest, options)?.collect()
    }

    /// Installed distribution (or `None`) for every dependency of `group`.
    ///
    /// Fails up front with [`Error::GroupNotFound`] when the manifest has no such group.
    pub fn get_package_group(
        &mut self,
        manifest: &Path,
        group: &str,
        strict: bool,
        options: &PackageOptions,
    ) -> Result<GroupLicenses> {
        let groups = self.manager.grouped_dependencies(manifest)?;
        let dependencies = groups
            .get(group)
            .ok_or_else(|| Error::GroupNotFound {
                group: group.to_string(),
                manifest: resolve_manifest(manifest).unwrap_or_else(|_| manifest.to_path_buf()),
            })?
            .to_vec();

        let packages = Arc::new(self.package_map(manifest, options)?);
        Ok(GroupLicenses::new(dependencies, packages, strict))
    }
}

/// Lazy, single-pass join of a group's dependencies against installed distributions.
///
/// Yields `(canonical name, Some(info))` for installed dependencies, with
/// [`PackageInfo::dependency`] set, in declaration order. A missing dependency yields
/// `(name, None)`, or in strict mode a single [`Error::DependencyNotInstalled`] after
/// which the sequence ends.
#[derive(Debug)]
pub struct GroupLicenses {
    dependencies: std::vec::IntoIter<Arc<Dependency>>,
    packages: Arc<PackageMap>,
    strict: bool,
    failed: bool,
}

impl GroupLicenses {
    pub(crate) fn new(
        dependencies: Vec<Arc<Dependency>>,
        packages: Arc<PackageMap>,
        strict: bool,
    ) -> Self {
        Self {
            dependencies: dependencies.into_iter(),
            packages,
            strict,
            failed: false,
        }
    }
}

impl Iterator for GroupLicenses {
    type Item = Result<(String, Option<PackageInfo>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let dependency = self.dependencies.next()?;

        match self.packages.get(&dependency.name) {
            Some(info) => {
                let mut info = info.clone();
                info.dependency = Some(Arc::clone(&dependency));
                Some(Ok((dependency.name.clone(), Some(info))))
            }
            None if self.strict => {
                self.failed = true;
                Some(Err(Error::DependencyNotInstalled { dependency }))
            }
            None => Some(Ok((dependency.name.clone(), None))),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.failed {
            (0, Some(0))
        } else {
            (0, self.dependencies.size_hint().1)
        }
    }
}

impl FusedIterator for GroupLicenses {}

/// Distributions installed for the Poetry project at `manifest`.
///
/// `manifest` is a `pyproject.toml` or the directory holding it.
pub fn get_packages(manifest: impl AsRef<Path>, options: &PackageOptions) -> Result<Packages> {
    LicenseScanner::new().get_packages(manifest.as_ref(), options)
}

/// Installed distribution (or `None`) for every dependency of `group`; see
/// [`LicenseScanner::get_package_group`].
pub fn get_package_group(
    manifest: impl AsRef<Path>,
    group: &str,
    strict: bool,
    options: &PackageOptions,
) -> Result<GroupLicenses> {
    LicenseScanner::new().get_package_group(manifest.as_ref(), group, strict, options)
}
