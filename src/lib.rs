//! `poetry-licenses`: license metadata for the dependency groups of Poetry projects.
//!
//! # Flow
//! 1. Read the dependency groups declared in `pyproject.toml` ([`manifest`]).
//! 2. Locate the project's virtual environment ([`poetry`]).
//! 3. Activate it for the duration of a scan ([`environment`]).
//! 4. Read core metadata and license files of every installed distribution ([`license`]).
//! 5. Join a group's dependencies against what is installed ([`packages`]).
//!
//! Results can be memoized per argument ([`cache`]) or per project until its
//! `poetry.lock` changes ([`project`]).

pub mod cache;
pub mod config;
pub mod environment;
pub mod error;
pub mod license;
pub mod manifest;
pub mod models;
pub mod packages;
pub mod poetry;
pub mod project;

#[cfg(test)]
mod testing;

pub use cache::{cache_packageinfo, CacheBuilder, CacheInfo, CachedProducer, PackageInfoCache, PackageMap};
pub use config::{load_config, Config};
pub use environment::{
    ActivationGuard, EnvironmentContext, InterpreterSearchPath, SearchPathResolver, SitePackagesLayout,
    VirtualEnv,
};
pub use error::{Error, Result};
pub use license::{list_packages, Packages};
pub use manifest::DependencyGroups;
pub use models::{
    canonicalize_name, Dependency, FromSource, LicenseFile, PackageInfo, PackageOptions, UNKNOWN_LICENSE,
};
pub use packages::{get_package_group, get_packages, GroupLicenses, LicenseScanner};
pub use poetry::{DependencyManager, Poetry};
pub use project::{PoetryProject, ProjectCache};
