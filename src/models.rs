use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// License reported when neither metadata nor classifiers name one.
pub const UNKNOWN_LICENSE: &str = "UNKNOWN";

/// A dependency declared in `pyproject.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    /// Canonical (PEP 503) name, used to join against installed distributions.
    pub name: String,
    /// Name as written in the manifest.
    pub pretty_name: String,
    /// Declared version constraint, `*` when absent.
    pub constraint: String,
    /// Every group declaring this dependency.
    pub groups: BTreeSet<String>,
    pub optional: bool,
    /// Extras that pull this dependency in.
    pub extras: BTreeSet<String>,
}

impl Dependency {
    pub fn new(name: &str, constraint: &str) -> Self {
        Self {
            name: canonicalize_name(name),
            pretty_name: name.to_string(),
            constraint: constraint.to_string(),
            groups: BTreeSet::new(),
            optional: false,
            extras: BTreeSet::new(),
        }
    }
}

/// Metadata for one installed distribution.
#[derive(Debug, Clone, Serialize)]
pub struct PackageInfo {
    /// Distribution name from core metadata.
    pub name: String,
    pub version: String,
    /// License resolved according to [`FromSource`], [`UNKNOWN_LICENSE`] when unresolved.
    pub license: String,
    /// `License-Expression` or `License` header, if any.
    pub license_metadata: Option<String>,
    /// Last segment of each `License ::` classifier.
    pub license_classifiers: Vec<String>,
    /// The `*.dist-info` / `*.egg-info` directory.
    pub location: PathBuf,
    pub licenses: Vec<LicenseFile>,
    /// Set by the grouped join: the manifest entry this distribution satisfies.
    pub dependency: Option<Arc<Dependency>>,
}

impl PackageInfo {
    /// Whether the license could not be resolved from any source.
    pub fn is_unknown(&self) -> bool {
        self.license == UNKNOWN_LICENSE
    }
}

/// A license file shipped with a distribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LicenseFile {
    pub path: PathBuf,
    pub text: String,
}

/// Where a distribution's license string is taken from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FromSource {
    /// `License-Expression` / `License` headers.
    Metadata,
    /// `Classifier: License :: ...` headers.
    Classifier,
    /// Classifiers when present, metadata otherwise.
    #[default]
    Mixed,
}

impl std::fmt::Display for FromSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FromSource::Metadata => write!(f, "metadata"),
            FromSource::Classifier => write!(f, "classifier"),
            FromSource::Mixed => write!(f, "mixed"),
        }
    }
}

/// Filters applied when listing installed distributions.
///
/// Hashable so it can be part of a cache key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PackageOptions {
    pub from_source: FromSource,
    /// Canonical names of distributions to leave out.
    pub ignore_packages: BTreeSet<String>,
}

impl PackageOptions {
    pub fn from_source(mut self, from_source: FromSource) -> Self {
        self.from_source = from_source;
        self
    }

    pub fn ignore<I, S>(mut self, packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.ignore_packages
            .extend(packages.into_iter().map(|p| canonicalize_name(p.as_ref())));
        self
    }

    pub(crate) fn is_ignored(&self, canonical_name: &str) -> bool {
        self.ignore_packages.contains(canonical_name)
    }
}

/// Normalize a distribution name per PEP 503: lowercase, runs of `-`, `_` and `.` become `-`.
pub fn canonicalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_separator = false;

    for c in name.trim().chars() {
        if matches!(c, '-' | '_' | '.') {
            if !in_separator {
                out.push('-');
            }
            in_separator = true;
            continue;
        }
        in_separator = false;
        out.extend(c.to_lowercase());
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize_name() {
        assert_eq!(canonicalize_name("Unicode_Charset"), "unicode-charset");
        assert_eq!(canonicalize_name("zope.interface"), "zope-interface");
        assert_eq!(canonicalize_name("Foo__-.Bar"), "foo-bar");
        assert_eq!(canonicalize_name("pathlibutil"), "pathlibutil");
    }

    #[test]
    fn test_canonicalize_keeps_edge_separators() {
        assert_eq!(canonicalize_name("-foo"), "-foo");
        assert_eq!(canonicalize_name("_.Foo_"), "-foo-");
    }

    #[test]
    fn test_ignore_normalizes_names() {
        let options = PackageOptions::default().ignore(["Pip", "setup_tools"]);
        assert!(options.is_ignored("pip"));
        assert!(options.is_ignored("setup-tools"));
        assert_eq!(options.from_source, FromSource::Mixed);
    }
}
