//! Installed distributions and their licenses.
//!
//! - [`metadata`]: core metadata parsing, license resolution and license files.
//! - [`list_packages`]: lazy scan of the distributions visible on a search path.

pub mod metadata;

use std::collections::HashSet;
use std::iter::FusedIterator;
use std::path::PathBuf;

use regex::Regex;

use crate::error::{Error, Result};
use crate::models::{canonicalize_name, FromSource, PackageInfo, PackageOptions};

use metadata::{license_file_pattern, parse_metadata, read_license_files, resolve_license, METADATA_FILES};

const DISTRIBUTION_SUFFIXES: [&str; 2] = [".dist-info", ".egg-info"];

/// A distribution directory found on the search path, not yet read.
#[derive(Debug)]
struct Candidate {
    name: String,
    dir: PathBuf,
}

/// Lazy, single-pass sequence of `(canonical name, PackageInfo)`.
///
/// Distribution directories are collected up front; metadata and license files are
/// read as the sequence is consumed. Not restartable: scan again for a second pass.
#[derive(Debug)]
pub struct Packages {
    candidates: std::vec::IntoIter<Candidate>,
    from_source: FromSource,
    license_files: Regex,
}

/// Scan `search_path` for installed distributions.
///
/// When a name is installed in several entries the first one wins, as it would on import.
pub fn list_packages(search_path: &[PathBuf], options: &PackageOptions) -> Result<Packages> {
    let mut seen = HashSet::new();
    let mut candidates = Vec::new();

    for entry in search_path {
        let mut dirs: Vec<PathBuf> = std::fs::read_dir(entry)
            .map_err(|e| Error::io(entry, e))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir() && is_distribution_dir(p))
            .collect();
        dirs.sort();

        for dir in dirs {
            let name = distribution_name(&dir);
            if options.is_ignored(&name) || !seen.insert(name.clone()) {
                continue;
            }
            candidates.push(Candidate { name, dir });
        }
    }

    tracing::debug!(
        entries = search_path.len(),
        distributions = candidates.len(),
        "collected distributions"
    );

    Ok(Packages {
        candidates: candidates.into_iter(),
        from_source: options.from_source,
        license_files: license_file_pattern()?,
    })
}

fn is_distribution_dir(path: &std::path::Path) -> bool {
    let file_name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    DISTRIBUTION_SUFFIXES.iter().any(|s| file_name.ends_with(s))
}

/// Canonical name encoded in `<name>-<version>.dist-info` / `<name>.egg-info`.
fn distribution_name(dir: &std::path::Path) -> String {
    let stem = dir.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    let name = stem.split('-').next().unwrap_or(&stem);
    canonicalize_name(name)
}

impl Packages {
    fn read(&self, candidate: Candidate) -> Result<Option<(String, PackageInfo)>> {
        let Some(metadata_path) = METADATA_FILES
            .iter()
            .map(|f| candidate.dir.join(f))
            .find(|p| p.is_file())
        else {
            tracing::warn!(dir = %candidate.dir.display(), "distribution without metadata, skipping");
            return Ok(None);
        };

        let content = std::fs::read(&metadata_path).map_err(|e| Error::io(&metadata_path, e))?;
        let meta = parse_metadata(&String::from_utf8_lossy(&content));

        let licenses = read_license_files(&candidate.dir, &self.license_files)?;
        let license = resolve_license(&meta, self.from_source);

        let info = PackageInfo {
            name: meta.name.clone().unwrap_or_else(|| candidate.name.clone()),
            version: meta.version.clone().unwrap_or_default(),
            license,
            license_metadata: meta.metadata_license(),
            license_classifiers: meta.classifier_licenses(),
            location: candidate.dir,
            licenses,
            dependency: None,
        };

        Ok(Some((candidate.name, info)))
    }
}

impl Iterator for Packages {
    type Item = Result<(String, PackageInfo)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let candidate = self.candidates.next()?;
            match self.read(candidate) {
                Ok(Some(item)) => return Some(Ok(item)),
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, self.candidates.size_hint().1)
    }
}

impl FusedIterator for Packages {}
