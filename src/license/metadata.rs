use std::path::{Path, PathBuf};

use regex::Regex;

use crate::error::{Error, Result};
use crate::models::{FromSource, LicenseFile, UNKNOWN_LICENSE};

/// Core metadata files, newest format first.
pub const METADATA_FILES: [&str; 2] = ["METADATA", "PKG-INFO"];

/// PEP 639 directory holding license files inside a `.dist-info`.
const LICENSES_DIR: &str = "licenses";

/// License-relevant headers of a `METADATA` / `PKG-INFO` file.
#[derive(Debug, Default, PartialEq)]
pub struct CoreMetadata {
    pub name: Option<String>,
    pub version: Option<String>,
    pub license: Option<String>,
    pub license_expression: Option<String>,
    pub classifiers: Vec<String>,
}

impl CoreMetadata {
    /// `License-Expression`, else a meaningful `License` header.
    pub fn metadata_license(&self) -> Option<String> {
        self.license_expression
            .as_deref()
            .or(self.license.as_deref())
            .map(str::trim)
            .filter(|l| !l.is_empty() && *l != UNKNOWN_LICENSE)
            .map(str::to_string)
    }

    /// Licenses named by `License :: ...` classifiers (last segment of each).
    pub fn classifier_licenses(&self) -> Vec<String> {
        self.classifiers
            .iter()
            .filter(|c| c.starts_with("License ::"))
            .filter_map(|c| c.rsplit(" :: ").next())
            .map(str::trim)
            // Bare category, carries no license.
            .filter(|l| *l != "OSI Approved")
            .map(str::to_string)
            .collect()
    }
}

/// Parse the header block of a core metadata file.
///
/// Headers end at the first blank line; lines starting with whitespace continue the
/// previous header.
pub fn parse_metadata(content: &str) -> CoreMetadata {
    let mut headers: Vec<(String, String)> = Vec::new();

    for line in content.lines() {
        if line.trim().is_empty() {
            break;
        }
        if line.starts_with([' ', '\t']) {
            if let Some((_, value)) = headers.last_mut() {
                value.push('\n');
                value.push_str(line.trim());
            }
            continue;
        }
        if let Some((key, value)) = line.split_once(':') {
            headers.push((key.trim().to_string(), value.trim().to_string()));
        }
    }

    let mut meta = CoreMetadata::default();
    for (key, value) in headers {
        match key.to_ascii_lowercase().as_str() {
            "name" => meta.name = Some(value),
            "version" => meta.version = Some(value),
            "license" => meta.license = Some(value),
            "license-expression" => meta.license_expression = Some(value),
            "classifier" => meta.classifiers.push(value),
            _ => {}
        }
    }
    meta
}

/// Pick the reported license string for `meta` according to `from_source`.
pub fn resolve_license(meta: &CoreMetadata, from_source: FromSource) -> String {
    let classifiers = meta.classifier_licenses();
    let from_classifiers = (!classifiers.is_empty()).then(|| classifiers.join("; "));

    let license = match from_source {
        FromSource::Metadata => meta.metadata_license(),
        FromSource::Classifier => from_classifiers,
        FromSource::Mixed => from_classifiers.or_else(|| meta.metadata_license()),
    };

    license.unwrap_or_else(|| UNKNOWN_LICENSE.to_string())
}

/// Matches conventional license file names at the top of a distribution directory.
pub fn license_file_pattern() -> Result<Regex> {
    Ok(Regex::new(r"(?i)^(LICEN[CS]E|COPYING|NOTICE|AUTHORS)")?)
}

/// License files of the distribution directory `dist_dir`, sorted by path.
pub fn read_license_files(dist_dir: &Path, pattern: &Regex) -> Result<Vec<LicenseFile>> {
    let mut paths = Vec::new();

    for entry in std::fs::read_dir(dist_dir).map_err(|e| Error::io(dist_dir, e))? {
        let entry = entry.map_err(|e| Error::io(dist_dir, e))?;
        let path = entry.path();
        if path.is_file() && pattern.is_match(&entry.file_name().to_string_lossy()) {
            paths.push(path);
        }
    }

    let licenses_dir = dist_dir.join(LICENSES_DIR);
    if licenses_dir.is_dir() {
        collect_files(&licenses_dir, &mut paths)?;
    }

    paths.sort();
    paths.dedup();

    paths
        .into_iter()
        .map(|path| {
            let bytes = std::fs::read(&path).map_err(|e| Error::io(&path, e))?;
            let text = String::from_utf8_lossy(&bytes).into_owned();
            Ok(LicenseFile { path, text })
        })
        .collect()
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir).map_err(|e| Error::io(dir, e))? {
        let path = entry.map_err(|e| Error::io(dir, e))?.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else if path.is_file() {
            out.push(path);
        }
    }
    Ok(())
}
