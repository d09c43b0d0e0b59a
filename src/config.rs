use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::manifest::resolve_manifest;
use crate::models::{FromSource, PackageOptions};
use crate::poetry::Poetry;

/// Scan settings, deserialized from `[tool.poetry-licenses]` or a standalone `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    /// Where license strings are taken from. Defaults to `mixed`.
    #[serde(default)]
    pub from_source: FromSource,
    /// Distributions left out of every scan.
    #[serde(default)]
    pub ignore_packages: BTreeSet<String>,
    /// Treat dependencies without an installed distribution as errors.
    #[serde(default)]
    pub strict: bool,
    /// `poetry` executable used to locate environments outside the project.
    #[serde(default)]
    pub poetry: Option<PathBuf>,
}

impl Config {
    pub fn package_options(&self) -> PackageOptions {
        PackageOptions::default()
            .from_source(self.from_source)
            .ignore(&self.ignore_packages)
    }

    pub fn poetry(&self) -> Poetry {
        match &self.poetry {
            Some(program) => Poetry::with_program(program),
            None => Poetry::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ManifestTool {
    tool: Option<ToolTable>,
}

#[derive(Debug, Deserialize)]
struct ToolTable {
    #[serde(rename = "poetry-licenses")]
    poetry_licenses: Option<Config>,
}

/// Load the scan configuration, searching in order:
///
/// 1. `config_override`: an explicit config file
/// 2. `[tool.poetry-licenses]` in the manifest
/// 3. `~/.config/poetry-licenses/config.toml`
/// 4. Built-in [`Config::default`]
pub fn load_config(manifest: &Path, config_override: Option<&Path>) -> Result<Config> {
    if let Some(path) = config_override {
        return read_config(path);
    }

    let manifest = resolve_manifest(manifest)?;
    let content = std::fs::read_to_string(&manifest).map_err(|e| Error::io(&manifest, e))?;
    let parsed: ManifestTool = toml::from_str(&content).map_err(|source| Error::Config {
        path: manifest.clone(),
        source,
    })?;
    if let Some(config) = parsed.tool.and_then(|t| t.poetry_licenses) {
        return Ok(config);
    }

    if let Some(home) = dirs::home_dir() {
        let home_config = home
            .join(".config")
            .join("poetry-licenses")
            .join("config.toml");
        if home_config.exists() {
            return read_config(&home_config);
        }
    }

    Ok(Config::default())
}

fn read_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    toml::from_str(&content).map_err(|source| Error::Config {
        path: path.to_path_buf(),
        source,
    })
}
