use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Mutex, PoisonError};

use crate::error::{Error, Result};

use super::VirtualEnv;

/// Prints the interpreter's `sys.path` as a JSON array.
const SYS_PATH_SCRIPT: &str = "import json, sys; print(json.dumps(sys.path))";

/// Resolves the directories an environment imports distributions from.
pub trait SearchPathResolver: Send + Sync {
    fn resolve(&self, env: &VirtualEnv) -> Result<Vec<PathBuf>>;
}

/// Reads `site-packages` locations from the environment's directory layout.
///
/// Covers `lib/python3.X/site-packages`, `lib64/python3.X/site-packages`
/// and the Windows `Lib/site-packages`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SitePackagesLayout;

impl SearchPathResolver for SitePackagesLayout {
    fn resolve(&self, env: &VirtualEnv) -> Result<Vec<PathBuf>> {
        let mut entries = Vec::new();

        for lib in ["lib", "lib64"] {
            let lib_dir = env.root().join(lib);
            if !lib_dir.is_dir() {
                continue;
            }
            let mut versions: Vec<PathBuf> = std::fs::read_dir(&lib_dir)
                .map_err(|e| Error::io(&lib_dir, e))?
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.file_name().to_string_lossy().starts_with("python"))
                .map(|entry| entry.path().join("site-packages"))
                .filter(|p| p.is_dir())
                .collect();
            versions.sort();
            for site in versions {
                // lib64 is commonly a symlink to lib.
                if !contains_same_dir(&entries, &site) {
                    entries.push(site);
                }
            }
        }

        let windows_site = env.root().join("Lib").join("site-packages");
        if windows_site.is_dir() && !contains_same_dir(&entries, &windows_site) {
            entries.push(windows_site);
        }

        Ok(entries)
    }
}

fn contains_same_dir(entries: &[PathBuf], candidate: &Path) -> bool {
    let canonical = candidate.canonicalize().ok();
    entries
        .iter()
        .any(|e| e == candidate || (canonical.is_some() && e.canonicalize().ok() == canonical))
}

/// Asks the environment's interpreter for its `sys.path`.
///
/// Results are cached per absolute interpreter path so each environment costs at most
/// one subprocess. Environments without an interpreter on disk fall back to
/// [`SitePackagesLayout`].
#[derive(Debug, Default)]
pub struct InterpreterSearchPath {
    cache: Mutex<HashMap<PathBuf, Vec<PathBuf>>>,
}

impl InterpreterSearchPath {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of interpreters whose search path is cached.
    pub fn cached(&self) -> usize {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn query(python: &Path) -> Result<Vec<PathBuf>> {
        let output = Command::new(python)
            .args(["-c", SYS_PATH_SCRIPT])
            .env_remove("VIRTUAL_ENV")
            .output()
            .map_err(|source| Error::Spawn {
                program: python.display().to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(Error::Command {
                program: python.display().to_string(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let entries: Vec<String> =
            serde_json::from_slice(&output.stdout).map_err(|source| Error::SearchPath {
                python: python.to_path_buf(),
                source,
            })?;

        // Empty entries mean the working directory; zip imports and missing paths hold no dist-info.
        Ok(entries
            .into_iter()
            .filter(|e| !e.is_empty())
            .map(PathBuf::from)
            .filter(|p| p.is_dir())
            .collect())
    }
}

impl SearchPathResolver for InterpreterSearchPath {
    fn resolve(&self, env: &VirtualEnv) -> Result<Vec<PathBuf>> {
        if !env.python().is_file() {
            tracing::debug!(
                python = %env.python().display(),
                "interpreter missing, reading site-packages layout"
            );
            return SitePackagesLayout.resolve(env);
        }

        let key = std::path::absolute(env.python()).map_err(|e| Error::io(env.python(), e))?;

        if let Some(entries) = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Ok(entries.clone());
        }

        tracing::debug!(python = %key.display(), "querying interpreter search path");
        let entries = Self::query(&key)?;

        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, entries.clone());

        Ok(entries)
    }
}
