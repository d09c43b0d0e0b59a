use std::path::{Path, PathBuf};
use std::process::Command;

use crate::environment::VirtualEnv;
use crate::error::{Error, Result};
use crate::manifest::{read_dependency_groups, resolve_manifest, DependencyGroups};

/// Directory name of an in-project environment (`virtualenvs.in-project = true`).
pub const IN_PROJECT_VENV: &str = ".venv";

/// Source of a project's declared dependencies and its installed environment.
pub trait DependencyManager {
    fn grouped_dependencies(&self, manifest: &Path) -> Result<DependencyGroups>;

    /// The virtual environment packages for `manifest` are installed in.
    fn locate_environment(&self, manifest: &Path) -> Result<VirtualEnv>;
}

/// Poetry-managed projects.
///
/// Dependencies are read from `pyproject.toml` directly; the environment is the
/// in-project `.venv` when present, otherwise whatever `poetry env info --path` reports.
#[derive(Debug, Clone)]
pub struct Poetry {
    program: PathBuf,
}

impl Poetry {
    pub fn new() -> Self {
        Self::with_program("poetry")
    }

    /// Use a specific `poetry` executable.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn env_info_path(&self, manifest: &Path, project_dir: &Path) -> Result<VirtualEnv> {
        let program = self.program.display().to_string();

        let output = Command::new(&self.program)
            .args(["env", "info", "--path"])
            .current_dir(project_dir)
            .env_remove("VIRTUAL_ENV")
            .output()
            .map_err(|source| Error::Spawn {
                program: program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(Error::EnvironmentNotFound {
                manifest: manifest.to_path_buf(),
                source: Box::new(Error::Command {
                    program,
                    status: output.status,
                    stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                }),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let root = stdout.trim();
        if root.is_empty() {
            return Err(Error::EnvironmentNotFound {
                manifest: manifest.to_path_buf(),
                source: Box::new(Error::InvalidArgument(format!(
                    "`{program} env info --path` printed no environment"
                ))),
            });
        }

        Ok(VirtualEnv::new(root))
    }
}

impl Default for Poetry {
    fn default() -> Self {
        Self::new()
    }
}

impl DependencyManager for Poetry {
    fn grouped_dependencies(&self, manifest: &Path) -> Result<DependencyGroups> {
        read_dependency_groups(manifest)
    }

    fn locate_environment(&self, manifest: &Path) -> Result<VirtualEnv> {
        let manifest = resolve_manifest(manifest)?;
        let project_dir = manifest.parent().unwrap_or(Path::new("."));

        let in_project = project_dir.join(IN_PROJECT_VENV);
        let env = if in_project.is_dir() {
            VirtualEnv::new(in_project)
        } else {
            self.env_info_path(&manifest, project_dir)?
        };

        tracing::debug!(
            manifest = %manifest.display(),
            env = %env.root().display(),
            "located environment"
        );
        Ok(env)
    }
}
