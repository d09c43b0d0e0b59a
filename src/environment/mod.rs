//! Virtual environments and scoped activation.
//!
//! - [`context`]: [`EnvironmentContext`], an explicit stack of activations with RAII guards.
//! - [`search_path`]: how an environment's `sys.path` entries are resolved.

pub mod context;
pub mod search_path;

use std::path::{Path, PathBuf};

pub use context::{ActivationGuard, EnvironmentContext};
pub use search_path::{InterpreterSearchPath, SearchPathResolver, SitePackagesLayout};

/// Directory holding the interpreter and console scripts of a virtual environment.
pub const SCRIPTS_DIR: &str = if cfg!(windows) { "Scripts" } else { "bin" };

const PYTHON_EXECUTABLE: &str = if cfg!(windows) { "python.exe" } else { "python" };

/// An isolated Python installation: its root directory and interpreter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VirtualEnv {
    root: PathBuf,
    python: PathBuf,
}

impl VirtualEnv {
    /// Environment rooted at `root` with the conventional interpreter location.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let python = root.join(SCRIPTS_DIR).join(PYTHON_EXECUTABLE);
        Self { root, python }
    }

    pub fn with_python(root: impl Into<PathBuf>, python: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            python: python.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn python(&self) -> &Path {
        &self.python
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.root.join(SCRIPTS_DIR)
    }
}
