//! Fixtures laying out fake Poetry projects and virtual environments on disk.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::environment::VirtualEnv;

pub(crate) const PYPROJECT: &str = r#"
[tool.poetry]
name = "demo"
version = "0.1.0"

[tool.poetry.dependencies]
python = "^3.9"
pathlibutil = "0.3.5"

[tool.poetry.group.dev.dependencies]
unicode-charset = "0.0.0"

[tool.poetry.group.test.dependencies]
pytest-doctestplus = { version = "*", optional = true }

[tool.poetry.extras]
pt = ["pytest-doctestplus"]
"#;

/// Create `bin/` and `lib/python3.12/site-packages/` under `root`.
pub(crate) fn fake_venv(root: &Path) -> VirtualEnv {
    let env = VirtualEnv::new(root);
    std::fs::create_dir_all(env.bin_dir()).unwrap();
    std::fs::create_dir_all(site_packages(root)).unwrap();
    env
}

fn site_packages(root: &Path) -> PathBuf {
    root.join("lib").join("python3.12").join("site-packages")
}

/// Write a `*.dist-info` directory with `METADATA` and, when given, a `LICENSE` file.
pub(crate) fn install(site: &Path, name: &str, version: &str, headers: &str, license: Option<&str>) -> PathBuf {
    let dist_info = site.join(format!("{}-{}.dist-info", name.replace('-', "_"), version));
    std::fs::create_dir_all(&dist_info).unwrap();

    let metadata = format!("Metadata-Version: 2.1\nName: {name}\nVersion: {version}\n{headers}\n");
    std::fs::write(dist_info.join("METADATA"), metadata).unwrap();

    if let Some(text) = license {
        std::fs::write(dist_info.join("LICENSE"), text).unwrap();
    }

    dist_info
}

/// A project directory with `pyproject.toml` and an in-project `.venv`.
pub(crate) struct FakeProject {
    pub dir: TempDir,
}

impl FakeProject {
    pub fn new(pyproject: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("pyproject.toml"), pyproject).unwrap();
        fake_venv(&dir.path().join(".venv"));
        Self { dir }
    }

    /// `pathlibutil` and `pip` installed,
    /// `unicode-charset` and `pytest-doctestplus` missing.
    pub fn standard() -> Self {
        let project = Self::new(PYPROJECT);
        project.install("pathlibutil", "0.3.5", "License: MIT", Some("MIT License\n"));
        project.install(
            "pip",
            "24.0",
            "License: MIT\nClassifier: License :: OSI Approved :: MIT License",
            None,
        );
        project
    }

    pub fn manifest(&self) -> PathBuf {
        self.dir.path().join("pyproject.toml")
    }

    pub fn venv(&self) -> VirtualEnv {
        VirtualEnv::new(self.dir.path().join(".venv"))
    }

    pub fn install(&self, name: &str, version: &str, headers: &str, license: Option<&str>) -> PathBuf {
        install(&site_packages(self.venv().root()), name, version, headers, license)
    }

    pub fn write_lock(&self, content: &str) {
        std::fs::write(self.dir.path().join("poetry.lock"), content).unwrap();
    }
}
