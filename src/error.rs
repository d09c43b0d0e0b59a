use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::Arc;

use thiserror::Error;

use crate::models::Dependency;

/// Crate-wide result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Everything that can go wrong while reading a project or scanning its environment.
#[derive(Debug, Error)]
pub enum Error {
    /// A caller-supplied value was rejected (negative cache size, manifest that is not a file).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The script directory of a virtual environment does not exist.
    #[error("{} is not a directory", .0.display())]
    NotADirectory(PathBuf),

    /// No virtual environment could be located for the manifest.
    #[error("no virtual environment found for {}", manifest.display())]
    EnvironmentNotFound {
        manifest: PathBuf,
        #[source]
        source: Box<Error>,
    },

    /// The requested dependency group is not declared in the manifest.
    #[error("dependency group {group:?} not found in {}", manifest.display())]
    GroupNotFound { group: String, manifest: PathBuf },

    /// A declared dependency has no installed distribution (strict mode only).
    #[error("{}", not_installed_message(dependency))]
    DependencyNotInstalled { dependency: Arc<Dependency> },

    #[error("failed to read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse manifest {}", path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to parse config {}", path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to run `{program}`")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{program}` exited with {status}: {stderr}")]
    Command {
        program: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error(transparent)]
    Pattern(#[from] regex::Error),

    #[error("unexpected sys.path output from {}", python.display())]
    SearchPath {
        python: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// The dependency behind a [`Error::DependencyNotInstalled`].
    pub fn dependency(&self) -> Option<&Dependency> {
        match self {
            Error::DependencyNotInstalled { dependency } => Some(dependency),
            _ => None,
        }
    }
}

fn not_installed_message(dependency: &Dependency) -> String {
    let package = &dependency.name;

    if dependency.optional {
        if dependency.extras.is_empty() {
            format!("optional package '{package}' must be installed")
        } else {
            let extras: Vec<&str> = dependency.extras.iter().map(String::as_str).collect();
            format!("optional package '{package}' missing, installed with extras {extras:?}")
        }
    } else if dependency.groups.is_empty() {
        format!("package '{package}' not installed in virtual environment")
    } else {
        let groups: Vec<&str> = dependency.groups.iter().map(String::as_str).collect();
        format!("package '{package}' missing, install with groups {groups:?}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dependency(optional: bool, extras: &[&str], groups: &[&str]) -> Arc<Dependency> {
        let mut dep = Dependency::new("unicode-charset", "*");
        dep.optional = optional;
        dep.extras = extras.iter().map(|s| s.to_string()).collect();
        dep.groups = groups.iter().map(|s| s.to_string()).collect();
        Arc::new(dep)
    }

    #[test]
    fn test_required_dependency_message_lists_groups() {
        let err = Error::DependencyNotInstalled {
            dependency: dependency(false, &[], &["dev"]),
        };
        assert_eq!(
            err.to_string(),
            r#"package 'unicode-charset' missing, install with groups ["dev"]"#
        );
    }

    #[test]
    fn test_optional_dependency_message_lists_extras() {
        let err = Error::DependencyNotInstalled {
            dependency: dependency(true, &["pt"], &["test"]),
        };
        assert_eq!(
            err.to_string(),
            r#"optional package 'unicode-charset' missing, installed with extras ["pt"]"#
        );
        assert!(err.dependency().is_some_and(|d| d.optional));
    }

    #[test]
    fn test_messages_without_context() {
        let optional = Error::DependencyNotInstalled {
            dependency: dependency(true, &[], &[]),
        };
        assert_eq!(
            optional.to_string(),
            "optional package 'unicode-charset' must be installed"
        );

        let required = Error::DependencyNotInstalled {
            dependency: dependency(false, &[], &[]),
        };
        assert_eq!(
            required.to_string(),
            "package 'unicode-charset' not installed in virtual environment"
        );
    }
}
