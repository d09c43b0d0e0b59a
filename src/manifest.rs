use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use regex::Regex;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::models::{canonicalize_name, Dependency};

pub const MANIFEST_FILE: &str = "pyproject.toml";

/// Group of everything under `[tool.poetry.dependencies]` and `[project].dependencies`.
pub const MAIN_GROUP: &str = "main";

/// Group of the Poetry 1.0 `[tool.poetry.dev-dependencies]` table.
pub const DEV_GROUP: &str = "dev";

/// Declared dependencies bucketed by group, in declaration order.
///
/// A dependency declared in several groups is shared (same [`Arc`]) between their buckets.
#[derive(Debug, Clone, Default)]
pub struct DependencyGroups {
    groups: IndexMap<String, Vec<Arc<Dependency>>>,
}

impl DependencyGroups {
    pub fn get(&self, group: &str) -> Option<&[Arc<Dependency>]> {
        self.groups.get(group).map(Vec::as_slice)
    }

    pub fn contains(&self, group: &str) -> bool {
        self.groups.contains_key(group)
    }

    /// Group names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Arc<Dependency>])> {
        self.groups.iter().map(|(g, deps)| (g.as_str(), deps.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Absolute path of the manifest; a project directory stands for its `pyproject.toml`.
pub fn resolve_manifest(path: &Path) -> Result<PathBuf> {
    let manifest = if path.is_dir() {
        path.join(MANIFEST_FILE)
    } else {
        path.to_path_buf()
    };

    if !manifest.is_file() {
        return Err(Error::InvalidArgument(format!(
            "{} is not a file",
            manifest.display()
        )));
    }

    manifest.canonicalize().map_err(|e| Error::io(&manifest, e))
}

/// Read the grouped dependencies declared in a `pyproject.toml`.
///
/// Understands the Poetry 1.x layout (`[tool.poetry.dependencies]`,
/// `[tool.poetry.dev-dependencies]`, `[tool.poetry.group.<name>.dependencies]`,
/// `[tool.poetry.extras]`) and the PEP 621 layout used by Poetry 2
/// (`[project].dependencies`, `[project.optional-dependencies]`).
pub fn read_dependency_groups(path: &Path) -> Result<DependencyGroups> {
    let path = resolve_manifest(path)?;
    let path = path.as_path();

    let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    let pyproject: Pyproject = toml::from_str(&content).map_err(|source| Error::Manifest {
        path: path.to_path_buf(),
        source,
    })?;

    let groups = collect_groups(pyproject)?;
    tracing::debug!(
        manifest = %path.display(),
        groups = groups.len(),
        "read dependency groups"
    );

    Ok(groups)
}

#[derive(Debug, Default, Deserialize)]
struct Pyproject {
    project: Option<Project>,
    tool: Option<Tool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct Project {
    #[serde(default)]
    dependencies: Vec<String>,
    #[serde(default)]
    optional_dependencies: IndexMap<String, Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct Tool {
    poetry: Option<ToolPoetry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ToolPoetry {
    #[serde(default)]
    dependencies: IndexMap<String, toml::Value>,
    #[serde(default)]
    dev_dependencies: IndexMap<String, toml::Value>,
    #[serde(default)]
    group: IndexMap<String, PoetryGroup>,
    #[serde(default)]
    extras: IndexMap<String, Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct PoetryGroup {
    #[serde(default)]
    dependencies: IndexMap<String, toml::Value>,
}

/// Accumulates declarations, merging repeated names into one [`Dependency`].
#[derive(Default)]
struct GroupsBuilder {
    /// Canonical names per group, in that group's declaration order.
    members: IndexMap<String, IndexSet<String>>,
    dependencies: IndexMap<String, Dependency>,
}

impl GroupsBuilder {
    fn declare(&mut self, name: &str, constraint: &str, group: &str, optional: bool) -> &mut Dependency {
        let canonical = canonicalize_name(name);
        self.members
            .entry(group.to_string())
            .or_default()
            .insert(canonical.clone());

        let is_new = !self.dependencies.contains_key(&canonical);
        let dep = self
            .dependencies
            .entry(canonical)
            .or_insert_with(|| Dependency::new(name, constraint));

        dep.optional = if is_new { optional } else { dep.optional && optional };
        dep.groups.insert(group.to_string());
        dep
    }

    fn declare_table(&mut self, table: &IndexMap<String, toml::Value>, group: &str) {
        for (name, value) in table {
            // The interpreter constraint is not a distribution.
            if group == MAIN_GROUP && name == "python" {
                continue;
            }
            let (constraint, optional) = poetry_constraint(value);
            self.declare(name, &constraint, group, optional);
        }
    }

    fn mark_extra(&mut self, name: &str, extra: &str) {
        if let Some(dep) = self.dependencies.get_mut(&canonicalize_name(name)) {
            dep.extras.insert(extra.to_string());
        }
    }

    fn finish(self) -> DependencyGroups {
        let shared: IndexMap<String, Arc<Dependency>> = self
            .dependencies
            .into_iter()
            .map(|(name, dep)| (name, Arc::new(dep)))
            .collect();

        let groups: IndexMap<String, Vec<Arc<Dependency>>> = self
            .members
            .into_iter()
            .map(|(group, names)| {
                let bucket: Vec<_> = names
                    .iter()
                    .filter_map(|name| shared.get(name).map(Arc::clone))
                    .collect();
                (group, bucket)
            })
            .collect();

        DependencyGroups { groups }
    }
}

fn collect_groups(pyproject: Pyproject) -> Result<DependencyGroups> {
    let mut builder = GroupsBuilder::default();
    let requirement = Regex::new(r"^\s*([A-Za-z0-9][A-Za-z0-9._-]*)\s*(?:\[[^\]]*\])?\s*([^;]*)")?;

    if let Some(project) = &pyproject.project {
        for spec in &project.dependencies {
            if let Some((name, constraint)) = parse_requirement(&requirement, spec) {
                builder.declare(&name, &constraint, MAIN_GROUP, false);
            }
        }
        for (extra, specs) in &project.optional_dependencies {
            for spec in specs {
                if let Some((name, constraint)) = parse_requirement(&requirement, spec) {
                    builder
                        .declare(&name, &constraint, MAIN_GROUP, true)
                        .extras
                        .insert(extra.clone());
                }
            }
        }
    }

    if let Some(poetry) = pyproject.tool.and_then(|t| t.poetry) {
        builder.declare_table(&poetry.dependencies, MAIN_GROUP);
        builder.declare_table(&poetry.dev_dependencies, DEV_GROUP);
        for (group, table) in &poetry.group {
            builder.declare_table(&table.dependencies, group);
        }
        for (extra, names) in &poetry.extras {
            for name in names {
                builder.mark_extra(name, extra);
            }
        }
    }

    Ok(builder.finish())
}

/// Split a PEP 508 requirement into name and constraint (`*` when unconstrained).
fn parse_requirement(re: &Regex, spec: &str) -> Option<(String, String)> {
    let caps = re.captures(spec)?;
    let name = caps[1].to_string();
    let constraint = caps
        .get(2)
        .map(|m| m.as_str().trim().trim_start_matches('(').trim_end_matches(')').trim())
        .filter(|c| !c.is_empty())
        .unwrap_or("*")
        .to_string();
    Some((name, constraint))
}

/// Constraint text and optionality of a `[tool.poetry.*dependencies]` value.
fn poetry_constraint(value: &toml::Value) -> (String, bool) {
    match value {
        toml::Value::String(s) => (s.clone(), false),
        toml::Value::Table(t) => (table_constraint(t), is_optional(t)),
        // Multiple-constraint dependencies: one table per marker set.
        toml::Value::Array(items) => {
            let tables: Vec<&toml::Table> = items.iter().filter_map(|v| v.as_table()).collect();
            let constraint = tables
                .first()
                .map(|t| table_constraint(t))
                .unwrap_or_else(|| "*".to_string());
            let optional = !tables.is_empty() && tables.iter().all(|t| is_optional(t));
            (constraint, optional)
        }
        _ => ("*".to_string(), false),
    }
}

fn table_constraint(table: &toml::Table) -> String {
    ["version", "git", "path", "url"]
        .iter()
        .find_map(|key| table.get(*key).and_then(|v| v.as_str()))
        .unwrap_or("*")
        .to_string()
}

fn is_optional(table: &toml::Table) -> bool {
    table
        .get("optional")
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn parse(content: &str) -> DependencyGroups {
        let pyproject: Pyproject = toml::from_str(content).unwrap();
        collect_groups(pyproject).unwrap()
    }

    fn names(groups: &DependencyGroups, group: &str) -> Vec<String> {
        groups
            .get(group)
            .unwrap()
            .iter()
            .map(|d| d.name.clone())
            .collect()
    }

    #[test]
    fn test_poetry_layout() {
        let groups = parse(
            r#"
[tool.poetry]
name = "demo"

[tool.poetry.dependencies]
python = "^3.9"
pathlibutil = "0.3.5"
Requests = { version = "^2.31", optional = true }

[tool.poetry.group.dev.dependencies]
unicode-charset = "0.0.0"

[tool.poetry.group.test.dependencies]
pytest-doctestplus = { version = "*", optional = true }

[tool.poetry.extras]
http = ["requests"]
"#,
        );

        assert_eq!(groups.names().collect::<Vec<_>>(), ["main", "dev", "test"]);
        assert_eq!(names(&groups, "main"), ["pathlibutil", "requests"]);
        assert_eq!(names(&groups, "dev"), ["unicode-charset"]);

        let requests = &groups.get("main").unwrap()[1];
        assert!(requests.optional);
        assert_eq!(requests.pretty_name, "Requests");
        assert!(requests.extras.contains("http"));

        let doctest = &groups.get("test").unwrap()[0];
        assert!(doctest.optional);
        assert!(doctest.extras.is_empty());
    }

    #[test]
    fn test_legacy_dev_dependencies() {
        let groups = parse(
            r#"
[tool.poetry.dev-dependencies]
pytest = "^7"
"#,
        );
        assert_eq!(names(&groups, DEV_GROUP), ["pytest"]);
        assert!(!groups.contains(MAIN_GROUP));
    }

    #[test]
    fn test_pep621_layout() {
        let groups = parse(
            r#"
[project]
name = "demo"
dependencies = [
    "pathlibutil (==0.3.5)",
    "Typing_Extensions>=4; python_version < '3.11'",
]

[project.optional-dependencies]
pt = ["pytest-doctestplus[extra]"]
"#,
        );

        let main = groups.get(MAIN_GROUP).unwrap();
        assert_eq!(names(&groups, MAIN_GROUP), ["pathlibutil", "typing-extensions", "pytest-doctestplus"]);
        assert_eq!(main[0].constraint, "==0.3.5");
        assert_eq!(main[1].constraint, ">=4");
        assert_eq!(main[2].constraint, "*");
        assert!(main[2].optional);
        assert!(main[2].extras.contains("pt"));
    }

    #[test]
    fn test_dependency_in_several_groups_is_shared() {
        let groups = parse(
            r#"
[tool.poetry.dependencies]
requests = "^2"

[tool.poetry.group.dev.dependencies]
requests = { version = "^2", optional = true }
"#,
        );

        let main = &groups.get(MAIN_GROUP).unwrap()[0];
        let dev = &groups.get(DEV_GROUP).unwrap()[0];
        assert!(Arc::ptr_eq(main, dev));
        assert_eq!(main.groups.len(), 2);
        assert!(!main.optional);
    }

    #[test]
    fn test_each_group_keeps_its_own_order() {
        let groups = parse(
            r#"
[tool.poetry.group.dev.dependencies]
alpha = "*"
beta = "*"

[tool.poetry.group.test.dependencies]
beta = "*"
alpha = "*"
"#,
        );

        assert_eq!(names(&groups, "dev"), ["alpha", "beta"]);
        assert_eq!(names(&groups, "test"), ["beta", "alpha"]);
        assert!(Arc::ptr_eq(
            &groups.get("dev").unwrap()[0],
            &groups.get("test").unwrap()[1]
        ));
    }

    #[test]
    fn test_multiple_constraints() {
        let groups = parse(
            r#"
[tool.poetry.dependencies]
numpy = [
    { version = "<1.25", python = "<3.9", optional = true },
    { version = ">=1.25", python = ">=3.9", optional = true },
]
"#,
        );
        let numpy = &groups.get(MAIN_GROUP).unwrap()[0];
        assert_eq!(numpy.constraint, "<1.25");
        assert!(numpy.optional);
    }

    #[test]
    fn test_read_rejects_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_dependency_groups(dir.path()).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_read_reports_parse_errors() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(f, "[tool.poetry").unwrap();
        let err = read_dependency_groups(f.path()).unwrap_err();
        assert!(matches!(err, Error::Manifest { .. }));
    }
}
