//! Print the licenses of a Poetry project's dependency groups.
//!
//! ```text
//! cargo run --example license-report -- path/to/project --group main
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table};
use indexmap::IndexMap;
use tracing_subscriber::EnvFilter;

use poetry_licenses::{
    load_config, EnvironmentContext, LicenseScanner, PackageInfo, PoetryProject,
};

#[derive(Parser, Debug)]
#[command(
    name = "license-report",
    about = "Show the licenses of a Poetry project's dependency groups"
)]
struct Cli {
    /// Project directory or pyproject.toml
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Dependency group to report (repeatable) [default: every group]
    #[arg(short, long = "group", value_name = "GROUP")]
    groups: Vec<String>,

    /// Fail on dependencies that are not installed
    #[arg(long)]
    strict: bool,

    /// Config file [default: [tool.poetry-licenses], fallback ~/.config/poetry-licenses/config.toml]
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print JSON instead of tables
    #[arg(long)]
    json: bool,
}

type GroupReport = IndexMap<String, Option<PackageInfo>>;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.path, cli.config.as_deref())?;
    let strict = cli.strict || config.strict;

    let mut scanner = LicenseScanner::with_parts(config.poetry(), EnvironmentContext::default());
    let project = PoetryProject::load(&mut scanner, &cli.path, &config.package_options())
        .with_context(|| format!("failed to scan {}", cli.path.display()))?;

    let groups: Vec<String> = if cli.groups.is_empty() {
        project.groups().into_iter().collect()
    } else {
        cli.groups.clone()
    };

    let mut report: IndexMap<String, GroupReport> = IndexMap::new();
    for group in groups {
        let licenses = project
            .licenses(&group, strict)?
            .collect::<poetry_licenses::Result<GroupReport>>()?;
        report.insert(group, licenses);
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        render(&report, project.manifest());
    }

    Ok(())
}

fn render(report: &IndexMap<String, GroupReport>, manifest: &Path) {
    println!(
        "\n {} v{}",
        "license-report".bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!(" Scanning: {}\n", manifest.display());

    for (group, packages) in report {
        let missing = packages.values().filter(|p| p.is_none()).count();
        println!(
            " {} {} ({} dependencies, {} not installed)\n",
            "[GROUP]".cyan().bold(),
            group,
            packages.len(),
            missing
        );
        render_table(packages);
        println!();
    }
}

fn render_table(packages: &GroupReport) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Name").add_attribute(Attribute::Bold),
            Cell::new("Version").add_attribute(Attribute::Bold),
            Cell::new("License").add_attribute(Attribute::Bold),
            Cell::new("License file").add_attribute(Attribute::Bold),
        ]);

    for (name, info) in packages {
        match info {
            Some(info) => {
                let license_color = if info.is_unknown() {
                    Color::Yellow
                } else {
                    Color::Green
                };
                let license_file = info
                    .licenses
                    .first()
                    .and_then(|f| f.path.file_name())
                    .map(|f| f.to_string_lossy().into_owned())
                    .unwrap_or_default();

                table.add_row(vec![
                    Cell::new(name),
                    Cell::new(&info.version),
                    Cell::new(&info.license).fg(license_color),
                    Cell::new(license_file),
                ]);
            }
            None => {
                table.add_row(vec![
                    Cell::new(name),
                    Cell::new(""),
                    Cell::new("not installed").fg(Color::DarkGrey),
                    Cell::new(""),
                ]);
            }
        }
    }

    println!("{}", table);
}
