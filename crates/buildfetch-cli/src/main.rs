//! buildfetch - source-control fetch for CI build sandboxes
//!
//! ## Commands
//!
//! - `plan`: resolve which components and paths a build would load
//! - `fetch`: delete, accept and load into the sandbox, then write the
//!   change log and the build property map
//! - `changelog show`: print a persisted change log

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};

use buildfetch_core::{
    read_change_log_file, write_change_log_file, BuildConfiguration, ChangeReport,
    FetchOrchestrator, FetchOutcome, LoadScope, ResolvedFetch, TracingProgress,
};
use buildfetch_scm::fakes::MemoryRepository;

#[derive(Parser)]
#[command(name = "buildfetch")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Fetch source-control content into CI build sandboxes", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Job configuration and repository shared by `plan` and `fetch`.
#[derive(clap::Args)]
struct JobArgs {
    /// Build configuration (JSON job file)
    #[arg(short, long, env = "BUILDFETCH_CONFIG")]
    config: PathBuf,

    /// Repository fixture (JSON) served by the in-memory connector
    #[arg(short, long, env = "BUILDFETCH_REPOSITORY")]
    repository: PathBuf,

    /// Build working directory relative destinations resolve against
    #[arg(short, long, default_value = ".")]
    workdir: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve the load plan without touching the sandbox
    Plan {
        #[command(flatten)]
        job: JobArgs,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Delete, accept and load into the sandbox
    Fetch {
        #[command(flatten)]
        job: JobArgs,

        /// Write the change log document here
        #[arg(long)]
        changelog: Option<PathBuf>,

        /// Write the build property map (JSON) here
        #[arg(long)]
        properties: Option<PathBuf>,
    },

    /// Change log operations
    Changelog {
        #[command(subcommand)]
        action: ChangelogAction,
    },
}

#[derive(Subcommand)]
enum ChangelogAction {
    /// Print a change log document
    Show {
        /// Change log file
        file: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    buildfetch_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Plan { job, format } => {
            let output = cmd_plan(&job, format).await?;
            print!("{output}");
            Ok(())
        }
        Commands::Fetch {
            job,
            changelog,
            properties,
        } => {
            let output = cmd_fetch(&job, changelog.as_deref(), properties.as_deref()).await?;
            print!("{output}");
            Ok(())
        }
        Commands::Changelog { action } => match action {
            ChangelogAction::Show { file, format } => {
                let output = cmd_changelog_show(&file, format).await?;
                print!("{output}");
                Ok(())
            }
        },
    }
}

/// Load the job file and build an orchestrator over the fixture repository.
fn load_job(job: &JobArgs) -> Result<(BuildConfiguration, FetchOrchestrator)> {
    let config = BuildConfiguration::from_json_file(&job.config)
        .with_context(|| format!("Failed to read build configuration {}", job.config.display()))?;
    let repository = MemoryRepository::from_json_file(&job.repository)
        .with_context(|| format!("Failed to load repository {}", job.repository.display()))?;
    let orchestrator = FetchOrchestrator::new(
        Arc::new(repository),
        Arc::new(TracingProgress),
        job.workdir.clone(),
    );
    Ok((config, orchestrator))
}

/// Resolve and render the load plan
async fn cmd_plan(job: &JobArgs, format: OutputFormat) -> Result<String> {
    let (config, orchestrator) = load_job(job)?;
    let resolved = orchestrator
        .resolve_plan(&config)
        .await
        .context("Failed to resolve load plan")?;

    match format {
        OutputFormat::Json => {
            let mut json = serde_json::to_string_pretty(&resolved.plan)?;
            json.push('\n');
            Ok(json)
        }
        OutputFormat::Text => Ok(render_plan(&resolved)?),
    }
}

fn render_plan(resolved: &ResolvedFetch) -> std::result::Result<String, std::fmt::Error> {
    let mut out = String::new();
    writeln!(out, "Source:      {}", resolved.config.selection)?;
    writeln!(out, "Workspace:   {}", resolved.source.workspace_id)?;
    writeln!(out, "Server:      {}", resolved.server.version)?;
    writeln!(
        out,
        "Destination: {}",
        resolved.plan.destination_root.display()
    )?;
    writeln!(out, "Digest:      {}", resolved.plan.digest())?;
    writeln!(out)?;

    if resolved.plan.is_empty() {
        writeln!(out, "No components to load")?;
        return Ok(out);
    }
    for entry in &resolved.plan.entries {
        let folder = if entry.subpath.as_os_str().is_empty() {
            ".".to_string()
        } else {
            entry.subpath.display().to_string()
        };
        match &entry.scope {
            LoadScope::Full => writeln!(out, "  {} -> {} (all files)", entry.component.name, folder)?,
            LoadScope::Rule(paths) => {
                writeln!(out, "  {} -> {} (load rule)", entry.component.name, folder)?;
                for path in paths {
                    writeln!(out, "      /{path}")?;
                }
            }
        }
    }
    Ok(out)
}

/// Run the fetch and write its outputs
async fn cmd_fetch(
    job: &JobArgs,
    changelog: Option<&Path>,
    properties: Option<&Path>,
) -> Result<String> {
    let (config, orchestrator) = load_job(job)?;
    let outcome = orchestrator.run(&config).await.context("Fetch failed")?;

    if let Some(path) = changelog {
        write_change_log_file(&outcome.report, path)
            .await
            .with_context(|| format!("Failed to write change log {}", path.display()))?;
        info!(path = %path.display(), "Wrote change log");
    }
    if let Some(path) = properties {
        let json = serde_json::to_string_pretty(&outcome.properties)?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("Failed to write build properties {}", path.display()))?;
        info!(path = %path.display(), "Wrote build properties");
    }

    Ok(render_fetch(&outcome)?)
}

fn render_fetch(outcome: &FetchOutcome) -> std::result::Result<String, std::fmt::Error> {
    let mut out = String::new();
    writeln!(
        out,
        "Loaded {} files from {} components into {}",
        outcome.files_written.len(),
        outcome.resolved.plan.entries.len(),
        outcome.resolved.plan.destination_root.display()
    )?;
    writeln!(
        out,
        "Accepted {} change sets, discarded {}",
        outcome.report.accepted_count(),
        outcome.report.discarded_count()
    )?;
    for (key, value) in outcome.properties.iter() {
        writeln!(out, "  {key}={value}")?;
    }
    Ok(out)
}

/// Print a persisted change log
async fn cmd_changelog_show(file: &Path, format: OutputFormat) -> Result<String> {
    let report = read_change_log_file(file)
        .await
        .with_context(|| format!("Failed to read change log {}", file.display()))?;
    if format == OutputFormat::Json {
        let mut out = serde_json::to_string_pretty(&report)?;
        out.push('\n');
        return Ok(out);
    }
    Ok(render_report(&report)?)
}

fn render_report(report: &ChangeReport) -> std::result::Result<String, std::fmt::Error> {
    let mut out = String::new();
    writeln!(out, "Workspace: {}", report.workspace_item_id)?;
    if let Some(name) = &report.baseline_set_name {
        writeln!(out, "Baseline:  {name}")?;
    }
    if report.personal_build {
        writeln!(out, "Personal build: changes are not reported")?;
    }
    if report.is_empty() {
        writeln!(out, "No changes")?;
        return Ok(out);
    }

    for cc in &report.component_changes {
        writeln!(out, "Component {} {}", cc.action.as_str(), cc.name)?;
    }
    for (title, sets) in [
        ("Accepted", &report.change_sets_accepted),
        ("Discarded", &report.change_sets_discarded),
    ] {
        for entries in sets.values() {
            for cs in entries {
                let comment = cs.comment.as_deref().unwrap_or("<no comment>");
                writeln!(
                    out,
                    "{title} {} [{}] {}",
                    cs.change_set_id,
                    cs.component_name,
                    comment.lines().next().unwrap_or_default()
                )?;
                if let Some(item) = &cs.work_item {
                    writeln!(out, "    work item {}: {}", item.number, item.summary)?;
                }
                match cs.summary_message() {
                    Some(message) => writeln!(out, "    {message}")?,
                    None => {
                        for change in &cs.affected_versionables {
                            writeln!(out, "    {} {}", change.kind, change.path)?;
                        }
                    }
                }
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use buildfetch_scm::fakes::{
        ComponentFixture, PendingChangeSet, RepositoryFixture, SourceFixture,
    };
    use buildfetch_scm::{RawVersionableChange, SelectionMode};

    fn job(dir: &Path) -> JobArgs {
        let fixture = RepositoryFixture::new("6.0.6".parse().unwrap()).with_source(
            SourceFixture::workspace("build-ws")
                .with_component(
                    ComponentFixture::new("component1")
                        .with_file("f/a.txt", "a")
                        .with_file("f/b.txt", "b"),
                )
                .with_pending(
                    PendingChangeSet::new("component1")
                        .with_comment("Update a\nsecond line")
                        .with_change(RawVersionableChange::modified("_va", "f/a.txt", "s1", "s2"))
                        .with_work_item("42", "Refresh fixtures"),
                ),
        );
        let config = BuildConfiguration::new(SelectionMode::RepositoryWorkspace {
            name: "build-ws".to_string(),
        })
        .with_destination("sandbox");

        let repository = dir.join("repository.json");
        std::fs::write(&repository, serde_json::to_string(&fixture).unwrap()).unwrap();
        let config_path = dir.join("job.json");
        std::fs::write(&config_path, serde_json::to_string(&config).unwrap()).unwrap();

        JobArgs {
            config: config_path,
            repository,
            workdir: dir.to_path_buf(),
        }
    }

    #[tokio::test]
    async fn plan_lists_components_without_loading() {
        let dir = tempfile::tempdir().unwrap();
        let job = job(dir.path());

        let text = cmd_plan(&job, OutputFormat::Text).await.unwrap();
        assert!(text.contains("component1 -> . (all files)"), "{text}");
        assert!(!dir.path().join("sandbox").exists());

        let json = cmd_plan(&job, OutputFormat::Json).await.unwrap();
        let plan: buildfetch_core::LoadPlan = serde_json::from_str(&json).unwrap();
        assert_eq!(plan.entries.len(), 1);
    }

    #[tokio::test]
    async fn fetch_writes_change_log_and_properties() {
        let dir = tempfile::tempdir().unwrap();
        let job = job(dir.path());
        let changelog = dir.path().join("out/changelog.xml");
        let properties = dir.path().join("properties.json");

        let summary = cmd_fetch(&job, Some(&changelog), Some(&properties))
            .await
            .unwrap();
        assert!(summary.contains("Accepted 1 change sets"), "{summary}");
        assert!(dir.path().join("sandbox/f/a.txt").is_file());

        let props: std::collections::BTreeMap<String, String> =
            serde_json::from_str(&std::fs::read_to_string(&properties).unwrap()).unwrap();
        assert_eq!(
            props.get("team_scm_changesAccepted").map(String::as_str),
            Some("1")
        );

        let shown = cmd_changelog_show(&changelog, OutputFormat::Text).await.unwrap();
        assert!(shown.contains("Baseline:  build-ws build #1"), "{shown}");
        assert!(shown.contains("[component1] Update a"), "{shown}");
        assert!(shown.contains("work item 42: Refresh fixtures"), "{shown}");
        assert!(shown.contains("Modified f/a.txt"), "{shown}");

        let json = cmd_changelog_show(&changelog, OutputFormat::Json).await.unwrap();
        let report: ChangeReport = serde_json::from_str(&json).unwrap();
        assert_eq!(report.accepted_count(), 1);
    }

    #[tokio::test]
    async fn missing_config_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut job = job(dir.path());
        job.config = dir.path().join("missing.json");
        let err = cmd_plan(&job, OutputFormat::Text).await.unwrap_err();
        assert!(format!("{err:#}").contains("missing.json"));
    }

    #[test]
    fn cli_parses_fetch_arguments() {
        let cli = Cli::try_parse_from([
            "buildfetch",
            "--verbose",
            "fetch",
            "--config",
            "job.json",
            "--repository",
            "repo.json",
            "--changelog",
            "changelog.xml",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Fetch { job, changelog, .. } => {
                assert_eq!(job.config, PathBuf::from("job.json"));
                assert_eq!(job.workdir, PathBuf::from("."));
                assert_eq!(changelog, Some(PathBuf::from("changelog.xml")));
            }
            _ => panic!("expected fetch"),
        }
    }
}
