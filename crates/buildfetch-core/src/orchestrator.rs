//! Accept & Load Orchestrator
//!
//! One build runs these steps strictly in order, stopping at the first
//! failure:
//!
//! ```text
//! resolve plan -> [DELETE destination] -> [ACCEPT] -> LOAD -> report + properties
//! ```
//!
//! Partially loaded content is not rolled back; the next build's DELETE
//! step is expected to clean it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use buildfetch_scm::{
    AcceptOutcome, ComponentDescriptor, ItemId, LoadRequest, RawChangeSet, ScmConnector,
    ServerInfo, SourceHandle,
};

use crate::changelog::{build_report, ChangeReport};
use crate::components::{resolve_component_set, ComponentSet};
use crate::config::BuildConfiguration;
use crate::error::{EnvironmentError, Result};
use crate::layout::{plan_layout, validate_destination, HostOs};
use crate::load_rules::{resolve_load_rule_source, LoadRuleReference, ResolvedLoadRules};
use crate::plan::LoadPlan;
use crate::progress::ProgressSink;
use crate::properties::{BuildProperties, PropertyInputs};

/// Name of the metadata entry written at the destination root.
pub const METADATA_FILE: &str = ".buildfetch.json";

/// Contents of [`METADATA_FILE`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxMetadata {
    pub workspace_id: ItemId,
    pub plan_digest: String,
    pub components: Vec<String>,
    pub loaded_at: DateTime<Utc>,
}

/// Everything resolved before the first file system change.
#[derive(Debug, Clone)]
pub struct ResolvedFetch {
    /// Configuration in effect for this run (personal overrides applied)
    pub config: BuildConfiguration,
    pub server: ServerInfo,
    pub source: SourceHandle,
    pub components: Vec<ComponentDescriptor>,
    pub reference: Option<LoadRuleReference>,
    pub component_set: ComponentSet,
    pub plan: LoadPlan,
}

/// Result of a completed fetch.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub resolved: ResolvedFetch,
    pub files_written: Vec<PathBuf>,
    pub report: ChangeReport,
    pub properties: BuildProperties,
}

/// Runs fetches against one connector.
pub struct FetchOrchestrator {
    connector: Arc<dyn ScmConnector>,
    progress: Arc<dyn ProgressSink>,
    working_dir: PathBuf,
    os: HostOs,
}

impl FetchOrchestrator {
    pub fn new(
        connector: Arc<dyn ScmConnector>,
        progress: Arc<dyn ProgressSink>,
        working_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            connector,
            progress,
            working_dir: working_dir.into(),
            os: HostOs::current(),
        }
    }

    /// Validate paths with another OS's rules.
    pub fn with_host_os(mut self, os: HostOs) -> Self {
        self.os = os;
        self
    }

    /// Resolve the load plan without touching the file system.
    pub async fn resolve_plan(&self, config: &BuildConfiguration) -> Result<ResolvedFetch> {
        let config = config.for_run();
        // Reject a bad destination before talking to the server.
        validate_destination(&config.fetch_destination, &self.working_dir, self.os)?;

        let connector = self.connector.as_ref();
        let server = connector.test_connection().await?;
        let source = connector.resolve_source(&config.selection).await?;
        self.progress.progress(&format!(
            "Resolved {} to workspace {}",
            config.selection, source.workspace_id
        ));

        let components = connector.list_components(&source).await?;
        let reference = resolve_load_rule_source(
            connector,
            &source,
            &components,
            &config.load_rules,
            config.load_policy,
            &server.version,
        )
        .await?;
        let rules = match &reference {
            Some(reference) => ResolvedLoadRules::from_reference(reference, &components)?,
            None => ResolvedLoadRules::none(),
        };

        let component_set = resolve_component_set(&components, &config, &rules)?;
        let plan = plan_layout(&component_set, &config, &self.working_dir, self.os)?;

        info!(
            source = %config.selection,
            server_version = %server.version,
            components = plan.entries.len(),
            digest = %plan.digest(),
            "Resolved load plan"
        );

        Ok(ResolvedFetch {
            config,
            server,
            source,
            components,
            reference,
            component_set,
            plan,
        })
    }

    /// Run delete, accept and load for `config`.
    pub async fn run(&self, config: &BuildConfiguration) -> Result<FetchOutcome> {
        let resolved = self.resolve_plan(config).await?;
        let config = &resolved.config;
        let root = resolved.plan.destination_root.clone();

        if config.delete_before_fetch {
            self.progress
                .progress(&format!("Deleting contents of {}", root.display()));
            clear_destination(&root).await?;
        }

        let request = resolved.plan.to_request();

        let accept_outcome = if config.accept_before_fetch {
            self.progress.progress(&format!(
                "Accepting changes into workspace {}",
                resolved.source.workspace_id
            ));
            let outcome = self
                .connector
                .accept(&resolved.source, &resolved.plan.component_ids())
                .await?;
            let outcome = rescope_to_rules(outcome, &request);
            self.progress.progress(&format!(
                "Accepted {} change sets, discarded {}",
                outcome.accepted.len(),
                outcome.discarded.len()
            ));
            Some(outcome)
        } else {
            None
        };

        self.progress.progress(&format!(
            "Loading {} components into {}",
            resolved.plan.entries.len(),
            root.display()
        ));
        ensure_directory(&root).await?;
        let loaded = match self.connector.load(&resolved.source, &request).await {
            Ok(loaded) => loaded,
            Err(err) => {
                warn!(
                    destination = %root.display(),
                    error = %err,
                    "Load failed; destination may hold partially loaded content"
                );
                return Err(err.into());
            }
        };
        write_metadata(&resolved, &root).await?;

        let outcome = accept_outcome.clone().unwrap_or_default();
        let report = build_report(
            &resolved.source.workspace_id,
            &outcome,
            config.is_personal_build(),
        );
        let properties = BuildProperties::compute(PropertyInputs {
            config,
            source: &resolved.source,
            reference: resolved.reference.as_ref(),
            component_set: &resolved.component_set,
            changes_accepted: accept_outcome.as_ref().map(|_| report.accepted_count()),
            // A personal build's baseline is not a build snapshot.
            baseline: outcome
                .baseline
                .as_ref()
                .filter(|_| !config.is_personal_build()),
        });

        info!(
            files = loaded.files_written.len(),
            accepted = report.accepted_count(),
            discarded = report.discarded_count(),
            personal_build = report.personal_build,
            "Fetch completed"
        );

        Ok(FetchOutcome {
            resolved,
            files_written: loaded.files_written,
            report,
            properties,
        })
    }
}

/// Move accepted change sets that touch nothing inside their component's
/// load rule into the discarded list.
fn rescope_to_rules(outcome: AcceptOutcome, request: &LoadRequest) -> AcceptOutcome {
    let in_scope = |cs: &RawChangeSet| {
        let Some(entry) = request
            .entries
            .iter()
            .find(|e| e.component.item_id == cs.component.item_id)
        else {
            return false;
        };
        cs.changes.is_empty()
            || cs
                .changes
                .iter()
                .filter_map(|c| c.path())
                .any(|path| entry.includes(path))
    };

    let AcceptOutcome {
        accepted,
        mut discarded,
        component_changes,
        baseline,
    } = outcome;
    let (accepted, out_of_scope): (Vec<_>, Vec<_>) = accepted.into_iter().partition(in_scope);
    discarded.extend(out_of_scope);
    AcceptOutcome {
        accepted,
        discarded,
        component_changes,
        baseline,
    }
}

async fn directory_state(root: &Path) -> std::result::Result<bool, EnvironmentError> {
    match tokio::fs::metadata(root).await {
        Ok(meta) if meta.is_dir() => Ok(true),
        Ok(_) => Err(EnvironmentError::DestinationNotDirectory {
            path: root.to_path_buf(),
        }),
        Err(err) if err.kind() == IoErrorKind::NotFound => Ok(false),
        Err(source) => Err(EnvironmentError::DeleteFailed {
            path: root.to_path_buf(),
            source,
        }),
    }
}

/// Remove everything below `root`, keeping `root` itself.
async fn clear_destination(root: &Path) -> std::result::Result<(), EnvironmentError> {
    if !directory_state(root).await? {
        return Ok(());
    }
    let delete_failed = |path: &Path, source| EnvironmentError::DeleteFailed {
        path: path.to_path_buf(),
        source,
    };
    let mut entries = tokio::fs::read_dir(root)
        .await
        .map_err(|e| delete_failed(root, e))?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| delete_failed(root, e))?
    {
        let path = entry.path();
        let file_type = entry
            .file_type()
            .await
            .map_err(|e| delete_failed(&path, e))?;
        let removed = if file_type.is_dir() {
            tokio::fs::remove_dir_all(&path).await
        } else {
            tokio::fs::remove_file(&path).await
        };
        removed.map_err(|e| delete_failed(&path, e))?;
    }
    Ok(())
}

async fn ensure_directory(root: &Path) -> std::result::Result<(), EnvironmentError> {
    if directory_state(root).await? {
        return Ok(());
    }
    tokio::fs::create_dir_all(root)
        .await
        .map_err(|source| EnvironmentError::CreateFailed {
            path: root.to_path_buf(),
            source,
        })
}

async fn write_metadata(
    resolved: &ResolvedFetch,
    root: &Path,
) -> std::result::Result<(), EnvironmentError> {
    let path = root.join(METADATA_FILE);
    let metadata = SandboxMetadata {
        workspace_id: resolved.source.workspace_id.clone(),
        plan_digest: resolved.plan.digest(),
        components: resolved.plan.component_names(),
        loaded_at: Utc::now(),
    };
    let write_failed = |source| EnvironmentError::WriteFailed {
        path: path.clone(),
        source,
    };
    let json = serde_json::to_vec_pretty(&metadata)
        .map_err(|e| write_failed(std::io::Error::new(IoErrorKind::InvalidData, e)))?;
    tokio::fs::write(&path, json).await.map_err(write_failed)
}
