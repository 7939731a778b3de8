//! In-memory connector (testing and offline fixtures)
//!
//! `MemoryRepository` implements `ScmConnector` over a fixture describing
//! workspaces, streams and snapshots, their components' files and the
//! change sets waiting to be accepted. Fixtures can be built in code or
//! read from JSON, which is how the CLI runs plans without a server.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::connector::ScmConnector;
use crate::error::{RepositoryError, RepositoryResult};
use crate::model::*;
use crate::version::ServerVersion;

// ---------------------------------------------------------------------------
// Fixture types
// ---------------------------------------------------------------------------

/// Kind of a fixture source; mirrors `SelectionMode` without the name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    RepositoryWorkspace,
    Stream,
    Snapshot,
    BuildDefinition,
}

impl SourceKind {
    fn of(selection: &SelectionMode) -> Self {
        match selection {
            SelectionMode::RepositoryWorkspace { .. } => SourceKind::RepositoryWorkspace,
            SelectionMode::Stream { .. } => SourceKind::Stream,
            SelectionMode::Snapshot { .. } => SourceKind::Snapshot,
            SelectionMode::BuildDefinition { .. } => SourceKind::BuildDefinition,
        }
    }
}

/// A component and its file tree (component-relative path -> content).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentFixture {
    #[serde(default)]
    pub item_id: Option<ItemId>,
    pub name: String,
    #[serde(default)]
    pub files: BTreeMap<String, String>,
}

impl ComponentFixture {
    pub fn new(name: &str) -> Self {
        Self {
            item_id: None,
            name: name.to_string(),
            files: BTreeMap::new(),
        }
    }

    pub fn with_id(mut self, item_id: &str) -> Self {
        self.item_id = Some(ItemId::from(item_id));
        self
    }

    pub fn with_file(mut self, path: &str, content: &str) -> Self {
        self.files
            .insert(normalize_path(path).to_string(), content.to_string());
        self
    }
}

/// A change set waiting to be accepted, addressed by component name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingChangeSet {
    pub component: String,
    #[serde(default)]
    pub item_id: Option<ItemId>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub timestamp: Option<chrono::DateTime<Utc>>,
    #[serde(default)]
    pub changes: Vec<RawVersionableChange>,
    #[serde(default)]
    pub work_items: Vec<WorkItemDesc>,
}

impl PendingChangeSet {
    pub fn new(component: &str) -> Self {
        Self {
            component: component.to_string(),
            item_id: None,
            comment: None,
            timestamp: None,
            changes: Vec::new(),
            work_items: Vec::new(),
        }
    }

    pub fn with_comment(mut self, comment: &str) -> Self {
        self.comment = Some(comment.to_string());
        self
    }

    pub fn with_change(mut self, change: RawVersionableChange) -> Self {
        self.changes.push(change);
        self
    }

    pub fn with_work_item(mut self, number: &str, summary: &str) -> Self {
        self.work_items.push(WorkItemDesc {
            number: number.to_string(),
            summary: summary.to_string(),
        });
        self
    }
}

/// A component joining or leaving the workspace, addressed by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentChangeFixture {
    pub component: String,
    pub action: ComponentAction,
}

/// One workspace, stream, snapshot or build definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceFixture {
    pub kind: SourceKind,
    pub name: String,
    #[serde(default)]
    pub components: Vec<ComponentFixture>,
    #[serde(default)]
    pub pending: Vec<PendingChangeSet>,
    #[serde(default)]
    pub component_changes: Vec<ComponentChangeFixture>,
}

impl SourceFixture {
    pub fn new(kind: SourceKind, name: &str) -> Self {
        Self {
            kind,
            name: name.to_string(),
            components: Vec::new(),
            pending: Vec::new(),
            component_changes: Vec::new(),
        }
    }

    pub fn workspace(name: &str) -> Self {
        Self::new(SourceKind::RepositoryWorkspace, name)
    }

    pub fn with_component(mut self, component: ComponentFixture) -> Self {
        self.components.push(component);
        self
    }

    pub fn with_pending(mut self, change_set: PendingChangeSet) -> Self {
        self.pending.push(change_set);
        self
    }

    pub fn with_component_change(mut self, component: &str, action: ComponentAction) -> Self {
        self.component_changes.push(ComponentChangeFixture {
            component: component.to_string(),
            action,
        });
        self
    }
}

/// A whole fake server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryFixture {
    pub server_version: ServerVersion,
    #[serde(default)]
    pub sources: Vec<SourceFixture>,
}

impl RepositoryFixture {
    pub fn new(server_version: ServerVersion) -> Self {
        Self {
            server_version,
            sources: Vec::new(),
        }
    }

    pub fn with_source(mut self, source: SourceFixture) -> Self {
        self.sources.push(source);
        self
    }
}

// ---------------------------------------------------------------------------
// MemoryRepository
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct FakeComponent {
    descriptor: ComponentDescriptor,
    files: BTreeMap<String, String>,
}

#[derive(Debug)]
struct FakeSource {
    kind: SourceKind,
    name: String,
    workspace_id: ItemId,
    snapshot_id: Option<ItemId>,
    components: Vec<FakeComponent>,
    pending: Vec<RawChangeSet>,
    component_changes: Vec<ComponentChange>,
    baselines: u32,
}

#[derive(Debug)]
struct RepoState {
    version: ServerVersion,
    sources: Vec<FakeSource>,
    calls: Vec<String>,
    failing: Vec<String>,
}

/// In-memory source-control server backed by a `RepositoryFixture`.
#[derive(Debug)]
pub struct MemoryRepository {
    state: Mutex<RepoState>,
}

impl MemoryRepository {
    /// Build a repository, assigning item ids where the fixture has none.
    pub fn from_fixture(fixture: RepositoryFixture) -> RepositoryResult<Self> {
        let mut sources = Vec::with_capacity(fixture.sources.len());
        for source in fixture.sources {
            sources.push(build_source(source)?);
        }
        Ok(Self {
            state: Mutex::new(RepoState {
                version: fixture.server_version,
                sources,
                calls: Vec::new(),
                failing: Vec::new(),
            }),
        })
    }

    /// Load a JSON `RepositoryFixture` from disk.
    pub fn from_json_file(path: &Path) -> RepositoryResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let fixture: RepositoryFixture = serde_json::from_str(&raw)?;
        Self::from_fixture(fixture)
    }

    /// Make every later call of `operation` fail (e.g. `"load"`).
    pub fn fail_operation(&self, operation: &str) {
        self.state().failing.push(operation.to_string());
    }

    /// Operations invoked so far, as `"<operation>:<source name>"`.
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    /// Item id of a component by source and component name.
    pub fn component_id(&self, source: &str, component: &str) -> Option<ItemId> {
        let state = self.state();
        state
            .sources
            .iter()
            .find(|s| s.name == source)
            .and_then(|s| s.components.iter().find(|c| c.descriptor.name == component))
            .map(|c| c.descriptor.item_id.clone())
    }

    fn state(&self) -> MutexGuard<'_, RepoState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record the call and honour failure injection.
    fn enter(&self, operation: &str, source: &str) -> RepositoryResult<()> {
        let mut state = self.state();
        state.calls.push(format!("{operation}:{source}"));
        if state.failing.iter().any(|op| op == operation) {
            return Err(RepositoryError::OperationFailed {
                operation: operation.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

fn build_source(fixture: SourceFixture) -> RepositoryResult<FakeSource> {
    let components: Vec<FakeComponent> = fixture
        .components
        .into_iter()
        .map(|c| FakeComponent {
            descriptor: ComponentDescriptor {
                item_id: c.item_id.unwrap_or_default(),
                name: c.name,
            },
            files: c.files,
        })
        .collect();

    let lookup = |name: &str| -> RepositoryResult<ComponentDescriptor> {
        components
            .iter()
            .find(|c| c.descriptor.name == name)
            .map(|c| c.descriptor.clone())
            .ok_or_else(|| {
                RepositoryError::InvalidData(format!(
                    "change set references unknown component '{name}' in '{}'",
                    fixture.name
                ))
            })
    };

    let mut pending = Vec::with_capacity(fixture.pending.len());
    for cs in fixture.pending {
        pending.push(RawChangeSet {
            item_id: cs.item_id.unwrap_or_default(),
            component: lookup(&cs.component)?,
            comment: cs.comment,
            timestamp: cs.timestamp.unwrap_or_else(Utc::now),
            changes: cs.changes,
            work_items: cs.work_items,
        });
    }

    // Dropped components need not be part of the current component list.
    let component_changes = fixture
        .component_changes
        .into_iter()
        .map(|cc| ComponentChange {
            component: lookup(&cc.component)
                .unwrap_or_else(|_| ComponentDescriptor::new(ItemId::new(), cc.component)),
            action: cc.action,
        })
        .collect();

    let snapshot_id = match fixture.kind {
        SourceKind::Snapshot => Some(ItemId::new()),
        _ => None,
    };

    Ok(FakeSource {
        kind: fixture.kind,
        name: fixture.name,
        workspace_id: ItemId::new(),
        snapshot_id,
        components,
        pending,
        component_changes,
        baselines: 0,
    })
}

fn find_source<'a>(state: &'a RepoState, handle: &SourceHandle) -> RepositoryResult<&'a FakeSource> {
    state
        .sources
        .iter()
        .find(|s| s.workspace_id == handle.workspace_id)
        .ok_or_else(|| RepositoryError::SourceNotFound {
            kind: handle.selection.kind().to_string(),
            name: handle.selection.name().to_string(),
        })
}

#[async_trait]
impl ScmConnector for MemoryRepository {
    async fn test_connection(&self) -> RepositoryResult<ServerInfo> {
        self.enter("test_connection", "server")?;
        Ok(ServerInfo {
            version: self.state().version.clone(),
        })
    }

    async fn resolve_source(&self, selection: &SelectionMode) -> RepositoryResult<SourceHandle> {
        self.enter("resolve_source", selection.name())?;
        let state = self.state();
        let kind = SourceKind::of(selection);
        let source = state
            .sources
            .iter()
            .find(|s| s.kind == kind && s.name == selection.name())
            .ok_or_else(|| RepositoryError::SourceNotFound {
                kind: selection.kind().to_string(),
                name: selection.name().to_string(),
            })?;
        Ok(SourceHandle {
            selection: selection.clone(),
            workspace_id: source.workspace_id.clone(),
            snapshot_id: source.snapshot_id.clone(),
        })
    }

    async fn list_components(
        &self,
        source: &SourceHandle,
    ) -> RepositoryResult<Vec<ComponentDescriptor>> {
        self.enter("list_components", source.selection.name())?;
        let state = self.state();
        let fake = find_source(&state, source)?;
        Ok(fake.components.iter().map(|c| c.descriptor.clone()).collect())
    }

    async fn read_file(
        &self,
        source: &SourceHandle,
        component: &ItemId,
        path: &str,
    ) -> RepositoryResult<String> {
        self.enter("read_file", source.selection.name())?;
        let state = self.state();
        let fake = find_source(&state, source)?;
        let comp = fake
            .components
            .iter()
            .find(|c| &c.descriptor.item_id == component)
            .ok_or_else(|| RepositoryError::ItemNotFound {
                component: component.to_string(),
                path: path.to_string(),
            })?;
        comp.files
            .get(normalize_path(path))
            .cloned()
            .ok_or_else(|| RepositoryError::ItemNotFound {
                component: comp.descriptor.name.clone(),
                path: path.to_string(),
            })
    }

    async fn accept(
        &self,
        source: &SourceHandle,
        components: &[ItemId],
    ) -> RepositoryResult<AcceptOutcome> {
        self.enter("accept", source.selection.name())?;
        let mut state = self.state();
        let fake = state
            .sources
            .iter_mut()
            .find(|s| s.workspace_id == source.workspace_id)
            .ok_or_else(|| RepositoryError::SourceNotFound {
                kind: source.selection.kind().to_string(),
                name: source.selection.name().to_string(),
            })?;

        let (accepted, discarded): (Vec<_>, Vec<_>) = fake
            .pending
            .drain(..)
            .partition(|cs| components.contains(&cs.component.item_id));
        // Discarded change sets stay pending for a later, wider accept.
        fake.pending = discarded.clone();

        let component_changes = std::mem::take(&mut fake.component_changes);

        let baseline = if fake.kind == SourceKind::Snapshot {
            None
        } else {
            fake.baselines += 1;
            Some(BaselineIdentity {
                item_id: ItemId::new(),
                name: format!("{} build #{}", fake.name, fake.baselines),
            })
        };

        tracing::debug!(
            source = %fake.name,
            accepted = accepted.len(),
            discarded = discarded.len(),
            "Accepted pending change sets"
        );

        Ok(AcceptOutcome {
            accepted,
            discarded,
            component_changes,
            baseline,
        })
    }

    async fn load(
        &self,
        source: &SourceHandle,
        request: &LoadRequest,
    ) -> RepositoryResult<LoadOutcome> {
        self.enter("load", source.selection.name())?;

        // Collect the writes first; the lock must not be held across awaits.
        let mut writes = Vec::new();
        {
            let state = self.state();
            let fake = find_source(&state, source)?;
            for entry in &request.entries {
                if !entry.target_dir.starts_with(&request.destination_root) {
                    return Err(RepositoryError::OperationFailed {
                        operation: "load".to_string(),
                        reason: format!(
                            "target {} is outside destination {}",
                            entry.target_dir.display(),
                            request.destination_root.display()
                        ),
                    });
                }
                let comp = fake
                    .components
                    .iter()
                    .find(|c| c.descriptor.item_id == entry.component.item_id)
                    .ok_or_else(|| RepositoryError::ItemNotFound {
                        component: entry.component.name.clone(),
                        path: "/".to_string(),
                    })?;
                for (path, content) in &comp.files {
                    if entry.includes(path) {
                        writes.push((entry.target_dir.join(path), content.clone()));
                    }
                }
            }
        }

        let mut files_written = Vec::with_capacity(writes.len());
        for (target, content) in writes {
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&target, content).await?;
            files_written.push(target);
        }

        Ok(LoadOutcome { files_written })
    }
}
