//! Source-control object model shared by connectors and the core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::version::ServerVersion;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Opaque, stable identity of a repository item (component, workspace,
/// change set, versionable, baseline set).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub String);

impl ItemId {
    /// Generate a new random item id
    pub fn new() -> Self {
        ItemId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        ItemId(s.to_string())
    }
}

/// A component of a workspace, stream or snapshot.
///
/// Names are not unique; `item_id` is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentDescriptor {
    pub item_id: ItemId,
    pub name: String,
}

impl ComponentDescriptor {
    pub fn new(item_id: impl Into<ItemId>, name: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            name: name.into(),
        }
    }
}

impl From<String> for ItemId {
    fn from(s: String) -> Self {
        ItemId(s)
    }
}

// ---------------------------------------------------------------------------
// Source selection
// ---------------------------------------------------------------------------

/// The source-control state a build loads from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SelectionMode {
    /// A private incremental line owned by the build
    RepositoryWorkspace { name: String },
    /// A shared incremental line
    Stream { name: String },
    /// An immutable point-in-time set
    Snapshot { name: String },
    /// The workspace recorded on a build definition
    BuildDefinition { id: String },
}

impl SelectionMode {
    /// Human-readable kind, used in messages.
    pub fn kind(&self) -> &'static str {
        match self {
            SelectionMode::RepositoryWorkspace { .. } => "Repository workspace",
            SelectionMode::Stream { .. } => "Stream",
            SelectionMode::Snapshot { .. } => "Snapshot",
            SelectionMode::BuildDefinition { .. } => "Build definition",
        }
    }

    pub fn name(&self) -> &str {
        match self {
            SelectionMode::RepositoryWorkspace { name }
            | SelectionMode::Stream { name }
            | SelectionMode::Snapshot { name } => name,
            SelectionMode::BuildDefinition { id } => id,
        }
    }
}

impl fmt::Display for SelectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.kind(), self.name())
    }
}

/// Server-side handle for a resolved selection.
///
/// Stream and snapshot selections are loaded through a build workspace the
/// server creates; `workspace_id` always names the workspace that is
/// accepted into and loaded from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceHandle {
    pub selection: SelectionMode,
    pub workspace_id: ItemId,
    pub snapshot_id: Option<ItemId>,
}

/// Result of a connection probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub version: ServerVersion,
}

// ---------------------------------------------------------------------------
// Change data
// ---------------------------------------------------------------------------

/// A work item linked to a change set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItemDesc {
    pub number: String,
    pub summary: String,
}

/// One versionable touched by a change set, as reported by the server.
///
/// A missing state means the item did not exist on that side; a missing
/// path means the server could not resolve it (for example because the
/// component was discarded).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawVersionableChange {
    pub item_id: ItemId,
    #[serde(default)]
    pub before_path: Option<String>,
    #[serde(default)]
    pub after_path: Option<String>,
    #[serde(default)]
    pub before_state: Option<String>,
    #[serde(default)]
    pub after_state: Option<String>,
}

impl RawVersionableChange {
    /// A versionable created by the change set.
    pub fn added(item_id: impl Into<ItemId>, path: &str, state: &str) -> Self {
        Self {
            item_id: item_id.into(),
            before_path: None,
            after_path: Some(path.to_string()),
            before_state: None,
            after_state: Some(state.to_string()),
        }
    }

    /// A versionable whose content changed in place.
    pub fn modified(item_id: impl Into<ItemId>, path: &str, before: &str, after: &str) -> Self {
        Self {
            item_id: item_id.into(),
            before_path: Some(path.to_string()),
            after_path: Some(path.to_string()),
            before_state: Some(before.to_string()),
            after_state: Some(after.to_string()),
        }
    }

    /// A versionable removed by the change set.
    pub fn deleted(item_id: impl Into<ItemId>, path: &str, state: &str) -> Self {
        Self {
            item_id: item_id.into(),
            before_path: Some(path.to_string()),
            after_path: None,
            before_state: Some(state.to_string()),
            after_state: None,
        }
    }

    /// Best path the server knows for this versionable.
    pub fn path(&self) -> Option<&str> {
        self.after_path.as_deref().or(self.before_path.as_deref())
    }
}

/// A change set as returned by the accept operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawChangeSet {
    pub item_id: ItemId,
    pub component: ComponentDescriptor,
    #[serde(default)]
    pub comment: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub changes: Vec<RawVersionableChange>,
    /// First entry is the primary work item
    #[serde(default)]
    pub work_items: Vec<WorkItemDesc>,
}

/// Whether a component joined or left the workspace's component list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentAction {
    Add,
    Drop,
}

impl ComponentAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentAction::Add => "add",
            ComponentAction::Drop => "drop",
        }
    }
}

/// A component added to or dropped from the workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentChange {
    pub component: ComponentDescriptor,
    pub action: ComponentAction,
}

/// Baseline set (snapshot) created after a successful accept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaselineIdentity {
    pub item_id: ItemId,
    pub name: String,
}

/// Everything the accept operation reports back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptOutcome {
    pub accepted: Vec<RawChangeSet>,
    pub discarded: Vec<RawChangeSet>,
    pub component_changes: Vec<ComponentChange>,
    pub baseline: Option<BaselineIdentity>,
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// One component to materialize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadRequestEntry {
    pub component: ComponentDescriptor,
    /// Component-relative paths to load; `None` loads the full tree
    pub selections: Option<Vec<String>>,
    /// Absolute directory the component's tree is rooted at
    pub target_dir: PathBuf,
}

impl LoadRequestEntry {
    /// Whether a component-relative path falls inside this entry's scope.
    ///
    /// A path is selected when it equals a selection or lies beneath one.
    pub fn includes(&self, path: &str) -> bool {
        match &self.selections {
            None => true,
            Some(selections) => {
                let path = normalize_path(path);
                selections.iter().any(|sel| {
                    let sel = normalize_path(sel);
                    sel.is_empty()
                        || path == sel
                        || (path.starts_with(sel) && path.as_bytes().get(sel.len()) == Some(&b'/'))
                })
            }
        }
    }
}

/// Materialization request handed to the connector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadRequest {
    pub destination_root: PathBuf,
    pub entries: Vec<LoadRequestEntry>,
}

/// What the load operation wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadOutcome {
    pub files_written: Vec<PathBuf>,
}

/// Strip leading/trailing separators from a repository path.
pub fn normalize_path(path: &str) -> &str {
    path.trim_matches('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(selections: Option<Vec<&str>>) -> LoadRequestEntry {
        LoadRequestEntry {
            component: ComponentDescriptor::new("c1", "component1"),
            selections: selections.map(|s| s.into_iter().map(String::from).collect()),
            target_dir: PathBuf::from("/tmp/x"),
        }
    }

    #[test]
    fn full_load_includes_everything() {
        assert!(entry(None).includes("a/b/c.txt"));
    }

    #[test]
    fn folder_selection_includes_children_only() {
        let e = entry(Some(vec!["/src"]));
        assert!(e.includes("src/main.rs"));
        assert!(e.includes("/src"));
        assert!(!e.includes("srcx/main.rs"));
        assert!(!e.includes("doc/readme.md"));
    }

    #[test]
    fn file_selection_is_exact() {
        let e = entry(Some(vec!["f/a.txt"]));
        assert!(e.includes("f/a.txt"));
        assert!(!e.includes("f/a.txt.bak"));
    }

    #[test]
    fn path_prefers_after_side() {
        let mut change = RawVersionableChange::modified("v1", "old/a.txt", "s1", "s2");
        change.after_path = Some("new/a.txt".to_string());
        assert_eq!(change.path(), Some("new/a.txt"));
    }

    #[test]
    fn selection_mode_serde_tagged() {
        let mode: SelectionMode =
            serde_json::from_str(r#"{"type":"stream","name":"main"}"#).unwrap();
        assert_eq!(
            mode,
            SelectionMode::Stream {
                name: "main".to_string()
            }
        );
        assert_eq!(mode.to_string(), "Stream 'main'");
    }
}
