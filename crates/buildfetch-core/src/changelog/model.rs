//! In-memory change report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use buildfetch_scm::{ComponentAction, ItemId, WorkItemDesc};

/// How a versionable changed within one change set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModificationKind {
    Added,
    Modified,
    Deleted,
    #[serde(rename = "Modified and Moved")]
    ModifiedAndMoved,
    /// Before and after state are identical (merge artifact)
    #[serde(rename = "No changes")]
    NoChanges,
}

impl ModificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModificationKind::Added => "Added",
            ModificationKind::Modified => "Modified",
            ModificationKind::Deleted => "Deleted",
            ModificationKind::ModifiedAndMoved => "Modified and Moved",
            ModificationKind::NoChanges => "No changes",
        }
    }
}

impl fmt::Display for ModificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModificationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Added" => Ok(ModificationKind::Added),
            "Modified" => Ok(ModificationKind::Modified),
            "Deleted" => Ok(ModificationKind::Deleted),
            "Modified and Moved" => Ok(ModificationKind::ModifiedAndMoved),
            "No changes" => Ok(ModificationKind::NoChanges),
            other => Err(format!("unknown modification kind '{other}'")),
        }
    }
}

/// One affected versionable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeDesc {
    pub path: String,
    pub item_id: ItemId,
    pub state_id: Option<String>,
    pub kind: ModificationKind,
}

/// A change set as recorded in the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSetEntry {
    pub change_set_id: ItemId,
    pub component_id: ItemId,
    pub component_name: String,
    pub comment: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Empty when `is_too_many_changes`
    pub affected_versionables: Vec<ChangeDesc>,
    pub work_item: Option<WorkItemDesc>,
    pub additional_work_items: Vec<WorkItemDesc>,
    pub is_too_many_changes: bool,
    /// Number of affected versionables, including truncated ones
    pub change_count: usize,
}

impl ChangeSetEntry {
    /// Count message shown in place of a truncated versionable list.
    pub fn summary_message(&self) -> Option<String> {
        self.is_too_many_changes
            .then(|| format!("{} changes", self.change_count))
    }
}

/// A component added to or dropped from the workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentChangeEntry {
    pub item_id: ItemId,
    pub name: String,
    pub action: ComponentAction,
}

/// Everything that changed since the previous build.
///
/// Built once per build and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeReport {
    pub workspace_item_id: ItemId,
    pub baseline_set_item_id: Option<ItemId>,
    pub baseline_set_name: Option<String>,
    pub personal_build: bool,
    pub component_changes: Vec<ComponentChangeEntry>,
    /// Keyed by component item id; server order within a component
    pub change_sets_accepted: BTreeMap<ItemId, Vec<ChangeSetEntry>>,
    pub change_sets_discarded: BTreeMap<ItemId, Vec<ChangeSetEntry>>,
}

impl ChangeReport {
    /// Report with nothing in it.
    pub fn empty(workspace_item_id: ItemId, personal_build: bool) -> Self {
        Self {
            workspace_item_id,
            baseline_set_item_id: None,
            baseline_set_name: None,
            personal_build,
            component_changes: Vec::new(),
            change_sets_accepted: BTreeMap::new(),
            change_sets_discarded: BTreeMap::new(),
        }
    }

    pub fn accepted_count(&self) -> usize {
        self.change_sets_accepted.values().map(Vec::len).sum()
    }

    pub fn discarded_count(&self) -> usize {
        self.change_sets_discarded.values().map(Vec::len).sum()
    }

    pub fn component_change_count(&self) -> usize {
        self.component_changes.len()
    }

    /// True when the build picked up nothing new.
    pub fn is_empty(&self) -> bool {
        self.accepted_count() == 0 && self.discarded_count() == 0 && self.component_changes.is_empty()
    }
}
