//! Load plan: the immutable output of configuration resolution.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use buildfetch_scm::{ComponentDescriptor, ItemId, LoadRequest, LoadRequestEntry};

/// What part of a component is loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "paths", rename_all = "snake_case")]
pub enum LoadScope {
    Full,
    /// Component-relative paths selected by a load rule
    Rule(Vec<String>),
}

/// One component in the plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadPlanEntry {
    pub component: ComponentDescriptor,
    pub scope: LoadScope,
    /// Relative to the destination root; empty when components share it
    pub subpath: PathBuf,
}

/// Ordered per-component plan plus the destination root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadPlan {
    pub destination_root: PathBuf,
    pub entries: Vec<LoadPlanEntry>,
}

impl LoadPlan {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Absolute directory an entry's tree is rooted at.
    pub fn target_dir(&self, entry: &LoadPlanEntry) -> PathBuf {
        if entry.subpath.as_os_str().is_empty() {
            self.destination_root.clone()
        } else {
            self.destination_root.join(&entry.subpath)
        }
    }

    pub fn component_ids(&self) -> Vec<ItemId> {
        self.entries
            .iter()
            .map(|e| e.component.item_id.clone())
            .collect()
    }

    pub fn component_names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.component.name.clone()).collect()
    }

    /// Connector request for this plan.
    pub fn to_request(&self) -> LoadRequest {
        LoadRequest {
            destination_root: self.destination_root.clone(),
            entries: self
                .entries
                .iter()
                .map(|entry| LoadRequestEntry {
                    component: entry.component.clone(),
                    selections: match &entry.scope {
                        LoadScope::Full => None,
                        LoadScope::Rule(paths) => Some(paths.clone()),
                    },
                    target_dir: self.target_dir(entry),
                })
                .collect(),
        }
    }

    /// SHA-256 over the ordered entries, hex encoded.
    ///
    /// The destination root is left out so the same plan loaded on two
    /// machines has the same digest.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for entry in &self.entries {
            hasher.update(entry.component.item_id.as_str().as_bytes());
            hasher.update([0u8]);
            hasher.update(entry.component.name.as_bytes());
            hasher.update([0u8]);
            match &entry.scope {
                LoadScope::Full => hasher.update(b"full"),
                LoadScope::Rule(paths) => {
                    hasher.update(b"rule");
                    for path in paths {
                        hasher.update([0u8]);
                        hasher.update(path.as_bytes());
                    }
                }
            }
            hasher.update([0u8]);
            hasher.update(path_bytes(&entry.subpath));
            hasher.update([0xffu8]);
        }
        hex::encode(hasher.finalize())
    }
}

fn path_bytes(path: &Path) -> Vec<u8> {
    path.to_string_lossy().replace('\\', "/").into_bytes()
}
