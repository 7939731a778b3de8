//! Load rules: restricting which paths of a component reach the sandbox.
//!
//! - [`source`] classifies and validates the configured rule files
//! - `xml` / `legacy` parse the two file formats
//! - [`ResolvedLoadRules`] maps each restricted component to its selections

mod legacy;
pub mod source;
mod xml;

use serde::{Deserialize, Serialize};
use tracing::warn;

use buildfetch_scm::{normalize_path, ComponentDescriptor, ItemId};

use crate::components::find_component_by_name;
use crate::config::LoadRuleFileSpec;
use crate::error::ConfigurationError;

pub use source::{
    detect_format, gate_before_read, minimum_load_rules_version, resolve_load_rule_source,
    supports_load_rule_only_mode, validate_reference, LOAD_RULES_MINIMUM_VERSION,
};

/// On-disk format of a load-rule file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LoadRuleFormat {
    LegacyLineOriented,
    XmlPerComponent,
}

/// How many files make up the reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LoadRuleScope {
    Single,
    PerComponentMultiple,
}

/// Component named inside a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ComponentRef {
    Name(String),
    ItemId(ItemId),
}

impl ComponentRef {
    fn refers_to(&self, component: &ComponentDescriptor) -> bool {
        match self {
            ComponentRef::Name(name) => name.trim() == component.name,
            ComponentRef::ItemId(id) => id == &component.item_id,
        }
    }
}

/// One rule as parsed, before component resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RuleEntry {
    pub(crate) component: Option<ComponentRef>,
    pub(crate) path: String,
}

/// A rule file read from the repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRuleFile {
    pub spec: LoadRuleFileSpec,
    /// Component the file is stored in
    pub owner: ComponentDescriptor,
    pub format: LoadRuleFormat,
    pub content: String,
}

/// Classified set of configured rule files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRuleReference {
    /// `LegacyLineOriented` as soon as any file uses it
    pub format: LoadRuleFormat,
    pub scope: LoadRuleScope,
    pub files: Vec<LoadRuleFile>,
}

impl LoadRuleReference {
    pub fn classify(files: Vec<LoadRuleFile>) -> Option<Self> {
        if files.is_empty() {
            return None;
        }
        let format = if files
            .iter()
            .any(|f| f.format == LoadRuleFormat::LegacyLineOriented)
        {
            LoadRuleFormat::LegacyLineOriented
        } else {
            LoadRuleFormat::XmlPerComponent
        };
        let scope = if files.len() > 1 {
            LoadRuleScope::PerComponentMultiple
        } else {
            LoadRuleScope::Single
        };
        Some(Self {
            format,
            scope,
            files,
        })
    }

    /// `component:path` list as configured, comma-joined.
    pub fn describe(&self) -> String {
        self.files
            .iter()
            .map(|f| f.spec.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Paths one component loads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentLoadRule {
    pub component: ComponentDescriptor,
    /// Component-relative, without leading `/`
    pub selections: Vec<String>,
}

/// Rules keyed by component, in order of first appearance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedLoadRules {
    rules: Vec<ComponentLoadRule>,
}

impl ResolvedLoadRules {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ComponentLoadRule> {
        self.rules.iter()
    }

    pub fn for_component(&self, item_id: &ItemId) -> Option<&ComponentLoadRule> {
        self.rules.iter().find(|r| &r.component.item_id == item_id)
    }

    fn add(&mut self, component: &ComponentDescriptor, path: &str) {
        let path = normalize_path(path).to_string();
        match self
            .rules
            .iter_mut()
            .find(|r| r.component.item_id == component.item_id)
        {
            Some(rule) => {
                if !rule.selections.contains(&path) {
                    rule.selections.push(path);
                }
            }
            None => self.rules.push(ComponentLoadRule {
                component: component.clone(),
                selections: vec![path],
            }),
        }
    }

    /// Parse every file of `reference` and bind its rules to components.
    pub fn from_reference(
        reference: &LoadRuleReference,
        components: &[ComponentDescriptor],
    ) -> Result<Self, ConfigurationError> {
        let mut resolved = Self::default();
        for file in &reference.files {
            let label = file.spec.to_string();
            let entries = match file.format {
                LoadRuleFormat::XmlPerComponent => xml::parse(&label, &file.content)?,
                LoadRuleFormat::LegacyLineOriented => legacy::parse(&label, &file.content)?,
            };

            for entry in entries {
                let target = match &entry.component {
                    None => file.owner.clone(),
                    Some(reference_to) if reference.scope == LoadRuleScope::PerComponentMultiple => {
                        if !reference_to.refers_to(&file.owner) {
                            warn!(
                                file = %label,
                                owner = %file.owner.name,
                                "Ignoring rule for another component in a per-component load rule file"
                            );
                            continue;
                        }
                        file.owner.clone()
                    }
                    Some(ComponentRef::Name(name)) => find_component_by_name(components, name)?
                        .ok_or_else(|| ConfigurationError::ComponentNotFound {
                            name: name.clone(),
                        })?
                        .clone(),
                    Some(ComponentRef::ItemId(id)) => components
                        .iter()
                        .find(|c| &c.item_id == id)
                        .ok_or_else(|| ConfigurationError::ComponentNotFound {
                            name: id.to_string(),
                        })?
                        .clone(),
                };
                resolved.add(&target, &entry.path);
            }
        }
        Ok(resolved)
    }
}
