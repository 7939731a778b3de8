//! Build property map handed to the CI host after a fetch.
//!
//! Keys are stable; booleans are `"true"`/`"false"`; values that do not
//! apply to this run are left out instead of being emitted empty.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use buildfetch_scm::{BaselineIdentity, ComponentDescriptor, SourceHandle};

use crate::components::{ComponentSet, ResolutionBranch};
use crate::config::BuildConfiguration;
use crate::load_rules::LoadRuleReference;

pub const WORKSPACE_UUID: &str = "team_scm_workspaceUUID";
pub const FETCH_DESTINATION: &str = "team_scm_fetchDestination";
pub const DELETE_DESTINATION_BEFORE_FETCH: &str = "team_scm_deleteDestinationBeforeFetch";
pub const ACCEPT_BEFORE_FETCH: &str = "team_scm_acceptBeforeFetch";
pub const COMPONENT_LOAD_RULES: &str = "team_scm_componentLoadRules";
pub const INCLUDE_COMPONENTS: &str = "team_scm_includeComponents";
pub const LOAD_COMPONENTS: &str = "team_scm_loadComponents";
pub const SNAPSHOT_UUID: &str = "team_scm_snapshotUUID";
pub const CHANGES_ACCEPTED: &str = "team_scm_changesAccepted";
pub const CREATE_FOLDERS_FOR_COMPONENTS: &str = "team_scm_createFoldersForComponents";
pub const LOAD_POLICY: &str = "team_scm_loadPolicy";
pub const COMPONENT_LOAD_CONFIG: &str = "team_scm_componentLoadConfig";

/// Flat string map of build properties.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildProperties(BTreeMap<String, String>);

/// What a run resolved and did, as far as properties are concerned.
#[derive(Debug, Clone, Copy)]
pub struct PropertyInputs<'a> {
    /// The configuration the run used (personal overrides already applied)
    pub config: &'a BuildConfiguration,
    pub source: &'a SourceHandle,
    pub reference: Option<&'a LoadRuleReference>,
    pub component_set: &'a ComponentSet,
    /// Accepted change-set count; `None` when accept did not run
    pub changes_accepted: Option<usize>,
    pub baseline: Option<&'a BaselineIdentity>,
}

fn flag(value: bool) -> String {
    value.to_string()
}

fn join_ids(components: &[ComponentDescriptor]) -> String {
    components
        .iter()
        .map(|c| c.item_id.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

impl BuildProperties {
    /// Compute the property map for one run.
    pub fn compute(inputs: PropertyInputs<'_>) -> Self {
        let PropertyInputs {
            config,
            source,
            reference,
            component_set,
            changes_accepted,
            baseline,
        } = inputs;
        let mut props = Self::default();

        props.insert(WORKSPACE_UUID, source.workspace_id.as_str());
        props.insert(FETCH_DESTINATION, &config.fetch_destination);
        props.insert(DELETE_DESTINATION_BEFORE_FETCH, &flag(config.delete_before_fetch));
        props.insert(ACCEPT_BEFORE_FETCH, &flag(config.accept_before_fetch));
        props.insert(
            CREATE_FOLDERS_FOR_COMPONENTS,
            &flag(config.create_folders_for_components),
        );

        if let Some(reference) = reference {
            props.insert(COMPONENT_LOAD_RULES, &reference.describe());
        }

        match component_set.branch {
            ResolutionBranch::LegacyInclude => {
                props.insert(INCLUDE_COMPONENTS, &flag(true));
                props.insert_non_empty(LOAD_COMPONENTS, join_ids(&component_set.named));
            }
            ResolutionBranch::LegacyExclude | ResolutionBranch::ExcludeSomeComponents => {
                props.insert_non_empty(LOAD_COMPONENTS, join_ids(&component_set.named));
            }
            ResolutionBranch::LoadRulesOnly
            | ResolutionBranch::LoadAllComponents
            | ResolutionBranch::LegacyAll => {}
        }

        let snapshot = baseline
            .map(|b| &b.item_id)
            .or(source.snapshot_id.as_ref());
        if let Some(snapshot) = snapshot {
            props.insert(SNAPSHOT_UUID, snapshot.as_str());
        }

        if let Some(count) = changes_accepted {
            props.insert(CHANGES_ACCEPTED, &count.to_string());
        }
        if let Some(policy) = config.load_policy {
            props.insert(LOAD_POLICY, policy.as_str());
        }
        if let Some(component_config) = config.component_load_config {
            props.insert(COMPONENT_LOAD_CONFIG, component_config.as_str());
        }

        if let Some(personal) = &config.personal_build {
            for (key, value) in &personal.build_properties {
                props.insert(key, value);
            }
        }
        props
    }

    pub fn insert(&mut self, key: &str, value: &str) {
        self.0.insert(key.to_string(), value.to_string());
    }

    fn insert_non_empty(&mut self, key: &str, value: String) {
        if !value.is_empty() {
            self.0.insert(key.to_string(), value);
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn into_inner(self) -> BTreeMap<String, String> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::ComponentSelection;
    use crate::config::{ComponentLoadConfig, LoadPolicy, PersonalBuildOverrides};
    use buildfetch_scm::{ItemId, SelectionMode};

    fn source(snapshot: Option<&str>) -> SourceHandle {
        SourceHandle {
            selection: SelectionMode::Stream {
                name: "main".to_string(),
            },
            workspace_id: ItemId::from("_ws"),
            snapshot_id: snapshot.map(ItemId::from),
        }
    }

    fn set(branch: ResolutionBranch, named: &[(&str, &str)]) -> ComponentSet {
        ComponentSet {
            branch,
            selections: vec![ComponentSelection {
                component: ComponentDescriptor::new("_c1", "component1"),
                rule: None,
            }],
            named: named
                .iter()
                .map(|(id, name)| ComponentDescriptor::new(*id, *name))
                .collect(),
        }
    }

    fn config() -> BuildConfiguration {
        BuildConfiguration::new(SelectionMode::Stream {
            name: "main".to_string(),
        })
    }

    #[test]
    fn defaults_emit_only_fixed_keys() {
        let cfg = config();
        let props = BuildProperties::compute(PropertyInputs {
            config: &cfg,
            source: &source(None),
            reference: None,
            component_set: &set(ResolutionBranch::LegacyAll, &[]),
            changes_accepted: None,
            baseline: None,
        });
        assert_eq!(props.get(WORKSPACE_UUID), Some("_ws"));
        assert_eq!(props.get(FETCH_DESTINATION), Some("."));
        assert_eq!(props.get(ACCEPT_BEFORE_FETCH), Some("true"));
        assert_eq!(props.get(DELETE_DESTINATION_BEFORE_FETCH), Some("false"));
        for absent in [
            INCLUDE_COMPONENTS,
            LOAD_COMPONENTS,
            LOAD_POLICY,
            COMPONENT_LOAD_CONFIG,
            CHANGES_ACCEPTED,
            SNAPSHOT_UUID,
            COMPONENT_LOAD_RULES,
        ] {
            assert!(!props.contains(absent), "{absent} should be absent");
        }
    }

    #[test]
    fn legacy_whitelist_emits_include_flag_and_ids() {
        let cfg = config().with_load_components(&["component2"], true);
        let props = BuildProperties::compute(PropertyInputs {
            config: &cfg,
            source: &source(None),
            reference: None,
            component_set: &set(ResolutionBranch::LegacyInclude, &[("_c2", "component2")]),
            changes_accepted: None,
            baseline: None,
        });
        assert_eq!(props.get(INCLUDE_COMPONENTS), Some("true"));
        assert_eq!(props.get(LOAD_COMPONENTS), Some("_c2"));
    }

    #[test]
    fn legacy_blacklist_emits_ids_without_include_flag() {
        let cfg = config().with_load_components(&["component2", "component3"], false);
        let props = BuildProperties::compute(PropertyInputs {
            config: &cfg,
            source: &source(None),
            reference: None,
            component_set: &set(
                ResolutionBranch::LegacyExclude,
                &[("_c2", "component2"), ("_c3", "component3")],
            ),
            changes_accepted: Some(2),
            baseline: None,
        });
        assert!(!props.contains(INCLUDE_COMPONENTS));
        assert_eq!(props.get(LOAD_COMPONENTS), Some("_c2,_c3"));
        assert_eq!(props.get(CHANGES_ACCEPTED), Some("2"));
    }

    #[test]
    fn explicit_policy_and_snapshot() {
        let cfg = config()
            .with_load_policy(LoadPolicy::UseComponentLoadConfig)
            .with_component_load_config(ComponentLoadConfig::LoadAllComponents);
        let baseline = BaselineIdentity {
            item_id: ItemId::from("_bs"),
            name: "main build #1".to_string(),
        };
        let props = BuildProperties::compute(PropertyInputs {
            config: &cfg,
            source: &source(Some("_snap")),
            reference: None,
            component_set: &set(ResolutionBranch::LoadAllComponents, &[]),
            changes_accepted: Some(0),
            baseline: Some(&baseline),
        });
        assert_eq!(props.get(LOAD_POLICY), Some("useComponentLoadConfig"));
        assert_eq!(props.get(COMPONENT_LOAD_CONFIG), Some("loadAllComponents"));
        assert_eq!(props.get(SNAPSHOT_UUID), Some("_bs"));
        assert!(!props.contains(INCLUDE_COMPONENTS));
    }

    #[test]
    fn personal_overrides_win() {
        let mut overrides = PersonalBuildOverrides::default();
        overrides
            .build_properties
            .insert(FETCH_DESTINATION.to_string(), "personal".to_string());
        let cfg = config().with_personal_build(overrides);
        let props = BuildProperties::compute(PropertyInputs {
            config: &cfg,
            source: &source(Some("_snap")),
            reference: None,
            component_set: &set(ResolutionBranch::LegacyAll, &[]),
            changes_accepted: None,
            baseline: None,
        });
        assert_eq!(props.get(FETCH_DESTINATION), Some("personal"));
        assert_eq!(props.get(SNAPSHOT_UUID), Some("_snap"));
    }
}
