//! Component Set Resolver
//!
//! Turns the full component list of the selected source plus the
//! configuration into the ordered set of components to load. Precedence,
//! first match wins:
//!
//! | load policy              | component load config   | effective set                  |
//! |--------------------------|-------------------------|--------------------------------|
//! | `useLoadRules`           | (ignored)               | components with a load rule    |
//! | `useComponentLoadConfig` | `excludeSomeComponents` | all minus `components_to_exclude` |
//! | `useComponentLoadConfig` | `loadAllComponents`/unset | all                          |
//! | unset                    | -                       | legacy include/exclude list    |
//!
//! Within the set, components with a rule load only the rule's paths.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use buildfetch_scm::ComponentDescriptor;

use crate::config::{BuildConfiguration, ComponentLoadConfig, LoadPolicy};
use crate::error::ConfigurationError;
use crate::load_rules::{ComponentLoadRule, ResolvedLoadRules};

/// Look a component up by name.
///
/// Edge whitespace is ignored on both sides. More than one match is an
/// error; no match is `Ok(None)`.
pub fn find_component_by_name<'a>(
    components: &'a [ComponentDescriptor],
    name: &str,
) -> Result<Option<&'a ComponentDescriptor>, ConfigurationError> {
    let name = name.trim();
    let mut matches = components.iter().filter(|c| c.name.trim() == name);
    let first = matches.next();
    let extra = matches.count();
    if extra > 0 {
        return Err(ConfigurationError::AmbiguousComponentName {
            name: name.to_string(),
            count: extra + 1,
        });
    }
    Ok(first)
}

/// Which precedence row produced the set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionBranch {
    LoadRulesOnly,
    ExcludeSomeComponents,
    LoadAllComponents,
    LegacyInclude,
    LegacyExclude,
    LegacyAll,
}

/// One component of the effective set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentSelection {
    pub component: ComponentDescriptor,
    /// `None` loads the full tree
    pub rule: Option<ComponentLoadRule>,
}

/// Ordered effective component set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentSet {
    pub branch: ResolutionBranch,
    pub selections: Vec<ComponentSelection>,
    /// Components matched by a name list (excluded or included)
    pub named: Vec<ComponentDescriptor>,
}

impl ComponentSet {
    pub fn is_empty(&self) -> bool {
        self.selections.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.selections
            .iter()
            .map(|s| s.component.name.as_str())
            .collect()
    }
}

/// Resolve a list of names, failing on ambiguity and warning on unknowns.
fn lookup_names(
    all: &[ComponentDescriptor],
    names: &[String],
    list: &str,
) -> Result<Vec<ComponentDescriptor>, ConfigurationError> {
    let mut found: Vec<ComponentDescriptor> = Vec::with_capacity(names.len());
    for name in names {
        match find_component_by_name(all, name)? {
            Some(component) => {
                if !found.iter().any(|c| c.item_id == component.item_id) {
                    found.push(component.clone());
                }
            }
            None => warn!(component = %name, list, "Component named in configuration not found"),
        }
    }
    Ok(found)
}

/// Compute the effective component set.
pub fn resolve_component_set(
    all: &[ComponentDescriptor],
    config: &BuildConfiguration,
    rules: &ResolvedLoadRules,
) -> Result<ComponentSet, ConfigurationError> {
    let keep_except = |named: &[ComponentDescriptor]| -> Vec<ComponentDescriptor> {
        all.iter()
            .filter(|c| !named.iter().any(|n| n.item_id == c.item_id))
            .cloned()
            .collect()
    };

    let (branch, effective, named) = match (config.load_policy, config.component_load_config) {
        (Some(LoadPolicy::UseLoadRules), _) => {
            let effective = all
                .iter()
                .filter(|c| rules.for_component(&c.item_id).is_some())
                .cloned()
                .collect();
            (ResolutionBranch::LoadRulesOnly, effective, Vec::new())
        }
        (
            Some(LoadPolicy::UseComponentLoadConfig),
            Some(ComponentLoadConfig::ExcludeSomeComponents),
        ) => {
            let named = lookup_names(all, &config.components_to_exclude, "components_to_exclude")?;
            (ResolutionBranch::ExcludeSomeComponents, keep_except(&named), named)
        }
        (Some(LoadPolicy::UseComponentLoadConfig), _) => {
            (ResolutionBranch::LoadAllComponents, all.to_vec(), Vec::new())
        }
        (None, _) if config.include_components => {
            let named = lookup_names(all, &config.load_components, "load_components")?;
            // Keep server order, not list order.
            let effective = all
                .iter()
                .filter(|c| named.iter().any(|n| n.item_id == c.item_id))
                .cloned()
                .collect();
            (ResolutionBranch::LegacyInclude, effective, named)
        }
        (None, _) if !config.load_components.is_empty() => {
            let named = lookup_names(all, &config.load_components, "load_components")?;
            (ResolutionBranch::LegacyExclude, keep_except(&named), named)
        }
        (None, _) => (ResolutionBranch::LegacyAll, all.to_vec(), Vec::new()),
    };

    let selections: Vec<ComponentSelection> = effective
        .into_iter()
        .map(|component| {
            let rule = rules.for_component(&component.item_id).cloned();
            ComponentSelection { component, rule }
        })
        .collect();

    debug!(
        branch = ?branch,
        components = selections.len(),
        with_rules = selections.iter().filter(|s| s.rule.is_some()).count(),
        "Resolved component set"
    );

    Ok(ComponentSet {
        branch,
        selections,
        named,
    })
}
