//! Build configuration as supplied by the job definition.
//!
//! A `BuildConfiguration` is read once per build and never mutated.
//! Personal builds derive a second value through [`BuildConfiguration::for_run`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use buildfetch_scm::SelectionMode;

use crate::error::ConfigurationError;

/// How the set of components to load is decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LoadPolicy {
    /// Load only components that have a load rule
    UseLoadRules,
    /// Decide through [`ComponentLoadConfig`]
    UseComponentLoadConfig,
}

impl LoadPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadPolicy::UseLoadRules => "useLoadRules",
            LoadPolicy::UseComponentLoadConfig => "useComponentLoadConfig",
        }
    }
}

/// Component selection under [`LoadPolicy::UseComponentLoadConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ComponentLoadConfig {
    LoadAllComponents,
    ExcludeSomeComponents,
}

impl ComponentLoadConfig {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentLoadConfig::LoadAllComponents => "loadAllComponents",
            ComponentLoadConfig::ExcludeSomeComponents => "excludeSomeComponents",
        }
    }
}

/// A load-rule file stored in the repository.
///
/// When `component` is absent the first segment of `path` names the
/// component the file lives in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadRuleFileSpec {
    #[serde(default)]
    pub component: Option<String>,
    pub path: String,
}

impl LoadRuleFileSpec {
    pub fn new(component: &str, path: &str) -> Self {
        Self {
            component: Some(component.to_string()),
            path: path.to_string(),
        }
    }

    /// Split into (component name, component-relative path).
    pub fn location(&self) -> Result<(String, String), ConfigurationError> {
        if let Some(component) = &self.component {
            return Ok((component.trim().to_string(), self.path.clone()));
        }
        let trimmed = self.path.trim_start_matches('/');
        match trimmed.split_once('/') {
            Some((component, rest)) if !component.is_empty() && !rest.is_empty() => {
                Ok((component.to_string(), rest.to_string()))
            }
            _ => Err(ConfigurationError::InvalidLoadRule {
                path: self.path.clone(),
                reason: "path must start with the component name when no component is given"
                    .to_string(),
            }),
        }
    }
}

impl fmt::Display for LoadRuleFileSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.component {
            Some(component) => write!(f, "{}:{}", component, self.path),
            None => write!(f, "{}", self.path),
        }
    }
}

/// Overrides supplied when a developer requests a personal build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonalBuildOverrides {
    /// Personal repository workspace to load instead of the build's source
    #[serde(default)]
    pub workspace: Option<String>,
    /// Replacement load-rule files
    #[serde(default)]
    pub load_rules: Option<Vec<LoadRuleFileSpec>>,
    /// Property values that win over computed ones
    #[serde(default)]
    pub build_properties: BTreeMap<String, String>,
}

fn default_destination() -> String {
    ".".to_string()
}

fn default_true() -> bool {
    true
}

/// Source-control settings of one build job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildConfiguration {
    pub selection: SelectionMode,

    /// Relative (to the build working directory) or absolute path
    #[serde(default = "default_destination")]
    pub fetch_destination: String,

    #[serde(default)]
    pub delete_before_fetch: bool,

    #[serde(default = "default_true")]
    pub accept_before_fetch: bool,

    #[serde(default)]
    pub create_folders_for_components: bool,

    #[serde(default)]
    pub load_policy: Option<LoadPolicy>,

    #[serde(default)]
    pub component_load_config: Option<ComponentLoadConfig>,

    /// Names excluded under `excludeSomeComponents`
    #[serde(default)]
    pub components_to_exclude: Vec<String>,

    /// Legacy name list; whitelist when `include_components`, else blacklist
    #[serde(default)]
    pub load_components: Vec<String>,

    #[serde(default)]
    pub include_components: bool,

    #[serde(default)]
    pub load_rules: Vec<LoadRuleFileSpec>,

    #[serde(default)]
    pub personal_build: Option<PersonalBuildOverrides>,
}

impl BuildConfiguration {
    /// Configuration with the job-form defaults: destination `.`, accept on.
    pub fn new(selection: SelectionMode) -> Self {
        Self {
            selection,
            fetch_destination: default_destination(),
            delete_before_fetch: false,
            accept_before_fetch: true,
            create_folders_for_components: false,
            load_policy: None,
            component_load_config: None,
            components_to_exclude: Vec::new(),
            load_components: Vec::new(),
            include_components: false,
            load_rules: Vec::new(),
            personal_build: None,
        }
    }

    /// Read a JSON job file.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigurationError> {
        let invalid = |reason: String| ConfigurationError::InvalidConfigFile {
            path: path.display().to_string(),
            reason,
        };
        let raw = std::fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
        serde_json::from_str(&raw).map_err(|e| invalid(e.to_string()))
    }

    pub fn with_destination(mut self, destination: &str) -> Self {
        self.fetch_destination = destination.to_string();
        self
    }

    pub fn with_delete_before_fetch(mut self, delete: bool) -> Self {
        self.delete_before_fetch = delete;
        self
    }

    pub fn with_accept_before_fetch(mut self, accept: bool) -> Self {
        self.accept_before_fetch = accept;
        self
    }

    pub fn with_component_folders(mut self, create: bool) -> Self {
        self.create_folders_for_components = create;
        self
    }

    pub fn with_load_policy(mut self, policy: LoadPolicy) -> Self {
        self.load_policy = Some(policy);
        self
    }

    pub fn with_component_load_config(mut self, config: ComponentLoadConfig) -> Self {
        self.component_load_config = Some(config);
        self
    }

    pub fn with_components_to_exclude(mut self, names: &[&str]) -> Self {
        self.components_to_exclude = names.iter().map(|n| n.to_string()).collect();
        self
    }

    /// Legacy include/exclude list.
    pub fn with_load_components(mut self, names: &[&str], include: bool) -> Self {
        self.load_components = names.iter().map(|n| n.to_string()).collect();
        self.include_components = include;
        self
    }

    pub fn with_load_rule(mut self, spec: LoadRuleFileSpec) -> Self {
        self.load_rules.push(spec);
        self
    }

    pub fn with_personal_build(mut self, overrides: PersonalBuildOverrides) -> Self {
        self.personal_build = Some(overrides);
        self
    }

    pub fn is_personal_build(&self) -> bool {
        self.personal_build.is_some()
    }

    /// The configuration this run actually uses.
    ///
    /// For a personal build the personal workspace and load rules replace
    /// the job's; the original value is left untouched.
    pub fn for_run(&self) -> BuildConfiguration {
        let mut derived = self.clone();
        if let Some(overrides) = &self.personal_build {
            if let Some(workspace) = &overrides.workspace {
                derived.selection = SelectionMode::RepositoryWorkspace {
                    name: workspace.clone(),
                };
            }
            if let Some(rules) = &overrides.load_rules {
                derived.load_rules = rules.clone();
            }
        }
        derived
    }
}
