//! buildfetch-core: Load Configuration Resolution and Accept/Load Orchestration
//!
//! Decides exactly which files a build sandbox receives, fetches them
//! through a [`buildfetch_scm::ScmConnector`], and records what changed
//! since the previous build.
//!
//! ## Layer 1 - Fetch pipeline
//!
//! - `load_rules`: classify, gate and parse load-rule files
//! - `components`: effective component set by policy precedence
//! - `layout`: destination validation and per-component placement
//! - `orchestrator`: delete, accept, load, metadata, properties
//! - `changelog`: change report model, builder, writer and reader

pub mod changelog;
pub mod components;
pub mod config;
pub mod error;
pub mod layout;
pub mod load_rules;
pub mod orchestrator;
pub mod plan;
pub mod progress;
pub mod properties;
pub mod telemetry;

pub use changelog::{
    build_report, read_change_log, read_change_log_file, write_change_log, write_change_log_file,
    ChangeDesc, ChangeLogError, ChangeReport, ChangeSetEntry, ComponentChangeEntry,
    ModificationKind, TOO_MANY_CHANGES_THRESHOLD,
};
pub use components::{
    find_component_by_name, resolve_component_set, ComponentSelection, ComponentSet,
    ResolutionBranch,
};
pub use config::{
    BuildConfiguration, ComponentLoadConfig, LoadPolicy, LoadRuleFileSpec, PersonalBuildOverrides,
};
pub use error::{ConfigurationError, EnvironmentError, ErrorKind, FetchError, Result};
pub use layout::{plan_layout, validate_destination, HostOs};
pub use load_rules::{
    detect_format, gate_before_read, supports_load_rule_only_mode, validate_reference,
    ComponentLoadRule, LoadRuleFile, LoadRuleFormat, LoadRuleReference, LoadRuleScope,
    ResolvedLoadRules, LOAD_RULES_MINIMUM_VERSION,
};
pub use orchestrator::{
    FetchOrchestrator, FetchOutcome, ResolvedFetch, SandboxMetadata, METADATA_FILE,
};
pub use plan::{LoadPlan, LoadPlanEntry, LoadScope};
pub use progress::{MemoryProgress, ProgressSink, TracingProgress};
pub use properties::BuildProperties;
pub use telemetry::init_tracing;
