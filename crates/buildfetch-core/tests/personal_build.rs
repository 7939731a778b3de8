//! Personal builds: workspace/load-rule overrides, empty change reports
//! and property overrides.

use std::collections::BTreeMap;
use std::sync::Arc;

use buildfetch_core::properties::{
    CHANGES_ACCEPTED, FETCH_DESTINATION, SNAPSHOT_UUID, WORKSPACE_UUID,
};
use buildfetch_core::{
    BuildConfiguration, FetchOrchestrator, LoadPolicy, LoadRuleFileSpec, MemoryProgress,
    PersonalBuildOverrides,
};
use buildfetch_scm::fakes::{
    ComponentFixture, MemoryRepository, PendingChangeSet, RepositoryFixture, SourceFixture,
};
use buildfetch_scm::{ComponentAction, RawVersionableChange, ScmConnector, SelectionMode};

const RULE: &str = r#"<scm:sourceControlLoadRule version="1" xmlns:scm="http://com.ibm.team.scm">
  <parentLoadRule><component name="component1"/><parentFolder repositoryPath="/f"/></parentLoadRule>
</scm:sourceControlLoadRule>"#;

fn source(name: &str) -> SourceFixture {
    SourceFixture::workspace(name)
        .with_component(
            ComponentFixture::new("component1")
                .with_file("f/a.txt", "a")
                .with_file("g/b.txt", "b")
                .with_file("rules.loadrule", RULE),
        )
        .with_component(ComponentFixture::new("component2").with_file("h/c.txt", "c"))
        .with_pending(
            PendingChangeSet::new("component1")
                .with_comment("pending in both workspaces")
                .with_change(RawVersionableChange::modified("_v1", "f/a.txt", "s1", "s2")),
        )
        .with_component_change("component2", ComponentAction::Add)
}

fn repository() -> Arc<MemoryRepository> {
    let fixture = RepositoryFixture::new("6.0.6".parse().unwrap())
        .with_source(source("build-ws"))
        .with_source(source("my-ws"));
    Arc::new(MemoryRepository::from_fixture(fixture).unwrap())
}

fn build_config() -> BuildConfiguration {
    BuildConfiguration::new(SelectionMode::RepositoryWorkspace {
        name: "build-ws".to_string(),
    })
}

fn personal() -> PersonalBuildOverrides {
    PersonalBuildOverrides {
        workspace: Some("my-ws".to_string()),
        ..Default::default()
    }
}

// ===========================================================================
// Overrides
// ===========================================================================

#[tokio::test]
async fn personal_workspace_replaces_build_workspace() {
    let repo = repository();
    let dir = tempfile::tempdir().unwrap();
    let cfg = build_config().with_personal_build(personal());

    let outcome = FetchOrchestrator::new(repo.clone(), Arc::new(MemoryProgress::new()), dir.path())
        .run(&cfg)
        .await
        .unwrap();

    let calls = repo.calls();
    assert!(calls.contains(&"accept:my-ws".to_string()), "{calls:?}");
    assert!(calls.contains(&"load:my-ws".to_string()), "{calls:?}");
    assert!(!calls.iter().any(|c| c.ends_with(":build-ws")), "{calls:?}");

    let my_ws = repo
        .resolve_source(&SelectionMode::RepositoryWorkspace {
            name: "my-ws".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(
        outcome.properties.get(WORKSPACE_UUID),
        Some(my_ws.workspace_id.as_str())
    );
    // The caller's configuration is not rewritten.
    assert!(matches!(
        &cfg.selection,
        SelectionMode::RepositoryWorkspace { name } if name == "build-ws"
    ));
}

#[tokio::test]
async fn personal_load_rules_replace_configured_rules() {
    let dir = tempfile::tempdir().unwrap();
    let overrides = PersonalBuildOverrides {
        load_rules: Some(vec![LoadRuleFileSpec::new("component1", "rules.loadrule")]),
        ..personal()
    };
    let cfg = build_config()
        .with_load_policy(LoadPolicy::UseLoadRules)
        .with_load_rule(LoadRuleFileSpec::new("component1", "missing.loadrule"))
        .with_personal_build(overrides);

    let outcome = FetchOrchestrator::new(repository(), Arc::new(MemoryProgress::new()), dir.path())
        .run(&cfg)
        .await
        .unwrap();

    assert_eq!(outcome.resolved.plan.component_names(), vec!["component1"]);
    assert!(dir.path().join("f/a.txt").is_file());
    assert!(!dir.path().join("g").exists());
    assert!(!dir.path().join("h").exists());
}

// ===========================================================================
// Change report
// ===========================================================================

#[tokio::test]
async fn personal_build_reports_no_changes() {
    for policy in [
        None,
        Some(LoadPolicy::UseComponentLoadConfig),
        Some(LoadPolicy::UseLoadRules),
    ] {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = build_config()
            .with_load_rule(LoadRuleFileSpec::new("component1", "rules.loadrule"))
            .with_personal_build(personal());
        cfg.load_policy = policy;

        let outcome =
            FetchOrchestrator::new(repository(), Arc::new(MemoryProgress::new()), dir.path())
                .run(&cfg)
                .await
                .unwrap();

        let report = &outcome.report;
        assert!(report.personal_build, "{policy:?}");
        assert_eq!(report.accepted_count(), 0, "{policy:?}");
        assert_eq!(report.discarded_count(), 0, "{policy:?}");
        assert_eq!(report.component_change_count(), 0, "{policy:?}");
        assert_eq!(outcome.properties.get(CHANGES_ACCEPTED), Some("0"));
        assert!(report.baseline_set_item_id.is_none(), "{policy:?}");
        assert!(report.baseline_set_name.is_none(), "{policy:?}");
        assert!(!outcome.properties.contains(SNAPSHOT_UUID), "{policy:?}");
    }
}

#[tokio::test]
async fn regular_build_reports_changes() {
    let dir = tempfile::tempdir().unwrap();
    let outcome = FetchOrchestrator::new(repository(), Arc::new(MemoryProgress::new()), dir.path())
        .run(&build_config())
        .await
        .unwrap();
    assert!(!outcome.report.personal_build);
    assert_eq!(outcome.report.accepted_count(), 1);
    assert_eq!(outcome.report.component_change_count(), 1);
    assert_eq!(
        outcome.report.baseline_set_name.as_deref(),
        Some("build-ws build #1")
    );
    assert!(outcome.properties.contains(SNAPSHOT_UUID));
}

// ===========================================================================
// Properties
// ===========================================================================

#[tokio::test]
async fn personal_property_values_win() {
    let dir = tempfile::tempdir().unwrap();
    let mut build_properties = BTreeMap::new();
    build_properties.insert(FETCH_DESTINATION.to_string(), "elsewhere".to_string());
    build_properties.insert("personal_note".to_string(), "from dev".to_string());
    let cfg = build_config().with_personal_build(PersonalBuildOverrides {
        build_properties,
        ..personal()
    });

    let outcome = FetchOrchestrator::new(repository(), Arc::new(MemoryProgress::new()), dir.path())
        .run(&cfg)
        .await
        .unwrap();

    assert_eq!(outcome.properties.get(FETCH_DESTINATION), Some("elsewhere"));
    assert_eq!(outcome.properties.get("personal_note"), Some("from dev"));
    // The sandbox itself still follows the configured destination.
    assert!(dir.path().join("f/a.txt").is_file());
}
