//! Sandbox preparation failures and the DELETE step.

use std::sync::Arc;

use buildfetch_core::{
    BuildConfiguration, ConfigurationError, EnvironmentError, ErrorKind, FetchError,
    FetchOrchestrator, HostOs, MemoryProgress, METADATA_FILE,
};
use buildfetch_scm::fakes::{ComponentFixture, MemoryRepository, RepositoryFixture, SourceFixture};
use buildfetch_scm::SelectionMode;

fn repository() -> Arc<MemoryRepository> {
    let fixture = RepositoryFixture::new("6.0.6".parse().unwrap()).with_source(
        SourceFixture::workspace("build-ws")
            .with_component(ComponentFixture::new("component1").with_file("f/a.txt", "a"))
            .with_component(ComponentFixture::new("component2").with_file("g/b.txt", "b")),
    );
    Arc::new(MemoryRepository::from_fixture(fixture).unwrap())
}

fn config() -> BuildConfiguration {
    BuildConfiguration::new(SelectionMode::RepositoryWorkspace {
        name: "build-ws".to_string(),
    })
}

// ===========================================================================
// DELETE step
// ===========================================================================

#[tokio::test]
async fn delete_clears_stale_content() {
    let dir = tempfile::tempdir().unwrap();
    let sandbox = dir.path().join("sandbox");
    std::fs::create_dir_all(sandbox.join("old/nested")).unwrap();
    std::fs::write(sandbox.join("old/nested/stale.txt"), "stale").unwrap();
    std::fs::write(sandbox.join("stale.txt"), "stale").unwrap();

    FetchOrchestrator::new(repository(), Arc::new(MemoryProgress::new()), dir.path())
        .run(&config().with_destination("sandbox").with_delete_before_fetch(true))
        .await
        .unwrap();

    assert!(!sandbox.join("old").exists());
    assert!(!sandbox.join("stale.txt").exists());
    assert!(sandbox.join("f/a.txt").is_file());
    assert!(sandbox.join(METADATA_FILE).is_file());
}

#[tokio::test]
async fn without_delete_stale_content_stays() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("stale.txt"), "stale").unwrap();

    FetchOrchestrator::new(repository(), Arc::new(MemoryProgress::new()), dir.path())
        .run(&config())
        .await
        .unwrap();

    assert!(dir.path().join("stale.txt").is_file());
    assert!(dir.path().join("g/b.txt").is_file());
}

#[tokio::test]
async fn delete_on_file_destination_is_environment_error() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("sandbox"), "not a directory").unwrap();
    let repo = repository();

    let err = FetchOrchestrator::new(repo.clone(), Arc::new(MemoryProgress::new()), dir.path())
        .run(&config().with_destination("sandbox").with_delete_before_fetch(true))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Environment);
    assert!(matches!(
        err,
        FetchError::Environment(EnvironmentError::DestinationNotDirectory { .. })
    ));
    assert!(!repo.calls().iter().any(|c| c.starts_with("accept:")));
}

#[tokio::test]
async fn file_destination_fails_before_load_without_delete() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("sandbox"), "not a directory").unwrap();
    let repo = repository();

    let err = FetchOrchestrator::new(repo.clone(), Arc::new(MemoryProgress::new()), dir.path())
        .run(&config().with_destination("sandbox"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Environment);
    assert!(!repo.calls().iter().any(|c| c.starts_with("load:")));
}

// ===========================================================================
// Repository failures
// ===========================================================================

#[tokio::test]
async fn load_failure_is_repository_error_without_rollback() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("kept.txt"), "previous build").unwrap();
    let repo = repository();
    repo.fail_operation("load");

    let err = FetchOrchestrator::new(repo.clone(), Arc::new(MemoryProgress::new()), dir.path())
        .run(&config())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Repository);
    assert!(err.to_string().contains("injected failure"));
    // Accept already happened and is not undone; no metadata is written.
    assert!(repo.calls().contains(&"accept:build-ws".to_string()));
    assert!(dir.path().join("kept.txt").is_file());
    assert!(!dir.path().join(METADATA_FILE).exists());
}

#[tokio::test]
async fn accept_failure_stops_before_load() {
    let dir = tempfile::tempdir().unwrap();
    let repo = repository();
    repo.fail_operation("accept");

    let err = FetchOrchestrator::new(repo.clone(), Arc::new(MemoryProgress::new()), dir.path())
        .run(&config())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Repository);
    assert!(!repo.calls().iter().any(|c| c.starts_with("load:")));
}

#[tokio::test]
async fn unknown_workspace_is_repository_error() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = BuildConfiguration::new(SelectionMode::RepositoryWorkspace {
        name: "nope".to_string(),
    });
    let err = FetchOrchestrator::new(repository(), Arc::new(MemoryProgress::new()), dir.path())
        .run(&cfg)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Repository);
    assert!(err.to_string().contains("nope"));
}

// ===========================================================================
// Destination validation
// ===========================================================================

#[tokio::test]
async fn invalid_windows_destination_fails_before_any_server_call() {
    let dir = tempfile::tempdir().unwrap();
    let repo = repository();

    let err = FetchOrchestrator::new(repo.clone(), Arc::new(MemoryProgress::new()), dir.path())
        .with_host_os(HostOs::Windows)
        .run(&config().with_destination("build|out"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        FetchError::Configuration(ConfigurationError::InvalidDestination { character: '|', .. })
    ));
    assert!(repo.calls().is_empty());
}

#[tokio::test]
async fn empty_destination_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let repo = repository();
    let err = FetchOrchestrator::new(repo.clone(), Arc::new(MemoryProgress::new()), dir.path())
        .run(&config().with_destination("  "))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        FetchError::Configuration(ConfigurationError::EmptyDestination)
    ));
    assert!(repo.calls().is_empty());
}

#[tokio::test]
async fn component_folder_with_reserved_character_is_rejected() {
    let fixture = RepositoryFixture::new("6.0.6".parse().unwrap()).with_source(
        SourceFixture::workspace("build-ws")
            .with_component(ComponentFixture::new("docs: draft").with_file("a.txt", "a")),
    );
    let repo = Arc::new(MemoryRepository::from_fixture(fixture).unwrap());
    let dir = tempfile::tempdir().unwrap();

    let err = FetchOrchestrator::new(repo.clone(), Arc::new(MemoryProgress::new()), dir.path())
        .with_host_os(HostOs::Windows)
        .run(&config().with_component_folders(true))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        FetchError::Configuration(ConfigurationError::InvalidComponentFolder { .. })
    ));
    assert!(!repo.calls().iter().any(|c| c.starts_with("accept:")));
}
