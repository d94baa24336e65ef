//! Deployment Scenario Tests
//!
//! Manager-level flows: catalog lookup, dependency gating, convergence.

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use common::{catalog, MemoryRegistry};
use deployd::adapters::{ConvergenceWait, RegistryError};
use deployd::core::{DeploymentError, DeploymentManager, Notifier};
use deployd::domain::{Dependency, Envelope, MessageKey};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

fn no_values() -> BTreeMap<String, String> {
    BTreeMap::new()
}

#[tokio::test]
async fn test_visible_applications_are_filtered_to_catalog() {
    let registry = Arc::new(MemoryRegistry::new(&[
        ("web", "1.2.0"),
        ("grafana", "9.0.0"),
        ("DB", "14"),
    ]));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let manager = DeploymentManager::new(catalog(), registry).with_notifier(Notifier::new(tx));

    let visible = manager.list_visible_applications().await.unwrap();

    let names: Vec<&str> = visible.iter().map(|app| app.name.as_str()).collect();
    assert_eq!(names, vec!["web", "db"]);

    match rx.try_recv().unwrap() {
        Envelope::System(notice) => {
            assert_eq!(notice.key, MessageKey::ApplicationList);
            assert_eq!(notice.value.as_array().map(Vec::len), Some(3));
        }
        other => panic!("unexpected envelope: {other:?}"),
    }
}

#[tokio::test]
async fn test_service_names_are_case_insensitive() {
    let registry = Arc::new(MemoryRegistry::new(&[("DB", "14")]));
    let manager = DeploymentManager::new(catalog(), registry.clone());

    let created = manager
        .create_application("  WEB ", "1.2.0", "", &no_values())
        .await
        .unwrap();

    assert_eq!(created.name, "web");
    let request = &registry.created()[0];
    assert_eq!(request.service, "web");
    assert_eq!(request.namespace, "web");
}

#[tokio::test]
async fn test_dependency_must_be_deployed_first() {
    let registry = Arc::new(MemoryRegistry::new(&[]));
    let manager = DeploymentManager::new(catalog(), registry.clone());

    let err = manager
        .create_application("web", "1.2.0", "", &no_values())
        .await
        .unwrap_err();
    match err {
        DeploymentError::UnmetDependencies { service, missing } => {
            assert_eq!(service, "web");
            assert_eq!(missing, vec![Dependency::new("db", "14")]);
        }
        other => panic!("unexpected error: {other}"),
    }

    manager
        .create_application("db", "14", "", &no_values())
        .await
        .unwrap();
    manager
        .create_application("web", "1.2.0", "", &no_values())
        .await
        .unwrap();

    let services: Vec<String> = registry.created().into_iter().map(|app| app.service).collect();
    assert_eq!(services, vec!["db", "web"]);
}

#[tokio::test]
async fn test_registry_failure_during_resolution() {
    let registry = Arc::new(MemoryRegistry::new(&[]));
    registry.fail_list();
    let manager = DeploymentManager::new(catalog(), registry.clone());

    let err = manager
        .create_application("cache", "7", "", &no_values())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DeploymentError::Registry(RegistryError::Status { status: 503, .. })
    ));
    assert_eq!(err.outcome(), "registry_error");
    assert!(registry.created().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_create_waits_for_convergence() {
    let registry = Arc::new(MemoryRegistry::new(&[]).with_convergence(
        ConvergenceWait::default(),
        CancellationToken::new(),
        4,
    ));
    let manager = DeploymentManager::new(catalog(), registry.clone());
    let started = Instant::now();

    let created = manager
        .create_application("db", "14", "data", &no_values())
        .await
        .unwrap();

    assert_eq!(created.name, "db");
    assert_eq!(registry.polls(), 4);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(20) && elapsed < Duration::from_secs(21));
}

#[tokio::test(start_paused = true)]
async fn test_create_fails_when_convergence_times_out() {
    let registry = Arc::new(MemoryRegistry::new(&[]).with_convergence(
        ConvergenceWait::new(Duration::from_secs(5), Duration::from_secs(12)),
        CancellationToken::new(),
        u32::MAX,
    ));
    let manager = DeploymentManager::new(catalog(), registry.clone());

    let err = manager
        .create_application("db", "14", "", &no_values())
        .await
        .unwrap_err();

    assert_eq!(err.outcome(), "convergence_timeout");
    assert_eq!(registry.polls(), 2);
}
