use super::*;
use crate::testing::{FakeRuntime, RuntimeCall};

fn config() -> OrchestratorConfig {
    OrchestratorConfig {
        self_image: "myorg/self:latest".to_string(),
        self_container: "self".to_string(),
        managed_prefix: "myorg/".to_string(),
        ..Default::default()
    }
}

/// A fleet of the orchestrator, one managed worker and one foreign container.
fn fleet() -> Arc<FakeRuntime> {
    let fake = Arc::new(FakeRuntime::new());
    fake.add_container("self", "sha256:self-1", ["myorg/self:latest"]);
    fake.add_container("worker", "sha256:worker-1", ["myorg/worker:latest"]);
    fake.add_container("thing", "sha256:thing-1", ["other/thing:latest"]);
    fake.publish("myorg/self:latest", "sha256:self-1");
    fake.publish("myorg/worker:latest", "sha256:worker-1");
    fake.publish("other/thing:latest", "sha256:thing-2");
    fake.publish("containrrr/watchtower", "sha256:wt-1");
    fake.set_local_image("containrrr/watchtower", "sha256:wt-1");
    fake
}

fn pulls(fake: &FakeRuntime) -> Vec<String> {
    fake.calls()
        .into_iter()
        .filter_map(|c| match c {
            RuntimeCall::Pull(r) => Some(r),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_sweep_without_changes_is_unchanged() {
    let fake = fleet();
    let service = UpdateService::new(fake.clone(), &config());

    let outcome = service.run(&UpdateTarget::AllContainers).await.unwrap();
    assert_eq!(outcome, UpdateOutcome::Unchanged);
    assert!(fake.runs().is_empty());
    // Only the managed, non-self image is probed.
    assert_eq!(pulls(&fake), vec!["myorg/worker:latest"]);
}

#[tokio::test]
async fn test_sweep_restarts_with_self_exclusion() {
    let fake = fleet();
    fake.publish("myorg/worker:latest", "sha256:worker-2");
    let service = UpdateService::new(fake.clone(), &config());

    let outcome = service.run(&UpdateTarget::AllContainers).await.unwrap();
    assert_eq!(
        outcome,
        UpdateOutcome::Restarted {
            targets: vec!["worker".to_string()]
        }
    );

    let runs = fake.runs();
    assert_eq!(runs.len(), 1);
    let cmd = &runs[0].cmd;
    assert!(cmd.windows(2).any(|w| w[0] == "--disable-containers" && w[1] == "self"));
    assert!(!cmd.contains(&"worker".to_string()));
}

#[tokio::test]
async fn test_single_container_changed() {
    let fake = fleet();
    fake.publish("myorg/worker:latest", "sha256:worker-2");
    let service = UpdateService::new(fake.clone(), &config());

    let outcome = service
        .run(&UpdateTarget::SingleContainer {
            reference: "worker".to_string(),
        })
        .await
        .unwrap();
    assert!(matches!(outcome, UpdateOutcome::Restarted { .. }));
    assert_eq!(fake.runs()[0].cmd.last().map(String::as_str), Some("worker"));
}

#[tokio::test]
async fn test_single_container_self_is_skipped() {
    let fake = fleet();
    fake.publish("myorg/self:latest", "sha256:self-2");
    let service = UpdateService::new(fake.clone(), &config());

    let outcome = service
        .run(&UpdateTarget::SingleContainer {
            reference: "self".to_string(),
        })
        .await
        .unwrap();
    assert!(matches!(outcome, UpdateOutcome::Skipped { .. }));
    assert!(fake.runs().is_empty());
}

#[tokio::test]
async fn test_single_container_not_running() {
    let fake = fleet();
    let service = UpdateService::new(fake.clone(), &config());

    let outcome = service
        .run(&UpdateTarget::SingleContainer {
            reference: "ghost".to_string(),
        })
        .await
        .unwrap();
    assert!(matches!(outcome, UpdateOutcome::Skipped { .. }));
}

#[tokio::test]
async fn test_single_image_outside_prefix_is_skipped() {
    let fake = fleet();
    let service = UpdateService::new(fake.clone(), &config());

    let outcome = service
        .run(&UpdateTarget::SingleImage {
            reference: "other/thing:latest".to_string(),
        })
        .await
        .unwrap();
    assert!(matches!(outcome, UpdateOutcome::Skipped { .. }));
    assert!(pulls(&fake).is_empty());
}

#[tokio::test]
async fn test_single_image_restarts_its_containers() {
    let fake = fleet();
    fake.add_container("worker-2", "sha256:worker-1", ["myorg/worker:latest"]);
    fake.publish("myorg/worker:latest", "sha256:worker-2");
    let service = UpdateService::new(fake.clone(), &config());

    let outcome = service
        .run(&UpdateTarget::SingleImage {
            reference: "myorg/worker".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(
        outcome,
        UpdateOutcome::Restarted {
            targets: vec!["worker".to_string(), "worker-2".to_string()]
        }
    );
}

#[tokio::test]
async fn test_single_image_finds_users_before_the_tag_moves() {
    let fake = fleet();
    fake.publish("myorg/worker:latest", "sha256:worker-2");
    let service = UpdateService::new(fake.clone(), &config());

    let outcome = service
        .run(&UpdateTarget::SingleImage {
            reference: "myorg/worker:latest".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(
        outcome,
        UpdateOutcome::Restarted {
            targets: vec!["worker".to_string()]
        }
    );

    // After the pull the old image carries no tag at all.
    let running = fake.list_running().await.unwrap();
    let worker = running.iter().find(|c| c.name == "worker").unwrap();
    assert!(worker.image_tags.is_empty());
    assert_eq!(fake.runs().len(), 1);
}

#[tokio::test]
async fn test_prune_images_leaves_containers_alone() {
    let fake = fleet();
    let service = UpdateService::new(fake.clone(), &config());

    let outcome = service.prune_images().await.unwrap();
    assert!(matches!(outcome, UpdateOutcome::Pruned { .. }));
    assert_eq!(fake.calls(), vec![RuntimeCall::PruneImages]);
}

#[tokio::test]
async fn test_all_images_uses_named_scope() {
    let fake = fleet();
    fake.publish("myorg/worker:latest", "sha256:worker-2");
    let service = UpdateService::new(fake.clone(), &config());

    service.run(&UpdateTarget::AllImages).await.unwrap();
    let cmd = &fake.runs()[0].cmd;
    assert!(!cmd.contains(&"--disable-containers".to_string()));
    assert_eq!(cmd.last().map(String::as_str), Some("worker"));
}

#[tokio::test]
async fn test_sweep_registry_failure_is_reported() {
    let fake = fleet();
    fake.fail_pull("myorg/worker:latest");
    let service = UpdateService::new(fake.clone(), &config());

    let err = service.run(&UpdateTarget::AllContainers).await.unwrap_err();
    assert!(err.is_transient());
    assert!(fake.runs().is_empty());
}

#[tokio::test]
async fn test_self_update_unchanged() {
    let fake = fleet();
    let service = UpdateService::new(fake.clone(), &config());

    let outcome = service.run(&UpdateTarget::SelfUpdate).await.unwrap();
    assert_eq!(outcome, UpdateOutcome::Unchanged);
    assert!(!fake.calls().contains(&RuntimeCall::PruneImages));
}

#[tokio::test]
async fn test_self_update_hands_over_to_delegate() {
    let fake = fleet();
    fake.publish("containrrr/watchtower", "sha256:wt-2");
    fake.publish("myorg/self:latest", "sha256:self-2");
    let service = UpdateService::new(fake.clone(), &config());

    let outcome = service.run(&UpdateTarget::SelfUpdate).await.unwrap();
    assert_eq!(
        outcome,
        UpdateOutcome::Restarted {
            targets: vec!["self".to_string()]
        }
    );
    // Delegate refresh pruned dangling images before the own image was
    // checked, and nothing else.
    let calls = fake.calls();
    assert!(!calls.contains(&RuntimeCall::Prune));
    let prune_at = calls
        .iter()
        .position(|c| *c == RuntimeCall::PruneImages)
        .unwrap();
    let self_pull_at = calls
        .iter()
        .position(|c| *c == RuntimeCall::Pull("myorg/self:latest".to_string()))
        .unwrap();
    assert!(prune_at < self_pull_at);
}

#[tokio::test]
async fn test_prune_target() {
    let fake = fleet();
    let service = UpdateService::new(fake.clone(), &config());
    let outcome = service.run(&UpdateTarget::Prune).await.unwrap();
    assert!(matches!(outcome, UpdateOutcome::Pruned { .. }));
    assert_eq!(fake.calls(), vec![RuntimeCall::Prune]);
}

#[tokio::test]
async fn test_empty_reference_is_validation_error() {
    let service = UpdateService::new(fleet(), &config());
    let err = service
        .run(&UpdateTarget::SingleImage {
            reference: " ".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, RuntimeError::Validation(_)));
}

#[test]
fn test_target_serde() {
    let target = UpdateTarget::SingleContainer {
        reference: "worker".to_string(),
    };
    let json = serde_json::to_value(&target).unwrap();
    assert_eq!(json["kind"], "single-container");
    assert_eq!(json["reference"], "worker");

    let parsed: UpdateTarget = serde_json::from_str(r#"{"kind":"all-containers"}"#).unwrap();
    assert_eq!(parsed, UpdateTarget::AllContainers);
}
