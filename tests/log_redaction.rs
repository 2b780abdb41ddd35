//! Secret values never reach the logs, including the audit trail.

mod support;

use std::sync::Arc;

use pgrotate::config::RotationConfig;
use pgrotate::rotation::RotationCoordinator;
use pgrotate::secrets::audited::AUDIT_TARGET;
use pgrotate::secrets::{AuditedSecretStore, VersionStage};
use support::*;
use tracing_test::traced_test;

#[tokio::test]
#[traced_test]
async fn rotation_logs_contain_no_passwords() {
    let f = admin_fixture().await;
    let coordinator = RotationCoordinator::new(
        Arc::new(AuditedSecretStore::new(f.store.clone())),
        Arc::new(f.database.clone()),
        &RotationConfig {
            admin_secret_id: Some(ADMIN_SECRET_ID.to_string()),
            ..Default::default()
        },
    )
    .unwrap();

    coordinator.run_all(SECRET_ID, Some("rotation-2")).await.unwrap();
    let candidate = password_at(&f.store, VersionStage::Current)
        .await
        .unwrap();

    assert!(logs_contain(AUDIT_TARGET));
    assert!(logs_contain("Secret store operation"));
    assert!(logs_contain("finishSecret"));
    assert!(!logs_contain(&candidate));
    assert!(!logs_contain(ORIGINAL_PASSWORD));
    assert!(!logs_contain("admin-root"));
}

#[tokio::test]
#[traced_test]
async fn failed_step_logs_contain_no_passwords() {
    let f = same_secret_fixture().await;
    f.coordinator.handle_named(SECRET_ID, "createSecret", None).await;
    f.database.fail_commands(true);

    let outcome = f.coordinator.handle_named(SECRET_ID, "setSecret", None).await;
    assert!(!outcome.is_success());

    let candidate = password_at(&f.store, VersionStage::Pending)
        .await
        .unwrap();
    assert!(!logs_contain(&candidate));
    assert!(!logs_contain(ORIGINAL_PASSWORD));
}
