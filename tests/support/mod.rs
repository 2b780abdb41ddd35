//! Shared fixtures for rotation integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use pgrotate::config::RotationConfig;
use pgrotate::database::InMemoryDatabase;
use pgrotate::rotation::RotationCoordinator;
use pgrotate::secrets::{DatabaseSecret, InMemorySecretStore, SecretStore, SecretString, VersionStage};

pub const SECRET_ID: &str = "prod/orders/app";
pub const ADMIN_SECRET_ID: &str = "prod/orders/admin";
pub const ORIGINAL_PASSWORD: &str = "original-Passw0rd!";

pub struct Fixture {
    pub store: InMemorySecretStore,
    pub database: InMemoryDatabase,
    pub coordinator: RotationCoordinator,
    pub original_version: String,
}

pub fn app_secret(password: &str) -> SecretString {
    SecretString::new(
        serde_json::json!({
            "engine": "postgres",
            "host": "orders-db.internal",
            "port": 5432,
            "dbname": "orders",
            "username": "orders_app",
            "password": password,
            "proxy": {"enabled": false}
        })
        .to_string(),
    )
}

pub async fn fixture(config: RotationConfig) -> Fixture {
    let store = InMemorySecretStore::new();
    let original_version = store.insert_secret(SECRET_ID, app_secret(ORIGINAL_PASSWORD), true).await;
    store
        .insert_secret(
            ADMIN_SECRET_ID,
            SecretString::new(r#"{"username":"postgres","password":"admin-root"}"#),
            false,
        )
        .await;

    let database = InMemoryDatabase::new()
        .with_role("orders_app", ORIGINAL_PASSWORD)
        .with_superuser("postgres", "admin-root");

    let coordinator =
        RotationCoordinator::new(Arc::new(store.clone()), Arc::new(database.clone()), &config)
            .expect("default rotation config is valid");

    Fixture { store, database, coordinator, original_version }
}

pub async fn same_secret_fixture() -> Fixture {
    fixture(RotationConfig::default()).await
}

pub async fn admin_fixture() -> Fixture {
    fixture(RotationConfig {
        admin_secret_id: Some(ADMIN_SECRET_ID.to_string()),
        ..Default::default()
    })
    .await
}

/// Parsed secret carrying `stage`, if any.
pub async fn secret_at(store: &InMemorySecretStore, stage: VersionStage) -> Option<(String, DatabaseSecret)> {
    let version = store.get_value(SECRET_ID, &stage).await.expect("store reachable")?;
    let secret = DatabaseSecret::parse(SECRET_ID, &version.value).expect("valid payload");
    Some((version.version_id, secret))
}

pub async fn password_at(store: &InMemorySecretStore, stage: VersionStage) -> Option<String> {
    secret_at(store, stage)
        .await
        .map(|(_, secret)| secret.password().expose_secret().to_string())
}
