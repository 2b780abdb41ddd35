//! Database calls are bounded: a server that never answers yields a
//! retryable failure instead of a hung step.

use std::sync::Arc;
use std::time::{Duration, Instant};

use pgrotate::config::{DatabaseConfig, RotationConfig, SslMode};
use pgrotate::database::PostgresDatabase;
use pgrotate::errors::ErrorKind;
use pgrotate::rotation::{RotationCoordinator, RotationRequest, RotationStep};
use pgrotate::secrets::{InMemorySecretStore, SecretStore, SecretString, VersionStage};
use tokio::net::TcpListener;

const SECRET_ID: &str = "prod/slow/app";

/// Listener that accepts connections and never writes a byte.
async fn silent_server() -> (u16, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    (port, handle)
}

#[tokio::test]
async fn unresponsive_database_is_retryable() {
    let (port, server) = silent_server().await;

    let store = InMemorySecretStore::new();
    let secret = serde_json::json!({
        "host": "127.0.0.1",
        "port": port,
        "dbname": "orders",
        "username": "orders_app",
        "password": "original-Passw0rd!"
    });
    store.insert_secret(SECRET_ID, SecretString::new(secret.to_string()), true).await;

    let database = PostgresDatabase::new(&DatabaseConfig {
        connect_timeout_seconds: 1,
        ssl_mode: SslMode::Disable,
        ..Default::default()
    });
    let coordinator = RotationCoordinator::new(
        Arc::new(store.clone()),
        Arc::new(database),
        &RotationConfig::default(),
    )
    .unwrap();

    coordinator.handle(&RotationRequest::new(SECRET_ID, RotationStep::Create)).await.unwrap();

    for step in [RotationStep::Set, RotationStep::Test] {
        let started = Instant::now();
        let err = coordinator.handle(&RotationRequest::new(SECRET_ID, step)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DatabaseUnavailable, "{}: {}", step, err);
        assert!(err.is_retryable());
        assert!(started.elapsed() < Duration::from_secs(5), "{} was not bounded", step);
    }

    // Nothing was promoted
    let description = store.describe(SECRET_ID).await.unwrap();
    assert!(description.version_with(&VersionStage::Pending).is_some());
    server.abort();
}
