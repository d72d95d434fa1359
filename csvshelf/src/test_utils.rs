//! Shared fixtures for unit and handler tests.

use axum_test::TestServer;
use bytes::Bytes;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Connection, SqliteConnection};
use tempfile::TempDir;

use crate::config::{Config, StoreConfig};
use crate::db::gateway::StoreGateway;
use crate::db::models::files::{FileCreateDBRequest, StoredFileMetadata, StoredFileRecord};
use crate::store::upload::IncomingFile;

pub fn test_store_config(dir: &TempDir) -> StoreConfig {
    StoreConfig {
        data_dir: dir.path().to_path_buf(),
        name: "test-files".to_string(),
        schema_version: 1,
    }
}

pub fn create_test_config(dir: &TempDir) -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        store: test_store_config(dir),
        ..Default::default()
    }
}

pub async fn create_test_app(config: Config) -> TestServer {
    let app = crate::Application::new(config).await.expect("Failed to create application");
    app.into_test_server()
}

/// A record with `size` bytes of filler content
pub fn sample_record(name: &str, size: i64) -> StoredFileRecord {
    record(name, size, 1_700_000_000_000)
}

pub fn record(name: &str, size: i64, last_modified: i64) -> StoredFileRecord {
    FileCreateDBRequest {
        name: name.to_string(),
        mime_type: "text/csv".to_string(),
        last_modified,
        raw_data: vec![b','; size as usize],
    }
    .into_record()
}

pub fn metadata(name: &str, size: i64, last_modified: i64) -> StoredFileMetadata {
    record(name, size, last_modified).metadata()
}

/// Create the store (even for an empty slice) and insert one record per `(name, size)`, keyed by name
pub async fn seed_records(store: &StoreConfig, files: &[(&str, i64)]) {
    let mut handle = StoreGateway::open(store).await.expect("Failed to open test store");
    let mut tx = handle.write().await.expect("Failed to begin write");
    for (name, size) in files {
        tx.add(name, &sample_record(name, *size)).await.expect("Failed to seed record");
    }
    tx.commit().await.expect("Failed to commit seed records");
    handle.close().await.expect("Failed to close test store");
}

pub fn csv_file(name: &str, content: &str) -> IncomingFile {
    IncomingFile {
        name: name.to_string(),
        mime_type: "text/csv".to_string(),
        last_modified: 1_700_000_000_000,
        data: Bytes::from(content.to_string()),
    }
}

/// Replace every stored payload with an integer, so any read that decodes `raw_data` fails
pub async fn unreadable_payloads(store: &StoreConfig) {
    let options = SqliteConnectOptions::new().filename(store.path());
    let mut conn = SqliteConnection::connect_with(&options)
        .await
        .expect("Failed to connect to test store");
    sqlx::query("UPDATE files SET raw_data = 0")
        .execute(&mut conn)
        .await
        .expect("Failed to overwrite payloads");
    conn.close().await.expect("Failed to close test store");
}
