//! # csvshelf: a local CSV file shelf
//!
//! `csvshelf` accepts CSV uploads, keeps them in an embedded single-file store, and lets clients
//! search, sort and page through what was stored.
//!
//! ## Overview
//!
//! An upload is checked in a fixed order (a file is present, it fits the size limit, the name
//! ends in `.csv`, every line is comma-separated) and then written under its original name. If
//! that name is taken the file is stored as `<name>-<suffix>` with a random three character
//! base-36 suffix. The unique `name` index is the final arbiter: when two uploads race for the
//! same candidate, the loser retries with a fresh suffix a bounded number of times.
//!
//! Listing walks the store in key order through a forward cursor, keeps names containing the
//! search text, and stops after `offset + limit` matches. That window is then sorted and the
//! requested page sliced out of it.
//!
//! ## Architecture
//!
//! - The **API layer** ([`api`]) is a small axum router under `/api/v1`.
//! - The **store layer** ([`store`]) holds the operations: upload, query, lookup and keys. Each
//!   takes the configuration section it needs explicitly.
//! - The **database layer** ([`db`]) opens the SQLite file through sqlx, applies schema upgrades
//!   and hands out typed read/write transactions.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use csvshelf::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = csvshelf::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     csvshelf::telemetry::init_telemetry()?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options.

pub mod api;
pub mod config;
pub mod db;
pub mod errors;
mod openapi;
pub mod store;
pub mod telemetry;
#[cfg(test)]
mod test_utils;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    routing::get,
};
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, debug, info};
use utoipa::OpenApi;

pub use config::Config;

use crate::db::gateway::StoreGateway;
use crate::openapi::ApiDoc;

/// Room for multipart boundaries and the small text fields sent next to the file
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
}

/// Build the application router
pub fn build_router(state: &AppState) -> Router {
    let body_limit = usize::try_from(state.config.upload.max_file_size)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    let api_routes = Router::new()
        .route(
            "/files",
            get(api::handlers::files::list_files)
                .post(api::handlers::files::upload_file)
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/files/keys", get(api::handlers::files::list_keys))
        .route("/files/by-name/{name}", get(api::handlers::files::get_file_by_name))
        .route("/files/by-name/{name}/content", get(api::handlers::files::get_file_content))
        .with_state(state.clone());

    Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .nest("/api/v1", api_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

pub struct Application {
    router: Router,
    config: Config,
}

impl Application {
    /// Validate the configuration, make sure the store opens at the configured schema version,
    /// and build the router
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting csvshelf with configuration: {:#?}", config);

        config.validate()?;

        // Fail at startup rather than on the first request if the store cannot be opened
        let handle = StoreGateway::open(&config.store).await?;
        info!(
            path = %handle.path().display(),
            version = handle.version(),
            "Store ready"
        );
        handle.close().await?;

        let app_state = AppState { config: config.clone() };
        let router = build_router(&app_state);

        Ok(Self { router, config })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "csvshelf listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::test_utils::{create_test_app, create_test_config};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_healthz() {
        let dir = TempDir::new().unwrap();
        let server = create_test_app(create_test_config(&dir)).await;

        let response = server.get("/healthz").await;
        assert_eq!(response.status_code().as_u16(), 200);
        assert_eq!(response.text(), "OK");
    }

    #[tokio::test]
    async fn test_openapi_served() {
        let dir = TempDir::new().unwrap();
        let server = create_test_app(create_test_config(&dir)).await;

        let doc: serde_json::Value = server.get("/api-docs/openapi.json").await.json();
        assert!(doc["paths"]["/files"].is_object());
    }

    #[tokio::test]
    async fn test_startup_creates_store() {
        let dir = TempDir::new().unwrap();
        let config = create_test_config(&dir);
        let path = config.store.path();

        let _server = create_test_app(config).await;
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_startup_rejects_invalid_config() {
        let dir = TempDir::new().unwrap();
        let mut config = create_test_config(&dir);
        config.upload.max_name_attempts = 0;

        assert!(crate::Application::new(config).await.is_err());
    }
}
