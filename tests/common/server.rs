//! Test server lifecycle management
//!
//! Each test gets an isolated agent (own database and repository directory)
//! plus a feed host it can publish documents and bundle payloads on.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use appliance_agent::catalog_store::SqliteCatalogStore;
use appliance_agent::download_manager::{DownloadManager, HttpApplianceFetcher};
use appliance_agent::feed_sync::{FeedSynchronizer, HttpFeedFetcher};
use appliance_agent::notifications::RecordingSink;
use appliance_agent::router::RequestRouter;
use appliance_agent::server::make_router;

const SERVER_READY_TIMEOUT_MS: u64 = 5_000;
const SERVER_READY_POLL_INTERVAL_MS: u64 = 20;

type HostedBodies = Arc<Mutex<HashMap<String, Vec<u8>>>>;

/// In-process HTTP host standing in for remote feed publishers. Serves
/// whatever bodies tests put into it, 404s everything else.
pub struct FeedHost {
    pub base_url: String,
    bodies: HostedBodies,
}

async fn serve_hosted(
    State(bodies): State<HostedBodies>,
    Path(path): Path<String>,
) -> impl IntoResponse {
    match bodies.lock().unwrap().get(&path) {
        Some(body) => (StatusCode::OK, body.clone()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

impl FeedHost {
    pub async fn spawn() -> Self {
        let bodies: HostedBodies = Arc::new(Mutex::new(HashMap::new()));
        let app = Router::new()
            .route("/{*path}", get(serve_hosted))
            .with_state(bodies.clone());
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind feed host");
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("Feed host failed");
        });
        Self { base_url, bodies }
    }

    /// Host `body` at `path` (no leading slash) and return its full URL.
    pub fn put(&self, path: &str, body: impl Into<Vec<u8>>) -> String {
        self.bodies
            .lock()
            .unwrap()
            .insert(path.to_string(), body.into());
        self.url(path)
    }

    pub fn remove(&self, path: &str) {
        self.bodies.lock().unwrap().remove(path);
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

/// Test agent instance with isolated database and repository directory.
pub struct TestServer {
    pub base_url: String,
    pub repository_path: PathBuf,
    pub sink: Arc<RecordingSink>,

    // Private fields - keep resources alive until drop
    _temp_dir: TempDir,
    cancellation_token: CancellationToken,
}

impl TestServer {
    pub async fn spawn() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let repository_path = temp_dir.path().join("repo");
        std::fs::create_dir(&repository_path).expect("Failed to create repository dir");
        let db_path = temp_dir.path().join("catalog.db");

        let catalog_store =
            Arc::new(SqliteCatalogStore::new(&db_path).expect("Failed to open catalog store"));
        let sink = Arc::new(RecordingSink::default());
        let download_manager = DownloadManager::new(
            catalog_store.clone(),
            Arc::new(HttpApplianceFetcher::new(Duration::from_secs(2))),
            repository_path.clone(),
            sink.clone(),
            sink.clone(),
        );
        let synchronizer = FeedSynchronizer::new(
            catalog_store.clone(),
            Arc::new(HttpFeedFetcher::new(Duration::from_secs(2))),
            download_manager.clone(),
            sink.clone(),
        );
        let request_router = Arc::new(RequestRouter::new(
            synchronizer,
            download_manager,
            catalog_store,
        ));

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let base_url = format!("http://{}", listener.local_addr().unwrap());

        let cancellation_token = CancellationToken::new();
        let shutdown_token = cancellation_token.clone();
        let app = make_router(request_router);
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown_token.cancelled().await })
                .await
                .expect("Server failed");
        });

        let server = Self {
            base_url,
            repository_path,
            sink,
            _temp_dir: temp_dir,
            cancellation_token,
        };
        server.wait_for_ready().await;
        server
    }

    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);
        loop {
            if start.elapsed() > timeout {
                panic!("Server did not become ready within {}ms", SERVER_READY_TIMEOUT_MS);
            }
            match client.get(format!("{}/", self.base_url)).send().await {
                Ok(response) if response.status().is_success() => return,
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.cancellation_token.cancel();
        // TempDir is cleaned up automatically
    }
}
