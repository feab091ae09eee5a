//! HTTP service for the image archive and daemon status.
//!
//! Serves the stored images straight off the filesystem, a small
//! auto-refreshing index page, and the status snapshot as JSON. The
//! server never touches the capture pipeline directly; everything it
//! serves comes through the latest-image pointer, the status cache,
//! or the image directory itself.

use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::{
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Json, Redirect, Response},
    routing::get,
    Router,
};
use serde::Serialize;
use thiserror::Error;
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::status::{StatusCache, StatusSnapshot};
use crate::config::ServerConfig;
use crate::pipeline::LatestImage;

/// Errors that can occur while running the HTTP service.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind to address: {0}")]
    Bind(#[from] io::Error),

    #[error("server error: {0}")]
    Serve(String),
}

/// Shared state for the HTTP handlers.
pub struct ServiceState {
    latest: Arc<LatestImage>,
    status: Arc<StatusCache>,
    last_served: ArcSwap<StatusSnapshot>,
    images_root: PathBuf,
    page_refresh_seconds: u32,
}

impl ServiceState {
    /// Creates handler state over the shared capture-side handles.
    pub fn new(
        latest: Arc<LatestImage>,
        status: Arc<StatusCache>,
        images_root: PathBuf,
        page_refresh_seconds: u32,
    ) -> Self {
        Self {
            latest,
            status,
            last_served: ArcSwap::from_pointee(StatusSnapshot::default()),
            images_root,
            page_refresh_seconds,
        }
    }

    /// Reads the current snapshot, falling back to the last served
    /// one when the publisher holds the slot past the read bound.
    async fn read_status(&self) -> Arc<StatusSnapshot> {
        let fresh = self.status.read().await;
        self.merge_read(fresh)
    }

    fn merge_read(&self, fresh: Option<StatusSnapshot>) -> Arc<StatusSnapshot> {
        match fresh {
            Some(snapshot) => {
                let shared = Arc::new(snapshot);
                self.last_served.store(Arc::clone(&shared));
                shared
            }
            None => self.last_served.load_full(),
        }
    }
}

/// The HTTP server for images and status.
pub struct ApiServer {
    listen: SocketAddr,
    state: Arc<ServiceState>,
}

impl ApiServer {
    /// Creates a server from config and handler state.
    pub fn new(config: &ServerConfig, state: Arc<ServiceState>) -> Self {
        Self {
            listen: config.listen,
            state,
        }
    }

    /// Runs the server until the shutdown flag is raised.
    pub async fn run(self, shutdown: Arc<AtomicBool>) -> Result<(), ServerError> {
        let app = build_router(self.state);
        let listener = tokio::net::TcpListener::bind(self.listen).await?;

        info!(addr = %self.listen, "Service listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                while !shutdown.load(Ordering::Relaxed) {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                }
            })
            .await
            .map_err(|e| ServerError::Serve(e.to_string()))?;

        Ok(())
    }
}

fn build_router(state: Arc<ServiceState>) -> Router {
    // Image names embed a timestamp, so stored files never change
    // under a given path and can be cached indefinitely.
    let images = Router::new()
        .nest_service("/i", ServeDir::new(&state.images_root))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::CACHE_CONTROL,
            HeaderValue::from_static("public, max-age=31536000, immutable"),
        ));

    Router::new()
        .route("/", get(index_handler))
        .route("/latest.jpg", get(latest_handler))
        .route("/status.json", get(status_handler))
        .route("/fs", get(fs_handler))
        .route("/healthz", get(healthz_handler))
        .route("/favicon.ico", get(favicon_handler))
        .merge(images)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Handler for the index page.
async fn index_handler(State(state): State<Arc<ServiceState>>) -> Html<String> {
    let snapshot = state.read_status().await;
    Html(render_index(&snapshot, state.page_refresh_seconds))
}

/// Handler for `/latest.jpg`: redirects to the newest stored image.
async fn latest_handler(State(state): State<Arc<ServiceState>>) -> Response {
    match state.latest.get() {
        Some(path) => Redirect::temporary(&format!("/{path}")).into_response(),
        None => (StatusCode::NOT_FOUND, "no image captured yet").into_response(),
    }
}

/// Handler for `/status.json`.
async fn status_handler(State(state): State<Arc<ServiceState>>) -> Json<StatusSnapshot> {
    let snapshot = state.read_status().await;
    Json(snapshot.as_ref().clone())
}

/// One stored file in the `/fs` listing.
#[derive(Debug, Serialize)]
struct FsEntry {
    name: String,
    size: u64,
}

/// The `/fs` listing: stored files plus totals.
#[derive(Debug, Serialize)]
struct FsListing {
    entries: Vec<FsEntry>,
    count: usize,
    total_bytes: u64,
}

/// Handler for `/fs`: lists the image directory with sizes.
async fn fs_handler(State(state): State<Arc<ServiceState>>) -> Response {
    match list_images(&state.images_root).await {
        Ok(listing) => Json(listing).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("listing failed: {e}"),
        )
            .into_response(),
    }
}

async fn list_images(root: &Path) -> io::Result<FsListing> {
    let mut entries = Vec::new();
    let mut dir = tokio::fs::read_dir(root).await?;
    while let Some(entry) = dir.next_entry().await? {
        let metadata = entry.metadata().await?;
        if !metadata.is_file() {
            continue;
        }
        entries.push(FsEntry {
            name: entry.file_name().to_string_lossy().into_owned(),
            size: metadata.len(),
        });
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    let count = entries.len();
    let total_bytes = entries.iter().map(|e| e.size).sum();
    Ok(FsListing {
        entries,
        count,
        total_bytes,
    })
}

/// Handler for the liveness probe.
async fn healthz_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Handler for `/favicon.ico`; browsers ask, we decline quietly.
async fn favicon_handler() -> StatusCode {
    StatusCode::NO_CONTENT
}

fn render_index(snapshot: &StatusSnapshot, refresh_seconds: u32) -> String {
    let refresh_ms = u64::from(refresh_seconds) * 1000;
    let image = match snapshot.latest_image.as_deref() {
        Some(path) => format!(r#"<img id="latest" src="/{path}" alt="latest capture">"#),
        None => "<p>No image captured yet.</p>".to_string(),
    };
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>ringcam</title>
<style>
body {{ background: #111; color: #ddd; font-family: monospace; margin: 2em; }}
img {{ max-width: 100%; border: 1px solid #333; }}
a {{ color: #8cf; }}
</style>
</head>
<body>
<h1>ringcam</h1>
{image}
<p>captures: {captures} | failures: {failures} | stored: {stored}/{capacity} | up: {uptime}s</p>
<p><a href="/status.json">status.json</a> | <a href="/fs">fs</a></p>
<script>
setInterval(function () {{
  var img = document.getElementById("latest");
  if (img) {{
    img.src = "/latest.jpg?t=" + Date.now();
  }}
}}, {refresh_ms});
</script>
</body>
</html>
"#,
        image = image,
        captures = snapshot.captures_total,
        failures = snapshot.capture_failures,
        stored = snapshot.stored_images,
        capacity = snapshot.ring_capacity,
        uptime = snapshot.uptime_seconds,
        refresh_ms = refresh_ms,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn current_thread_runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
    }

    fn test_state(images_root: PathBuf) -> Arc<ServiceState> {
        Arc::new(ServiceState::new(
            Arc::new(LatestImage::empty()),
            Arc::new(StatusCache::new(Duration::from_millis(20))),
            images_root,
            5,
        ))
    }

    #[test]
    fn test_latest_redirects_to_current_image() {
        let state = test_state(PathBuf::from("."));
        state.latest.publish("i/img_500.jpg".to_string());

        let runtime = current_thread_runtime();
        let response = runtime.block_on(latest_handler(State(Arc::clone(&state))));
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        let location = response.headers().get(header::LOCATION).unwrap();
        assert_eq!(location, "/i/img_500.jpg");
    }

    #[test]
    fn test_latest_missing_is_not_found() {
        let state = test_state(PathBuf::from("."));
        let runtime = current_thread_runtime();
        let response = runtime.block_on(latest_handler(State(state)));
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_status_serves_cached_snapshot() {
        let state = test_state(PathBuf::from("."));
        state.status.publish(StatusSnapshot {
            captures_total: 9,
            ..Default::default()
        });

        let runtime = current_thread_runtime();
        let Json(served) = runtime.block_on(status_handler(State(state)));
        assert_eq!(served.captures_total, 9);
    }

    #[test]
    fn test_status_falls_back_when_read_misses() {
        let state = test_state(PathBuf::from("."));

        // A fresh read both serves and becomes the fallback.
        let served = state.merge_read(Some(StatusSnapshot {
            captures_total: 4,
            ..Default::default()
        }));
        assert_eq!(served.captures_total, 4);

        // A missed read serves the fallback unchanged.
        let fallback = state.merge_read(None);
        assert_eq!(fallback.captures_total, 4);
    }

    #[test]
    fn test_fs_lists_files_with_totals() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("img_2.jpg"), b"abcd").unwrap();
        std::fs::write(dir.path().join("img_1.jpg"), b"xy").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        let runtime = current_thread_runtime();
        let listing = runtime.block_on(list_images(dir.path())).unwrap();
        assert_eq!(listing.count, 2);
        assert_eq!(listing.total_bytes, 6);
        assert_eq!(listing.entries[0].name, "img_1.jpg");
        assert_eq!(listing.entries[1].name, "img_2.jpg");
    }

    #[test]
    fn test_index_embeds_latest_image_and_refresh() {
        let snapshot = StatusSnapshot {
            latest_image: Some("i/img_77.jpg".to_string()),
            captures_total: 3,
            ..Default::default()
        };
        let page = render_index(&snapshot, 5);
        assert!(page.contains(r#"src="/i/img_77.jpg""#));
        assert!(page.contains("/latest.jpg?t="));
        assert!(page.contains("}, 5000);"));
    }

    #[test]
    fn test_index_without_image_offers_placeholder() {
        let page = render_index(&StatusSnapshot::default(), 5);
        assert!(page.contains("No image captured yet"));
        assert!(!page.contains("<img"));
    }

    #[test]
    fn test_healthz_is_ok() {
        let runtime = current_thread_runtime();
        let response = runtime.block_on(async { healthz_handler().await.into_response() });
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_router_builds() {
        let _router = build_router(test_state(PathBuf::from(".")));
    }
}
