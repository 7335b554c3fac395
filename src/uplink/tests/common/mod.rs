//! Shared helpers: manifest fixtures and mock uplink registries.

#![allow(dead_code)]

use axum::{
    extract::Path,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uplink::config::{Interval, UplinkConfig};
use uplink::Manifest;

// Initialize tracing for tests
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Manifest for `name` with the given versions; `source` is baked into tarball
/// URLs and shasums so manifests from different sources are distinguishable.
pub fn package_metadata(name: &str, versions: &[&str], source: &str) -> Manifest {
    let mut version_map = serde_json::Map::new();
    let mut time = serde_json::Map::new();
    time.insert("created".into(), json!("2020-01-01T00:00:00.000Z"));
    time.insert("modified".into(), json!("2024-01-01T00:00:00.000Z"));

    for (idx, version) in versions.iter().enumerate() {
        version_map.insert(
            version.to_string(),
            json!({
                "name": name,
                "version": version,
                "description": format!("{} from {}", name, source),
                "dist": {
                    "tarball": format!("http://{}/{}/-/{}-{}.tgz", source, name, name, version),
                    "shasum": format!("{}-{}", source, version),
                },
            }),
        );
        time.insert(
            version.to_string(),
            json!(format!("2021-01-{:02}T00:00:00.000Z", idx + 1)),
        );
    }

    let latest = versions.last().copied().unwrap_or_default();
    serde_json::from_value(json!({
        "name": name,
        "versions": version_map,
        "dist-tags": { "latest": latest },
        "time": time,
        "readme": format!("# {}", name),
    }))
    .expect("fixture manifest must deserialize")
}

pub fn uplink_config(name: &str, url: &str, timeout_ms: i64) -> UplinkConfig {
    let mut config = UplinkConfig::new(name, url);
    config.timeout = Interval::from_millis(timeout_ms);
    config
}

/// How a mock uplink answers
#[derive(Clone)]
pub enum Reply {
    /// Status plus manifest body, after an optional delay
    Manifest {
        status: StatusCode,
        manifest: Manifest,
        delay: Duration,
        etag: Option<String>,
    },
    Status(StatusCode),
    /// Invalid JSON body
    Garbage,
}

impl Reply {
    pub fn ok(manifest: Manifest) -> Self {
        Self::delayed(manifest, Duration::ZERO)
    }

    pub fn delayed(manifest: Manifest, delay: Duration) -> Self {
        Reply::Manifest {
            status: StatusCode::CREATED,
            manifest,
            delay,
            etag: None,
        }
    }
}

/// Running mock uplink
pub struct MockUplink {
    pub url: String,
    pub hits: Arc<AtomicUsize>,
    pub handle: tokio::task::JoinHandle<()>,
}

impl MockUplink {
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

impl Drop for MockUplink {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn answer(reply: Reply) -> Response {
    match reply {
        Reply::Manifest {
            status,
            manifest,
            delay,
            etag,
        } => {
            tokio::time::sleep(delay).await;
            let mut response = (status, axum::Json(manifest)).into_response();
            if let Some(etag) = etag {
                if let Ok(value) = etag.parse() {
                    response.headers_mut().insert("etag", value);
                }
            }
            response
        }
        Reply::Status(status) => status.into_response(),
        Reply::Garbage => (StatusCode::OK, "{not json").into_response(),
    }
}

/// Start a mock uplink answering every package request with `reply`
pub async fn start_mock_uplink(reply: Reply) -> MockUplink {
    start_mock_uplink_with(move |_name, _headers, _hit| reply.clone()).await
}

/// Start a mock uplink whose reply depends on the package name, the request
/// headers and the 1-based request count.
pub async fn start_mock_uplink_with<F>(respond: F) -> MockUplink
where
    F: Fn(String, HeaderMap, usize) -> Reply + Clone + Send + Sync + 'static,
{
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();

    let app = Router::new().route(
        "/:name",
        get(move |Path(name): Path<String>, headers: HeaderMap| {
            let respond = respond.clone();
            let counter = counter.clone();
            async move {
                let hit = counter.fetch_add(1, Ordering::SeqCst) + 1;
                answer(respond(name, headers, hit)).await
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock uplink");
    let addr = listener.local_addr().expect("mock uplink address");
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    MockUplink {
        url: format!("http://{}", addr),
        hits,
        handle,
    }
}

/// URL of a port nothing listens on
pub async fn unreachable_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind probe listener");
    let addr = listener.local_addr().expect("probe address");
    drop(listener);
    format!("http://{}", addr)
}
