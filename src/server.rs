use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::{
    command,
    config::{ProxyConfig, ScanOptions},
    preflight, scan,
    types::ScanReport,
};

#[derive(Clone)]
pub struct AppState {
    inner: Arc<RwLock<ServerState>>,
    // set while a scan runs; one scan at a time
    running: Arc<AtomicBool>,
    proxy: Arc<ProxyConfig>,
}

#[derive(Debug, Default)]
struct ServerState {
    scans: u64,
    last: Option<ScanReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Status {
    pub state: String, // "idle" | "running"
    pub scans: u64,
}

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    pub host: String,
    #[serde(default)]
    pub top_ports: Option<u16>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub use_proxy: Option<bool>,
}

/// Claim on the single scan slot, released on drop.
struct ScanSlot(Arc<AtomicBool>);

impl ScanSlot {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag.clone()))
    }
}

impl Drop for ScanSlot {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ScanRequest {
    fn options(&self) -> ScanOptions {
        let d = ScanOptions::default();
        ScanOptions {
            top_ports: self.top_ports.unwrap_or(d.top_ports),
            user_agent: self.user_agent.clone().unwrap_or(d.user_agent),
            use_proxy: self.use_proxy.unwrap_or(d.use_proxy),
        }
    }
}

impl AppState {
    pub fn new(proxy: ProxyConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(ServerState::default())),
            running: Arc::new(AtomicBool::new(false)),
            proxy: Arc::new(proxy),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/status", get(get_status))
        .route("/scan", post(post_scan))
        .route("/results", get(get_results))
        .with_state(state);

    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
}

/// Serve the scan API on `bind` until `shutdown` fires.
pub async fn spawn_server(bind: &str, proxy: ProxyConfig, shutdown: CancellationToken) -> Result<()> {
    let app = router(AppState::new(proxy));
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(addr = %listener.local_addr()?, "serving scan API");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

async fn get_status(State(app): State<AppState>) -> impl IntoResponse {
    let state = if app.running.load(Ordering::Acquire) { "running" } else { "idle" };
    let scans = app.inner.read().await.scans;
    (StatusCode::OK, Json(Status { state: state.into(), scans }))
}

async fn get_results(State(app): State<AppState>) -> impl IntoResponse {
    let s = app.inner.read().await;
    if let Some(report) = s.last.as_ref() {
        (StatusCode::OK, Json(report.clone())).into_response()
    } else {
        StatusCode::NO_CONTENT.into_response()
    }
}

async fn post_scan(State(app): State<AppState>, Json(req): Json<ScanRequest>) -> impl IntoResponse {
    let opts = req.options();
    let host = command::target_host(&req.host);
    if let Err(e) = command::validate(&host, &opts) {
        return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
    }

    let Some(slot) = ScanSlot::acquire(&app.running) else {
        return (StatusCode::CONFLICT, "a scan is already running").into_response();
    };

    let proxy = app.proxy.clone();
    let res = tokio::task::spawn_blocking(move || -> Result<ScanReport, (StatusCode, String)> {
        let _slot = slot;
        preflight::run_preflight(&proxy, &opts)
            .map_err(|e| (StatusCode::SERVICE_UNAVAILABLE, e.to_string()))?;
        scan::scan_host(&host, &opts, &proxy)
            .map_err(|e| (StatusCode::BAD_GATEWAY, format!("{e:#}")))
    })
    .await;

    match res {
        Ok(Ok(report)) => {
            let mut s = app.inner.write().await;
            s.scans += 1;
            s.last = Some(report.clone());
            (StatusCode::OK, Json(report)).into_response()
        }
        Ok(Err((status, msg))) => {
            warn!(%status, error = %msg, "scan request failed");
            (status, msg).into_response()
        }
        Err(e) => {
            error!(error = %e, "scan task panicked");
            (StatusCode::INTERNAL_SERVER_ERROR, "scan task failed").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn app() -> Router {
        router(AppState::new(ProxyConfig::default()))
    }

    #[tokio::test]
    async fn status_starts_idle() {
        let resp = app()
            .oneshot(Request::get("/api/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = to_bytes(resp.into_body(), 1024).await.unwrap();
        let status: Status = serde_json::from_slice(&body).unwrap();
        assert_eq!(status, Status { state: "idle".into(), scans: 0 });
    }

    #[tokio::test]
    async fn results_empty_before_first_scan() {
        let resp = app()
            .oneshot(Request::get("/api/results").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn injected_host_is_rejected() {
        let req = Request::post("/api/scan")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"host":"example.org; id"}"#))
            .unwrap();
        let resp = app().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    fn scan_request(body: &'static str) -> Request<Body> {
        Request::post("/api/scan")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn busy_server_reports_running_and_refuses_second_scan() {
        let state = AppState::new(ProxyConfig::default());
        let slot = ScanSlot::acquire(&state.running).unwrap();

        let resp = router(state.clone())
            .oneshot(Request::get("/api/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = to_bytes(resp.into_body(), 1024).await.unwrap();
        let status: Status = serde_json::from_slice(&body).unwrap();
        assert_eq!(status.state, "running");

        let resp = router(state.clone())
            .oneshot(scan_request(r#"{"host":"example.org"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        drop(slot);
        assert!(!state.running.load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn status_does_not_take_the_scan_slot() {
        let state = AppState::new(ProxyConfig::default());
        let resp = router(state.clone())
            .oneshot(Request::get("/api/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(ScanSlot::acquire(&state.running).is_some());
    }

    #[tokio::test]
    async fn url_host_is_reduced_before_validation() {
        // Slot held so the request stops right after validation.
        let state = AppState::new(ProxyConfig::default());
        let _slot = ScanSlot::acquire(&state.running).unwrap();

        for body in [
            r#"{"host":"https://example.org/login"}"#,
            r#"{"host":"https://[2001:db8::1]:443/"}"#,
        ] {
            let resp = router(state.clone()).oneshot(scan_request(body)).await.unwrap();
            assert_eq!(resp.status(), StatusCode::CONFLICT, "body {body}");
        }
    }

    #[test]
    fn request_defaults_fill_options() {
        let req: ScanRequest = serde_json::from_str(r#"{"host":"example.org","top_ports":25}"#).unwrap();
        let opts = req.options();
        assert_eq!(opts.top_ports, 25);
        assert_eq!(opts.user_agent, "Mozilla");
        assert!(opts.use_proxy);
    }
}
