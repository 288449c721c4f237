use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use serde::Serialize;

use crate::engine::PresentationSnapshot;
use crate::managers::BroadcastChannelManager;
use crate::recognition::ConnectionState;
use crate::telemetry::{self, TelemetrySnapshot};

use super::sse;

const TOKEN_HEADER: &str = "x-debug-token";

/// State shared by every debug handler
#[derive(Clone)]
pub struct DebugHttpState {
    pub broadcasts: BroadcastChannelManager,
    token: Arc<str>,
    started: Instant,
}

impl DebugHttpState {
    pub fn new(broadcasts: BroadcastChannelManager, token: String) -> Self {
        Self {
            broadcasts,
            token: token.into(),
            started: Instant::now(),
        }
    }
}

#[derive(Debug)]
pub enum HttpServerError {
    Unauthorized,
    ServiceUnavailable(&'static str),
}

impl IntoResponse for HttpServerError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "missing or invalid token"),
            Self::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_ms: u64,
    pub frames_seen: bool,
    /// Recognizer connectivity as of the latest frame
    pub connectivity: Option<ConnectionState>,
}

#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    pub latest_presentation: Option<PresentationSnapshot>,
    pub diagnostics: TelemetrySnapshot,
}

/// All routes sit behind the token check.
pub fn build_router(state: DebugHttpState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/snapshot", get(snapshot))
        .route("/metrics", get(metrics))
        .route("/snapshot-stream", get(snapshot_stream))
        .route("/strum-stream", get(strum_stream))
        .route("/telemetry-stream", get(telemetry_stream))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token))
        .with_state(state)
}

pub async fn run_http_server(state: DebugHttpState, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding debug HTTP listener on {addr}"))?;
    axum::serve(listener, build_router(state))
        .await
        .context("serving debug HTTP router")
}

async fn require_token(
    State(state): State<DebugHttpState>,
    request: Request,
    next: Next,
) -> Result<Response, HttpServerError> {
    let authorized = presented_token(&request) == Some(&*state.token);
    if !authorized {
        return Err(HttpServerError::Unauthorized);
    }
    Ok(next.run(request).await)
}

/// `?token=` wins over `x-debug-token`, which wins over a bearer header.
fn presented_token(request: &Request) -> Option<&str> {
    let from_query = request.uri().query().and_then(|query| {
        query
            .split('&')
            .find_map(|pair| pair.strip_prefix("token="))
    });
    let headers = request.headers();
    from_query
        .or_else(|| headers.get(TOKEN_HEADER).and_then(|v| v.to_str().ok()))
        .or_else(|| {
            headers
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|raw| raw.strip_prefix("Bearer "))
        })
}

async fn health(State(state): State<DebugHttpState>) -> Json<HealthResponse> {
    let latest = state.broadcasts.latest_presentation();
    Json(HealthResponse {
        status: "ok",
        uptime_ms: state.started.elapsed().as_millis() as u64,
        frames_seen: latest.is_some(),
        connectivity: latest.map(|snapshot| snapshot.connectivity),
    })
}

async fn snapshot(
    State(state): State<DebugHttpState>,
) -> Result<Json<PresentationSnapshot>, HttpServerError> {
    state
        .broadcasts
        .latest_presentation()
        .map(Json)
        .ok_or(HttpServerError::ServiceUnavailable("no frame processed yet"))
}

async fn metrics(State(state): State<DebugHttpState>) -> Json<MetricsResponse> {
    Json(MetricsResponse {
        latest_presentation: state.broadcasts.latest_presentation(),
        diagnostics: telemetry::hub().snapshot(),
    })
}

async fn snapshot_stream(
    State(state): State<DebugHttpState>,
) -> Result<sse::EventStream, HttpServerError> {
    sse::presentation(&state.broadcasts)
}

async fn strum_stream(
    State(state): State<DebugHttpState>,
) -> Result<sse::EventStream, HttpServerError> {
    sse::strums(&state.broadcasts)
}

async fn telemetry_stream() -> sse::EventStream {
    sse::telemetry()
}

#[cfg(all(test, feature = "debug_http"))]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    const TOKEN: &str = "smoke-token";

    fn router(broadcasts: BroadcastChannelManager) -> Router {
        build_router(DebugHttpState::new(broadcasts, TOKEN.to_string()))
    }

    async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.oneshot(request).await.expect("call");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("response body bytes");
        let json = serde_json::from_slice::<Value>(&bytes).expect("JSON body");
        (status, json)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).expect("request")
    }

    #[tokio::test]
    async fn every_route_requires_token() {
        for uri in ["/health", "/snapshot", "/metrics", "/strum-stream"] {
            let (status, json) = send(router(BroadcastChannelManager::new()), get(uri)).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
            assert_eq!(json["error"], "missing or invalid token");
        }
    }

    #[tokio::test]
    async fn wrong_token_is_rejected() {
        let (status, _) = send(
            router(BroadcastChannelManager::new()),
            get("/health?token=nope"),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn health_accepts_query_header_and_bearer() {
        let requests = [
            get(&format!("/health?token={TOKEN}")),
            Request::builder()
                .uri("/health")
                .header(TOKEN_HEADER, TOKEN)
                .body(Body::empty())
                .expect("request"),
            Request::builder()
                .uri("/health")
                .header(AUTHORIZATION, format!("Bearer {TOKEN}"))
                .body(Body::empty())
                .expect("request"),
        ];
        for request in requests {
            let (status, json) = send(router(BroadcastChannelManager::new()), request).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(json["status"], "ok");
            assert_eq!(json["frames_seen"], false);
            assert!(json["connectivity"].is_null());
        }
    }

    #[tokio::test]
    async fn snapshot_unavailable_before_first_frame() {
        let (status, _) = send(
            router(BroadcastChannelManager::new()),
            get(&format!("/snapshot?token={TOKEN}")),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn snapshot_returns_latest_presentation() {
        let broadcasts = BroadcastChannelManager::new();
        broadcasts.publish_presentation(&PresentationSnapshot {
            timestamp_ms: 250.0,
            correction_active: true,
            chord_id: Some("G_Major".to_string()),
            ..PresentationSnapshot::default()
        });

        let (status, json) = send(router(broadcasts), get(&format!("/snapshot?token={TOKEN}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["chord_id"], "G_Major");
        assert_eq!(json["correction_active"], true);
    }

    #[tokio::test]
    async fn metrics_include_counters() {
        let (status, json) = send(
            router(BroadcastChannelManager::new()),
            get(&format!("/metrics?token={TOKEN}")),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(json["diagnostics"]["counters"].is_object());
        assert!(json["latest_presentation"].is_null());
    }

    #[tokio::test]
    async fn stream_requires_initialized_channel() {
        let (status, _) = send(
            router(BroadcastChannelManager::new()),
            get(&format!("/strum-stream?token={TOKEN}")),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
