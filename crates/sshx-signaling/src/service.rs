//! Rendezvous service - HTTP listener, routes and handlers.
//!
//! `POST /push/{key}` deposits a payload, `GET /pull/{key}` waits for one.

use crate::domain::config::{SignalingConfig, TimeoutConfig};
use crate::domain::error::{ServiceError, SignalingError};
use crate::domain::registry::{eviction_task, SlotRegistry};
use crate::domain::types::{HandshakePayload, RendezvousKey};
use crate::middleware::{SignalingMetrics, TracingLayer};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info, warn};

/// Rendezvous service state
pub struct SignalingService {
    config: SignalingConfig,
    registry: Arc<SlotRegistry>,
    metrics: Arc<SignalingMetrics>,
    shutdown_tx: watch::Sender<bool>,
}

impl SignalingService {
    /// Create a new rendezvous service
    pub fn new(config: SignalingConfig) -> Result<Self, ServiceError> {
        config.validate()?;

        let registry = Arc::new(SlotRegistry::new(config.limits.slot_capacity));
        let metrics = Arc::new(SignalingMetrics::new());
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            config,
            registry,
            metrics,
            shutdown_tx,
        })
    }

    /// Bind the configured address and serve until `shutdown()` is called
    pub async fn start(&self) -> Result<(), ServiceError> {
        let addr = self.config.http_addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServiceError::Bind { addr, source })?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until `shutdown()` is called.
    ///
    /// In-flight pulls are released with 503 when shutdown begins.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServiceError> {
        let eviction = self.start_eviction_task();

        info!(addr = %listener.local_addr()?, "Listening");

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let result = axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.wait_for(|stopping| *stopping).await;
                info!("Received shutdown signal");
            })
            .await;

        if let Some(handle) = eviction {
            handle.abort();
        }

        info!("Rendezvous service stopped");
        result.map_err(ServiceError::from)
    }

    /// Trigger graceful shutdown
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    pub fn registry(&self) -> Arc<SlotRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn metrics(&self) -> Arc<SignalingMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn config(&self) -> &SignalingConfig {
        &self.config
    }

    /// Build the HTTP router
    pub fn router(&self) -> Router {
        Router::new()
            .route("/push/*key", post(handle_push))
            .route("/pull/*key", get(handle_pull))
            .route("/health", get(health_check))
            .route("/metrics", get(metrics_report))
            .layer(RequestBodyLimitLayer::new(self.config.limits.max_payload_bytes))
            .layer(TracingLayer::new(Arc::clone(&self.metrics)))
            .with_state(self.state())
    }

    fn state(&self) -> AppState {
        AppState {
            registry: Arc::clone(&self.registry),
            metrics: Arc::clone(&self.metrics),
            timeouts: self.config.timeouts.clone(),
            shutdown: self.shutdown_tx.subscribe(),
        }
    }

    fn start_eviction_task(&self) -> Option<JoinHandle<()>> {
        let eviction = &self.config.eviction;
        if !eviction.enabled {
            return None;
        }

        let registry = Arc::clone(&self.registry);
        let (interval, idle_ttl) = (eviction.sweep_interval, eviction.idle_ttl);
        Some(tokio::spawn(async move {
            eviction_task(registry, interval, idle_ttl).await;
        }))
    }
}

/// Application state shared across handlers
#[derive(Clone)]
struct AppState {
    registry: Arc<SlotRegistry>,
    metrics: Arc<SignalingMetrics>,
    timeouts: TimeoutConfig,
    shutdown: watch::Receiver<bool>,
}

/// Deposit one payload under `key`
async fn handle_push(
    State(state): State<AppState>,
    Path(key): Path<String>,
    body: Bytes,
) -> Result<Response, SignalingError> {
    let Some(key) = RendezvousKey::new(key) else {
        return Ok(StatusCode::NOT_FOUND.into_response());
    };
    state.metrics.record_push();

    let payload: HandshakePayload = serde_json::from_slice(&body).map_err(|e| {
        warn!(key = %key, error = %e, "Rejecting push, body is not a handshake payload");
        SignalingError::MalformedPayload(e)
    })?;

    info!(key = %key, source = %payload.source, "Push");
    state
        .registry
        .publish(&key, payload, state.timeouts.push)
        .await
        .inspect_err(|e| warn!(key = %key, error = %e, "Push rejected"))?;

    Ok(StatusCode::OK.into_response())
}

/// Wait for the next payload under `key`
async fn handle_pull(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Response, SignalingError> {
    let Some(key) = RendezvousKey::new(key) else {
        return Ok(StatusCode::NOT_FOUND.into_response());
    };

    let _waiting = state.metrics.pull_started();
    let mut shutdown = state.shutdown.clone();
    let stopping = async move {
        // An error means the service itself is gone
        let _ = shutdown.wait_for(|stopping| *stopping).await;
    };

    // A client disconnect drops this future, which releases the wait
    let payload = tokio::select! {
        result = state.registry.subscribe(&key, state.timeouts.pull) => result?,
        _ = stopping => return Err(SignalingError::ShuttingDown),
    };

    // The payload has left the slot; a failure from here on loses it
    let body = serde_json::to_vec(&payload).map_err(|source| {
        error!(key = %key, source = %payload.source, error = %source, "Failed to encode payload, dropping it");
        SignalingError::EncodingFailure {
            key: key.clone(),
            source,
        }
    })?;

    info!(key = %key, source = %payload.source, "Pull");
    Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response())
}

/// Liveness probe
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": crate::VERSION,
    }))
}

/// HTTP counters and registry statistics
async fn metrics_report(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "http": state.metrics.to_json(),
        "registry": {
            "slots": state.registry.slot_count(),
            "capacity": state.registry.capacity(),
            "stats": state.registry.stats().to_json(),
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    fn test_service() -> SignalingService {
        let mut config = SignalingConfig::default();
        config.timeouts.pull = Duration::from_millis(50);
        config.limits.max_payload_bytes = 256;
        SignalingService::new(config).unwrap()
    }

    fn push(key: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(format!("/push/{key}"))
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn pull(key: &str) -> Request<Body> {
        Request::builder()
            .uri(format!("/pull/{key}"))
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_push_then_pull() {
        let service = test_service();
        let router = service.router();

        let response = router
            .clone()
            .oneshot(push("room1", r#"{"source":"peerA","sdp":"v=0"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(to_bytes(response.into_body(), 1024).await.unwrap().is_empty());

        let response = router.oneshot(pull("room1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        let body = to_bytes(response.into_body(), 1024).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value, serde_json::json!({"source": "peerA", "sdp": "v=0"}));
    }

    #[tokio::test]
    async fn test_malformed_push_creates_no_slot() {
        let service = test_service();

        let response = service
            .router()
            .oneshot(push("room1", "\"not-json\""))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(service.registry().slot_count(), 0);
    }

    #[tokio::test]
    async fn test_pull_timeout_has_empty_body() {
        let service = test_service();

        let response = service.router().oneshot(pull("room2")).await.unwrap();

        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
        assert!(to_bytes(response.into_body(), 1024).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_nested_key_used_verbatim() {
        let service = test_service();
        let router = service.router();

        router
            .clone()
            .oneshot(push("a/b", r#"{"source":"peerA"}"#))
            .await
            .unwrap();

        let key = RendezvousKey::new("a/b").unwrap();
        assert_eq!(service.registry().pending(&key), Some(1));
        assert_eq!(router.oneshot(pull("a/b")).await.unwrap().status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_oversized_push_rejected() {
        let service = test_service();
        let body = format!(r#"{{"source":"peerA","sdp":"{}"}}"#, "x".repeat(1024));

        let response = service.router().oneshot(push("big", &body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(service.registry().slot_count(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_releases_pull() {
        let mut config = SignalingConfig::default();
        config.timeouts.pull = Duration::from_secs(60);
        let service = SignalingService::new(config).unwrap();
        let router = service.router();

        let waiting = tokio::spawn(router.oneshot(pull("room9")));
        tokio::time::sleep(Duration::from_millis(20)).await;
        service.shutdown();

        let response = tokio::time::timeout(Duration::from_secs(5), waiting)
            .await
            .expect("pull should be released promptly")
            .unwrap()
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_health_and_metrics() {
        let service = test_service();
        let router = service.router();

        let response = router
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        router
            .clone()
            .oneshot(push("room1", r#"{"source":"peerA"}"#))
            .await
            .unwrap();

        let response = router
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = to_bytes(response.into_body(), 4096).await.unwrap();
        let report: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(report["registry"]["slots"], 1);
        assert_eq!(report["registry"]["stats"]["published"], 1);
        assert_eq!(report["http"]["requests"]["push"], 1);
    }

    #[tokio::test]
    async fn test_empty_key_not_counted() {
        let service = test_service();

        let push = handle_push(State(service.state()), Path(String::new()), Bytes::new())
            .await
            .unwrap();
        let pull = handle_pull(State(service.state()), Path(String::new()))
            .await
            .unwrap();

        assert_eq!(push.status(), StatusCode::NOT_FOUND);
        assert_eq!(pull.status(), StatusCode::NOT_FOUND);
        let counters = service.metrics().to_json();
        assert_eq!(counters["requests"]["push"], 0);
        assert_eq!(counters["requests"]["pull"], 0);
        assert_eq!(service.registry().slot_count(), 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = SignalingConfig::default();
        config.limits.slot_capacity = 0;
        assert!(matches!(
            SignalingService::new(config),
            Err(ServiceError::Config(_))
        ));
    }
}
