//! Per-request span and request accounting.
//!
//! Every request runs inside an `signaling_request` span carrying the HTTP
//! method, the path and, once the handler returns, the status and latency.

use super::metrics::{RequestTimer, SignalingMetrics};
use axum::{body::Body, http::Request, response::Response};
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::{debug, info_span, Instrument, Span};

/// Tracing layer that creates a span for each request and records its outcome
#[derive(Clone)]
pub struct TracingLayer {
    metrics: Arc<SignalingMetrics>,
}

impl TracingLayer {
    pub fn new(metrics: Arc<SignalingMetrics>) -> Self {
        Self { metrics }
    }
}

impl<S> Layer<S> for TracingLayer {
    type Service = TracingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TracingService {
            inner,
            metrics: Arc::clone(&self.metrics),
        }
    }
}

/// Tracing service
#[derive(Clone)]
pub struct TracingService<S> {
    inner: S,
    metrics: Arc<SignalingMetrics>,
}

impl<S> Service<Request<Body>> for TracingService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        // Take the service that was driven to readiness, leave a fresh clone behind
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let metrics = Arc::clone(&self.metrics);

        let span = info_span!(
            "signaling_request",
            http.method = %req.method(),
            http.target = %req.uri().path(),
            http.status_code = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
        );

        Box::pin(
            async move {
                let timer = RequestTimer::start();
                let result = inner.call(req).await;
                let latency_ms = timer.elapsed_ms();

                let success = match &result {
                    Ok(response) => {
                        let status = response.status();
                        Span::current().record("http.status_code", status.as_u16());
                        !(status.is_client_error() || status.is_server_error())
                    }
                    Err(_) => false,
                };
                Span::current().record("latency_ms", latency_ms);
                metrics.record_request(success, latency_ms);
                debug!(success, latency_ms, "Request finished");

                result
            }
            .instrument(span),
        )
    }
}
