//! Prometheus scrape endpoint
//!
//! Serves the latency recorder's registry on `/metrics`. The server runs in
//! a background task; failing to bind is logged and the worker carries on.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use roundtrip_core::PrometheusLatencyRecorder;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Router exposing `/metrics` for `recorder`.
pub fn router(recorder: Arc<PrometheusLatencyRecorder>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(recorder)
}

/// Handler for /metrics endpoint
async fn metrics_handler(State(recorder): State<Arc<PrometheusLatencyRecorder>>) -> Response {
    match recorder.export_text() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, recorder.content_type())],
            body,
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode metrics: {}", e),
        )
            .into_response(),
    }
}

/// Bind `addr` and serve metrics in the background.
pub fn spawn_metrics_server(
    addr: String,
    recorder: Arc<PrometheusLatencyRecorder>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let listener = match TcpListener::bind(&addr).await {
            Ok(listener) => listener,
            Err(e) => {
                error!(%addr, error = %e, "Failed to bind metrics endpoint");
                return;
            }
        };
        serve(listener, recorder).await;
    })
}

/// Serve metrics on an already bound listener until the task is dropped.
pub async fn serve(listener: TcpListener, recorder: Arc<PrometheusLatencyRecorder>) {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "Metrics endpoint listening");
    }
    if let Err(e) = axum::serve(listener, router(recorder)).await {
        error!(error = %e, "Metrics endpoint stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roundtrip_core::LatencyRecorder;
    use std::time::Duration;

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let recorder = Arc::new(PrometheusLatencyRecorder::new().unwrap());
        recorder.observe(Duration::from_millis(300));

        let response = metrics_handler(State(recorder)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let content_type = response.headers().get("content-type").unwrap();
        assert!(content_type
            .to_str()
            .unwrap()
            .contains("text/plain; version=0.0.4"));

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("roundtrip_latency_seconds_count 1"));
    }

    #[tokio::test]
    async fn test_served_over_http() {
        let recorder = Arc::new(PrometheusLatencyRecorder::new().unwrap());
        recorder.observe(Duration::from_secs(2));
        recorder.record_outcome(true);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, recorder));

        let text = reqwest::get(format!("http://{}/metrics", addr))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();

        assert!(text.contains("roundtrip_latency_seconds_bucket"));
        assert!(text.contains("roundtrip_calls_total{outcome=\"success\"} 1"));
    }

    #[tokio::test]
    async fn test_bind_failure_is_not_fatal() {
        let occupied = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = occupied.local_addr().unwrap().to_string();
        let recorder = Arc::new(PrometheusLatencyRecorder::new().unwrap());

        let handle = spawn_metrics_server(addr, recorder);

        // Task ends after logging instead of panicking
        handle.await.unwrap();
        drop(occupied);
    }
}
