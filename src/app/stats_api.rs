//! Prometheus metrics HTTP endpoint
//!
//! Serves `GET /metrics` for scraping while proxy mode runs.

use std::net::SocketAddr;

use axum::{
    http::{header::CONTENT_TYPE, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use prometheus::{Encoder, TextEncoder};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::common::shutdown_signalled;
use crate::error::Result;
use crate::relay::metrics::{init_metrics, REGISTRY};

/// Prometheus metrics endpoint
async fn get_metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(CONTENT_TYPE, "text/plain; charset=utf-8")],
            e.to_string().into_bytes(),
        ),
    }
}

/// Build the API router (metrics only)
pub fn build_api_router() -> Router {
    Router::new().route("/metrics", get(get_metrics))
}

/// Bind the metrics listener up front so a bad address fails the caller.
pub async fn bind_api(addr: SocketAddr) -> Result<TcpListener> {
    init_metrics();
    let listener = TcpListener::bind(addr).await?;
    info!(
        "Prometheus metrics server listening on http://{}/metrics",
        listener.local_addr()?
    );
    Ok(listener)
}

/// Serve until `shutdown_rx` flips to true.
pub async fn serve_api(listener: TcpListener, mut shutdown_rx: watch::Receiver<bool>) {
    axum::serve(listener, build_api_router())
        .with_graceful_shutdown(async move {
            shutdown_signalled(&mut shutdown_rx).await;
            info!("Metrics server shutting down");
        })
        .await
        .unwrap_or_else(|e| {
            warn!("Metrics server error: {}", e);
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::HttpClient;
    use crate::relay::metrics::RELAY_CONNECTIONS_TOTAL;
    use crate::transport::TcpTransport;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let listener = bind_api("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = listener.local_addr().unwrap();
        RELAY_CONNECTIONS_TOTAL.inc_by(0);

        let (tx, rx) = watch::channel(false);
        let server = tokio::spawn(serve_api(listener, rx));

        let client = HttpClient::new(Arc::new(TcpTransport::new()));
        let mut response = client
            .get(&format!("http://{}/metrics", addr))
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);
        assert!(response.read_body(0).await.unwrap() > 0);
        drop(response);

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();
    }
}
