//! Prometheus metrics endpoint.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::Router;
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

/// Indexer metrics registry.
pub struct Metrics {
    registry: Registry,
    /// Greatest contiguously indexed height.
    pub indexed_height: Gauge,
    /// First indexed height of the spork.
    pub first_height: Gauge,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();
        let indexed_height = Gauge::default();
        let first_height = Gauge::default();

        registry.register(
            "amber_indexed_height",
            "Greatest contiguously indexed height",
            indexed_height.clone(),
        );
        registry.register(
            "amber_first_height",
            "First indexed height of the spork",
            first_height.clone(),
        );

        Self {
            registry,
            indexed_height,
            first_height,
        }
    }

    fn encode_prometheus(&self) -> String {
        let mut buffer = String::new();
        if encode(&mut buffer, &self.registry).is_err() {
            return String::from("# error encoding metrics\n");
        }
        buffer
    }
}

async fn metrics_handler(State(metrics): State<Arc<Metrics>>) -> String {
    metrics.encode_prometheus()
}

/// Serve `/metrics` until aborted.
pub async fn serve(addr: SocketAddr, metrics: Arc<Metrics>) -> std::io::Result<()> {
    let router = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metrics);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "metrics server listening");
    axum::serve(listener, router).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_metrics_encode() {
        let metrics = Metrics::new();
        metrics.indexed_height.set(42);
        let encoded = metrics.encode_prometheus();
        assert!(encoded.contains("amber_indexed_height"));
        assert!(encoded.contains("42"));
    }
}
