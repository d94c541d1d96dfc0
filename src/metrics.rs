//! Prometheus metrics
//!
//! Tracking throughput counters and the per-bulletin processing-time
//! histogram, exposed on a dedicated listener (`$METRICS_PORT`, default
//! 6901) at `/metrics`.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, Registry, TextEncoder};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Default metrics listener port.
pub const DEFAULT_METRICS_PORT: u16 = 6901;

pub struct Metrics {
    registry: Registry,
    /// Bulletins pulled off the tracking queue.
    pub alerts_received: IntCounter,
    /// Bulletins fully processed by the lifecycle tracker.
    pub alerts_processed: IntCounter,
    /// Wall-clock seconds spent processing one bulletin.
    pub processing_time: Histogram,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let alerts_received = IntCounter::new(
            "alerts_received_total",
            "CAP bulletins received from the tracking queue",
        )?;
        registry.register(Box::new(alerts_received.clone()))?;

        let alerts_processed = IntCounter::new(
            "alerts_processed_total",
            "CAP bulletins processed by the lifecycle tracker",
        )?;
        registry.register(Box::new(alerts_processed.clone()))?;

        let processing_time = Histogram::with_opts(HistogramOpts::new(
            "alert_processing_time_seconds",
            "Time spent processing one CAP bulletin",
        ))?;
        registry.register(Box::new(processing_time.clone()))?;

        Ok(Self { registry, alerts_received, alerts_processed, processing_time })
    }

    /// Render the registry in the Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(err) = encoder.encode(&self.registry.gather(), &mut buffer) {
            error!(%err, "failed to encode metrics");
            return String::new();
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

async fn get_metrics(State(metrics): State<Arc<Metrics>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        metrics.render(),
    )
}

/// Serve `/metrics` until cancelled.
pub async fn serve(
    metrics: Arc<Metrics>,
    port: u16,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let app = Router::new().route("/metrics", get(get_metrics)).with_state(metrics);
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("metrics listening on {addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_registered_series() {
        let metrics = Metrics::new().expect("metrics");
        metrics.alerts_received.inc();
        metrics.alerts_received.inc();
        metrics.alerts_processed.inc();
        metrics.processing_time.observe(0.25);

        let body = metrics.render();
        assert!(body.contains("alerts_received_total 2"));
        assert!(body.contains("alerts_processed_total 1"));
        assert!(body.contains("alert_processing_time_seconds_count 1"));
    }
}
