use std::future::ready;

use axum::{extract::State, routing::get, Router};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tokio_util::sync::CancellationToken;

use crate::queue::QueueDepth;

pub const QUEUE_LENGTH: &str = "alb_logs_shipper_queue_length";

pub fn setup_metrics_recorder() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

pub async fn index() -> &'static str {
    "alb logs shipper"
}

#[derive(Clone)]
struct MetricsState {
    handle: PrometheusHandle,
    depth: QueueDepth,
}

async fn render(State(state): State<MetricsState>) -> String {
    metrics::gauge!(QUEUE_LENGTH).set(state.depth.get() as f64);
    state.handle.render()
}

/// Health routes plus `/metrics`, which refreshes the queue length gauge on every scrape.
pub fn router(handle: PrometheusHandle, depth: QueueDepth) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/_readiness", get(index))
        .route("/_liveness", get(|| ready("ok")))
        .route("/metrics", get(render))
        .with_state(MetricsState { handle, depth })
}

/// Serves `router` on `bind` until `token` is cancelled.
pub async fn serve(
    router: Router,
    bind: &str,
    token: CancellationToken,
) -> Result<(), std::io::Error> {
    let listener = tokio::net::TcpListener::bind(bind).await?;

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await?;

    Ok(())
}
