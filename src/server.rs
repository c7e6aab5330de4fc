use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use tower_http::cors::CorsLayer;

use crate::metrics::exposition::{MetricValues, MetricsMap};

/// Builds the exposition router. The handler only ever clones the
/// last completed snapshot Arc, so serving never blocks on an
/// in-flight reporting tick.
pub fn create_router(metrics: Arc<MetricsMap>) -> Router {
    Router::new()
        .route("/latency_stats", get(latency_stats))
        .with_state(metrics)
        .layer(CorsLayer::permissive())
}

// ─── GET /latency_stats ──────────────────────────────────────────

async fn latency_stats(State(metrics): State<Arc<MetricsMap>>) -> Json<MetricValues> {
    Json((*metrics.snapshot()).clone())
}

// ─── Tests ───────────────────────────────────────────────────────
