use actix_web::http::StatusCode;
use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use prometheus::{Encoder, TextEncoder};
use std::sync::Arc;

use super::Metrics;
use crate::utils::CircuitState;

/// Serve `/metrics` (Prometheus text format) and `/health`.
/// Run it on its own thread/runtime, next to the engine's tokio runtime.
pub async fn start_metrics_server(metrics: Arc<Metrics>, port: u16) -> std::io::Result<()> {
    tracing::info!("📊 Starting metrics server on http://0.0.0.0:{}/metrics", port);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(metrics.clone()))
            .route("/metrics", web::get().to(metrics_handler))
            .route("/health", web::get().to(health_handler))
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}

async fn metrics_handler(metrics: web::Data<Arc<Metrics>>) -> impl Responder {
    let encoder = TextEncoder::new();
    let metric_families = metrics.registry().gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return HttpResponse::InternalServerError().finish();
    }

    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(buffer)
}

/// An open publisher breaker means committed events are not reaching the
/// transport, so the service reports itself unavailable until it closes.
fn health_report(metrics: &Metrics) -> (StatusCode, serde_json::Value) {
    let (status, code, publisher) = match metrics.circuit_breaker_state() {
        CircuitState::Closed => ("healthy", StatusCode::OK, "closed"),
        CircuitState::HalfOpen => ("recovering", StatusCode::OK, "half_open"),
        CircuitState::Open => ("degraded", StatusCode::SERVICE_UNAVAILABLE, "open"),
    };

    (
        code,
        serde_json::json!({
            "status": status,
            "service": "scylla-cqrs",
            "publisher_circuit": publisher,
        }),
    )
}

async fn health_handler(metrics: web::Data<Arc<Metrics>>) -> impl Responder {
    let (code, body) = health_report(&metrics);
    HttpResponse::build(code).json(body)
}
